use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    flag: Mutex<bool>,
    wake: Condvar,
}

/// Cooperative cancellation shared between a controller and its loops.
///
/// Loops poll [`CancelToken::is_cancelled`] once per iteration; sleepers use
/// [`CancelToken::wait_timeout`] so cancellation wakes them immediately.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        if let Ok(mut flag) = self.state.flag.lock() {
            *flag = true;
        }
        self.state.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Block for up to `timeout`. Returns true if the token was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let Ok(mut flag) = self.state.flag.lock() else {
            return self.is_cancelled();
        };
        while !*flag {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.state.wake.wait_timeout(flag, deadline - now) {
                Ok((guard, _)) => flag = guard,
                Err(_) => return self.is_cancelled(),
            }
        }
        *flag
    }
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Route Ctrl-C to `token`. A second Ctrl-C exits the process with status 1.
pub fn install_signal_handler(token: CancelToken) {
    let result = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(1);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\nshutdown requested, finishing current writes...");
        token.cancel();
    });
    if let Err(e) = result {
        warn!("failed to install Ctrl-C handler: {e}");
    }
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn clones_share_state() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn wait_times_out_when_not_cancelled() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn cancel_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let cancelled = token.wait_timeout(Duration::from_secs(10));
                (cancelled, start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        let (cancelled, waited) = waiter.join().unwrap();
        assert!(cancelled);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn wait_on_cancelled_token_returns_immediately() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.wait_timeout(Duration::from_secs(10)));
    }
}
