pub mod completions;
pub mod ensure_index;
pub mod index_info;
pub mod man_pages;
pub mod run;
pub mod swarm;

use console::Style;
use indexquake_core::{parse_config_file, CoreError, CounterSnapshot, RunConfig, StatusSink};
use indexquake_store::{ConnectionPool, PoolConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;
pub const EXIT_CANARY_FAILED: u8 = 4;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Read `path` (or start from defaults) and apply the URL override.
pub fn load_config(path: Option<&Path>, url: Option<&str>) -> Result<RunConfig, String> {
    let mut config = match path {
        Some(path) => parse_config_file(path).map_err(|e| format!("config error: {e}"))?,
        None => RunConfig::default(),
    };
    if let Some(url) = url {
        url.clone_into(&mut config.store.url);
    }
    Ok(config)
}

/// Prefix errors so `main` can pick the exit code.
pub fn core_error(e: CoreError) -> String {
    match e {
        CoreError::Config(inner) => format!("config error: {inner}"),
        e @ (CoreError::Connectivity(_) | CoreError::Store(_)) => format!("store error: {e}"),
        other => other.to_string(),
    }
}

/// Single-connection pool for one-shot commands.
pub fn connect_single(config: &RunConfig) -> Result<ConnectionPool, String> {
    config
        .validate()
        .map_err(|e| format!("config error: {e}"))?;
    let connector = config.connector().map_err(|e| format!("store error: {e}"))?;
    ConnectionPool::connect(
        connector,
        PoolConfig {
            max_size: 1,
            acquire_timeout: None,
        },
    )
    .map_err(|e| format!("store error: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn status_line(snapshot: &CounterSnapshot, elapsed: Duration) -> String {
    format!(
        "{:>6.1}s  writes {} ok / {} failed  canary {} ok / {} failed  chaos {} ({} failed)",
        elapsed.as_secs_f64(),
        snapshot.successful_write,
        snapshot.unsuccessful_write,
        snapshot.verification_success,
        snapshot.verification_failure,
        snapshot.random_commands_executed,
        snapshot.random_command_failures,
    )
}

/// Live counters on a spinner line.
pub struct ProgressSink {
    bar: ProgressBar,
}

impl ProgressSink {
    pub fn new(target: u64) -> Self {
        Self {
            bar: spinner(&format!("writing {target} documents...")),
        }
    }
}

impl StatusSink for ProgressSink {
    fn render(&mut self, snapshot: &CounterSnapshot, elapsed: Duration) {
        self.bar.set_message(status_line(snapshot, elapsed));
    }

    fn finish(&mut self, _snapshot: &CounterSnapshot, _elapsed: Duration) {
        self.bar.finish_and_clear();
    }
}

pub fn good(value: impl std::fmt::Display) -> String {
    Style::new().green().apply_to(value).to_string()
}

pub fn bad_if(value: u64) -> String {
    if value > 0 {
        Style::new().red().bold().apply_to(value).to_string()
    } else {
        value.to_string()
    }
}

pub fn heading(text: &str) -> String {
    Style::new().bold().apply_to(text).to_string()
}

pub fn print_counters(counters: &CounterSnapshot) {
    println!(
        "writes:        {} ok, {} failed",
        good(counters.successful_write),
        bad_if(counters.unsuccessful_write)
    );
    println!(
        "canary:        {} ok, {} failed",
        good(counters.verification_success),
        bad_if(counters.verification_failure)
    );
    println!(
        "chaos:         {} executed, {} failed",
        counters.random_commands_executed, counters.random_command_failures
    );
}
