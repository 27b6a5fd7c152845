use crate::counters::RunCounters;
use crate::{CancelToken, CoreError};
use indexquake_schema::book::{CANARY_SEARCH_TERM, CANARY_TITLE};
use indexquake_schema::{Book, DocKey, IndexName, Namespace, CANARY_ID};
use indexquake_store::{ConnectionPool, SearchQuery};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, info, warn};

const TITLE_PATH: &str = "$.title";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanaryState {
    Pending,
    Seeded,
    Verifying,
    Stopped,
}

impl fmt::Display for CanaryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CanaryState::Pending => "pending",
            CanaryState::Seeded => "seeded",
            CanaryState::Verifying => "verifying",
            CanaryState::Stopped => "stopped",
        })
    }
}

pub fn validate_transition(from: CanaryState, to: CanaryState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (CanaryState::Pending | CanaryState::Seeded, CanaryState::Seeded)
            | (CanaryState::Seeded, CanaryState::Verifying)
            | (
                CanaryState::Pending | CanaryState::Seeded | CanaryState::Verifying,
                CanaryState::Stopped
            )
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierReport {
    pub passes: u64,
    pub failures: u64,
}

/// Writes the canary document and reads it back through the index until
/// cancelled.
pub struct CanaryVerifier<'a> {
    pool: &'a ConnectionPool,
    counters: &'a RunCounters,
    index: IndexName,
    key: DocKey,
    document: Book,
    state: Mutex<CanaryState>,
}

impl<'a> CanaryVerifier<'a> {
    /// `template` supplies every non-identifying field of the canary.
    pub fn new(
        pool: &'a ConnectionPool,
        counters: &'a RunCounters,
        index: IndexName,
        namespace: &Namespace,
        template: Book,
    ) -> Self {
        Self {
            pool,
            counters,
            index,
            key: namespace.key(CANARY_ID),
            document: template.into_canary(),
            state: Mutex::new(CanaryState::Pending),
        }
    }

    pub fn key(&self) -> &DocKey {
        &self.key
    }

    pub fn state(&self) -> CanaryState {
        self.state
            .lock()
            .map_or(CanaryState::Stopped, |state| *state)
    }

    fn transition(&self, to: CanaryState) -> Result<(), CoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| CoreError::VerificationMismatch(format!("state mutex poisoned: {e}")))?;
        validate_transition(*state, to)?;
        *state = to;
        Ok(())
    }

    /// Overwrite the canary document.
    pub fn seed(&self) -> Result<(), CoreError> {
        let body = self.document.to_json()?;
        let mut conn = self.pool.acquire()?;
        if !conn.json_set(self.key.as_str(), "$", &body)? {
            return Err(CoreError::VerificationMismatch(format!(
                "canary write to {} was not acknowledged",
                self.key
            )));
        }
        self.transition(CanaryState::Seeded)?;
        info!(key = %self.key, "canary seeded");
        Ok(())
    }

    /// One read-back through the index.
    pub fn verify_once(&self) -> Result<(), CoreError> {
        let query = SearchQuery::new(CANARY_SEARCH_TERM).return_field(TITLE_PATH);
        let result = {
            let mut conn = self.pool.acquire()?;
            conn.search(self.index.as_str(), &query)?
        };
        match result.documents.first().and_then(|d| d.field(TITLE_PATH)) {
            Some(CANARY_TITLE) => Ok(()),
            Some(other) => Err(CoreError::VerificationMismatch(format!(
                "expected title '{CANARY_TITLE}', found '{other}'"
            ))),
            None => Err(CoreError::VerificationMismatch(format!(
                "no document matched '{CANARY_SEARCH_TERM}' ({} total)",
                result.total
            ))),
        }
    }

    /// Verify in a tight loop until `cancel` fires.
    pub fn run(&self, cancel: &CancelToken) -> VerifierReport {
        let mut report = VerifierReport::default();
        if let Err(e) = self.transition(CanaryState::Verifying) {
            debug!("verifying without a seeded canary: {e}");
        }
        while !cancel.is_cancelled() {
            match self.verify_once() {
                Ok(()) => {
                    report.passes += 1;
                    self.counters.record_verification(true);
                }
                Err(e) => {
                    if report.failures == 0 {
                        warn!(key = %self.key, "canary verification failed: {e}");
                    } else {
                        debug!(key = %self.key, "canary verification failed: {e}");
                    }
                    report.failures += 1;
                    self.counters.record_verification(false);
                }
            }
        }
        if let Err(e) = self.transition(CanaryState::Stopped) {
            debug!("stopping canary verifier: {e}");
        }
        info!(passes = report.passes, failures = report.failures, "canary verifier stopped");
        report
    }
}
