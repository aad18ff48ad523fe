//! Metrics for the flow and refresh engines
//!
//! Recorded through the `metrics` facade; no exporter is installed here, so
//! recording is a no-op unless the host application installs a recorder.
//!
//! # Metrics
//!
//! - `credflow_refresh_total`: Counter of refresh-engine calls by service and outcome
//! - `credflow_flow_total`: Counter of authorization flows by service and outcome
//! - `credflow_token_request_seconds`: Histogram of token endpoint latency by grant

use std::time::Instant;

use metrics::{histogram, increment_counter};

/// How a refresh-engine call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Stored token was still valid
    Fresh,
    /// A refresh grant replaced the token
    Refreshed,
    /// Another caller refreshed while this one waited for the lock
    Coalesced,
    /// Expired token handed back because the provider cannot refresh
    ReusedExpired,
    /// The call failed
    Failed,
}

impl RefreshOutcome {
    /// Label value used in metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshOutcome::Fresh => "fresh",
            RefreshOutcome::Refreshed => "refreshed",
            RefreshOutcome::Coalesced => "coalesced",
            RefreshOutcome::ReusedExpired => "reused_expired",
            RefreshOutcome::Failed => "failed",
        }
    }
}

/// Counts one refresh-engine call.
pub fn record_refresh(service: &str, outcome: RefreshOutcome) {
    increment_counter!(
        "credflow_refresh_total",
        "service" => service.to_string(),
        "outcome" => outcome.as_str()
    );
}

/// Counts one authorization flow, `outcome` being `success` or `failed`.
pub fn record_flow(service: &str, outcome: &'static str) {
    increment_counter!(
        "credflow_flow_total",
        "service" => service.to_string(),
        "outcome" => outcome
    );
}

/// Times one token endpoint request; records on drop.
#[derive(Debug)]
pub struct TokenRequestTimer {
    grant: &'static str,
    start: Instant,
}

impl TokenRequestTimer {
    /// Starts timing a request for `grant` (`authorization_code` or `refresh_token`).
    pub fn start(grant: &'static str) -> Self {
        Self {
            grant,
            start: Instant::now(),
        }
    }
}

impl Drop for TokenRequestTimer {
    fn drop(&mut self) {
        histogram!(
            "credflow_token_request_seconds",
            self.start.elapsed().as_secs_f64(),
            "grant" => self.grant
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(RefreshOutcome::Fresh.as_str(), "fresh");
        assert_eq!(RefreshOutcome::ReusedExpired.as_str(), "reused_expired");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_refresh("dropbox", RefreshOutcome::Refreshed);
        record_flow("dropbox", "success");
        let _timer = TokenRequestTimer::start("refresh_token");
    }
}
