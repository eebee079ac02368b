//! Token-usage accounting
//!
//! Counts are handed to a [`UsageSink`] on a background task so that
//! accounting never delays forwarding the request or the response.

pub mod estimate;

pub use estimate::InputTokenEstimator;

use crate::core_types::ConversionRequest;
use crate::logging::{log_info, log_warn};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageKind {
    Input,
    Output,
}

impl std::fmt::Display for UsageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UsageKind::Input => write!(f, "input"),
            UsageKind::Output => write!(f, "output"),
        }
    }
}

/// One token count for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageReport {
    pub request_id: String,
    pub model: String,
    pub kind: UsageKind,
    pub tokens: u32,
    /// Local estimate rather than an upstream-reported figure.
    pub estimated: bool,
}

/// Receives usage reports.
#[async_trait]
pub trait UsageSink: Send + Sync + std::fmt::Debug {
    async fn report(&self, report: UsageReport);
}

/// Default sink: one structured log record per report.
#[derive(Debug, Default, Clone)]
pub struct TracingUsageSink;

#[async_trait]
impl UsageSink for TracingUsageSink {
    async fn report(&self, report: UsageReport) {
        log_info!(
            request_id = %report.request_id,
            model = %report.model,
            kind = %report.kind,
            tokens = report.tokens,
            estimated = report.estimated,
            "Token usage"
        );
    }
}

/// Deliver a report in the background.
pub fn spawn_report(sink: Arc<dyn UsageSink>, report: UsageReport) -> JoinHandle<()> {
    tokio::spawn(async move { sink.report(report).await })
}

/// Estimate input tokens off the request path, then report them.
pub fn spawn_input_estimate(
    sink: Arc<dyn UsageSink>,
    estimator: InputTokenEstimator,
    request_id: String,
    request: ConversionRequest,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let model = request.model.clone();
        let tokens = match tokio::task::spawn_blocking(move || estimator.estimate(&request)).await {
            Ok(tokens) => tokens,
            Err(e) => {
                log_warn!(request_id = %request_id, error = %e, "Input token estimation failed");
                return;
            }
        };
        sink.report(UsageReport {
            request_id,
            model,
            kind: UsageKind::Input,
            tokens,
            estimated: true,
        })
        .await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Turn;
    use tokio::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingSink {
        reports: Mutex<Vec<UsageReport>>,
    }

    #[async_trait]
    impl UsageSink for RecordingSink {
        async fn report(&self, report: UsageReport) {
            self.reports.lock().await.push(report);
        }
    }

    #[tokio::test]
    async fn test_spawned_report_reaches_sink() {
        let sink = Arc::new(RecordingSink::default());
        let report = UsageReport {
            request_id: "req-1".to_string(),
            model: "claude-sonnet-4".to_string(),
            kind: UsageKind::Output,
            tokens: 42,
            estimated: false,
        };

        spawn_report(sink.clone(), report.clone()).await.unwrap();

        assert_eq!(*sink.reports.lock().await, vec![report]);
    }

    #[tokio::test]
    async fn test_input_estimate_is_marked_estimated() {
        let sink = Arc::new(RecordingSink::default());
        let request = ConversionRequest::new("claude-sonnet-4", vec![Turn::user("hello there")]);

        spawn_input_estimate(
            sink.clone(),
            InputTokenEstimator::new().unwrap(),
            "req-2".to_string(),
            request,
        )
        .await
        .unwrap();

        let reports = sink.reports.lock().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, UsageKind::Input);
        assert!(reports[0].estimated);
        assert!(reports[0].tokens > 0);
    }
}
