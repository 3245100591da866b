//! Per-document pipeline monitor and its shared handle

use crate::metrics::{ErrorRecord, PipelineMetrics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tenderscan_domain::traits::TokenUsage;
use tracing::{debug, warn};

/// A finished stage interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    /// Stage name
    pub name: String,
    /// Wall time in milliseconds, fractional
    pub duration_ms: f64,
    /// Caller-supplied details
    pub metadata: Value,
}

#[derive(Debug, Clone)]
struct OpenStage {
    name: String,
    started: Instant,
}

/// Observability state for one document run.
///
/// Created at the start of processing and handed back to the caller at the
/// end; never shared between documents.
#[derive(Debug, Clone)]
pub struct PipelineMonitor {
    document_id: String,
    created: Instant,
    metrics: PipelineMetrics,
    stages: Vec<StageTiming>,
    open: Option<OpenStage>,
}

impl PipelineMonitor {
    /// Create a monitor for one document
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            created: Instant::now(),
            metrics: PipelineMetrics::new(),
            stages: Vec::new(),
            open: None,
        }
    }

    /// Document this monitor belongs to
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Current counters
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Finished stages in call order
    pub fn stages(&self) -> &[StageTiming] {
        &self.stages
    }

    /// Record the final outcome of one chunk
    pub fn record_chunk_processed(&mut self, success: bool) {
        self.metrics.record_chunk(success);
    }

    /// Record one provider call
    pub fn record_api_call(&mut self, provider: &str, usage: Option<TokenUsage>) {
        self.metrics.record_api_call(provider, usage);
    }

    /// Append an error record for `stage`
    pub fn record_error<E: fmt::Display + ?Sized>(&mut self, stage: &str, error: &E) {
        let message = error.to_string();
        warn!(stage, error = %message, document = %self.document_id, "Pipeline error recorded");
        self.metrics.errors.push(ErrorRecord {
            stage: stage.to_string(),
            error: message,
            offset_ms: self.created.elapsed().as_millis() as u64,
        });
    }

    /// Open a named stage. A stage still open is closed first with no metadata.
    pub fn start_stage(&mut self, name: impl Into<String>) {
        if self.open.is_some() {
            self.end_stage(Value::Null);
        }
        let name = name.into();
        debug!(stage = %name, "Stage started");
        self.open = Some(OpenStage {
            name,
            started: Instant::now(),
        });
    }

    /// Close the open stage, attaching `metadata`.
    ///
    /// Returns the recorded timing, or `None` when no stage was open.
    pub fn end_stage(&mut self, metadata: Value) -> Option<&StageTiming> {
        let Some(open) = self.open.take() else {
            warn!("end_stage called with no open stage");
            return None;
        };
        let duration_ms = open.started.elapsed().as_secs_f64() * 1000.0;
        debug!(stage = %open.name, duration_ms, "Stage finished");
        self.stages.push(StageTiming {
            name: open.name,
            duration_ms,
            metadata,
        });
        self.stages.last()
    }

    /// Snapshot of everything recorded so far
    pub fn generate_report(&self) -> MonitorReport {
        let stage_total: f64 = self.stages.iter().map(|s| s.duration_ms).sum();
        let stages: Vec<StageReport> = self
            .stages
            .iter()
            .map(|s| StageReport {
                name: s.name.clone(),
                duration_ms: round_to(s.duration_ms, 3),
                percentage: if stage_total > 0.0 {
                    round_to(s.duration_ms / stage_total * 100.0, 1)
                } else {
                    0.0
                },
                metadata: s.metadata.clone(),
            })
            .collect();

        let slowest_stage = self
            .stages
            .iter()
            .max_by(|a, b| a.duration_ms.total_cmp(&b.duration_ms))
            .map(|s| s.name.clone());

        let elapsed_secs = self.created.elapsed().as_secs_f64();
        let processed = self.metrics.processed_chunks;
        let chunks_per_second = if processed == 0 {
            0.0
        } else {
            let secs = if stage_total > 0.0 {
                stage_total / 1000.0
            } else {
                elapsed_secs
            };
            if secs > 0.0 {
                round_to(processed as f64 / secs, 2)
            } else {
                0.0
            }
        };

        let calls = self.metrics.total_api_calls();
        let tokens_per_call = if calls == 0 {
            0.0
        } else {
            round_to(self.metrics.token_usage.total() as f64 / calls as f64, 2)
        };

        MonitorReport {
            document_id: self.document_id.clone(),
            generated_at: Utc::now(),
            total_duration_ms: round_to(elapsed_secs * 1000.0, 3),
            stages,
            slowest_stage,
            open_stage: self.open.as_ref().map(|o| o.name.clone()),
            metrics: self.metrics.clone(),
            performance_summary: PerformanceSummary {
                success_rate: self.metrics.success_rate(),
                chunks_per_second,
                tokens_per_call,
            },
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Stage entry of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    /// Stage name
    pub name: String,
    /// Wall time in milliseconds
    pub duration_ms: f64,
    /// Share of all finished stage time
    pub percentage: f64,
    /// Caller-supplied details
    pub metadata: Value,
}

/// Derived throughput figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    /// Percent of chunks processed successfully, 100 when there were none
    pub success_rate: u32,
    /// Processed chunks per second of stage time
    pub chunks_per_second: f64,
    /// Average tokens per API call
    pub tokens_per_call: f64,
}

/// Monitor snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorReport {
    /// Document the run belongs to
    pub document_id: String,
    /// Snapshot time
    pub generated_at: DateTime<Utc>,
    /// Time since the monitor was created
    pub total_duration_ms: f64,
    /// Finished stages in call order
    pub stages: Vec<StageReport>,
    /// Longest finished stage
    pub slowest_stage: Option<String>,
    /// Stage started but not yet ended
    pub open_stage: Option<String>,
    /// Counters
    pub metrics: PipelineMetrics,
    /// Derived figures
    pub performance_summary: PerformanceSummary,
}

/// Shared handle used by concurrent chunk tasks.
///
/// Every operation takes the lock once, so concurrent updates are never lost.
/// A poisoned lock is recovered rather than propagated.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    inner: Arc<Mutex<PipelineMonitor>>,
}

impl MonitorHandle {
    /// Wrap a monitor
    pub fn new(monitor: PipelineMonitor) -> Self {
        Self {
            inner: Arc::new(Mutex::new(monitor)),
        }
    }

    /// Create a handle over a fresh monitor for `document_id`
    pub fn for_document(document_id: impl Into<String>) -> Self {
        Self::new(PipelineMonitor::new(document_id))
    }

    fn lock(&self) -> MutexGuard<'_, PipelineMonitor> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access
    pub fn with<R>(&self, f: impl FnOnce(&mut PipelineMonitor) -> R) -> R {
        f(&mut self.lock())
    }

    /// See [`PipelineMonitor::record_chunk_processed`]
    pub fn record_chunk_processed(&self, success: bool) {
        self.lock().record_chunk_processed(success);
    }

    /// See [`PipelineMonitor::record_api_call`]
    pub fn record_api_call(&self, provider: &str, usage: Option<TokenUsage>) {
        self.lock().record_api_call(provider, usage);
    }

    /// See [`PipelineMonitor::record_error`]
    pub fn record_error<E: fmt::Display + ?Sized>(&self, stage: &str, error: &E) {
        self.lock().record_error(stage, error);
    }

    /// See [`PipelineMonitor::start_stage`]
    pub fn start_stage(&self, name: impl Into<String>) {
        self.lock().start_stage(name);
    }

    /// See [`PipelineMonitor::end_stage`]; returns the recorded timing
    pub fn end_stage(&self, metadata: Value) -> Option<StageTiming> {
        self.lock().end_stage(metadata).cloned()
    }

    /// Copy of the current counters
    pub fn metrics(&self) -> PipelineMetrics {
        self.lock().metrics().clone()
    }

    /// See [`PipelineMonitor::generate_report`]
    pub fn generate_report(&self) -> MonitorReport {
        self.lock().generate_report()
    }

    /// Take the monitor back, cloning it when other handles are still alive
    pub fn into_inner(self) -> PipelineMonitor {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(shared) => shared.lock().unwrap_or_else(PoisonError::into_inner).clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io;

    #[test]
    fn test_new_monitor_is_empty() {
        let monitor = PipelineMonitor::new("doc-1");
        let m = monitor.metrics();
        assert_eq!(
            (m.total_chunks, m.processed_chunks, m.failed_chunks),
            (0, 0, 0)
        );
        assert!(monitor.stages().is_empty());
    }

    #[test]
    fn test_chunk_outcomes() {
        let mut monitor = PipelineMonitor::new("doc-1");
        for _ in 0..3 {
            monitor.record_chunk_processed(true);
        }
        let m = monitor.metrics();
        assert_eq!((m.total_chunks, m.processed_chunks, m.failed_chunks), (3, 3, 0));

        let mut monitor = PipelineMonitor::new("doc-2");
        monitor.record_chunk_processed(true);
        monitor.record_chunk_processed(true);
        monitor.record_chunk_processed(false);
        let m = monitor.metrics();
        assert_eq!((m.total_chunks, m.processed_chunks, m.failed_chunks), (3, 2, 1));
        assert_eq!(monitor.generate_report().performance_summary.success_rate, 67);
    }

    #[test]
    fn test_empty_report_defaults() {
        let report = PipelineMonitor::new("doc").generate_report();
        assert_eq!(report.performance_summary.success_rate, 100);
        assert_eq!(report.performance_summary.chunks_per_second, 0.0);
        assert_eq!(report.slowest_stage, None);
    }

    #[test]
    fn test_api_calls_and_tokens() {
        let mut monitor = PipelineMonitor::new("doc");
        monitor.record_api_call("azure", None);
        monitor.record_api_call("azure", None);
        monitor.record_api_call("claude", Some(TokenUsage::new(1000, 500)));

        let m = monitor.metrics();
        assert_eq!(m.api_calls["azure"], 2);
        assert_eq!(m.api_calls["claude"], 1);
        assert_eq!(m.token_usage.input, 1000);
        assert_eq!(m.token_usage.output, 500);
        assert_eq!(monitor.generate_report().performance_summary.tokens_per_call, 500.0);
    }

    #[test]
    fn test_stages_in_call_order() {
        let mut monitor = PipelineMonitor::new("doc");
        monitor.start_stage("structure");
        monitor.end_stage(json!({"elements": 12}));
        monitor.start_stage("chunking");
        monitor.end_stage(Value::Null);

        let stages = monitor.stages();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].name, "structure");
        assert_eq!(stages[1].name, "chunking");
        assert!(stages.iter().all(|s| s.duration_ms >= 0.0));
        assert_eq!(stages[0].metadata["elements"], 12);

        let report = monitor.generate_report();
        assert_eq!(report.stages.len(), 2);
        assert!(report.slowest_stage.is_some());
        assert_eq!(report.open_stage, None);
    }

    #[test]
    fn test_end_without_start_is_ignored() {
        let mut monitor = PipelineMonitor::new("doc");
        assert!(monitor.end_stage(Value::Null).is_none());
        assert!(monitor.stages().is_empty());
    }

    #[test]
    fn test_restarting_closes_open_stage() {
        let mut monitor = PipelineMonitor::new("doc");
        monitor.start_stage("a");
        monitor.start_stage("b");
        assert_eq!(monitor.stages().len(), 1);
        assert_eq!(monitor.generate_report().open_stage.as_deref(), Some("b"));
    }

    #[test]
    fn test_record_error() {
        let mut monitor = PipelineMonitor::new("doc");
        let err = io::Error::other("boom");
        monitor.record_error("analysis", &err);

        let errors = &monitor.metrics().errors;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stage, "analysis");
        assert_eq!(errors[0].error, "boom");
    }

    #[test]
    fn test_chunks_per_second_uses_stage_time() {
        let mut monitor = PipelineMonitor::new("doc");
        monitor.start_stage("extraction");
        std::thread::sleep(std::time::Duration::from_millis(5));
        monitor.record_chunk_processed(true);
        monitor.end_stage(Value::Null);
        let cps = monitor.generate_report().performance_summary.chunks_per_second;
        assert!(cps > 0.0);
        assert!(cps <= 200.0);
    }

    #[tokio::test]
    async fn test_handle_serializes_concurrent_updates() {
        let handle = MonitorHandle::for_document("doc");
        let mut tasks = Vec::new();
        for i in 0..50 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle.record_api_call("mock", Some(TokenUsage::new(1, 1)));
                handle.record_chunk_processed(i % 5 != 0);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let m = handle.metrics();
        assert_eq!(m.total_chunks, 50);
        assert_eq!(m.failed_chunks, 10);
        assert_eq!(m.api_calls["mock"], 50);
        assert_eq!(m.token_usage.input, 50);
        assert_eq!(handle.into_inner().metrics().processed_chunks, 40);
    }

    #[test]
    fn test_into_inner_with_live_clone_copies_state() {
        let handle = MonitorHandle::for_document("doc-7");
        let other = handle.clone();
        other.record_chunk_processed(true);

        let monitor = handle.into_inner();
        assert_eq!(monitor.document_id(), "doc-7");
        assert_eq!(monitor.metrics().processed_chunks, 1);

        other.record_chunk_processed(false);
        assert_eq!(monitor.metrics().total_chunks, 1);
        assert_eq!(other.metrics().total_chunks, 2);
    }
}
