//! Tenderscan Pipeline Monitor
//!
//! Per-document observability: chunk throughput, per-stage timing, API call
//! and token accounting, and an error log.
//!
//! A [`PipelineMonitor`] is created for one document run and never shared
//! across documents. Concurrent chunk tasks record through a
//! [`MonitorHandle`], which serializes every update behind one mutex.
//!
//! # Usage
//!
//! ```
//! use tenderscan_monitor::MonitorHandle;
//! use serde_json::json;
//!
//! let monitor = MonitorHandle::for_document("tender-42");
//! monitor.start_stage("extraction");
//! monitor.record_api_call("claude", None);
//! monitor.record_chunk_processed(true);
//! monitor.end_stage(json!({"chunks": 1}));
//!
//! let report = monitor.generate_report();
//! assert_eq!(report.metrics.processed_chunks, 1);
//! assert_eq!(report.performance_summary.success_rate, 100);
//! ```

#![warn(missing_docs)]

mod metrics;
mod monitor;

pub use metrics::{ErrorRecord, PipelineMetrics};
pub use monitor::{
    MonitorHandle, MonitorReport, PerformanceSummary, PipelineMonitor, StageReport, StageTiming,
};
