//! Per-document pipeline counters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tenderscan_domain::traits::TokenUsage;

/// One recorded failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Stage that failed (`extraction`, `structure`, ...)
    pub stage: String,
    /// Error message
    pub error: String,
    /// Milliseconds since the monitor was created
    pub offset_ms: u64,
}

/// Counters collected while processing one document
///
/// Tracks chunk outcomes, API calls per provider, token usage and errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    /// Chunks with a final outcome
    pub total_chunks: usize,

    /// Chunks that produced a fragment
    pub processed_chunks: usize,

    /// Chunks that failed permanently
    pub failed_chunks: usize,

    /// API calls per provider name
    pub api_calls: BTreeMap<String, usize>,

    /// Accumulated token usage
    pub token_usage: TokenUsage,

    /// Failures in recording order
    pub errors: Vec<ErrorRecord>,
}

impl PipelineMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a chunk outcome
    pub fn record_chunk(&mut self, success: bool) {
        self.total_chunks += 1;
        if success {
            self.processed_chunks += 1;
        } else {
            self.failed_chunks += 1;
        }
    }

    /// Record one API call, accumulating tokens when supplied
    pub fn record_api_call(&mut self, provider: &str, usage: Option<TokenUsage>) {
        *self.api_calls.entry(provider.to_string()).or_insert(0) += 1;
        if let Some(usage) = usage {
            self.token_usage.input += usage.input;
            self.token_usage.output += usage.output;
        }
    }

    /// Total API calls across providers
    pub fn total_api_calls(&self) -> usize {
        self.api_calls.values().sum()
    }

    /// `round(processed / total * 100)`, 100 when nothing was recorded
    pub fn success_rate(&self) -> u32 {
        if self.total_chunks == 0 {
            return 100;
        }
        (self.processed_chunks as f64 / self.total_chunks as f64 * 100.0).round() as u32
    }

    /// Generate a summary report of metrics
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Pipeline Metrics Summary".to_string(),
            "========================".to_string(),
            format!(
                "Chunks: {} total, {} processed, {} failed",
                self.total_chunks, self.processed_chunks, self.failed_chunks
            ),
            format!(
                "Tokens: {} input, {} output",
                self.token_usage.input, self.token_usage.output
            ),
        ];

        if !self.api_calls.is_empty() {
            lines.push("API calls by provider:".to_string());
            for (provider, count) in &self.api_calls {
                lines.push(format!("  {}: {}", provider, count));
            }
        }

        if !self.errors.is_empty() {
            lines.push(format!("Errors: {}", self.errors.len()));
            for record in &self.errors {
                lines.push(format!("  [{}] {}", record.stage, record.error));
            }
        }

        lines.join("\n")
    }
}
