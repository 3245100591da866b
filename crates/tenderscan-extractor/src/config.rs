//! Configuration for the extraction pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tenderscan_gatekeeper::GatekeeperConfig;

/// Configuration for chunking, extraction and validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum chunk size (characters)
    pub max_chunk_chars: usize,

    /// Maximum data rows per spreadsheet chunk
    pub max_sheet_rows: usize,

    /// Body characters glued to every heading line
    pub heading_min_body_chars: usize,

    /// Chunk extractions running at once
    pub max_concurrency: usize,

    /// Deadline for a single provider call (milliseconds)
    pub timeout_ms: u64,

    /// Extra attempts after the first failed call
    pub max_retries: u32,

    /// Wait before the first retry, doubled on each further retry (milliseconds)
    pub retry_backoff_ms: u64,

    /// Maximum input text length (bytes)
    pub max_text_length: usize,

    /// Validation thresholds
    pub gatekeeper: GatekeeperConfig,
}

impl PipelineConfig {
    /// Get the call timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Wait before retry number `retry` (1-based)
    pub fn retry_backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_chars == 0 {
            return Err("max_chunk_chars must be greater than 0".to_string());
        }
        if self.max_sheet_rows == 0 {
            return Err("max_sheet_rows must be greater than 0".to_string());
        }
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be greater than 0".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".to_string());
        }
        if self.max_text_length == 0 {
            return Err("max_text_length must be greater than 0".to_string());
        }
        if self.heading_min_body_chars >= self.max_chunk_chars {
            return Err("heading_min_body_chars must be smaller than max_chunk_chars".to_string());
        }
        if self.heading_min_body_chars < self.gatekeeper.heading_min_body_chars {
            return Err(format!(
                "heading_min_body_chars ({}) is below the gatekeeper's ({})",
                self.heading_min_body_chars, self.gatekeeper.heading_min_body_chars
            ));
        }
        self.gatekeeper.validate().map_err(|e| e.to_string())
    }
}

impl Default for PipelineConfig {
    /// Default configuration with balanced settings
    fn default() -> Self {
        Self {
            max_chunk_chars: 9_000,
            max_sheet_rows: 200,
            heading_min_body_chars: 200,
            max_concurrency: 4,
            timeout_ms: 60_000,
            max_retries: 2,
            retry_backoff_ms: 500,
            max_text_length: 2_000_000,
            gatekeeper: GatekeeperConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Aggressive preset: smaller chunks, more parallelism, fail fast
    pub fn aggressive() -> Self {
        Self {
            max_chunk_chars: 6_000,
            max_sheet_rows: 100,
            max_concurrency: 8,
            timeout_ms: 30_000,
            max_retries: 1,
            retry_backoff_ms: 250,
            ..Self::default()
        }
    }

    /// Lenient preset: longer timeouts, more retries, repaired output accepted
    pub fn lenient() -> Self {
        Self {
            max_chunk_chars: 12_000,
            max_sheet_rows: 400,
            max_concurrency: 2,
            timeout_ms: 180_000,
            max_retries: 4,
            retry_backoff_ms: 1_000,
            gatekeeper: GatekeeperConfig {
                accept_repaired_json: true,
                ..GatekeeperConfig::default()
            },
            ..Self::default()
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(PipelineConfig::aggressive().validate().is_ok());
        assert!(PipelineConfig::lenient().validate().is_ok());
    }

    #[test]
    fn test_invalid_chunk_size() {
        let mut config = PipelineConfig::default();
        config.max_chunk_chars = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_heading_glue_must_satisfy_gatekeeper() {
        let mut config = PipelineConfig::default();
        config.heading_min_body_chars = 50;
        assert!(config.validate().is_err());
        config.gatekeeper.heading_min_body_chars = 50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_doubles() {
        let config = PipelineConfig::default();
        assert_eq!(config.retry_backoff(1), Duration::from_millis(500));
        assert_eq!(config.retry_backoff(2), Duration::from_millis(1_000));
        assert_eq!(config.retry_backoff(3), Duration::from_millis(2_000));
        assert_eq!(config.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = PipelineConfig::lenient();
        let toml_str = config.to_toml().unwrap();
        let parsed = PipelineConfig::from_toml(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed = PipelineConfig::from_toml(
            "max_chunk_chars = 4000\n\n[gatekeeper]\naccept_repaired_json = true\n",
        )
        .unwrap();
        assert_eq!(parsed.max_chunk_chars, 4_000);
        assert_eq!(parsed.max_retries, 2);
        assert!(parsed.gatekeeper.accept_repaired_json);
        assert_eq!(parsed.gatekeeper.heading_min_body_chars, 200);
    }
}
