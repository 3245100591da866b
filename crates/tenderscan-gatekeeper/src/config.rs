//! Gatekeeper configuration

use crate::error::{GatekeeperError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for validation and the P0 battery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatekeeperConfig {
    /// Characters of body that must share a chunk with their heading line
    pub heading_min_body_chars: usize,

    /// Records whose `confidence` field is below this are flagged (0.0-1.0)
    pub low_confidence_threshold: f64,

    /// Accept fragments that were decoded only after truncation repair
    pub accept_repaired_json: bool,

    /// Keys `quick_validate` requires at the top level
    pub required_top_level_keys: Vec<String>,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            heading_min_body_chars: 200,
            low_confidence_threshold: 0.6,
            accept_repaired_json: false,
            required_top_level_keys: vec![
                "document_id".to_string(),
                "conflicts".to_string(),
                "metadata".to_string(),
            ],
        }
    }
}

impl GatekeeperConfig {
    /// Create a permissive configuration.
    ///
    /// Repaired fragments are accepted and headings only need their line.
    pub fn permissive() -> Self {
        Self {
            heading_min_body_chars: 0,
            low_confidence_threshold: 0.0,
            accept_repaired_json: true,
            required_top_level_keys: vec!["document_id".to_string()],
        }
    }

    /// Create a strict configuration
    pub fn strict() -> Self {
        Self {
            heading_min_body_chars: 400,
            low_confidence_threshold: 0.8,
            ..Self::default()
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.low_confidence_threshold) {
            return Err(GatekeeperError::Config(format!(
                "low_confidence_threshold must be within 0.0-1.0, got {}",
                self.low_confidence_threshold
            )));
        }
        if self.required_top_level_keys.iter().any(|k| k.trim().is_empty()) {
            return Err(GatekeeperError::Config(
                "required_top_level_keys must not contain blank keys".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatekeeperConfig::default();
        assert_eq!(config.heading_min_body_chars, 200);
        assert_eq!(config.low_confidence_threshold, 0.6);
        assert!(!config.accept_repaired_json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_permissive_config() {
        let config = GatekeeperConfig::permissive();
        assert!(config.accept_repaired_json);
        assert_eq!(config.heading_min_body_chars, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strict_config() {
        let config = GatekeeperConfig::strict();
        assert!(!config.accept_repaired_json);
        assert!(config.heading_min_body_chars > GatekeeperConfig::default().heading_min_body_chars);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let config = GatekeeperConfig {
            low_confidence_threshold: 1.5,
            ..GatekeeperConfig::default()
        };
        assert!(matches!(config.validate(), Err(GatekeeperError::Config(_))));
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: GatekeeperConfig =
            serde_json::from_str(r#"{"accept_repaired_json": true}"#).unwrap();
        assert!(config.accept_repaired_json);
        assert_eq!(config.heading_min_body_chars, 200);
    }
}
