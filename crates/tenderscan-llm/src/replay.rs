//! Replays recorded model responses keyed by chunk id.

use crate::LlmError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tenderscan_domain::traits::{Completion, LlmProvider};
use tracing::debug;

/// Prompt line that carries the chunk id
pub const CHUNK_ID_LABEL: &str = "Chunk ID:";

/// Provider that answers each chunk with a response recorded earlier.
///
/// Prompts must contain a `Chunk ID: <id>` line, which every prompt built by
/// the extractor does. Recordings are a JSON object mapping chunk ids to
/// raw response strings.
///
/// ```
/// use tenderscan_llm::ReplayProvider;
/// use tenderscan_domain::traits::LlmProvider;
///
/// let provider = ReplayProvider::from_json(r#"{"c0000": "{\"requirements\": []}"}"#).unwrap();
/// let out = provider.generate("Chunk ID: c0000\n...").unwrap();
/// assert_eq!(out.text, "{\"requirements\": []}");
/// ```
#[derive(Debug)]
pub struct ReplayProvider {
    name: String,
    responses: BTreeMap<String, String>,
    calls: AtomicUsize,
}

impl ReplayProvider {
    /// Provider over an in-memory recording
    pub fn new(responses: BTreeMap<String, String>) -> Self {
        Self {
            name: "replay".to_string(),
            responses,
            calls: AtomicUsize::new(0),
        }
    }

    /// Parse a JSON recording
    pub fn from_json(json: &str) -> Result<Self, LlmError> {
        let responses: BTreeMap<String, String> = serde_json::from_str(json)
            .map_err(|e| LlmError::Config(format!("invalid recording: {}", e)))?;
        Ok(Self::new(responses))
    }

    /// Report API calls under a different provider name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of recorded chunks
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    /// True when nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Calls served so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Chunk id named in a prompt
pub fn chunk_id_in(prompt: &str) -> Option<&str> {
    prompt
        .lines()
        .find_map(|line| line.trim().strip_prefix(CHUNK_ID_LABEL))
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

impl LlmProvider for ReplayProvider {
    type Error = LlmError;

    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, prompt: &str) -> Result<Completion, Self::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let chunk_id = chunk_id_in(prompt)
            .ok_or_else(|| LlmError::Scripted("prompt carries no chunk id".to_string()))?;
        debug!("Replaying response for chunk {}", chunk_id);
        self.responses
            .get(chunk_id)
            .map(|text| Completion::text(text.clone()))
            .ok_or_else(|| LlmError::Scripted(format!("no recorded response for {}", chunk_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_in_prompt() {
        assert_eq!(chunk_id_in("Document: d\nChunk ID: c0007\nText"), Some("c0007"));
        assert_eq!(chunk_id_in("  Chunk ID:   c0001  "), Some("c0001"));
        assert_eq!(chunk_id_in("no id here"), None);
        assert_eq!(chunk_id_in("Chunk ID:"), None);
    }

    #[test]
    fn test_missing_recording_is_an_error() {
        let provider = ReplayProvider::from_json(r#"{"c0000": "{}"}"#).unwrap();
        assert!(provider.generate("Chunk ID: c0000").is_ok());
        let err = provider.generate("Chunk ID: c0001").unwrap_err();
        assert!(matches!(err, LlmError::Scripted(_)));
        assert_eq!(provider.call_count(), 2);
    }

    #[test]
    fn test_invalid_recording() {
        assert!(matches!(
            ReplayProvider::from_json("[1, 2]"),
            Err(LlmError::Config(_))
        ));
    }
}
