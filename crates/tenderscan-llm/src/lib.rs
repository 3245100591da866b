//! Tenderscan LLM Provider Layer
//!
//! Implementations of the `LlmProvider` trait from `tenderscan-domain` that
//! run without a network. The real model call is an external collaborator;
//! these providers stand in for it in tests and offline runs.
//!
//! # Providers
//!
//! - `MockProvider`: scripted responses matched by prompt content, with
//!   fault injection (errors, flaky calls, latency) and token usage
//! - `ReplayProvider`: recorded responses keyed by chunk id
//!
//! # Examples
//!
//! ```
//! use tenderscan_llm::MockProvider;
//! use tenderscan_domain::traits::LlmProvider;
//!
//! let provider = MockProvider::new("{}");
//! let result = provider.generate("test prompt").unwrap();
//! assert_eq!(result.text, "{}");
//! ```

#![warn(missing_docs)]

pub mod replay;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tenderscan_domain::traits::{Completion, LlmProvider, TokenUsage};
use thiserror::Error;

pub use replay::{chunk_id_in, ReplayProvider, CHUNK_ID_LABEL};

/// Errors that can occur during LLM operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Provider-side failure
    #[error("API error: {0}")]
    Api(String),

    /// Response could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// Provider misconfigured
    #[error("Configuration error: {0}")]
    Config(String),

    /// Scripted failure from a test provider
    #[error("Scripted failure: {0}")]
    Scripted(String),
}

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Error,
}

#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    failures_left: u32,
    reply: Reply,
}

/// Mock LLM provider for deterministic testing
///
/// Rules match when the prompt *contains* their needle; the first matching
/// rule wins, otherwise the default response is returned. Clones share
/// rules and counters.
///
/// # Examples
///
/// ```
/// use tenderscan_llm::MockProvider;
/// use tenderscan_domain::traits::LlmProvider;
///
/// let provider = MockProvider::new("{}");
/// provider.add_response("Bread", r#"{"unit_prices": []}"#);
/// provider.add_error("Milk");
/// assert_eq!(provider.generate("... Bread ...").unwrap().text, r#"{"unit_prices": []}"#);
/// assert!(provider.generate("... Milk ...").is_err());
/// assert_eq!(provider.generate("other").unwrap().text, "{}");
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    name: String,
    default_response: String,
    usage: Option<TokenUsage>,
    delay: Option<Duration>,
    rules: Arc<Mutex<Vec<Rule>>>,
    call_count: Arc<Mutex<usize>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockProvider {
    /// Create a new MockProvider with a fixed response for all prompts
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            name: "mock".to_string(),
            default_response: response.into(),
            usage: None,
            delay: None,
            rules: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Report API calls under this provider name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Report this token usage on every call
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Respond with `response` to prompts containing `needle`
    pub fn add_response(&self, needle: impl Into<String>, response: impl Into<String>) {
        lock(&self.rules).push(Rule {
            needle: needle.into(),
            failures_left: 0,
            reply: Reply::Text(response.into()),
        });
    }

    /// Fail every prompt containing `needle`
    pub fn add_error(&self, needle: impl Into<String>) {
        lock(&self.rules).push(Rule {
            needle: needle.into(),
            failures_left: 0,
            reply: Reply::Error,
        });
    }

    /// Fail the first `failures` prompts containing `needle`, then respond
    pub fn add_flaky(&self, needle: impl Into<String>, failures: u32, response: impl Into<String>) {
        lock(&self.rules).push(Rule {
            needle: needle.into(),
            failures_left: failures,
            reply: Reply::Text(response.into()),
        });
    }

    /// Get the number of times generate was called
    pub fn call_count(&self) -> usize {
        *lock(&self.call_count)
    }

    /// Reset the call count
    pub fn reset_call_count(&self) {
        *lock(&self.call_count) = 0;
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("{}")
    }
}

impl LlmProvider for MockProvider {
    type Error = LlmError;

    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, prompt: &str) -> Result<Completion, Self::Error> {
        *lock(&self.call_count) += 1;
        lock(&self.prompts).push(prompt.to_string());

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let reply = {
            let mut rules = lock(&self.rules);
            match rules.iter_mut().find(|r| prompt.contains(&r.needle)) {
                Some(rule) if rule.failures_left > 0 => {
                    rule.failures_left -= 1;
                    Reply::Error
                }
                Some(rule) => rule.reply.clone(),
                None => Reply::Text(self.default_response.clone()),
            }
        };

        match reply {
            Reply::Text(text) => Ok(Completion {
                text,
                usage: self.usage,
            }),
            Reply::Error => Err(LlmError::Scripted("Mock error".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_provider_default() {
        let provider = MockProvider::new("Test response");
        let result = provider.generate("any prompt");
        assert!(result.is_ok());
        assert_eq!(result.unwrap().text, "Test response");
    }

    #[test]
    fn test_mock_provider_matches_by_containment() {
        let provider = MockProvider::default();
        provider.add_response("hello", "world");
        provider.add_response("foo", "bar");

        assert_eq!(provider.generate("say hello there").unwrap().text, "world");
        assert_eq!(provider.generate("foo").unwrap().text, "bar");
        assert_eq!(provider.generate("unknown").unwrap().text, "{}");
    }

    #[test]
    fn test_mock_provider_call_count() {
        let provider = MockProvider::new("test");

        assert_eq!(provider.call_count(), 0);

        provider.generate("prompt1").unwrap();
        assert_eq!(provider.call_count(), 1);

        provider.generate("prompt2").unwrap();
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.prompts(), vec!["prompt1", "prompt2"]);

        provider.reset_call_count();
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_mock_provider_error() {
        let provider = MockProvider::default();
        provider.add_error("bad prompt");

        let result = provider.generate("a bad prompt");
        assert!(matches!(result, Err(LlmError::Scripted(_))));
    }

    #[test]
    fn test_mock_provider_flaky_recovers() {
        let provider = MockProvider::default();
        provider.add_flaky("chunk", 2, "ok");

        assert!(provider.generate("chunk").is_err());
        assert!(provider.generate("chunk").is_err());
        assert_eq!(provider.generate("chunk").unwrap().text, "ok");
    }

    #[test]
    fn test_mock_provider_usage_and_structured() {
        let provider = MockProvider::new("structured response")
            .with_name("claude")
            .with_usage(TokenUsage::new(1000, 500));
        let result = provider.generate_structured("prompt", "schema").unwrap();
        assert_eq!(result.text, "structured response");
        assert_eq!(result.usage, Some(TokenUsage::new(1000, 500)));
        assert_eq!(provider.name(), "claude");
    }

    #[test]
    fn test_mock_provider_clone() {
        let provider1 = MockProvider::new("test");
        let provider2 = provider1.clone();

        provider1.generate("test").unwrap();

        // Both should share the same call count due to Arc
        assert_eq!(provider1.call_count(), 1);
        assert_eq!(provider2.call_count(), 1);
    }
}
