//! Trait definitions for external collaborators

use serde::{Deserialize, Serialize};

/// Token accounting reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub input: u64,
    /// Completion tokens
    pub output: u64,
}

impl TokenUsage {
    /// Usage with both counts
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    /// Sum of both counts
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// Raw model output plus optional usage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Raw text; expected to be JSON but untrusted
    pub text: String,
    /// Token usage, when the provider reports it
    pub usage: Option<TokenUsage>,
}

impl Completion {
    /// Completion without usage figures
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Trait for language-model providers.
///
/// Implementations are synchronous; async callers move them onto the
/// blocking pool. Output is an opaque, possibly truncated string.
pub trait LlmProvider {
    /// Error type for LLM operations
    type Error;

    /// Provider name used for API call accounting (`azure`, `claude`, ...)
    fn name(&self) -> &str;

    /// Generate a completion
    fn generate(&self, prompt: &str) -> Result<Completion, Self::Error>;

    /// Generate with a JSON output schema hint.
    ///
    /// Providers without structured output ignore the schema.
    fn generate_structured(&self, prompt: &str, schema: &str) -> Result<Completion, Self::Error> {
        let _ = schema;
        self.generate(prompt)
    }
}
