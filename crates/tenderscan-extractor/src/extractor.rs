//! Per-chunk extraction with bounded fan-out

use crate::config::PipelineConfig;
use crate::error::{ExtractorError, Result};
use crate::parser::{safe_json_parse, ParsedJson};
use crate::prompt::PromptBuilder;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;
use tenderscan_domain::traits::{Completion, LlmProvider};
use tenderscan_domain::{Chunk, DocumentId, ExtractionOutcome, ExtractionResult};
use tenderscan_monitor::MonitorHandle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Sends chunks to a language model and decodes the fragments it returns
pub struct Extractor<L>
where
    L: LlmProvider,
{
    llm_provider: Arc<L>,
    config: Arc<PipelineConfig>,
}

impl<L: LlmProvider> Clone for Extractor<L> {
    fn clone(&self) -> Self {
        Self {
            llm_provider: Arc::clone(&self.llm_provider),
            config: Arc::clone(&self.config),
        }
    }
}

impl<L> Extractor<L>
where
    L: LlmProvider + Send + Sync + 'static,
    L::Error: Display,
{
    /// Create a new Extractor
    pub fn new(llm_provider: L, config: PipelineConfig) -> Self {
        Self::with_shared(Arc::new(llm_provider), config)
    }

    /// Create an Extractor over a provider shared with the caller
    pub fn with_shared(llm_provider: Arc<L>, config: PipelineConfig) -> Self {
        Self {
            llm_provider,
            config: Arc::new(config),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract one chunk, retrying failed calls with doubling backoff.
    ///
    /// Never fails: a chunk that cannot be extracted after all retries
    /// yields a `Failed` result. Chunk outcomes, API calls and errors are
    /// recorded on `monitor`.
    pub async fn extract_chunk(
        &self,
        chunk: &Chunk,
        document_id: &DocumentId,
        monitor: &MonitorHandle,
    ) -> ExtractionResult {
        let prompt = PromptBuilder::new(&chunk.text, document_id, &chunk.id)
            .with_heading_context(chunk.heading_context.as_deref())
            .with_part_of(&chunk.part_of)
            .build();

        debug!("Prompt for {}: {} chars", chunk.id, prompt.len());

        let mut attempts = 0;
        let error = loop {
            attempts += 1;
            match self.attempt(&prompt, monitor).await {
                Ok(parsed) => {
                    monitor.record_chunk_processed(true);
                    if parsed.recovered {
                        warn!(
                            chunk = %chunk.id,
                            dropped = parsed.dropped_suffix.chars().count(),
                            "Fragment recovered from truncated output"
                        );
                    }
                    return ExtractionResult {
                        chunk_id: chunk.id.clone(),
                        outcome: ExtractionOutcome::Parsed {
                            fragment: parsed.value,
                            recovered: parsed.recovered,
                            dropped_suffix: parsed.dropped_suffix,
                        },
                        attempts,
                    };
                }
                Err(e) if attempts <= self.config.max_retries => {
                    let wait = self.config.retry_backoff(attempts);
                    warn!(
                        "Attempt {} for {} failed: {}; retrying in {:?}",
                        attempts, chunk.id, e, wait
                    );
                    sleep(wait).await;
                }
                Err(e) => break e,
            }
        };

        warn!("Extraction of {} failed after {} attempts: {}", chunk.id, attempts, error);
        monitor.record_chunk_processed(false);
        monitor.record_error("extraction", &format!("{}: {}", chunk.id, error));
        ExtractionResult::failed(chunk.id.clone(), error.to_string(), attempts)
    }

    /// Extract every chunk, at most `max_concurrency` at a time.
    ///
    /// Returns once every chunk has a final outcome, ordered by chunk
    /// index.
    pub async fn extract_all(
        &self,
        chunks: &[Chunk],
        document_id: &DocumentId,
        monitor: &MonitorHandle,
    ) -> Vec<ExtractionResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for chunk in chunks {
            let worker = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let chunk = chunk.clone();
            let document_id = document_id.clone();
            let monitor = monitor.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = worker.extract_chunk(&chunk, &document_id, &monitor).await;
                (chunk.index, result)
            });
        }

        let mut finished: BTreeMap<usize, ExtractionResult> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    finished.insert(index, result);
                }
                Err(e) => warn!("Extraction task ended abnormally: {}", e),
            }
        }

        // A task that panicked leaves its chunk without a result
        for chunk in chunks {
            if !finished.contains_key(&chunk.index) {
                let error = ExtractorError::Join("extraction task did not complete".to_string());
                monitor.record_chunk_processed(false);
                monitor.record_error("extraction", &error);
                finished.insert(
                    chunk.index,
                    ExtractionResult::failed(chunk.id.clone(), error.to_string(), 0),
                );
            }
        }

        let results: Vec<ExtractionResult> = finished.into_values().collect();
        info!(
            "Extracted {} chunks: {} failed, {} repaired",
            results.len(),
            results.iter().filter(|r| r.is_failed()).count(),
            results.iter().filter(|r| r.is_recovered()).count()
        );
        results
    }

    /// One provider call plus decoding
    async fn attempt(&self, prompt: &str, monitor: &MonitorHandle) -> Result<ParsedJson> {
        let called = timeout(self.config.timeout(), self.call_llm(prompt)).await;
        let completion = match called {
            Ok(Ok(completion)) => completion,
            Ok(Err(e)) => {
                monitor.record_api_call(self.llm_provider.name(), None);
                return Err(e);
            }
            Err(_) => {
                monitor.record_api_call(self.llm_provider.name(), None);
                return Err(ExtractorError::Timeout {
                    ms: self.config.timeout_ms,
                });
            }
        };
        monitor.record_api_call(self.llm_provider.name(), completion.usage);

        debug!("LLM response length: {} chars", completion.text.len());
        let parsed = safe_json_parse(&completion.text)?;
        if !parsed.value.is_object() {
            return Err(ExtractorError::InvalidFragment(format!(
                "expected a JSON object, got {}",
                json_kind(&parsed.value)
            )));
        }
        Ok(parsed)
    }

    /// Call the LLM provider
    async fn call_llm(&self, prompt: &str) -> Result<Completion> {
        let llm = Arc::clone(&self.llm_provider);
        let prompt = prompt.to_string();

        // Call in a blocking context since LlmProvider is not async
        tokio::task::spawn_blocking(move || {
            llm.generate(&prompt)
                .map_err(|e| ExtractorError::Llm(e.to_string()))
        })
        .await
        .map_err(|e| ExtractorError::Join(e.to_string()))?
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tenderscan_domain::traits::TokenUsage;
    use tenderscan_domain::{ChunkKind, ChunkSegment, Span};
    use tenderscan_llm::MockProvider;

    const SOURCE: &str = "Bread 12,50 TL per kg.\nMilk 9,00 TL per litre.\n";

    fn chunks() -> Vec<Chunk> {
        vec![
            Chunk::from_segments(0, SOURCE, vec![ChunkSegment::owned(Span::new(0, 23))], ChunkKind::Text)
                .unwrap(),
            Chunk::from_segments(1, SOURCE, vec![ChunkSegment::owned(Span::new(23, 47))], ChunkKind::Text)
                .unwrap(),
        ]
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            retry_backoff_ms: 1,
            timeout_ms: 5_000,
            ..PipelineConfig::default()
        }
    }

    fn document() -> DocumentId {
        DocumentId::from_string("tender-1")
    }

    #[test]
    fn test_extract_chunk_clean_response() {
        let provider = MockProvider::new(r#"{"unit_prices": [{"item": "Bread", "unit_price": "12,50"}]}"#)
            .with_name("azure")
            .with_usage(TokenUsage::new(100, 20));
        let extractor = Extractor::new(provider, fast_config());
        let monitor = MonitorHandle::for_document("tender-1");

        let result = tokio_test::block_on(extractor.extract_chunk(&chunks()[0], &document(), &monitor));

        assert_eq!(result.attempts, 1);
        assert!(!result.is_recovered());
        assert_eq!(result.fragment().unwrap()["unit_prices"][0]["item"], "Bread");
        let metrics = monitor.metrics();
        assert_eq!(metrics.processed_chunks, 1);
        assert_eq!(metrics.api_calls.get("azure"), Some(&1));
        assert_eq!(metrics.token_usage, TokenUsage::new(100, 20));
    }

    #[tokio::test]
    async fn test_flaky_provider_is_retried() {
        let provider = MockProvider::default();
        provider.add_flaky("Chunk ID: c0000", 2, r#"{"requirements": []}"#);
        let extractor = Extractor::new(provider.clone(), fast_config());
        let monitor = MonitorHandle::for_document("tender-1");

        let result = extractor.extract_chunk(&chunks()[0], &document(), &monitor).await;

        assert_eq!(result.attempts, 3);
        assert!(!result.is_failed());
        assert_eq!(provider.call_count(), 3);
        assert_eq!(monitor.metrics().total_api_calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_recorded() {
        let provider = MockProvider::default();
        provider.add_error("Chunk ID: c0001");
        let config = PipelineConfig {
            max_retries: 1,
            ..fast_config()
        };
        let extractor = Extractor::new(provider.clone(), config);
        let monitor = MonitorHandle::for_document("tender-1");

        let results = extractor.extract_all(&chunks(), &document(), &monitor).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id.as_str(), "c0000");
        assert!(!results[0].is_failed());
        assert!(results[1].is_failed());
        assert_eq!(results[1].attempts, 2);
        let metrics = monitor.metrics();
        assert_eq!(metrics.failed_chunks, 1);
        assert_eq!(metrics.processed_chunks, 1);
        assert_eq!(metrics.errors.len(), 1);
        assert_eq!(metrics.errors[0].stage, "extraction");
    }

    #[tokio::test]
    async fn test_truncated_response_is_recovered() {
        let provider = MockProvider::new(r#"{"unit_prices": [{"item": "Bread"}, {"item": "Mi"#);
        let extractor = Extractor::new(provider, fast_config());
        let monitor = MonitorHandle::for_document("tender-1");

        let result = extractor.extract_chunk(&chunks()[0], &document(), &monitor).await;

        assert!(result.is_recovered());
        assert_eq!(result.fragment().unwrap()["unit_prices"][0]["item"], "Bread");
    }

    #[tokio::test]
    async fn test_non_object_response_fails() {
        let provider = MockProvider::new("[1, 2, 3]");
        let config = PipelineConfig {
            max_retries: 0,
            ..fast_config()
        };
        let extractor = Extractor::new(provider, config);
        let monitor = MonitorHandle::for_document("tender-1");

        let result = extractor.extract_chunk(&chunks()[0], &document(), &monitor).await;

        let ExtractionOutcome::Failed { reason } = &result.outcome else {
            panic!("an array is not a fragment");
        };
        assert!(reason.contains("an array"));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let provider = MockProvider::new("{}").with_delay(Duration::from_millis(300));
        let config = PipelineConfig {
            timeout_ms: 20,
            max_retries: 0,
            ..fast_config()
        };
        let extractor = Extractor::new(provider, config);
        let monitor = MonitorHandle::for_document("tender-1");

        let result = extractor.extract_chunk(&chunks()[0], &document(), &monitor).await;

        assert!(result.is_failed());
        assert_eq!(
            result.outcome,
            ExtractionOutcome::Failed {
                reason: "Extraction timed out after 20 ms".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_results_are_ordered_by_chunk_index() {
        let provider = MockProvider::new("{}");
        provider.add_response("Chunk ID: c0000", r#"{"contact": {"phone": "0312"}}"#);
        let config = PipelineConfig {
            max_concurrency: 1,
            ..fast_config()
        };
        let extractor = Extractor::new(provider, config);
        let monitor = MonitorHandle::for_document("tender-1");

        let results = extractor.extract_all(&chunks(), &document(), &monitor).await;
        let ids: Vec<&str> = results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c0000", "c0001"]);
        assert_eq!(monitor.metrics().total_chunks, 2);
    }
}
