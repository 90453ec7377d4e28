//! Generation attempt loop: produce a candidate, validate its shape,
//! score it against recent history, and accept, retry, or fall back.

use crate::persona::PersonaContext;
use crate::similarity;
use crate::validate;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// The two provider calls the loop depends on. `LlmClient` implements
/// this against an OpenAI-compatible API; tests script it.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String>;
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

#[derive(Debug, Error)]
pub enum GenerationError {
    /// The budget ran out without a single candidate that validated and
    /// embedded. There is nothing to fall back to; the episode fails
    /// rather than posting a blank or malformed message.
    #[error("no usable candidate after {attempts} attempts (last failure: {last_failure})")]
    Exhausted { attempts: u32, last_failure: String },
}

/// A candidate that survived validation and scoring. Exactly one of these
/// per episode is persisted.
#[derive(Debug, Clone)]
pub struct GeneratedMessage {
    pub content: String,
    pub embedding: Vec<f32>,
    /// Worst-case cosine similarity against the comparison window.
    pub similarity: f32,
    /// False when this is a fallback commit that never cleared the bar.
    pub cleared_threshold: bool,
    /// 1-based attempt that produced this candidate.
    pub attempt: u32,
}

pub struct MotdGenerator {
    provider: Arc<dyn GenerationProvider>,
    persona: PersonaContext,
    max_attempts: u32,
    similarity_threshold: f32,
}

impl MotdGenerator {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        persona: PersonaContext,
        max_attempts: u32,
        similarity_threshold: f32,
    ) -> Self {
        Self {
            provider,
            persona,
            max_attempts,
            similarity_threshold,
        }
    }

    /// Runs the bounded attempt loop.
    ///
    /// Every attempt consumes budget, whether it fails on the provider,
    /// on format validation, or on similarity. The first candidate at or
    /// under the threshold wins immediately; otherwise the least similar
    /// valid candidate (earliest attempt on ties) is committed once the
    /// budget is spent.
    pub async fn generate_with_retry(
        &self,
        previous_messages: &[String],
        recent_embeddings: &[(String, Vec<f32>)],
    ) -> Result<GeneratedMessage, GenerationError> {
        let system_prompt = self.persona.system_prompt();
        let user_prompt = self.persona.user_prompt(previous_messages);

        let mut best: Option<GeneratedMessage> = None;
        let mut last_failure = "no attempts made".to_string();

        for attempt in 1..=self.max_attempts {
            let content = match self.provider.generate(&system_prompt, &user_prompt).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        "Attempt {}/{}: generation failed: {}",
                        attempt, self.max_attempts, e
                    );
                    last_failure = format!("generation failed: {e}");
                    continue;
                }
            };

            if let Err(violation) = validate::validate_message(&content) {
                warn!(
                    "Attempt {}/{}: candidate rejected: {}",
                    attempt, self.max_attempts, violation
                );
                last_failure = violation.to_string();
                continue;
            }

            let embedding = match self.provider.embed(&content).await {
                Ok(vector) => vector,
                Err(e) => {
                    warn!(
                        "Attempt {}/{}: embedding failed: {}",
                        attempt, self.max_attempts, e
                    );
                    last_failure = format!("embedding failed: {e}");
                    continue;
                }
            };

            let (score, matched) = similarity::max_similarity(&embedding, recent_embeddings);
            if let Some(idx) = matched {
                debug!(
                    "Attempt {}: closest historical match is entry {} at {:.1}%",
                    attempt,
                    idx,
                    score * 100.0
                );
            }

            let candidate = GeneratedMessage {
                content,
                embedding,
                similarity: score,
                cleared_threshold: score <= self.similarity_threshold,
                attempt,
            };

            if candidate.cleared_threshold {
                info!(
                    "Similarity check passed on attempt {}/{} ({:.1}% <= {:.1}%)",
                    attempt,
                    self.max_attempts,
                    score * 100.0,
                    self.similarity_threshold * 100.0
                );
                return Ok(candidate);
            }

            warn!(
                "Attempt {}/{}: too similar to recent history ({:.1}% > {:.1}%)",
                attempt,
                self.max_attempts,
                score * 100.0,
                self.similarity_threshold * 100.0
            );
            last_failure = format!("similarity {:.1}% over threshold", score * 100.0);

            // Strict less-than keeps the earliest candidate on ties.
            if best
                .as_ref()
                .map_or(true, |b| candidate.similarity < b.similarity)
            {
                best = Some(candidate);
            }
        }

        match best {
            Some(fallback) => {
                warn!(
                    "All {} attempts exceeded the similarity threshold; committing the least \
                     similar candidate from attempt {} ({:.1}%)",
                    self.max_attempts,
                    fallback.attempt,
                    fallback.similarity * 100.0
                );
                Ok(fallback)
            }
            None => Err(GenerationError::Exhausted {
                attempts: self.max_attempts,
                last_failure,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Scripted provider: pops pre-seeded replies and embeddings in order.
    struct ScriptedProvider {
        texts: Mutex<VecDeque<anyhow::Result<String>>>,
        embeddings: Mutex<VecDeque<Vec<f32>>>,
        generate_calls: AtomicU32,
        embed_calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(texts: Vec<anyhow::Result<String>>, embeddings: Vec<Vec<f32>>) -> Arc<Self> {
            Arc::new(Self {
                texts: Mutex::new(texts.into_iter().collect()),
                embeddings: Mutex::new(embeddings.into_iter().collect()),
                generate_calls: AtomicU32::new(0),
                embed_calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl GenerationProvider for ScriptedProvider {
        async fn generate(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            self.texts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
        }

        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            self.embed_calls.fetch_add(1, Ordering::SeqCst);
            self.embeddings
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("embedding script exhausted"))
        }
    }

    fn valid_text(tag: u32) -> String {
        format!(
            "The network keeps moving while markets sleep (note {}). Every release \
             compounds on the last one.\n\nThanks to the developers and researchers \
             doing the real work.",
            tag
        )
    }

    /// A unit vector whose cosine against [1, 0] is exactly `sim`.
    fn vector_with_similarity(sim: f32) -> Vec<f32> {
        vec![sim, (1.0 - sim * sim).sqrt()]
    }

    fn history() -> Vec<(String, Vec<f32>)> {
        vec![("yesterday's message".to_string(), vec![1.0, 0.0])]
    }

    fn generator(provider: Arc<ScriptedProvider>, max_attempts: u32) -> MotdGenerator {
        MotdGenerator::new(
            provider,
            PersonaContext::new(String::new(), String::new()),
            max_attempts,
            0.85,
        )
    }

    #[tokio::test]
    async fn test_empty_history_accepts_first_attempt() {
        let provider = ScriptedProvider::new(vec![Ok(valid_text(1))], vec![vec![0.5, 0.5]]);
        let gen = generator(provider.clone(), 5);

        let result = gen.generate_with_retry(&[], &[]).await.unwrap();
        assert_eq!(result.attempt, 1);
        assert_eq!(result.similarity, 0.0);
        assert!(result.cleared_threshold);
        assert_eq!(provider.generate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_accepts_below_threshold_and_stops_calling() {
        let provider = ScriptedProvider::new(
            vec![Ok(valid_text(1)), Ok(valid_text(2)), Ok(valid_text(3))],
            vec![vector_with_similarity(0.90), vector_with_similarity(0.80)],
        );
        let gen = generator(provider.clone(), 5);

        let result = gen.generate_with_retry(&[], &history()).await.unwrap();
        assert_eq!(result.attempt, 2);
        assert!(result.cleared_threshold);
        assert!((result.similarity - 0.80).abs() < 1e-3);
        // No further provider calls after acceptance.
        assert_eq!(provider.generate_calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.embed_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fallback_commits_least_similar() {
        let sims = [0.90f32, 0.89, 0.88, 0.87, 0.86];
        let provider = ScriptedProvider::new(
            (1..=5).map(|i| Ok(valid_text(i))).collect(),
            sims.iter().map(|&s| vector_with_similarity(s)).collect(),
        );
        let gen = generator(provider.clone(), 5);

        let result = gen.generate_with_retry(&[], &history()).await.unwrap();
        assert!(!result.cleared_threshold);
        assert_eq!(result.attempt, 5);
        assert_eq!(result.content, valid_text(5));
        assert!((result.similarity - 0.86).abs() < 1e-3);
        assert_eq!(provider.generate_calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_fallback_tie_keeps_earliest_attempt() {
        let provider = ScriptedProvider::new(
            vec![Ok(valid_text(1)), Ok(valid_text(2))],
            vec![vector_with_similarity(0.90), vector_with_similarity(0.90)],
        );
        let gen = generator(provider, 2);

        let result = gen.generate_with_retry(&[], &history()).await.unwrap();
        assert_eq!(result.attempt, 1);
        assert_eq!(result.content, valid_text(1));
    }

    #[tokio::test]
    async fn test_invalid_format_consumes_budget_without_embedding() {
        let malformed = "One paragraph, no separator, and it rambles on long enough to \
                         pass the length check without ever splitting in two."
            .to_string();
        let provider = ScriptedProvider::new(
            vec![Ok(malformed), Ok(valid_text(2))],
            vec![vec![0.5, 0.5]],
        );
        let gen = generator(provider.clone(), 5);

        let result = gen.generate_with_retry(&[], &[]).await.unwrap();
        assert_eq!(result.attempt, 2);
        // The malformed candidate never reached the embedding provider.
        assert_eq!(provider.embed_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_provider_errors_exhaust_the_episode() {
        let provider = ScriptedProvider::new(
            (0..3).map(|_| Err(anyhow::anyhow!("provider down"))).collect(),
            vec![],
        );
        let gen = generator(provider.clone(), 3);

        let err = gen.generate_with_retry(&[], &history()).await.unwrap_err();
        let GenerationError::Exhausted { attempts, last_failure } = err;
        assert_eq!(attempts, 3);
        assert!(last_failure.contains("provider down"));
        assert_eq!(provider.generate_calls.load(Ordering::SeqCst), 3);
    }
}
