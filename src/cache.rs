//! Disk-backed memoization of generation calls.
//!
//! The store is consulted before every network call; an existing entry is
//! returned as-is, which makes an interrupted run resumable at no cost for
//! units already done. Calls are sequential, so there is no per-key lock.

use crate::blob_store::KeyValueBlobStore;
use crate::config::RetryPolicy;
use crate::error::Result;
use crate::generators::TextGenerator;
use crate::summary::{generate_accepted, AcceptancePredicate};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

pub const FULL_SUFFIX: &str = "llama.txt";
pub const SUMMARY_SUFFIX: &str = "llama-sm.txt";
pub const STORY_SUFFIX: &str = "story.txt";

/// `<base>-<suffix>`, e.g. `data_2024-01-01T00-00-00.1-llama.txt`
pub fn derived_key(base: &str, suffix: &str) -> String {
    format!("{}-{}", base, suffix)
}

/// SHA-256 of the prompt, for prompt-keyed entries
pub fn content_key(prompt: &str, suffix: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    format!("{}-{}", hex::encode(hasher.finalize()), suffix)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cached {
    pub text: String,
    pub outcome: CacheOutcome,
}

impl Cached {
    pub fn is_hit(&self) -> bool {
        self.outcome == CacheOutcome::Hit
    }
}

pub struct AugmentationCache {
    store: Arc<dyn KeyValueBlobStore>,
    generator: Arc<dyn TextGenerator>,
    model: String,
}

impl AugmentationCache {
    pub fn new(
        store: Arc<dyn KeyValueBlobStore>,
        generator: Arc<dyn TextGenerator>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            generator,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Return the stored entry for `key`, or run `generate`, persist its
    /// output and return it. A failed generation stores nothing.
    pub async fn get_or_insert_with<F, Fut>(&self, key: &str, generate: F) -> Result<Cached>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        if let Some(text) = self.store.get(key)? {
            debug!("Cache hit: {}", key);
            return Ok(Cached {
                text,
                outcome: CacheOutcome::Hit,
            });
        }

        let text = generate().await?;
        if !self.store.put_if_absent(key, &text)? {
            warn!("{} was written while generating; keeping the stored entry", key);
            if let Some(existing) = self.store.get(key)? {
                return Ok(Cached {
                    text: existing,
                    outcome: CacheOutcome::Hit,
                });
            }
        }
        debug!("Cached new generation: {}", key);
        Ok(Cached {
            text,
            outcome: CacheOutcome::Generated,
        })
    }

    /// Single generation call keyed by `key`
    pub async fn generate(&self, key: &str, prompt: &str) -> Result<Cached> {
        self.get_or_insert_with(key, || self.generator.generate(&self.model, prompt))
            .await
    }

    /// Generation that is repeated until `predicate` accepts it
    pub async fn generate_accepted(
        &self,
        key: &str,
        prompt: &str,
        predicate: &dyn AcceptancePredicate,
        retry: &RetryPolicy,
    ) -> Result<Cached> {
        self.get_or_insert_with(key, || {
            generate_accepted(self.generator.as_ref(), &self.model, prompt, predicate, retry)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::{FsBlobStore, MemoryBlobStore};
    use crate::error::PipelineError;
    use crate::generators::MockTextGen;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_keys() {
        assert_eq!(derived_key("data_x", FULL_SUFFIX), "data_x-llama.txt");
        assert_eq!(derived_key("data_x", SUMMARY_SUFFIX), "data_x-llama-sm.txt");

        let a = content_key("tell a story", STORY_SUFFIX);
        assert_eq!(a, content_key("tell a story", STORY_SUFFIX));
        assert_ne!(a, content_key("tell another story", STORY_SUFFIX));
        assert!(a.ends_with("-story.txt"));
        assert_eq!(a.len(), 64 + "-story.txt".len());
    }

    #[test]
    fn test_second_call_is_free() {
        let gen = Arc::new(MockTextGen::echo());
        let cache = AugmentationCache::new(Arc::new(MemoryBlobStore::new()), gen.clone(), "m");

        let first = tokio_test::block_on(cache.generate("k-llama.txt", "why jump?")).unwrap();
        let second = tokio_test::block_on(cache.generate("k-llama.txt", "why jump?")).unwrap();

        assert_eq!(first.text, second.text);
        assert_eq!(first.outcome, CacheOutcome::Generated);
        assert!(second.is_hit());
        assert_eq!(gen.calls(), 1);
    }

    #[tokio::test]
    async fn test_resume_from_disk() {
        let dir = TempDir::new().unwrap();
        let gen = Arc::new(MockTextGen::new(["reasoning A"]));

        let store = Arc::new(FsBlobStore::new(dir.path()).unwrap());
        let cache = AugmentationCache::new(store, gen.clone(), "m");
        cache.generate("a-llama.txt", "prompt").await.unwrap();

        // a fresh cache over the same directory, as after a restart
        let store = Arc::new(FsBlobStore::new(dir.path()).unwrap());
        let cache = AugmentationCache::new(store, gen.clone(), "m");
        let again = cache.generate("a-llama.txt", "prompt").await.unwrap();

        assert_eq!(again.text, "reasoning A");
        assert!(again.is_hit());
        assert_eq!(gen.calls(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let store = Arc::new(MemoryBlobStore::new());
        let cache = AugmentationCache::new(store.clone(), Arc::new(MockTextGen::failing()), "m");
        let err = cache.generate("k", "p").await.unwrap_err();
        assert!(matches!(err, PipelineError::Service(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_accepted_generation_is_cached() {
        let gen = Arc::new(MockTextGen::new(["too long a summary", "short"]));
        let cache = AugmentationCache::new(Arc::new(MemoryBlobStore::new()), gen.clone(), "m");
        let retry = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        };
        let short_enough = |t: &str| t.split_whitespace().count() == 1;

        let first = cache
            .generate_accepted("k-llama-sm.txt", "p", &short_enough, &retry)
            .await
            .unwrap();
        let second = cache
            .generate_accepted("k-llama-sm.txt", "p", &short_enough, &retry)
            .await
            .unwrap();
        assert_eq!(first.text, "short");
        assert_eq!(second.text, "short");
        assert_eq!(gen.calls(), 2);
    }
}
