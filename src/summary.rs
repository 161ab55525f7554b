//! Bounded regeneration of summaries until they pass an acceptance check

use crate::config::{RetryPolicy, SummaryAcceptance};
use crate::error::{PipelineError, Result};
use crate::generators::TextGenerator;
use tracing::{debug, warn};

/// Decides whether generated text is usable. `Err` carries the reason.
pub trait AcceptancePredicate: Send + Sync {
    fn check(&self, text: &str) -> std::result::Result<(), String>;
}

impl AcceptancePredicate for SummaryAcceptance {
    fn check(&self, text: &str) -> std::result::Result<(), String> {
        let lowered = text.to_lowercase();
        if let Some(phrase) = self
            .forbidden_phrases
            .iter()
            .find(|p| lowered.contains(&p.to_lowercase()))
        {
            return Err(format!("mentions `{}`", phrase));
        }
        let words = text.split_whitespace().count();
        if words > self.max_words {
            return Err(format!("{} words, limit is {}", words, self.max_words));
        }
        if words == 0 {
            return Err("empty".to_string());
        }
        Ok(())
    }
}

impl<F> AcceptancePredicate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn check(&self, text: &str) -> std::result::Result<(), String> {
        if self(text) {
            Ok(())
        } else {
            Err("rejected by predicate".to_string())
        }
    }
}

/// Fill the summary prompt template
pub fn summary_prompt(template: &str, max_words: usize, text: &str) -> String {
    template
        .replace("{max_words}", &max_words.to_string())
        .replace("{text}", text.trim())
}

/// Call the generator until the predicate accepts or the attempt cap is hit.
/// Service failures are returned immediately.
pub async fn generate_accepted(
    generator: &dyn TextGenerator,
    model: &str,
    prompt: &str,
    predicate: &dyn AcceptancePredicate,
    retry: &RetryPolicy,
) -> Result<String> {
    let max_attempts = retry.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let text = generator.generate(model, prompt).await?;
        match predicate.check(&text) {
            Ok(()) => {
                debug!("Summary accepted on attempt {}", attempt);
                return Ok(text);
            }
            Err(reason) => {
                warn!(
                    "Summary attempt {}/{} rejected: {}",
                    attempt, max_attempts, reason
                );
            }
        }
        if attempt < max_attempts {
            tokio::time::sleep(retry.backoff_after(attempt)).await;
        }
    }

    Err(PipelineError::SummaryRejected {
        attempts: max_attempts,
    })
}
