//! Configuration values passed into each pipeline component at construction

use crate::types::RecordVariant;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_MODEL: &str = "llama3.1";

/// What to do with snapshot files whose names carry no timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UntimestampedPolicy {
    #[default]
    Fail,
    Exclude,
}

/// What to do when the generation service fails for one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceErrorPolicy {
    #[default]
    SkipAndLog,
    Abort,
}

/// Which kind of long-form text the generation service is asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AugmentMode {
    /// Step-by-step reasoning, cached under the snapshot's derived name
    #[default]
    Reasoning,
    /// First-person narrative, cached under a hash of the prompt
    Story,
}

/// Generation endpoint settings
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub base_url: String,
    pub request_timeout: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            request_timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// Prompt text and instruction prefixes. `{data}` and `{text}` are substituted.
#[derive(Debug, Clone)]
pub struct PromptConfig {
    pub reasoning: String,
    pub story: String,
    pub summary: String,
    pub full_prefix: String,
    pub brief_prefix: String,
    pub prediction_prefix: String,
    pub action_lead_in: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            reasoning: "Act as an expert Minecraft player who can understand a player's actions by viewing the game state at the time the action was given. I will provide you with the game state and the action taken in YAML form, and you will tell me why a player may have taken the given action using your knowledge of Minecraft and the game state, be highly detailed and provide your reasoning step by step for the sample data below:\n\n{data}\n\n".to_string(),
            story: "Act as a Minecraft player describing your own play session. Using the game state history below, tell in the first person what you have been doing and what you mean to do next:\n\n{data}\n\n".to_string(),
            summary: "Rewrite the following reasoning about a Minecraft player's next move as a short explanation of at most {max_words} words. Write the explanation itself, without mentioning that it has been shortened or limited in length:\n\n{text}\n\n".to_string(),
            full_prefix: "Below I have provided a short history of minecraft game data and player actions, act as an expert minecraft player and suggest the next appropriate action to be taken next based on the game data provided.\n\n".to_string(),
            brief_prefix: "Below I have provided a short history of minecraft game data and player actions, act as an expert minecraft player and suggest the next appropriate action to be taken next based on the game data provided. Be brief.\n\n".to_string(),
            prediction_prefix: "Below I have provided a short history of minecraft game data and player actions, act as an expert minecraft player and suggest the next appropriate action to be taken next based on the game data provided. Only return the predicted action.\n\n".to_string(),
            action_lead_in: "Given my analysis above the next predicted action would be".to_string(),
        }
    }
}

/// Content rules a summary must satisfy before it is accepted
#[derive(Debug, Clone)]
pub struct SummaryAcceptance {
    pub forbidden_phrases: Vec<String>, // matched case-insensitively
    pub max_words: usize,
}

impl Default for SummaryAcceptance {
    fn default() -> Self {
        Self {
            forbidden_phrases: [
                "summary",
                "summarize",
                "summarized",
                "summarizing",
                "word limit",
                "words or less",
                "words or fewer",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_words: 100,
        }
    }
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1` (attempts count from 1)
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Upper bound on augmented units drawn per function label
#[derive(Debug, Clone, Default)]
pub struct CategoryCaps {
    pub default_cap: Option<usize>,
    pub overrides: HashMap<String, usize>,
}

impl CategoryCaps {
    pub fn cap_for(&self, label: &str) -> Option<usize> {
        self.overrides.get(label).copied().or(self.default_cap)
    }

    pub fn is_unbounded(&self) -> bool {
        self.default_cap.is_none() && self.overrides.is_empty()
    }
}

/// Secondary quota for one label, keyed by a substring of the action text
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuota {
    pub token: String,
    pub fraction: f64,
}

impl SubQuota {
    pub fn new(token: impl Into<String>, fraction: f64) -> Self {
        Self {
            token: token.into(),
            fraction,
        }
    }
}

/// Balanced sampler settings
#[derive(Debug, Clone)]
pub struct BalanceConfig {
    pub limit: usize, // 0 means unlimited
    pub sub_quotas: HashMap<String, Vec<SubQuota>>,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        let mut sub_quotas = HashMap::new();
        sub_quotas.insert(
            "move".to_string(),
            vec![
                SubQuota::new("left", 0.2),
                SubQuota::new("right", 0.2),
                SubQuota::new("forward", 1.0),
                SubQuota::new("backward", 0.2),
            ],
        );
        Self {
            limit: 100,
            sub_quotas,
        }
    }
}

impl BalanceConfig {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
}

/// Everything the augmentation pipeline needs for one run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub dataset_dir: PathBuf,
    pub snapshot_extension: String,
    pub window_size: usize,
    pub keyword: Option<String>,
    pub model: String,
    pub mode: AugmentMode,
    pub variants: Vec<RecordVariant>,
    pub category_caps: CategoryCaps,
    pub untimestamped: UntimestampedPolicy,
    pub on_service_error: ServiceErrorPolicy,
    pub prompts: PromptConfig,
    pub summary: SummaryAcceptance,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./input"),
            cache_dir: PathBuf::from("./output/llama"),
            dataset_dir: PathBuf::from("./output/dataset"),
            snapshot_extension: "yaml".to_string(),
            window_size: 3,
            keyword: None,
            model: DEFAULT_MODEL.to_string(),
            mode: AugmentMode::default(),
            variants: RecordVariant::ALL.to_vec(),
            category_caps: CategoryCaps::default(),
            untimestamped: UntimestampedPolicy::default(),
            on_service_error: ServiceErrorPolicy::default(),
            prompts: PromptConfig::default(),
            summary: SummaryAcceptance::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn wants(&self, variant: RecordVariant) -> bool {
        self.variants.contains(&variant)
    }
}
