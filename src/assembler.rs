//! Turning window text plus generated annotations into training records

use crate::action::{render_action_block, render_bare_action, split};
use crate::config::{CategoryCaps, PromptConfig};
use crate::error::Result;
use crate::types::{AugmentedText, RecordVariant, TrainingRecord};
use std::collections::HashMap;
use tracing::debug;

pub struct SampleAssembler {
    prompts: PromptConfig,
    variants: Vec<RecordVariant>,
}

impl SampleAssembler {
    pub fn new(prompts: PromptConfig, variants: &[RecordVariant]) -> Self {
        // records always come out as full, brief, prediction
        let variants = RecordVariant::ALL
            .into_iter()
            .filter(|v| variants.contains(v))
            .collect();
        Self { prompts, variants }
    }

    pub fn variants(&self) -> &[RecordVariant] {
        &self.variants
    }

    fn prefix_for(&self, variant: RecordVariant) -> &str {
        match variant {
            RecordVariant::Full => &self.prompts.full_prefix,
            RecordVariant::Brief => &self.prompts.brief_prefix,
            RecordVariant::Prediction => &self.prompts.prediction_prefix,
        }
    }

    /// Up to one record per enabled variant. Brief is skipped when no
    /// summary was produced.
    pub fn assemble(
        &self,
        window_text: &str,
        augmented: &AugmentedText,
    ) -> Vec<(RecordVariant, TrainingRecord)> {
        let action_block = render_action_block(&self.prompts.action_lead_in, &augmented.action_only);
        let mut records = Vec::with_capacity(self.variants.len());

        for &variant in &self.variants {
            let gpt = match variant {
                RecordVariant::Full => {
                    format!("{}{}", augmented.full_response.trim_end(), action_block)
                }
                RecordVariant::Brief => match &augmented.summary_response {
                    Some(summary) => format!("{}{}", summary.trim_end(), action_block),
                    None => {
                        debug!("No summary available; skipping brief record");
                        continue;
                    }
                },
                RecordVariant::Prediction => render_bare_action(&augmented.action_only),
            };
            let human = format!("{}{}", self.prefix_for(variant), window_text.trim_end());
            records.push((variant, TrainingRecord::new(human, gpt)));
        }

        records
    }

    /// Record from a raw window with no generated text: state on the human
    /// side, its own trailing action on the gpt side
    pub fn split_record(&self, text: &str) -> Result<TrainingRecord> {
        let (state, action) = split(text)?;
        Ok(TrainingRecord::new(
            format!("{}{}", self.prompts.full_prefix, state.trim()),
            action.trim(),
        ))
    }
}

/// Per-label counter enforcing [`CategoryCaps`]
#[derive(Debug, Default)]
pub struct CategoryBudget {
    caps: CategoryCaps,
    used: HashMap<String, usize>,
}

impl CategoryBudget {
    pub fn new(caps: CategoryCaps) -> Self {
        Self {
            caps,
            used: HashMap::new(),
        }
    }

    /// Take one slot for `label`; `false` once its cap is reached.
    /// Unlabeled units are never capped.
    pub fn try_claim(&mut self, label: Option<&str>) -> bool {
        let Some(label) = label else {
            return true;
        };
        let used = self.used.entry(label.to_string()).or_insert(0);
        match self.caps.cap_for(label) {
            Some(cap) if *used >= cap => false,
            _ => {
                *used += 1;
                true
            }
        }
    }

    /// Give back a slot taken by [`try_claim`](Self::try_claim)
    pub fn release(&mut self, label: Option<&str>) {
        if let Some(used) = label.and_then(|l| self.used.get_mut(l)) {
            *used = used.saturating_sub(1);
        }
    }

    pub fn used(&self, label: &str) -> usize {
        self.used.get(label).copied().unwrap_or(0)
    }
}
