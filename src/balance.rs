//! Function-stratified sampling over assembled records

use crate::action::{function_label, function_section};
use crate::config::BalanceConfig;
use crate::dataset::Dataset;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use tracing::{debug, info};

/// Distinct function labels in first-seen order
fn labels_in_order<S: AsRef<str>>(assistant_texts: &[S]) -> Vec<String> {
    let mut seen = Vec::new();
    for text in assistant_texts {
        if let Some(label) = function_label(text.as_ref()) {
            if !seen.iter().any(|l: &String| l == label) {
                seen.push(label.to_string());
            }
        }
    }
    seen
}

fn quota(limit: usize, fraction: f64) -> usize {
    if limit == 0 {
        return usize::MAX;
    }
    (limit as f64 * fraction).ceil() as usize
}

/// Walk a fresh shuffle of every index, keeping up to `limit` that satisfy `matches`
fn draw<R, F>(total: usize, limit: usize, rng: &mut R, matches: F) -> Vec<usize>
where
    R: Rng + ?Sized,
    F: Fn(usize) -> bool,
{
    let mut order: Vec<usize> = (0..total).collect();
    order.shuffle(rng);
    order
        .into_iter()
        .filter(|&i| matches(i))
        .take(limit)
        .collect()
}

/// Select a quota-respecting subset of record indices.
///
/// Each label gets its own full shuffle; labels with sub-quotas draw once per
/// sub-quota instead. The result follows label order then shuffle order, and
/// an index may appear more than once when it matches several labels.
pub fn balance_texts<S, R>(assistant_texts: &[S], config: &BalanceConfig, rng: &mut R) -> Vec<usize>
where
    S: AsRef<str>,
    R: Rng + ?Sized,
{
    let sections: Vec<&str> = assistant_texts
        .iter()
        .map(|t| function_section(t.as_ref()).unwrap_or(""))
        .collect();
    let total = sections.len();
    let mut selected = Vec::new();

    for label in labels_in_order(assistant_texts) {
        let with_label = |i: usize| sections[i].contains(label.as_str());

        match config.sub_quotas.get(&label) {
            Some(quotas) => {
                for sub in quotas {
                    let picked = draw(total, quota(config.limit, sub.fraction), rng, |i| {
                        with_label(i) && sections[i].contains(sub.token.as_str())
                    });
                    debug!("{}/{}: {} selected", label, sub.token, picked.len());
                    selected.extend(picked);
                }
            }
            None => {
                let picked = draw(total, quota(config.limit, 1.0), rng, with_label);
                debug!("{}: {} selected", label, picked.len());
                selected.extend(picked);
            }
        }
    }

    info!("Balanced {} records down to {}", total, selected.len());
    selected
}

/// [`balance_texts`] over a dataset's assistant turns
pub fn balance<R: Rng + ?Sized>(dataset: &Dataset, config: &BalanceConfig, rng: &mut R) -> Vec<usize> {
    let texts: Vec<&str> = dataset.entries().iter().map(|e| e.conversations.assistant()).collect();
    balance_texts(&texts, config, rng)
}

/// First record index per function label
#[derive(Debug, Clone, Default)]
pub struct FunctionIndex {
    labels: Vec<(String, usize)>,
    positions: HashMap<String, usize>,
}

impl FunctionIndex {
    pub fn build<S: AsRef<str>>(assistant_texts: &[S]) -> Self {
        let mut index = Self::default();
        for (i, text) in assistant_texts.iter().enumerate() {
            let Some(label) = function_label(text.as_ref()) else {
                continue;
            };
            if !index.positions.contains_key(label) {
                index.positions.insert(label.to_string(), index.labels.len());
                index.labels.push((label.to_string(), i));
            }
        }
        index
    }

    pub fn from_dataset(dataset: &Dataset) -> Self {
        let texts: Vec<&str> = dataset.entries().iter().map(|e| e.conversations.assistant()).collect();
        Self::build(&texts)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|(l, _)| l.as_str())
    }

    pub fn first_index(&self, label: &str) -> Option<usize> {
        self.positions.get(label).map(|&p| self.labels[p].1)
    }

    /// Up to `n` random (label, first index) pairs
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<(&str, usize)> {
        let mut picks: Vec<(&str, usize)> = self.labels.iter().map(|(l, i)| (l.as_str(), *i)).collect();
        picks.shuffle(rng);
        picks.truncate(n);
        picks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn answer(function: &str, extra: &str) -> String {
        format!(
            "Reasoning...\n\n```yml\naction:\n  function: {}\n{}```",
            function, extra
        )
    }

    fn count_label(texts: &[String], picked: &[usize], label: &str) -> usize {
        picked
            .iter()
            .filter(|&&i| function_label(&texts[i]) == Some(label))
            .count()
    }

    #[test]
    fn test_exhausted_label_keeps_all() {
        let mut texts: Vec<String> = (0..50).map(|_| answer("mine_block", "")).collect();
        texts.extend((0..3).map(|_| answer("craft_item", "")));

        let mut rng = StdRng::seed_from_u64(7);
        let picked = balance_texts(&texts, &BalanceConfig::with_limit(10), &mut rng);

        assert_eq!(picked.len(), 13);
        assert_eq!(count_label(&texts, &picked, "mine_block"), 10);
        assert_eq!(count_label(&texts, &picked, "craft_item"), 3);
        // label order, not dataset order
        assert!(picked[..10].iter().all(|&i| i < 50));
    }

    #[test]
    fn test_move_sub_quotas() {
        let mut texts = Vec::new();
        for direction in ["forward", "left", "right", "backward"] {
            for _ in 0..20 {
                texts.push(answer("move", &format!("  direction: {}\n", direction)));
            }
        }

        let mut rng = StdRng::seed_from_u64(1);
        let picked = balance_texts(&texts, &BalanceConfig::with_limit(10), &mut rng);

        let with_token =
            |token: &str| picked.iter().filter(|&&i| texts[i].contains(token)).count();
        assert_eq!(with_token("forward"), 10);
        assert_eq!(with_token("left"), 2);
        assert_eq!(with_token("right"), 2);
        assert_eq!(with_token("backward"), 2);
    }

    #[test]
    fn test_zero_limit_is_unlimited() {
        let texts: Vec<String> = (0..25).map(|_| answer("attack", "")).collect();
        let mut rng = StdRng::seed_from_u64(3);
        let picked = balance_texts(&texts, &BalanceConfig::with_limit(0), &mut rng);
        assert_eq!(picked.len(), 25);
    }

    #[test]
    fn test_same_seed_same_selection() {
        let texts: Vec<String> = (0..40).map(|_| answer("attack", "")).collect();
        let config = BalanceConfig::with_limit(5);
        let a = balance_texts(&texts, &config, &mut StdRng::seed_from_u64(11));
        let b = balance_texts(&texts, &config, &mut StdRng::seed_from_u64(11));
        assert_eq!(a, b);
    }

    #[test]
    fn test_function_index() {
        let texts = vec![
            answer("move", ""),
            "no action here".to_string(),
            answer("craft_item", ""),
            answer("move", ""),
        ];
        let index = FunctionIndex::build(&texts);
        assert_eq!(index.len(), 2);
        assert_eq!(index.labels().collect::<Vec<_>>(), vec!["move", "craft_item"]);
        assert_eq!(index.first_index("craft_item"), Some(2));
        assert_eq!(index.first_index("attack"), None);

        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(index.sample(10, &mut rng).len(), 2);
        assert_eq!(index.sample(1, &mut rng).len(), 1);
    }
}
