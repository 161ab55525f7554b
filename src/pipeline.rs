//! End-to-end synthesis: timeline, work units, augmentation, assembly

use crate::action::{function_label, split};
use crate::assembler::{CategoryBudget, SampleAssembler};
use crate::blob_store::{FsBlobStore, KeyValueBlobStore};
use crate::cache::{
    content_key, derived_key, AugmentationCache, Cached, FULL_SUFFIX, STORY_SUFFIX,
    SUMMARY_SUFFIX,
};
use crate::config::{AugmentMode, PipelineConfig, ServiceErrorPolicy};
use crate::dataset::{ChatMlTemplate, ChatTemplate, Dataset, DatasetEntry};
use crate::error::{PipelineError, Result};
use crate::generators::TextGenerator;
use crate::keyword;
use crate::snapshot_store::SnapshotStore;
use crate::summary::summary_prompt;
use crate::timeline::TimelineIndex;
use crate::types::{AugmentedText, FilteredPair, RecordVariant, RunStats, Snapshot, Window};
use crate::window;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One input to augment: some text plus the snapshot whose action follows it
struct WorkUnit {
    key_base: String,
    text: String,
    next: Snapshot,
}

impl WorkUnit {
    fn from_window(window: &Window, next: &Snapshot) -> Self {
        Self {
            key_base: window_name(window),
            text: window.text(),
            next: next.clone(),
        }
    }

    fn from_pair(pair: &FilteredPair) -> Result<Self> {
        Ok(Self {
            key_base: pair.snapshot.stem().to_string(),
            text: pair.snapshot.read()?,
            next: pair.next.clone(),
        })
    }
}

/// Stem of a single snapshot, or `combined_<first>_to_<last>` for wider windows
fn window_name(window: &Window) -> String {
    if window.size() == 1 {
        window.first().stem().to_string()
    } else {
        format!(
            "combined_{}_to_{}",
            window.first().stem(),
            window.last().stem()
        )
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    store: SnapshotStore,
    cache: AugmentationCache,
    assembler: SampleAssembler,
    template: Box<dyn ChatTemplate>,
}

impl Pipeline {
    /// Fails with `InputDirMissing` when the input directory does not exist
    pub fn new(
        config: PipelineConfig,
        generator: Arc<dyn TextGenerator>,
        blobs: Arc<dyn KeyValueBlobStore>,
    ) -> Result<Self> {
        let store = Self::open_input(&config)?;
        Ok(Self::from_parts(config, store, generator, blobs))
    }

    /// Like [`new`](Self::new), caching into an [`FsBlobStore`] at
    /// `config.cache_dir`. Nothing is created on disk when the input
    /// directory is missing.
    pub fn with_fs_cache(config: PipelineConfig, generator: Arc<dyn TextGenerator>) -> Result<Self> {
        let store = Self::open_input(&config)?;
        let blobs = Arc::new(FsBlobStore::new(&config.cache_dir)?);
        Ok(Self::from_parts(config, store, generator, blobs))
    }

    fn open_input(config: &PipelineConfig) -> Result<SnapshotStore> {
        if config.window_size < 1 {
            return Err(PipelineError::InvalidArgument(
                "window size must be at least 1, got 0".to_string(),
            ));
        }
        SnapshotStore::open(&config.input_dir, config.snapshot_extension.clone())
    }

    fn from_parts(
        config: PipelineConfig,
        store: SnapshotStore,
        generator: Arc<dyn TextGenerator>,
        blobs: Arc<dyn KeyValueBlobStore>,
    ) -> Self {
        info!(
            "Pipeline ready: input={}, generator={}, model={}",
            store.dir().display(),
            generator.name(),
            config.model
        );
        let cache = AugmentationCache::new(blobs, generator, config.model.clone());
        let assembler = SampleAssembler::new(config.prompts.clone(), &config.variants);

        Self {
            config,
            store,
            cache,
            assembler,
            template: Box::new(ChatMlTemplate),
        }
    }

    pub fn with_template(mut self, template: Box<dyn ChatTemplate>) -> Self {
        self.template = template;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn timeline(&self) -> Result<TimelineIndex> {
        self.store.timeline(self.config.untimestamped)
    }

    /// Augment every unit and assemble its records.
    ///
    /// Without a keyword, units are sliding windows paired with the snapshot
    /// after each window; a window at the end of the timeline is excluded.
    /// With a keyword, units are the matching snapshots paired with their
    /// successors, and a match at the end of the timeline is fatal.
    pub async fn build_augmented_dataset(&self) -> Result<(Dataset, RunStats)> {
        let start = Instant::now();
        let timeline = self.timeline()?;
        let mut run = Run {
            dataset: Dataset::new(),
            stats: RunStats::default(),
            budget: CategoryBudget::new(self.config.category_caps.clone()),
        };

        match self.config.keyword.as_deref() {
            Some(keyword) => {
                let matches = keyword::select(&timeline, keyword)?;
                let pairs = keyword::pair_with_successors(&timeline, &matches)?;
                info!("Augmenting {} keyword match(es)", pairs.len());
                for pair in &pairs {
                    let unit = WorkUnit::from_pair(pair)?;
                    self.process_unit(&unit, &mut run).await?;
                }
            }
            None => {
                timeline.require_len(self.config.window_size)?;
                info!(
                    "Augmenting {} window(s) of size {}",
                    window::window_count(timeline.len(), self.config.window_size),
                    self.config.window_size
                );
                for window in
                    window::generate(timeline.snapshots(), self.config.window_size, false)?
                        .windows_only()
                {
                    let window = window?;
                    match timeline.successor_of(window.last()) {
                        Some(next) => {
                            let unit = WorkUnit::from_window(&window, next);
                            self.process_unit(&unit, &mut run).await?;
                        }
                        None => {
                            debug!("{} ends the timeline; excluded", window.last());
                            run.stats.excluded_end_of_timeline += 1;
                        }
                    }
                }
            }
        }

        let stats = run.stats;
        info!(
            "Augmentation finished in {:?}: units={}, generated={}, cache_hits={}, end_of_timeline={}, capped={}, service_failures={}, records={}",
            start.elapsed(),
            stats.units,
            stats.generated,
            stats.cache_hits,
            stats.excluded_end_of_timeline,
            stats.skipped_category_cap,
            stats.skipped_service_failure,
            stats.records
        );
        Ok((run.dataset, stats))
    }

    /// Save under the configured dataset directory
    pub fn save(&self, dataset: &Dataset) -> Result<()> {
        dataset.save(&self.config.dataset_dir, self.template.as_ref())
    }

    async fn process_unit(&self, unit: &WorkUnit, run: &mut Run) -> Result<()> {
        run.stats.units += 1;

        let next_text = unit.next.read()?;
        let (_, action) = split(&next_text)?;

        let label = function_label(action);
        if !run.budget.try_claim(label) {
            debug!("{}: category cap reached, skipping", unit.key_base);
            run.stats.skipped_category_cap += 1;
            return Ok(());
        }

        let augmented = match self.augment(unit, action, &mut run.stats).await {
            Ok(augmented) => augmented,
            Err(e)
                if e.is_transient()
                    && self.config.on_service_error == ServiceErrorPolicy::SkipAndLog =>
            {
                warn!("Skipping {}: {}", unit.key_base, e);
                // skipped units do not count against the cap
                run.budget.release(label);
                run.stats.skipped_service_failure += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for (variant, record) in self.assembler.assemble(&unit.text, &augmented) {
            debug!("{}: {} record", unit.key_base, variant.name());
            run.dataset
                .push(DatasetEntry::new(record, self.template.as_ref()));
            run.stats.records += 1;
        }
        Ok(())
    }

    async fn augment(
        &self,
        unit: &WorkUnit,
        action: &str,
        stats: &mut RunStats,
    ) -> Result<AugmentedText> {
        let variants = self.assembler.variants();
        let wants_brief = variants.contains(&RecordVariant::Brief);
        let wants_reasoning = wants_brief || variants.contains(&RecordVariant::Full);

        let mut augmented = AugmentedText {
            action_only: action.to_string(),
            ..Default::default()
        };
        if !wants_reasoning {
            return Ok(augmented);
        }

        let prompts = &self.config.prompts;
        let data = unit.text.trim_end();
        let full = match self.config.mode {
            AugmentMode::Reasoning => {
                let prompt = prompts.reasoning.replace("{data}", data);
                self.cache
                    .generate(&derived_key(&unit.key_base, FULL_SUFFIX), &prompt)
                    .await?
            }
            AugmentMode::Story => {
                let prompt = prompts.story.replace("{data}", data);
                self.cache
                    .generate(&content_key(&prompt, STORY_SUFFIX), &prompt)
                    .await?
            }
        };
        tally(stats, &full);

        if wants_brief {
            let prompt = summary_prompt(&prompts.summary, self.config.summary.max_words, &full.text);
            let key = match self.config.mode {
                AugmentMode::Reasoning => derived_key(&unit.key_base, SUMMARY_SUFFIX),
                AugmentMode::Story => content_key(&prompt, SUMMARY_SUFFIX),
            };
            let summary = self
                .cache
                .generate_accepted(&key, &prompt, &self.config.summary, &self.config.retry)
                .await?;
            tally(stats, &summary);
            augmented.summary_response = Some(summary.text);
        }

        augmented.full_response = full.text;
        Ok(augmented)
    }
}

struct Run {
    dataset: Dataset,
    stats: RunStats,
    budget: CategoryBudget,
}

fn tally(stats: &mut RunStats, cached: &Cached) {
    if cached.is_hit() {
        stats.cache_hits += 1;
    } else {
        stats.generated += 1;
    }
}

/// Records straight from raw windows, no generation. Each window (and each
/// member when `emit_intermediates` is set) is split at its last action.
pub fn build_window_dataset(
    config: &PipelineConfig,
    emit_intermediates: bool,
    template: &dyn ChatTemplate,
) -> Result<Dataset> {
    let store = SnapshotStore::open(&config.input_dir, config.snapshot_extension.clone())?;
    let timeline = store.timeline(config.untimestamped)?;
    timeline.require_len(config.window_size)?;

    let assembler = SampleAssembler::new(config.prompts.clone(), &config.variants);
    let mut dataset = Dataset::new();
    for item in window::generate(timeline.snapshots(), config.window_size, emit_intermediates)? {
        let record = assembler.split_record(&item?.text())?;
        dataset.push(DatasetEntry::new(record, template));
    }

    info!(
        "Built {} record(s) from {} snapshot(s), window size {}",
        dataset.len(),
        timeline.len(),
        config.window_size
    );
    Ok(dataset)
}

/// Write each window's text to `combined_<first>_to_<last>.<ext>` under `out_dir`
pub fn export_windows(config: &PipelineConfig, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let store = SnapshotStore::open(&config.input_dir, config.snapshot_extension.clone())?;
    let timeline = store.timeline(config.untimestamped)?;
    timeline.require_len(config.window_size)?;
    fs::create_dir_all(out_dir).map_err(|e| PipelineError::io(out_dir, e))?;

    let mut written = Vec::new();
    for window in window::generate(timeline.snapshots(), config.window_size, false)?.windows_only() {
        let window = window?;
        let path = out_dir.join(format!(
            "combined_{}_to_{}.{}",
            window.first().stem(),
            window.last().stem(),
            config.snapshot_extension
        ));
        fs::write(&path, window.text()).map_err(|e| PipelineError::io(&path, e))?;
        written.push(path);
    }

    info!("Exported {} window(s) to {}", written.len(), out_dir.display());
    Ok(written)
}
