//! gamestate-synth command line

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gamestate_synth::{
    balance, build_window_dataset, export_windows, AugmentMode, BalanceConfig, CategoryCaps,
    ChatMlTemplate, Dataset, FunctionIndex, OllamaGen, Pipeline, PipelineConfig,
    PipelineError, RecordVariant, ServiceConfig, ServiceErrorPolicy, UntimestampedPolicy,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "gamestate-synth",
    version,
    about = "Build LLM training corpora from recorded game-state snapshots"
)]
struct Cli {
    /// Base URL of the Ollama-compatible generation service
    #[arg(long, global = true, env = "OLLAMA_URL", default_value = gamestate_synth::DEFAULT_OLLAMA_URL)]
    ollama_url: String,

    /// Per-request timeout for the generation service; 0 disables it
    #[arg(long, global = true, default_value_t = 300)]
    request_timeout_secs: u64,

    /// Seed for sampling; random when omitted
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    #[arg(long, default_value = "./input")]
    input_dir: PathBuf,

    /// Snapshots per window [default: 1 for augment, 3 otherwise]
    #[arg(long)]
    window_size: Option<i64>,

    /// Drop snapshot files without a timestamp instead of failing
    #[arg(long)]
    exclude_untimestamped: bool,
}

#[derive(Args)]
struct DatasetArgs {
    #[arg(long, default_value = "./output")]
    output_dir: PathBuf,

    #[arg(long, default_value = "dataset")]
    dataset_name: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate reasoning for each window and assemble training records
    Augment {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        dataset: DatasetArgs,

        #[arg(long, default_value = "./output/llama")]
        cache_dir: PathBuf,

        /// Only augment snapshots containing this text
        #[arg(long)]
        keyword: Option<String>,

        #[arg(long, default_value = gamestate_synth::DEFAULT_MODEL)]
        model: String,

        /// First-person narrative instead of step-by-step reasoning
        #[arg(long)]
        story: bool,

        #[arg(long, value_delimiter = ',', default_value = "full,brief,prediction")]
        variants: Vec<String>,

        /// Maximum augmented units per function label
        #[arg(long)]
        category_cap: Option<usize>,

        #[arg(long, requires = "dominant_cap")]
        dominant_category: Option<String>,

        #[arg(long, requires = "dominant_category")]
        dominant_cap: Option<usize>,

        #[arg(long, default_value_t = 5)]
        max_summary_attempts: u32,

        #[arg(long)]
        abort_on_service_error: bool,
    },

    /// Records straight from snapshot windows, no generation
    Windows {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        dataset: DatasetArgs,

        /// Also emit one record per window member
        #[arg(long)]
        intermediates: bool,
    },

    /// Write each window's combined text to its own file
    ExportWindows {
        #[command(flatten)]
        input: InputArgs,

        #[arg(long, default_value = "./output/windows")]
        out_dir: PathBuf,
    },

    /// Function-balanced subset of a saved dataset
    Balance {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Name of the balanced dataset
        #[arg(long, default_value = "dataset-balanced")]
        output_name: String,

        /// Records per function label; 0 keeps everything
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Sample functions from a saved dataset with their first prompt
    Inspect {
        #[command(flatten)]
        dataset: DatasetArgs,

        #[arg(long, default_value_t = 10)]
        samples: usize,
    },
}

/// Augmentation runs on single snapshots unless told otherwise
const AUGMENT_WINDOW_SIZE: i64 = 1;
const WINDOW_SIZE: i64 = 3;

impl InputArgs {
    fn config(&self, default_window_size: i64) -> anyhow::Result<PipelineConfig> {
        let window_size = self.window_size.unwrap_or(default_window_size);
        Ok(PipelineConfig {
            input_dir: self.input_dir.clone(),
            window_size: gamestate_synth::window::window_size_from(window_size)?,
            untimestamped: if self.exclude_untimestamped {
                UntimestampedPolicy::Exclude
            } else {
                UntimestampedPolicy::Fail
            },
            ..Default::default()
        })
    }
}

impl DatasetArgs {
    fn path(&self) -> PathBuf {
        self.output_dir.join(&self.dataset_name)
    }
}

/// A missing input directory is reported, not raised
fn input_present<T>(result: gamestate_synth::Result<T>) -> anyhow::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(PipelineError::InputDirMissing(dir)) => {
            eprintln!("❌ Input directory {} not found", dir.display());
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    println!("🎮 gamestate-synth {}", env!("CARGO_PKG_VERSION"));
    println!();

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    match &cli.command {
        Commands::Augment {
            input,
            dataset,
            cache_dir,
            keyword,
            model,
            story,
            variants,
            category_cap,
            dominant_category,
            dominant_cap,
            max_summary_attempts,
            abort_on_service_error,
        } => {
            let mut config = input.config(AUGMENT_WINDOW_SIZE)?;
            config.cache_dir = cache_dir.clone();
            config.dataset_dir = dataset.path();
            config.keyword = keyword.clone();
            config.model = model.clone();
            if *story {
                config.mode = AugmentMode::Story;
            }
            config.variants = variants
                .iter()
                .map(|v| v.parse::<RecordVariant>())
                .collect::<gamestate_synth::Result<Vec<_>>>()?;
            config.category_caps = CategoryCaps {
                default_cap: *category_cap,
                ..Default::default()
            };
            if let (Some(label), Some(cap)) = (dominant_category, dominant_cap) {
                config.category_caps.overrides.insert(label.clone(), *cap);
            }
            config.retry.max_attempts = *max_summary_attempts;
            if *abort_on_service_error {
                config.on_service_error = ServiceErrorPolicy::Abort;
            }

            let service = ServiceConfig {
                base_url: cli.ollama_url.clone(),
                request_timeout: (cli.request_timeout_secs > 0)
                    .then(|| Duration::from_secs(cli.request_timeout_secs)),
            };
            println!("✓ Generation service: {}", service.base_url);
            println!("✓ Model: {}", config.model);
            println!("✓ Cache: {}", config.cache_dir.display());

            let generator = Arc::new(OllamaGen::new(&service)?);
            let Some(pipeline) = input_present(Pipeline::with_fs_cache(config, generator))? else {
                return Ok(());
            };

            let (records, stats) = pipeline.build_augmented_dataset().await?;
            pipeline.save(&records)?;

            println!();
            println!("✓ {} record(s) from {} unit(s)", stats.records, stats.units);
            println!(
                "   generated: {}, cached: {}, end of timeline: {}, capped: {}, failed: {}",
                stats.generated,
                stats.cache_hits,
                stats.excluded_end_of_timeline,
                stats.skipped_category_cap,
                stats.skipped_service_failure
            );
            println!("✓ Saved to {}", pipeline.config().dataset_dir.display());
        }

        Commands::Windows {
            input,
            dataset,
            intermediates,
        } => {
            let config = input.config(WINDOW_SIZE)?;
            let Some(records) =
                input_present(build_window_dataset(&config, *intermediates, &ChatMlTemplate))?
            else {
                return Ok(());
            };
            records.save(&dataset.path(), &ChatMlTemplate)?;
            println!("✓ {} record(s) saved to {}", records.len(), dataset.path().display());
        }

        Commands::ExportWindows { input, out_dir } => {
            let config = input.config(WINDOW_SIZE)?;
            let Some(written) = input_present(export_windows(&config, out_dir))? else {
                return Ok(());
            };
            println!("✓ {} window file(s) written to {}", written.len(), out_dir.display());
        }

        Commands::Balance {
            dataset,
            output_name,
            limit,
        } => {
            let source = Dataset::load(&dataset.path())
                .with_context(|| format!("loading {}", dataset.path().display()))?;
            let picked = balance(&source, &BalanceConfig::with_limit(*limit), &mut rng);
            let balanced = source.select(&picked)?;

            let target = dataset.output_dir.join(output_name);
            balanced.save(&target, &ChatMlTemplate)?;
            println!(
                "✓ Balanced {} record(s) down to {}, saved to {}",
                source.len(),
                balanced.len(),
                target.display()
            );
        }

        Commands::Inspect { dataset, samples } => {
            let source = Dataset::load(&dataset.path())
                .with_context(|| format!("loading {}", dataset.path().display()))?;
            let index = FunctionIndex::from_dataset(&source);
            println!("✓ {} function(s) in {} record(s)", index.len(), source.len());

            for (label, idx) in index.sample(*samples, &mut rng) {
                let record = &source.entries()[idx].conversations;
                println!();
                println!("── {} (record {})", label, idx);
                println!("{}", record.human());
                println!("── expected");
                println!("{}", record.assistant());
            }
        }
    }

    Ok(())
}
