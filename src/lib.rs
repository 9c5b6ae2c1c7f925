//! Visionmanifest: dataset manifests for computer-vision annotations.
//!
//! Annotation documents for a dozen task types (classification, detection,
//! captioning, matting, regression, text matching, retrieval, VQA, visual
//! grounding, key-value pairs, and multitask compositions of these) are
//! ingested into one manifest model, transformed by structural operations,
//! and exported back to the same document shape.
//!
//! # Modules
//!
//! - [`manifest`]: the data model (images, categories, labels, datasets)
//! - [`adaptor`]: ingestion and export per task type
//! - [`ops`]: merge, split, sample, spawn, weights, filter, category removal
//! - [`stats`]: category counts and the inspect report
//! - [`error`]: error types

pub mod adaptor;
pub mod error;
pub mod manifest;
pub mod ops;
pub mod stats;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use adaptor::{write_document, AdaptorRegistry, ExportOptions, IngestOptions};
use manifest::{AnyManifest, BBoxFormat, DatasetManifest, KeyValuePairSchema, TaskType};
use ops::{
    BalancedInstanceWeightsGenerator, BalancedWeightsConfig, MultiImageLabelMerge,
    NoAnnotationFilter, OperationRegistry, RemoveCategories, SampleByNumSamplesConfig,
    SampleByRatioConfig, SampleConfig, SampleFewShotConfig, SpawnConfig, SplitConfig,
};

pub use error::ManifestError;

/// The visionmanifest CLI application.
#[derive(Parser)]
#[command(name = "visionmanifest")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print image, label and category counts for a document.
    Inspect(InspectArgs),
    /// Split a document into two category-balanced parts.
    Split(SplitArgs),
    /// Sample images from a document.
    Sample(SampleArgs),
    /// Merge documents of the same task type.
    Merge(MergeArgs),
    /// Oversample a document up to a target number of images.
    Spawn(SpawnArgs),
    /// Compute per-image balancing weights.
    Weights(WeightsArgs),
    /// Delete categories and the labels that use them.
    RemoveCategories(RemoveCategoriesArgs),
    /// Drop images without labels (negative annotations for key-value-pair documents).
    Filter(FilterArgs),
}

/// How to read input documents.
#[derive(clap::Args)]
struct SourceArgs {
    /// Task type of the documents (e.g. 'object_detection', 'multitask', 'kvp').
    #[arg(long)]
    task: TaskType,

    /// Field schema for key-value-pair documents.
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Directory or URL prefixed to image paths on read and stripped on write.
    #[arg(long)]
    base_dir: Option<String>,
}

/// How to write the resulting document.
#[derive(clap::Args)]
struct OutputArgs {
    /// Output document.
    #[arg(short, long)]
    output: PathBuf,

    /// Box format for written documents ('ltwh' or 'ltrb').
    #[arg(long, default_value = "ltwh")]
    bbox_format: BBoxFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

#[derive(clap::Args)]
struct InspectArgs {
    input: PathBuf,

    #[command(flatten)]
    source: SourceArgs,

    /// Output format for the report.
    #[arg(long, value_enum, default_value = "text")]
    format: ReportFormat,
}

#[derive(clap::Args)]
struct SplitArgs {
    input: PathBuf,

    #[command(flatten)]
    source: SourceArgs,

    /// Share of images that goes to the first output.
    #[arg(long, default_value_t = 0.8)]
    ratio: f64,

    #[arg(long, env = "VISIONMANIFEST_SEED", default_value_t = 0)]
    seed: u64,

    /// First output document.
    #[arg(long)]
    first: PathBuf,

    /// Second output document.
    #[arg(long)]
    second: PathBuf,

    /// Box format for written documents ('ltwh' or 'ltrb').
    #[arg(long, default_value = "ltwh")]
    bbox_format: BBoxFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SampleStrategyArg {
    NumSamples,
    FewShot,
    Ratio,
}

#[derive(clap::Args)]
struct SampleArgs {
    input: PathBuf,

    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    output: OutputArgs,

    #[arg(long, value_enum)]
    strategy: SampleStrategyArg,

    /// Number of images (num-samples).
    #[arg(long)]
    n_samples: Option<usize>,

    /// Allow an image to be drawn more than once (num-samples).
    #[arg(long)]
    with_replacement: bool,

    /// Draw by balanced category weights (num-samples).
    #[arg(long)]
    balanced: bool,

    /// Minimum instances per category (few-shot).
    #[arg(long)]
    n_shots: Option<usize>,

    /// Share of each category bucket to keep (ratio).
    #[arg(long)]
    ratio: Option<f64>,

    #[arg(long, env = "VISIONMANIFEST_SEED", default_value_t = 0)]
    seed: u64,
}

#[derive(clap::Args)]
struct MergeArgs {
    /// Input documents, merged in order.
    #[arg(required = true, num_args = 2..)]
    inputs: Vec<PathBuf>,

    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(clap::Args)]
struct SpawnArgs {
    input: PathBuf,

    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    output: OutputArgs,

    /// Number of images to reach.
    #[arg(long)]
    target_size: usize,

    /// Draw extra images by balanced category weights instead of uniformly.
    #[arg(long)]
    balanced: bool,

    #[arg(long, env = "VISIONMANIFEST_SEED", default_value_t = 0)]
    seed: u64,
}

#[derive(clap::Args)]
struct WeightsArgs {
    input: PathBuf,

    #[command(flatten)]
    source: SourceArgs,

    /// Use raw multipliers instead of their square roots.
    #[arg(long)]
    hard: bool,

    #[arg(long, default_value_t = 0.2)]
    weight_lower: f64,

    #[arg(long, default_value_t = 5.0)]
    weight_upper: f64,

    /// Write the weights here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args)]
struct RemoveCategoriesArgs {
    input: PathBuf,

    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    output: OutputArgs,

    /// Category names to delete (comma-separated or repeated).
    #[arg(long, value_delimiter = ',', required = true)]
    names: Vec<String>,
}

#[derive(clap::Args)]
struct FilterArgs {
    input: PathBuf,

    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    output: OutputArgs,
}

/// Run the visionmanifest CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), ManifestError> {
    let cli = Cli::parse();
    let adaptors = AdaptorRegistry::standard();
    let operations = OperationRegistry::standard();

    match cli.command {
        Some(Commands::Inspect(args)) => run_inspect(args, &adaptors),
        Some(Commands::Split(args)) => run_split(args, &adaptors),
        Some(Commands::Sample(args)) => run_sample(args, &adaptors, &operations),
        Some(Commands::Merge(args)) => run_merge(args, &adaptors, &operations),
        Some(Commands::Spawn(args)) => run_spawn(args, &adaptors),
        Some(Commands::Weights(args)) => run_weights(args, &adaptors),
        Some(Commands::RemoveCategories(args)) => run_remove_categories(args, &adaptors),
        Some(Commands::Filter(args)) => run_filter(args, &adaptors),
        None => {
            println!("visionmanifest {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Dataset manifests for computer-vision annotations.");
            println!();
            println!("Run 'visionmanifest --help' for usage information.");
            Ok(())
        }
    }
}

fn load(
    path: &Path,
    source: &SourceArgs,
    adaptors: &AdaptorRegistry,
) -> Result<AnyManifest, ManifestError> {
    let mut options = IngestOptions {
        base_dir: source.base_dir.clone(),
        schema: None,
    };
    if let Some(schema_path) = &source.schema {
        let text = std::fs::read_to_string(schema_path)?;
        options.schema = Some(KeyValuePairSchema::from_json_str(&text)?);
    }
    adaptors.ingest_path(source.task, path, &options)
}

fn load_single_image(
    path: &Path,
    source: &SourceArgs,
    adaptors: &AdaptorRegistry,
) -> Result<DatasetManifest, ManifestError> {
    load(path, source, adaptors)?.into_single_image()
}

fn save(
    manifest: &AnyManifest,
    path: &Path,
    bbox_format: BBoxFormat,
    source: &SourceArgs,
    adaptors: &AdaptorRegistry,
) -> Result<(), ManifestError> {
    let options = ExportOptions {
        bbox_format,
        base_dir: source.base_dir.clone(),
    };
    let document = adaptors.export_document(manifest, &options)?;
    write_document(path, &document)
}

fn save_output(
    manifest: AnyManifest,
    output: &OutputArgs,
    source: &SourceArgs,
    adaptors: &AdaptorRegistry,
) -> Result<(), ManifestError> {
    save(&manifest, &output.output, output.bbox_format, source, adaptors)?;
    println!(
        "Wrote {} images to {}",
        manifest.len(),
        output.output.display()
    );
    Ok(())
}

fn run_inspect(args: InspectArgs, adaptors: &AdaptorRegistry) -> Result<(), ManifestError> {
    let manifest = load(&args.input, &args.source, adaptors)?;
    let report = stats::stats_manifest(&manifest);
    match args.format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Text => print!("{}", report),
    }
    Ok(())
}

fn run_split(args: SplitArgs, adaptors: &AdaptorRegistry) -> Result<(), ManifestError> {
    let manifest = load_single_image(&args.input, &args.source, adaptors)?;
    let (first, second) = ops::split(
        &manifest,
        &SplitConfig {
            ratio: args.ratio,
            seed: args.seed,
        },
    )?;
    save(&first.into(), &args.first, args.bbox_format, &args.source, adaptors)?;
    let second: AnyManifest = second.into();
    save(&second, &args.second, args.bbox_format, &args.source, adaptors)?;
    println!(
        "Split {} images: {} -> {}, {} -> {}",
        manifest.len(),
        manifest.len() - second.len(),
        args.first.display(),
        second.len(),
        args.second.display()
    );
    Ok(())
}

fn required<T>(value: Option<T>, flag: &str, strategy: &str) -> Result<T, ManifestError> {
    value.ok_or_else(|| {
        ManifestError::precondition(format!("{} is required for {} sampling", flag, strategy))
    })
}

fn run_sample(
    args: SampleArgs,
    adaptors: &AdaptorRegistry,
    operations: &OperationRegistry,
) -> Result<(), ManifestError> {
    let manifest = load(&args.input, &args.source, adaptors)?;

    let sampled: AnyManifest = match (args.strategy, manifest) {
        (SampleStrategyArg::NumSamples, AnyManifest::MultiImage(m)) => {
            let config = SampleByNumSamplesConfig {
                n_samples: required(args.n_samples, "--n-samples", "num-samples")?,
                with_replacement: args.with_replacement,
                weights: None,
                seed: args.seed,
            };
            ops::sample_multi_image_by_num_samples(&m, &config)?.into()
        }
        (_, AnyManifest::MultiImage(_)) => {
            return Err(ManifestError::precondition(
                "multi-image documents only support num-samples sampling",
            ))
        }
        (strategy, AnyManifest::SingleImage(m)) => {
            let config = match strategy {
                SampleStrategyArg::NumSamples => {
                    let weights = if args.balanced {
                        Some(BalancedInstanceWeightsGenerator::default().generate(&m)?)
                    } else {
                        None
                    };
                    SampleConfig::NumSamples(SampleByNumSamplesConfig {
                        n_samples: required(args.n_samples, "--n-samples", "num-samples")?,
                        with_replacement: args.with_replacement,
                        weights,
                        seed: args.seed,
                    })
                }
                SampleStrategyArg::FewShot => SampleConfig::FewShot(SampleFewShotConfig {
                    n_shots: required(args.n_shots, "--n-shots", "few-shot")?,
                    seed: args.seed,
                }),
                SampleStrategyArg::Ratio => SampleConfig::Ratio(SampleByRatioConfig {
                    ratio: required(args.ratio, "--ratio", "ratio")?,
                    seed: args.seed,
                }),
            };
            operations.sample(&m, &config)?.into()
        }
    };

    save_output(sampled, &args.output, &args.source, adaptors)
}

fn run_merge(
    args: MergeArgs,
    adaptors: &AdaptorRegistry,
    operations: &OperationRegistry,
) -> Result<(), ManifestError> {
    let manifests = args
        .inputs
        .iter()
        .map(|path| load(path, &args.source, adaptors))
        .collect::<Result<Vec<_>, _>>()?;

    let merged: AnyManifest = if args.source.task.is_multi_image() {
        let inputs = manifests
            .into_iter()
            .map(AnyManifest::into_multi_image)
            .collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<_> = inputs.iter().collect();
        MultiImageLabelMerge.merge(&refs)?.into()
    } else {
        let inputs = manifests
            .into_iter()
            .map(AnyManifest::into_single_image)
            .collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<_> = inputs.iter().collect();
        operations.merge(&refs)?.into()
    };

    save_output(merged, &args.output, &args.source, adaptors)
}

fn run_spawn(args: SpawnArgs, adaptors: &AdaptorRegistry) -> Result<(), ManifestError> {
    let manifest = load_single_image(&args.input, &args.source, adaptors)?;
    let spawned = ops::spawn(
        &manifest,
        &SpawnConfig {
            target_size: args.target_size,
            instance_weights: None,
            balanced: args.balanced.then(BalancedWeightsConfig::default),
            seed: args.seed,
        },
    )?;
    save_output(spawned.into(), &args.output, &args.source, adaptors)
}

fn run_weights(args: WeightsArgs, adaptors: &AdaptorRegistry) -> Result<(), ManifestError> {
    let manifest = load_single_image(&args.input, &args.source, adaptors)?;
    let generator = BalancedInstanceWeightsGenerator::new(BalancedWeightsConfig {
        soft: !args.hard,
        weight_lower: args.weight_lower,
        weight_upper: args.weight_upper,
    });
    let weights = generator.generate(&manifest)?;
    let text = serde_json::to_string_pretty(&weights)?;
    match &args.output {
        Some(path) => std::fs::write(path, text)?,
        None => println!("{}", text),
    }
    Ok(())
}

fn run_remove_categories(
    args: RemoveCategoriesArgs,
    adaptors: &AdaptorRegistry,
) -> Result<(), ManifestError> {
    let manifest = load_single_image(&args.input, &args.source, adaptors)?;
    let names = args
        .names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty());
    let result = RemoveCategories::new(names).apply(&manifest)?;
    save_output(result.into(), &args.output, &args.source, adaptors)
}

fn run_filter(args: FilterArgs, adaptors: &AdaptorRegistry) -> Result<(), ManifestError> {
    let filtered: AnyManifest = match load(&args.input, &args.source, adaptors)? {
        AnyManifest::SingleImage(m) => ops::filter_images(&m, &NoAnnotationFilter).into(),
        AnyManifest::MultiImage(m) => ops::filter_negative_annotations(&m).into(),
    };
    save_output(filtered, &args.output, &args.source, adaptors)
}
