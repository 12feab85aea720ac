//! Schema inference and evolution tracking for data files.
//!
//! This binary surveys a JSON, MongoDB export, XML, SQLite, GeoPackage or
//! protobuf file and writes a fingerprinted schema snapshot, or compares two
//! snapshots and reports breaking changes.
//!
//! # Guarantees
//! - Input files are opened read-only
//! - API keys are read from the environment and never logged
//! - Without an API key no network request is made

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use schemasurveyor_core::{
    ClassificationPipeline, DescriptionGenerator, SchemaSnapshot, SourceFormat, SurveyConfig,
    classify::SemanticOracle,
    load_snapshot,
    logging::{LogFormat, init_logging},
    parsers,
    versioning::{DiffResult, diff_snapshots},
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

/// Exit code of `diff --fail-on-breaking` when breaking changes were found
const EXIT_BREAKING: u8 = 2;

#[derive(Parser)]
#[command(name = "schemasurveyor")]
#[command(about = "Schema inference and evolution tracking for data files")]
#[command(version)]
#[command(long_about = "
SchemaSurveyor - Schema inference and evolution tracking

Infers a field-level schema from a data file: data types, semantic meaning,
PII classification and quality statistics. Snapshots are fingerprinted so
successive versions can be diffed for breaking changes.

SUPPORTED FORMATS:
- JSON (.json)
- MongoDB extended JSON (.json, with --format mongodb)
- XML with inline DTD and optional XSD (.xml)
- SQLite (.db, .sqlite, .sqlite3)
- GeoPackage (.gpkg)
- Protocol buffers (.desc, .pb, .proto)

EXAMPLES:
  schemasurveyor analyze users.json --output users.schema.json
  schemasurveyor analyze export.json --format mongodb
  schemasurveyor analyze catalog.xml --xsd catalog.xsd
  schemasurveyor diff users.v1.schema.json users.v2.schema.json
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Infer and classify the schema of a data file
    Analyze(AnalyzeArgs),
    /// Compare two schema snapshots
    Diff(DiffArgs),
    /// List supported formats
    Formats,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Data file to analyze
    #[arg(help = "Path to the data file")]
    path: PathBuf,

    /// Input format, derived from the extension when omitted
    #[arg(long, value_parser = parse_format)]
    format: Option<SourceFormat>,

    /// Companion XSD for XML input
    #[arg(long, help = "XSD schema describing the XML document")]
    xsd: Option<PathBuf>,

    /// Output file path
    #[arg(short, long, help = "Write the snapshot here instead of stdout")]
    output: Option<PathBuf>,

    /// Generate field descriptions
    #[arg(long, help = "Generate descriptions and business names for every field")]
    describe: bool,

    /// Ask the description backend to label unclassified fields
    #[arg(long)]
    use_ai_semantics: bool,

    #[command(flatten)]
    ai: AiArgs,
}

#[derive(Args)]
struct AiArgs {
    /// Description backend API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Description backend base URL
    #[arg(long, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,

    /// Description backend model
    #[arg(long, env = "OPENAI_MODEL")]
    model: Option<String>,
}

#[derive(Args)]
struct DiffArgs {
    /// Older snapshot
    old: PathBuf,

    /// Newer snapshot
    new: PathBuf,

    /// Output file path
    #[arg(short, long, help = "Write the diff here instead of stdout")]
    output: Option<PathBuf>,

    /// Order changes by field path instead of by change type
    #[arg(long)]
    sort_by_path: bool,

    /// Exit with status 2 when a breaking change is found
    #[arg(long)]
    fail_on_breaking: bool,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(
        short,
        long,
        global = true,
        help = "Suppress all output except errors"
    )]
    quiet: bool,

    /// Configuration file
    #[arg(long, global = true, help = "JSON configuration file")]
    config: Option<PathBuf>,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Text)]
    log_format: LogFormatArg,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormatArg {
    /// Human readable lines
    Text,
    /// Newline-delimited JSON
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

fn parse_format(value: &str) -> Result<SourceFormat, String> {
    value.parse::<SourceFormat>().map_err(|_| {
        let names: Vec<&str> = SourceFormat::ALL.iter().map(SourceFormat::as_str).collect();
        format!("expected one of: {}", names.join(", "))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_format.into())?;

    let config = load_config(cli.global.config.as_deref())?;

    match &cli.command {
        Command::Analyze(args) => {
            analyze(args, config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Diff(args) => diff(args).await,
        Command::Formats => {
            list_formats();
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SurveyConfig> {
    match path {
        Some(path) => {
            let config = SurveyConfig::from_file(path)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        None => Ok(SurveyConfig::default()),
    }
}

/// Applies command-line and environment overrides to the AI section.
fn apply_ai_overrides(config: &mut SurveyConfig, args: &AnalyzeArgs) {
    let mut ai = std::mem::take(&mut config.ai);
    if let Some(key) = args.ai.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        ai = ai.with_api_key(key);
    }
    if let Some(base_url) = &args.ai.base_url {
        ai = ai.with_base_url(base_url.clone());
    }
    if let Some(model) = &args.ai.model {
        ai = ai.with_model(model.clone());
    }
    if args.use_ai_semantics {
        ai = ai.with_ai_semantics(true);
    }
    config.ai = ai;
}

/// Parses, classifies and optionally describes one file.
async fn analyze(args: &AnalyzeArgs, mut config: SurveyConfig) -> anyhow::Result<()> {
    apply_ai_overrides(&mut config, args);

    let format = match args.format {
        Some(format) => format,
        None => SourceFormat::from_path(&args.path).ok_or_else(|| {
            anyhow!(
                "Cannot determine format of {}; pass --format",
                args.path.display()
            )
        })?,
    };
    if args.xsd.is_some() && format != SourceFormat::Xml {
        warn!("--xsd is only used for XML input; ignoring it");
    }

    info!("Analyzing {} as {}", args.path.display(), format);
    let result = parsers::parse(&args.path, format, &config, args.xsd.as_deref())
        .await
        .with_context(|| format!("Failed to parse {}", args.path.display()))?;

    let generator = if args.describe || config.ai.use_ai_semantics {
        Some(Arc::new(DescriptionGenerator::new(config.ai.clone())?))
    } else {
        None
    };

    let mut pipeline = ClassificationPipeline::new()?;
    if config.ai.use_ai_semantics
        && let Some(generator) = &generator
    {
        let oracle: Arc<dyn SemanticOracle> = generator.clone();
        pipeline = pipeline.with_oracle(oracle);
    }

    let source_name = args
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.path.display().to_string());
    let mut snapshot = pipeline.build_snapshot(source_name, result).await;

    if let Some(generator) = &generator {
        if args.describe {
            generator.describe_snapshot(&mut snapshot).await;
        }
        let metrics = generator.metrics().await;
        info!(
            "Description backend: {} requests, {} cached, {} failed, {} tokens",
            metrics.total_requests,
            metrics.cached_requests,
            metrics.failed_requests,
            metrics.total_tokens
        );
    }

    write_json(&snapshot, args.output.as_deref()).await?;
    if let Some(output) = &args.output {
        print_snapshot_summary(&snapshot, output);
    }
    Ok(())
}

fn print_snapshot_summary(snapshot: &SchemaSnapshot, output: &Path) {
    println!("Schema analysis completed successfully");
    println!("Output: {}", output.display());
    println!("Format: {}", snapshot.source_format);
    println!("Records: {}", snapshot.total_records);
    println!("Fields: {}", snapshot.summary.total_fields);
    println!(
        "PII fields: {} ({:.2}%)",
        snapshot.summary.pii_fields, snapshot.summary.pii_percentage
    );
    println!("Schema hash: {}", snapshot.schema_hash);
}

/// Compares two persisted snapshots.
async fn diff(args: &DiffArgs) -> anyhow::Result<ExitCode> {
    let old = read_snapshot(&args.old).await?;
    let new = read_snapshot(&args.new).await?;

    if old.has_same_schema(&new) {
        info!("Snapshots share schema hash {}", old.schema_hash);
    }

    let mut result = diff_snapshots(&old, &new);
    if args.sort_by_path {
        result = result.sorted_by_path();
    }

    write_json(&result, args.output.as_deref()).await?;
    if args.output.is_some() {
        print_diff_summary(&result);
    }

    if args.fail_on_breaking && result.has_breaking_changes() {
        warn!(
            "{} breaking changes between {} and {}",
            result.summary.breaking_changes,
            args.old.display(),
            args.new.display()
        );
        return Ok(ExitCode::from(EXIT_BREAKING));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_diff_summary(result: &DiffResult) {
    println!("Fields added: {}", result.summary.fields_added);
    println!("Fields removed: {}", result.summary.fields_removed);
    println!("Fields modified: {}", result.summary.fields_modified);
    println!("Breaking changes: {}", result.summary.breaking_changes);
}

async fn read_snapshot(path: &Path) -> anyhow::Result<SchemaSnapshot> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    load_snapshot(&json).with_context(|| format!("Invalid snapshot {}", path.display()))
}

/// Writes pretty JSON to `output`, or to stdout when no path is given.
async fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("JSON serialization failed")?;
    match output {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write to {}", path.display()))?;
            info!("Output written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn format_available(format: SourceFormat) -> bool {
    match format {
        SourceFormat::Sqlite | SourceFormat::Geopackage => cfg!(feature = "sqlite"),
        SourceFormat::Protobuf => cfg!(feature = "protobuf"),
        SourceFormat::Json | SourceFormat::Mongodb | SourceFormat::Xml => true,
    }
}

fn list_formats() {
    println!("Supported formats:");
    for format in SourceFormat::ALL {
        let status = if format_available(format) {
            ""
        } else {
            " [not compiled in]"
        };
        println!(
            "  {:<12} .{}{}",
            format.as_str(),
            format.extensions().join(", ."),
            status
        );
    }
}
