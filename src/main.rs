//! iwbridge CLI
//!
//! Command-line interface for batch conversion, container inspection and
//! catalog maintenance.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, info, warn};

use iwbridge_catalog::{AssetCatalog, SqliteCatalog};
use iwbridge_core::{AssetId, AssetKind};
use iwbridge_parsers::logging::{self, LogConfig};
use iwbridge_parsers::{
    load_file, AssetDescription, ContainerParser, PackParser, ParseOptions, Parser as ParserTrait,
    SourceAsset,
};
use iwbridge_pipeline::{
    AssetState, BatchResult, CancellationToken, MismatchPolicy, Pipeline, TargetConfig, TracingSink,
};

/// iwbridge - converts foreign engine asset containers into host-native assets
#[derive(Parser)]
#[command(name = "iwbridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format for structured data
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert containers, pack archives or directories of either
    Convert(ConvertArgs),

    /// Describe a container or pack archive without converting it
    Inspect(InspectArgs),

    /// Query or edit the asset catalog
    Catalog(CatalogArgs),

    /// Print the effective configuration as TOML
    Config(ConfigArgs),
}

/// Options shared by every command that builds a `TargetConfig`
#[derive(Args)]
struct ConfigSource {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory (overrides `output_dir`)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Catalog database (overrides `catalog_path`)
    #[arg(long)]
    db: Option<PathBuf>,
}

impl ConfigSource {
    fn load(&self) -> Result<TargetConfig> {
        let mut config = match &self.config {
            Some(path) => TargetConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => TargetConfig::default(),
        };
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(db) = &self.db {
            config.catalog_path = Some(db.clone());
        }
        Ok(config)
    }
}

#[derive(Args)]
struct ConvertArgs {
    /// Source files or directories
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    #[command(flatten)]
    source: ConfigSource,

    /// Number of worker threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Reconvert even when the catalog records the same hash
    #[arg(long)]
    force: bool,

    /// Keep recorded artifacts when a source changed instead of reconverting
    #[arg(long)]
    keep_on_mismatch: bool,

    /// Write report.json into the output directory
    #[arg(long)]
    report: bool,
}

#[derive(Args)]
struct InspectArgs {
    /// Container or pack archive
    path: PathBuf,

    /// List chunk directory entries
    #[arg(long)]
    chunks: bool,
}

#[derive(Args)]
struct CatalogArgs {
    #[command(flatten)]
    source: ConfigSource,

    #[command(subcommand)]
    action: CatalogAction,
}

#[derive(Subcommand)]
enum CatalogAction {
    /// List recorded assets
    List {
        /// Only this kind (texture, mesh, audio, physics)
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Show catalog totals
    Stats,

    /// Forget an asset
    Remove {
        /// Source identifier, e.g. `props/rock`
        id: String,

        /// Also delete its artifact files
        #[arg(long)]
        delete_artifacts: bool,
    },
}

#[derive(Args)]
struct ConfigArgs {
    #[command(flatten)]
    source: ConfigSource,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&LogConfig::from_verbosity(cli.verbose));

    let outcome = match cli.command {
        Commands::Convert(args) => cmd_convert(args, cli.format),
        Commands::Inspect(args) => cmd_inspect(args, cli.format),
        Commands::Catalog(args) => cmd_catalog(args, cli.format).map(|_| ExitCode::SUCCESS),
        Commands::Config(args) => cmd_config(args).map(|_| ExitCode::SUCCESS),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn print_structured<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        _ => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

fn cmd_convert(args: ConvertArgs, format: OutputFormat) -> Result<ExitCode> {
    let mut config = args.source.load()?;
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    config.force |= args.force;
    config.write_report |= args.report;
    if args.keep_on_mismatch {
        config.on_hash_mismatch = MismatchPolicy::Keep;
    }

    info!(
        output = %config.output_dir.display(),
        workers = config.worker_count(),
        "Starting conversion"
    );
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if interrupt(&handler_token) {
            std::process::exit(130);
        }
    }) {
        warn!(error = %e, "Ctrl-C will not cancel the batch");
    }

    let pipeline = Pipeline::new(config)
        .context("Failed to prepare conversion")?
        .with_sink(std::sync::Arc::new(TracingSink))
        .with_cancellation(cancel);
    let result = pipeline.run(&args.paths)?;

    match format {
        OutputFormat::Text => print_batch(&result),
        _ => print_structured(&result, format)?,
    }

    Ok(if result.cancelled > 0 {
        ExitCode::from(130)
    } else if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

/// Ctrl-C handling: the first press cancels the batch at the next stage
/// boundary, a second one asks for immediate exit (returns `true`)
fn interrupt(token: &CancellationToken) -> bool {
    if token.is_cancelled() {
        return true;
    }
    eprintln!("Interrupted, finishing in-flight stages (Ctrl-C again to abort)");
    token.cancel();
    false
}

fn print_batch(result: &BatchResult) {
    for report in &result.reports {
        match &report.state {
            AssetState::Failed { kind, message, .. } => {
                println!("FAILED    {:<40} [{}] {}", report.id.as_str(), kind, message)
            }
            AssetState::Done => {
                for warning in &report.warnings {
                    println!("WARNING   {:<40} {}", report.id.as_str(), warning);
                }
                debug!(asset = %report.id, artifacts = report.artifacts.len(), "Converted");
            }
            _ => {}
        }
    }

    println!("Conversion complete in {} ms:", result.elapsed_ms);
    println!("  Succeeded: {}", result.succeeded);
    println!("  Skipped:   {}", result.skipped);
    println!("  Failed:    {}", result.failed);
    if result.cancelled > 0 {
        println!("  Cancelled: {}", result.cancelled);
    }
}

fn cmd_inspect(args: InspectArgs, format: OutputFormat) -> Result<ExitCode> {
    let path = &args.path;
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }

    let options = ParseOptions::default();
    if PackParser::new().can_parse(path) {
        show_pack(path, &options, format)?;
        return Ok(ExitCode::SUCCESS);
    }
    if !ContainerParser::new().can_parse(path) {
        debug!("No parser claims {}, trying it as a container", path.display());
    }

    let data = load_file(path, &options).with_context(|| format!("Failed to read {}", path.display()))?;
    let id = AssetId::new(
        path.file_stem()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default(),
    );
    let asset = SourceAsset::read(id, data, &options)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let description = asset.describe()?;

    match format {
        OutputFormat::Text => print_description(&description, args.chunks)?,
        _ => print_structured(&description, format)?,
    }
    Ok(ExitCode::SUCCESS)
}

fn print_description(desc: &AssetDescription, chunks: bool) -> Result<()> {
    println!("Container: {}", desc.id);
    println!("  Kind:      {}", desc.kind);
    println!("  Version:   {}", desc.version);
    println!("  Size:      {}", format_size(desc.bytes as u64));
    println!("  Hash:      {}", desc.hash);
    println!("  Up axis:   {:?}", desc.meta.up_axis);
    if !desc.meta.author.is_empty() {
        println!("  Author:    {}", desc.meta.author);
    }

    if chunks {
        println!("\n{:<6} {:>5} {:>10} {:>10} {:>10} {}", "Tag", "Index", "Offset", "Length", "Decoded", "Codec");
        println!("{:-<6} {:->5} {:->10} {:->10} {:->10} {:-<8}", "", "", "", "", "", "");
        for chunk in &desc.chunks {
            println!(
                "{:<6} {:>5} {:>10} {:>10} {:>10} {}",
                chunk.tag, chunk.index, chunk.offset, chunk.length, chunk.decoded_length, chunk.compression
            );
        }
    } else {
        println!("  Chunks:    {}", desc.chunks.len());
    }

    println!("\nRecord:");
    for line in serde_yaml::to_string(&desc.record)?.lines() {
        println!("  {line}");
    }
    Ok(())
}

fn show_pack(path: &Path, options: &ParseOptions, format: OutputFormat) -> Result<()> {
    let archive = PackParser::new()
        .parse_file_with_options(path, options)
        .with_context(|| format!("Failed to parse pack {}", path.display()))?;
    let stats = archive.statistics();

    match format {
        OutputFormat::Text => {
            println!("Pack: {}", path.display());
            println!("  Files:              {}", stats.file_count);
            println!("  Directories:        {}", stats.directory_count);
            println!("  Uncompressed size:  {}", format_size(stats.total_uncompressed));
            println!("  Compressed size:    {}", format_size(stats.total_compressed));
            println!("  Compression ratio:  {:.2}%", stats.compression_ratio * 100.0);
            println!();
            for entry in archive.files() {
                let info = entry.info();
                println!("{:<12} {:<8} {}", format_size(info.uncompressed_size), info.method, info.path);
            }
        }
        _ => {
            let entries: Vec<_> = archive.files().map(|e| e.info()).collect();
            let value = serde_json::json!({
                "path": path,
                "statistics": stats,
                "entries": entries,
            });
            print_structured(&value, format)?;
        }
    }
    Ok(())
}

fn cmd_catalog(args: CatalogArgs, format: OutputFormat) -> Result<()> {
    let config = args.source.load()?;
    let db = config.catalog_path();
    if !db.exists() {
        bail!("No catalog at {}", db.display());
    }
    let catalog = SqliteCatalog::open(&db, config.output_dir.clone())
        .with_context(|| format!("Failed to open catalog {}", db.display()))?;

    match args.action {
        CatalogAction::List { kind } => {
            let kind = match kind.as_deref() {
                Some(name) => match AssetKind::parse(name) {
                    Some(kind) => Some(kind),
                    None => bail!("Unknown asset kind: {name}"),
                },
                None => None,
            };
            let entries = catalog.list(kind)?;
            match format {
                OutputFormat::Text => {
                    println!("{:<10} {:<12} {:<20} {}", "Kind", "Hash", "Converted", "Source -> Artifact");
                    println!("{:-<10} {:-<12} {:-<20} {:-<40}", "", "", "", "");
                    for entry in &entries {
                        println!(
                            "{:<10} {:<12} {:<20} {} -> {}",
                            entry.kind.as_str(),
                            entry.content_hash.short(12),
                            entry.converted_at.format("%Y-%m-%d %H:%M:%S"),
                            entry.source_id,
                            entry.artifact_path.display()
                        );
                    }
                    println!("\nTotal: {} entries", entries.len());
                }
                _ => print_structured(&entries, format)?,
            }
        }
        CatalogAction::Stats => {
            let stats = catalog.stats()?;
            match format {
                OutputFormat::Text => {
                    println!("Catalog: {}", db.display());
                    println!("  Entries:        {}", stats.total);
                    println!("  Artifact bytes: {}", format_size(stats.total_bytes));
                    println!("  Schema:         {}", stats.schema_version);
                    if let Some(last) = stats.last_converted {
                        println!("  Last converted: {}", last.format("%Y-%m-%d %H:%M:%S"));
                    }
                    for (kind, count) in &stats.by_kind {
                        println!("  {kind:<15} {count}");
                    }
                }
                _ => print_structured(&stats, format)?,
            }
        }
        CatalogAction::Remove { id, delete_artifacts } => {
            let id = AssetId::new(id);
            match catalog.remove(&id, delete_artifacts)? {
                Some(entry) => println!("Removed {} ({} artifact(s))", entry.source_id, entry.artifacts.len()),
                None => bail!("{id} is not in the catalog"),
            }
        }
    }
    Ok(())
}

fn cmd_config(args: ConfigArgs) -> Result<()> {
    let config = args.source.load()?;
    print!("{}", config.to_toml()?);
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
