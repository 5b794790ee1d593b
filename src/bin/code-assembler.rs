//! # code-assembler CLI
//!
//! Command-line front end for the code-assembler library.
//!
//! ## Usage
//! ```bash
//! # Assemble Python and TOML files under src/ into codebase.md
//! code-assembler assemble src -e py toml
//!
//! # Only the files changed since an earlier snapshot
//! code-assembler assemble src -e py --since codebase.md -o delta.md
//!
//! # Preview, then rebuild a tree from a snapshot
//! code-assembler rebuild codebase.md -o restored --dry-run
//! code-assembler rebuild codebase.md -o restored
//!
//! # What is inside a snapshot
//! code-assembler inspect codebase.md
//! ```

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::{Args, Parser, Subcommand};
use code_assembler::config::{self, DEFAULT_OUTPUT_FILE};
use code_assembler::utils::{format_bytes, format_number};
use code_assembler::{
    compute_delta, parse_file, Assembler, AssemblerConfig, AssemblerError, AssemblyStats,
    DeltaResult, FileTracker, ManifestOrigin, PlanAction, ProgressCallback, ProgressInfo,
    RebuildConfig, Rebuilder,
};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Assemble source trees into one Markdown snapshot and rebuild them
#[derive(Parser)]
#[command(name = "code-assembler")]
#[command(version)]
#[command(about = "Assemble source trees into one LLM-ready Markdown snapshot, and rebuild them")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble files into a snapshot document
    #[command(alias = "a")]
    Assemble {
        #[command(flatten)]
        scan: ScanArgs,

        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only include files changed since this snapshot
        #[arg(short, long, value_name = "SNAPSHOT")]
        since: Option<PathBuf>,

        /// Truncate files larger than this many megabytes
        #[arg(long, value_name = "MB")]
        max_size: Option<f64>,

        /// Truncate files longer than this many lines
        #[arg(long, value_name = "N")]
        max_lines: Option<usize>,

        /// Skip oversized files instead of truncating them
        #[arg(long)]
        no_truncate: bool,

        /// Omit the document header
        #[arg(long)]
        no_header: bool,

        /// Omit the table of contents from the header
        #[arg(long)]
        no_toc: bool,

        /// Load settings from a JSON configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Save the effective settings to a JSON file
        #[arg(long, value_name = "FILE")]
        save_config: Option<PathBuf>,

        /// Print the document instead of writing it
        #[arg(long)]
        stdout: bool,
    },

    /// Rebuild a directory tree from a snapshot
    #[command(alias = "rb")]
    Rebuild {
        /// Snapshot document
        snapshot: PathBuf,

        /// Directory to rebuild into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Show what would be written without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the contents of a snapshot
    Inspect {
        /// Snapshot document
        snapshot: PathBuf,
    },

    /// Show what changed since a snapshot without assembling
    Delta {
        /// Snapshot document
        snapshot: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// List the built-in exclusion patterns
    Excludes,
}

/// What to scan and how to filter it
#[derive(Args)]
struct ScanArgs {
    /// Files and directories to include
    paths: Vec<PathBuf>,

    /// Extensions or exact file names (py, .toml, Dockerfile)
    #[arg(short, long = "ext", num_args = 1..)]
    extensions: Vec<String>,

    /// Extra exclusion patterns (gitignore syntax)
    #[arg(short = 'x', long = "exclude", num_args = 1..)]
    exclude: Vec<String>,

    /// Do not descend into subdirectories
    #[arg(long)]
    no_recursive: bool,

    /// Do not include README files automatically
    #[arg(long)]
    no_readmes: bool,

    /// Do not apply the built-in exclusion list
    #[arg(long)]
    no_default_excludes: bool,

    /// Ignore .gitignore files
    #[arg(long)]
    no_gitignore: bool,
}

impl ScanArgs {
    /// Apply these arguments over `config`
    fn apply(&self, config: &mut AssemblerConfig) {
        if !self.paths.is_empty() {
            config.paths = self.paths.clone();
        }
        if !self.extensions.is_empty() {
            config.extensions = self.extensions.clone();
        }
        config.exclude_patterns.extend(self.exclude.iter().cloned());
        if self.no_recursive {
            config.recursive = false;
        }
        if self.no_readmes {
            config.include_readmes = false;
        }
        if self.no_default_excludes {
            config.use_default_excludes = false;
        }
        if self.no_gitignore {
            config.respect_gitignore = false;
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("code_assembler=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        match e.downcast_ref::<AssemblerError>() {
            Some(err) if err.is_per_file() => {
                eprintln!("{}: {}", "Error".red().bold(), err.user_message());
                eprintln!(
                    "{}",
                    "Only this file is affected; exclude it with -x or fix it and rerun.".dimmed()
                );
            }
            Some(err) => eprintln!("{}: {}", "Error".red().bold(), err.user_message()),
            None => eprintln!("{}: {:#}", "Error".red().bold(), e),
        }
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Assemble {
            scan,
            output,
            since,
            max_size,
            max_lines,
            no_truncate,
            no_header,
            no_toc,
            config,
            save_config,
            stdout,
        } => {
            let mut settings = match &config {
                Some(path) => AssemblerConfig::load(path)
                    .with_context(|| format!("cannot load configuration {}", path.display()))?,
                None => AssemblerConfig::default(),
            };
            scan.apply(&mut settings);
            if let Some(output) = output {
                settings.output_file = output;
            }
            if since.is_some() {
                settings.since = since;
            }
            if let Some(mb) = max_size {
                settings.max_file_size = (mb * 1024.0 * 1024.0) as u64;
            }
            if max_lines.is_some() {
                settings.max_lines = max_lines;
            }
            if no_truncate {
                settings.truncate_large_files = false;
            }
            if no_header {
                settings.show_header = false;
            }
            if no_toc {
                settings.show_toc = false;
            }
            cmd_assemble(settings, save_config, stdout)
        }
        Commands::Rebuild {
            snapshot,
            output,
            dry_run,
        } => cmd_rebuild(RebuildConfig {
            snapshot,
            output_dir: output,
            dry_run,
        }),
        Commands::Inspect { snapshot } => cmd_inspect(snapshot),
        Commands::Delta { snapshot, scan } => {
            let mut settings = AssemblerConfig::default();
            scan.apply(&mut settings);
            cmd_delta(snapshot, settings)
        }
        Commands::Excludes => {
            cmd_excludes();
            Ok(())
        }
    }
}

/// Assemble a snapshot document
///
/// With `--since`, only added and modified files are written and deletions
/// are recorded as tombstones in the manifest.
fn cmd_assemble(settings: AssemblerConfig, save_config: Option<PathBuf>, stdout: bool) -> Result<()> {
    settings.validate()?;
    if let Some(path) = save_config {
        settings.save(&path)?;
        if !stdout {
            println!("{} Saved configuration to {}", "✓".green().bold(), path.display().to_string().cyan());
        }
    }

    let mut assembler = Assembler::new(settings)?;
    let spinner = if stdout {
        None
    } else {
        println!("{}", "Assembling snapshot...".blue().bold());
        let pb = new_spinner("Scanning files...");
        assembler = assembler.with_progress(spinner_callback(&pb));
        Some(pb)
    };

    let output = assembler.run()?;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    if stdout {
        print!("{}", output.document);
        return Ok(());
    }

    let path = assembler.write_output(&output)?;
    println!("{} Wrote {}", "✓".green().bold(), path.display().to_string().yellow().bold());
    print_stats(&output.stats, output.duration);

    if let Some(delta) = &output.delta {
        println!("\n{}", "Changes:".bold());
        print_delta(delta);
    }

    if !output.skipped.is_empty() {
        println!("\n{} ({}):", "Skipped".yellow().bold(), output.skipped.len());
        for skipped in &output.skipped {
            println!("  {} {}", skipped.path.yellow(), skipped.reason.to_string().dimmed());
        }
    }

    Ok(())
}

/// Rebuild a tree from a snapshot
///
/// Paths that would land outside the output directory are skipped and
/// reported; everything else is written.
fn cmd_rebuild(config: RebuildConfig) -> Result<()> {
    config.validate()?;
    let snapshot = parse_file(&config.snapshot)
        .with_context(|| format!("cannot read snapshot {}", config.snapshot.display()))?;
    for warning in &snapshot.warnings {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }

    let rebuilder = Rebuilder::new(&config.output_dir).dry_run(config.dry_run);
    let plan = rebuilder.plan(&snapshot)?;

    let title = if config.dry_run { "Rebuild plan (dry run)" } else { "Rebuilding" };
    println!("{} {}", title.blue().bold(), plan.root.display().to_string().cyan());
    for entry in &plan.entries {
        let marker = match entry.action {
            PlanAction::Create => "+".green().bold(),
            PlanAction::Overwrite => "~".yellow().bold(),
            PlanAction::SkipTraversalViolation => "!".red().bold(),
        };
        println!("  {} {} {}", marker, entry.path, format!("({})", entry.action).dimmed());
    }
    for warning in plan.warnings() {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }

    if config.dry_run {
        println!(
            "\n{} {} to create, {} to overwrite, {} skipped. Nothing was written.",
            "Dry run:".bold(),
            plan.count(PlanAction::Create).to_string().green(),
            plan.count(PlanAction::Overwrite).to_string().yellow(),
            plan.count(PlanAction::SkipTraversalViolation).to_string().red()
        );
        return Ok(());
    }

    let pb = ProgressBar::new(plan.entries.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let bar = pb.clone();
    let rebuilder = rebuilder.with_progress(Arc::new(move |info: ProgressInfo| {
        bar.set_position(info.processed as u64);
        if let Some(item) = info.current_item {
            bar.set_message(item);
        }
    }));
    let report = rebuilder.apply(&plan)?;
    pb.finish_and_clear();

    println!("{} Rebuilt {} files", "✓".green().bold(), report.files_written.to_string().cyan());
    println!("  Written: {}", format_bytes(report.bytes_written).cyan());
    if report.files_skipped > 0 {
        println!("  Skipped: {}", report.files_skipped.to_string().red());
    }
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(report.duration_ms)).to_string().cyan()
    );

    if !report.failures.is_empty() {
        println!("\n{} ({}):", "Failed".red().bold(), report.failures.len());
        for (path, reason) in &report.failures {
            println!("  {} {}", path.red(), reason.dimmed());
        }
        anyhow::bail!("{} file(s) could not be written", report.failures.len());
    }

    Ok(())
}

/// Show what a snapshot contains
fn cmd_inspect(path: PathBuf) -> Result<()> {
    let snapshot = parse_file(&path).with_context(|| format!("cannot read snapshot {}", path.display()))?;
    let manifest = &snapshot.manifest;

    println!("{} {}", "Snapshot".blue().bold(), path.display().to_string().cyan());
    let origin = match manifest.origin {
        ManifestOrigin::Embedded => "manifest".green(),
        ManifestOrigin::Legacy => "legacy metadata".yellow(),
        ManifestOrigin::Reconstructed => "no manifest (reconstructed)".red(),
    };
    println!("  Index: {}", origin);
    if manifest.origin != ManifestOrigin::Reconstructed {
        println!("  Version: {}", manifest.version);
        println!(
            "  Generated: {}",
            manifest.generated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }

    let mut stats = AssemblyStats::default();
    for record in &snapshot.records {
        stats.add_record(record);
    }
    println!("  Files: {}", snapshot.len().to_string().cyan());
    println!("  Lines: {}", format_number(stats.total_lines).cyan());
    println!("  Size: {}", format_bytes(stats.source_bytes).cyan());

    println!("\n{}", "Files:".bold());
    for record in &snapshot.records {
        let modified = Local
            .timestamp_opt(record.mtime.floor() as i64, 0)
            .earliest()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let mut line = format!(
            "  {} {} {}",
            record.path,
            format!("[{}]", record.language).dimmed(),
            format!("{} lines, {}", record.line_count(), modified).dimmed()
        );
        if record.truncated {
            line.push_str(&format!(" {}", format!("truncated, {} omitted", record.omitted_lines).yellow()));
        }
        println!("{}", line);
    }

    if !snapshot.deleted.is_empty() {
        println!("\n{}", "Deleted:".bold());
        for path in &snapshot.deleted {
            println!("  {}", path.red());
        }
    }
    for warning in &snapshot.warnings {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }

    Ok(())
}

/// Compare the current tree with a snapshot's manifest
fn cmd_delta(snapshot_path: PathBuf, settings: AssemblerConfig) -> Result<()> {
    settings.validate()?;
    let snapshot = parse_file(&snapshot_path)
        .with_context(|| format!("cannot read snapshot {}", snapshot_path.display()))?;

    let start = Instant::now();
    let listing = FileTracker::from_config(&settings).scan()?;
    let delta = compute_delta(&snapshot.manifest, &listing)?;

    println!(
        "{} {} ({} unchanged, {})",
        "Changes since".blue().bold(),
        snapshot_path.display().to_string().cyan(),
        delta.unchanged,
        format_duration(round_millis(start.elapsed()))
    );
    print_delta(&delta);
    if snapshot.manifest.origin == ManifestOrigin::Reconstructed {
        println!(
            "{} the snapshot has no manifest, so every file is reported as modified",
            "note:".yellow().bold()
        );
    }
    Ok(())
}

/// Print the built-in exclusion patterns
fn cmd_excludes() {
    println!("{}", "Default exclusion patterns:".bold());
    for pattern in config::DEFAULT_EXCLUDES {
        println!("  {}", pattern);
    }
    println!("\nDisable with {}; output defaults to {}.", "--no-default-excludes".yellow(), DEFAULT_OUTPUT_FILE.cyan());
}

// Helper functions

fn print_stats(stats: &AssemblyStats, duration: Duration) {
    println!("  Files: {}", stats.total_files.to_string().cyan());
    println!("  Lines: {}", format_number(stats.total_lines).cyan());
    println!("  Size: {}", format_bytes(stats.source_bytes).cyan());
    println!("  Estimated tokens: ~{}", format_number(stats.estimated_tokens).cyan());
    if let Some((path, bytes)) = &stats.largest_file {
        println!("  Largest: {} ({})", path, format_bytes(*bytes));
    }
    if stats.truncated_files > 0 {
        println!("  Truncated: {}", stats.truncated_files.to_string().yellow());
    }
    println!("  Time: {}", format_duration(round_millis(duration)).to_string().cyan());
}

fn print_delta(delta: &DeltaResult) {
    for line in delta.summary().lines() {
        let colored_line = if line.starts_with("Added") {
            line.green()
        } else if line.starts_with("Deleted") {
            line.red()
        } else if line.starts_with("Modified") {
            line.yellow()
        } else {
            line.normal()
        };
        println!("  {}", colored_line);
    }
}

fn new_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_string());
    pb
}

fn spinner_callback(pb: &ProgressBar) -> ProgressCallback {
    let pb = pb.clone();
    Arc::new(move |info: ProgressInfo| {
        let message = match info.total {
            Some(total) => format!("{} {}/{}", info.operation, info.processed, total),
            None => format!("{} ({})", info.operation, info.processed),
        };
        pb.set_message(message);
    })
}

/// humantime prints every sub-unit down to nanoseconds otherwise
fn round_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}
