//! Timeline Merge CLI tool
//!
//! Reads PDFs and images from disk, orders them by modification time (or an
//! explicit `FILE@TIMESTAMP`), and writes one merged PDF.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use glob::glob;

use timeline_merge::order::order;
use timeline_merge::pdf::extract_metadata;
use timeline_merge::source::guess_media_type;
use timeline_merge::timestamp::{format_timestamp, from_system_time, parse_timestamp};
use timeline_merge::{
    merge, ClassifiedItem, FailurePolicy, Length, MergeOptions, PageGeometry, SourceItem,
};

/// Timeline Merge - Combine PDFs and images into one chronological PDF
#[derive(Parser)]
#[command(name = "timeline-merge")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Merge everything in a folder by file modification time
    timeline-merge merge -o timeline.pdf \"scans/*\"

    # Pin a file to an explicit time
    timeline-merge merge -o out.pdf contract.pdf photo.jpg@2024-11-20T10:30

    # Show the order without writing anything
    timeline-merge plan *.pdf *.jpg")]
struct Cli {
    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum PageSize {
    Letter,
    A4,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge PDFs and images into one PDF, oldest first
    Merge {
        /// Input files; glob patterns and FILE@TIMESTAMP are accepted
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Page size used for image pages
        #[arg(long, value_enum, default_value = "letter")]
        page_size: PageSize,

        /// Margin around images, in points
        #[arg(long, default_value_t = PageGeometry::DEFAULT_MARGIN_PT)]
        margin: f64,

        /// Enlarge small images to fill the page
        #[arg(long)]
        allow_upscale: bool,

        /// Decode images in parallel
        #[arg(long)]
        parallel: bool,

        /// Leave out broken PDFs/images instead of failing
        #[arg(long)]
        skip_malformed: bool,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Print the order files would be merged in
    Plan {
        /// Input files; glob patterns and FILE@TIMESTAMP are accepted
        #[arg(required = true)]
        inputs: Vec<String>,
    },

    /// Show information about a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let result = match cli.command {
        Commands::Merge {
            inputs, output, page_size, margin, allow_upscale, parallel, skip_malformed, open,
        } => {
            let geometry = match page_size {
                PageSize::Letter => PageGeometry::letter(),
                PageSize::A4 => PageGeometry::a4(),
            }
            .with_margin(Length::from_pt(margin));

            let options = MergeOptions {
                geometry,
                allow_upscale,
                parallel,
                on_malformed: if skip_malformed { FailurePolicy::Skip } else { FailurePolicy::Abort },
                ..MergeOptions::default()
            };
            cmd_merge(inputs, output, &options, open)
        }
        Commands::Plan { inputs } => cmd_plan(inputs),
        Commands::Info { input } => cmd_info(input),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// One command-line input: a path and an optional timestamp override
#[derive(Debug, PartialEq)]
struct InputSpec {
    path: PathBuf,
    timestamp: Option<i64>,
}

/// Split `FILE@TIMESTAMP`; a suffix that is not a timestamp stays part of the path
fn parse_input_spec(arg: &str) -> InputSpec {
    if let Some((path, expr)) = arg.rsplit_once('@') {
        if !path.is_empty() {
            if let Ok(timestamp) = parse_timestamp(expr) {
                return InputSpec {
                    path: PathBuf::from(path),
                    timestamp: Some(timestamp),
                };
            }
        }
    }

    InputSpec {
        path: PathBuf::from(arg),
        timestamp: None,
    }
}

/// Expand glob patterns in input paths
fn expand_globs(patterns: Vec<String>) -> Result<Vec<InputSpec>> {
    let mut specs = Vec::new();

    for pattern in patterns {
        let spec = parse_input_spec(&pattern);
        let text = spec.path.to_string_lossy().to_string();

        // Check if pattern contains glob characters
        if text.contains('*') || text.contains('?') || text.contains('[') {
            let mut matched = Vec::new();
            for entry in glob(&text).with_context(|| format!("Invalid glob pattern: {}", text))? {
                match entry {
                    Ok(path) if path.is_file() => matched.push(path),
                    Ok(_) => {}
                    Err(e) => log::warn!("glob error for {}: {}", text, e),
                }
            }
            if matched.is_empty() {
                bail!("No files matched pattern: {}", text);
            }
            // Sort paths so ties on timestamp break the same way every run
            matched.sort();
            specs.extend(matched.into_iter().map(|path| InputSpec {
                path,
                timestamp: spec.timestamp,
            }));
        } else {
            specs.push(spec);
        }
    }

    Ok(specs)
}

/// Read an input file into a source item
fn load_source(spec: &InputSpec) -> Result<SourceItem> {
    let path = &spec.path;
    if !path.exists() {
        bail!("Input file not found: {}", path.display());
    }

    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let timestamp = match spec.timestamp {
        Some(timestamp) => timestamp,
        None => {
            let modified = std::fs::metadata(path)
                .and_then(|metadata| metadata.modified())
                .with_context(|| format!("No modification time for {}", path.display()))?;
            from_system_time(modified)
        }
    };

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();

    Ok(SourceItem::new(
        path.display().to_string(),
        bytes,
        guess_media_type(extension),
        timestamp,
    ))
}

fn load_sources(inputs: Vec<String>) -> Result<Vec<SourceItem>> {
    expand_globs(inputs)?.iter().map(load_source).collect()
}

/// Open a file with the system default application
fn open_file(path: &Path) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open")
            .arg(path)
            .spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open")
            .arg(path)
            .spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", &path.display().to_string()])
            .spawn()?;
    }
    Ok(())
}

/// Merge inputs into one PDF
fn cmd_merge(inputs: Vec<String>, output: PathBuf, options: &MergeOptions, open: bool) -> Result<()> {
    let sources = load_sources(inputs)?;

    eprintln!("Merging {} files...", sources.len());

    let merged = merge(&sources, options).map_err(|e| explain_failure(e, options))?;

    std::fs::write(&output, &merged.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    for skipped in &merged.skipped {
        eprintln!("Skipped: {} ({})", skipped.id, skipped.reason);
    }
    eprintln!(
        "Merged {} files ({} pages) to: {}",
        merged.items.len(),
        merged.page_count,
        output.display()
    );

    if open {
        open_file(&output)?;
    }

    Ok(())
}

/// Name the input that stopped an all-or-nothing merge
fn explain_failure(err: timeline_merge::Error, options: &MergeOptions) -> anyhow::Error {
    let hint = match (err.item(), options.on_malformed) {
        (Some(item), FailurePolicy::Abort) => Some(format!(
            "'{}' stopped the merge; pass --skip-malformed to leave it out",
            item
        )),
        _ => None,
    };

    match hint {
        Some(hint) => anyhow::Error::new(err).context(hint),
        None => anyhow::Error::new(err),
    }
}

/// Print the classified inputs in merge order
fn cmd_plan(inputs: Vec<String>) -> Result<()> {
    let sources = load_sources(inputs)?;
    let classified = sources
        .iter()
        .enumerate()
        .map(|(position, item)| ClassifiedItem::new(item, position))
        .collect();

    for (index, classified) in order(classified).iter().enumerate() {
        let marker = if classified.kind.is_supported() { " " } else { "!" };
        println!(
            "{}{:>3}  {}  {:<12}  {}",
            marker,
            index + 1,
            format_timestamp(classified.item.timestamp),
            classified.kind.to_string(),
            classified.item.id
        );
    }

    Ok(())
}

/// Show information about a PDF
fn cmd_info(input: PathBuf) -> Result<()> {
    let metadata = extract_metadata(&input)?;

    println!("File: {}", input.display());
    println!("Pages: {}", metadata.page_count);

    if let Some(title) = metadata.title {
        println!("Title: {}", title);
    }
    if let Some(author) = metadata.author {
        println!("Author: {}", author);
    }
    if let Some(producer) = metadata.producer {
        println!("Producer: {}", producer);
    }

    Ok(())
}
