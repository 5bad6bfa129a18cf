//! solvex CLI - solventación record extraction tool

mod command_client;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use solvex::fallback::TextCompletionExtractor;
use solvex::images::ImageIndex;
use solvex::{
    BatchInput, BatchOptions, BatchProcessor, DocumentOutcome, DocumentReport, Extractor,
    FallbackConfig, JsonFormat,
};

use command_client::CommandClient;

#[derive(Parser)]
#[command(name = "solvex")]
#[command(version)]
#[command(about = "Extract observation/proposal records from DOCX and XLSX files", long_about = None)]
struct Cli {
    /// Input DOCX or XLSX file
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    #[command(flatten)]
    pipeline: PipelineArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone)]
struct PipelineArgs {
    /// Command used as the fallback model (prompt on stdin, answer on stdout)
    #[arg(long, global = true, env = "SOLVEX_FALLBACK_COMMAND", value_name = "CMD")]
    fallback_command: Option<String>,

    /// Seconds to wait for the fallback before giving up
    #[arg(long, global = true, value_name = "SECS")]
    fallback_timeout: Option<u64>,

    /// Fail documents with any damaged part
    #[arg(long, global = true)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract records from one document as JSON
    Extract {
        /// Input DOCX or XLSX file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output compact JSON
        #[arg(long)]
        compact: bool,

        /// Leave the document plain text out of the report
        #[arg(long)]
        no_text: bool,
    },

    /// Extract records from many documents in parallel
    Batch {
        /// Files or directories
        #[arg(value_name = "PATH", required = true)]
        inputs: Vec<PathBuf>,

        /// Output file for the batch report
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Worker threads (0 = one per CPU)
        #[arg(short, long, default_value = "0")]
        jobs: usize,

        /// Keep records repeated across documents
        #[arg(long)]
        no_cross_dedup: bool,

        /// Output compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// Show document information
    Info {
        /// Input DOCX or XLSX file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Extract images and show the records they belong to
    Images {
        /// Input DOCX or XLSX file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let extractor = build_extractor(&cli.pipeline);

    let result = match cli.command {
        Some(Commands::Extract {
            input,
            output,
            compact,
            no_text,
        }) => cmd_extract(extractor.with_plain_text(!no_text), &input, output.as_deref(), compact),
        Some(Commands::Batch {
            inputs,
            output,
            jobs,
            no_cross_dedup,
            compact,
        }) => cmd_batch(extractor, &inputs, output.as_deref(), jobs, !no_cross_dedup, compact),
        Some(Commands::Info { input }) => cmd_info(&extractor, &input),
        Some(Commands::Images { input, output }) => cmd_images(&extractor, &input, output.as_deref()),
        Some(Commands::Version) => {
            cmd_version();
            Ok(())
        }
        None => {
            if let Some(input) = cli.input {
                cmd_summary(&extractor, &input)
            } else {
                println!("{}", "Usage: solvex <FILE>".yellow());
                println!("       solvex --help for more information");
                Ok(())
            }
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn build_extractor(args: &PipelineArgs) -> Extractor {
    let mut config = FallbackConfig::from_env();
    if let Some(secs) = args.fallback_timeout {
        config = config.with_call_timeout(Duration::from_secs(secs));
    }

    let mut extractor = Extractor::new().with_fallback_config(config.clone());
    if let Some(client) = args
        .fallback_command
        .as_deref()
        .and_then(|line| CommandClient::parse(line, config.api_key.clone()))
        .map(|client| match config.call_timeout {
            Some(limit) => client.with_deadline(limit),
            None => client,
        })
    {
        log::debug!("Fallback through {}", client.program());
        extractor = extractor.with_fallback(Arc::new(TextCompletionExtractor::new(client)));
    }
    if args.strict {
        extractor = extractor.strict();
    }
    extractor
}

fn json_format(compact: bool) -> JsonFormat {
    if compact {
        JsonFormat::Compact
    } else {
        JsonFormat::Pretty
    }
}

fn outcome_label(outcome: DocumentOutcome) -> colored::ColoredString {
    match outcome {
        DocumentOutcome::Succeeded => "ok".green(),
        DocumentOutcome::Partial => "partial".yellow(),
        DocumentOutcome::Failed => "failed".red(),
        DocumentOutcome::Skipped => "skipped".dimmed(),
    }
}

fn print_document_line(report: &DocumentReport) {
    let summary = &report.extraction_method_summary;
    print!(
        "{:>8} {} ({} records: {} structured, {} fallback)",
        outcome_label(report.outcome),
        report.file_name,
        report.total_records,
        summary.structured_count,
        summary.fallback_count
    );
    match &report.reason {
        Some(reason) => println!(" {}", reason.dimmed()),
        None => println!(),
    }
}

fn cmd_summary(extractor: &Extractor, input: &Path) -> CliResult {
    let report = extractor.extract_file(input)?;
    print_document_line(&report);

    for record in &report.records {
        println!();
        println!(
            "{} {} {}",
            format!("#{}", record.number).cyan().bold(),
            record.sheet_or_section.as_deref().unwrap_or("").dimmed(),
            record.extraction_method.as_str().dimmed()
        );
        if !record.observation.is_empty() {
            println!("  {}: {}", "Observación".bold(), record.observation.plain_text);
        }
        println!("  {}: {}", "Propuesta".bold(), record.proposal.plain_text);
    }
    Ok(())
}

fn cmd_extract(extractor: Extractor, input: &Path, output: Option<&Path>, compact: bool) -> CliResult {
    let report = extractor.extract_file(input)?;
    let json = report.to_json(json_format(compact))?;

    if let Some(path) = output {
        fs::write(path, &json)?;
        print_document_line(&report);
        println!("{} {}", "Saved to".green(), path.display());
    } else {
        println!("{}", json);
    }
    Ok(())
}

fn cmd_batch(
    extractor: Extractor,
    paths: &[PathBuf],
    output: Option<&Path>,
    jobs: usize,
    cross_document_dedup: bool,
    compact: bool,
) -> CliResult {
    let files = collect_inputs(paths)?;
    if files.is_empty() {
        return Err("no DOCX or XLSX files found".into());
    }

    let inputs = files
        .iter()
        .map(BatchInput::from_path)
        .collect::<solvex::Result<Vec<_>>>()?;

    let options = BatchOptions::new()
        .with_concurrency(jobs)
        .with_cross_document_dedup(cross_document_dedup);
    let report = BatchProcessor::new(extractor, options).run(&inputs)?;

    for document in &report.documents {
        print_document_line(document);
    }

    let summary = &report.summary;
    println!();
    println!("{}", "Batch Summary".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "Documents".bold(), summary.total);
    println!("{}: {}", "Succeeded".bold(), summary.succeeded);
    println!("{}: {}", "Partial".bold(), summary.partial);
    println!("{}: {}", "Failed".bold(), summary.failed);
    println!("{}: {}", "Records".bold(), summary.total_records);
    println!(
        "{}: {} ({} across documents)",
        "Duplicates dropped".bold(),
        summary.duplicates_dropped,
        summary.cross_document_duplicates
    );

    if let Some(path) = output {
        let json = solvex::render::to_json(&report, json_format(compact))?;
        fs::write(path, json)?;
        println!("{} {}", "Saved to".green(), path.display());
    }
    Ok(())
}

/// Expand directories into the DOCX/XLSX files they hold, skipping Office
/// lock files. Explicit files are kept as given.
fn collect_inputs(paths: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_candidate(p))
            .collect();
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

fn is_candidate(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let supported = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(solvex::DocumentKind::from_extension)
        .is_some();
    supported && !name.starts_with("~$")
}

fn cmd_info(extractor: &Extractor, input: &Path) -> CliResult {
    let report = extractor.extract_file(input)?;
    let meta = &report.metadata;

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    println!("{}: {}", "File".bold(), input.display());
    if let Some(kind) = report.kind {
        println!("{}: {}", "Format".bold(), kind);
    }
    for (label, value) in [
        ("Title", &meta.title),
        ("Author", &meta.author),
        ("Subject", &meta.subject),
        ("Keywords", &meta.keywords),
        ("Last modified by", &meta.last_modified_by),
    ] {
        if let Some(value) = value {
            println!("{}: {}", label.bold(), value);
        }
    }
    if let Some(created) = meta.created {
        println!("{}: {}", "Created".bold(), created);
    }
    if let Some(modified) = meta.modified {
        println!("{}: {}", "Modified".bold(), modified);
    }
    if !meta.sheets.is_empty() {
        println!("{}: {}", "Sheets".bold(), meta.sheets.join(", "));
    }

    println!();
    println!("{}", "Content Statistics".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    let stats = &report.statistics;
    println!("{}: {}", "Paragraphs".bold(), stats.paragraph_count);
    println!("{}: {}", "Non-empty paragraphs".bold(), stats.non_empty_paragraph_count);
    println!("{}: {}", "Tables".bold(), stats.table_count);
    println!("{}: {}", "Images".bold(), stats.image_count);
    println!("{}: {}", "Words".bold(), stats.word_count);
    println!("{}: {}", "Characters".bold(), stats.char_count);
    println!("{}: {}", "Records".bold(), report.total_records);

    if !report.headings.is_empty() {
        println!();
        println!("{}", "Headings".cyan().bold());
        println!("{}", "─".repeat(40).dimmed());
        for heading in &report.headings {
            let indent = "  ".repeat(heading.level.saturating_sub(1) as usize);
            println!("{}{}", indent, heading.text);
        }
    }
    Ok(())
}

fn cmd_images(extractor: &Extractor, input: &Path, output: Option<&Path>) -> CliResult {
    let bytes = fs::read(input)?;
    let kind = input
        .extension()
        .and_then(|e| e.to_str())
        .and_then(solvex::DocumentKind::from_extension);
    let tree = extractor.normalize(&bytes, kind)?;
    let name = input.file_name().unwrap_or_default().to_string_lossy();
    let report = extractor.extract_tree(&name, &tree);

    let output_dir = output
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&output_dir)?;

    let index = ImageIndex::build(&tree);
    let mut count = 0;
    for image in &tree.images {
        let filename = image.suggested_filename();
        fs::write(output_dir.join(&filename), &image.data)?;
        count += 1;

        let owners: Vec<String> = report
            .record_images
            .iter()
            .filter(|links| links.inside.contains(&image.id))
            .map(|links| format!("#{}", links.record))
            .collect();
        if owners.is_empty() {
            println!("{} {}", "Extracted".green(), filename);
        } else {
            println!("{} {} {}", "Extracted".green(), filename, owners.join(", ").cyan());
        }
    }
    if index.len() < tree.images.len() {
        println!(
            "{} {} images are anchored outside the document body",
            "Note:".yellow(),
            tree.images.len() - index.len()
        );
    }

    println!("\n{} {} images extracted", "Done!".green().bold(), count);
    Ok(())
}

fn cmd_version() {
    println!("{} {}", "solvex".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("Solventación record extraction tool");
    println!();
    println!("Formats: DOCX, XLSX");
    println!("License: MIT");
}
