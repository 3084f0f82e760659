//! jenrich CLI - Command-line tool for streaming JSON enrichment
//!
//! This binary provides command-line interfaces for:
//! - events: dump the structural event stream as NDJSON
//! - extract: print the search values of a document
//! - upsert: write replacement values from a file at a target path
//! - enrich: extract, look up replacements, and upsert in one run

mod config;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use config::JobConfig;
use indicatif::{ProgressBar, ProgressStyle};
use jenrich_codec::EventParser;
use jenrich_format::{PathExpression, SearchExpression};
use jenrich_io::{
    execute_enrich, execute_extract, execute_upsert, EnrichRequest, EnrichSummary,
    ExtractRequest, InputSource, LookupTable, OutputSink, UpsertOptions, UpsertRequest,
    UpsertSummary, WriterOptions,
};
use serde_json::Value;
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jenrich")]
#[command(about = "Streaming JSON document enrichment CLI tool")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the event stream of a document as NDJSON
    ///
    /// Examples:
    ///   jenrich events data.json
    ///   jenrich events data.json --materialize '$.Clients[*]'
    Events {
        /// Input JSON document
        input: PathBuf,
        /// Also emit reconstructed values for this path (repeatable)
        #[arg(long)]
        materialize: Vec<String>,
    },
    /// Print the search values of a document
    ///
    /// Examples:
    ///   jenrich extract data.json --search '$.Clients[*].ClientID'
    ///   jenrich extract data.json --search 'concat("-", $.a[*].x, $.a[*].y)' --format json-array
    Extract {
        /// Input JSON document
        input: PathBuf,
        /// Path or concat() expression
        #[arg(long)]
        search: String,
        /// Output format (ndjson, json-array)
        #[arg(long, value_enum, default_value_t = ExtractFormat::Ndjson)]
        format: ExtractFormat,
    },
    /// Write replacement values at a target path
    Upsert {
        /// Input JSON document
        input: PathBuf,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
        /// Path receiving the replacement values
        #[arg(long)]
        target: String,
        /// JSON array of replacement values, in match order
        #[arg(long)]
        replacements: PathBuf,
        /// Fail when replacement values are left over
        #[arg(long)]
        strict: bool,
        /// Indent the output document
        #[arg(long)]
        pretty: bool,
        /// Show progress spinner while rewriting
        #[arg(long)]
        progress: bool,
    },
    /// Extract search values, map them through a lookup table and upsert the results
    ///
    /// Examples:
    ///   jenrich enrich data.json -o out.json --lookup table.json
    ///   jenrich enrich data.json -o out.json --config job.toml --pretty
    Enrich {
        /// Input JSON document
        input: PathBuf,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
        /// Path or concat() expression producing the search values
        #[arg(long)]
        search: Option<String>,
        /// Path receiving the replacement values
        #[arg(long)]
        target: Option<String>,
        /// JSON object mapping search values to replacement values
        #[arg(long)]
        lookup: Option<PathBuf>,
        /// TOML job file; command-line options take precedence
        #[arg(long)]
        config: Option<PathBuf>,
        /// Fail when replacement values are left over
        #[arg(long)]
        strict: bool,
        /// Indent the output document
        #[arg(long)]
        pretty: bool,
        /// Show progress spinner while enriching
        #[arg(long)]
        progress: bool,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ExtractFormat {
    Ndjson,
    #[value(name = "json-array")]
    JsonArray,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Events { input, materialize } => {
            handle_events(input, materialize)?;
        }
        Commands::Extract {
            input,
            search,
            format,
        } => {
            handle_extract(input, search, format)?;
        }
        Commands::Upsert {
            input,
            output,
            target,
            replacements,
            strict,
            pretty,
            progress,
        } => {
            handle_upsert(input, output, target, replacements, strict, pretty, progress)?;
        }
        Commands::Enrich {
            input,
            output,
            search,
            target,
            lookup,
            config,
            strict,
            pretty,
            progress,
        } => {
            let job = match config {
                Some(path) => JobConfig::load(&path)?,
                None => JobConfig::default(),
            };
            let job = JobConfig {
                search: search.unwrap_or(job.search),
                target: target.unwrap_or(job.target),
                lookup: lookup.or(job.lookup),
                pretty: pretty || job.pretty,
                strict: strict || job.strict,
                limits: job.limits,
            };
            handle_enrich(input, output, job, progress)?;
        }
    }

    Ok(())
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_events(input: PathBuf, materialize: Vec<String>) -> Result<(), Box<dyn Error>> {
    let patterns = materialize
        .iter()
        .map(|expression| PathExpression::parse(expression))
        .collect::<Result<Vec<_>, _>>()?;
    let parser = EventParser::new(File::open(&input)?);

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut count = 0usize;
    for event in parser.materializing(patterns) {
        serde_json::to_writer(&mut out, &event?)?;
        out.write_all(b"\n")?;
        count += 1;
    }
    out.flush()?;
    info!(events = count, input = %input.display(), "event dump complete");
    Ok(())
}

fn handle_extract(
    input: PathBuf,
    search: String,
    format: ExtractFormat,
) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    let request = ExtractRequest {
        input: InputSource::Path(input.clone()),
        search: SearchExpression::parse(&search)?,
    };
    let summary = execute_extract(request)?;

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    match format {
        ExtractFormat::Ndjson => {
            for value in &summary.values {
                serde_json::to_writer(&mut out, value)?;
                out.write_all(b"\n")?;
            }
        }
        ExtractFormat::JsonArray => {
            serde_json::to_writer(&mut out, &summary.values)?;
            out.write_all(b"\n")?;
        }
    }
    out.flush()?;

    let mut stderr = std::io::stderr().lock();
    writeln!(
        &mut stderr,
        "Extracted {} search value(s) from {} (elapsed: {:.2?})",
        summary.values.len(),
        input.display(),
        start.elapsed()
    )?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_upsert(
    input: PathBuf,
    output: PathBuf,
    target: String,
    replacements: PathBuf,
    strict: bool,
    pretty: bool,
    show_progress: bool,
) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    let target = PathExpression::parse(&target)?;
    let replacements = read_replacements(&replacements)?;

    let request = UpsertRequest {
        input: InputSource::Path(input),
        output: OutputSink::Path(output.clone()),
        target,
        replacements,
        options: UpsertOptions { strict },
        writer: WriterOptions { pretty },
    };

    let mut progress_bar = show_progress.then(|| create_spinner("Upserting values"));
    let summary = execute_upsert(request)?;
    let elapsed = start.elapsed();
    if let Some(pb) = progress_bar.take() {
        pb.finish_with_message(format!(
            "Wrote {} value(s) in {:.2?}",
            summary.metrics.matched, elapsed
        ));
    }
    report_upsert_summary(&summary, &output, elapsed)?;
    Ok(())
}

fn handle_enrich(
    input: PathBuf,
    output: PathBuf,
    job: JobConfig,
    show_progress: bool,
) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    let limits = job.limits.to_limits()?;
    let search = SearchExpression::parse_with_limits(&job.search, &limits)?;
    let target = PathExpression::parse_with_limits(&job.target, &limits, false)?;
    let lookup = job
        .lookup
        .ok_or("enrich needs a lookup table (--lookup or `lookup` in the job file)")?;
    let mut table = LookupTable::from_reader(BufReader::new(File::open(&lookup)?))?;
    info!(entries = table.len(), lookup = %lookup.display(), "lookup table loaded");

    let request = EnrichRequest {
        input: InputSource::Path(input),
        output: OutputSink::Path(output.clone()),
        search,
        target,
        options: UpsertOptions { strict: job.strict },
        writer: WriterOptions { pretty: job.pretty },
    };

    let mut progress_bar = show_progress.then(|| create_spinner("Enriching document"));
    let summary = execute_enrich(request, &mut table)?;
    let elapsed = start.elapsed();
    if let Some(pb) = progress_bar.take() {
        pb.finish_with_message(format!(
            "Enriched {} value(s) in {:.2?}",
            summary.metrics.matched, elapsed
        ));
    }
    report_enrich_summary(&summary, &output, elapsed)?;
    Ok(())
}

fn read_replacements(path: &Path) -> Result<Vec<Value>, Box<dyn Error>> {
    let file = File::open(path)
        .map_err(|e| format!("cannot read replacements {}: {}", path.display(), e))?;
    match serde_json::from_reader(BufReader::new(file))? {
        Value::Array(values) => Ok(values),
        other => Err(format!(
            "replacements file must hold a JSON array, found {}",
            jenrich_format::type_name(&other)
        )
        .into()),
    }
}

fn report_upsert_summary(
    summary: &UpsertSummary,
    output: &Path,
    elapsed: Duration,
) -> Result<(), Box<dyn Error>> {
    let mut stderr = std::io::stderr().lock();
    writeln!(
        &mut stderr,
        "Upserted into {} (matched: {}, overwritten: {}, inserted: {}, unconsumed: {}, bytes written: {}, elapsed: {:.2?})",
        output.display(),
        summary.metrics.matched,
        summary.metrics.overwritten,
        summary.metrics.inserted,
        summary.metrics.unconsumed,
        summary.bytes_written,
        elapsed
    )?;
    Ok(())
}

fn report_enrich_summary(
    summary: &EnrichSummary,
    output: &Path,
    elapsed: Duration,
) -> Result<(), Box<dyn Error>> {
    let mut stderr = std::io::stderr().lock();
    writeln!(
        &mut stderr,
        "Enriched {} (search values: {}, matched: {}, overwritten: {}, inserted: {}, bytes written: {}, elapsed: {:.2?})",
        output.display(),
        summary.search_values.len(),
        summary.metrics.matched,
        summary.metrics.overwritten,
        summary.metrics.inserted,
        summary.bytes_written,
        elapsed
    )?;
    Ok(())
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
