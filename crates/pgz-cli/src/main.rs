use std::fs::{self, File};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use pgz_core::{
    GZIP_HEADER_LEN, GZIP_MAGIC, Pipeline, PipelineConfig, PipelineMode, PipelineProgress,
    PipelineReport,
};
use sysinfo::System;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const MEMORY_BUDGET_PERCENT: u64 = 45;
const MAX_CHUNKS_CEILING: usize = 4096;

#[derive(Parser)]
#[command(
    name = "pgz",
    version,
    about = "Parallel gzip compressor",
    long_about = "Compress a file into concatenated gzip members in parallel, or decompress such a file, preserving byte order."
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a multi-member gzip file.
    Compress(ProcessArgs),
    /// Decompress a multi-member gzip file.
    Decompress(ProcessArgs),
}

#[derive(Args)]
struct ProcessArgs {
    /// Source file.
    source: PathBuf,

    /// Destination file.
    destination: PathBuf,

    /// Chunk size (supports suffixes K/M/G, e.g. 64K, 1M).
    #[arg(long, default_value = "1M", value_parser = parse_size)]
    chunk_size: usize,

    /// Number of worker threads (defaults to CPU count).
    #[arg(long, default_value_t = num_cpus::get())]
    workers: usize,

    /// Chunks held by each stage (defaults to a share of available memory).
    #[arg(long)]
    max_chunks: Option<usize>,

    /// Gzip compression level.
    #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
    level: u32,

    /// Overwrite an existing destination without asking.
    #[arg(short, long, default_value_t = false)]
    force: bool,

    /// Keep the partially written destination when processing fails.
    #[arg(long, default_value_t = false)]
    keep_partial: bool,

    /// Progress refresh interval in milliseconds.
    #[arg(long, default_value_t = 250)]
    stats_interval_ms: u64,
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let (mode, args) = match cli.command {
        Commands::Compress(args) => (PipelineMode::Compress, args),
        Commands::Decompress(args) => (PipelineMode::Decompress, args),
    };
    process_command(mode, args)
}

fn init_tracing(log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let level = match log_level.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("invalid log level '{other}'").into()),
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn process_command(mode: PipelineMode, args: ProcessArgs) -> Result<(), Box<dyn std::error::Error>> {
    let source_bytes = validate_source(&args.source, &args.destination, mode)?;

    let stdin = io::stdin();
    let mut stderr = io::stderr();
    if !prepare_destination(&args.destination, args.force, &mut stdin.lock(), &mut stderr)? {
        eprintln!("cancelled");
        return Ok(());
    }

    let workers = args.workers.max(1);
    let max_chunks = args
        .max_chunks
        .unwrap_or_else(|| default_max_chunks(available_memory(), args.chunk_size, workers));
    let config = PipelineConfig::new(mode)
        .with_chunk_size(args.chunk_size)
        .with_max_threads(workers)
        .with_max_chunks(max_chunks)
        .with_compression_level(args.level)
        .with_progress_interval(Duration::from_millis(args.stats_interval_ms.max(50)));

    tracing::info!(
        mode = %mode,
        source = %args.source.display(),
        destination = %args.destination.display(),
        chunk_size = args.chunk_size,
        workers,
        max_chunks,
        "starting"
    );

    let pipeline = Pipeline::new(config);
    let result = pipeline.run_with_progress(&args.source, &args.destination, |progress| {
        print_progress(&progress, source_bytes);
    });
    eprintln!();

    match result {
        Ok(report) => {
            let destination_bytes = fs::metadata(&args.destination)?.len();
            print_summary(&args, source_bytes, destination_bytes, &report);
            Ok(())
        }
        Err(error) => {
            if !args.keep_partial {
                if let Err(remove_error) = fs::remove_file(&args.destination) {
                    tracing::warn!(%remove_error, "could not remove partial destination");
                }
            }
            Err(error.into())
        }
    }
}

/// Checks the source before any output is touched and returns its size.
fn validate_source(path: &Path, destination: &Path, mode: PipelineMode) -> Result<u64, String> {
    let metadata = fs::metadata(path)
        .map_err(|_| format!("source file {} does not exist", path.display()))?;
    if !metadata.is_file() {
        return Err(format!("source {} is not a regular file", path.display()));
    }
    // A missing destination cannot alias the source.
    let canonical = (fs::canonicalize(path), fs::canonicalize(destination));
    if let (Ok(source), Ok(destination)) = canonical {
        if source == destination {
            return Err(format!(
                "source and destination are the same file: {}",
                source.display()
            ));
        }
    }
    if metadata.len() == 0 {
        return Err(format!("source file {} is empty", path.display()));
    }

    if mode == PipelineMode::Decompress {
        if metadata.len() < GZIP_HEADER_LEN as u64 {
            return Err(format!("source file {} is too short to be gzip", path.display()));
        }
        let mut header = [0u8; 3];
        File::open(path)
            .and_then(|mut file| io::Read::read_exact(&mut file, &mut header))
            .map_err(|error| format!("cannot read {}: {error}", path.display()))?;
        if header != GZIP_MAGIC {
            return Err(format!("source file {} is not gzip", path.display()));
        }
    }

    Ok(metadata.len())
}

/// Makes sure an empty destination exists. Returns false if the user declined.
fn prepare_destination(
    path: &Path,
    force: bool,
    input: &mut impl BufRead,
    prompt: &mut impl Write,
) -> io::Result<bool> {
    if path.exists() {
        if !force {
            write!(
                prompt,
                "{} exists and will be overwritten, are you sure? Y/N ",
                path.display()
            )?;
            prompt.flush()?;

            let mut answer = String::new();
            input.read_line(&mut answer)?;
            if !answer.trim().eq_ignore_ascii_case("y") {
                return Ok(false);
            }
        }
        fs::remove_file(path)?;
    }

    File::create(path)?;
    Ok(true)
}

fn available_memory() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.available_memory()
}

/// Stage capacity from the memory budget, clamped so every worker has work.
fn default_max_chunks(available_bytes: u64, chunk_size: usize, workers: usize) -> usize {
    let budget = available_bytes / 100 * MEMORY_BUDGET_PERCENT;
    let by_memory = budget / chunk_size.max(1) as u64;
    let by_memory = usize::try_from(by_memory).unwrap_or(usize::MAX);
    let floor = workers.saturating_mul(2).max(1);
    by_memory.clamp(floor, MAX_CHUNKS_CEILING.max(floor))
}

fn print_progress(progress: &PipelineProgress, source_bytes: u64) {
    let done = progress.bytes_read.min(source_bytes);
    let percent = if source_bytes > 0 {
        (done as f64 / source_bytes as f64) * 100.0
    } else {
        100.0
    };
    let elapsed_secs = progress.elapsed.as_secs_f64().max(1e-6);
    let active_workers = progress
        .runtime
        .workers
        .iter()
        .filter(|worker| worker.tasks_completed > 0 || worker.busy > Duration::ZERO)
        .count();

    eprint!(
        "\r\x1b[2K[{percent:6.2}%] {} chunks {}/{} | read {} | written {} | rd avg {}/s | stages {}/{} | workers {}/{} | {}",
        progress.mode,
        progress.chunks_written,
        progress.chunks_produced,
        format_bytes(done),
        format_bytes(progress.bytes_written),
        format_rate(done as f64 / elapsed_secs),
        progress.input_depth,
        progress.output_depth,
        active_workers,
        progress.runtime.workers.len(),
        format_duration(progress.elapsed),
    );
    let _ = io::stderr().flush();
}

fn print_summary(
    args: &ProcessArgs,
    source_bytes: u64,
    destination_bytes: u64,
    report: &PipelineReport,
) {
    let elapsed_secs = report.elapsed.as_secs_f64().max(1e-6);
    let ratio = if source_bytes > 0 {
        destination_bytes as f64 / source_bytes as f64
    } else {
        1.0
    };

    println!("{} complete", report.mode);
    println!(
        "  source: {} ({})",
        args.source.display(),
        format_bytes(source_bytes)
    );
    println!(
        "  destination: {} ({})",
        args.destination.display(),
        format_bytes(destination_bytes)
    );
    println!("  ratio: {ratio:.3}x");
    println!("  elapsed: {}", format_duration(report.elapsed));
    println!(
        "  throughput: {}/s",
        format_rate(report.bytes_read as f64 / elapsed_secs)
    );
    println!("  chunks: {}", report.chunks);
    println!("  worker runtime:");
    for worker in &report.runtime.workers {
        println!(
            "    w{:02} tasks {:>6} | uptime {:>8} | busy {:>8} | idle {:>8} | util {:>6.2}%",
            worker.worker_id,
            worker.tasks_completed,
            format_duration(worker.uptime),
            format_duration(worker.busy),
            format_duration(worker.idle),
            worker.utilization * 100.0,
        );
    }
}

fn parse_size(value: &str) -> Result<usize, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("size cannot be empty".to_string());
    }

    let split_at = trimmed
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (num_part, suffix_part) = trimmed.split_at(split_at);
    if num_part.is_empty() {
        return Err(format!("invalid size: {value}"));
    }

    let base: usize = num_part
        .parse()
        .map_err(|_| format!("invalid size number: {value}"))?;

    let multiplier = match suffix_part.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1usize,
        "k" | "kb" => 1024usize,
        "m" | "mb" => 1024usize * 1024usize,
        "g" | "gb" => 1024usize * 1024usize * 1024usize,
        other => {
            return Err(format!("invalid size suffix '{other}' in '{value}'"));
        }
    };

    let size = base
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: {value}"))?;
    if size == 0 {
        return Err("size must be greater than zero".to_string());
    }
    Ok(size)
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

fn format_rate(bytes_per_second: f64) -> String {
    if !bytes_per_second.is_finite() || bytes_per_second <= 0.0 {
        return "0 B".to_string();
    }
    format_bytes(bytes_per_second as u64)
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let millis = duration.subsec_millis();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else if minutes > 0 {
        format!("{minutes:02}:{seconds:02}")
    } else {
        format!("{seconds}.{millis:03}s")
    }
}
