use std::path::PathBuf;

use anyhow::{Context, bail};
use citibike_core::{Column, Config, DateRange, SampleRequest};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use citibike::{Engine, write_table};

#[derive(Debug, Parser)]
#[command(
    name = "cbike",
    version,
    about = "Download and sample Citi Bike trip data",
    propagate_version = true
)]
pub struct App {
    /// Log verbosity (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    /// Cache directory override (also CITIBIKE_CACHE_DIR)
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Cap on concurrent transfers (also CITIBIKE_MAX_CONCURRENCY)
    #[arg(long, global = true)]
    pub max_concurrency: Option<usize>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch the archives covering a range into the local cache
    #[command(alias = "dl")]
    Download(DownloadArgs),
    /// Sample trips from a range into a .csv, .parquet or .feather file
    #[command(alias = "s")]
    Sample(SampleArgs),
    /// Print the cache directory path
    CacheDir,
    /// Delete every cached archive
    Purge(PurgeArgs),
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Start of the range: '2021' or '2021-05'
    #[arg(long)]
    pub start: String,

    /// End of the range; same as start when omitted
    #[arg(long)]
    pub end: Option<String>,

    /// Re-download even when a valid cache entry exists
    #[arg(long)]
    pub force: bool,

    /// Suppress progress output
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct SampleArgs {
    /// Start of the range: '2021' or '2021-05'
    #[arg(long)]
    pub start: String,

    /// End of the range; same as start when omitted
    #[arg(long)]
    pub end: Option<String>,

    /// Target sampling fraction in (0, 1]
    #[arg(long, default_value_t = 0.01)]
    pub fraction: f64,

    /// Seed for the reproducible per-record draw
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Output file; the suffix selects the writer
    #[arg(long, short)]
    pub output: PathBuf,

    /// Comma-separated column subset, e.g. 'ride_id,started_at'
    #[arg(long, value_delimiter = ',')]
    pub columns: Option<Vec<Column>>,

    /// Abort on the first archive failure instead of continuing
    #[arg(long)]
    pub fail_fast: bool,

    /// Print a JSON provenance report to stdout
    #[arg(long)]
    pub json: bool,

    /// Suppress the provenance summary
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct PurgeArgs {
    /// Actually delete; without this flag purge only reports
    #[arg(long)]
    pub yes: bool,
}

impl App {
    fn config(&self) -> Config {
        let mut config = Config::from_env();
        if let Some(dir) = &self.cache_dir {
            config = config.with_cache_dir(dir);
        }
        if let Some(n) = self.max_concurrency {
            config = config.with_max_concurrency(n);
        }
        config
    }
}

pub async fn run(app: App) -> anyhow::Result<()> {
    let engine = Engine::from_config(app.config());
    match app.cmd {
        Commands::Download(args) => download(&engine, args).await,
        Commands::Sample(args) => sample(&engine, args).await,
        Commands::CacheDir => {
            println!("{}", engine.config().cache_dir.display());
            Ok(())
        }
        Commands::Purge(args) => purge(&engine, args),
    }
}

async fn download(engine: &Engine<impl citibike_fetch::HttpClient>, args: DownloadArgs) -> anyhow::Result<()> {
    let range = DateRange::parse(&args.start, args.end.as_deref())?;
    let bar = progress_bar(args.quiet);
    let report = engine
        .download(range, args.force, |descriptor| {
            bar.set_message(descriptor.file_name());
            bar.inc(1);
        })
        .await?;
    bar.finish_and_clear();

    if !args.quiet {
        eprintln!(
            "{} fetched, {} already cached",
            report.fetched.len(),
            report.already_cached.len()
        );
    }
    report_failures(&report.failures);
    if !report.failures.is_empty() {
        bail!("{} archive(s) could not be downloaded", report.failures.len());
    }
    Ok(())
}

async fn sample(engine: &Engine<impl citibike_fetch::HttpClient>, args: SampleArgs) -> anyhow::Result<()> {
    let range = DateRange::parse(&args.start, args.end.as_deref())?;
    let mut request = SampleRequest::new(range, args.fraction, args.seed);
    request.columns = args.columns.clone();

    let outcome = engine.sample(&request, args.fail_fast).await?;
    write_table(&args.output, &outcome.table, request.columns.as_deref())
        .with_context(|| format!("writing {}", args.output.display()))?;

    report_failures(&outcome.failures);
    if args.json {
        let report = serde_json::json!({
            "provenance": outcome.provenance,
            "failures": outcome.failures,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if !args.quiet {
        let p = &outcome.provenance;
        eprintln!(
            "{} records sampled from {} seen across {} archive(s) (achieved fraction {:.5}, {} skipped rows)",
            p.records_emitted,
            p.records_seen,
            p.archives_consulted,
            p.achieved_fraction(),
            p.records_skipped,
        );
        eprintln!("wrote {}", args.output.display());
    }
    Ok(())
}

fn purge(engine: &Engine<impl citibike_fetch::HttpClient>, args: PurgeArgs) -> anyhow::Result<()> {
    let report = engine.purge(!args.yes)?;
    if report.dry_run {
        println!(
            "would delete {} file(s), {} bytes (pass --yes to delete)",
            report.matched_files, report.total_bytes
        );
    } else {
        println!(
            "deleted {} file(s), {} bytes",
            report.deleted_files, report.total_bytes
        );
    }
    Ok(())
}

fn report_failures(failures: &[citibike_core::ArchiveFailure]) {
    for failure in failures {
        let periods: Vec<String> = failure.periods.iter().map(ToString::to_string).collect();
        eprintln!(
            "warning: {} ({}) unavailable: {}",
            failure.archive,
            periods.join(", "),
            failure.reason
        );
    }
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::no_length();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {pos} archive(s) done {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar
}
