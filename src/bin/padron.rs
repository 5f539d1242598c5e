//! Padrón CLI: nationality and place normalization for person records.
//!
//! Usage:
//!   padron enrich <input.csv> <output.csv> [--limit N] [--batch-size N] [--workers N]
//!   padron nationality <text>... [--birthplace place]
//!   padron report <result.csv>

use clap::{ArgAction, Parser, Subcommand};
use padron::dataset::write_enriched_file;
use padron::{
    CancellationToken, Dataset, Engine, EngineConfig, IncompletenessReport, OutputParts,
};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "padron",
    version,
    about = "Normalize nationality and place fields in person records"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to the SQLite resolution cache
    #[arg(long, global = true)]
    cache: Option<PathBuf>,
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich a CSV dataset and write the result
    Enrich {
        /// Input CSV file
        input: PathBuf,
        /// Output CSV file
        output: PathBuf,
        /// Only process the first N records
        #[arg(long)]
        limit: Option<usize>,
        /// Records per batch
        #[arg(long)]
        batch_size: Option<usize>,
        /// Batches processed concurrently
        #[arg(long)]
        workers: Option<usize>,
        /// Postal code → locality hint CSV
        #[arg(long)]
        hints: Option<PathBuf>,
        /// Do not resolve place fields
        #[arg(long)]
        skip_places: bool,
        /// Do not resolve nationality
        #[arg(long)]
        skip_nationality: bool,
        /// Write rows in input order instead of completion order
        #[arg(long)]
        keep_order: bool,
    },
    /// Resolve nationality values and print the result
    Nationality {
        /// Declared nationality values
        #[arg(required = true)]
        values: Vec<String>,
        /// Birthplace used as extra evidence for every value
        #[arg(long)]
        birthplace: Option<String>,
    },
    /// Summarize unresolved place fields in a result file
    Report {
        /// Enriched CSV file
        file: PathBuf,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: tracing subscriber already set");
    }
}

/// Get the default cache path (~/.local/share/padron/cache.db)
fn default_cache_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("padron").join("cache.db")
}

fn load_config(path: Option<&Path>, cache: Option<PathBuf>) -> Result<EngineConfig, String> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path).map_err(|e| e.to_string())?,
        None => EngineConfig::default(),
    };
    if let Some(cache) = cache {
        config.cache.path = Some(cache);
    } else if config.cache.path.is_none() {
        config.cache.path = Some(default_cache_path());
    }
    Ok(config)
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Runtime::new().map_err(|e| format!("failed to create tokio runtime: {}", e))
}

/// Cancel the token on Ctrl-C. In-flight rows finish; queued batches are skipped.
fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after in-flight rows");
            cancel.cancel();
        }
    });
}

struct EnrichArgs {
    input: PathBuf,
    output: PathBuf,
    limit: Option<usize>,
    batch_size: Option<usize>,
    workers: Option<usize>,
    hints: Option<PathBuf>,
    skip_places: bool,
    skip_nationality: bool,
    keep_order: bool,
}

fn cmd_enrich(mut config: EngineConfig, args: EnrichArgs) -> i32 {
    if args.skip_places && args.skip_nationality {
        eprintln!("Error: nothing to do with both --skip-places and --skip-nationality");
        return 1;
    }
    if let Some(hints) = &args.hints {
        config.hints.path = Some(hints.clone());
    }
    let batch_size = args.batch_size.unwrap_or(config.batch.size);
    let workers = args.workers.unwrap_or(config.batch.workers);

    let dataset = match Dataset::read(&args.input, args.limit) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", args.input.display(), e);
            return 1;
        }
    };

    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    rt.block_on(async {
        let cancel = CancellationToken::new();
        let engine = match Engine::connect(config, cancel.clone()) {
            Ok(engine) => engine,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        };
        cancel_on_interrupt(cancel);

        let parts = OutputParts {
            nationality: !args.skip_nationality,
            places: !args.skip_places,
        };
        let orchestrator = engine.orchestrator(engine.pipeline(parts.nationality, parts.places));

        let Dataset { headers, rows } = dataset;
        let mut report = orchestrator.run(rows, batch_size, workers).await;
        if args.keep_order {
            report.sort_by_index();
        }

        if let Err(e) = write_enriched_file(&args.output, &headers, &report.rows, parts) {
            eprintln!("Error: cannot write '{}': {}", args.output.display(), e);
            return 1;
        }

        println!(
            "Enriched {} of {} records into '{}'",
            report.rows.len(),
            report.total_rows,
            args.output.display()
        );
        if report.rows_lost() > 0 {
            println!(
                "Lost: {} rows ({} row failures, {} failed batches)",
                report.rows_lost(),
                report.row_failures.len(),
                report.batch_failures.len()
            );
        }
        if report.cancelled {
            println!("Cancelled: {} rows not processed", report.rows_skipped);
            return 130;
        }
        info!("done");
        0
    })
}

fn cmd_nationality(config: EngineConfig, values: &[String], birthplace: Option<&str>) -> i32 {
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    rt.block_on(async {
        let engine = match Engine::connect(config, CancellationToken::new()) {
            Ok(engine) => engine,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        };
        let resolver = engine.nationality();

        let mut code = 0;
        println!("{:<28}  {:<24}  {:<6}  {:<6}  {}", "INPUT", "NORMALIZED", "TARGET", "CONF", "TIER");
        println!("{}", "-".repeat(80));
        for value in values {
            match resolver.resolve_with_tier(value, birthplace).await {
                Ok((result, tier)) => println!(
                    "{:<28}  {:<24}  {:<6}  {:<6}  {}",
                    value,
                    result.normalized_name,
                    if result.is_target_country { "yes" } else { "no" },
                    result.confidence.as_str(),
                    tier.as_str()
                ),
                Err(e) => {
                    eprintln!("Error: '{}': {}", value, e);
                    code = 1;
                }
            }
        }
        code
    })
}

fn cmd_report(file: &Path) -> i32 {
    match IncompletenessReport::from_file(file) {
        Ok(report) => {
            println!("{}", report);
            0
        }
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", file.display(), e);
            1
        }
    }
}

fn config_or_exit(path: Option<&Path>, cache: Option<PathBuf>) -> EngineConfig {
    match load_config(path, cache) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match cli.command {
        Commands::Enrich {
            input,
            output,
            limit,
            batch_size,
            workers,
            hints,
            skip_places,
            skip_nationality,
            keep_order,
        } => cmd_enrich(
            config_or_exit(cli.config.as_deref(), cli.cache),
            EnrichArgs {
                input,
                output,
                limit,
                batch_size,
                workers,
                hints,
                skip_places,
                skip_nationality,
                keep_order,
            },
        ),
        Commands::Nationality { values, birthplace } => cmd_nationality(
            config_or_exit(cli.config.as_deref(), cli.cache),
            &values,
            birthplace.as_deref(),
        ),
        Commands::Report { file } => cmd_report(&file),
    };
    std::process::exit(code);
}
