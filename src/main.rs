// Entry point and command-line flow.
//
// - `run` judges a CJI3 export against the reference tables and writes the
//   "Resultado" workbook (plus optional CSV and JSON summary).
// - `validate` only checks the export's column layout.
// - `update-base` / `update-exceptions` replace a reference file after the
//   authorization code and the upload's columns check out.
mod auth;
mod config;
mod error;
mod loader;
mod output;
mod pipeline;
mod schema;
mod store;
mod table;
mod types;
mod util;

use clap::{Parser, Subcommand};
use config::AppConfig;
use error::PriceError;
use pipeline::PipelineOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use store::ReferenceStore;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "price_report")]
#[command(about = "Checks CJI3 unit prices against permitted min/max reference prices", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./price_report.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Reference (Base) table path
    #[arg(long, global = true)]
    base: Option<PathBuf>,

    /// Exception table path
    #[arg(long, global = true)]
    exceptions: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate the price check workbook for a CJI3 export
    Run {
        /// CJI3 export (.xlsx or .csv)
        #[arg(long, short)]
        input: PathBuf,

        /// Directory for the generated workbook
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Drop project elements ending with this suffix (reversal entries)
        #[arg(long)]
        reversal_suffix: Option<String>,

        /// Also export the result rows as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write a JSON summary of the run
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Number of result rows to preview on the console
        #[arg(long)]
        preview: Option<usize>,

        /// Use a fixed file name instead of a timestamped one
        #[arg(long, default_value = "false")]
        no_timestamp: bool,
    },

    /// Check a CJI3 export's column layout without processing it
    Validate {
        #[arg(long, short)]
        input: PathBuf,
    },

    /// Replace the reference (Base) table
    UpdateBase {
        #[arg(long)]
        file: PathBuf,
        /// Authorization code
        #[arg(long)]
        code: String,
    },

    /// Replace the exception table
    UpdateExceptions {
        #[arg(long)]
        file: PathBuf,
        /// Authorization code
        #[arg(long)]
        code: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn reference_store(cli: &Cli, config: &AppConfig) -> ReferenceStore {
    ReferenceStore::new(
        cli.base.clone().unwrap_or_else(|| config.reference.base_path.clone()),
        cli.exceptions
            .clone()
            .unwrap_or_else(|| config.reference.exceptions_path.clone()),
    )
}

struct RunArgs<'a> {
    input: &'a Path,
    output_dir: PathBuf,
    reversal_suffix: Option<String>,
    csv: Option<&'a Path>,
    summary: Option<&'a Path>,
    preview: usize,
    timestamped: bool,
}

/// Handle `run`: load, judge, render, and save the workbook.
///
/// Nothing is written when the export or the reference data fails to load.
fn handle_run(store: &ReferenceStore, config: &AppConfig, args: RunArgs<'_>) -> Result<(), PriceError> {
    let reference = store.get()?;
    let table = table::read_table(args.input)?;
    let options = PipelineOptions {
        reversal_suffix: args.reversal_suffix,
    };
    let result = pipeline::run(&table, &reference, &options)?;
    let report = &result.report;

    println!(
        "Processing export... ({} rows loaded, {} exceptions removed, {} without material)",
        util::format_int(report.input_rows),
        util::format_int(report.exception_rows),
        util::format_int(report.blank_material_rows)
    );
    if report.reversal_rows > 0 {
        println!("Note: {} reversal rows skipped.", util::format_int(report.reversal_rows));
    }
    if report.excluded_groups > 0 {
        println!(
            "Note: {} groups left out (zero quantity or value).",
            util::format_int(report.excluded_groups)
        );
    }
    if report.duplicate_reference_codes > 0 {
        println!(
            "Warning: {} equipment codes repeat in the reference table; first row used.",
            util::format_int(report.duplicate_reference_codes)
        );
    }
    println!();

    let timestamp = args.timestamped.then(|| chrono::Local::now().naive_local());
    let artifact = output::build_artifact(&result.records, &config.report.file_prefix, timestamp)?;
    std::fs::create_dir_all(&args.output_dir)?;
    let path = args.output_dir.join(&artifact.file_name);
    std::fs::write(&path, &artifact.bytes)?;

    let rows = output::to_rows(&result.records);
    println!("Price check: {} groups\n", util::format_int(report.reported()));
    output::preview_table_rows(&rows, args.preview);
    println!(
        "Within range: {} | Above maximum: {} | Below minimum: {} | Reference not found: {}\n",
        report.within_range, report.above_maximum, report.below_minimum, report.reference_not_found
    );
    println!("(Workbook saved to {} [{}])", path.display(), artifact.mime_type);

    if let Some(csv_path) = args.csv {
        output::write_csv(csv_path, &rows)?;
        println!("(Rows exported to {})", csv_path.display());
    }
    if let Some(summary_path) = args.summary {
        output::write_json(summary_path, report)?;
        println!("(Summary saved to {})", summary_path.display());
    }
    Ok(())
}

/// Handle `validate`: report missing and unexpected columns.
fn handle_validate(input: &Path) -> Result<bool, PriceError> {
    let table = table::read_table(input)?;
    let diff = schema::diff_columns(&table, &schema::TRANSACTION_COLUMNS);
    if diff.is_empty() {
        println!("Column layout OK ({} rows).", util::format_int(table.len()));
        return Ok(true);
    }
    println!("Column layout does not match the CJI3 export.");
    for c in &diff.missing {
        println!("  missing:    {}", c);
    }
    for c in &diff.extra {
        println!("  unexpected: {}", c);
    }
    Ok(false)
}

fn execute(cli: Cli) -> Result<bool, PriceError> {
    let config = AppConfig::discover(cli.config.as_deref())?;
    let mut store = reference_store(&cli, &config);

    match &cli.command {
        Commands::Run {
            input,
            output_dir,
            reversal_suffix,
            csv,
            summary,
            preview,
            no_timestamp,
        } => {
            let args = RunArgs {
                input,
                output_dir: output_dir
                    .clone()
                    .unwrap_or_else(|| config.report.output_dir.clone()),
                reversal_suffix: reversal_suffix
                    .clone()
                    .or_else(|| config.report.reversal_suffix.clone()),
                csv: csv.as_deref(),
                summary: summary.as_deref(),
                preview: preview.unwrap_or(config.report.preview_rows),
                timestamped: config.report.timestamped && !no_timestamp,
            };
            handle_run(&store, &config, args)?;
            Ok(true)
        }
        Commands::Validate { input } => handle_validate(input),
        Commands::UpdateBase { file, code } => {
            store.update_base(code, file)?;
            println!("Reference table updated: {}", store.base_path().display());
            Ok(true)
        }
        Commands::UpdateExceptions { file, code } => {
            store.update_exceptions(code, file)?;
            println!("Exception table updated: {}", store.exceptions_path().display());
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match execute(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
