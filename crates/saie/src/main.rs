use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use saie_core::aggregation::GeoMapping;
use saie_core::config::RunConfig;
use saie_core::{ingestion, outputs, pipelines};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Small-area income estimate editing pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Flag statistically implausible records for human review
    Flag(FlagArgs),
    /// Apply reviewed flags: impute replacements and redistribute deltas
    Adjust(AdjustArgs),
}

#[derive(Args, Debug)]
struct FlagArgs {
    /// Input CSV of value records
    #[arg(long)]
    input: PathBuf,
    /// Run configuration TOML
    #[arg(long)]
    config: PathBuf,
    /// Output CSV for the annotated table
    #[arg(long)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct AdjustArgs {
    /// Reviewed CSV carrying flag and adjust columns
    #[arg(long)]
    input: PathBuf,
    /// Run configuration TOML
    #[arg(long)]
    config: PathBuf,
    /// Output CSV for the adjusted table
    #[arg(long)]
    output: PathBuf,
    /// Optional lsoa_code -> lad_code lookup CSV for parent-level totals
    #[arg(long)]
    mapping: Option<PathBuf>,
    /// Optional output CSV for the parent-level totals
    #[arg(long)]
    rollup_output: Option<PathBuf>,
    /// Optional path for the JSON run summary
    #[arg(long)]
    summary: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Flag(args) => run_flag(args),
        Command::Adjust(args) => run_adjust(args),
    }
}

fn run_flag(args: FlagArgs) -> Result<()> {
    let config = RunConfig::from_path(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    let records = ingestion::read_records_csv(&args.input, false)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let output = pipelines::run_flagging(&records, &config)?;
    outputs::write_records_csv(&output.dataframe, &args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(path = %args.output.display(), "annotated table written");

    let mut table = Table::new();
    table.set_header(vec!["total rows", "flagged", "groups"]);
    table.add_row(vec![
        output.summary.total_rows.to_string(),
        output.summary.flagged_rows.to_string(),
        output.summary.group_count.to_string(),
    ]);
    println!("{table}");

    if !output.summary.top_reasons.is_empty() {
        let mut reasons = Table::new();
        reasons.set_header(vec!["flag reason", "rows"]);
        for entry in &output.summary.top_reasons {
            reasons.add_row(vec![entry.reason.clone(), entry.rows.to_string()]);
        }
        println!("{reasons}");
    }

    Ok(())
}

fn run_adjust(args: AdjustArgs) -> Result<()> {
    let config = RunConfig::from_path(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    let records = ingestion::read_records_csv(&args.input, true)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let mapping = match &args.mapping {
        Some(path) => Some(
            GeoMapping::from_csv_path(path)
                .with_context(|| format!("reading mapping {}", path.display()))?,
        ),
        None => None,
    };

    let output = pipelines::run_adjustment(&records, &config, mapping.as_ref())?;
    outputs::write_records_csv(&output.dataframe, &args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(path = %args.output.display(), "adjusted table written");

    if let (Some(parent_totals), Some(path)) = (&output.parent_totals, &args.rollup_output) {
        outputs::write_records_csv(parent_totals, path)
            .with_context(|| format!("writing rollup {}", path.display()))?;
        info!(path = %path.display(), "parent totals written");
    }

    if let Some(path) = &args.summary {
        outputs::write_summary_json(&output.summary, path)
            .with_context(|| format!("writing summary {}", path.display()))?;
        info!(path = %path.display(), "run summary written");
    }

    let summary = &output.summary;
    let mut table = Table::new();
    table.set_header(vec![
        "total rows",
        "confirmed",
        "adjusted",
        "groups",
        "estimation failures",
        "infeasible groups",
        "unmapped codes",
    ]);
    table.add_row(vec![
        summary.total_rows.to_string(),
        summary.confirmed_rows.to_string(),
        summary.adjusted_rows.to_string(),
        summary.group_count.to_string(),
        summary.estimation_failures.len().to_string(),
        summary.redistribution_failures.len().to_string(),
        summary.unmapped_codes.len().to_string(),
    ]);
    println!("{table}");

    for failure in &summary.estimation_failures {
        eprintln!(
            "unresolved: {} {} {} ({})",
            failure.lsoa_code, failure.component, failure.year, failure.reason
        );
    }
    for failure in &summary.redistribution_failures {
        eprintln!(
            "infeasible: {} {} {} residual {:.6} ({})",
            failure.lad_code, failure.component, failure.year, failure.residual, failure.reason
        );
    }

    Ok(())
}
