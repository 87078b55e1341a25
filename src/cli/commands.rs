//! Command execution: logging setup, pipeline run, console summary.

use std::fs::File;
use std::sync::Arc;

use colored::*;
use indicatif::HumanDuration;
use tracing::{debug, info};

use crate::cli::args::Args;
use crate::error::Result;
use crate::pipeline::{Pipeline, PipelineOutcome};

/// Run the full processing command.
pub async fn run(args: Args) -> Result<PipelineOutcome> {
    setup_logging(&args)?;

    info!("starting agroclima processor");
    debug!("command line arguments: {:?}", args);

    args.validate()?;
    let config = args.to_config();
    debug!("resolved configuration: {:?}", config);

    let pipeline = Pipeline::new(config);
    let outcome = pipeline.run().await?;

    if !args.quiet {
        print_summary(&outcome);
    }
    Ok(outcome)
}

/// Set up the tracing sinks: an stderr console layer plus, when a log
/// directory is given, a timestamped plain-text log file.
fn setup_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("agroclima_processor={}", args.log_level)));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .compact();

    if let Some(log_dir) = &args.log_dir {
        std::fs::create_dir_all(log_dir)?;
        let filename = format!(
            "pipeline_{}.log",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        let log_path = log_dir.join(filename);
        let log_file = File::create(&log_path)?;
        let file_layer = fmt::layer().with_ansi(false).with_writer(Arc::new(log_file));
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .init();
        debug!("logging to {}", log_path.display());
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .init();
    }
    Ok(())
}

/// Final console summary, kept off the log sinks.
fn print_summary(outcome: &PipelineOutcome) {
    let report = &outcome.report;
    println!("\n{}", "Processing Summary".bright_green().bold());
    println!(
        "  {} {}",
        "Output:".bright_cyan(),
        outcome.output_path.display()
    );
    println!(
        "  {} {}",
        "Rows:".bright_cyan(),
        report.total_rows.to_string().bright_white().bold()
    );
    println!(
        "  {} {}",
        "Columns:".bright_cyan(),
        report.total_columns.to_string().bright_white()
    );
    println!(
        "  {} {} cantons, {} years, {} months",
        "Coverage:".bright_cyan(),
        report.distinct_cantons.to_string().bright_white(),
        report.distinct_years.to_string().bright_white(),
        report.distinct_months.to_string().bright_white()
    );
    println!(
        "  {} {:.2}%",
        "Completeness:".bright_cyan(),
        report.completeness_pct
    );
    if report.missing_values > 0 {
        println!(
            "  {} {}",
            "Missing values:".bright_yellow(),
            report.missing_values.to_string().bright_yellow()
        );
    }
    println!(
        "  {} {}",
        "Time elapsed:".bright_cyan(),
        HumanDuration(outcome.elapsed)
    );
}
