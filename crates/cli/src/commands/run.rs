// Pipeline run command

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use conveyor_pipeline::{Outcome, Pipeline, PipelineReport, RandomTiming};

use super::config::{print_config, PipelineArgs};
use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Seed for reproducible timings
    #[arg(long, env = "CONVEYOR_SEED")]
    pub seed: Option<u64>,

    /// Upper bound for producer think time in milliseconds
    #[arg(long, default_value = "100")]
    pub think_max_ms: u64,

    /// Upper bound for simulated processing time in milliseconds
    #[arg(long, default_value = "1000")]
    pub processing_max_ms: u64,

    /// Print every pipeline event to stdout as a JSON line
    #[arg(long)]
    pub events: bool,
}

pub async fn run(args: RunArgs, output: OutputFormat, quiet: bool) -> Result<()> {
    let config = args.pipeline.resolve()?;

    let timing = match args.seed {
        Some(seed) => RandomTiming::seeded(seed),
        None => RandomTiming::new(),
    }
    .with_think_max(Duration::from_millis(args.think_max_ms))
    .with_processing_max(Duration::from_millis(args.processing_max_ms));

    if output.is_text() && !quiet {
        print_config(&config);
        println!();
    }

    let pipeline = Pipeline::new(config)?.with_timing(Arc::new(timing));

    let printer = args.events.then(|| {
        let mut events = pipeline.subscribe();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "Failed to encode event"),
                }
            }
        })
    });

    let report = pipeline.run().await.context("pipeline run failed")?;

    if let Some(printer) = printer {
        printer.await.context("event printer failed")?;
    }

    if output.is_text() {
        print_report(&report, quiet);
        Ok(())
    } else {
        output.print_value(&report)
    }
}

fn print_report(report: &PipelineReport, quiet: bool) {
    let stats = &report.stats;
    print_field("Run", report.run_id);
    print_field("Elapsed", format!("{} ms", report.elapsed_ms));
    print_field("Enqueued", stats.enqueued);
    print_field("Delivered", stats.delivered);
    print_field("Retried", stats.retried);
    print_field("Dead letters", stats.dead);
    print_field("Dropped", stats.dropped);
    print_field("Abandoned", stats.abandoned);

    if quiet || report.outcomes.is_empty() {
        return;
    }

    println!();
    print_table_header(&[("ITEM", 14), ("OUTCOME", 12), ("ATTEMPTS", 8)]);
    for (key, outcome) in &report.outcomes {
        let attempts = report.attempts.get(key).copied().unwrap_or(0).to_string();
        print_table_row(&[(key, 14), (outcome_label(*outcome), 12), (&attempts, 8)]);
    }

    if !report.dead_letters.is_empty() {
        println!();
        println!("Dead letters:");
        for label in &report.dead_letters {
            println!("  {label}");
        }
    }
}

fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Delivered => "delivered",
        Outcome::Dead => "dead",
        Outcome::Dropped => "dropped",
        Outcome::Abandoned => "abandoned",
    }
}
