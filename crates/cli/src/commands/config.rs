// Pipeline configuration flags and the `config` command

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use conveyor_pipeline::{PipelineConfig, QueueCapacities};

use crate::output::{print_field, OutputFormat};

/// Flags that override the CONVEYOR_* environment
#[derive(Debug, Default, Args)]
pub struct PipelineArgs {
    /// Number of items to produce
    #[arg(long)]
    pub items: Option<u64>,

    /// Capacity applied to all four queues
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Orders queue capacity
    #[arg(long)]
    pub orders_capacity: Option<usize>,

    /// Retries queue capacity
    #[arg(long)]
    pub retries_capacity: Option<usize>,

    /// Merged queue capacity
    #[arg(long)]
    pub merged_capacity: Option<usize>,

    /// Dead-letter queue capacity
    #[arg(long)]
    pub dead_letter_capacity: Option<usize>,

    /// Retries allowed per item before it is dead-lettered
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Worker processing deadline in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Simulated delivery failure rate out of 10
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub failure_rate: Option<u8>,

    /// Router inactivity window in milliseconds
    #[arg(long)]
    pub idle_timeout_ms: Option<u64>,

    /// Producer backoff base delay in milliseconds
    #[arg(long)]
    pub backoff_base_ms: Option<u64>,

    /// Producer backoff multiplier
    #[arg(long)]
    pub backoff_multiplier: Option<f64>,

    /// Producer backoff cap in milliseconds
    #[arg(long)]
    pub backoff_cap_ms: Option<u64>,
}

impl PipelineArgs {
    /// Environment configuration with flag overrides applied
    pub fn resolve(&self) -> Result<PipelineConfig> {
        let base = PipelineConfig::from_env().context("invalid CONVEYOR_* environment")?;
        self.apply(base)
    }

    fn apply(&self, mut config: PipelineConfig) -> Result<PipelineConfig> {
        if let Some(items) = self.items {
            config.item_count = items;
        }
        if let Some(capacity) = self.capacity {
            config.capacities = QueueCapacities::uniform(capacity);
        }
        if let Some(capacity) = self.orders_capacity {
            config.capacities.orders = capacity;
        }
        if let Some(capacity) = self.retries_capacity {
            config.capacities.retries = capacity;
        }
        if let Some(capacity) = self.merged_capacity {
            config.capacities.merged = capacity;
        }
        if let Some(capacity) = self.dead_letter_capacity {
            config.capacities.dead_letter = capacity;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(ms) = self.timeout_ms {
            config.worker_timeout = Duration::from_millis(ms);
        }
        if let Some(rate) = self.failure_rate {
            config.failure_rate = rate;
        }
        if let Some(ms) = self.idle_timeout_ms {
            config.idle_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.backoff_base_ms {
            config.backoff.base = Duration::from_millis(ms);
        }
        if let Some(multiplier) = self.backoff_multiplier {
            config.backoff.multiplier = multiplier;
        }
        if let Some(ms) = self.backoff_cap_ms {
            config.backoff.cap = Duration::from_millis(ms);
        }

        config.validate().context("invalid pipeline configuration")?;
        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

pub fn run(args: ConfigArgs, output: OutputFormat) -> Result<()> {
    let config = args.pipeline.resolve()?;

    if !output.is_text() {
        return output.print_value(&config);
    }

    print_config(&config);
    Ok(())
}

pub fn print_config(config: &PipelineConfig) {
    let caps = &config.capacities;
    print_field("Items", config.item_count);
    print_field(
        "Capacities",
        format!(
            "orders={} retries={} merged={} dead_letter={}",
            caps.orders, caps.retries, caps.merged, caps.dead_letter
        ),
    );
    print_field("Max retries", config.max_retries);
    print_field("Timeout", format!("{} ms", config.worker_timeout.as_millis()));
    print_field("Failure rate", format!("{}/10", config.failure_rate));
    print_field("Idle timeout", format!("{} ms", config.idle_timeout.as_millis()));
    print_field(
        "Backoff",
        format!(
            "base={} ms x{} cap={} ms jitter={}",
            config.backoff.base.as_millis(),
            config.backoff.multiplier,
            config.backoff.cap.as_millis(),
            config.backoff.jitter
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_base() {
        let args = PipelineArgs {
            items: Some(7),
            capacity: Some(3),
            merged_capacity: Some(5),
            timeout_ms: Some(250),
            ..Default::default()
        };

        let config = args.apply(PipelineConfig::default()).unwrap();
        assert_eq!(config.item_count, 7);
        assert_eq!(config.capacities.orders, 3);
        assert_eq!(config.capacities.merged, 5);
        assert_eq!(config.worker_timeout, Duration::from_millis(250));
        assert_eq!(config.max_retries, PipelineConfig::default().max_retries);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let args = PipelineArgs {
            capacity: Some(0),
            ..Default::default()
        };
        let err = args.apply(PipelineConfig::default()).unwrap_err();
        assert!(err.to_string().contains("invalid pipeline configuration"));
    }
}
