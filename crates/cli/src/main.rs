// Conveyor CLI
//
// Design Decision: Use clap derive; every pipeline knob is a flag that
// overrides the CONVEYOR_* environment (loaded from .env when present).
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: Logs go to stderr so stdout carries only the report.

mod commands;
mod output;
mod telemetry;

use clap::{Parser, Subcommand};

use output::OutputFormat;

#[derive(Parser)]
#[command(name = "conveyor")]
#[command(about = "Conveyor - run the bounded work pipeline")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline to completion and print a report
    Run(commands::run::RunArgs),

    /// Print the resolved pipeline configuration
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv().ok();
    let cli = Cli::parse();

    telemetry::init_telemetry(telemetry::TelemetryConfig::from_env(cli.quiet));
    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    match cli.command {
        Commands::Run(args) => commands::run::run(args, cli.output, cli.quiet).await,
        Commands::Config(args) => commands::config::run(args, cli.output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["conveyor", "run", "--items", "3", "-o", "json", "-q"])
            .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Run(_)));
    }

    #[test]
    fn test_rejects_unknown_output_format() {
        assert!(Cli::try_parse_from(["conveyor", "-o", "xml", "config"]).is_err());
    }
}
