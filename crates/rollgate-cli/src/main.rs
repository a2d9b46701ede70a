use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};

mod adapters;
mod commands;

#[derive(Parser)]
#[command(
    name = "rollgate",
    about = "rollgate — validate tool-serving runtimes and roll them out behind health gates",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Config file (default: ./rollgate.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Flags shared by commands that produce a report.
#[derive(Args)]
pub struct ReportArgs {
    /// Write the JSON report document to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Stdout format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the validation suite against one runtime.
    ///
    /// Exits 1 if any gating case fails.
    Validate {
        /// Runtime as `endpoint[@qualifier]`
        #[arg(short, long)]
        runtime: String,
        /// Qualifier, overriding any `@qualifier` suffix
        #[arg(short, long)]
        qualifier: Option<String>,
        #[command(flatten)]
        output: ReportArgs,
    },
    /// Validate the new runtime, then shift traffic to it stage by stage.
    ///
    /// Exits non-zero iff the rollout ends rolled back or failed.
    Rollout {
        #[command(flatten)]
        rollout: commands::rollout::RolloutArgs,
        #[command(flatten)]
        output: ReportArgs,
    },
    /// Forget a finished rollout so the pair can be rolled out again.
    Reset {
        /// Old runtime as `endpoint[@qualifier]`
        #[arg(long)]
        old: String,
        /// New runtime as `endpoint[@qualifier]`
        #[arg(long)]
        new: String,
        /// Also clear a live lease held by another operation
        #[arg(long)]
        force: bool,
        /// State directory (overrides [rollout].data_dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,rollgate=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = rollgate_core::RollgateConfig::load(cli.config.as_deref())?;
    let settings = rollgate_core::Settings::from_config(&config)?;

    match cli.command {
        Commands::Validate {
            runtime,
            qualifier,
            output,
        } => commands::validate::validate(&settings, &runtime, qualifier.as_deref(), &output).await,
        Commands::Rollout { rollout, output } => {
            commands::rollout::rollout(settings, rollout, &output).await
        }
        Commands::Reset {
            old,
            new,
            force,
            data_dir,
        } => commands::reset::reset(&settings, &old, &new, force, data_dir),
    }
}
