use clap::{Parser, Subcommand};
use logslice::cli::run::{CommandStatus, ExtractArgs, IndexArgs};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "logslice")]
#[command(about = "Date-indexed extraction from large chronological log files", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write every line of one date to <output_dir>/output_<date>.txt
    Extract(ExtractArgs),
    /// Build (or rebuild) and persist the date index of a log file
    Index(IndexArgs),
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a starter config to ~/.config/logslice/config.yml
    Init {
        #[arg(long)]
        stdout: bool,
    },
    /// Check that the config file parses and validates
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logslice=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result: Result<CommandStatus, Box<dyn std::error::Error>> = match cli.command {
        Commands::Extract(args) => logslice::cli::run::extract(config_path, args)
            .await
            .map_err(Into::into),
        Commands::Index(args) => logslice::cli::run::index(config_path, args)
            .await
            .map_err(Into::into),
        Commands::Config { action } => match action {
            ConfigAction::Init { stdout } => {
                logslice::cli::config::init(stdout).map(|()| CommandStatus::Success)
            }
            ConfigAction::Validate => match logslice::cli::config::validate(config_path) {
                Ok(true) => Ok(CommandStatus::Success),
                Ok(false) => return ExitCode::FAILURE,
                Err(e) => Err(e),
            },
        },
    };

    match result {
        Ok(status) => ExitCode::from(status.exit_code()),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
