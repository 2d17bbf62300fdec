mod cmd;
mod config;
mod error;

use clap::Parser;
use config::{Cli, Commands, Effective};

#[tokio::main]
async fn main() {
    // .env must be loaded before clap reads the environment.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "ignoring malformed .env"),
    }

    let cli = Cli::parse();

    let eff = match Effective::new(&cli.args) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd::run::run(&eff).await,
        Commands::Check { limit } => cmd::check::run(&eff, limit).await,
        Commands::Listen { filter } => cmd::listen::run(&eff, &filter).await,
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
