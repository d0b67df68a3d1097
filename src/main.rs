//! `nebula` binary entry point: parses the CLI, loads configuration,
//! initializes logging, and dispatches to the selected command.

use clap::Parser;

use quasar_nebula::cli::{Cli, Commands};
use quasar_nebula::config::ConfigLoader;
use quasar_nebula::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::new().with_nebula_dir(&cli.nebula_dir).with_env().load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(2);
        }
    };

    let _logger_guard = match logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            std::process::exit(2);
        }
    };

    let result = match cli.command {
        Commands::Generate { write } => quasar_nebula::cli::commands::generate::execute(&cli.nebula_dir, write, cli.json),
        Commands::Status => quasar_nebula::cli::commands::status::execute(&cli.nebula_dir, cli.json),
        Commands::Apply { max_workers, auto } => quasar_nebula::cli::commands::apply::execute(&cli.nebula_dir, max_workers, auto, cli.json).await,
        Commands::Resume { max_workers, auto } => quasar_nebula::cli::commands::resume::execute(&cli.nebula_dir, max_workers, auto, cli.json).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
