mod builtin;
mod cli;
mod error;
mod importer;
mod ledger;
mod models;
mod processors;
mod settings;

use clap::Parser;
use env_logger::Env;

use cli::{Cli, Commands, RulesCommands};

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let importers = || {
        cli::resolve_importers(
            cli.config.as_deref(),
            cli.iban.as_deref(),
            cli.account.as_deref(),
        )
    };

    let result = match &cli.command {
        Commands::Identify { files } => {
            importers().and_then(|imps| cli::identify::run(&imps, files))
        }
        Commands::Extract {
            files,
            json,
            with_location,
        } => importers().and_then(|imps| cli::extract::run(&imps, files, *json, *with_location)),
        Commands::File {
            files,
            destination,
            dry_run,
        } => importers().and_then(|imps| cli::file::run(&imps, files, destination, *dry_run)),
        Commands::Rules { command } => match command {
            RulesCommands::Check { path, kind } => cli::rules::check(path, *kind),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
