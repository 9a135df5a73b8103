pub mod extract;
pub mod file;
pub mod identify;
pub mod rules;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::error::{ImportError, Result};
use crate::importer::Importer;
use crate::settings::{default_settings_path, load_importers, shellexpand_path};

#[derive(Parser)]
#[command(
    name = "sparkasse-import",
    version,
    about = "Turn Sparkasse CSV-CAMT exports into Beancount transactions."
)]
pub struct Cli {
    /// Path to config.toml (default: ~/.config/sparkasse-import/config.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,
    /// IBAN of a one-off importer; skips the config file
    #[arg(long, global = true)]
    pub iban: Option<String>,
    /// Ledger account for the one-off importer, e.g. Assets:DE:Sparkasse:Giro
    #[arg(long, global = true)]
    pub account: Option<String>,
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show which importer accepts each file.
    Identify {
        /// CSV files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the transactions of every recognised file.
    Extract {
        /// CSV files to extract
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Print JSON instead of Beancount
        #[arg(long)]
        json: bool,
        /// Include filename and lineno metadata
        #[arg(long = "with-location")]
        with_location: bool,
    },
    /// Move recognised files into an archive sorted by account.
    File {
        /// CSV files to archive
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Archive root directory
        #[arg(long, short = 'o')]
        destination: PathBuf,
        /// Only print what would be moved
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
    /// Work with rule files.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Validate a rule file and list its rule sets.
    Check {
        /// Path to the rule file
        path: PathBuf,
        /// Which processor the file is meant for
        #[arg(long, value_enum, default_value = "account")]
        kind: RuleKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RuleKind {
    Account,
    Meta,
}

/// Importers from `--iban`/`--account`, or else from the settings file.
pub fn resolve_importers(
    config: Option<&str>,
    iban: Option<&str>,
    account: Option<&str>,
) -> Result<Vec<Importer>> {
    match (iban, account) {
        (Some(iban), Some(account)) => Ok(vec![Importer::new(iban, account)]),
        (Some(_), None) | (None, Some(_)) => Err(ImportError::Settings(
            "--iban and --account must be given together".to_string(),
        )),
        (None, None) => {
            let path = config
                .map(shellexpand_path)
                .unwrap_or_else(default_settings_path);
            let importers = load_importers(&path)?;
            if importers.is_empty() {
                return Err(ImportError::Settings(format!(
                    "no importers configured in {}",
                    path.display()
                )));
            }
            Ok(importers)
        }
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
    fn test_resolve_one_off_importer() {
        let importers = resolve_importers(None, Some("DE89 3704"), Some("Assets:Giro")).unwrap();
        assert_eq!(importers.len(), 1);
        assert_eq!(importers[0].iban, "DE893704");
    }

    #[test]
    fn test_resolve_requires_both_flags() {
        assert!(resolve_importers(None, Some("DE89"), None).is_err());
        assert!(resolve_importers(None, None, Some("Assets:Giro")).is_err());
    }

    #[test]
    fn test_resolve_rejects_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();
        let err = resolve_importers(path.to_str(), None, None).unwrap_err();
        assert!(err.to_string().contains("no importers configured"));
    }
}
