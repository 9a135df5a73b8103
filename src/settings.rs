use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

use crate::error::{ImportError, Result};
use crate::importer::{
    Encoding, Importer, ImporterKind, DEFAULT_CURRENCY, DEFAULT_DATE_FORMAT, DEFAULT_FIELDS,
};
use crate::processors::{Hook, HookConfig};

/// Contents of `config.toml`: the list of importers to try, in order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub importers: Vec<ImporterSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImporterSettings {
    pub iban: String,
    pub account: String,
    #[serde(default)]
    pub kind: ImporterKind,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_quotechar")]
    pub quotechar: char,
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,
    #[serde(default)]
    pub hooks: Vec<HookConfig>,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

fn default_delimiter() -> char {
    ';'
}

fn default_quotechar() -> char {
    '"'
}

fn default_fields() -> Vec<String> {
    DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect()
}

/// The csv reader takes single-byte delimiters and quotes.
fn ascii_byte(c: char, key: &str, account: &str) -> Result<u8> {
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        Err(ImportError::Settings(format!(
            "importer for {account:?}: {key} {c:?} is not an ASCII character"
        )))
    }
}

impl ImporterSettings {
    /// Build the importer. Rule file paths resolve against `base_dir`.
    pub fn build(&self, base_dir: &Path) -> Result<Importer> {
        if self.iban.trim().is_empty() {
            return Err(ImportError::Settings(format!(
                "importer for {:?} has an empty iban",
                self.account
            )));
        }
        if self.account.trim().is_empty() {
            return Err(ImportError::Settings(format!(
                "importer for {:?} has an empty account",
                self.iban
            )));
        }
        if self.fields.is_empty() {
            return Err(ImportError::Settings(format!(
                "importer for {:?} has no fields",
                self.account
            )));
        }
        let delimiter = ascii_byte(self.delimiter, "delimiter", &self.account)?;
        let quotechar = ascii_byte(self.quotechar, "quotechar", &self.account)?;
        let hooks = self
            .hooks
            .iter()
            .map(|h| Hook::from_config(h, base_dir))
            .collect::<Result<Vec<_>>>()?;
        Ok(Importer::new(&self.iban, &self.account)
            .with_kind(self.kind)
            .with_currency(&self.currency)
            .with_date_format(&self.date_format)
            .with_encoding(self.encoding)
            .with_delimiter(delimiter)
            .with_quotechar(quotechar)
            .with_fields(self.fields.clone())
            .with_hooks(hooks))
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("sparkasse-import")
}

pub fn default_settings_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn parse_settings(content: &str) -> Result<Settings> {
    Ok(toml::from_str(content)?)
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ImportError::Settings(format!("cannot read {}: {e}", path.display())))?;
    parse_settings(&content)
}

/// Load the settings file and build every importer it declares.
pub fn load_importers(path: &Path) -> Result<Vec<Importer>> {
    let settings = load_settings(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let importers = settings
        .importers
        .iter()
        .map(|s| s.build(base_dir))
        .collect::<Result<Vec<_>>>()?;
    info!("{} importers loaded from {}", importers.len(), path.display());
    Ok(importers)
}

pub fn shellexpand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}
