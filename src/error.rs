use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid regex: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid amount on line {line}: {value:?}")]
    InvalidAmount { value: String, line: u64 },

    #[error("Invalid date on line {line}: {value:?} does not match {format:?}")]
    InvalidDate {
        value: String,
        format: String,
        line: u64,
    },

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Rules error: {0}")]
    Rules(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("No importer matches {0}")]
    NoImporter(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;
