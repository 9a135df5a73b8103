use std::path::PathBuf;

use log::warn;
use serde::Serialize;

use crate::error::Result;
use crate::importer::{find_importer, Importer};
use crate::ledger::render_entries;
use crate::models::Transaction;

#[derive(Debug, Serialize)]
pub struct ExtractedFile {
    pub file: String,
    pub importer: &'static str,
    pub account: String,
    pub entries: Vec<Transaction>,
}

/// Extract every file some importer recognises. Unrecognised files are
/// skipped with a warning.
pub fn extract_files(importers: &[Importer], files: &[PathBuf]) -> Result<Vec<ExtractedFile>> {
    let mut extracted = Vec::new();
    for file in files {
        let Some(importer) = find_importer(importers, file) else {
            warn!("No importer matches {}, skipping", file.display());
            continue;
        };
        extracted.push(ExtractedFile {
            file: file.display().to_string(),
            importer: importer.kind.key(),
            account: importer.file_account().to_string(),
            entries: importer.extract(file)?,
        });
    }
    Ok(extracted)
}

pub fn render_beancount(extracted: &[ExtractedFile], with_location: bool) -> String {
    let mut out = String::from(";; -*- mode: beancount -*-\n");
    for file in extracted {
        out.push_str(&format!("\n**** {}\n\n", file.file));
        out.push_str(&render_entries(&file.entries, with_location));
    }
    out
}

pub fn run(importers: &[Importer], files: &[PathBuf], json: bool, with_location: bool) -> Result<()> {
    let extracted = extract_files(importers, files)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&extracted)?);
    } else {
        print!("{}", render_beancount(&extracted, with_location));
    }
    Ok(())
}
