use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{ImportError, Result};
use crate::importer::{find_importer, Importer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Move {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Where each recognised file goes: `<destination>/<account as
/// directories>/<latest booking date>.<name>`. Fails before anything
/// moves if a target already exists or two files share a target.
pub fn plan_moves(importers: &[Importer], files: &[PathBuf], destination: &Path) -> Result<Vec<Move>> {
    let mut moves = Vec::new();
    let mut targets = HashSet::new();
    for file in files {
        let Some(importer) = find_importer(importers, file) else {
            warn!("No importer matches {}, skipping", file.display());
            continue;
        };
        let Some(date) = importer.file_date(file)? else {
            warn!("{} has no transactions, skipping", file.display());
            continue;
        };
        let name = match importer.file_name(file) {
            Some(name) => name,
            None => file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| {
                    ImportError::Archive(format!("{} has no file name", file.display()))
                })?,
        };

        let mut to = destination.to_path_buf();
        for part in importer.file_account().split(':') {
            to.push(part);
        }
        to.push(format!("{}.{name}", date.format("%Y-%m-%d")));
        if to.exists() {
            return Err(ImportError::Archive(format!(
                "{} already exists, not filing {}",
                to.display(),
                file.display()
            )));
        }
        if !targets.insert(to.clone()) {
            return Err(ImportError::Archive(format!(
                "{} and another file both go to {}",
                file.display(),
                to.display()
            )));
        }
        moves.push(Move {
            from: file.clone(),
            to,
        });
    }
    Ok(moves)
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        return Err(ImportError::Archive(format!("{} already exists", to.display())));
    }
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // rename fails across filesystems
    if std::fs::rename(from, to).is_err() {
        std::fs::copy(from, to)?;
        std::fs::remove_file(from)?;
    }
    Ok(())
}

pub fn run(importers: &[Importer], files: &[PathBuf], destination: &Path, dry_run: bool) -> Result<()> {
    let moves = plan_moves(importers, files, destination)?;
    for m in &moves {
        println!("{} -> {}", m.from.display(), m.to.display());
        if !dry_run {
            move_file(&m.from, &m.to)?;
            info!("Moved {} to {}", m.from.display(), m.to.display());
        }
    }
    if moves.is_empty() {
        println!("Nothing to file.");
    }
    Ok(())
}
