use std::path::PathBuf;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::importer::{find_importer, Importer};

pub fn run(importers: &[Importer], files: &[PathBuf]) -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["File", "Importer", "Account"]);
    for file in files {
        match find_importer(importers, file) {
            Some(importer) => table.add_row(vec![
                Cell::new(file.display()),
                Cell::new(importer.kind.name()),
                Cell::new(importer.file_account()),
            ]),
            None => table.add_row(vec![
                Cell::new(file.display()),
                Cell::new("no match".red()),
                Cell::new(""),
            ]),
        };
    }
    println!("{table}");
    Ok(())
}
