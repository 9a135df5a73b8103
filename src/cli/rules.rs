use std::path::Path;

use comfy_table::{Cell, Table};

use crate::cli::RuleKind;
use crate::error::Result;
use crate::processors::{load_rule_sets, MetaProcessor};

/// Load and validate a rule file. Returns each identifier with its
/// number of rules.
pub fn check_file(path: &Path, kind: RuleKind) -> Result<Vec<(String, usize)>> {
    let rule_sets = load_rule_sets(path)?;
    let summary = rule_sets
        .iter()
        .map(|s| (s.identifier.clone(), s.rules.len()))
        .collect();
    if kind == RuleKind::Meta {
        MetaProcessor::new(rule_sets)?;
    }
    Ok(summary)
}

pub fn check(path: &Path, kind: RuleKind) -> Result<()> {
    let summary = check_file(path, kind)?;

    let mut table = Table::new();
    let header = match kind {
        RuleKind::Account => "Account",
        RuleKind::Meta => "Meta",
    };
    table.set_header(vec![header, "Rules"]);
    for (identifier, count) in &summary {
        table.add_row(vec![Cell::new(identifier), Cell::new(count)]);
    }
    println!("{}: {} rule sets OK\n{table}", path.display(), summary.len());
    Ok(())
}
