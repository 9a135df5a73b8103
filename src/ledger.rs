use std::fmt::Write;

use crate::models::{Posting, Transaction};

/// Quote a string for Beancount: wrap in double quotes, escape `\` and `"`.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn render_posting(posting: &Posting, account_width: usize) -> String {
    let flag = posting.flag.map(|f| format!("{f} ")).unwrap_or_default();
    match &posting.units {
        Some(units) => format!(
            "  {flag}{:<width$}  {} {}",
            posting.account,
            units.number,
            units.currency,
            width = account_width
        ),
        None => format!("  {flag}{}", posting.account),
    }
}

/// Render one transaction as a Beancount directive. `filename` and
/// `lineno` are only written when `with_location` is set.
pub fn render_transaction(txn: &Transaction, with_location: bool) -> String {
    let mut out = String::new();
    let _ = write!(out, "{} {}", txn.date.format("%Y-%m-%d"), txn.flag);
    if let Some(payee) = &txn.payee {
        let _ = write!(out, " {}", quote(payee));
    }
    let _ = writeln!(out, " {}", quote(&txn.narration));

    if with_location {
        let _ = writeln!(out, "  filename: {}", quote(&txn.filename));
        let _ = writeln!(out, "  lineno: {}", txn.lineno);
    }
    for (key, value) in &txn.meta {
        let _ = writeln!(out, "  {key}: {}", quote(value));
    }

    let account_width = txn
        .postings
        .iter()
        .filter(|p| p.units.is_some())
        .map(|p| p.account.chars().count())
        .max()
        .unwrap_or(0);
    for posting in &txn.postings {
        out.push_str(&render_posting(posting, account_width));
        out.push('\n');
    }
    out
}

/// Render entries separated by blank lines.
pub fn render_entries(entries: &[Transaction], with_location: bool) -> String {
    entries
        .iter()
        .map(|t| render_transaction(t, with_location))
        .collect::<Vec<_>>()
        .join("\n")
}
