use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use csv::StringRecord;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{ImportError, Result};
use crate::models::{Amount, Flag, Posting, Transaction, Txn};
use crate::processors::Hook;

/// Column layout of a Sparkasse CSV-CAMT export.
pub const DEFAULT_FIELDS: &[&str] = &[
    "Auftragskonto",
    "Buchungstag",
    "Valutadatum",
    "Buchungstext",
    "Verwendungszweck",
    "Glaeubiger ID",
    "Mandatsreferenz",
    "Kundenreferenz (End-to-End)",
    "Sammlerreferenz",
    "Lastschrift Ursprungsbetrag",
    "Auslagenersatz Ruecklastschrift",
    "Beguenstigter/Zahlungspflichtiger",
    "Kontonummer/IBAN",
    "BIC (SWIFT-Code)",
    "Betrag",
    "Waehrung",
    "Info",
];

pub const DEFAULT_DATE_FORMAT: &str = "%d.%m.%y";
pub const DEFAULT_CURRENCY: &str = "EUR";

lazy_static! {
    // Sparkasse names exports like 20240131-1234567-umsatz.CSV
    static ref EXPORT_FILE_NAME: Regex = Regex::new(r"\d{8}-(\d{7})-umsatz").unwrap();
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a German-formatted amount: `.` groups thousands, `,` is the
/// decimal separator.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let s = raw.trim().replace('.', "").replace(',', ".");
    Decimal::from_str(&s).ok()
}

/// IBANs are compared without spaces and case-insensitively.
pub fn normalize_iban(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Encoding {
    #[default]
    #[serde(rename = "iso-8859-1", alias = "latin1", alias = "latin-1")]
    Latin1,
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
}

impl Encoding {
    pub fn decode(&self, bytes: Vec<u8>) -> Result<String> {
        match self {
            // Every Latin-1 byte is the Unicode code point of the same value.
            Self::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            Self::Utf8 => {
                let text = String::from_utf8(bytes).map_err(|e| {
                    ImportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
                })?;
                Ok(match text.strip_prefix('\u{feff}') {
                    Some(stripped) => stripped.to_string(),
                    None => text,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Importer kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImporterKind {
    /// Header must match exactly and the first row must belong to the
    /// configured IBAN.
    #[default]
    CsvCamt,
    /// Older setup: header match only, ignoring case.
    Giro,
}

impl ImporterKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::CsvCamt => "csv_camt",
            Self::Giro => "giro",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CsvCamt => "Sparkasse CSV-CAMT",
            Self::Giro => "Sparkasse Giro (header only)",
        }
    }
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// Positions of the columns a transaction is built from.
#[derive(Debug, Clone, Copy)]
pub struct Columns {
    owner_iban: usize,
    booking_date: usize,
    posting_type: usize,
    reference: usize,
    payee_name: usize,
    payee_iban: usize,
    payee_bic: usize,
    amount: usize,
    currency: usize,
}

impl Columns {
    pub fn locate(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| ImportError::MissingColumn(name.to_string()))
        };
        Ok(Self {
            owner_iban: find("Auftragskonto")?,
            booking_date: find("Buchungstag")?,
            posting_type: find("Buchungstext")?,
            reference: find("Verwendungszweck")?,
            payee_name: find("Beguenstigter/Zahlungspflichtiger")?,
            payee_iban: find("Kontonummer/IBAN")?,
            payee_bic: find("BIC (SWIFT-Code)")?,
            amount: find("Betrag")?,
            currency: find("Waehrung")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Importer
// ---------------------------------------------------------------------------

/// One configured statement importer: which account and IBAN it
/// belongs to, how the file is laid out, and the hooks run per row.
#[derive(Debug)]
pub struct Importer {
    pub kind: ImporterKind,
    pub iban: String,
    pub account: String,
    pub currency: String,
    pub date_format: String,
    pub encoding: Encoding,
    pub delimiter: u8,
    pub quotechar: u8,
    pub fields: Vec<String>,
    hooks: Vec<Hook>,
}

impl Importer {
    pub fn new(iban: &str, account: &str) -> Self {
        Self {
            kind: ImporterKind::default(),
            iban: normalize_iban(iban),
            account: account.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            encoding: Encoding::default(),
            delimiter: b';',
            quotechar: b'"',
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
            hooks: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: ImporterKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_date_format(mut self, date_format: &str) -> Self {
        self.date_format = date_format.to_string();
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quotechar(mut self, quotechar: u8) -> Self {
        self.quotechar = quotechar;
        self
    }

    /// Columns in header order. Must still contain the columns a
    /// transaction is built from.
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_hooks(mut self, hooks: Vec<Hook>) -> Self {
        self.hooks = hooks;
        self
    }

    /// The header line this importer expects, with every field quoted.
    pub fn expected_header(&self) -> String {
        let quote = self.quotechar as char;
        self.fields
            .iter()
            .map(|f| format!("{quote}{f}{quote}"))
            .collect::<Vec<_>>()
            .join(&(self.delimiter as char).to_string())
    }

    fn read(&self, file_path: &Path) -> Result<String> {
        let bytes = std::fs::read(file_path)?;
        self.encoding.decode(bytes)
    }

    pub fn identify(&self, file_path: &Path) -> bool {
        let content = match self.read(file_path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Cannot read {}: {e}", file_path.display());
                return false;
            }
        };
        let mut lines = content.lines();
        let header = lines.next().unwrap_or_default().trim();
        let expected = self.expected_header();

        match self.kind {
            ImporterKind::CsvCamt => {
                if header != expected {
                    return false;
                }
                let Some(row) = lines.next() else {
                    return false;
                };
                let column = self
                    .fields
                    .iter()
                    .position(|f| f == "Auftragskonto")
                    .unwrap_or(0);
                let mut rdr = csv::ReaderBuilder::new()
                    .has_headers(false)
                    .delimiter(self.delimiter)
                    .quote(self.quotechar)
                    .from_reader(row.trim().as_bytes());
                match rdr.records().next() {
                    Some(Ok(record)) => {
                        normalize_iban(record.get(column).unwrap_or_default()) == self.iban
                    }
                    _ => false,
                }
            }
            ImporterKind::Giro => header.to_lowercase() == expected.to_lowercase(),
        }
    }

    /// Map one CSV row to a [`Txn`] and run the hooks over it.
    pub fn csv_to_txn(&self, record: &StringRecord, columns: &Columns, line: u64) -> Result<Txn> {
        let get = |i: usize| record.get(i).unwrap_or_default();

        let raw_date = get(columns.booking_date).trim();
        let booking_date = NaiveDate::parse_from_str(raw_date, &self.date_format).map_err(|_| {
            ImportError::InvalidDate {
                value: raw_date.to_string(),
                format: self.date_format.clone(),
                line,
            }
        })?;
        let raw_amount = get(columns.amount);
        let amount = parse_amount(raw_amount).ok_or_else(|| ImportError::InvalidAmount {
            value: raw_amount.to_string(),
            line,
        })?;
        let currency = match get(columns.currency).trim() {
            "" => self.currency.clone(),
            c => c.to_string(),
        };

        let mut txn = Txn {
            owner_iban: get(columns.owner_iban).to_string(),
            booking_date,
            posting_type: get(columns.posting_type).to_string(),
            reference: get(columns.reference).to_string(),
            payee_name: get(columns.payee_name).to_string(),
            payee_iban: get(columns.payee_iban).to_string(),
            payee_bic: get(columns.payee_bic).to_string(),
            amount,
            currency,
            induced_postings: Vec::new(),
            meta: Default::default(),
        };

        for (i, hook) in self.hooks.iter().enumerate() {
            debug!("Processing hook {} {}/{}", hook.name(), i + 1, self.hooks.len());
            hook.apply(&mut txn);
        }
        Ok(txn)
    }

    pub fn extract(&self, file_path: &Path) -> Result<Vec<Transaction>> {
        info!("Extracting {} into {}", file_path.display(), self.account);
        let content = self.read(file_path)?;
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .quote(self.quotechar)
            .from_reader(content.as_bytes());
        let columns = Columns::locate(rdr.headers()?)?;
        let filename = file_path.display().to_string();

        let mut entries = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let line = record.position().map_or(0, |p| p.line());
            let txn = self.csv_to_txn(&record, &columns, line)?;
            entries.push(make_transaction(&self.account, txn, &filename, line, Flag::Okay));
        }
        info!("{} transactions extracted from {}", entries.len(), file_path.display());
        Ok(entries)
    }

    pub fn file_account(&self) -> &str {
        &self.account
    }

    /// Latest booking date in the file, if it has any rows.
    pub fn file_date(&self, file_path: &Path) -> Result<Option<NaiveDate>> {
        Ok(self.extract(file_path)?.iter().map(|t| t.date).max())
    }

    /// Canonical archive name for a Sparkasse export.
    pub fn file_name(&self, file_path: &Path) -> Option<String> {
        let name = file_path.file_name()?.to_str()?;
        EXPORT_FILE_NAME
            .captures(name)
            .map(|caps| format!("{}.camt.csv", &caps[1]))
    }
}

pub fn find_importer<'a>(importers: &'a [Importer], file_path: &Path) -> Option<&'a Importer> {
    importers.iter().find(|imp| imp.identify(file_path))
}

// ---------------------------------------------------------------------------
// Ledger entries
// ---------------------------------------------------------------------------

pub fn make_posting(account: &str, units: Option<Amount>, flag: Option<Flag>) -> Posting {
    Posting {
        account: account.to_string(),
        units,
        flag,
    }
}

pub fn make_transaction(account: &str, txn: Txn, filename: &str, lineno: u64, flag: Flag) -> Transaction {
    let mut postings = vec![make_posting(
        account,
        Some(Amount {
            number: txn.amount,
            currency: txn.currency,
        }),
        None,
    )];
    for induced in txn.induced_postings {
        postings.push(make_posting(&induced.account, None, Some(induced.flag)));
    }

    Transaction {
        date: txn.booking_date,
        flag,
        payee: Some(txn.payee_name).filter(|p| !p.trim().is_empty()),
        narration: txn.reference,
        filename: filename.to_string(),
        lineno,
        meta: txn.meta,
        postings,
    }
}
