use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Flag {
    #[serde(rename = "*")]
    Okay,
    #[serde(rename = "!")]
    Warning,
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Okay => f.write_str("*"),
            Self::Warning => f.write_str("!"),
        }
    }
}

/// A posting added by a hook. It carries no units so the ledger tool
/// interpolates the counter-amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InducedPosting {
    pub flag: Flag,
    pub account: String,
}

/// Intermediate representation of one CSV row, before it becomes a
/// ledger transaction. Hooks read and rewrite this.
#[derive(Debug, Clone, PartialEq)]
pub struct Txn {
    pub owner_iban: String,
    pub booking_date: NaiveDate,
    pub posting_type: String,
    pub reference: String,
    pub payee_name: String,
    pub payee_iban: String,
    pub payee_bic: String,
    pub amount: Decimal,
    pub currency: String,
    pub induced_postings: Vec<InducedPosting>,
    pub meta: BTreeMap<String, String>,
}

impl Txn {
    pub fn field(&self, field: TxnField) -> Cow<'_, str> {
        match field {
            TxnField::OwnerIban => Cow::Borrowed(&self.owner_iban),
            TxnField::BookingDate => Cow::Owned(self.booking_date.format("%Y-%m-%d").to_string()),
            TxnField::PostingType => Cow::Borrowed(&self.posting_type),
            TxnField::Reference => Cow::Borrowed(&self.reference),
            TxnField::PayeeName => Cow::Borrowed(&self.payee_name),
            TxnField::PayeeIban => Cow::Borrowed(&self.payee_iban),
            TxnField::PayeeBic => Cow::Borrowed(&self.payee_bic),
            TxnField::Amount => Cow::Owned(self.amount.to_string()),
            TxnField::Currency => Cow::Borrowed(&self.currency),
        }
    }

    /// Mutable access to the text fields. Date and amount are not
    /// rewritable by hooks.
    pub fn text_field_mut(&mut self, field: TxnField) -> Option<&mut String> {
        match field {
            TxnField::OwnerIban => Some(&mut self.owner_iban),
            TxnField::PostingType => Some(&mut self.posting_type),
            TxnField::Reference => Some(&mut self.reference),
            TxnField::PayeeName => Some(&mut self.payee_name),
            TxnField::PayeeIban => Some(&mut self.payee_iban),
            TxnField::PayeeBic => Some(&mut self.payee_bic),
            TxnField::Currency => Some(&mut self.currency),
            TxnField::BookingDate | TxnField::Amount => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnField {
    OwnerIban,
    BookingDate,
    PostingType,
    Reference,
    PayeeName,
    PayeeIban,
    PayeeBic,
    Amount,
    Currency,
}

pub const ALL_FIELDS: &[TxnField] = &[
    TxnField::OwnerIban,
    TxnField::BookingDate,
    TxnField::PostingType,
    TxnField::Reference,
    TxnField::PayeeName,
    TxnField::PayeeIban,
    TxnField::PayeeBic,
    TxnField::Amount,
    TxnField::Currency,
];

impl TxnField {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OwnerIban => "owner_iban",
            Self::BookingDate => "booking_date",
            Self::PostingType => "posting_type",
            Self::Reference => "reference",
            Self::PayeeName => "payee_name",
            Self::PayeeIban => "payee_iban",
            Self::PayeeBic => "payee_bic",
            Self::Amount => "amount",
            Self::Currency => "currency",
        }
    }

    pub fn is_text(&self) -> bool {
        !matches!(self, Self::BookingDate | Self::Amount)
    }
}

impl FromStr for TxnField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ALL_FIELDS
            .iter()
            .find(|f| f.name() == s)
            .copied()
            .ok_or_else(|| {
                let names: Vec<_> = ALL_FIELDS.iter().map(|f| f.name()).collect();
                format!("unknown field {s:?}, expected one of: {}", names.join(", "))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Amount {
    pub number: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Posting {
    pub account: String,
    pub units: Option<Amount>,
    pub flag: Option<Flag>,
}

/// A ledger transaction handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub flag: Flag,
    pub payee: Option<String>,
    pub narration: String,
    pub filename: String,
    pub lineno: u64,
    pub meta: BTreeMap<String, String>,
    pub postings: Vec<Posting>,
}
