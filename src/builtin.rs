//! Built-in processors for counterparties that show up on most
//! Sparkasse statements. Each one recognises its counterparty by payee
//! name or posting type and moves the useful parts of the free-text
//! reference into metadata.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::models::Txn;

lazy_static! {
    // "2000-01-01T19:13 Debitk.0 2003-12 "
    static ref CARD_REFERENCE: Regex =
        Regex::new(r"^(?P<date>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}) Debitk\.\d+ \d{4}-\d{2}\s*$").unwrap();
    static ref SUMUP_PAYEE: Regex = Regex::new(r"(?i)^SumUp\s*\.\s*(?P<merchant>.*)$").unwrap();

    static ref AMAZON_PAYEE: Regex =
        Regex::new(r"(?i)^(AMAZON EU S\.A R\.L\.|AUDIBLE GMBH)").unwrap();
    static ref AMAZON_REFERENCE: Regex =
        Regex::new(r"^(?P<order>[0-9A-Z]\d{2}-\d{7}-\d{7})\s+(?P<rest>.*)$").unwrap();
    static ref AMAZON_PRIME: Regex = Regex::new(r"(?i)^AMZN\s*Prime").unwrap();
    static ref AMAZON_MARKETPLACE: Regex = Regex::new(r"(?i)^AMZN\s*Mktp").unwrap();

    static ref PAYPAL_PAYEE: Regex = Regex::new(r"(?i)^PayPal \(Europe\)").unwrap();
    static ref PAYPAL_REFERENCE: Regex = Regex::new(
        r"^(?:PP\.\d+\.PP )?\. (?P<payee>[^,]*), Ihr Einkauf bei [^,]*(?:, (?P<reference>.*?))?\s*$"
    ).unwrap();

    static ref DB_PAYEE: Regex = Regex::new(r"(?i)^DB Vertrieb GmbH").unwrap();
    static ref DB_TICKET: Regex = Regex::new(r"Fahrschein\s+(?P<ticket>[A-Z0-9]+)").unwrap();

    static ref TELEFONICA_PAYEE: Regex = Regex::new(r"(?i)^Telefonica Germany").unwrap();
    static ref TELEFONICA_REFERENCE: Regex = Regex::new(
        r"Kd-Nr\.:\s*\d+,\s*Rg-Nr\.:\s*(?P<invoice>[\d/]+),\s*Ihre\s+(?P<rest>.*?)\s*$"
    ).unwrap();

    static ref TELECOLUMBUS_PAYEE: Regex = Regex::new(r"(?i)^Tele Columbus").unwrap();
    static ref TELECOLUMBUS_REFERENCE: Regex =
        Regex::new(r"(?i)RG-NR\s*\.\s*(?P<invoice>\d+)").unwrap();

    // Payee names are padded into a fixed-width name and address block.
    static ref PADDING: Regex = Regex::new(r"\s{2,}").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builtin {
    PayeeIban,
    PayeeBic,
    PostingType,
    Withdrawal,
    DebitPayments,
    Amazon,
    Paypal,
    Db,
    Telefonica,
    Telecolumbus,
}

impl Builtin {
    pub fn key(&self) -> &'static str {
        match self {
            Self::PayeeIban => "payee_iban",
            Self::PayeeBic => "payee_bic",
            Self::PostingType => "posting_type",
            Self::Withdrawal => "withdrawal",
            Self::DebitPayments => "debit_payments",
            Self::Amazon => "amazon",
            Self::Paypal => "paypal",
            Self::Db => "db",
            Self::Telefonica => "telefonica",
            Self::Telecolumbus => "telecolumbus",
        }
    }

    pub fn apply(&self, txn: &mut Txn) {
        match self {
            Self::PayeeIban => copy_to_meta(txn, "payee_iban", |t| &t.payee_iban),
            Self::PayeeBic => copy_to_meta(txn, "payee_bic", |t| &t.payee_bic),
            Self::PostingType => copy_to_meta(txn, "posting_type", |t| &t.posting_type),
            Self::Withdrawal => process_withdrawal(txn),
            Self::DebitPayments => process_debit_payments(txn),
            Self::Amazon => process_amazon(txn),
            Self::Paypal => process_paypal(txn),
            Self::Db => process_db(txn),
            Self::Telefonica => process_telefonica(txn),
            Self::Telecolumbus => process_telecolumbus(txn),
        }
    }
}

fn copy_to_meta(txn: &mut Txn, key: &str, get: impl Fn(&Txn) -> &String) {
    let value = get(txn).trim();
    if !value.is_empty() {
        let value = value.to_string();
        txn.meta.insert(key.to_string(), value);
    }
}

fn first_segment(payee: &str) -> &str {
    PADDING.split(payee).next().unwrap_or(payee).trim()
}

fn process_withdrawal(txn: &mut Txn) {
    if !txn.posting_type.eq_ignore_ascii_case("BARGELDAUSZAHLUNG") {
        return;
    }
    let Some(caps) = CARD_REFERENCE.captures(&txn.reference) else {
        return;
    };
    let date = caps["date"].to_string();
    txn.meta.insert("withdrawal_date".to_string(), date);
    txn.reference.clear();
}

fn process_debit_payments(txn: &mut Txn) {
    if !txn.posting_type.eq_ignore_ascii_case("KARTENZAHLUNG") {
        return;
    }
    let Some(caps) = CARD_REFERENCE.captures(&txn.reference) else {
        return;
    };
    let date = caps["date"].to_string();
    txn.meta.insert("payment_date".to_string(), date);
    txn.reference.clear();

    // "EDEKA THAUT, BERLIN//BERLIN/DE": merchant, then location
    let merchant = txn
        .payee_name
        .split("//")
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    let sumup_merchant = SUMUP_PAYEE
        .captures(&merchant)
        .map(|caps| caps["merchant"].trim().to_string());
    match sumup_merchant {
        Some(name) => {
            txn.payee_name = name;
            txn.meta.insert("via".to_string(), "sumup".to_string());
        }
        None if !merchant.is_empty() => txn.payee_name = merchant,
        None => {}
    }
}

fn process_amazon(txn: &mut Txn) {
    if !AMAZON_PAYEE.is_match(&txn.payee_name) {
        return;
    }
    let Some(caps) = AMAZON_REFERENCE.captures(&txn.reference) else {
        return;
    };
    let order = caps["order"].to_string();
    let rest = &caps["rest"];
    let platform = if AMAZON_PRIME.is_match(rest) {
        Some("prime")
    } else if AMAZON_MARKETPLACE.is_match(rest) {
        Some("marketplace")
    } else {
        None
    };
    if let Some(platform) = platform {
        txn.meta
            .insert("amazon_platform".to_string(), platform.to_string());
    }
    txn.meta.insert("order_number".to_string(), order);
    txn.reference.clear();
}

fn process_paypal(txn: &mut Txn) {
    if !PAYPAL_PAYEE.is_match(&txn.payee_name) {
        return;
    }
    let Some(caps) = PAYPAL_REFERENCE.captures(&txn.reference) else {
        return;
    };
    let payee = caps.name("payee").map_or("", |m| m.as_str().trim()).to_string();
    let reference = caps
        .name("reference")
        .map_or("", |m| m.as_str().trim())
        .to_string();

    txn.meta.insert("via".to_string(), "paypal".to_string());
    if !payee.is_empty() {
        txn.payee_name = payee;
    }
    txn.reference = reference;
}

fn process_db(txn: &mut Txn) {
    if !DB_PAYEE.is_match(&txn.payee_name) {
        return;
    }
    txn.payee_name = "DB Vertrieb GmbH".to_string();
    if let Some(caps) = DB_TICKET.captures(&txn.reference) {
        let ticket = caps["ticket"].to_string();
        txn.meta.insert("ticket_number".to_string(), ticket);
    }
}

fn process_telefonica(txn: &mut Txn) {
    if !TELEFONICA_PAYEE.is_match(&txn.payee_name) {
        return;
    }
    let Some(caps) = TELEFONICA_REFERENCE.captures(&txn.reference) else {
        return;
    };
    let invoice = caps["invoice"].to_string();
    let rest = caps["rest"].to_string();
    txn.meta.insert("invoice_number".to_string(), invoice);
    txn.reference = rest;
}

fn process_telecolumbus(txn: &mut Txn) {
    if !TELECOLUMBUS_PAYEE.is_match(&txn.payee_name) {
        return;
    }
    txn.payee_name = first_segment(&txn.payee_name).to_string();
    let Some(caps) = TELECOLUMBUS_REFERENCE.captures(&txn.reference) else {
        return;
    };
    let invoice = caps["invoice"].to_string();
    txn.meta.insert("invoice_number".to_string(), invoice);
    txn.reference.clear();
}
