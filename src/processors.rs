use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::builtin::Builtin;
use crate::error::{ImportError, Result};
use crate::models::{Flag, InducedPosting, Txn, TxnField};

// ---------------------------------------------------------------------------
// Rule files
// ---------------------------------------------------------------------------

/// Flatten nested tables into `parent:child` identifiers. Non-table
/// values end the recursion.
pub fn flatten_table(table: &toml::Table, prefix: &str, out: &mut Vec<(String, toml::Value)>) {
    for (key, value) in table {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}:{key}")
        };
        match value {
            toml::Value::Table(inner) => flatten_table(inner, &name, out),
            other => out.push((name, other.clone())),
        }
    }
}

#[derive(Debug)]
struct Condition {
    field: TxnField,
    regex: Regex,
}

/// All conditions must match for the rule to fire.
#[derive(Debug)]
pub struct Rule {
    conditions: Vec<Condition>,
}

/// Named captures of one condition, in pattern order. Groups that did
/// not take part in the match are left out.
type NamedCaptures = Vec<(String, String)>;

impl Rule {
    fn captures(&self, txn: &Txn) -> Option<Vec<NamedCaptures>> {
        let mut matches = Vec::with_capacity(self.conditions.len());
        for condition in &self.conditions {
            let text = txn.field(condition.field);
            let caps = condition.regex.captures(&text)?;
            let named = condition
                .regex
                .capture_names()
                .flatten()
                .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
                .collect();
            matches.push(named);
        }
        Some(matches)
    }

    fn group_names(&self) -> impl Iterator<Item = &str> {
        self.conditions
            .iter()
            .flat_map(|c| c.regex.capture_names().flatten())
    }
}

#[derive(Debug)]
pub struct RuleSet {
    pub identifier: String,
    pub rules: Vec<Rule>,
}

pub fn parse_rule_sets(content: &str) -> Result<Vec<RuleSet>> {
    let table: toml::Table = toml::from_str(content)?;
    let mut flat = Vec::new();
    flatten_table(&table, "", &mut flat);

    let mut rule_sets = Vec::with_capacity(flat.len());
    for (identifier, value) in flat {
        let toml::Value::Array(items) = value else {
            return Err(ImportError::Rules(format!(
                "rule set for {identifier:?} is not a list of rules"
            )));
        };
        let mut rules = Vec::with_capacity(items.len());
        for item in items {
            let rule = match item {
                toml::Value::Table(rule) => rule,
                other => {
                    return Err(ImportError::Rules(format!(
                        "rule {other} under {identifier:?} is not a table"
                    )))
                }
            };
            let mut conditions = Vec::with_capacity(rule.len());
            for (field_name, pattern) in &rule {
                let field: TxnField = field_name
                    .parse()
                    .map_err(|e| ImportError::Rules(format!("{identifier:?}: {e}")))?;
                let toml::Value::String(pattern) = pattern else {
                    return Err(ImportError::Rules(format!(
                        "{identifier:?}: pattern for {field_name:?} is not a string"
                    )));
                };
                let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
                conditions.push(Condition { field, regex });
            }
            rules.push(Rule { conditions });
        }
        rule_sets.push(RuleSet { identifier, rules });
    }
    Ok(rule_sets)
}

pub fn load_rule_sets(path: &Path) -> Result<Vec<RuleSet>> {
    let content = std::fs::read_to_string(path)?;
    parse_rule_sets(&content)
        .map_err(|e| ImportError::Rules(format!("{}: {e}", path.display())))
}

/// Run every rule of every set against `txn`, calling `augment` for each
/// rule whose conditions all match. Later rules see earlier rewrites.
fn run_rules<F>(rule_sets: &[RuleSet], txn: &mut Txn, mut augment: F)
where
    F: FnMut(&RuleSet, &[NamedCaptures], &mut Txn),
{
    for rule_set in rule_sets {
        for rule in &rule_set.rules {
            if let Some(matches) = rule.captures(txn) {
                augment(rule_set, &matches, txn);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Account processor
// ---------------------------------------------------------------------------

/// Adds a flagged posting to the rule set's account on every match.
#[derive(Debug)]
pub struct AccountProcessor {
    rule_sets: Vec<RuleSet>,
}

impl AccountProcessor {
    pub fn new(rule_sets: Vec<RuleSet>) -> Self {
        Self { rule_sets }
    }

    pub fn apply(&self, txn: &mut Txn) {
        run_rules(&self.rule_sets, txn, |rule_set, _, txn| {
            txn.induced_postings.push(InducedPosting {
                flag: Flag::Warning,
                account: rule_set.identifier.clone(),
            });
        });
    }
}

// ---------------------------------------------------------------------------
// Meta processor
// ---------------------------------------------------------------------------

lazy_static! {
    // Beancount metadata keys
    static ref META_KEY: Regex = Regex::new(r"^[a-z][A-Za-z0-9_-]*$").unwrap();
}

/// Where a meta rule set writes to. `key` alone takes its values from
/// the `meta` capture group; `key:value` sets a fixed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTarget {
    pub key: String,
    pub value: Option<String>,
}

impl MetaTarget {
    pub fn parse(identifier: &str) -> Result<Self> {
        let parts: Vec<&str> = identifier.split(':').collect();
        if !META_KEY.is_match(parts[0]) {
            return Err(ImportError::Rules(format!(
                "meta key {:?} must start with a lowercase letter and contain only \
                 letters, digits, `_` and `-`",
                parts[0]
            )));
        }
        match parts.as_slice() {
            [key] => Ok(Self {
                key: key.to_string(),
                value: None,
            }),
            [key, value] => Ok(Self {
                key: key.to_string(),
                value: Some(value.to_string()),
            }),
            _ => Err(ImportError::Rules(format!(
                "meta identifier {identifier:?} is nested too deep; \
                 expected `meta_key` with rules or `meta_key.meta_value` with rules"
            ))),
        }
    }
}

const META_GROUP: &str = "meta";

/// Sets metadata and rewrites text fields from named capture groups.
#[derive(Debug)]
pub struct MetaProcessor {
    targets: Vec<MetaTarget>,
    rule_sets: Vec<RuleSet>,
}

impl MetaProcessor {
    pub fn new(rule_sets: Vec<RuleSet>) -> Result<Self> {
        let mut targets = Vec::with_capacity(rule_sets.len());
        for rule_set in &rule_sets {
            targets.push(MetaTarget::parse(&rule_set.identifier)?);
            for rule in &rule_set.rules {
                for group in rule.group_names() {
                    if group == META_GROUP {
                        continue;
                    }
                    let field: TxnField = group.parse().map_err(|e| {
                        ImportError::Rules(format!("named group in {:?}: {e}", rule_set.identifier))
                    })?;
                    if !field.is_text() {
                        return Err(ImportError::Rules(format!(
                            "named group {group:?} in {:?} targets a field that cannot be rewritten",
                            rule_set.identifier
                        )));
                    }
                }
            }
        }
        Ok(Self { targets, rule_sets })
    }

    pub fn apply(&self, txn: &mut Txn) {
        for (target, rule_set) in self.targets.iter().zip(&self.rule_sets) {
            run_rules(std::slice::from_ref(rule_set), txn, |_, matches, txn| {
                augment_meta(target, matches, txn);
            });
        }
    }
}

fn augment_meta(target: &MetaTarget, matches: &[NamedCaptures], txn: &mut Txn) {
    let meta_values: Vec<String> = match &target.value {
        Some(value) => vec![value.clone()],
        None => matches
            .iter()
            .flatten()
            .filter(|(name, _)| name == META_GROUP)
            .map(|(_, value)| value.clone())
            .collect(),
    };

    let mut fields: Vec<(TxnField, Vec<String>)> = Vec::new();
    for (name, value) in matches.iter().flatten() {
        if name == META_GROUP {
            continue;
        }
        // Group names were validated when the processor was built.
        let Ok(field) = name.parse::<TxnField>() else {
            continue;
        };
        match fields.iter_mut().find(|(f, _)| *f == field) {
            Some((_, values)) => values.push(value.trim().to_string()),
            None => fields.push((field, vec![value.trim().to_string()])),
        }
    }
    for (field, values) in fields {
        if let Some(slot) = txn.text_field_mut(field) {
            *slot = values.join(" ");
        }
    }

    if !meta_values.is_empty() {
        txn.meta
            .insert(target.key.clone(), meta_values.join(" ").to_uppercase());
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// How a hook is declared in the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookConfig {
    Builtin(Builtin),
    AccountRules(PathBuf),
    MetaRules(PathBuf),
}

/// A step run on every row after it has been mapped to a [`Txn`].
#[derive(Debug)]
pub enum Hook {
    Builtin(Builtin),
    Account(AccountProcessor),
    Meta(MetaProcessor),
}

impl Hook {
    /// Build a hook, resolving rule file paths against `base_dir`.
    pub fn from_config(config: &HookConfig, base_dir: &Path) -> Result<Self> {
        match config {
            HookConfig::Builtin(builtin) => Ok(Self::Builtin(*builtin)),
            HookConfig::AccountRules(path) => {
                let rule_sets = load_rule_sets(&base_dir.join(path))?;
                Ok(Self::Account(AccountProcessor::new(rule_sets)))
            }
            HookConfig::MetaRules(path) => {
                let rule_sets = load_rule_sets(&base_dir.join(path))?;
                Ok(Self::Meta(MetaProcessor::new(rule_sets)?))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Builtin(builtin) => builtin.key(),
            Self::Account(_) => "AccountProcessor",
            Self::Meta(_) => "MetaProcessor",
        }
    }

    pub fn apply(&self, txn: &mut Txn) {
        match self {
            Self::Builtin(builtin) => builtin.apply(txn),
            Self::Account(processor) => processor.apply(txn),
            Self::Meta(processor) => processor.apply(txn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_txn;

    fn account_processor(rules: &str) -> AccountProcessor {
        AccountProcessor::new(parse_rule_sets(rules).unwrap())
    }

    fn meta_processor(rules: &str) -> MetaProcessor {
        MetaProcessor::new(parse_rule_sets(rules).unwrap()).unwrap()
    }

    #[test]
    fn test_flatten_table() {
        let table: toml::Table = toml::from_str(
            r#"
            top = 1
            [Expenses.Food]
            Groceries = 2
            Restaurants = 3
            "#,
        )
        .unwrap();
        let mut flat = Vec::new();
        flatten_table(&table, "", &mut flat);
        let names: Vec<_> = flat.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec!["top", "Expenses:Food:Groceries", "Expenses:Food:Restaurants"]
        );
    }

    #[test]
    fn test_parse_rejects_unknown_field() {
        let err = parse_rule_sets(
            r#"
            [[Expenses.Food]]
            narration = "EDEKA"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn test_parse_rejects_non_list_rule_set() {
        let err = parse_rule_sets(r#"Expenses = "EDEKA""#).unwrap_err();
        assert!(matches!(err, ImportError::Rules(_)));
    }

    #[test]
    fn test_parse_rejects_bad_regex() {
        let err = parse_rule_sets(
            r#"
            [[Expenses]]
            payee_name = "EDEKA("
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::Regex(_)));
    }

    #[test]
    fn test_account_processor_adds_flagged_posting() {
        let processor = account_processor(
            r#"
            [[Expenses.Food.Groceries]]
            payee_name = "edeka|rewe"
            "#,
        );
        let mut txn = sample_txn();
        txn.payee_name = "EDEKA THAUT, BERLIN".to_string();
        processor.apply(&mut txn);
        assert_eq!(
            txn.induced_postings,
            vec![InducedPosting {
                flag: Flag::Warning,
                account: "Expenses:Food:Groceries".to_string(),
            }]
        );
    }

    #[test]
    fn test_account_processor_requires_all_conditions() {
        let processor = account_processor(
            r#"
            [[Expenses.Transport]]
            payee_name = "^DB Vertrieb"
            posting_type = "FOLGELASTSCHRIFT"
            "#,
        );
        let mut txn = sample_txn();
        txn.payee_name = "DB Vertrieb GmbH".to_string();
        txn.posting_type = "KARTENZAHLUNG".to_string();
        processor.apply(&mut txn);
        assert!(txn.induced_postings.is_empty());

        txn.posting_type = "FOLGELASTSCHRIFT".to_string();
        processor.apply(&mut txn);
        assert_eq!(txn.induced_postings.len(), 1);
    }

    #[test]
    fn test_account_processor_matches_amount_text() {
        let processor = account_processor(
            r#"
            [[Expenses.Fees]]
            amount = "^-1\\.23$"
            "#,
        );
        let mut txn = sample_txn();
        processor.apply(&mut txn);
        assert_eq!(txn.induced_postings[0].account, "Expenses:Fees");
    }

    #[test]
    fn test_meta_processor_fixed_value() {
        let processor = meta_processor(
            r#"
            [[payment_method.card]]
            posting_type = "KARTENZAHLUNG"
            "#,
        );
        let mut txn = sample_txn();
        txn.posting_type = "KARTENZAHLUNG".to_string();
        processor.apply(&mut txn);
        assert_eq!(txn.meta["payment_method"], "CARD");
    }

    #[test]
    fn test_meta_processor_value_from_group() {
        let processor = meta_processor(
            r#"
            [[invoice]]
            reference = "Rg-Nr\\.?:? (?P<meta>\\w+)"
            "#,
        );
        let mut txn = sample_txn();
        txn.reference = "Kd-Nr 4711 Rg-Nr: ab123".to_string();
        processor.apply(&mut txn);
        assert_eq!(txn.meta["invoice"], "AB123");
    }

    #[test]
    fn test_meta_processor_rewrites_fields_from_groups() {
        let processor = meta_processor(
            r#"
            [[order]]
            reference = "^(?P<meta>\\d{3}-\\d{7}-\\d{7}) (?P<reference>.*)$"
            payee_name = "^(?P<payee_name>AMAZON) EU"
            "#,
        );
        let mut txn = sample_txn();
        txn.reference = "123-1234567-1234567 Amazon.de  ".to_string();
        txn.payee_name = "AMAZON EU S.A R.L., NIEDERLASSUNG DEUTSCHLAND".to_string();
        processor.apply(&mut txn);
        assert_eq!(txn.meta["order"], "123-1234567-1234567");
        assert_eq!(txn.reference, "Amazon.de");
        assert_eq!(txn.payee_name, "AMAZON");
    }

    #[test]
    fn test_meta_processor_no_match_leaves_txn() {
        let processor = meta_processor(
            r#"
            [[payment_method.card]]
            posting_type = "KARTENZAHLUNG"
            "#,
        );
        let mut txn = sample_txn();
        let before = txn.clone();
        processor.apply(&mut txn);
        assert_eq!(txn, before);
    }

    #[test]
    fn test_meta_processor_rejects_deep_identifier() {
        let rule_sets = parse_rule_sets(
            r#"
            [[a.b.c]]
            reference = "x"
            "#,
        )
        .unwrap();
        assert!(MetaProcessor::new(rule_sets).is_err());
    }

    #[test]
    fn test_meta_target_key_must_be_beancount_key() {
        assert!(MetaTarget::parse("invoice").is_ok());
        assert!(MetaTarget::parse("order-id_2").is_ok());
        assert!(MetaTarget::parse("payment_method:Card Payment").is_ok());
        for bad in ["Invoice", "2fa", "_x", "rg nr", "", ":card"] {
            assert!(
                matches!(MetaTarget::parse(bad), Err(ImportError::Rules(_))),
                "{bad:?} accepted"
            );
        }
        let rule_sets = parse_rule_sets("[[Invoice]]\nreference = \"x\"\n").unwrap();
        assert!(MetaProcessor::new(rule_sets).is_err());
    }

    #[test]
    fn test_meta_processor_rejects_unknown_group() {
        let rule_sets = parse_rule_sets(
            r#"
            [[invoice]]
            reference = "(?P<narration>.*)"
            "#,
        )
        .unwrap();
        let err = MetaProcessor::new(rule_sets).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn test_meta_processor_rejects_amount_group() {
        let rule_sets = parse_rule_sets(
            r#"
            [[invoice]]
            reference = "(?P<amount>\\d+)"
            "#,
        )
        .unwrap();
        assert!(MetaProcessor::new(rule_sets).is_err());
    }

    #[test]
    fn test_hook_from_config_resolves_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("accounts.toml"),
            "[[Expenses.Misc]]\nreference = \"irrelevant\"\n",
        )
        .unwrap();
        let hook = Hook::from_config(
            &HookConfig::AccountRules(PathBuf::from("accounts.toml")),
            dir.path(),
        )
        .unwrap();
        assert_eq!(hook.name(), "AccountProcessor");
        let mut txn = sample_txn();
        hook.apply(&mut txn);
        assert_eq!(txn.induced_postings[0].account, "Expenses:Misc");
    }

    #[test]
    fn test_hook_config_deserializes() {
        #[derive(Deserialize)]
        struct Wrapper {
            hooks: Vec<HookConfig>,
        }
        let w: Wrapper = toml::from_str(
            r#"hooks = [{ builtin = "paypal" }, { meta_rules = "meta.toml" }]"#,
        )
        .unwrap();
        assert_eq!(
            w.hooks,
            vec![
                HookConfig::Builtin(Builtin::Paypal),
                HookConfig::MetaRules(PathBuf::from("meta.toml")),
            ]
        );
    }
}
