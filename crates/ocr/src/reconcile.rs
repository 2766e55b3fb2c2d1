//! Compare extracted billing rows against a fee schedule.

use std::collections::HashMap;
use std::fmt;

use eobscan_core::{normalize_cdt_code, BillingRow, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::ReconcileConfig;

/// A scheduled fee: a dollar amount or the literal `NC` (not covered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum Price {
    NoCharge,
    Amount(Money),
}

impl Price {
    /// Parse `NC`, `$1,234.50`, `92` and the like. `None` for blank or
    /// unrecognised tokens.
    pub fn parse(token: &str) -> Option<Price> {
        let t = token.trim();
        if t.is_empty() {
            return None;
        }
        if t.eq_ignore_ascii_case("NC") {
            return Some(Price::NoCharge);
        }
        Money::parse_token(t).map(Price::Amount)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Price::NoCharge => write!(f, "NC"),
            Price::Amount(m) => write!(f, "{:.2}", m.as_decimal()),
        }
    }
}

impl From<Price> for String {
    fn from(p: Price) -> String {
        p.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPrice {
    Text(String),
    Number(Decimal),
}

fn de_price<'de, D>(deserializer: D) -> Result<Option<Price>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawPrice>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawPrice::Number(d)) => Ok(Some(Price::Amount(Money::from_decimal(d)))),
        Some(RawPrice::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(RawPrice::Text(s)) => Price::parse(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid price token '{s}'"))),
    }
}

/// One fee-schedule record. Either a single `Price` or age-tiered prices.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeeEntry {
    #[serde(rename = "Procedure Code", alias = "Code", alias = "procedure_code", alias = "code")]
    pub code: String,
    #[serde(rename = "Price", default, deserialize_with = "de_price")]
    pub price: Option<Price>,
    #[serde(rename = "PriceLTEQ21", default, deserialize_with = "de_price")]
    pub price_lteq21: Option<Price>,
    #[serde(rename = "PriceGT21", default, deserialize_with = "de_price")]
    pub price_gt21: Option<Price>,
}

/// Fee entries indexed by normalized procedure code. The first entry for a
/// code wins.
#[derive(Debug, Clone, Default)]
pub struct FeeSchedule {
    entries: HashMap<String, FeeEntry>,
}

impl FeeSchedule {
    pub fn from_entries(entries: impl IntoIterator<Item = FeeEntry>) -> Self {
        let mut map = HashMap::new();
        for entry in entries {
            map.entry(normalize_cdt_code(&entry.code)).or_insert(entry);
        }
        Self { entries: map }
    }

    /// Parse a JSON array of fee entries.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let entries: Vec<FeeEntry> = serde_json::from_str(json)?;
        Ok(Self::from_entries(entries))
    }

    pub fn get(&self, code: &str) -> Option<&FeeEntry> {
        self.entries.get(&normalize_cdt_code(code))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PriceCheck {
    Match,
    Mismatch { expected: Price },
    /// Every scheduled price is `NC`.
    NotCovered,
    UnknownCode,
    NoBilledAmount,
    NoScheduledPrice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub row_index: usize,
    pub patient_name: String,
    pub cdt_code: String,
    pub billed: Option<Money>,
    pub check: PriceCheck,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub matched: usize,
    pub mismatched: usize,
    pub not_covered: usize,
    pub unknown_code: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub items: Vec<Reconciliation>,
    pub summary: ReconcileSummary,
}

pub struct Reconciler {
    pub tolerance: Decimal,
    pub compare_single_against_both: bool,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::from_config(&ReconcileConfig::default())
    }
}

impl Reconciler {
    pub fn new(tolerance: Decimal, compare_single_against_both: bool) -> Self {
        Self {
            tolerance,
            compare_single_against_both,
        }
    }

    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self::new(config.tolerance, config.compare_single_against_both)
    }

    /// Check every row that carries a procedure code. Placeholder rows are
    /// left out of the report.
    pub fn reconcile(&self, rows: &[BillingRow], schedule: &FeeSchedule) -> ReconcileReport {
        let mut summary = ReconcileSummary::default();
        let items: Vec<Reconciliation> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !row.cdt_code.is_empty())
            .map(|(row_index, row)| {
                let check = self.check_row(row, schedule);
                match check {
                    PriceCheck::Match => summary.matched += 1,
                    PriceCheck::Mismatch { .. } => summary.mismatched += 1,
                    PriceCheck::NotCovered => summary.not_covered += 1,
                    PriceCheck::UnknownCode => summary.unknown_code += 1,
                    PriceCheck::NoBilledAmount | PriceCheck::NoScheduledPrice => {
                        summary.skipped += 1
                    }
                }
                Reconciliation {
                    row_index,
                    patient_name: row.patient_name.clone(),
                    cdt_code: row.cdt_code.clone(),
                    billed: row.billed,
                    check,
                }
            })
            .collect();
        ReconcileReport { items, summary }
    }

    pub fn check_row(&self, row: &BillingRow, schedule: &FeeSchedule) -> PriceCheck {
        let Some(entry) = schedule.get(&row.cdt_code) else {
            return PriceCheck::UnknownCode;
        };
        let Some(billed) = row.billed else {
            return PriceCheck::NoBilledAmount;
        };
        self.check_amount(billed, entry)
    }

    /// Compare one billed amount against an entry. A single `Price` wins
    /// over the tiers; with only tiers, `compare_single_against_both` decides
    /// whether every tier or any tier has to agree.
    pub fn check_amount(&self, billed: Money, entry: &FeeEntry) -> PriceCheck {
        let expected: Vec<Price> = match entry.price {
            Some(p) => vec![p],
            None => [entry.price_lteq21, entry.price_gt21].into_iter().flatten().collect(),
        };
        if expected.is_empty() {
            return PriceCheck::NoScheduledPrice;
        }
        if expected.iter().all(|p| *p == Price::NoCharge) {
            return PriceCheck::NotCovered;
        }

        let agrees = |p: &Price| match p {
            Price::Amount(m) => billed.abs_diff(*m) <= self.tolerance,
            Price::NoCharge => false,
        };
        if self.compare_single_against_both {
            match expected.iter().find(|p| !agrees(*p)) {
                Some(p) => PriceCheck::Mismatch { expected: *p },
                None => PriceCheck::Match,
            }
        } else if expected.iter().any(agrees) {
            PriceCheck::Match
        } else {
            PriceCheck::Mismatch { expected: expected[0] }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(code: &str, billed: Option<i64>) -> BillingRow {
        BillingRow {
            patient_name: "John Smith".into(),
            cdt_code: code.into(),
            billed: billed.map(Money::from_cents),
            success: true,
            ..Default::default()
        }
    }

    fn schedule() -> FeeSchedule {
        FeeSchedule::from_json(
            r#"[
                {"Procedure Code": "D2160", "Price": "$110.00"},
                {"Code": "D0120", "PriceLTEQ21": "45", "PriceGT21": "52.50"},
                {"procedure_code": "1110", "Price": "NC"},
                {"Procedure Code": "D0274", "PriceLTEQ21": 60, "PriceGT21": 60.004},
                {"Procedure Code": "D2160", "Price": "1.00"},
                {"Procedure Code": "D9999", "Price": ""}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn parse_price_tokens() {
        assert_eq!(Price::parse("nc"), Some(Price::NoCharge));
        assert_eq!(Price::parse(" $1,234.5 "), Some(Price::Amount(Money::from_cents(123450))));
        assert_eq!(Price::parse(""), None);
        assert_eq!(Price::parse("n/a"), None);
        assert_eq!(Price::Amount(Money::from_cents(9200)).to_string(), "92.00");
    }

    #[test]
    fn schedule_keeps_first_entry_and_normalizes_codes() {
        let s = schedule();
        assert_eq!(s.len(), 5);
        assert_eq!(s.get("2160").unwrap().price, Some(Price::Amount(Money::from_cents(11000))));
        assert_eq!(s.get("D1110").unwrap().price, Some(Price::NoCharge));
        assert_eq!(s.get("D9999").unwrap().price, None);
    }

    #[test]
    fn rejects_garbage_price() {
        assert!(FeeSchedule::from_json(r#"[{"Procedure Code": "D1", "Price": "abc"}]"#).is_err());
    }

    #[test]
    fn single_price_within_tolerance() {
        let r = Reconciler::default();
        let s = schedule();
        assert_eq!(r.check_row(&row("D2160", Some(11000)), &s), PriceCheck::Match);
        assert_eq!(
            r.check_row(&row("D2160", Some(10999)), &s),
            PriceCheck::Mismatch { expected: Price::Amount(Money::from_cents(11000)) }
        );
    }

    #[test]
    fn tiers_compared_against_both_by_default() {
        let r = Reconciler::default();
        let s = schedule();
        assert_eq!(
            r.check_row(&row("D0120", Some(4500)), &s),
            PriceCheck::Mismatch { expected: Price::Amount(Money::from_cents(5250)) }
        );
        assert_eq!(r.check_row(&row("D0274", Some(6000)), &s), PriceCheck::Match);
    }

    #[test]
    fn tiers_can_match_either() {
        let r = Reconciler::new(Decimal::new(5, 3), false);
        let s = schedule();
        assert_eq!(r.check_row(&row("D0120", Some(5250)), &s), PriceCheck::Match);
        assert_eq!(
            r.check_row(&row("D0120", Some(100)), &s),
            PriceCheck::Mismatch { expected: Price::Amount(Money::from_cents(4500)) }
        );
    }

    #[test]
    fn special_outcomes() {
        let r = Reconciler::default();
        let s = schedule();
        assert_eq!(r.check_row(&row("D1110", Some(5000)), &s), PriceCheck::NotCovered);
        assert_eq!(r.check_row(&row("D7140", Some(5000)), &s), PriceCheck::UnknownCode);
        assert_eq!(r.check_row(&row("D2160", None), &s), PriceCheck::NoBilledAmount);
        assert_eq!(r.check_row(&row("D9999", Some(5000)), &s), PriceCheck::NoScheduledPrice);
    }

    #[test]
    fn report_skips_placeholders_and_counts() {
        let rows = vec![
            row("D2160", Some(11000)),
            BillingRow::placeholder("Jane Doe".into(), String::new(), String::new()),
            row("D0120", Some(4500)),
            row("D7140", Some(100)),
        ];
        let report = Reconciler::default().reconcile(&rows, &schedule());
        assert_eq!(report.items.len(), 3);
        assert_eq!(report.items[1].row_index, 2);
        assert_eq!(
            report.summary,
            ReconcileSummary {
                matched: 1,
                mismatched: 1,
                not_covered: 0,
                unknown_code: 1,
                skipped: 0,
            }
        );
    }

    #[test]
    fn check_serializes_with_status_tag() {
        let json = serde_json::to_value(PriceCheck::Mismatch {
            expected: Price::Amount(Money::from_cents(5250)),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"status": "mismatch", "expected": "52.50"}));
    }
}
