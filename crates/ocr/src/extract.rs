use std::ops::Range;
use std::sync::OnceLock;

use eobscan_core::{normalize_cdt_code, BillingRow, Money};
use regex::Regex;
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::types::Line;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_member_name, r"(?i)\bMEMBER NAME\s*:\s*(.+)");
re!(re_member_id, r"(?i)\bMEMBER ID\s*:\s*([A-Za-z0-9]+)");
re!(re_icn, r"^\s*\d{12,}\b");
re!(re_amount, r"\b(?:\d{1,3}(?:,\d{3})+|\d+)\.\d{2}\b");
re!(re_date6, r"\b\d{6}\b");
re!(re_pd_row, r"(?i)\bPD\s+(D?\d{4})\b");
re!(re_tooth, r"^(?:[1-9]|[12][0-9]|3[0-2]|[A-Ta-t])$");
re!(re_surface, r"(?i)^[MDBOILFP]{1,4}$");

// ── Detail lines ─────────────────────────────────────────────────────────────

/// Fields parsed from one `PD` procedure line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailLine {
    pub cdt_code: String,
    pub tooth: Option<String>,
    pub surface: Option<String>,
    pub date_svc: Option<String>,
    pub billed: Money,
    pub allowed: Money,
    pub paid: Money,
}

/// Whether `text` carries the standalone, upper-case `PD` marker.
pub fn is_detail_candidate(text: &str) -> bool {
    format!(" {text} ").contains(" PD ")
}

/// Parse a procedure line. `None` when the line has no code after `PD` or
/// fewer than three money amounts.
///
/// The amounts are always the last three on the line; anything earlier is
/// taken to be a quantity or code.
pub fn parse_detail_line(text: &str) -> Option<DetailLine> {
    let caps = re_pd_row().captures(text)?;
    let code_match = caps.get(1)?;
    let cdt_code = normalize_cdt_code(code_match.as_str());

    let amounts: Vec<Money> = re_amount()
        .find_iter(text)
        .filter_map(|m| Money::parse_token(m.as_str()))
        .collect();
    let n = amounts.len();
    if n < 3 {
        return None;
    }
    let (billed, allowed, paid) = (amounts[n - 3], amounts[n - 2], amounts[n - 1]);

    let date_svc = re_date6()
        .find(&text[code_match.end()..])
        .map(|m| m.as_str().to_string());

    // The code always opens a token, so the tokens before it give its index.
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let code_idx = text[..code_match.start()].split_whitespace().count();

    let (mut tooth, mut surface) = (None, None);
    if code_idx < tokens.len() {
        let after = &tokens[code_idx + 1..];
        let date_idx = after
            .iter()
            .position(|t| t.len() == 6 && t.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(after.len());
        let window = &after[..date_idx];

        tooth = window
            .iter()
            .find(|t| re_tooth().is_match(t))
            .map(|t| t.to_uppercase());

        let start = tooth
            .as_deref()
            .and_then(|found| window.iter().position(|t| t.to_uppercase() == found))
            .map_or(0, |j| j + 1);
        surface = window[start..]
            .iter()
            .find(|t| re_surface().is_match(t))
            .map(|t| t.to_uppercase());
    }

    Some(DetailLine {
        cdt_code,
        tooth,
        surface,
        date_svc,
        billed,
        allowed,
        paid,
    })
}

// ── Member blocks ────────────────────────────────────────────────────────────

/// Line ranges running from each member header up to the next one.
pub fn member_blocks<S: AsRef<str>>(texts: &[S]) -> Vec<Range<usize>> {
    let starts: Vec<usize> = texts
        .iter()
        .enumerate()
        .filter(|(_, t)| re_member_name().is_match(t.as_ref()))
        .map(|(i, _)| i)
        .collect();
    starts
        .iter()
        .enumerate()
        .map(|(k, &start)| start..starts.get(k + 1).copied().unwrap_or(texts.len()))
        .collect()
}

/// Capitalize each letter that follows a non-letter; lower-case the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(c);
            prev_letter = false;
        }
    }
    out
}

// ── Public extraction API ─────────────────────────────────────────────────────

/// Turns reconstructed statement lines into billing rows.
///
/// Never fails: lines that do not parse are skipped, and a document with no
/// member header yields no rows.
#[derive(Debug, Clone, Default)]
pub struct RecordExtractor {
    config: ExtractionConfig,
}

impl RecordExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, lines: &[Line]) -> Vec<BillingRow> {
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        self.extract_texts(&texts)
    }

    pub fn extract_texts<S: AsRef<str>>(&self, texts: &[S]) -> Vec<BillingRow> {
        let mut rows = Vec::new();
        for block in member_blocks(texts) {
            let name = self.member_name(texts[block.start].as_ref());
            let id = texts[block.clone()]
                .iter()
                .find_map(|t| re_member_id().captures(t.as_ref()))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let icn = self.icn_above(texts, block.start);

            let before = rows.len();
            for text in &texts[block.clone()] {
                let text = text.as_ref();
                if !is_detail_candidate(text) {
                    continue;
                }
                let Some(detail) = parse_detail_line(text) else {
                    debug!(line = text, "Skipping unparseable detail line");
                    continue;
                };
                rows.push(BillingRow {
                    patient_name: name.clone(),
                    patient_id: id.clone(),
                    icn: icn.clone(),
                    cdt_code: detail.cdt_code,
                    tooth: detail.tooth.unwrap_or_default(),
                    surface: if self.config.include_surface { detail.surface } else { None },
                    date_svc: detail.date_svc.unwrap_or_default(),
                    billed: Some(detail.billed),
                    allowed: Some(detail.allowed),
                    paid: Some(detail.paid),
                    success: true,
                    source_file: None,
                });
            }
            if rows.len() == before {
                rows.push(BillingRow::placeholder(name, id, icn));
            }
        }
        rows
    }

    fn member_name(&self, header: &str) -> String {
        let Some(raw) = re_member_name().captures(header).and_then(|c| c.get(1)) else {
            return String::new();
        };
        let mut name = raw.as_str().trim();
        for marker in &self.config.name_stop_markers {
            let marker = marker.to_ascii_uppercase();
            if let Some(idx) = name.to_ascii_uppercase().find(&marker) {
                name = name[..idx].trim();
            }
        }
        title_case(name)
    }

    /// Nearest line above `header`, within the lookback window, that opens
    /// with a run of twelve or more digits.
    fn icn_above<S: AsRef<str>>(&self, texts: &[S], header: usize) -> String {
        let floor = header.saturating_sub(self.config.icn_lookback);
        (floor..header)
            .rev()
            .find_map(|k| re_icn().find(texts[k].as_ref()))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
