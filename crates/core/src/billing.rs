use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("Invalid service date token: '{0}'")]
    InvalidServiceDate(String),
}

/// One structured line of a billing statement.
///
/// Serialized field names match the report columns consumed downstream.
/// Empty strings and `None` amounts mean "not found on the statement".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingRow {
    #[serde(rename = "Patient Name")]
    pub patient_name: String,
    #[serde(rename = "Patient ID")]
    pub patient_id: String,
    #[serde(rename = "ICN")]
    pub icn: String,
    #[serde(rename = "CDT Code")]
    pub cdt_code: String,
    #[serde(rename = "Tooth")]
    pub tooth: String,
    #[serde(rename = "Surface", default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<String>,
    /// Raw six-digit `MMDDYY` token.
    #[serde(rename = "Date SVC")]
    pub date_svc: String,
    #[serde(rename = "Billed Amount")]
    pub billed: Option<Money>,
    #[serde(rename = "Allowed Amount")]
    pub allowed: Option<Money>,
    #[serde(rename = "Paid Amount")]
    pub paid: Option<Money>,
    #[serde(rename = "Extraction Success")]
    pub success: bool,
    #[serde(rename = "Source File", default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

impl BillingRow {
    /// Row emitted for a member block that produced no detail lines.
    pub fn placeholder(patient_name: String, patient_id: String, icn: String) -> Self {
        let success = !patient_name.is_empty() || !patient_id.is_empty();
        BillingRow {
            patient_name,
            patient_id,
            icn,
            success,
            ..Default::default()
        }
    }

    pub fn has_amounts(&self) -> bool {
        self.billed.is_some() && self.allowed.is_some() && self.paid.is_some()
    }

    /// Parse the `MMDDYY` service date. Returns `Ok(None)` when no date was captured.
    pub fn service_date(&self) -> Result<Option<NaiveDate>, RowError> {
        if self.date_svc.is_empty() {
            return Ok(None);
        }
        NaiveDate::parse_from_str(&self.date_svc, "%m%d%y")
            .map(Some)
            .map_err(|_| RowError::InvalidServiceDate(self.date_svc.clone()))
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_file = Some(source.into());
        self
    }
}

/// Normalize a procedure code token so it always carries the `D` prefix.
pub fn normalize_cdt_code(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    if upper.starts_with('D') {
        upper
    } else {
        format!("D{upper}")
    }
}
