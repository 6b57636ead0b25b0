//! Invoice number formatting.
//!
//! Allocation of the sequence value itself lives with the stores in
//! `billing-infra`; this module only turns `(type, year, sequence)` into the
//! printed number.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PATTERN: &str = "{type}-{year}-{sequence}";
pub const DEFAULT_PADDING: usize = 6;
/// Widest zero-padding accepted; `u64::MAX` has 20 digits.
pub const MAX_PADDING: usize = 20;

/// Invoice flow. Unknown flows are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InvoiceType {
    /// Platform operator invoicing a division.
    HexekoToDivision,
    /// Division invoicing one of its financers.
    DivisionToFinancer,
    Other(String),
}

impl InvoiceType {
    pub fn as_str(&self) -> &str {
        match self {
            InvoiceType::HexekoToDivision => "hexeko_to_division",
            InvoiceType::DivisionToFinancer => "division_to_financer",
            InvoiceType::Other(raw) => raw,
        }
    }
}

impl From<&str> for InvoiceType {
    fn from(raw: &str) -> Self {
        match raw {
            "hexeko_to_division" => InvoiceType::HexekoToDivision,
            "division_to_financer" => InvoiceType::DivisionToFinancer,
            other => InvoiceType::Other(other.to_string()),
        }
    }
}

impl From<String> for InvoiceType {
    fn from(raw: String) -> Self {
        InvoiceType::from(raw.as_str())
    }
}

impl From<InvoiceType> for String {
    fn from(value: InvoiceType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Template, zero-padding and per-type tokens used to print invoice numbers.
///
/// Deserialization goes through [`NumberFormat::new`], so a stored format is
/// checked like a configured one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawNumberFormat")]
pub struct NumberFormat {
    pattern: String,
    padding: usize,
    type_tokens: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct RawNumberFormat {
    pattern: String,
    padding: usize,
    #[serde(default)]
    type_tokens: BTreeMap<String, String>,
}

impl From<RawNumberFormat> for NumberFormat {
    fn from(raw: RawNumberFormat) -> Self {
        NumberFormat::new(raw.pattern, raw.padding, raw.type_tokens)
    }
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.to_string(),
            padding: DEFAULT_PADDING,
            type_tokens: default_type_tokens(),
        }
    }
}

fn default_type_tokens() -> BTreeMap<String, String> {
    BTreeMap::from([
        (InvoiceType::HexekoToDivision.as_str().to_string(), "HEX".to_string()),
        (InvoiceType::DivisionToFinancer.as_str().to_string(), "DIV".to_string()),
    ])
}

impl NumberFormat {
    /// Builds a format, replacing unusable settings with defaults.
    ///
    /// A pattern without `{sequence}` could print the same number twice, so it
    /// is rejected. Padding outside `1..=MAX_PADDING` and an empty token map
    /// fall back to their defaults.
    pub fn new(pattern: impl Into<String>, padding: usize, type_tokens: BTreeMap<String, String>) -> Self {
        let mut pattern = pattern.into();
        if pattern.trim().is_empty() || !pattern.contains("{sequence}") {
            tracing::warn!(%pattern, "invoice number pattern unusable, falling back to default");
            pattern = DEFAULT_PATTERN.to_string();
        }

        let padding = if (1..=MAX_PADDING).contains(&padding) {
            padding
        } else {
            tracing::warn!(padding, "invoice number padding out of range, falling back to default");
            DEFAULT_PADDING
        };

        let type_tokens = if type_tokens.is_empty() {
            tracing::warn!("invoice type token map empty, falling back to defaults");
            default_type_tokens()
        } else {
            type_tokens
        };

        Self {
            pattern,
            padding,
            type_tokens,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    pub fn type_tokens(&self) -> &BTreeMap<String, String> {
        &self.type_tokens
    }

    /// Printed token for a type: the mapped token, otherwise the type name
    /// upper-cased with `-` and spaces turned into `_`.
    pub fn type_token(&self, invoice_type: &InvoiceType) -> String {
        match self.type_tokens.get(invoice_type.as_str()) {
            Some(token) => token.clone(),
            None => invoice_type
                .as_str()
                .chars()
                .map(|c| match c {
                    '-' | ' ' => '_',
                    other => other.to_ascii_uppercase(),
                })
                .collect(),
        }
    }

    pub fn format(&self, invoice_type: &InvoiceType, year: i32, sequence: u64) -> String {
        let sequence = format!("{sequence:0>width$}", width = self.padding);
        self.pattern
            .replace("{type}", &self.type_token(invoice_type))
            .replace("{year}", &year.to_string())
            .replace("{sequence}", &sequence)
    }
}
