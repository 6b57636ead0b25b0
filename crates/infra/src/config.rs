//! Billing configuration.
//!
//! Loaded from environment variables (`BillingConfig::from_env`) or a JSON
//! document (`BillingConfig::from_json`). Environment values that do not parse
//! are ignored with a warning; the request path never fails on configuration.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use billing_invoicing::numbering::{DEFAULT_PADDING, DEFAULT_PATTERN};
use billing_invoicing::NumberFormat;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;
pub const DEFAULT_PDF_TTL_HOURS: u64 = 24;
pub const DEFAULT_PDF_DISK: &str = "local";
pub const DEFAULT_PDF_PATH_PREFIX: &str = "invoices";
pub const DEFAULT_PRORATA_TTL_SECONDS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    pub numbering: NumberingConfig,
    pub pdf_cache: PdfCacheConfig,
    pub prorata: ProrataConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberingConfig {
    pub pattern: String,
    pub padding: usize,
    /// Invoice type name → printed token.
    pub type_tokens: BTreeMap<String, String>,
    /// Retry ceiling for number collisions.
    pub max_attempts: u32,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        let format = NumberFormat::default();
        Self {
            pattern: DEFAULT_PATTERN.to_string(),
            padding: DEFAULT_PADDING,
            type_tokens: format.type_tokens().clone(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl NumberingConfig {
    pub fn number_format(&self) -> NumberFormat {
        NumberFormat::new(self.pattern.clone(), self.padding, self.type_tokens.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfCacheConfig {
    pub enabled: bool,
    pub ttl_hours: u64,
    pub disk: String,
    pub path_prefix: String,
}

impl Default for PdfCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_hours: DEFAULT_PDF_TTL_HOURS,
            disk: DEFAULT_PDF_DISK.to_string(),
            path_prefix: DEFAULT_PDF_PATH_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProrataConfig {
    pub cache_ttl_seconds: u64,
}

impl Default for ProrataConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: DEFAULT_PRORATA_TTL_SECONDS,
        }
    }
}

impl ProrataConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

impl BillingConfig {
    /// Read the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(pattern) = lookup("INVOICE_NUMBER_PATTERN") {
            config.numbering.pattern = pattern;
        }
        parse_into(&lookup, "INVOICE_NUMBER_PADDING", &mut config.numbering.padding);
        parse_into(&lookup, "INVOICE_NUMBER_MAX_ATTEMPTS", &mut config.numbering.max_attempts);
        if let Some(raw) = lookup("INVOICE_TYPE_TOKENS") {
            match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(tokens) => config.numbering.type_tokens = tokens,
                Err(e) => tracing::warn!(error = %e, "INVOICE_TYPE_TOKENS is not a JSON object of strings; using defaults"),
            }
        }
        if config.numbering.max_attempts == 0 {
            tracing::warn!("INVOICE_NUMBER_MAX_ATTEMPTS must be positive; using {DEFAULT_MAX_ATTEMPTS}");
            config.numbering.max_attempts = DEFAULT_MAX_ATTEMPTS;
        }

        parse_into(&lookup, "INVOICE_PDF_CACHE_ENABLED", &mut config.pdf_cache.enabled);
        parse_into(&lookup, "INVOICE_PDF_CACHE_TTL_HOURS", &mut config.pdf_cache.ttl_hours);
        if let Some(disk) = lookup("INVOICE_PDF_DISK") {
            config.pdf_cache.disk = disk;
        }
        if let Some(prefix) = lookup("INVOICE_PDF_PATH_PREFIX") {
            config.pdf_cache.path_prefix = prefix.trim_matches('/').to_string();
        }

        parse_into(&lookup, "PRORATA_CACHE_TTL_SECONDS", &mut config.prorata.cache_ttl_seconds);

        config
    }

    /// Parse a JSON document; missing sections take their defaults.
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).context("failed to parse billing configuration")
    }
}

fn parse_into<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, slot: &mut T)
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(e) => tracing::warn!(variable = name, value = %raw, error = %e, "invalid configuration value; keeping default"),
    }
}
