//! Runtime configuration.
//!
//! One JSON file describes the accounts (with their token files and PDF
//! passwords), the four statement sources and the scheduler cadence.
//! Every field has a sensible default so a minimal config only needs to
//! name accounts.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::source::EndBound;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config {path} is not valid JSON: {source}")]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// The statement sources the pipeline knows how to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum SourceKind {
    /// Brokerage allotment reports (HTML transaction table).
    Brokerage,
    /// Payment-platform order confirmations (HTML order details).
    Order,
    /// Pension account statements (PDF attachment).
    Pension,
    /// Equity contract notes (PDF attachment).
    ContractNotes,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Brokerage,
        SourceKind::Order,
        SourceKind::Pension,
        SourceKind::ContractNotes,
    ];

    /// Key into an account's token map. Sources sharing a mailbox share a
    /// token file by pointing their service keys at the same path.
    pub fn service_key(&self) -> &'static str {
        match self {
            SourceKind::Brokerage => "brokerage",
            SourceKind::Order => "order",
            SourceKind::Pension => "pension",
            SourceKind::ContractNotes => "contract_notes",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_key())
    }
}

/// One mail account: its per-service token files and, when the account
/// receives protected statements, the PDF password.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// Token file per service key; `default` applies to any service
    /// without its own entry.
    #[serde(default)]
    pub tokens: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub pdf_password: Option<String>,
}

impl AccountConfig {
    /// Token file for a source's service, falling back to `default`.
    pub fn token_for(&self, kind: SourceKind) -> Option<&Path> {
        self.tokens
            .get(kind.service_key())
            .or_else(|| self.tokens.get("default"))
            .map(PathBuf::as_path)
    }
}

/// One source's search subject, output layout and subscribed accounts.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub subject: String,
    /// Relative to `data_root`; `{email}` expands to the account address.
    pub output_dir: String,
    #[serde(default)]
    pub accounts: Vec<String>,
}

impl SourceConfig {
    pub fn output_dir_for(&self, email: &str, data_root: &Path) -> PathBuf {
        data_root.join(self.output_dir.replace("{email}", email))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sources {
    #[serde(default = "default_brokerage")]
    pub brokerage: SourceConfig,
    #[serde(default = "default_order")]
    pub order: SourceConfig,
    #[serde(default = "default_pension")]
    pub pension: SourceConfig,
    #[serde(default = "default_contract_notes")]
    pub contract_notes: SourceConfig,
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            brokerage: default_brokerage(),
            order: default_order(),
            pension: default_pension(),
            contract_notes: default_contract_notes(),
        }
    }
}

fn default_brokerage() -> SourceConfig {
    SourceConfig {
        subject: "Coin by Zerodha - Allotment Report".to_string(),
        output_dir: "zerodha/{email}".to_string(),
        accounts: Vec::new(),
    }
}

fn default_order() -> SourceConfig {
    SourceConfig {
        subject: "Order Sent to AMC".to_string(),
        output_dir: "paytmmoney/{email}".to_string(),
        accounts: Vec::new(),
    }
}

fn default_pension() -> SourceConfig {
    SourceConfig {
        subject: "Monthly Transaction Statement of your NPS account for the period".to_string(),
        output_dir: "nps/{email}/transactions".to_string(),
        accounts: Vec::new(),
    }
}

fn default_contract_notes() -> SourceConfig {
    SourceConfig {
        subject: "Combined Equity Contract Note for".to_string(),
        output_dir: "equity/{email}/contract_notes".to_string(),
        accounts: Vec::new(),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_minutes: u64,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    #[serde(default)]
    pub end_bound: EndBound,
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    /// Enables statement summarization when present.
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
    #[serde(default)]
    pub sources: Sources,
}

fn default_refresh_interval() -> u64 {
    5
}

fn default_lookback_days() -> i64 {
    90
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_minutes: default_refresh_interval(),
            lookback_days: default_lookback_days(),
            end_bound: EndBound::default(),
            data_root: default_data_root(),
            gemini_api_key: None,
            accounts: BTreeMap::new(),
            sources: Sources::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".mailfolio")
            .join("config.json")
    }

    pub fn source(&self, kind: SourceKind) -> &SourceConfig {
        match kind {
            SourceKind::Brokerage => &self.sources.brokerage,
            SourceKind::Order => &self.sources.order,
            SourceKind::Pension => &self.sources.pension,
            SourceKind::ContractNotes => &self.sources.contract_notes,
        }
    }
}
