//! Node configuration with TOML file support.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use dareduel_battle::BothMissedPolicy;
use dareduel_ledger::RetryPolicy;
use dareduel_matchmaking::MatchConfig;
use dareduel_types::{time::utc_offset, Coins};

use crate::{LogFormat, NodeError};

/// Configuration for a DareDuel node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Every field has a default, so
/// an empty file is a valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory for the LMDB environment.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in MiB.
    #[serde(default = "default_map_size_mb")]
    pub lmdb_map_size_mb: usize,

    #[serde(default = "default_true")]
    pub enable_rpc: bool,

    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    #[serde(default = "default_true")]
    pub enable_websocket: bool,

    #[serde(default = "default_ws_port")]
    pub websocket_port: u16,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter, e.g. "info" or "info,dareduel_ledger=debug".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds both sides have to accept a proposed match.
    #[serde(default = "default_match_deadline_secs")]
    pub match_deadline_secs: u64,

    /// Attempts per ledger transaction before giving up on conflicts.
    #[serde(default = "default_ledger_max_attempts")]
    pub ledger_max_attempts: u32,

    /// First retry delay; doubles per attempt.
    #[serde(default = "default_ledger_base_delay_ms")]
    pub ledger_base_delay_ms: u64,

    /// Local hour (0-23) at which the forfeit sweep runs.
    #[serde(default)]
    pub sweep_hour: u32,

    /// Offset of the battle calendar from UTC, in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Coins granted when an account is opened.
    #[serde(default = "default_signup_grant")]
    pub signup_grant_coins: u64,

    #[serde(default)]
    pub both_missed_policy: BothMissedPolicy,

    /// Base URL that stored media references are resolved against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_base_url: Option<String>,

    /// How often gauges are refreshed from the running subsystems.
    #[serde(default = "default_metrics_refresh_secs")]
    pub metrics_refresh_secs: u64,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./dareduel_data")
}

fn default_map_size_mb() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_rpc_port() -> u16 {
    7077
}

fn default_ws_port() -> u16 {
    7078
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_match_deadline_secs() -> u64 {
    dareduel_matchmaking::DEFAULT_DEADLINE_SECS
}

fn default_ledger_max_attempts() -> u32 {
    dareduel_ledger::retry::DEFAULT_MAX_ATTEMPTS
}

fn default_ledger_base_delay_ms() -> u64 {
    dareduel_ledger::retry::DEFAULT_BASE_DELAY_MS
}

fn default_signup_grant() -> u64 {
    100
}

fn default_metrics_refresh_secs() -> u64 {
    15
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.sweep_hour > 23 {
            return Err(NodeError::Config(format!(
                "sweep_hour must be 0-23, got {}",
                self.sweep_hour
            )));
        }
        if self.match_deadline_secs == 0 {
            return Err(NodeError::Config("match_deadline_secs must be positive".into()));
        }
        if self.ledger_max_attempts == 0 {
            return Err(NodeError::Config("ledger_max_attempts must be positive".into()));
        }
        if self.lmdb_map_size_mb == 0 {
            return Err(NodeError::Config("lmdb_map_size_mb must be positive".into()));
        }
        self.utc_offset()?;
        self.log_format()?;
        Ok(())
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, NodeError> {
        utc_offset(self.utc_offset_minutes).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        LogFormat::from_str(&self.log_format)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.ledger_max_attempts,
            Duration::from_millis(self.ledger_base_delay_ms),
        )
    }

    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            deadline: Duration::from_secs(self.match_deadline_secs),
            ..MatchConfig::default()
        }
    }

    pub fn signup_grant(&self) -> Coins {
        Coins::new(self.signup_grant_coins)
    }

    pub fn lmdb_map_size(&self) -> usize {
        self.lmdb_map_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            lmdb_map_size_mb: default_map_size_mb(),
            enable_rpc: default_true(),
            rpc_port: default_rpc_port(),
            enable_websocket: default_true(),
            websocket_port: default_ws_port(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            match_deadline_secs: default_match_deadline_secs(),
            ledger_max_attempts: default_ledger_max_attempts(),
            ledger_base_delay_ms: default_ledger_base_delay_ms(),
            sweep_hour: 0,
            utc_offset_minutes: 0,
            signup_grant_coins: default_signup_grant(),
            both_missed_policy: BothMissedPolicy::default(),
            media_base_url: None,
            metrics_refresh_secs: default_metrics_refresh_secs(),
        }
    }
}
