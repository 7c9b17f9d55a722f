//! DareDuel daemon: entry point for running a node.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use dareduel_battle::BothMissedPolicy;
use dareduel_node::{init_logging, DuelNode, NodeConfig};

#[derive(Parser)]
#[command(name = "dareduel-daemon", about = "DareDuel coordination node")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "DAREDUEL_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

/// Settings that may be given on the command line or in the environment.
#[derive(clap::Args, Default)]
struct Overrides {
    /// Data directory for LMDB storage.
    #[arg(long, env = "DAREDUEL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable the RPC server ("true" or "false").
    #[arg(long, env = "DAREDUEL_ENABLE_RPC")]
    enable_rpc: Option<bool>,

    #[arg(long, env = "DAREDUEL_RPC_PORT")]
    rpc_port: Option<u16>,

    /// Enable the WebSocket server ("true" or "false").
    #[arg(long, env = "DAREDUEL_ENABLE_WEBSOCKET")]
    enable_websocket: Option<bool>,

    #[arg(long, env = "DAREDUEL_WS_PORT")]
    websocket_port: Option<u16>,

    /// "human" or "json".
    #[arg(long, env = "DAREDUEL_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "DAREDUEL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Seconds both players have to accept a proposed match.
    #[arg(long, env = "DAREDUEL_MATCH_DEADLINE_SECS")]
    match_deadline_secs: Option<u64>,

    /// Local hour (0-23) of the daily forfeit sweep.
    #[arg(long, env = "DAREDUEL_SWEEP_HOUR")]
    sweep_hour: Option<u32>,

    /// Offset of the battle calendar from UTC, in minutes.
    #[arg(long, env = "DAREDUEL_UTC_OFFSET_MINUTES", allow_hyphen_values = true)]
    utc_offset_minutes: Option<i32>,

    #[arg(long, env = "DAREDUEL_SIGNUP_GRANT")]
    signup_grant_coins: Option<u64>,

    /// What happens when both players miss a day.
    #[arg(long, env = "DAREDUEL_BOTH_MISSED", value_parser = parse_policy)]
    both_missed_policy: Option<BothMissedPolicy>,

    /// Base URL stored media references resolve against.
    #[arg(long, env = "DAREDUEL_MEDIA_BASE_URL")]
    media_base_url: Option<String>,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Node operations.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Configuration helpers.
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node until SIGINT/SIGTERM.
    Run,
}

#[derive(clap::Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Print,
}

fn parse_policy(s: &str) -> Result<BothMissedPolicy, String> {
    match s.to_ascii_lowercase().as_str() {
        "refund" => Ok(BothMissedPolicy::Refund),
        "keep_active" | "keep-active" => Ok(BothMissedPolicy::KeepActive),
        other => Err(format!("unknown policy {other:?}, expected refund or keep_active")),
    }
}

impl Overrides {
    fn apply(self, base: NodeConfig) -> NodeConfig {
        NodeConfig {
            data_dir: self.data_dir.unwrap_or(base.data_dir),
            enable_rpc: self.enable_rpc.unwrap_or(base.enable_rpc),
            rpc_port: self.rpc_port.unwrap_or(base.rpc_port),
            enable_websocket: self.enable_websocket.unwrap_or(base.enable_websocket),
            websocket_port: self.websocket_port.unwrap_or(base.websocket_port),
            log_format: self.log_format.unwrap_or(base.log_format),
            log_level: self.log_level.unwrap_or(base.log_level),
            match_deadline_secs: self.match_deadline_secs.unwrap_or(base.match_deadline_secs),
            sweep_hour: self.sweep_hour.unwrap_or(base.sweep_hour),
            utc_offset_minutes: self.utc_offset_minutes.unwrap_or(base.utc_offset_minutes),
            signup_grant_coins: self.signup_grant_coins.unwrap_or(base.signup_grant_coins),
            both_missed_policy: self.both_missed_policy.unwrap_or(base.both_missed_policy),
            media_base_url: self.media_base_url.or(base.media_base_url),
            ..base
        }
    }
}

fn load_config(path: Option<&PathBuf>, overrides: Overrides) -> anyhow::Result<NodeConfig> {
    let base = match path {
        Some(path) => NodeConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => NodeConfig::default(),
    };
    let config = overrides.apply(base);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref(), cli.overrides)?;

    match cli.command {
        Command::Config {
            action: ConfigAction::Print,
        } => {
            print!("{}", config.to_toml_string()?);
        }
        Command::Node {
            action: NodeAction::Run,
        } => {
            init_logging(config.log_format()?, &config.log_level)?;
            if let Some(path) = &cli.config {
                tracing::info!("loaded config from {}", path.display());
            }
            tracing::info!(
                "starting DareDuel node (RPC:{}, WS:{}, sweep at {:02}:00 UTC{:+}min)",
                if config.enable_rpc {
                    config.rpc_port.to_string()
                } else {
                    "off".into()
                },
                if config.enable_websocket {
                    config.websocket_port.to_string()
                } else {
                    "off".into()
                },
                config.sweep_hour,
                config.utc_offset_minutes,
            );

            let mut node = DuelNode::new(config)?;
            node.start().await?;
            node.shutdown.wait_for_signal().await;

            tracing::info!("shutdown signal received, stopping node");
            node.stop().await?;
            tracing::info!("DareDuel daemon exited cleanly");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_file_and_leave_the_rest() {
        let base = NodeConfig {
            rpc_port: 9000,
            sweep_hour: 4,
            media_base_url: Some("https://file.example".into()),
            ..NodeConfig::default()
        };
        let config = Overrides {
            rpc_port: Some(9100),
            both_missed_policy: Some(BothMissedPolicy::KeepActive),
            ..Overrides::default()
        }
        .apply(base);
        assert_eq!(config.rpc_port, 9100);
        assert_eq!(config.sweep_hour, 4);
        assert_eq!(config.both_missed_policy, BothMissedPolicy::KeepActive);
        assert_eq!(config.media_base_url.as_deref(), Some("https://file.example"));
    }

    #[test]
    fn policy_names_parse() {
        assert_eq!(parse_policy("refund"), Ok(BothMissedPolicy::Refund));
        assert_eq!(parse_policy("keep-active"), Ok(BothMissedPolicy::KeepActive));
        assert!(parse_policy("coin_flip").is_err());
    }

    #[test]
    fn cli_parses_nested_subcommands() {
        let cli = Cli::try_parse_from([
            "dareduel-daemon",
            "--utc-offset-minutes",
            "-300",
            "config",
            "print",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Print
            }
        ));
        assert_eq!(cli.overrides.utc_offset_minutes, Some(-300));
    }
}
