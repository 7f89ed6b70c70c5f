//! Configuration management for OrderChain

use crate::error::{ChainError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Length of a hex-encoded SHA-256 digest; no difficulty above this can be met.
pub const MAX_DIFFICULTY: u32 = 64;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub consensus: ChainConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// A node with mining disabled still validates and relays blocks.
    #[serde(default = "default_mining_enabled")]
    pub mining_enabled: bool,
}

/// Process-wide constants shared by every node of a network.
///
/// Handed explicitly to the matching engine, the miner and the blockchain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChainConfig {
    /// Required count of leading `'0'` hex characters in a block hash.
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    /// Nonce attempts the miner may spend per tick before yielding.
    #[serde(default = "default_mining_iterations_per_tick")]
    pub mining_iterations_per_tick: u64,
    /// Asset every other asset is priced in.
    #[serde(default = "default_currency_asset")]
    pub default_currency_asset: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_data_path")]
    pub path: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            tick_interval_ms: default_tick_interval_ms(),
            mining_enabled: default_mining_enabled(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            mining_iterations_per_tick: default_mining_iterations_per_tick(),
            default_currency_asset: default_currency_asset(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
        }
    }
}

impl ChainConfig {
    pub fn new(difficulty: u32, mining_iterations_per_tick: u64, default_currency_asset: &str) -> Self {
        Self {
            difficulty,
            mining_iterations_per_tick,
            default_currency_asset: default_currency_asset.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(ChainError::ConfigError(format!(
                "consensus.difficulty must be at most {}, got {}",
                MAX_DIFFICULTY, self.difficulty
            )));
        }
        if self.mining_iterations_per_tick == 0 {
            return Err(ChainError::ConfigError(
                "consensus.mining_iterations_per_tick must be greater than zero".to_string(),
            ));
        }
        if self.default_currency_asset.is_empty() {
            return Err(ChainError::ConfigError(
                "consensus.default_currency_asset must be set".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.consensus.validate()?;

        if self.node.client_id.is_empty() {
            return Err(ChainError::ConfigError("node.client_id must be set".to_string()));
        }
        if self.node.tick_interval_ms == 0 {
            return Err(ChainError::ConfigError(
                "node.tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.database.path.is_empty() {
            return Err(ChainError::ConfigError("database.path must be set".to_string()));
        }
        Ok(())
    }
}

/// Parse and validate a configuration document.
pub fn parse_config(config_str: &str) -> Result<Config> {
    let config: Config = toml::from_str(config_str)?;
    config.validate()?;
    Ok(config)
}

/// Load the configuration at `path`, falling back to defaults when the file is absent.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }
    let config_str = fs::read_to_string(path)?;
    parse_config(&config_str)
}

fn default_client_id() -> String {
    "node".to_string()
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_mining_enabled() -> bool {
    true
}

fn default_difficulty() -> u32 {
    3
}

fn default_mining_iterations_per_tick() -> u64 {
    10_000
}

fn default_currency_asset() -> String {
    "BTC".to_string()
}

fn default_data_path() -> String {
    "./data/orderchain.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
            [node]
            client_id = "Ada"
            tick_interval_ms = 250
            mining_enabled = false

            [consensus]
            difficulty = 2
            mining_iterations_per_tick = 500
            default_currency_asset = "USD"

            [database]
            path = "/tmp/chain.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.node.client_id, "Ada");
        assert_eq!(config.node.tick_interval_ms, 250);
        assert!(!config.node.mining_enabled);
        assert_eq!(config.consensus, ChainConfig::new(2, 500, "USD"));
        assert_eq!(config.database.path, "/tmp/chain.db");
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = parse_config("[node]\nclient_id = \"Bob\"\n").unwrap();
        assert_eq!(config.node.client_id, "Bob");
        assert!(config.node.mining_enabled);
        assert_eq!(config.consensus, ChainConfig::default());
        assert_eq!(config.consensus.default_currency_asset, "BTC");
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let result = parse_config("[consensus]\nmining_iterations_per_tick = 0\n");
        assert!(matches!(result, Err(ChainError::ConfigError(_))));
    }

    #[test]
    fn test_rejects_unreachable_difficulty() {
        assert!(ChainConfig::new(65, 10, "BTC").validate().is_err());
        assert!(ChainConfig::new(64, 10, "BTC").validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_currency() {
        assert!(ChainConfig::new(1, 10, "").validate().is_err());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let config = load_config("/nonexistent/orderchain/config.toml").unwrap();
        assert_eq!(config.node.client_id, "node");
        assert_eq!(config.database.path, "./data/orderchain.db");
    }
}
