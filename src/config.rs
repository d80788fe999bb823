//! Configuration management for TallyChain

use crate::error::{ChainError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
}

/// Consensus parameters threaded into every `Blockchain` instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChainConfig {
    /// Required leading zero bits of every block hash.
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    #[serde(default = "default_coinbase_reward")]
    pub coinbase_reward: u64,
    #[serde(default = "default_genesis_timestamp")]
    pub genesis_timestamp: u64,
    #[serde(default = "default_block_cache_size")]
    pub block_cache_size: usize,
    /// Zero disables the limit.
    #[serde(default = "default_mempool_capacity")]
    pub mempool_capacity: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            coinbase_reward: default_coinbase_reward(),
            genesis_timestamp: default_genesis_timestamp(),
            block_cache_size: default_block_cache_size(),
            mempool_capacity: default_mempool_capacity(),
        }
    }
}

impl ChainConfig {
    /// Low-difficulty parameters for tests and throwaway chains.
    pub fn with_difficulty(difficulty: u32) -> Self {
        Self {
            difficulty,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > 255 {
            return Err(ChainError::ConfigError(format!(
                "chain.difficulty must be at most 255, got {}",
                self.difficulty
            )));
        }
        if self.coinbase_reward == 0 {
            return Err(ChainError::ConfigError(
                "chain.coinbase_reward must be greater than zero".to_string(),
            ));
        }
        if self.genesis_timestamp == 0 {
            return Err(ChainError::ConfigError(
                "chain.genesis_timestamp must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Maximum number of mempool transactions pulled into one block.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub beneficiary_address: Option<String>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            batch_size: default_batch_size(),
            beneficiary_address: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_wallet_dir")]
    pub dir: String,
    #[serde(default = "default_mempool_file")]
    pub mempool_file: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            dir: default_wallet_dir(),
            mempool_file: default_mempool_file(),
        }
    }
}

/// Load configuration from `path`, falling back to defaults when the file is absent.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    let config: Config = match fs::read_to_string(path) {
        Ok(config_str) => toml::from_str(&config_str)?,
        // Provide sane defaults when config.toml is absent
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(e) => return Err(e.into()),
    };

    config.chain.validate()?;

    if config.database.path.is_empty() {
        return Err(ChainError::ConfigError(
            "database.path must be set in config.toml".to_string(),
        ));
    }

    if config.miner.threads == 0 {
        return Err(ChainError::ConfigError(
            "miner.threads must be at least 1".to_string(),
        ));
    }

    Ok(config)
}

fn default_difficulty() -> u32 {
    18
}

fn default_coinbase_reward() -> u64 {
    50
}

fn default_genesis_timestamp() -> u64 {
    1_672_531_200
}

fn default_block_cache_size() -> usize {
    128
}

fn default_mempool_capacity() -> usize {
    10_000
}

fn default_db_path() -> String {
    "./data/tallychain.db".to_string()
}

fn default_threads() -> usize {
    1
}

fn default_batch_size() -> usize {
    100
}

fn default_wallet_dir() -> String {
    "./wallets".to_string()
}

fn default_mempool_file() -> String {
    "./data/mempool.json".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.chain, ChainConfig::default());
        assert_eq!(config.chain.difficulty, 18);
        assert_eq!(config.chain.coinbase_reward, 50);
        assert_eq!(config.miner.batch_size, 100);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[chain]\ndifficulty = 6\n\n[database]\npath = \"chain.db\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.chain.difficulty, 6);
        assert_eq!(config.chain.coinbase_reward, 50);
        assert_eq!(config.database.path, "chain.db");
    }

    #[test]
    fn test_rejects_zero_reward() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[chain]\ncoinbase_reward = 0\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ChainError::ConfigError(_)));
    }

    #[test]
    fn test_rejects_unreachable_difficulty() {
        assert!(ChainConfig::with_difficulty(256).validate().is_err());
        assert!(ChainConfig::with_difficulty(255).validate().is_ok());
    }
}
