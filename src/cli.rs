//! Helpers shared by the command-line binary

use crate::blockchain::{Block, Blockchain};
use crate::config::{load_config, Config};
use crate::error::ChainError;
use crate::persistence::Database;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber, honouring `RUST_LOG` and defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Open the configured database and restore any pending transactions saved
/// by an earlier invocation.
pub fn open_blockchain(config: &Config) -> Result<Blockchain, ChainError> {
    let db = Database::open(&config.database.path)?;
    let chain = Blockchain::open(Arc::new(db), config.chain.clone())?;

    let restored = chain
        .mempool
        .load_from_file(Path::new(&config.wallet.mempool_file))?;
    if restored > 0 {
        info!("Restored {} pending transactions", restored);
    }
    Ok(chain)
}

pub fn load_blockchain_from_config(path: Option<&Path>) -> Result<(Config, Blockchain), ChainError> {
    let config = load_config(path)?;
    let chain = open_blockchain(&config)?;
    Ok((config, chain))
}

/// Persist the mempool so the next invocation sees the same pending set.
pub fn save_pending(chain: &Blockchain, config: &Config) -> Result<(), ChainError> {
    chain
        .mempool
        .save_to_file(Path::new(&config.wallet.mempool_file))
}

/// Next nonce for `address`, counting transfers still waiting in the pool.
pub fn suggest_nonce(chain: &Blockchain, address: &str) -> Result<u64, ChainError> {
    let committed = chain.state.next_nonce(address)?;
    Ok(committed + chain.mempool.pending_from(address) as u64)
}

/// `0123abcd…89ef` style abbreviation for display.
pub fn short_hash(hex: &str) -> String {
    let chars: Vec<char> = hex.chars().collect();
    if chars.len() <= 16 {
        hex.to_string()
    } else {
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 8..].iter().collect();
        format!("{}…{}", head, tail)
    }
}

pub fn format_block(block: &Block) -> String {
    let parent = block
        .header
        .parent_hash
        .map(hex::encode)
        .unwrap_or_else(|| "-".to_string());
    let state_root = block
        .state_root
        .map(hex::encode)
        .unwrap_or_else(|| "-".to_string());

    let mut out = format!(
        "Block #{}\n  hash:       {}\n  parent:     {}\n  state root: {}\n  miner:      {}\n  timestamp:  {}\n  difficulty: {}\n  nonce:      {}\n",
        block.header.index,
        block.hash_str(),
        parent,
        state_root,
        block.header.miner,
        block.header.timestamp,
        block.header.difficulty,
        block.header.nonce,
    );
    for tx in &block.transactions {
        if tx.is_coinbase() {
            out.push_str(&format!("  coinbase {} -> {}\n", tx.amount, tx.to));
        } else {
            out.push_str(&format!(
                "  tx {} {} -> {} amount {} nonce {}\n",
                short_hash(&tx.hash_str()),
                tx.from,
                tx.to,
                tx.amount,
                tx.nonce
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChainConfig, DatabaseConfig, WalletConfig};
    use crate::crypto::KeyPair;
    use crate::transaction::Transaction;
    use tempfile::TempDir;

    fn temp_config(dir: &TempDir) -> Config {
        Config {
            chain: ChainConfig::with_difficulty(4),
            database: DatabaseConfig {
                path: dir.path().join("chain.db").to_string_lossy().into_owned(),
            },
            wallet: WalletConfig {
                dir: dir.path().join("wallets").to_string_lossy().into_owned(),
                mempool_file: dir.path().join("mempool.json").to_string_lossy().into_owned(),
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_pending_transactions_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let config = temp_config(&dir);
        let alice = KeyPair::generate();

        {
            let chain = open_blockchain(&config).unwrap();
            let tx = Transaction::signed(&alice, "bob", 5, 1).unwrap();
            chain.submit_transaction(tx).unwrap();
            assert_eq!(suggest_nonce(&chain, &alice.address()).unwrap(), 2);
            save_pending(&chain, &config).unwrap();
        }

        let chain = open_blockchain(&config).unwrap();
        assert_eq!(chain.mempool.pending_count(), 1);
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("abcd"), "abcd");
        assert_eq!(short_hash(&"0".repeat(64)), "00000000…00000000");
        // Recipients are free-form and may not be ASCII.
        let recipient = format!("a{}b", "é".repeat(17));
        assert_eq!(
            short_hash(&recipient),
            format!("a{}…{}b", "é".repeat(7), "é".repeat(7))
        );
    }

    #[test]
    fn test_format_genesis() {
        let block = Block::genesis(&ChainConfig::default());
        let text = format_block(&block);
        assert!(text.starts_with("Block #0"));
        assert!(text.contains("parent:     -"));
    }
}
