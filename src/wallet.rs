//! Key storage for TallyChain accounts
//!
//! A wallet is one P-256 key pair saved as JSON with hex-encoded keys.

use crate::crypto::KeyPair;
use crate::error::ChainError;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub name: Option<String>,
    pub address: String,
    pub public_key_hex: String,
    pub secret_key_hex: String,
    /// RFC 3339 creation time.
    pub created: String,
}

impl Wallet {
    pub fn new(name: Option<String>) -> Result<Self, ChainError> {
        Ok(Self::from_keypair(&KeyPair::generate(), name))
    }

    pub fn from_keypair(keypair: &KeyPair, name: Option<String>) -> Self {
        Wallet {
            name,
            address: keypair.address(),
            public_key_hex: hex::encode(keypair.public_key_bytes()),
            secret_key_hex: hex::encode(keypair.secret_bytes()),
            created: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn get_keypair(&self) -> Result<KeyPair, ChainError> {
        let secret = hex::decode(&self.secret_key_hex)
            .map_err(|e| ChainError::WalletError(format!("Secret key is not hex: {}", e)))?;
        KeyPair::from_secret_bytes(&secret)
    }

    /// Sign a transfer of `amount` to `to` carrying `nonce`.
    pub fn transfer(&self, to: &str, amount: u64, nonce: u64) -> Result<Transaction, ChainError> {
        Transaction::signed(&self.get_keypair()?, to, amount, nonce)
    }

    /// `<dir>/<address>.json`
    pub fn default_path(dir: &Path, address: &str) -> PathBuf {
        dir.join(format!("{}.json", address))
    }

    pub fn save(&self, path: &Path) -> Result<(), ChainError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Load a wallet and check that its keys and address agree.
    pub fn load(path: &Path) -> Result<Self, ChainError> {
        let json = fs::read_to_string(path).map_err(|e| {
            ChainError::WalletError(format!("Failed to read wallet {}: {}", path.display(), e))
        })?;
        let wallet: Wallet = serde_json::from_str(&json)
            .map_err(|e| ChainError::WalletError(format!("Malformed wallet file: {}", e)))?;

        let keypair = wallet.get_keypair()?;
        if keypair.address() != wallet.address {
            return Err(ChainError::WalletError(format!(
                "Wallet address {} does not match its secret key",
                wallet.address
            )));
        }
        Ok(wallet)
    }
}
