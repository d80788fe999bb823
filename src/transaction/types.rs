/// Transaction types for TallyChain
use crate::crypto::{hash_data, Hash, KeyPair};
use crate::error::ChainError;
use serde::{Deserialize, Serialize};

/// Account nonce carried by every coinbase transaction.
pub const COINBASE_NONCE: u64 = 0;

/// A value transfer between two accounts, or a coinbase reward when `from` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: String,
    pub to: String,
    pub amount: u64,
    /// Per-sender replay counter; the first transfer from an account uses 1.
    pub nonce: u64,
    #[serde(with = "serde_bytes", default)]
    pub signature: Vec<u8>,
    pub hash: Hash,
    /// Raw `X || Y` public key of the sender.
    #[serde(with = "serde_bytes", default)]
    pub pubkey: Vec<u8>,
}

impl Transaction {
    /// Build an unsigned transfer. The hash is filled in; the signature is not.
    pub fn new(from: String, to: String, amount: u64, nonce: u64, pubkey: Vec<u8>) -> Self {
        let mut tx = Transaction {
            from,
            to,
            amount,
            nonce,
            signature: Vec::new(),
            hash: [0u8; 32],
            pubkey,
        };
        tx.hash = tx.calculate_hash();
        tx
    }

    /// Build and sign a transfer from the account controlled by `keypair`.
    pub fn signed(keypair: &KeyPair, to: &str, amount: u64, nonce: u64) -> Result<Self, ChainError> {
        let mut tx = Transaction::new(
            keypair.address(),
            to.to_string(),
            amount,
            nonce,
            keypair.public_key_bytes().to_vec(),
        );
        tx.sign(keypair)?;
        Ok(tx)
    }

    /// The reward transaction crediting `miner`.
    pub fn new_coinbase(miner: &str, reward: u64) -> Self {
        Transaction::new(String::new(), miner.to_string(), reward, COINBASE_NONCE, Vec::new())
    }

    pub fn is_coinbase(&self) -> bool {
        self.from.is_empty() && self.nonce == COINBASE_NONCE
    }

    pub fn calculate_hash(&self) -> Hash {
        hash_data(&[
            self.from.as_bytes(),
            self.to.as_bytes(),
            &self.amount.to_be_bytes(),
            &self.nonce.to_be_bytes(),
        ])
    }

    /// Recompute the hash and sign it with `keypair`.
    pub fn sign(&mut self, keypair: &KeyPair) -> Result<(), ChainError> {
        self.hash = self.calculate_hash();
        self.signature = keypair.sign(&self.hash)?.to_vec();
        Ok(())
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash)
    }
}
