//! Pool of signed transfers waiting for inclusion in a block
//!
//! Admission only checks what a transaction says about itself. Nonces and
//! balances are left to the state engine at mining time.

use crate::crypto::Hash;
use crate::error::ChainError;
use crate::transaction::Transaction;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct PoolInner {
    by_hash: HashMap<Hash, Transaction>,
    /// Arrival order.
    order: Vec<Hash>,
}

#[derive(Debug, Default)]
pub struct Mempool {
    inner: RwLock<PoolInner>,
    /// Zero means unbounded.
    capacity: usize,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Mempool {
            inner: RwLock::new(PoolInner::default()),
            capacity,
        }
    }

    pub fn add_tx(&self, tx: Transaction) -> Result<(), ChainError> {
        let mut inner = self.inner.write();

        if inner.by_hash.contains_key(&tx.hash) {
            return Err(ChainError::Duplicate);
        }
        if tx.amount == 0 {
            return Err(ChainError::InvalidAmount);
        }
        if tx.is_coinbase() {
            return Err(ChainError::InvalidTransaction(
                "Coinbase transactions are created by miners only".to_string(),
            ));
        }
        tx.verify_signed()?;
        if self.capacity > 0 && inner.by_hash.len() >= self.capacity {
            return Err(ChainError::MempoolFull);
        }

        debug!(tx = %tx.hash_str(), from = %tx.from, nonce = tx.nonce, "Admitted transaction");
        inner.order.push(tx.hash);
        inner.by_hash.insert(tx.hash, tx);
        Ok(())
    }

    /// Up to `max` transactions in arrival order; `0` returns all of them.
    /// The pool is left unchanged.
    pub fn get_txs(&self, max: usize) -> Vec<Transaction> {
        let inner = self.inner.read();
        let limit = if max == 0 { inner.order.len() } else { max };
        inner
            .order
            .iter()
            .take(limit)
            .filter_map(|hash| inner.by_hash.get(hash).cloned())
            .collect()
    }

    /// Drop every listed transaction that is present. Unknown ones are ignored.
    pub fn remove_txs(&self, txs: &[Transaction]) {
        let mut inner = self.inner.write();
        let mut removed = 0usize;
        for tx in txs {
            if inner.by_hash.remove(&tx.hash).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            let PoolInner { by_hash, order } = &mut *inner;
            order.retain(|hash| by_hash.contains_key(hash));
            debug!(removed, remaining = order.len(), "Removed transactions from pool");
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.read().by_hash.len()
    }

    /// Transactions from `address` still waiting.
    pub fn pending_from(&self, address: &str) -> usize {
        self.inner
            .read()
            .by_hash
            .values()
            .filter(|tx| tx.from == address)
            .count()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner.read().by_hash.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.pending_count()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }

    /// Write the pending transactions to `path` as JSON, in arrival order.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ChainError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.get_txs(0))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Re-admit transactions saved by `save_to_file`. A missing file is an
    /// empty pool; entries that no longer pass admission are skipped.
    pub fn load_from_file(&self, path: &Path) -> Result<usize, ChainError> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let txs: Vec<Transaction> = serde_json::from_str(&json)?;

        let mut loaded = 0;
        for tx in txs {
            let hash = tx.hash_str();
            match self.add_tx(tx) {
                Ok(()) => loaded += 1,
                Err(ChainError::Duplicate) => {}
                Err(e) => warn!("Skipping saved transaction {}: {}", hash, e),
            }
        }
        Ok(loaded)
    }
}
