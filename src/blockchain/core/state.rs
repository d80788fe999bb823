use crate::crypto::{hash_data, Hash};
use crate::error::ChainError;
use crate::merkle::build_merkle_root;
use crate::persistence::{account_key, KvStore, WriteBatch, ACCOUNT_PREFIX};
use crate::transaction::Transaction;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::block::Block;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub balance: u64,
    /// Nonce of the last applied transfer sent from this account.
    pub nonce: u64,
}

impl Account {
    pub fn new(address: impl Into<String>) -> Self {
        Account {
            address: address.into(),
            balance: 0,
            nonce: 0,
        }
    }

    /// Leaf committed into the state root.
    pub fn leaf_hash(&self) -> Hash {
        hash_data(&[
            self.address.as_bytes(),
            &self.balance.to_be_bytes(),
            &self.nonce.to_be_bytes(),
        ])
    }

    fn to_bytes(&self) -> Result<Vec<u8>, ChainError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        serde_json::from_slice(bytes)
            .map_err(|e| ChainError::SerializationError(format!("Failed to decode account: {}", e)))
    }
}

/// Account changes computed against committed state but not yet written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedState {
    accounts: BTreeMap<String, Account>,
}

impl StagedState {
    pub fn get(&self, address: &str) -> Option<&Account> {
        self.accounts.get(address)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Outcome of fitting pending transfers into a block candidate.
#[derive(Debug, Default)]
pub struct Selection {
    pub staged: StagedState,
    /// Transfers that applied cleanly, in order.
    pub included: Vec<Transaction>,
    /// Transfers whose nonce is already spent; they can never apply.
    pub stale: Vec<Transaction>,
    /// Root over committed state with `staged` on top.
    pub state_root: Option<Hash>,
}

/// Account state over a `KvStore`, with a write-through cache.
///
/// Every write goes to the store first and to the cache only after the store
/// accepted it. Reads that miss the cache go straight to the store.
pub struct StateEngine {
    store: Arc<dyn KvStore>,
    cache: RwLock<HashMap<String, Account>>,
}

impl StateEngine {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        StateEngine {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The stored account, or a zero account if the address was never written.
    pub fn get_account(&self, address: &str) -> Result<Account, ChainError> {
        let cache = self.cache.read();
        self.lookup(&cache, &BTreeMap::new(), address)
    }

    pub fn get_balance(&self, address: &str) -> Result<u64, ChainError> {
        Ok(self.get_account(address)?.balance)
    }

    /// Nonce the next transfer from `address` must carry.
    pub fn next_nonce(&self, address: &str) -> Result<u64, ChainError> {
        Ok(self.get_account(address)?.nonce.saturating_add(1))
    }

    pub fn save_account(&self, account: &Account) -> Result<(), ChainError> {
        let mut cache = self.cache.write();
        self.store
            .set(&account_key(&account.address), &account.to_bytes()?)?;
        cache.insert(account.address.clone(), account.clone());
        Ok(())
    }

    /// Check a transfer against committed state without changing anything.
    pub fn validate_tx(&self, tx: &Transaction) -> Result<(), ChainError> {
        let cache = self.cache.read();
        let sender = self.lookup(&cache, &BTreeMap::new(), &tx.from)?;
        check_transfer(tx, &sender)
    }

    /// Validate and apply a single transfer, persisting both accounts together.
    pub fn apply_tx(&self, tx: &Transaction) -> Result<(), ChainError> {
        let mut cache = self.cache.write();
        let mut overlay = BTreeMap::new();
        self.stage_transfer(&cache, &mut overlay, tx)?;
        self.write(&mut cache, StagedState { accounts: overlay }, WriteBatch::new())
    }

    /// Apply every transaction of `block` or none of them.
    pub fn apply_block(&self, block: &Block) -> Result<(), ChainError> {
        let mut cache = self.cache.write();
        let staged = self.stage_locked(&cache, block)?;
        self.write(&mut cache, staged, WriteBatch::new())
    }

    /// Stage `block`, check the resulting root against `block.state_root`
    /// and persist the accounts together with `batch`. The state write lock
    /// is held from the first read to the store commit.
    pub fn commit_block(&self, block: &Block, batch: WriteBatch) -> Result<(), ChainError> {
        let mut cache = self.cache.write();
        let staged = self.stage_locked(&cache, block)?;
        if self.root_over(&staged)? != block.state_root {
            return Err(ChainError::InvalidStateRoot);
        }
        self.write(&mut cache, staged, batch)
    }

    /// Run `block`'s transactions against a scratch copy of the touched
    /// accounts. The coinbase, if first, is credited without checks; every
    /// other transaction goes through the full transfer rules.
    pub fn stage_block(&self, block: &Block) -> Result<StagedState, ChainError> {
        let cache = self.cache.read();
        self.stage_locked(&cache, block)
    }

    /// Like `stage_block`, but skips transfers that do not currently apply
    /// instead of failing. Used to build a block candidate from the mempool.
    pub fn select_applicable(
        &self,
        coinbase: &Transaction,
        candidates: Vec<Transaction>,
    ) -> Result<Selection, ChainError> {
        let cache = self.cache.read();
        let mut overlay = BTreeMap::new();
        self.stage_coinbase(&cache, &mut overlay, coinbase)?;

        let mut selection = Selection::default();
        let mut remaining = candidates;
        // Repeat while a pass makes progress: a transfer can unblock one that
        // arrived earlier with the next nonce.
        loop {
            let mut deferred = Vec::new();
            let before = selection.included.len();
            for tx in remaining {
                let saved = snapshot(&overlay, &tx);
                match self.stage_transfer(&cache, &mut overlay, &tx) {
                    Ok(()) => selection.included.push(tx),
                    Err(e) => {
                        restore(&mut overlay, saved);
                        match e {
                            ChainError::InvalidNonce { expected, got } if got < expected => {
                                debug!(tx = %tx.hash_str(), expected, got, "Dropping stale transaction");
                                selection.stale.push(tx);
                            }
                            e => {
                                debug!(tx = %tx.hash_str(), error = %e, "Deferring transaction");
                                deferred.push(tx);
                            }
                        }
                    }
                }
            }
            if deferred.is_empty() || selection.included.len() == before {
                break;
            }
            remaining = deferred;
        }

        selection.staged = StagedState { accounts: overlay };
        selection.state_root = self.root_over(&selection.staged)?;
        Ok(selection)
    }

    /// Root over committed accounts.
    pub fn calculate_state_root(&self) -> Result<Option<Hash>, ChainError> {
        self.state_root_with(&StagedState::default())
    }

    /// Root over committed accounts with `staged` laid on top. Leaves are
    /// account hashes ordered by address; no accounts means no root.
    pub fn state_root_with(&self, staged: &StagedState) -> Result<Option<Hash>, ChainError> {
        let _cache = self.cache.read();
        self.root_over(staged)
    }

    /// Number of persisted accounts.
    pub fn account_count(&self) -> Result<usize, ChainError> {
        let _cache = self.cache.read();
        Ok(self.store.scan_prefix(ACCOUNT_PREFIX.as_bytes())?.len())
    }

    fn stage_locked(
        &self,
        cache: &HashMap<String, Account>,
        block: &Block,
    ) -> Result<StagedState, ChainError> {
        let mut overlay = BTreeMap::new();

        let transfers = match block.coinbase() {
            Some(coinbase) => {
                self.stage_coinbase(cache, &mut overlay, coinbase)?;
                &block.transactions[1..]
            }
            None => &block.transactions[..],
        };

        for tx in transfers {
            self.stage_transfer(cache, &mut overlay, tx)?;
        }

        debug!(
            index = block.header.index,
            accounts = overlay.len(),
            "Staged block state"
        );
        Ok(StagedState { accounts: overlay })
    }

    /// Caller holds the state lock.
    fn root_over(&self, staged: &StagedState) -> Result<Option<Hash>, ChainError> {
        let mut accounts: BTreeMap<String, Account> = BTreeMap::new();
        for (_, value) in self.store.scan_prefix(ACCOUNT_PREFIX.as_bytes())? {
            let account = Account::from_bytes(&value)?;
            accounts.insert(account.address.clone(), account);
        }
        for account in staged.accounts() {
            accounts.insert(account.address.clone(), account.clone());
        }

        let leaves: Vec<Hash> = accounts.values().map(Account::leaf_hash).collect();
        Ok(build_merkle_root(&leaves))
    }

    fn write(
        &self,
        cache: &mut HashMap<String, Account>,
        staged: StagedState,
        batch: WriteBatch,
    ) -> Result<(), ChainError> {
        let mut writes = WriteBatch::new();
        for account in staged.accounts.values() {
            writes.put(account_key(&account.address), account.to_bytes()?);
        }
        writes.extend(batch);
        self.store.commit(writes)?;

        cache.extend(staged.accounts);
        Ok(())
    }

    fn lookup(
        &self,
        cache: &HashMap<String, Account>,
        overlay: &BTreeMap<String, Account>,
        address: &str,
    ) -> Result<Account, ChainError> {
        if let Some(account) = overlay.get(address).or_else(|| cache.get(address)) {
            return Ok(account.clone());
        }
        match self.store.get(&account_key(address))? {
            Some(bytes) => Account::from_bytes(&bytes),
            None => Ok(Account::new(address)),
        }
    }

    fn stage_coinbase(
        &self,
        cache: &HashMap<String, Account>,
        overlay: &mut BTreeMap<String, Account>,
        coinbase: &Transaction,
    ) -> Result<(), ChainError> {
        let mut miner = self.lookup(cache, overlay, &coinbase.to)?;
        miner.balance = credit(miner.balance, coinbase.amount)?;
        overlay.insert(miner.address.clone(), miner);
        Ok(())
    }

    fn stage_transfer(
        &self,
        cache: &HashMap<String, Account>,
        overlay: &mut BTreeMap<String, Account>,
        tx: &Transaction,
    ) -> Result<(), ChainError> {
        let mut sender = self.lookup(cache, overlay, &tx.from)?;
        check_transfer(tx, &sender)?;
        sender.balance -= tx.amount;
        sender.nonce = tx.nonce;
        overlay.insert(sender.address.clone(), sender);

        // Looked up after the debit so a self-transfer sees it.
        let mut receiver = self.lookup(cache, overlay, &tx.to)?;
        receiver.balance = credit(receiver.balance, tx.amount)?;
        overlay.insert(receiver.address.clone(), receiver);
        Ok(())
    }
}

type Snapshot = [(String, Option<Account>); 2];

/// Overlay entries a transfer may touch, for rolling back a failed attempt.
fn snapshot(overlay: &BTreeMap<String, Account>, tx: &Transaction) -> Snapshot {
    [&tx.from, &tx.to].map(|address| (address.clone(), overlay.get(address).cloned()))
}

fn restore(overlay: &mut BTreeMap<String, Account>, saved: Snapshot) {
    for (address, previous) in saved {
        match previous {
            Some(account) => {
                overlay.insert(address, account);
            }
            None => {
                overlay.remove(&address);
            }
        }
    }
}

/// Signature, amount, nonce and balance checks, in that order.
fn check_transfer(tx: &Transaction, sender: &Account) -> Result<(), ChainError> {
    tx.verify_signed()?;

    if tx.amount == 0 {
        return Err(ChainError::InvalidAmount);
    }

    let expected = sender.nonce.saturating_add(1);
    if tx.nonce != expected {
        return Err(ChainError::InvalidNonce {
            expected,
            got: tx.nonce,
        });
    }

    if sender.balance < tx.amount {
        return Err(ChainError::InsufficientBalance {
            balance: sender.balance,
            required: tx.amount,
        });
    }

    Ok(())
}

fn credit(balance: u64, amount: u64) -> Result<u64, ChainError> {
    balance
        .checked_add(amount)
        .ok_or_else(|| ChainError::InvalidTransaction("Balance overflow".to_string()))
}
