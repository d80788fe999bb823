use crate::config::ChainConfig;
use crate::crypto::Hash;
use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::miner::{CancelToken, PowOutcome, ProofOfWork};
use crate::persistence::{InMemoryStore, KvStore, WriteBatch, TIP_KEY};
use crate::transaction::Transaction;
use lru::LruCache;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::block::Block;
use super::state::StateEngine;
use super::validation::validate_linkage;

/// Hash and height of the last block on the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tip {
    pub hash: Hash,
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStatus {
    pub height: u64,
    pub tip_hash: Hash,
    pub genesis_hash: Hash,
    pub difficulty: u32,
    pub coinbase_reward: u64,
    pub pending_transactions: usize,
    pub accounts: usize,
}

/// Single-node chain: owns the tip, the account state and the mempool.
///
/// `add_block` holds the tip write lock from linkage check to tip update,
/// so blocks are appended one at a time.
pub struct Blockchain {
    config: ChainConfig,
    store: Arc<dyn KvStore>,
    pub state: StateEngine,
    pub mempool: Mempool,
    tip: RwLock<Tip>,
    genesis: OnceCell<Block>,
    block_cache: Mutex<LruCache<Hash, Block>>,
    /// Running searches keyed by the parent they build on.
    searches: Mutex<Vec<(Hash, CancelToken)>>,
}

impl Blockchain {
    /// Ephemeral chain backed by memory.
    pub fn new(config: ChainConfig) -> Result<Self, ChainError> {
        Self::open(Arc::new(InMemoryStore::new()), config)
    }

    /// Open the chain stored in `store`, writing genesis first if the store
    /// has no tip pointer yet.
    pub fn open(store: Arc<dyn KvStore>, config: ChainConfig) -> Result<Self, ChainError> {
        config.validate()?;

        let cache_size = NonZeroUsize::new(config.block_cache_size).unwrap_or(NonZeroUsize::MIN);
        let chain = Blockchain {
            state: StateEngine::new(Arc::clone(&store)),
            mempool: Mempool::with_capacity(config.mempool_capacity),
            tip: RwLock::new(Tip {
                hash: [0u8; 32],
                height: 0,
            }),
            genesis: OnceCell::new(),
            block_cache: Mutex::new(LruCache::new(cache_size)),
            searches: Mutex::new(Vec::new()),
            store,
            config,
        };

        let tip = match chain.store.get(TIP_KEY)? {
            Some(bytes) => chain.load_tip(&bytes)?,
            None => chain.write_genesis()?,
        };
        *chain.tip.write() = tip;
        Ok(chain)
    }

    fn write_genesis(&self) -> Result<Tip, ChainError> {
        let genesis = Block::genesis(&self.config);
        let mut batch = WriteBatch::new();
        batch.put(genesis.hash.to_vec(), genesis.to_bytes()?);
        batch.put(TIP_KEY, genesis.hash.to_vec());
        self.store.commit(batch)?;

        info!("Created genesis block {}", genesis.hash_str());
        let tip = Tip {
            hash: genesis.hash,
            height: 0,
        };
        let _ = self.genesis.set(genesis);
        Ok(tip)
    }

    fn load_tip(&self, bytes: &[u8]) -> Result<Tip, ChainError> {
        let hash: Hash = bytes.try_into().map_err(|_| {
            ChainError::DatabaseError(format!("Tip pointer has {} bytes, expected 32", bytes.len()))
        })?;
        let block = self.get_block(&hash).map_err(|e| match e {
            ChainError::BlockNotFound(_) => ChainError::TipNotFound,
            other => other,
        })?;
        if block.header.difficulty != self.config.difficulty {
            warn!(
                "Stored tip was mined at difficulty {}, configured difficulty is {}",
                block.header.difficulty, self.config.difficulty
            );
        }
        info!("Loaded chain at height {} (tip {})", block.header.index, block.hash_str());
        Ok(Tip {
            hash,
            height: block.header.index,
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn tip(&self) -> Tip {
        *self.tip.read()
    }

    pub fn height(&self) -> u64 {
        self.tip.read().height
    }

    pub fn tip_hash(&self) -> Hash {
        self.tip.read().hash
    }

    pub fn last_block(&self) -> Result<Block, ChainError> {
        self.get_block(&self.tip_hash())
    }

    pub fn get_block(&self, hash: &Hash) -> Result<Block, ChainError> {
        if let Some(block) = self.block_cache.lock().get(hash) {
            return Ok(block.clone());
        }
        let bytes = self
            .store
            .get(hash)?
            .ok_or_else(|| ChainError::BlockNotFound(hex::encode(hash)))?;
        let block = Block::from_bytes(&bytes)?;
        self.block_cache.lock().put(*hash, block.clone());
        Ok(block)
    }

    /// Walk back from the tip to `height`.
    pub fn get_block_by_height(&self, height: u64) -> Result<Block, ChainError> {
        let tip = self.tip();
        if height > tip.height {
            return Err(ChainError::BlockNotFound(format!(
                "height {} is above the tip at {}",
                height, tip.height
            )));
        }
        if height == 0 {
            return self.get_genesis_block();
        }

        let mut block = self.get_block(&tip.hash)?;
        while block.header.index > height {
            block = self.get_block(&self.parent_of(&block)?)?;
        }
        Ok(block)
    }

    pub fn get_genesis_block(&self) -> Result<Block, ChainError> {
        let genesis = self.genesis.get_or_try_init(|| {
            let mut block = self.last_block()?;
            while !block.is_genesis() {
                block = self.get_block(&self.parent_of(&block)?)?;
            }
            Ok::<Block, ChainError>(block)
        })?;
        Ok(genesis.clone())
    }

    /// Visit every block from the tip down to genesis. The first error from
    /// `visitor` stops the walk and is returned.
    pub fn iterate_blocks<F>(&self, mut visitor: F) -> Result<(), ChainError>
    where
        F: FnMut(&Block) -> Result<(), ChainError>,
    {
        let mut hash = self.tip_hash();
        loop {
            let block = self.get_block(&hash)?;
            visitor(&block)?;
            if block.is_genesis() {
                return Ok(());
            }
            hash = self.parent_of(&block)?;
        }
    }

    fn parent_of(&self, block: &Block) -> Result<Hash, ChainError> {
        block.header.parent_hash.ok_or_else(|| {
            ChainError::DatabaseError(format!(
                "Block {} at height {} has no parent",
                block.hash_str(),
                block.header.index
            ))
        })
    }

    pub fn status(&self) -> Result<ChainStatus, ChainError> {
        let tip = self.tip();
        Ok(ChainStatus {
            height: tip.height,
            tip_hash: tip.hash,
            genesis_hash: self.get_genesis_block()?.hash,
            difficulty: self.config.difficulty,
            coinbase_reward: self.config.coinbase_reward,
            pending_transactions: self.mempool.pending_count(),
            accounts: self.state.account_count()?,
        })
    }

    /// Submit a transfer to the mempool.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<(), ChainError> {
        self.mempool.add_tx(tx)
    }

    /// Validate `block` against the tip and current state, then persist its
    /// accounts, the block itself and the new tip in one commit.
    pub fn add_block(&self, block: Block) -> Result<(), ChainError> {
        let mut tip = self.tip.write();

        if let Err(e) = self.check_block(&block, &tip) {
            warn!(
                "Rejected block {} at index {}: {}",
                block.hash_str(),
                block.header.index,
                e
            );
            return Err(e);
        }

        let mut batch = WriteBatch::new();
        batch.put(block.hash.to_vec(), block.to_bytes()?);
        batch.put(TIP_KEY, block.hash.to_vec());
        if let Err(e) = self.state.commit_block(&block, batch) {
            warn!("Rejected block {}: {}", block.hash_str(), e);
            return Err(e);
        }

        *tip = Tip {
            hash: block.hash,
            height: block.header.index,
        };

        info!(
            "Added block {} at height {} with {} transactions",
            block.hash_str(),
            block.header.index,
            block.transactions.len()
        );

        self.mempool.remove_txs(block.transfers());
        self.cancel_stale_searches(&block.hash);
        self.block_cache.lock().put(block.hash, block);
        Ok(())
    }

    fn check_block(&self, block: &Block, tip: &Tip) -> Result<(), ChainError> {
        validate_linkage(block, &tip.hash, tip.height)?;
        block.validate()?;

        if block.header.difficulty != self.config.difficulty {
            return Err(ChainError::InvalidBlock(format!(
                "Block difficulty {} does not match chain difficulty {}",
                block.header.difficulty, self.config.difficulty
            )));
        }

        let parent = self.get_block(&tip.hash)?;
        if block.header.timestamp <= parent.header.timestamp {
            return Err(ChainError::InvalidBlock(format!(
                "Timestamp {} is not after parent timestamp {}",
                block.header.timestamp, parent.header.timestamp
            )));
        }

        if let Some(coinbase) = block.coinbase() {
            coinbase.verify_coinbase(self.config.coinbase_reward)?;
        }
        Ok(())
    }

    /// Mine one block on the current tip paying `miner`, using the
    /// sequential search.
    pub fn mine_block(&self, miner: &str, batch_size: usize) -> Result<Block, ChainError> {
        self.mine_block_with(miner, batch_size, 1, &CancelToken::new())
    }

    /// Build a candidate from up to `batch_size` pending transfers, search for
    /// proof of work on `threads` workers and append the result. Cancelling
    /// `cancel`, or another block landing on the same parent, aborts the
    /// search with `MiningAborted`.
    pub fn mine_block_with(
        &self,
        miner: &str,
        batch_size: usize,
        threads: usize,
        cancel: &CancelToken,
    ) -> Result<Block, ChainError> {
        if miner.is_empty() {
            return Err(ChainError::InvalidBlock(
                "Miner address cannot be empty".to_string(),
            ));
        }

        let candidate = self.build_candidate(miner, batch_size)?;
        let parent = candidate.header.parent_hash.unwrap_or_default();

        self.register_search(parent, cancel);
        debug!(
            "Searching proof of work for block {} at difficulty {}",
            candidate.header.index, candidate.header.difficulty
        );
        let outcome = ProofOfWork::new(self.config.difficulty).run_parallel(&candidate, threads, cancel);
        self.finish_search(cancel);

        match outcome {
            PowOutcome::Found { nonce, hash } => {
                let mut block = candidate;
                block.apply_pow(nonce, hash);
                self.add_block(block.clone())?;
                Ok(block)
            }
            PowOutcome::Aborted => {
                warn!("Mining of block {} aborted", candidate.header.index);
                Err(ChainError::MiningAborted)
            }
            PowOutcome::Exhausted => Err(ChainError::InvalidBlock(
                "Nonce space exhausted without a solution".to_string(),
            )),
        }
    }

    /// Unmined block on the current tip with its state root attached.
    fn build_candidate(&self, miner: &str, batch_size: usize) -> Result<Block, ChainError> {
        let tip = self.tip();
        let parent = self.get_block(&tip.hash)?;

        let coinbase = Transaction::new_coinbase(miner, self.config.coinbase_reward);
        let pending = self.mempool.get_txs(batch_size);
        let selection = self.state.select_applicable(&coinbase, pending)?;
        if !selection.stale.is_empty() {
            debug!("Evicting {} stale transactions", selection.stale.len());
            self.mempool.remove_txs(&selection.stale);
        }
        let state_root = selection.state_root;

        let mut transactions = Vec::with_capacity(selection.included.len() + 1);
        transactions.push(coinbase);
        transactions.extend(selection.included);

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let timestamp = now.max(parent.header.timestamp.saturating_add(1));

        let mut block = Block::new(
            tip.height + 1,
            tip.hash,
            self.config.difficulty,
            miner.to_string(),
            timestamp,
            transactions,
        );
        block.set_state_root(state_root);
        Ok(block)
    }

    fn register_search(&self, parent: Hash, cancel: &CancelToken) {
        let tip = self.tip.read();
        let mut searches = self.searches.lock();
        if tip.hash != parent {
            cancel.cancel();
        }
        searches.push((parent, cancel.clone()));
    }

    fn finish_search(&self, cancel: &CancelToken) {
        self.searches.lock().retain(|(_, token)| !token.same_as(cancel));
    }

    /// Abort every search that no longer builds on `new_tip`.
    fn cancel_stale_searches(&self, new_tip: &Hash) {
        self.searches.lock().retain(|(parent, token)| {
            if parent == new_tip {
                true
            } else {
                token.cancel();
                false
            }
        });
    }
}
