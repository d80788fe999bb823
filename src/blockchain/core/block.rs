use crate::config::ChainConfig;
use crate::crypto::{hash_data, Hash};
use crate::error::ChainError;
use crate::merkle::build_merkle_root;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

/// Beneficiary recorded in the genesis header. Genesis carries no coinbase.
pub const GENESIS_MINER: &str = "genesis";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// `None` only for genesis.
    pub parent_hash: Option<Hash>,
    pub index: u64,
    pub timestamp: u64,
    /// Proof-of-work counter, unrelated to account nonces.
    pub nonce: u64,
    pub difficulty: u32,
    pub miner: String,
}

impl BlockHeader {
    /// Fixed, order-sensitive encoding of every header field:
    /// `len || parent_hash`, `index`, `timestamp`, `nonce` as u64 big-endian,
    /// `difficulty` as u32 big-endian, then `len || miner`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let parent: &[u8] = match &self.parent_hash {
            Some(hash) => hash,
            None => &[],
        };
        let miner = self.miner.as_bytes();

        let mut out = Vec::with_capacity(8 + parent.len() + 8 * 3 + 4 + 8 + miner.len());
        out.extend_from_slice(&(parent.len() as u64).to_be_bytes());
        out.extend_from_slice(parent);
        out.extend_from_slice(&self.index.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out.extend_from_slice(&self.difficulty.to_be_bytes());
        out.extend_from_slice(&(miner.len() as u64).to_be_bytes());
        out.extend_from_slice(miner);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub merkle_root: Option<Hash>,
    pub state_root: Option<Hash>,
    pub hash: Hash,
}

impl Block {
    /// Build an unmined candidate. The Merkle root and hash are filled in,
    /// the state root is left empty.
    pub fn new(
        index: u64,
        parent_hash: Hash,
        difficulty: u32,
        miner: String,
        timestamp: u64,
        transactions: Vec<Transaction>,
    ) -> Self {
        let merkle_root = Block::calculate_merkle_root(&transactions);
        let mut block = Block {
            header: BlockHeader {
                parent_hash: Some(parent_hash),
                index,
                timestamp,
                nonce: 0,
                difficulty,
                miner,
            },
            transactions,
            merkle_root,
            state_root: None,
            hash: [0u8; 32],
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Deterministic first block: no parent, no transactions, no mining.
    pub fn genesis(config: &ChainConfig) -> Self {
        let mut block = Block {
            header: BlockHeader {
                parent_hash: None,
                index: 0,
                timestamp: config.genesis_timestamp,
                nonce: 0,
                difficulty: config.difficulty,
                miner: GENESIS_MINER.to_string(),
            },
            transactions: Vec::new(),
            merkle_root: None,
            state_root: None,
            hash: [0u8; 32],
        };
        block.hash = block.calculate_hash();
        block
    }

    pub fn is_genesis(&self) -> bool {
        self.header.index == 0 && self.header.parent_hash.is_none()
    }

    pub fn calculate_merkle_root(transactions: &[Transaction]) -> Option<Hash> {
        let leaves: Vec<Hash> = transactions.iter().map(|tx| tx.hash).collect();
        build_merkle_root(&leaves)
    }

    /// Hash over the canonical header, Merkle root and state root. The stored
    /// `hash` field never feeds into its own computation.
    pub fn calculate_hash(&self) -> Hash {
        let header = self.header.canonical_bytes();
        let merkle_root: &[u8] = match &self.merkle_root {
            Some(root) => root,
            None => &[],
        };
        let state_root: &[u8] = match &self.state_root {
            Some(root) => root,
            None => &[],
        };
        hash_data(&[header.as_slice(), merkle_root, state_root])
    }

    /// Attach the post-application state root and refresh the hash.
    pub fn set_state_root(&mut self, state_root: Option<Hash>) {
        self.state_root = state_root;
        self.hash = self.calculate_hash();
    }

    /// Record a proof-of-work result found on a private copy of this block.
    pub fn apply_pow(&mut self, nonce: u64, hash: Hash) {
        self.header.nonce = nonce;
        self.hash = hash;
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }

    /// Everything after the coinbase.
    pub fn transfers(&self) -> &[Transaction] {
        match self.coinbase() {
            Some(_) => &self.transactions[1..],
            None => &self.transactions,
        }
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ChainError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        serde_json::from_slice(bytes)
            .map_err(|e| ChainError::SerializationError(format!("Failed to decode block: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        let transactions = vec![
            Transaction::new_coinbase("miner", 50),
            Transaction::new("alice".into(), "bob".into(), 10, 1, Vec::new()),
        ];
        Block::new(3, [9u8; 32], 4, "miner".into(), 1_700_000_000, transactions)
    }

    #[test]
    fn test_identical_blocks_hash_identically() {
        assert_eq!(sample_block().hash, sample_block().hash);
        assert_eq!(sample_block().hash, sample_block().calculate_hash());
    }

    #[test]
    fn test_every_header_field_changes_hash() {
        let base = sample_block();
        let mut mutations: Vec<Block> = Vec::new();

        let mut b = base.clone();
        b.header.index += 1;
        mutations.push(b);
        let mut b = base.clone();
        b.header.parent_hash = Some([8u8; 32]);
        mutations.push(b);
        let mut b = base.clone();
        b.header.miner = "other".into();
        mutations.push(b);
        let mut b = base.clone();
        b.header.timestamp += 1;
        mutations.push(b);
        let mut b = base.clone();
        b.header.nonce += 1;
        mutations.push(b);
        let mut b = base.clone();
        b.header.difficulty += 1;
        mutations.push(b);
        let mut b = base.clone();
        b.set_state_root(Some([1u8; 32]));
        mutations.push(b);

        for mutated in mutations {
            assert_ne!(mutated.calculate_hash(), base.hash);
        }
    }

    #[test]
    fn test_canonical_encoding_layout() {
        let header = BlockHeader {
            parent_hash: None,
            index: 1,
            timestamp: 2,
            nonce: 3,
            difficulty: 4,
            miner: "m".into(),
        };
        let bytes = header.canonical_bytes();
        assert_eq!(bytes.len(), 8 + 8 * 3 + 4 + 8 + 1);
        assert_eq!(&bytes[..8], &0u64.to_be_bytes());
        assert_eq!(&bytes[8..16], &1u64.to_be_bytes());
        assert_eq!(&bytes[32..36], &4u32.to_be_bytes());
        assert_eq!(bytes.last(), Some(&b'm'));
    }

    #[test]
    fn test_merkle_root_commits_to_transactions() {
        let block = sample_block();
        let leaves: Vec<Hash> = block.transactions.iter().map(|tx| tx.hash).collect();
        assert_eq!(block.merkle_root, build_merkle_root(&leaves));
        assert_eq!(block.coinbase().map(|tx| tx.to.as_str()), Some("miner"));
        assert_eq!(block.transfers().len(), 1);
    }

    #[test]
    fn test_genesis_is_deterministic() {
        let config = ChainConfig::with_difficulty(4);
        let a = Block::genesis(&config);
        let b = Block::genesis(&config);
        assert_eq!(a.hash, b.hash);
        assert!(a.is_genesis());
        assert!(a.transactions.is_empty());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let block = sample_block();
        let decoded = Block::from_bytes(&block.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn test_corrupt_bytes_are_an_error() {
        let err = Block::from_bytes(b"{\"header\":").unwrap_err();
        assert!(matches!(err, ChainError::SerializationError(_)));
    }
}
