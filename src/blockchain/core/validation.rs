use crate::crypto::validate_hash;
use crate::error::ChainError;

use super::block::Block;

impl Block {
    /// Self-contained structural checks: hash consistency, proof of work,
    /// linkage fields, Merkle root and coinbase placement. Nothing here reads
    /// chain or account state.
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.hash != self.calculate_hash() {
            return Err(ChainError::InvalidBlock(format!(
                "Block hash mismatch at index {}: stored {}",
                self.header.index,
                self.hash_str()
            )));
        }

        if self.header.index == 0 {
            if self.header.parent_hash.is_some() {
                return Err(ChainError::InvalidBlock(
                    "Genesis block cannot have a parent".to_string(),
                ));
            }
            if self.merkle_root != Block::calculate_merkle_root(&self.transactions) {
                return Err(ChainError::InvalidMerkleRoot);
            }
            return Ok(());
        }

        if self.header.parent_hash.is_none() {
            return Err(ChainError::InvalidBlock(format!(
                "Block {} has no parent hash",
                self.header.index
            )));
        }
        if self.header.miner.is_empty() {
            return Err(ChainError::InvalidBlock(
                "Miner address cannot be empty".to_string(),
            ));
        }
        if self.header.timestamp == 0 {
            return Err(ChainError::InvalidBlock("Timestamp cannot be zero".to_string()));
        }
        if !validate_hash(&self.hash, self.header.difficulty) {
            return Err(ChainError::InvalidProofOfWork);
        }

        match &self.merkle_root {
            Some(root) if Some(*root) == Block::calculate_merkle_root(&self.transactions) => {}
            _ => return Err(ChainError::InvalidMerkleRoot),
        }

        validate_coinbase_placement(self)
    }
}

/// Exactly one coinbase, first in the block, paying the header's miner.
fn validate_coinbase_placement(block: &Block) -> Result<(), ChainError> {
    let coinbase = block.coinbase().ok_or_else(|| {
        ChainError::InvalidBlock("First transaction in a block must be a coinbase".to_string())
    })?;

    if coinbase.to != block.header.miner {
        return Err(ChainError::InvalidBlock(format!(
            "Coinbase pays {}, but the block was mined by {}",
            coinbase.to, block.header.miner
        )));
    }

    if let Some(extra) = block.transactions[1..].iter().find(|tx| tx.is_coinbase()) {
        return Err(ChainError::InvalidBlock(format!(
            "Unexpected second coinbase {}",
            extra.hash_str()
        )));
    }

    Ok(())
}

/// Checks that `block` extends the tip identified by `tip_hash` at `tip_height`.
pub fn validate_linkage(block: &Block, tip_hash: &[u8; 32], tip_height: u64) -> Result<(), ChainError> {
    let expected = tip_height + 1;
    if block.header.index != expected {
        return Err(ChainError::InvalidIndex {
            expected,
            got: block.header.index,
        });
    }
    if block.header.parent_hash.as_ref() != Some(tip_hash) {
        return Err(ChainError::InvalidParent);
    }
    Ok(())
}
