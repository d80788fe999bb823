/// Stateless validation logic for transactions, separated from type definitions
use crate::crypto::{address_from_public_key, verify_signature, PUBLIC_KEY_SIZE};
use crate::error::ChainError;
use crate::transaction::types::Transaction;

impl Transaction {
    /// Check the transaction on its own terms: coinbase shape against
    /// `coinbase_reward`, or hash, signature and sender address otherwise.
    /// Account state (nonce, balance) is not consulted here.
    pub fn verify(&self, coinbase_reward: u64) -> Result<(), ChainError> {
        if self.is_coinbase() {
            self.verify_coinbase(coinbase_reward)
        } else {
            self.verify_signed()
        }
    }

    pub fn verify_coinbase(&self, coinbase_reward: u64) -> Result<(), ChainError> {
        if self.hash != self.calculate_hash() {
            return Err(ChainError::InvalidTransaction(format!(
                "Coinbase hash mismatch for {}",
                self.hash_str()
            )));
        }
        if self.amount != coinbase_reward {
            return Err(ChainError::InvalidTransaction(format!(
                "Coinbase amount {} does not equal the block reward {}",
                self.amount, coinbase_reward
            )));
        }
        if self.to.is_empty() {
            return Err(ChainError::InvalidTransaction(
                "Coinbase recipient cannot be empty".to_string(),
            ));
        }
        if !self.signature.is_empty() {
            return Err(ChainError::InvalidTransaction(
                "Coinbase transaction must not be signed".to_string(),
            ));
        }
        if !self.pubkey.is_empty() {
            return Err(ChainError::InvalidTransaction(
                "Coinbase transaction must not carry a public key".to_string(),
            ));
        }
        Ok(())
    }

    /// Validates everything about a transfer that does not need account state.
    /// Suitable for early checks in the mempool.
    pub fn verify_signed(&self) -> Result<(), ChainError> {
        if self.hash != self.calculate_hash() {
            return Err(ChainError::InvalidSignature(format!(
                "Transaction hash mismatch for {}",
                self.hash_str()
            )));
        }
        if self.signature.is_empty() {
            return Err(ChainError::InvalidSignature(
                "Transaction not signed".to_string(),
            ));
        }

        verify_signature(&self.pubkey, &self.hash, &self.signature)
            .map_err(|e| ChainError::InvalidSignature(e.to_string()))?;

        let pubkey: [u8; PUBLIC_KEY_SIZE] = self
            .pubkey
            .as_slice()
            .try_into()
            .map_err(|_| ChainError::InvalidSignature("Malformed public key".to_string()))?;
        let derived = address_from_public_key(&pubkey);
        if derived != self.from {
            return Err(ChainError::InvalidSignature(format!(
                "Public key belongs to {}, not sender {}",
                derived, self.from
            )));
        }

        Ok(())
    }
}
