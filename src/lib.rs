//! TallyChain - A single-node, account-based proof-of-work ledger
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, account state and chain orchestration
//! - [`transaction`] - Signed transfers and coinbase rewards
//! - [`mempool`] - Pending transaction pool
//!
//! ## Consensus
//! - [`miner`] - Proof-of-work search and cancellation
//!
//! ## Cryptography
//! - [`crypto`] - Hashing, addresses and P-256 signatures
//! - [`merkle`] - Merkle roots and inclusion proofs
//!
//! ## State Management
//! - [`persistence`] - Key-value stores (SQLite, in-memory)
//! - [`wallet`] - Key pair files
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`cli`] - CLI utilities

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;
pub mod merkle;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;
pub mod wallet;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod cli;
pub mod config;
pub mod error;
