//! Proof-of-work search
//!
//! A search never touches the caller's block: every worker iterates nonces on
//! its own copy, and the winning `(nonce, hash)` is handed back for the caller
//! to apply.

use crate::blockchain::Block;
use crate::crypto::{validate_hash, Hash};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag that stops a running search.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// True when both tokens share one flag.
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowOutcome {
    Found { nonce: u64, hash: Hash },
    Aborted,
    /// Every nonce was tried without success.
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
pub struct ProofOfWork {
    pub difficulty: u32,
}

impl ProofOfWork {
    pub fn new(difficulty: u32) -> Self {
        ProofOfWork { difficulty }
    }

    /// Sequential search from nonce 0. The token is polled before every attempt.
    pub fn run(&self, candidate: &Block, cancel: &CancelToken) -> PowOutcome {
        let mut work = candidate.clone();
        for nonce in 0..=u64::MAX {
            if cancel.is_cancelled() {
                return PowOutcome::Aborted;
            }
            work.header.nonce = nonce;
            let hash = work.calculate_hash();
            if validate_hash(&hash, self.difficulty) {
                return PowOutcome::Found { nonce, hash };
            }
        }
        PowOutcome::Exhausted
    }

    /// Split the nonce space into `threads` interleaved strides. The first
    /// worker to succeed stops the others.
    pub fn run_parallel(&self, candidate: &Block, threads: usize, cancel: &CancelToken) -> PowOutcome {
        let threads = threads.max(1);
        if threads == 1 {
            return self.run(candidate, cancel);
        }

        let solved = AtomicBool::new(false);
        let stride = threads as u64;

        let found = (0..stride).into_par_iter().find_map_any(|start| {
            let mut work = candidate.clone();
            let mut nonce = start;
            loop {
                if cancel.is_cancelled() || solved.load(Ordering::Relaxed) {
                    return None;
                }
                work.header.nonce = nonce;
                let hash = work.calculate_hash();
                if validate_hash(&hash, self.difficulty) {
                    solved.store(true, Ordering::Relaxed);
                    return Some((nonce, hash));
                }
                nonce = nonce.checked_add(stride)?;
            }
        });

        match found {
            Some((nonce, hash)) => PowOutcome::Found { nonce, hash },
            None if cancel.is_cancelled() => PowOutcome::Aborted,
            None => PowOutcome::Exhausted,
        }
    }
}
