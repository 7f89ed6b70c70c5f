//! Proof-of-work mining.
//!
//! Mining is a resumable unit of work. A [`Miner`] holds the candidate body
//! and the next nonce to try; each call to [`Miner::step`] spends at most
//! `budget` attempts and either returns the solved block or leaves the search
//! where it stopped. A body change is never patched into a running search:
//! the owner drops the miner and starts a new one at nonce 0.

use crate::blockchain::{Block, MinedBlock};
use crate::error::{ChainError, Result};
use crate::hash::{hash, meets_difficulty};
use tracing::debug;

/// Whether `block` satisfies the proof-of-work predicate at `difficulty`.
pub fn check_block(block: &MinedBlock, difficulty: u32) -> Result<bool> {
    Ok(meets_difficulty(&hash(block)?, difficulty))
}

#[derive(Debug, Clone)]
pub struct Miner {
    candidate: MinedBlock,
    difficulty: u32,
    attempts: u64,
    solved: bool,
}

impl Miner {
    /// Start a fresh search over `body` at nonce 0.
    pub fn new(body: Block, client_id: impl Into<String>, difficulty: u32) -> Self {
        Miner {
            candidate: MinedBlock::new(body, 0, client_id),
            difficulty,
            attempts: 0,
            solved: false,
        }
    }

    pub fn body(&self) -> &Block {
        &self.candidate.body
    }

    /// Next nonce to try, or the winning nonce once solved.
    pub fn nonce(&self) -> u64 {
        self.candidate.nonce
    }

    /// Attempts spent so far on this body.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn is_solved(&self) -> bool {
        self.solved
    }

    /// Try up to `budget` nonces.
    ///
    /// Returns the mined block on success. Once solved, further calls return
    /// the same block without probing.
    pub fn step(&mut self, budget: u64) -> Result<Option<MinedBlock>> {
        if self.solved {
            return Ok(Some(self.candidate.clone()));
        }

        for _ in 0..budget {
            self.attempts += 1;
            if check_block(&self.candidate, self.difficulty)? {
                self.solved = true;
                debug!(
                    nonce = self.candidate.nonce,
                    attempts = self.attempts,
                    "proof of work found"
                );
                return Ok(Some(self.candidate.clone()));
            }
            self.candidate.nonce = self
                .candidate
                .nonce
                .checked_add(1)
                .ok_or(ChainError::NonceExhausted)?;
        }

        Ok(None)
    }
}

/// Mine `body` to completion, blocking the caller.
pub fn mine_block(body: Block, client_id: &str, difficulty: u32) -> Result<MinedBlock> {
    let mut miner = Miner::new(body, client_id, difficulty);
    loop {
        if let Some(block) = miner.step(u64::MAX)? {
            return Ok(block);
        }
    }
}
