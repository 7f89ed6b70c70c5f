use crate::blockchain::core::chain::{Block, MinedBlock};
use crate::error::{ChainError, Result};
use crate::hash::{hash, BlockHash};
use crate::matching::MatchingEngine;
use crate::miner::check_block;
use thiserror::Error;

/// Why a candidate block was not appended.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("proof of work not satisfied")]
    InvalidProofOfWork,

    #[error("previous block hash mismatch: expected {expected:?}, found {found:?}")]
    InvalidLinkage {
        expected: Option<BlockHash>,
        found: Option<BlockHash>,
    },

    #[error("balances diverge: expected {expected}, found {found}")]
    BalanceMismatch { expected: BlockHash, found: BlockHash },
}

/// Check `candidate` against the head it must extend and the pending block we
/// derived locally. Checks run in order and stop at the first failure.
pub fn check_candidate(
    candidate: &MinedBlock,
    head: Option<&MinedBlock>,
    current: &Block,
    difficulty: u32,
) -> Result<Option<Rejection>> {
    if !check_block(candidate, difficulty)? {
        return Ok(Some(Rejection::InvalidProofOfWork));
    }

    let expected = head.map(hash).transpose()?;
    if candidate.body.prev_block_hash != expected {
        return Ok(Some(Rejection::InvalidLinkage {
            expected,
            found: candidate.body.prev_block_hash.clone(),
        }));
    }

    let expected = hash(&current.balances)?;
    let found = hash(&candidate.body.balances)?;
    if expected != found {
        return Ok(Some(Rejection::BalanceMismatch { expected, found }));
    }

    Ok(None)
}

/// Replay a whole chain from genesis.
///
/// Each block must pass the same checks a live node applies, with the
/// expected balances re-derived by matching its predecessor.
pub fn verify_chain(blocks: &[MinedBlock], engine: &MatchingEngine, difficulty: u32) -> Result<()> {
    let mut expected = Block::default();
    for (height, block) in blocks.iter().enumerate() {
        let head = height.checked_sub(1).map(|h| &blocks[h]);
        if let Some(rejection) = check_candidate(block, head, &expected, difficulty)? {
            return Err(ChainError::InvalidChain(format!("block {}: {}", height, rejection)));
        }
        expected = engine.match_block(block)?;
    }
    Ok(())
}
