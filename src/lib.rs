//! OrderChain - a peer-replicated order book ordered by lightweight proof-of-work
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Blockchain
//! - [`blockchain`] - Blocks, the chain state machine and block validation
//! - [`order`] - Order, balance and trade records
//!
//! ## Matching
//! - [`orderbook`] - Per-asset price levels
//! - [`matching`] - Deterministic matching engine
//!
//! ## Consensus
//! - [`hash`] - Canonical hashing and hash ordering
//! - [`miner`] - Resumable proof-of-work mining
//!
//! ## State Management
//! - [`persistence`] - Database layer (SQLite)
//!
//! ## Networking
//! - [`node`] - Event loop and transport seam
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Blockchain
// ============================================================================
pub mod blockchain;
pub mod order;

// ============================================================================
// Matching
// ============================================================================
pub mod matching;
pub mod orderbook;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod hash;
pub mod miner;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;

// ============================================================================
// Networking
// ============================================================================
pub mod node;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
