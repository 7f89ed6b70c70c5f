// Thin re-export module: implementation lives under `blockchain/core/`, split
// into the chain state machine, the balance sheet and block validation.

pub mod core;
pub use core::*;
