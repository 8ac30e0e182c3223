//! In-process ledgers used as devnets.
//!
//! Each ledger sits behind the same RPC surface the adapters use for a live
//! node ([`EvmRpc`], [`AlgodClient`]), verifies signatures, enforces the
//! on-chain program rules, and produces blocks/rounds.

pub mod evm;
pub mod algorand;

pub use evm::{EvmDevnet, EvmRpc};
pub use algorand::{AlgodClient, AlgorandDevnet};
