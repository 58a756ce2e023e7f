//! Ledger adapters.

#[cfg(feature = "ledger-http")]
pub mod http;
pub mod in_memory;
