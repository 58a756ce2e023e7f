//! Client-side transaction lifecycle for a case storefront: crypto and promo
//! top-ups reconciled against the ledger balance, and case purchases revealed
//! no earlier than a minimum presentation interval.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod telemetry;
