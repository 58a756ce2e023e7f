//! Application layer: the services that drive the domain state machines
//! against the ledger port.
//!
//! `TopUpReconciler` and `CaseOpeningEngine` are independent of each other;
//! both publish into the same `EventSink`. `ExchangeRateCache` is shared.

pub mod case_opening;
pub mod catalog;
pub mod exchange_rate;
pub mod inventory;
pub mod top_up;
