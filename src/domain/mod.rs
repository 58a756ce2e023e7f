//! Domain layer: value types, the two lifecycle state machines, and the
//! ledger port they are driven through.

pub mod case;
pub mod events;
pub mod money;
pub mod ports;
pub mod session;
pub mod topup;
