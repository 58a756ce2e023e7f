use super::case::{CaseId, Item, RejectReason};
use super::money::Balance;
use super::topup::{AttemptId, TopUpStatus};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceCause {
    TopUp(AttemptId),
    CaseOpened(CaseId),
}

/// Notifications consumed by the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ShopEvent {
    /// A confirmed ledger figure. Published exactly once per confirmed
    /// top-up or revealed case.
    BalanceChanged {
        balance: Balance,
        cause: BalanceCause,
    },
    TopUpSettled {
        attempt: AttemptId,
        status: TopUpStatus,
    },
    CaseDebiting {
        case_id: CaseId,
    },
    ItemRevealed {
        case_id: CaseId,
        item: Item,
    },
    CaseRejected {
        case_id: CaseId,
        reason: RejectReason,
    },
    CaseCommitted {
        case_id: CaseId,
    },
}

/// Sending half of the event channel shared by both state machines.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<ShopEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ShopEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn publish(&self, event: ShopEvent) {
        if let Err(e) = self.sender.send(event) {
            tracing::trace!("no event listener, dropped {:?}", e.0);
        }
    }
}
