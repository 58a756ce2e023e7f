use crate::config::CaseOpeningConfig;
use crate::domain::case::{CaseId, CasePurchase, CaseStatus, RejectReason};
use crate::domain::events::{BalanceCause, EventSink, ShopEvent};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::SharedLedger;
use crate::error::{LedgerError, Result};
use tokio::time::Instant;

/// Runs case purchases against the ledger.
///
/// The ledger performs debit and draw atomically and is the only source of
/// randomness. The engine's job is ordering: nothing about the outcome is
/// published until `min_reveal_interval` has passed since the request went
/// out, so the effective reveal delay is `max(min_reveal_interval, latency)`.
pub struct CaseOpeningEngine {
    ledger: SharedLedger,
    config: CaseOpeningConfig,
    events: EventSink,
}

impl CaseOpeningEngine {
    pub fn new(ledger: SharedLedger, config: CaseOpeningConfig, events: EventSink) -> Self {
        Self {
            ledger,
            config,
            events,
        }
    }

    /// Opens `case_id` for `price`, given the caller's current balance.
    ///
    /// Fails with `InsufficientFunds` before any request if `balance < price`.
    /// Otherwise returns the purchase either `Revealing` with its item visible
    /// (ready for [`CasePurchase::commit`]) or `Rejected` with the reason.
    pub async fn open(
        &self,
        case_id: impl Into<CaseId>,
        price: Amount,
        balance: Balance,
    ) -> Result<CasePurchase> {
        let mut purchase = CasePurchase::new(case_id.into(), price);
        self.run(&mut purchase, balance).await?;
        Ok(purchase)
    }

    /// Drives an `Idle` purchase through debit and reveal.
    pub async fn run(&self, purchase: &mut CasePurchase, balance: Balance) -> Result<()> {
        let case_id = purchase.case_id().clone();
        if let Err(e) = purchase.begin_debit(balance) {
            tracing::info!(case = %case_id, "case not opened: {}", e);
            return Err(e);
        }

        let reveal_at = Instant::now() + self.config.min_reveal_interval();
        self.events.publish(ShopEvent::CaseDebiting {
            case_id: case_id.clone(),
        });
        tracing::info!(case = %case_id, price = %purchase.price(), "opening case");

        let rejection = match self.ledger.open_case(&case_id).await {
            Ok(opening) if opening.success => match opening.item {
                Some(item) => {
                    purchase.stage_draw(item, opening.remaining_balance)?;
                    None
                }
                None => Some(RejectReason::OpenFailed(
                    "response carried no item".to_string(),
                )),
            },
            Ok(_) => Some(RejectReason::OpenFailed(
                "server reported failure".to_string(),
            )),
            Err(LedgerError::InsufficientFunds) => Some(RejectReason::InsufficientFundsServerSide),
            Err(LedgerError::CaseUnavailable) => Some(RejectReason::CaseUnavailable),
            Err(e) => Some(RejectReason::OpenFailed(e.to_string())),
        };

        if let Some(reason) = rejection {
            tracing::warn!(case = %case_id, "case open rejected: {}", reason);
            purchase.reject(reason.clone())?;
            self.events.publish(ShopEvent::CaseRejected { case_id, reason });
            return Ok(());
        }

        tokio::time::sleep_until(reveal_at).await;
        let (item, remaining) = purchase.reveal()?;
        tracing::info!(
            case = %case_id,
            item = %item.id,
            "revealed {} ({:?}), balance {}",
            item.name,
            item.rarity,
            remaining
        );
        self.events.publish(ShopEvent::ItemRevealed {
            case_id: case_id.clone(),
            item,
        });
        self.events.publish(ShopEvent::BalanceChanged {
            balance: remaining,
            cause: BalanceCause::CaseOpened(case_id),
        });
        Ok(())
    }

    /// Accepts the revealed item. The ledger already moved it to inventory;
    /// this only finalizes the purchase. Committing twice is a no-op.
    pub fn commit(&self, purchase: &mut CasePurchase) -> Result<()> {
        let was_committed = purchase.status() == &CaseStatus::Committed;
        purchase.commit()?;
        if !was_committed {
            tracing::debug!(case = %purchase.case_id(), "case purchase committed");
            self.events.publish(ShopEvent::CaseCommitted {
                case_id: purchase.case_id().clone(),
            });
        }
        Ok(())
    }
}
