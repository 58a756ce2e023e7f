use crate::application::exchange_rate::ExchangeRateCache;
use crate::config::TopUpConfig;
use crate::domain::events::{BalanceCause, EventSink, ShopEvent};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::SharedLedger;
use crate::domain::topup::{
    AttemptId, PaymentHandle, TopUpAttempt, TopUpFailure, TopUpKind, TopUpStatus,
};
use crate::error::{LedgerError, Result, ShopError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

type AttemptSlot = watch::Sender<Option<TopUpAttempt>>;

/// Drives one top-up attempt at a time from request to settlement.
///
/// Crypto payments are confirmed only by polling the ledger balance until it
/// exceeds the snapshot taken at creation. Promo redemptions settle with the
/// redeem response. The current attempt lives in a `watch` slot; every
/// transition is applied to it atomically and only if the attempt id still
/// matches, so results for a superseded attempt are dropped.
pub struct TopUpReconciler {
    ledger: SharedLedger,
    rates: Arc<ExchangeRateCache>,
    config: TopUpConfig,
    events: EventSink,
    next_id: AtomicU64,
    slot: Arc<AttemptSlot>,
}

impl TopUpReconciler {
    pub fn new(
        ledger: SharedLedger,
        rates: Arc<ExchangeRateCache>,
        config: TopUpConfig,
        events: EventSink,
    ) -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            ledger,
            rates,
            config,
            events,
            next_id: AtomicU64::new(0),
            slot: Arc::new(slot),
        }
    }

    /// Snapshot of the most recent attempt, settled or not.
    pub fn current(&self) -> Option<TopUpAttempt> {
        self.slot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<TopUpAttempt>> {
        self.slot.subscribe()
    }

    /// Waits until the current attempt (if any) leaves the active states.
    pub async fn settled(&self) -> Option<TopUpAttempt> {
        let mut receiver = self.subscribe();
        let settled = receiver
            .wait_for(|slot| slot.as_ref().is_none_or(|a| !a.is_active()))
            .await;
        match settled {
            Ok(attempt) => (*attempt).clone(),
            Err(_) => self.current(),
        }
    }

    /// Local-currency figure for a USD amount, as it will be credited.
    pub async fn quote(&self, amount_usd: Amount) -> Result<Balance> {
        self.rates.to_local(amount_usd).await
    }

    /// Starts a new attempt against the caller's last known balance.
    ///
    /// Input errors and an attempt already in flight are returned as `Err`
    /// without touching the ledger. Ledger failures are not errors: the
    /// returned attempt is `Failed`. A crypto attempt comes back
    /// `AwaitingExternalPayment` with the payment handle to present, and is
    /// then polled in the background.
    pub async fn start(&self, kind: TopUpKind, known_balance: Balance) -> Result<TopUpAttempt> {
        let kind = self.validate(kind)?;
        let id = AttemptId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let attempt = TopUpAttempt::new(id, kind.clone(), known_balance);

        let mut in_flight = None;
        let accepted = self.slot.send_if_modified(|slot| {
            if let Some(active) = slot.as_ref().filter(|a| a.is_active()) {
                in_flight = Some(active.id);
                return false;
            }
            *slot = Some(attempt.clone());
            true
        });
        if !accepted {
            let active = in_flight.map(|a| a.0).unwrap_or_default();
            tracing::debug!("rejecting top-up, attempt #{} still in flight", active);
            return Err(ShopError::AlreadyInFlight { attempt: active });
        }
        tracing::info!(attempt = %id, balance = %known_balance, "top-up started: {:?}", kind);

        match kind {
            TopUpKind::CryptoPayment {
                amount_usd,
                currency_code,
            } => Ok(self.create_payment(&attempt, amount_usd, &currency_code).await),
            TopUpKind::PromoCode { code, amount_local } => {
                Ok(self.redeem_promo(&attempt, &code, amount_local).await)
            }
        }
    }

    /// Stops tracking the current crypto attempt, moving it to `Abandoned`.
    ///
    /// If the attempt already settled (e.g. a confirmation landed first), the
    /// settled snapshot is returned unchanged. Promo redemptions cannot be
    /// cancelled. A balance check already in flight is not aborted; its result
    /// is discarded when it arrives.
    pub fn cancel(&self) -> Result<TopUpAttempt> {
        let mut refused = None;
        let mut abandoned = None;
        self.slot.send_if_modified(|slot| {
            let Some(attempt) = slot.as_mut() else {
                return false;
            };
            if attempt.kind.is_promo() && attempt.is_active() {
                refused = Some(attempt.status.to_string());
                return false;
            }
            if attempt.abandon().is_ok() {
                abandoned = Some(attempt.clone());
                return true;
            }
            false
        });

        if let Some(status) = refused {
            return Err(ShopError::NotCancellable { status });
        }
        if let Some(attempt) = abandoned {
            tracing::info!(attempt = %attempt.id, "top-up cancelled");
            publish_settled(&self.events, &attempt);
            return Ok(attempt);
        }
        self.current().ok_or(ShopError::NoActiveAttempt)
    }

    fn validate(&self, kind: TopUpKind) -> Result<TopUpKind> {
        match kind {
            TopUpKind::CryptoPayment {
                amount_usd,
                currency_code,
            } => {
                let code = currency_code.trim().to_ascii_uppercase();
                if code.is_empty() {
                    return Err(ShopError::Validation(
                        "Currency code must not be empty".to_string(),
                    ));
                }
                if !self.config.supports(&code) {
                    return Err(ShopError::Validation(format!(
                        "Unsupported cryptocurrency: {}",
                        code
                    )));
                }
                Ok(TopUpKind::crypto(amount_usd, code))
            }
            TopUpKind::PromoCode { code, amount_local } => {
                let code = code.trim().to_uppercase();
                if code.is_empty() {
                    return Err(ShopError::Validation(
                        "Promo code must not be empty".to_string(),
                    ));
                }
                Ok(TopUpKind::promo(code, amount_local))
            }
        }
    }

    async fn create_payment(
        &self,
        attempt: &TopUpAttempt,
        amount_usd: Amount,
        currency_code: &str,
    ) -> TopUpAttempt {
        let id = attempt.id;
        let after = match self
            .ledger
            .create_crypto_payment(amount_usd, currency_code)
            .await
        {
            Ok(invoice) => {
                let handle = PaymentHandle {
                    pay_url: invoice.pay_url,
                    payment_id: invoice.payment_id,
                };
                let after = transition(&self.slot, id, |a| a.await_payment(handle).is_ok());
                if after.is_some() {
                    tracing::info!(attempt = %id, "awaiting external payment");
                    let poller = Poller {
                        ledger: self.ledger.clone(),
                        slot: self.slot.clone(),
                        events: self.events.clone(),
                        id,
                        interval: self.config.poll_interval(),
                        deadline: Instant::now() + self.config.max_poll_duration(),
                    };
                    tokio::spawn(poller.run());
                } else {
                    tracing::trace!(attempt = %id, "dropping invoice for abandoned attempt");
                }
                after
            }
            Err(e) => {
                tracing::warn!(attempt = %id, "payment creation failed: {}", e);
                let failure = TopUpFailure::PaymentCreationFailed(e.to_string());
                let after = transition(&self.slot, id, |a| a.fail(failure).is_ok());
                if let Some(attempt) = &after {
                    publish_settled(&self.events, attempt);
                }
                after
            }
        };
        after.unwrap_or_else(|| self.superseded(attempt))
    }

    async fn redeem_promo(
        &self,
        attempt: &TopUpAttempt,
        code: &str,
        amount_local: Amount,
    ) -> TopUpAttempt {
        let id = attempt.id;
        let after = match self.ledger.redeem_promo_code(code, amount_local).await {
            Ok(redemption) => {
                let after = transition(&self.slot, id, |a| {
                    a.confirm(redemption.added_amount, redemption.new_balance)
                        .is_ok()
                });
                if let Some(attempt) = &after {
                    tracing::info!(
                        attempt = %id,
                        "promo code redeemed: +{}, balance {}",
                        redemption.added_amount,
                        redemption.new_balance
                    );
                    self.events.publish(ShopEvent::BalanceChanged {
                        balance: redemption.new_balance,
                        cause: BalanceCause::TopUp(id),
                    });
                    publish_settled(&self.events, attempt);
                }
                after
            }
            Err(e) => {
                tracing::warn!(attempt = %id, "promo redemption failed: {}", e);
                let failure = match e {
                    LedgerError::InvalidPromoCode(message) => {
                        TopUpFailure::InvalidPromoCode(message)
                    }
                    other => TopUpFailure::PromoRedemptionFailed(other.to_string()),
                };
                let after = transition(&self.slot, id, |a| a.fail(failure).is_ok());
                if let Some(attempt) = &after {
                    publish_settled(&self.events, attempt);
                }
                after
            }
        };
        after.unwrap_or_else(|| self.superseded(attempt))
    }

    /// What the caller gets back when its attempt was moved on underneath it.
    fn superseded(&self, attempt: &TopUpAttempt) -> TopUpAttempt {
        match self.current() {
            Some(current) if current.id == attempt.id => current,
            _ => TopUpAttempt {
                status: TopUpStatus::Abandoned,
                ..attempt.clone()
            },
        }
    }
}

/// Applies `apply` to the slot's attempt if it is still attempt `id`.
///
/// Returns the attempt after the change, or `None` when the attempt was
/// superseded or `apply` declined.
fn transition<F>(slot: &AttemptSlot, id: AttemptId, apply: F) -> Option<TopUpAttempt>
where
    F: FnOnce(&mut TopUpAttempt) -> bool,
{
    let mut after = None;
    slot.send_if_modified(|current| match current {
        Some(attempt) if attempt.id == id => {
            if apply(attempt) {
                after = Some(attempt.clone());
                true
            } else {
                false
            }
        }
        _ => false,
    });
    after
}

fn publish_settled(events: &EventSink, attempt: &TopUpAttempt) {
    events.publish(ShopEvent::TopUpSettled {
        attempt: attempt.id,
        status: attempt.status.clone(),
    });
}

/// Background balance poll for one crypto attempt.
struct Poller {
    ledger: SharedLedger,
    slot: Arc<AttemptSlot>,
    events: EventSink,
    id: AttemptId,
    interval: Duration,
    deadline: Instant,
}

impl Poller {
    async fn run(self) {
        let mut watched = self.slot.subscribe();
        let deadline = tokio::time::sleep_until(self.deadline);
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = &mut deadline => {
                    let abandoned = transition(&self.slot, self.id, |a| a.abandon().is_ok());
                    if let Some(attempt) = abandoned {
                        tracing::warn!(attempt = %self.id, "no payment detected, abandoning");
                        publish_settled(&self.events, &attempt);
                    }
                    return;
                }
                changed = watched.changed() => {
                    let still_waiting = changed.is_ok()
                        && watched
                            .borrow_and_update()
                            .as_ref()
                            .is_some_and(|a| a.id == self.id && a.is_active());
                    if !still_waiting {
                        tracing::debug!(attempt = %self.id, "poll loop stopped");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    if !self.poll_once().await {
                        return;
                    }
                }
            }
        }
    }

    fn is_current(&self) -> bool {
        self.slot
            .borrow()
            .as_ref()
            .is_some_and(|a| a.id == self.id && a.is_active())
    }

    /// One balance check. Returns whether polling should continue.
    async fn poll_once(&self) -> bool {
        transition(&self.slot, self.id, |a| {
            a.status == TopUpStatus::AwaitingExternalPayment && a.begin_polling().is_ok()
        });
        if !self.is_current() {
            return false;
        }

        tracing::debug!(attempt = %self.id, "checking balance");
        // A check still running at the deadline is cut short; the deadline
        // branch abandons the attempt on the next loop turn.
        let fetched = tokio::time::timeout_at(self.deadline, self.ledger.current_balance()).await;
        let balance = match fetched {
            Ok(Ok(balance)) => balance,
            Ok(Err(e)) => {
                tracing::warn!(attempt = %self.id, "balance check failed: {}", e);
                return self.is_current();
            }
            Err(_) => {
                tracing::debug!(attempt = %self.id, "balance check outran the poll deadline");
                return self.is_current();
            }
        };

        match transition(&self.slot, self.id, |a| a.observe_balance(balance).is_some()) {
            Some(attempt) => {
                tracing::info!(attempt = %self.id, "payment confirmed, balance {}", balance);
                self.events.publish(ShopEvent::BalanceChanged {
                    balance,
                    cause: BalanceCause::TopUp(self.id),
                });
                publish_settled(&self.events, &attempt);
                false
            }
            None if self.is_current() => {
                tracing::debug!(attempt = %self.id, "balance {} not above snapshot yet", balance);
                true
            }
            None => {
                tracing::trace!(attempt = %self.id, "dropping stale balance response");
                false
            }
        }
    }
}
