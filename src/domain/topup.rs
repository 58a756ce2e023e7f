use super::money::{Amount, Balance, ExchangeRate};
use crate::error::{Result, ShopError};
use std::fmt;
use tokio::time::Instant;

/// Identity of one top-up attempt. Monotonic per reconciler, so it also acts
/// as the epoch used to drop responses that belong to a superseded attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttemptId(pub u64);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopUpKind {
    CryptoPayment {
        amount_usd: Amount,
        currency_code: String,
    },
    PromoCode {
        code: String,
        amount_local: Amount,
    },
}

impl TopUpKind {
    pub fn crypto(amount_usd: Amount, currency_code: impl Into<String>) -> Self {
        Self::CryptoPayment {
            amount_usd,
            currency_code: currency_code.into(),
        }
    }

    pub fn promo(code: impl Into<String>, amount_local: Amount) -> Self {
        Self::PromoCode {
            code: code.into(),
            amount_local,
        }
    }

    /// Builds a promo redemption from a USD figure, converted with `rate`.
    pub fn promo_from_usd(
        code: impl Into<String>,
        amount_usd: Amount,
        rate: &ExchangeRate,
    ) -> Result<Self> {
        let local = Amount::new(rate.to_local(amount_usd)?.value())?;
        Ok(Self::promo(code, local))
    }

    pub fn is_promo(&self) -> bool {
        matches!(self, Self::PromoCode { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopUpFailure {
    PaymentCreationFailed(String),
    /// Carries the server's message verbatim.
    InvalidPromoCode(String),
    PromoRedemptionFailed(String),
}

impl fmt::Display for TopUpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PaymentCreationFailed(message) => {
                write!(f, "payment creation failed: {}", message)
            }
            Self::InvalidPromoCode(message) => f.write_str(message),
            Self::PromoRedemptionFailed(message) => {
                write!(f, "promo redemption failed: {}", message)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopUpStatus {
    Created,
    AwaitingExternalPayment,
    Polling,
    Confirmed {
        credited: Balance,
        new_balance: Balance,
    },
    Abandoned,
    Failed(TopUpFailure),
}

impl TopUpStatus {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::AwaitingExternalPayment | Self::Polling
        )
    }
}

impl fmt::Display for TopUpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::AwaitingExternalPayment => f.write_str("awaiting external payment"),
            Self::Polling => f.write_str("polling"),
            Self::Confirmed { credited, .. } => write!(f, "confirmed (+{})", credited),
            Self::Abandoned => f.write_str("abandoned"),
            Self::Failed(failure) => write!(f, "failed ({})", failure),
        }
    }
}

/// Where the caller should send the user to pay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentHandle {
    pub pay_url: String,
    pub payment_id: String,
}

/// One crypto payment or promo redemption, from request to settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct TopUpAttempt {
    pub id: AttemptId,
    pub kind: TopUpKind,
    pub created_at: Instant,
    pub balance_at_creation: Balance,
    pub status: TopUpStatus,
    pub payment: Option<PaymentHandle>,
}

impl TopUpAttempt {
    pub fn new(id: AttemptId, kind: TopUpKind, balance_at_creation: Balance) -> Self {
        Self {
            id,
            kind,
            created_at: Instant::now(),
            balance_at_creation,
            status: TopUpStatus::Created,
            payment: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    fn invalid(&self, action: &'static str) -> ShopError {
        ShopError::InvalidTransition {
            from: self.status.to_string(),
            action,
        }
    }

    /// Created -> AwaitingExternalPayment once the ledger issued an invoice.
    pub fn await_payment(&mut self, payment: PaymentHandle) -> Result<()> {
        if self.status != TopUpStatus::Created || self.kind.is_promo() {
            return Err(self.invalid("await payment"));
        }
        self.payment = Some(payment);
        self.status = TopUpStatus::AwaitingExternalPayment;
        Ok(())
    }

    /// Marks the first poll tick. Already polling is fine.
    pub fn begin_polling(&mut self) -> Result<()> {
        match self.status {
            TopUpStatus::AwaitingExternalPayment => {
                self.status = TopUpStatus::Polling;
                Ok(())
            }
            TopUpStatus::Polling => Ok(()),
            _ => Err(self.invalid("poll")),
        }
    }

    /// Compares a fetched balance against the creation snapshot.
    ///
    /// Anything other than a strict increase (including a decrease from a
    /// concurrent spend) means "not yet". Returns the credited delta when this
    /// call confirmed the attempt.
    pub fn observe_balance(&mut self, fetched: Balance) -> Option<Balance> {
        let waiting = matches!(
            self.status,
            TopUpStatus::AwaitingExternalPayment | TopUpStatus::Polling
        );
        if !waiting || fetched <= self.balance_at_creation {
            return None;
        }
        let credited = fetched - self.balance_at_creation;
        self.status = TopUpStatus::Confirmed {
            credited,
            new_balance: fetched,
        };
        Some(credited)
    }

    /// Settles a promo redemption with the server-reported figures.
    pub fn confirm(&mut self, credited: Balance, new_balance: Balance) -> Result<()> {
        if self.status != TopUpStatus::Created {
            return Err(self.invalid("confirm"));
        }
        self.status = TopUpStatus::Confirmed {
            credited,
            new_balance,
        };
        Ok(())
    }

    pub fn abandon(&mut self) -> Result<()> {
        if !self.is_active() {
            return Err(self.invalid("abandon"));
        }
        self.status = TopUpStatus::Abandoned;
        Ok(())
    }

    pub fn fail(&mut self, failure: TopUpFailure) -> Result<()> {
        if self.status != TopUpStatus::Created {
            return Err(self.invalid("fail"));
        }
        self.status = TopUpStatus::Failed(failure);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn crypto_attempt(balance: i64) -> TopUpAttempt {
        TopUpAttempt::new(
            AttemptId(1),
            TopUpKind::crypto(Amount::new(1000).unwrap(), "USDT"),
            Balance::new(balance),
        )
    }

    fn handle() -> PaymentHandle {
        PaymentHandle {
            pay_url: "https://pay.example/1".to_string(),
            payment_id: "inv-1".to_string(),
        }
    }

    #[test]
    fn test_observe_balance_confirms_once() {
        let mut attempt = crypto_attempt(10000);
        attempt.await_payment(handle()).unwrap();
        attempt.begin_polling().unwrap();

        assert_eq!(attempt.observe_balance(Balance::new(10000)), None);
        assert_eq!(
            attempt.observe_balance(Balance::new(19250)),
            Some(Balance::new(9250))
        );
        assert_eq!(
            attempt.status,
            TopUpStatus::Confirmed {
                credited: Balance::new(9250),
                new_balance: Balance::new(19250)
            }
        );
        // A later tick seeing an even higher figure does not re-confirm.
        assert_eq!(attempt.observe_balance(Balance::new(30000)), None);
    }

    #[test]
    fn test_balance_decrease_is_not_yet_confirmed() {
        let mut attempt = crypto_attempt(10000);
        attempt.await_payment(handle()).unwrap();
        assert_eq!(attempt.observe_balance(Balance::new(4000)), None);
        assert_eq!(attempt.status, TopUpStatus::AwaitingExternalPayment);
    }

    #[test]
    fn test_abandon_only_when_active() {
        let mut attempt = crypto_attempt(0);
        attempt.abandon().unwrap();
        assert_eq!(attempt.status, TopUpStatus::Abandoned);
        assert!(attempt.abandon().is_err());
        assert_eq!(attempt.observe_balance(Balance::new(100)), None);
    }

    #[test]
    fn test_promo_cannot_await_payment() {
        let mut attempt = TopUpAttempt::new(
            AttemptId(2),
            TopUpKind::promo("BONUS", Amount::new(500).unwrap()),
            Balance::new(10000),
        );
        assert!(attempt.await_payment(handle()).is_err());
        attempt
            .confirm(Balance::new(500), Balance::new(10500))
            .unwrap();
        assert!(!attempt.is_active());
    }

    #[test]
    fn test_fail_from_created() {
        let mut attempt = crypto_attempt(0);
        attempt
            .fail(TopUpFailure::PaymentCreationFailed("down".into()))
            .unwrap();
        assert!(matches!(attempt.status, TopUpStatus::Failed(_)));
        assert!(attempt.begin_polling().is_err());
    }

    #[test]
    fn test_promo_from_usd_uses_rate() {
        let rate = ExchangeRate::new(dec!(90.5), Instant::now()).unwrap();
        let kind = TopUpKind::promo_from_usd("BONUS", Amount::new(1001).unwrap(), &rate).unwrap();
        // 1001 * 90.5 = 90590.5 -> 90591
        assert_eq!(
            kind,
            TopUpKind::promo("BONUS", Amount::new(90591).unwrap())
        );
    }
}
