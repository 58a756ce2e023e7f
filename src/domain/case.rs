use super::money::{Amount, Balance};
use crate::error::{Result, ShopError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub String);

impl From<&str> for CaseId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CaseId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    #[default]
    Common,
    Rare,
    Epic,
    Legendary,
    Mythical,
}

/// A drawn case outcome. Immutable once received from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub rarity: Rarity,
    #[serde(rename = "price")]
    pub price_minor: Balance,
    #[serde(rename = "image_url", default)]
    pub image_ref: String,
}

impl Item {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price_minor: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rarity: Rarity::Common,
            price_minor: Balance::new(price_minor),
            image_ref: String::new(),
        }
    }

    pub fn with_rarity(mut self, rarity: Rarity) -> Self {
        self.rarity = rarity;
        self
    }
}

/// A case as offered in the storefront catalogue.
///
/// `id` and `price` are what `CaseOpeningEngine::open` takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub id: CaseId,
    pub name: String,
    pub price: Amount,
    #[serde(rename = "image_url", default)]
    pub image_ref: String,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub is_new: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    InsufficientFundsServerSide,
    CaseUnavailable,
    OpenFailed(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientFundsServerSide => f.write_str("insufficient funds"),
            Self::CaseUnavailable => f.write_str("case unavailable"),
            Self::OpenFailed(message) => write!(f, "open failed: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseStatus {
    Idle,
    Debiting,
    Revealing,
    Committed,
    Rejected(RejectReason),
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Debiting => f.write_str("debiting"),
            Self::Revealing => f.write_str("revealing"),
            Self::Committed => f.write_str("committed"),
            Self::Rejected(reason) => write!(f, "rejected ({})", reason),
        }
    }
}

/// A purchase that cannot be dismissed, handed back to the caller intact.
#[derive(Error, Debug)]
#[error("cannot dismiss a case purchase while {}", .purchase.status())]
pub struct DismissRejected {
    pub purchase: CasePurchase,
}

/// The lifecycle of one case purchase.
///
/// `Idle -> Debiting -> Revealing -> Committed`, or `Debiting -> Rejected`.
/// While revealing, the draw is held back until [`CasePurchase::reveal`] runs.
#[derive(Debug, Clone, PartialEq)]
pub struct CasePurchase {
    case_id: CaseId,
    price: Amount,
    started_at: Instant,
    status: CaseStatus,
    withheld: Option<(Item, Balance)>,
    drawn_item: Option<Item>,
    remaining_balance: Option<Balance>,
}

impl CasePurchase {
    pub fn new(case_id: CaseId, price: Amount) -> Self {
        Self {
            case_id,
            price,
            started_at: Instant::now(),
            status: CaseStatus::Idle,
            withheld: None,
            drawn_item: None,
            remaining_balance: None,
        }
    }

    pub fn case_id(&self) -> &CaseId {
        &self.case_id
    }

    pub fn price(&self) -> Amount {
        self.price
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn status(&self) -> &CaseStatus {
        &self.status
    }

    /// The drawn item, once revealed.
    pub fn drawn_item(&self) -> Option<&Item> {
        self.drawn_item.as_ref()
    }

    /// The balance reported by the ledger after the debit, once revealed.
    pub fn remaining_balance(&self) -> Option<Balance> {
        self.remaining_balance
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, CaseStatus::Committed | CaseStatus::Rejected(_))
    }

    fn invalid(&self, action: &'static str) -> ShopError {
        ShopError::InvalidTransition {
            from: self.status.to_string(),
            action,
        }
    }

    /// Checks affordability and moves Idle -> Debiting.
    ///
    /// An unaffordable purchase stays Idle.
    pub fn begin_debit(&mut self, balance: Balance) -> Result<()> {
        if self.status != CaseStatus::Idle {
            return Err(self.invalid("open case"));
        }
        if !balance.covers(self.price) {
            return Err(ShopError::InsufficientFunds {
                required: self.price.value(),
                available: balance.value(),
            });
        }
        self.status = CaseStatus::Debiting;
        Ok(())
    }

    /// Debiting -> Revealing, holding the draw back from observers.
    pub fn stage_draw(&mut self, item: Item, remaining_balance: Balance) -> Result<()> {
        if self.status != CaseStatus::Debiting {
            return Err(self.invalid("stage draw"));
        }
        self.withheld = Some((item, remaining_balance));
        self.status = CaseStatus::Revealing;
        Ok(())
    }

    /// Publishes the withheld draw. Returns the item and balance now visible.
    pub fn reveal(&mut self) -> Result<(Item, Balance)> {
        if self.status != CaseStatus::Revealing {
            return Err(self.invalid("reveal"));
        }
        let (item, remaining) = self.withheld.take().ok_or_else(|| self.invalid("reveal"))?;
        self.drawn_item = Some(item.clone());
        self.remaining_balance = Some(remaining);
        Ok((item, remaining))
    }

    pub fn reject(&mut self, reason: RejectReason) -> Result<()> {
        if self.status != CaseStatus::Debiting {
            return Err(self.invalid("reject"));
        }
        self.status = CaseStatus::Rejected(reason);
        Ok(())
    }

    /// Revealing -> Committed. A second commit is a no-op.
    pub fn commit(&mut self) -> Result<()> {
        match self.status {
            CaseStatus::Committed => Ok(()),
            CaseStatus::Revealing if self.drawn_item.is_some() => {
                self.status = CaseStatus::Committed;
                Ok(())
            }
            _ => Err(self.invalid("commit")),
        }
    }

    /// Discards an Idle or Rejected purchase.
    pub fn dismiss(self) -> std::result::Result<(), DismissRejected> {
        match self.status {
            CaseStatus::Idle | CaseStatus::Rejected(_) => Ok(()),
            _ => Err(DismissRejected { purchase: self }),
        }
    }
}
