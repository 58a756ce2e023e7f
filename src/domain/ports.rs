use super::case::{CaseId, CaseSummary, Item};
use super::money::{Amount, Balance};
use crate::error::LedgerError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Invoice handed back by the ledger for a crypto top-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoInvoice {
    /// Opaque URL of the external payment page, presented by the caller.
    pub pay_url: String,
    pub payment_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoRedemption {
    pub added_amount: Balance,
    pub new_balance: Balance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseOpening {
    pub success: bool,
    pub item: Option<Item>,
    pub remaining_balance: Balance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    Pending,
    Paid,
    Expired,
}

/// One entry of the user's top-up history as kept by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub amount_local: Balance,
    pub currency: String,
    pub state: TransactionState,
    pub is_promo: bool,
}

/// The backend ledger: the single source of balances, draws and debits.
///
/// Every call is a request that resolves to a response or an error. Nothing
/// behind this trait is persisted by the core.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn create_crypto_payment(
        &self,
        amount_usd: Amount,
        currency: &str,
    ) -> Result<CryptoInvoice, LedgerError>;
    async fn redeem_promo_code(
        &self,
        code: &str,
        amount_local: Amount,
    ) -> Result<PromoRedemption, LedgerError>;
    /// The storefront catalogue.
    async fn cases(&self) -> Result<Vec<CaseSummary>, LedgerError>;
    /// The sole oracle for crypto top-up completion.
    async fn current_balance(&self) -> Result<Balance, LedgerError>;
    /// Debits the case price and draws an item atomically, server-side.
    async fn open_case(&self, case_id: &CaseId) -> Result<CaseOpening, LedgerError>;
    async fn exchange_rate(&self) -> Result<Decimal, LedgerError>;
    async fn inventory(&self) -> Result<Vec<Item>, LedgerError>;
    async fn transactions(&self) -> Result<Vec<TransactionRecord>, LedgerError>;
}

pub type SharedLedger = Arc<dyn Ledger>;
