use crate::domain::case::{CaseId, CaseSummary, Item};
use crate::domain::money::{Amount, Balance, ExchangeRate};
use crate::domain::ports::{
    CaseOpening, CryptoInvoice, Ledger, PromoRedemption, TransactionRecord, TransactionState,
};
use crate::error::LedgerError;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Ledger operations, for latency and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateCryptoPayment,
    RedeemPromoCode,
    CurrentBalance,
    OpenCase,
    ExchangeRate,
    Cases,
    Inventory,
    Transactions,
}

#[derive(Debug, Clone)]
pub struct CaseDefinition {
    pub name: String,
    pub price: Amount,
    pub items: Vec<Item>,
    pub available: bool,
}

#[derive(Debug)]
struct Invoice {
    amount_local: Balance,
    paid: bool,
}

#[derive(Debug, Default)]
struct Failures {
    create_payment: Option<LedgerError>,
    redeem: Option<LedgerError>,
    open_case: Option<LedgerError>,
    balance: bool,
    exchange_rate: bool,
    cases: bool,
}

#[derive(Debug)]
struct LedgerState {
    balance: Balance,
    rate: Decimal,
    supported_currencies: HashSet<String>,
    promo_codes: HashSet<String>,
    invoices: HashMap<String, Invoice>,
    next_invoice: u64,
    cases: HashMap<CaseId, CaseDefinition>,
    scripted_draws: VecDeque<Item>,
    inventory: Vec<Item>,
    transactions: Vec<TransactionRecord>,
    latency: HashMap<Operation, Duration>,
    failures: Failures,
    calls: HashMap<Operation, usize>,
}

/// An in-process stand-in for the backend ledger.
///
/// Behaves like the real service (debits, invoices, promo codes, random
/// draws) and adds hooks to script draws, inject latency and failures, and
/// count calls. Crypto invoices are only paid when
/// [`InMemoryLedger::complete_payment`] is called.
#[derive(Debug)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    /// Creates a ledger for one user holding `balance` minor units.
    pub fn new(balance: i64) -> Self {
        let state = LedgerState {
            balance: Balance::new(balance),
            rate: dec!(90),
            supported_currencies: ["USDT", "TON", "TRX", "BTC", "ETH", "LTC", "NOT", "BNB"]
                .into_iter()
                .map(String::from)
                .collect(),
            promo_codes: HashSet::new(),
            invoices: HashMap::new(),
            next_invoice: 1,
            cases: HashMap::new(),
            scripted_draws: VecDeque::new(),
            inventory: Vec::new(),
            transactions: Vec::new(),
            latency: HashMap::new(),
            failures: Failures::default(),
            calls: HashMap::new(),
        };
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn with_rate(mut self, rate: Decimal) -> Self {
        self.state.get_mut().rate = rate;
        self
    }

    pub fn with_promo_code(mut self, code: impl Into<String>) -> Self {
        self.state.get_mut().promo_codes.insert(code.into());
        self
    }

    pub fn with_case(
        mut self,
        case_id: impl Into<CaseId>,
        price: Amount,
        items: Vec<Item>,
    ) -> Self {
        let case_id = case_id.into();
        self.state.get_mut().cases.insert(
            case_id.clone(),
            CaseDefinition {
                name: case_id.to_string(),
                price,
                items,
                available: true,
            },
        );
        self
    }

    pub fn with_latency(mut self, op: Operation, latency: Duration) -> Self {
        self.state.get_mut().latency.insert(op, latency);
        self
    }

    pub async fn set_latency(&self, op: Operation, latency: Duration) {
        self.state.write().await.latency.insert(op, latency);
    }

    /// Moves the rate the ledger quotes and converts invoices at.
    pub async fn set_rate(&self, rate: Decimal) {
        self.state.write().await.rate = rate;
    }

    pub async fn balance(&self) -> Balance {
        self.state.read().await.balance
    }

    /// Simulates a concurrent spend or correction on the server.
    pub async fn set_balance(&self, balance: i64) {
        self.state.write().await.balance = Balance::new(balance);
    }

    pub async fn call_count(&self, op: Operation) -> usize {
        self.state
            .read()
            .await
            .calls
            .get(&op)
            .copied()
            .unwrap_or_default()
    }

    /// The next draw from any case returns `item`.
    pub async fn script_draw(&self, item: Item) {
        self.state.write().await.scripted_draws.push_back(item);
    }

    pub async fn set_case_available(&self, case_id: &CaseId, available: bool) {
        if let Some(case) = self.state.write().await.cases.get_mut(case_id) {
            case.available = available;
        }
    }

    pub async fn fail_payment_creation(&self, error: Option<LedgerError>) {
        self.state.write().await.failures.create_payment = error;
    }

    pub async fn fail_redeem(&self, error: Option<LedgerError>) {
        self.state.write().await.failures.redeem = error;
    }

    pub async fn fail_open_case(&self, error: Option<LedgerError>) {
        self.state.write().await.failures.open_case = error;
    }

    pub async fn fail_balance(&self, fail: bool) {
        self.state.write().await.failures.balance = fail;
    }

    pub async fn fail_exchange_rate(&self, fail: bool) {
        self.state.write().await.failures.exchange_rate = fail;
    }

    pub async fn fail_cases(&self, fail: bool) {
        self.state.write().await.failures.cases = fail;
    }

    /// Settles an invoice as the payment provider would, crediting the
    /// converted amount. Returns the new balance.
    pub async fn complete_payment(&self, payment_id: &str) -> Result<Balance, LedgerError> {
        let mut state = self.state.write().await;
        let invoice = state
            .invoices
            .get_mut(payment_id)
            .ok_or_else(|| LedgerError::Rejected(format!("unknown invoice {}", payment_id)))?;
        if invoice.paid {
            return Err(LedgerError::Rejected(format!(
                "invoice {} already paid",
                payment_id
            )));
        }
        invoice.paid = true;
        let credited = invoice.amount_local;
        state.balance += credited;
        if let Some(record) = state.transactions.iter_mut().find(|t| t.id == payment_id) {
            record.state = TransactionState::Paid;
        }
        Ok(state.balance)
    }

    /// Counts the call and waits out the configured latency for `op`.
    async fn enter(&self, op: Operation) {
        let latency = {
            let mut state = self.state.write().await;
            *state.calls.entry(op).or_default() += 1;
            state.latency.get(&op).copied()
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn create_crypto_payment(
        &self,
        amount_usd: Amount,
        currency: &str,
    ) -> Result<CryptoInvoice, LedgerError> {
        self.enter(Operation::CreateCryptoPayment).await;
        let mut state = self.state.write().await;
        if let Some(e) = state.failures.create_payment.clone() {
            return Err(e);
        }
        if !state.supported_currencies.contains(currency) {
            return Err(LedgerError::Rejected("Unsupported cryptocurrency".to_string()));
        }

        let rate = ExchangeRate::new(state.rate, Instant::now())
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        let amount_local = rate
            .to_local(amount_usd)
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;

        let payment_id = format!("inv-{}", state.next_invoice);
        state.next_invoice += 1;
        state.invoices.insert(
            payment_id.clone(),
            Invoice {
                amount_local,
                paid: false,
            },
        );
        state.transactions.push(TransactionRecord {
            id: payment_id.clone(),
            amount_local,
            currency: currency.to_string(),
            state: TransactionState::Pending,
            is_promo: false,
        });

        Ok(CryptoInvoice {
            pay_url: format!("https://pay.invalid/invoice/{}", payment_id),
            payment_id,
        })
    }

    async fn redeem_promo_code(
        &self,
        code: &str,
        amount_local: Amount,
    ) -> Result<PromoRedemption, LedgerError> {
        self.enter(Operation::RedeemPromoCode).await;
        let mut state = self.state.write().await;
        if let Some(e) = state.failures.redeem.clone() {
            return Err(e);
        }
        if !state.promo_codes.contains(code) {
            return Err(LedgerError::InvalidPromoCode("Invalid promocode".to_string()));
        }

        let added_amount = Balance::from(amount_local);
        state.balance += added_amount;
        let id = format!("promo-{}", state.transactions.len() + 1);
        state.transactions.push(TransactionRecord {
            id,
            amount_local: added_amount,
            currency: "PROMO".to_string(),
            state: TransactionState::Paid,
            is_promo: true,
        });

        Ok(PromoRedemption {
            added_amount,
            new_balance: state.balance,
        })
    }

    async fn cases(&self) -> Result<Vec<CaseSummary>, LedgerError> {
        self.enter(Operation::Cases).await;
        let state = self.state.read().await;
        if state.failures.cases {
            return Err(LedgerError::Transport("catalogue unreachable".to_string()));
        }
        let mut cases: Vec<CaseSummary> = state
            .cases
            .iter()
            .filter(|(_, case)| case.available)
            .map(|(id, case)| CaseSummary {
                id: id.clone(),
                name: case.name.clone(),
                price: case.price,
                image_ref: String::new(),
                items: case.items.clone(),
                is_new: false,
            })
            .collect();
        cases.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(cases)
    }

    async fn current_balance(&self) -> Result<Balance, LedgerError> {
        self.enter(Operation::CurrentBalance).await;
        let state = self.state.read().await;
        if state.failures.balance {
            return Err(LedgerError::Transport("connection reset".to_string()));
        }
        Ok(state.balance)
    }

    async fn open_case(&self, case_id: &CaseId) -> Result<CaseOpening, LedgerError> {
        self.enter(Operation::OpenCase).await;
        let mut state = self.state.write().await;
        if let Some(e) = state.failures.open_case.clone() {
            return Err(e);
        }
        let (price, items) = match state.cases.get(case_id) {
            Some(case) if case.available => (case.price, case.items.clone()),
            _ => return Err(LedgerError::CaseUnavailable),
        };
        if !state.balance.covers(price) {
            return Err(LedgerError::InsufficientFunds);
        }

        let item = match state.scripted_draws.pop_front() {
            Some(item) => item,
            None => items
                .choose(&mut rand::thread_rng())
                .cloned()
                .ok_or_else(|| LedgerError::Rejected("case has no items".to_string()))?,
        };

        state.balance -= Balance::from(price);
        state.inventory.push(item.clone());
        Ok(CaseOpening {
            success: true,
            item: Some(item),
            remaining_balance: state.balance,
        })
    }

    async fn exchange_rate(&self) -> Result<Decimal, LedgerError> {
        self.enter(Operation::ExchangeRate).await;
        let state = self.state.read().await;
        if state.failures.exchange_rate {
            return Err(LedgerError::Transport("rate provider unreachable".to_string()));
        }
        Ok(state.rate)
    }

    async fn inventory(&self) -> Result<Vec<Item>, LedgerError> {
        self.enter(Operation::Inventory).await;
        Ok(self.state.read().await.inventory.clone())
    }

    async fn transactions(&self) -> Result<Vec<TransactionRecord>, LedgerError> {
        self.enter(Operation::Transactions).await;
        Ok(self.state.read().await.transactions.clone())
    }
}
