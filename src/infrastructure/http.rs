use crate::domain::case::{CaseId, CaseSummary, Item};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{
    CaseOpening, CryptoInvoice, Ledger, PromoRedemption, TransactionRecord, TransactionState,
};
use crate::error::LedgerError;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct CreatePaymentRequest<'a> {
    #[serde(with = "rust_decimal::serde::float")]
    amount_usd: Decimal,
    crypto_currency: &'a str,
}

#[derive(Deserialize)]
struct CreatePaymentResponse {
    pay_url: String,
    transaction_id: String,
}

#[derive(Serialize)]
struct PromoRequest<'a> {
    promo_code: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    amount_rub: Decimal,
}

#[derive(Deserialize)]
struct PromoResponse {
    new_balance: i64,
    added_amount_kopecks: i64,
}

#[derive(Deserialize)]
struct ProfileResponse {
    balance: i64,
}

#[derive(Deserialize)]
struct RateResponse {
    #[serde(with = "rust_decimal::serde::float")]
    usd_to_rub: Decimal,
}

#[derive(Deserialize)]
struct OpenCaseResponse {
    success: bool,
    item: Option<Item>,
    remaining_balance: i64,
}

#[derive(Deserialize)]
struct CasesResponse {
    #[serde(default)]
    cases: Vec<CaseSummary>,
}

#[derive(Deserialize)]
struct InventoryResponse {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Deserialize)]
struct TransactionsResponse {
    #[serde(default)]
    transactions: Vec<WireTransaction>,
}

#[derive(Deserialize)]
struct WireTransaction {
    id: String,
    #[serde(with = "rust_decimal::serde::float")]
    amount_rub: Decimal,
    crypto_currency: String,
    status: TransactionState,
    #[serde(default)]
    is_promocode: bool,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    detail: String,
}

/// A failed HTTP exchange, before it is classified per endpoint.
#[derive(Debug)]
enum Failure {
    Status(StatusCode, String),
    Ledger(LedgerError),
}

impl From<Failure> for LedgerError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Status(status, detail) => {
                LedgerError::Rejected(format!("{}: {}", status.as_u16(), detail))
            }
            Failure::Ledger(e) => e,
        }
    }
}

fn to_major(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

fn to_minor(major: Decimal) -> Result<Balance, LedgerError> {
    major
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(|| LedgerError::Malformed(format!("amount out of range: {}", major)))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .map(Balance::new)
        .ok_or_else(|| LedgerError::Malformed(format!("amount out of range: {}", major)))
}

fn classify_promo(failure: Failure) -> LedgerError {
    match failure {
        Failure::Status(StatusCode::BAD_REQUEST, detail) => {
            let detail = if detail.is_empty() {
                "Invalid promocode".to_string()
            } else {
                detail
            };
            LedgerError::InvalidPromoCode(detail)
        }
        other => other.into(),
    }
}

fn classify_open_case(failure: Failure) -> LedgerError {
    match failure {
        Failure::Status(StatusCode::NOT_FOUND, _) => LedgerError::CaseUnavailable,
        Failure::Status(StatusCode::BAD_REQUEST, detail)
            if detail.to_ascii_lowercase().contains("insufficient") =>
        {
            LedgerError::InsufficientFunds
        }
        other => other.into(),
    }
}

/// Ledger client for the storefront's REST backend.
#[derive(Clone)]
pub struct HttpLedger {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpLedger {
    /// `token` is sent as a bearer token on every request.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, Failure> {
        let response = builder
            .send()
            .await
            .map_err(|e| Failure::Ledger(LedgerError::Transport(e.to_string())))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.json::<ErrorBody>().await.unwrap_or_default();
            tracing::debug!("ledger returned {}: {}", status, body.detail);
            return Err(Failure::Status(status, body.detail));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| Failure::Ledger(LedgerError::Malformed(e.to_string())))
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn create_crypto_payment(
        &self,
        amount_usd: Amount,
        currency: &str,
    ) -> Result<CryptoInvoice, LedgerError> {
        let body = CreatePaymentRequest {
            amount_usd: to_major(amount_usd.value()),
            crypto_currency: currency,
        };
        let response: CreatePaymentResponse = self
            .send(self.request(Method::POST, "/api/create-crypto-payment").json(&body))
            .await?;
        Ok(CryptoInvoice {
            pay_url: response.pay_url,
            payment_id: response.transaction_id,
        })
    }

    async fn redeem_promo_code(
        &self,
        code: &str,
        amount_local: Amount,
    ) -> Result<PromoRedemption, LedgerError> {
        let body = PromoRequest {
            promo_code: code,
            amount_rub: to_major(amount_local.value()),
        };
        let response: PromoResponse = self
            .send(self.request(Method::POST, "/api/apply-promocode").json(&body))
            .await
            .map_err(classify_promo)?;
        Ok(PromoRedemption {
            added_amount: Balance::new(response.added_amount_kopecks),
            new_balance: Balance::new(response.new_balance),
        })
    }

    async fn cases(&self) -> Result<Vec<CaseSummary>, LedgerError> {
        let response: CasesResponse = self
            .send(self.request(Method::GET, "/api/cases"))
            .await?;
        Ok(response.cases)
    }

    async fn current_balance(&self) -> Result<Balance, LedgerError> {
        let response: ProfileResponse = self
            .send(self.request(Method::GET, "/api/user/profile"))
            .await?;
        Ok(Balance::new(response.balance))
    }

    async fn open_case(&self, case_id: &CaseId) -> Result<CaseOpening, LedgerError> {
        let path = format!("/api/cases/{}/open", case_id);
        let response: OpenCaseResponse = self
            .send(self.request(Method::POST, &path))
            .await
            .map_err(classify_open_case)?;
        Ok(CaseOpening {
            success: response.success,
            item: response.item,
            remaining_balance: Balance::new(response.remaining_balance),
        })
    }

    async fn exchange_rate(&self) -> Result<Decimal, LedgerError> {
        let response: RateResponse = self
            .send(self.request(Method::GET, "/api/exchange-rate"))
            .await?;
        Ok(response.usd_to_rub)
    }

    async fn inventory(&self) -> Result<Vec<Item>, LedgerError> {
        let response: InventoryResponse = self
            .send(self.request(Method::GET, "/api/user/inventory"))
            .await?;
        Ok(response.items)
    }

    async fn transactions(&self) -> Result<Vec<TransactionRecord>, LedgerError> {
        let response: TransactionsResponse = self
            .send(self.request(Method::GET, "/api/user/transactions"))
            .await?;
        response
            .transactions
            .into_iter()
            .map(|t| {
                Ok(TransactionRecord {
                    id: t.id,
                    amount_local: to_minor(t.amount_rub)?,
                    currency: t.crypto_currency,
                    state: t.status,
                    is_promo: t.is_promocode,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_minor_major_conversion() {
        assert_eq!(to_major(1050), dec!(10.50));
        assert_eq!(to_minor(dec!(10.505)).unwrap(), Balance::new(1051));
        assert_eq!(to_minor(dec!(92)).unwrap(), Balance::new(9200));
    }

    #[test]
    fn test_promo_request_shape() {
        let body = PromoRequest {
            promo_code: "BONUS",
            amount_rub: to_major(45000),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["promo_code"], "BONUS");
        assert_eq!(json["amount_rub"], 450.0);
    }

    #[test]
    fn test_classify_promo_failure_keeps_server_message() {
        let e = classify_promo(Failure::Status(
            StatusCode::BAD_REQUEST,
            "Invalid promocode".to_string(),
        ));
        assert_eq!(e, LedgerError::InvalidPromoCode("Invalid promocode".into()));

        let e = classify_promo(Failure::Status(
            StatusCode::INTERNAL_SERVER_ERROR,
            "db down".to_string(),
        ));
        assert!(matches!(e, LedgerError::Rejected(_)));
    }

    #[test]
    fn test_classify_open_case_failure() {
        assert_eq!(
            classify_open_case(Failure::Status(StatusCode::NOT_FOUND, String::new())),
            LedgerError::CaseUnavailable
        );
        assert_eq!(
            classify_open_case(Failure::Status(
                StatusCode::BAD_REQUEST,
                "Insufficient balance".to_string()
            )),
            LedgerError::InsufficientFunds
        );
    }

    #[test]
    fn test_open_case_response_shape() {
        let json = r#"{"success":true,"item":{"id":"x","name":"Knife","rarity":"legendary","price":5000,"image_url":"k.png"},"remaining_balance":5000}"#;
        let response: OpenCaseResponse = serde_json::from_str(json).unwrap();
        assert!(response.success);
        assert_eq!(response.item.unwrap().id, "x");
        assert_eq!(response.remaining_balance, 5000);
    }

    #[test]
    fn test_out_of_range_amount_is_malformed() {
        assert!(matches!(to_minor(Decimal::MAX), Err(LedgerError::Malformed(_))));
    }

    #[test]
    fn test_cases_response_shape() {
        let json = r#"{"cases":[{"id":"starter","name":"Starter","price":15000,"image_url":"s.png","items":[{"id":"x","name":"Knife","rarity":"legendary","price":5000,"image_url":"k.png"}],"is_new":true}]}"#;
        let response: CasesResponse = serde_json::from_str(json).unwrap();
        let case = &response.cases[0];
        assert_eq!(case.id, CaseId::from("starter"));
        assert_eq!(case.price.value(), 15000);
        assert_eq!(case.items[0].price_minor, Balance::new(5000));
        assert!(case.is_new);

        let empty: CasesResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.cases.is_empty());
    }

    #[test]
    fn test_rate_response_accepts_float() {
        let response: RateResponse = serde_json::from_str(r#"{"usd_to_rub": 92.5}"#).unwrap();
        assert_eq!(response.usd_to_rub, dec!(92.5));
    }
}
