use miette::Diagnostic;
use thiserror::Error;

/// Failures reported by the backend ledger collaborator.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// The server rejected the promo code; the message is the server's own.
    #[error("{0}")]
    #[diagnostic(code(casefront::ledger::invalid_promo_code))]
    InvalidPromoCode(String),
    #[error("Insufficient funds")]
    #[diagnostic(code(casefront::ledger::insufficient_funds))]
    InsufficientFunds,
    #[error("Case is unavailable")]
    #[diagnostic(code(casefront::ledger::case_unavailable))]
    CaseUnavailable,
    #[error("Request rejected: {0}")]
    #[diagnostic(code(casefront::ledger::rejected))]
    Rejected(String),
    #[error("Transport error: {0}")]
    #[diagnostic(code(casefront::ledger::transport))]
    Transport(String),
    #[error("Malformed response: {0}")]
    #[diagnostic(code(casefront::ledger::malformed))]
    Malformed(String),
}

#[derive(Error, Diagnostic, Debug)]
pub enum ShopError {
    #[error("Validation error: {0}")]
    #[diagnostic(code(casefront::validation))]
    Validation(String),

    #[error("Top-up attempt #{attempt} is still in flight")]
    #[diagnostic(
        code(casefront::top_up::already_in_flight),
        help("wait for the current attempt to settle or cancel it first")
    )]
    AlreadyInFlight { attempt: u64 },

    #[error("No top-up attempt to act on")]
    #[diagnostic(code(casefront::top_up::no_active_attempt))]
    NoActiveAttempt,

    #[error("Top-up attempt cannot be cancelled while {status}")]
    #[diagnostic(
        code(casefront::top_up::not_cancellable),
        help("promo redemptions settle synchronously; wait for the result")
    )]
    NotCancellable { status: String },

    #[error("Insufficient funds: need {required}, have {available}")]
    #[diagnostic(code(casefront::case::insufficient_funds))]
    InsufficientFunds { required: i64, available: i64 },

    #[error("Cannot {action} while {from}")]
    #[diagnostic(code(casefront::invalid_transition))]
    InvalidTransition { from: String, action: &'static str },

    #[error("Exchange rate fetch failed: {0}")]
    #[diagnostic(code(casefront::rate::fetch_failed))]
    RateFetchFailed(#[source] LedgerError),

    #[error("Amount conversion overflowed")]
    #[diagnostic(code(casefront::rate::overflow))]
    ConversionOverflow,

    #[error("Ledger error: {0}")]
    #[diagnostic(code(casefront::ledger))]
    Ledger(#[from] LedgerError),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(casefront::config))]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ShopError>;
