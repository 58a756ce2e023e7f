#![allow(dead_code)]

use casefront::application::case_opening::CaseOpeningEngine;
use casefront::application::exchange_rate::ExchangeRateCache;
use casefront::application::top_up::TopUpReconciler;
use casefront::config::ShopConfig;
use casefront::domain::events::{EventSink, ShopEvent};
use casefront::domain::money::{Amount, Balance};
use casefront::infrastructure::in_memory::InMemoryLedger;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Both state machines wired to one in-memory ledger and one event channel.
pub struct Shop {
    pub ledger: Arc<InMemoryLedger>,
    pub rates: Arc<ExchangeRateCache>,
    pub top_up: Arc<TopUpReconciler>,
    pub cases: CaseOpeningEngine,
    pub events: UnboundedReceiver<ShopEvent>,
}

pub fn shop(ledger: InMemoryLedger) -> Shop {
    shop_with_config(ledger, ShopConfig::default())
}

/// Routes logs through the test harness so they show only for failing tests.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(casefront::telemetry::env_filter())
        .with_test_writer()
        .try_init();
}

pub fn shop_with_config(ledger: InMemoryLedger, config: ShopConfig) -> Shop {
    init_test_tracing();

    let ledger = Arc::new(ledger);
    let (sink, events) = EventSink::channel();
    let rates = Arc::new(ExchangeRateCache::new(
        ledger.clone(),
        config.exchange_rate.clone(),
    ));
    let top_up = Arc::new(TopUpReconciler::new(
        ledger.clone(),
        rates.clone(),
        config.top_up.clone(),
        sink.clone(),
    ));
    let cases = CaseOpeningEngine::new(ledger.clone(), config.case_opening.clone(), sink);

    Shop {
        ledger,
        rates,
        top_up,
        cases,
        events,
    }
}

pub fn drain(events: &mut UnboundedReceiver<ShopEvent>) -> Vec<ShopEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

pub fn balance_changes(events: &[ShopEvent]) -> Vec<Balance> {
    events
        .iter()
        .filter_map(|event| match event {
            ShopEvent::BalanceChanged { balance, .. } => Some(*balance),
            _ => None,
        })
        .collect()
}

pub fn amount(minor: i64) -> Amount {
    Amount::new(minor).unwrap()
}
