use casefront::application::inventory::InventoryReader;
use casefront::domain::case::{CaseId, Item};
use casefront::domain::money::{Amount, Balance};
use casefront::domain::ports::{Ledger, SharedLedger, TransactionState};
use casefront::infrastructure::in_memory::InMemoryLedger;
use std::sync::Arc;

#[tokio::test]
async fn test_ledger_as_trait_object() {
    let ledger: SharedLedger = Arc::new(
        InMemoryLedger::new(30000)
            .with_promo_code("BONUS")
            .with_case(
                "c1",
                Amount::new(10000).unwrap(),
                vec![Item::new("x", "Knife", 5000)],
            ),
    );

    // Verify Send + Sync by spawning tasks
    let opener = {
        let ledger = ledger.clone();
        tokio::spawn(async move { ledger.open_case(&CaseId::from("c1")).await.unwrap() })
    };
    let redeemer = {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger
                .redeem_promo_code("BONUS", Amount::new(500).unwrap())
                .await
                .unwrap()
        })
    };

    let opening = opener.await.unwrap();
    assert!(opening.success);
    let redemption = redeemer.await.unwrap();
    assert_eq!(redemption.added_amount, Balance::new(500));

    assert_eq!(
        ledger.current_balance().await.unwrap(),
        Balance::new(30000 - 10000 + 500)
    );
}

#[tokio::test]
async fn test_inventory_reader_load_and_history() {
    let ledger = Arc::new(InMemoryLedger::new(20000).with_promo_code("BONUS").with_case(
        "c1",
        Amount::new(10000).unwrap(),
        vec![Item::new("x", "Knife", 5000)],
    ));
    let shared: SharedLedger = ledger.clone();
    shared.open_case(&CaseId::from("c1")).await.unwrap();
    shared.open_case(&CaseId::from("c1")).await.unwrap();
    shared
        .redeem_promo_code("BONUS", Amount::new(700).unwrap())
        .await
        .unwrap();
    let invoice = shared
        .create_crypto_payment(Amount::new(100).unwrap(), "TON")
        .await
        .unwrap();

    let reader = InventoryReader::new(shared);
    let summary = reader.load().await.unwrap();
    assert_eq!(summary.items.len(), 2);
    assert_eq!(summary.total_value, Balance::new(10000));

    let history = reader.history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].is_promo);
    assert_eq!(history[0].amount_local, Balance::new(700));
    assert_eq!(history[1].id, invoice.payment_id);
    assert_eq!(history[1].state, TransactionState::Pending);

    ledger.complete_payment(&invoice.payment_id).await.unwrap();
    let history = reader.history().await.unwrap();
    assert_eq!(history[1].state, TransactionState::Paid);
}
