use crate::domain::case::Item;
use crate::domain::money::Balance;
use crate::domain::ports::{SharedLedger, TransactionRecord};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InventorySummary {
    pub items: Vec<Item>,
    pub total_value: Balance,
}

impl InventorySummary {
    pub fn from_items(items: Vec<Item>) -> Self {
        let total_value = items
            .iter()
            .fold(Balance::ZERO, |total, item| total + item.price_minor);
        Self { items, total_value }
    }
}

/// Read-only access to what the ledger holds for the user.
pub struct InventoryReader {
    ledger: SharedLedger,
}

impl InventoryReader {
    pub fn new(ledger: SharedLedger) -> Self {
        Self { ledger }
    }

    pub async fn load(&self) -> Result<InventorySummary> {
        let items = self.ledger.inventory().await?;
        Ok(InventorySummary::from_items(items))
    }

    /// Top-up history, newest last.
    pub async fn history(&self) -> Result<Vec<TransactionRecord>> {
        Ok(self.ledger.transactions().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_value() {
        let summary = InventorySummary::from_items(vec![
            Item::new("a", "Knife", 5000),
            Item::new("b", "Gloves", 2500),
        ]);
        assert_eq!(summary.total_value, Balance::new(7500));
        assert_eq!(InventorySummary::default().total_value, Balance::ZERO);
    }
}
