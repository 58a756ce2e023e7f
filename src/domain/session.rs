use super::case::Item;
use super::events::ShopEvent;
use super::money::Balance;
use serde::{Deserialize, Serialize};

/// The caller-owned view of the signed-in user.
///
/// Replaces ambient "current user" state: the presentation layer folds
/// [`ShopEvent`]s into it and passes `balance()` snapshots into the state
/// machines explicitly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    balance: Balance,
    revealed: Vec<Item>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, balance: Balance) -> Self {
        Self {
            user_id: user_id.into(),
            balance,
            revealed: Vec::new(),
        }
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    /// Items revealed during this session, oldest first.
    pub fn revealed(&self) -> &[Item] {
        &self.revealed
    }

    pub fn apply(&mut self, event: &ShopEvent) {
        match event {
            ShopEvent::BalanceChanged { balance, .. } => self.balance = *balance,
            ShopEvent::ItemRevealed { item, .. } => self.revealed.push(item.clone()),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::case::CaseId;
    use crate::domain::events::BalanceCause;
    use crate::domain::topup::{AttemptId, TopUpStatus};

    #[test]
    fn test_apply_tracks_balance_and_items() {
        let mut session = Session::new("u1", Balance::new(20000));

        session.apply(&ShopEvent::ItemRevealed {
            case_id: CaseId::from("c1"),
            item: Item::new("x", "Knife", 5000),
        });
        session.apply(&ShopEvent::BalanceChanged {
            balance: Balance::new(5000),
            cause: BalanceCause::CaseOpened(CaseId::from("c1")),
        });
        session.apply(&ShopEvent::TopUpSettled {
            attempt: AttemptId(1),
            status: TopUpStatus::Abandoned,
        });

        assert_eq!(session.balance(), Balance::new(5000));
        assert_eq!(session.revealed().len(), 1);
        assert_eq!(session.revealed()[0].id, "x");
    }
}
