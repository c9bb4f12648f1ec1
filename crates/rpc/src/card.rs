//! Payment card contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{CardId, UserId};
use serde::{Deserialize, Serialize};

use crate::{Result, RpcError};

const SERVICE: &str = "card";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    #[default]
    Active,
    Inactive,
}

/// A stored payment card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub user_id: UserId,
    pub status: CardStatus,
}

#[async_trait]
pub trait CardRpc: Send + Sync {
    async fn find_by_id(&self, card_id: &CardId) -> Result<Option<Card>>;
}

#[derive(Debug, Default)]
struct InMemoryCardState {
    cards: HashMap<CardId, Card>,
    unavailable: bool,
}

/// In-memory card vault.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCardRpc {
    state: Arc<RwLock<InMemoryCardState>>,
}

impl InMemoryCardRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_card(&self, card: Card) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .cards
            .insert(card.id.clone(), card);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unavailable = unavailable;
    }
}

#[async_trait]
impl CardRpc for InMemoryCardRpc {
    async fn find_by_id(&self, card_id: &CardId) -> Result<Option<Card>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.unavailable {
            return Err(RpcError::unavailable(SERVICE));
        }
        Ok(state.cards.get(card_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_by_id() {
        let rpc = InMemoryCardRpc::new();
        rpc.add_card(Card {
            id: CardId::new("card-1"),
            user_id: UserId::new("user-1"),
            status: CardStatus::Active,
        });

        let card = rpc.find_by_id(&CardId::new("card-1")).await.unwrap();
        assert_eq!(card.map(|c| c.user_id), Some(UserId::new("user-1")));
        assert!(
            rpc.find_by_id(&CardId::new("card-2"))
                .await
                .unwrap()
                .is_none()
        );
    }
}
