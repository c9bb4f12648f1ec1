//! Food catalog contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{FoodId, RestaurantId};
use domain::Money;
use serde::{Deserialize, Serialize};

use crate::{Result, RpcError};

const SERVICE: &str = "food";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoodStatus {
    #[default]
    Active,
    Inactive,
}

/// Catalog data for one food item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodInfo {
    pub id: FoodId,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub price: Money,
    pub restaurant_id: RestaurantId,
    pub status: FoodStatus,
}

impl FoodInfo {
    pub fn is_active(&self) -> bool {
        self.status == FoodStatus::Active
    }
}

#[async_trait]
pub trait FoodRpc: Send + Sync {
    /// Looks up foods by id. Unknown ids are absent from the result.
    async fn find_by_ids(&self, ids: &[FoodId]) -> Result<HashMap<FoodId, FoodInfo>>;
}

#[derive(Debug, Default)]
struct InMemoryFoodState {
    foods: HashMap<FoodId, FoodInfo>,
    unavailable: bool,
}

/// In-memory food catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFoodRpc {
    state: Arc<RwLock<InMemoryFoodState>>,
}

impl InMemoryFoodRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_food(&self, food: FoodInfo) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .foods
            .insert(food.id.clone(), food);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unavailable = unavailable;
    }
}

#[async_trait]
impl FoodRpc for InMemoryFoodRpc {
    async fn find_by_ids(&self, ids: &[FoodId]) -> Result<HashMap<FoodId, FoodInfo>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.unavailable {
            return Err(RpcError::unavailable(SERVICE));
        }
        Ok(ids
            .iter()
            .filter_map(|id| state.foods.get(id).map(|f| (id.clone(), f.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_by_ids_skips_unknown() {
        let rpc = InMemoryFoodRpc::new();
        rpc.add_food(FoodInfo {
            id: FoodId::new("f1"),
            name: "Bun cha".to_string(),
            description: "Grilled pork with noodles".to_string(),
            image: None,
            price: Money::from_cents(700),
            restaurant_id: RestaurantId::new("r1"),
            status: FoodStatus::Active,
        });

        let found = rpc
            .find_by_ids(&[FoodId::new("f1"), FoodId::new("missing")])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[&FoodId::new("f1")].is_active());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let rpc = InMemoryFoodRpc::new();
        rpc.set_unavailable(true);
        assert!(rpc.find_by_ids(&[FoodId::new("f1")]).await.is_err());
    }
}
