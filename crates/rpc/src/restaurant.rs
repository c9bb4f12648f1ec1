//! Restaurant service contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{RestaurantId, UserId};
use domain::Money;
use serde::{Deserialize, Serialize};

use crate::{Result, RpcError};

const SERVICE: &str = "restaurant";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestaurantStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantInfo {
    pub id: RestaurantId,
    pub name: String,
    pub status: RestaurantStatus,
    /// Delivery fee charged per kilometre of distance.
    pub shipping_fee_per_km: Money,
    pub owner_id: UserId,
}

impl RestaurantInfo {
    pub fn is_active(&self) -> bool {
        self.status == RestaurantStatus::Active
    }
}

#[async_trait]
pub trait RestaurantRpc: Send + Sync {
    /// Looks up restaurants by id. Unknown ids are absent from the result.
    async fn find_by_ids(
        &self,
        ids: &[RestaurantId],
    ) -> Result<HashMap<RestaurantId, RestaurantInfo>>;
}

#[derive(Debug, Default)]
struct InMemoryRestaurantState {
    restaurants: HashMap<RestaurantId, RestaurantInfo>,
    unavailable: bool,
}

/// In-memory restaurant directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRestaurantRpc {
    state: Arc<RwLock<InMemoryRestaurantState>>,
}

impl InMemoryRestaurantRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_restaurant(&self, restaurant: RestaurantInfo) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .restaurants
            .insert(restaurant.id.clone(), restaurant);
    }

    pub fn set_status(&self, id: &RestaurantId, status: RestaurantStatus) {
        if let Some(restaurant) = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .restaurants
            .get_mut(id)
        {
            restaurant.status = status;
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unavailable = unavailable;
    }
}

#[async_trait]
impl RestaurantRpc for InMemoryRestaurantRpc {
    async fn find_by_ids(
        &self,
        ids: &[RestaurantId],
    ) -> Result<HashMap<RestaurantId, RestaurantInfo>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.unavailable {
            return Err(RpcError::unavailable(SERVICE));
        }
        Ok(ids
            .iter()
            .filter_map(|id| state.restaurants.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }
}
