//! Cart service contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{CartId, FoodId, RestaurantId, UserId};
use serde::{Deserialize, Serialize};

use crate::{Result, RpcError};

const SERVICE: &str = "cart";

/// Status of a cart item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
    #[default]
    Active,
    Updated,
    /// Already converted into an order.
    Processed,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Active => "active",
            CartStatus::Updated => "updated",
            CartStatus::Processed => "processed",
        }
    }
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A line in a user's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub cart_id: CartId,
    pub food_id: FoodId,
    pub restaurant_id: RestaurantId,
    pub quantity: u32,
    pub status: CartStatus,
}

/// Operations the order core needs from the cart service.
#[async_trait]
pub trait CartRpc: Send + Sync {
    /// Succeeds if the cart exists and belongs to `user_id`.
    async fn validate_ownership(&self, cart_id: &CartId, user_id: &UserId) -> Result<()>;

    /// Returns the items of a cart owned by `user_id`.
    async fn find_items(&self, cart_id: &CartId, user_id: &UserId) -> Result<Vec<CartItem>>;

    /// Sets the status of every item in the cart.
    async fn update_status(&self, cart_id: &CartId, status: CartStatus) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryCartState {
    owners: HashMap<CartId, UserId>,
    items: HashMap<CartId, Vec<CartItem>>,
    unavailable: bool,
    fail_on_update_status: bool,
}

/// In-memory cart service.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartRpc {
    state: Arc<RwLock<InMemoryCartState>>,
}

impl InMemoryCartRpc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an empty cart owned by `user_id`.
    pub fn add_cart(&self, cart_id: CartId, user_id: UserId) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.items.entry(cart_id.clone()).or_default();
        state.owners.insert(cart_id, user_id);
    }

    /// Adds an active item to an existing cart.
    pub fn add_item(
        &self,
        cart_id: &CartId,
        food_id: FoodId,
        restaurant_id: RestaurantId,
        quantity: u32,
    ) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state
            .items
            .entry(cart_id.clone())
            .or_default()
            .push(CartItem {
                cart_id: cart_id.clone(),
                food_id,
                restaurant_id,
                quantity,
                status: CartStatus::Active,
            });
    }

    /// Makes every call fail as if the service were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unavailable = unavailable;
    }

    /// Makes `update_status` fail while reads keep working.
    pub fn set_fail_on_update_status(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_update_status = fail;
    }

    /// Returns the statuses of a cart's items.
    pub fn statuses(&self, cart_id: &CartId) -> Vec<CartStatus> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .get(cart_id)
            .map(|items| items.iter().map(|i| i.status).collect())
            .unwrap_or_default()
    }

    fn check_owner(state: &InMemoryCartState, cart_id: &CartId, user_id: &UserId) -> Result<()> {
        if state.unavailable {
            return Err(RpcError::unavailable(SERVICE));
        }
        match state.owners.get(cart_id) {
            None => Err(RpcError::NotFound {
                service: SERVICE,
                entity: "cart",
                id: cart_id.to_string(),
            }),
            Some(owner) if owner != user_id => Err(RpcError::Rejected {
                service: SERVICE,
                reason: format!("cart {cart_id} does not belong to user {user_id}"),
            }),
            Some(_) => Ok(()),
        }
    }
}

#[async_trait]
impl CartRpc for InMemoryCartRpc {
    async fn validate_ownership(&self, cart_id: &CartId, user_id: &UserId) -> Result<()> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Self::check_owner(&state, cart_id, user_id)
    }

    async fn find_items(&self, cart_id: &CartId, user_id: &UserId) -> Result<Vec<CartItem>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Self::check_owner(&state, cart_id, user_id)?;
        Ok(state.items.get(cart_id).cloned().unwrap_or_default())
    }

    async fn update_status(&self, cart_id: &CartId, status: CartStatus) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.unavailable || state.fail_on_update_status {
            return Err(RpcError::unavailable(SERVICE));
        }
        let items = state
            .items
            .get_mut(cart_id)
            .ok_or_else(|| RpcError::NotFound {
                service: SERVICE,
                entity: "cart",
                id: cart_id.to_string(),
            })?;
        for item in items.iter_mut() {
            item.status = status;
        }
        Ok(())
    }
}
