//! Restaurant and food availability checks.

use std::sync::Arc;
use std::time::Duration;

use common::{FoodId, RestaurantId};
use domain::OrderError;
use rpc::{DEFAULT_RPC_TIMEOUT, FoodRpc, RestaurantRpc, with_timeout};

use crate::{FulfillmentError, Result};

/// Confirms a restaurant can take an order for a set of foods.
#[derive(Clone)]
pub struct InventoryChecker {
    restaurants: Arc<dyn RestaurantRpc>,
    foods: Arc<dyn FoodRpc>,
    timeout: Duration,
}

impl InventoryChecker {
    pub fn new(restaurants: Arc<dyn RestaurantRpc>, foods: Arc<dyn FoodRpc>) -> Self {
        Self {
            restaurants,
            foods,
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks that the restaurant is active and that every food is active,
    /// belongs to the restaurant and is ordered in a positive quantity.
    ///
    /// The first violation fails the check, naming the offending id.
    #[tracing::instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn check(&self, restaurant_id: &RestaurantId, items: &[(FoodId, u32)]) -> Result<()> {
        if let Some((food_id, quantity)) = items.iter().find(|(_, quantity)| *quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                food_id: food_id.clone(),
                quantity: *quantity,
            }
            .into());
        }

        let restaurants = with_timeout(
            "restaurant",
            self.timeout,
            self.restaurants
                .find_by_ids(std::slice::from_ref(restaurant_id)),
        )
        .await
        .map_err(FulfillmentError::rpc("checking restaurant"))?;

        let restaurant = restaurants
            .get(restaurant_id)
            .ok_or_else(|| FulfillmentError::RestaurantNotFound(restaurant_id.clone()))?;
        if !restaurant.is_active() {
            return Err(FulfillmentError::RestaurantInactive(restaurant_id.clone()));
        }

        let food_ids: Vec<FoodId> = items.iter().map(|(id, _)| id.clone()).collect();
        let foods = with_timeout("food", self.timeout, self.foods.find_by_ids(&food_ids))
            .await
            .map_err(FulfillmentError::rpc("checking foods"))?;

        for food_id in &food_ids {
            let food = foods
                .get(food_id)
                .ok_or_else(|| FulfillmentError::FoodNotFound(food_id.clone()))?;
            if !food.is_active() {
                return Err(FulfillmentError::FoodInactive(food_id.clone()));
            }
            if food.restaurant_id != *restaurant_id {
                return Err(FulfillmentError::FoodNotInRestaurant {
                    food_id: food_id.clone(),
                    restaurant_id: restaurant_id.clone(),
                });
            }
        }

        Ok(())
    }
}
