//! Cart to order conversion.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{CartId, FoodId, UserId};
use domain::{DeliveryAddress, FoodSnapshot, Money, OrderError, OrderLine};
use rpc::{
    CartItem, CartRpc, CartStatus, DEFAULT_RPC_TIMEOUT, FoodRpc, RestaurantInfo, RestaurantRpc,
    RpcError, with_timeout,
};

use crate::{FulfillmentError, Result};

/// A validated cart turned into order lines.
#[derive(Debug, Clone)]
pub struct ConvertedCart {
    pub restaurant: RestaurantInfo,
    pub lines: Vec<OrderLine>,
    /// Sum of unit price times quantity, before discount.
    pub total: Money,
    /// Not part of `total`.
    pub delivery_fee: Money,
}

impl ConvertedCart {
    /// Food and quantity pairs for the inventory check.
    pub fn items(&self) -> Vec<(FoodId, u32)> {
        self.lines
            .iter()
            .map(|line| (line.food.food_id.clone(), line.quantity))
            .collect()
    }
}

/// Validates carts and converts their items into priced order lines.
#[derive(Clone)]
pub struct CartConversionService {
    carts: Arc<dyn CartRpc>,
    foods: Arc<dyn FoodRpc>,
    restaurants: Arc<dyn RestaurantRpc>,
    timeout: Duration,
}

impl CartConversionService {
    pub fn new(
        carts: Arc<dyn CartRpc>,
        foods: Arc<dyn FoodRpc>,
        restaurants: Arc<dyn RestaurantRpc>,
    ) -> Self {
        Self {
            carts,
            foods,
            restaurants,
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks ownership and returns the cart items.
    ///
    /// The cart must be non-empty, unprocessed and hold items of a single
    /// restaurant.
    #[tracing::instrument(skip(self))]
    pub async fn validate(&self, cart_id: &CartId, user_id: &UserId) -> Result<Vec<CartItem>> {
        with_timeout(
            "cart",
            self.timeout,
            self.carts.validate_ownership(cart_id, user_id),
        )
        .await
        .map_err(|e| cart_error(cart_id, e, "validating cart ownership"))?;

        let items = with_timeout(
            "cart",
            self.timeout,
            self.carts.find_items(cart_id, user_id),
        )
        .await
        .map_err(|e| cart_error(cart_id, e, "fetching cart items"))?;

        if items.is_empty() {
            return Err(FulfillmentError::EmptyCart(cart_id.clone()));
        }
        if items
            .iter()
            .any(|item| item.status == CartStatus::Processed)
        {
            return Err(FulfillmentError::CartProcessed(cart_id.clone()));
        }

        let restaurants: HashSet<_> = items.iter().map(|item| &item.restaurant_id).collect();
        if restaurants.len() > 1 {
            return Err(FulfillmentError::MultiRestaurantCart(cart_id.clone()));
        }

        Ok(items)
    }

    /// Prices validated cart items against the food catalog and the restaurant.
    #[tracing::instrument(skip(self, items, address), fields(item_count = items.len()))]
    pub async fn convert(
        &self,
        items: &[CartItem],
        address: &DeliveryAddress,
    ) -> Result<ConvertedCart> {
        let restaurant_id = items
            .first()
            .map(|item| item.restaurant_id.clone())
            .ok_or(OrderError::NoItems)?;

        let food_ids: Vec<FoodId> = items.iter().map(|item| item.food_id.clone()).collect();
        let foods = with_timeout("food", self.timeout, self.foods.find_by_ids(&food_ids))
            .await
            .map_err(FulfillmentError::rpc("fetching food details"))?;

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let food = foods
                .get(&item.food_id)
                .ok_or_else(|| FulfillmentError::FoodNotFound(item.food_id.clone()))?;
            lines.push(OrderLine::new(
                FoodSnapshot {
                    food_id: food.id.clone(),
                    name: food.name.clone(),
                    description: food.description.clone(),
                    image: food.image.clone(),
                },
                food.price,
                item.quantity,
            ));
        }

        let restaurants = with_timeout(
            "restaurant",
            self.timeout,
            self.restaurants
                .find_by_ids(std::slice::from_ref(&restaurant_id)),
        )
        .await
        .map_err(FulfillmentError::rpc("fetching restaurant"))?;

        let restaurant = restaurants
            .get(&restaurant_id)
            .cloned()
            .ok_or_else(|| FulfillmentError::RestaurantNotFound(restaurant_id.clone()))?;
        if !restaurant.is_active() {
            return Err(FulfillmentError::RestaurantInactive(restaurant_id));
        }

        let total = OrderLine::checked_total(&lines)?;
        let delivery_fee = address.delivery_fee(restaurant.shipping_fee_per_km);

        Ok(ConvertedCart {
            restaurant,
            lines,
            total,
            delivery_fee,
        })
    }
}

fn cart_error(cart_id: &CartId, error: RpcError, context: &'static str) -> FulfillmentError {
    match error {
        RpcError::NotFound { .. } => FulfillmentError::CartNotFound(cart_id.clone()),
        RpcError::Rejected { .. } => FulfillmentError::CartNotOwned(cart_id.clone()),
        other => FulfillmentError::rpc(context)(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::RestaurantId;
    use rpc::{
        FoodInfo, FoodStatus, InMemoryCartRpc, InMemoryFoodRpc, InMemoryRestaurantRpc,
        RestaurantStatus,
    };

    struct Fixture {
        service: CartConversionService,
        carts: InMemoryCartRpc,
        restaurants: InMemoryRestaurantRpc,
    }

    fn food(id: &str, restaurant: &str, cents: i64) -> FoodInfo {
        FoodInfo {
            id: FoodId::new(id),
            name: format!("Food {id}"),
            description: "tasty".to_string(),
            image: Some(format!("{id}.png")),
            price: Money::from_cents(cents),
            restaurant_id: RestaurantId::new(restaurant),
            status: FoodStatus::Active,
        }
    }

    fn setup() -> Fixture {
        let carts = InMemoryCartRpc::new();
        let foods = InMemoryFoodRpc::new();
        let restaurants = InMemoryRestaurantRpc::new();

        restaurants.add_restaurant(RestaurantInfo {
            id: RestaurantId::new("r1"),
            name: "Pho 24".to_string(),
            status: RestaurantStatus::Active,
            shipping_fee_per_km: Money::from_cents(100),
            owner_id: UserId::new("owner-1"),
        });
        foods.add_food(food("f1", "r1", 1000));
        foods.add_food(food("f2", "r1", 250));
        foods.add_food(food("f3", "r2", 500));
        foods.add_food(food("f4", "r1", 5_000_000_000_000));

        let service = CartConversionService::new(
            Arc::new(carts.clone()),
            Arc::new(foods),
            Arc::new(restaurants.clone()),
        );
        Fixture {
            service,
            carts,
            restaurants,
        }
    }

    fn user() -> UserId {
        UserId::new("user-1")
    }

    #[tokio::test]
    async fn test_validate_and_convert() {
        let fx = setup();
        let cart = CartId::new("cart-1");
        fx.carts.add_cart(cart.clone(), user());
        fx.carts
            .add_item(&cart, FoodId::new("f1"), RestaurantId::new("r1"), 2);
        fx.carts
            .add_item(&cart, FoodId::new("f2"), RestaurantId::new("r1"), 3);

        let items = fx.service.validate(&cart, &user()).await.unwrap();
        let converted = fx
            .service
            .convert(
                &items,
                &DeliveryAddress::new("1 Main St", "Hanoi").with_distance_km(2.5),
            )
            .await
            .unwrap();

        assert_eq!(converted.total, Money::from_cents(2750));
        assert_eq!(converted.delivery_fee, Money::from_cents(250));
        assert_eq!(converted.lines.len(), 2);
        assert_eq!(converted.lines[0].food.name, "Food f1");
        assert_eq!(
            converted.items(),
            vec![(FoodId::new("f1"), 2), (FoodId::new("f2"), 3)]
        );
    }

    #[tokio::test]
    async fn test_overflowing_total_rejected() {
        let fx = setup();
        let cart = CartId::new("cart-1");
        fx.carts.add_cart(cart.clone(), user());
        fx.carts
            .add_item(&cart, FoodId::new("f4"), RestaurantId::new("r1"), 4_000_000);

        let items = fx.service.validate(&cart, &user()).await.unwrap();
        let result = fx
            .service
            .convert(&items, &DeliveryAddress::new("1 Main St", "Hanoi"))
            .await;

        assert!(matches!(
            &result,
            Err(FulfillmentError::Order(OrderError::TotalOverflow(id))) if id.as_str() == "f4"
        ));
        assert_eq!(result.unwrap_err().kind(), crate::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_delivery_fee_without_distance_is_zero() {
        let fx = setup();
        let cart = CartId::new("cart-1");
        fx.carts.add_cart(cart.clone(), user());
        fx.carts
            .add_item(&cart, FoodId::new("f1"), RestaurantId::new("r1"), 1);

        let items = fx.service.validate(&cart, &user()).await.unwrap();
        let converted = fx
            .service
            .convert(&items, &DeliveryAddress::new("1 Main St", "Hanoi"))
            .await
            .unwrap();
        assert_eq!(converted.delivery_fee, Money::zero());
    }

    #[tokio::test]
    async fn test_multi_restaurant_cart_rejected() {
        let fx = setup();
        let cart = CartId::new("cart-1");
        fx.carts.add_cart(cart.clone(), user());
        fx.carts
            .add_item(&cart, FoodId::new("f1"), RestaurantId::new("r1"), 1);
        fx.carts
            .add_item(&cart, FoodId::new("f3"), RestaurantId::new("r2"), 1);

        let result = fx.service.validate(&cart, &user()).await;
        assert!(matches!(
            result,
            Err(FulfillmentError::MultiRestaurantCart(_))
        ));
    }

    #[tokio::test]
    async fn test_processed_cart_rejected() {
        let fx = setup();
        let cart = CartId::new("cart-1");
        fx.carts.add_cart(cart.clone(), user());
        fx.carts
            .add_item(&cart, FoodId::new("f1"), RestaurantId::new("r1"), 1);
        fx.carts
            .update_status(&cart, CartStatus::Processed)
            .await
            .unwrap();

        let result = fx.service.validate(&cart, &user()).await;
        assert!(matches!(result, Err(FulfillmentError::CartProcessed(_))));
    }

    #[tokio::test]
    async fn test_cart_lookup_errors() {
        let fx = setup();
        let cart = CartId::new("cart-1");

        assert!(matches!(
            fx.service.validate(&cart, &user()).await,
            Err(FulfillmentError::CartNotFound(_))
        ));

        fx.carts.add_cart(cart.clone(), UserId::new("someone-else"));
        assert!(matches!(
            fx.service.validate(&cart, &user()).await,
            Err(FulfillmentError::CartNotOwned(_))
        ));

        fx.carts.add_cart(CartId::new("cart-2"), user());
        assert!(matches!(
            fx.service.validate(&CartId::new("cart-2"), &user()).await,
            Err(FulfillmentError::EmptyCart(_))
        ));

        fx.carts.set_unavailable(true);
        let err = fx.service.validate(&cart, &user()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_inactive_restaurant_rejected() {
        let fx = setup();
        let cart = CartId::new("cart-1");
        fx.carts.add_cart(cart.clone(), user());
        fx.carts
            .add_item(&cart, FoodId::new("f1"), RestaurantId::new("r1"), 1);
        fx.restaurants
            .set_status(&RestaurantId::new("r1"), RestaurantStatus::Inactive);

        let items = fx.service.validate(&cart, &user()).await.unwrap();
        let result = fx
            .service
            .convert(&items, &DeliveryAddress::new("1 Main St", "Hanoi"))
            .await;
        assert!(matches!(result, Err(FulfillmentError::RestaurantInactive(_))));
    }
}
