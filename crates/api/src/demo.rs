//! In-process stand-ins for the sibling services, seeded with demo data.
//!
//! The core only sees the RPC traits; a deployment wires real clients in
//! their place.

use std::sync::Arc;

use common::{CardId, CartId, FoodId, RestaurantId, UserId};
use domain::Money;
use fulfillment::{Collaborators, SimulatedGateway};
use notification::LoggingEmailChannel;
use rpc::{
    Card, CardStatus, FoodInfo, FoodStatus, InMemoryCardRpc, InMemoryCartRpc, InMemoryFoodRpc,
    InMemoryRestaurantRpc, InMemoryUserRpc, RestaurantInfo, RestaurantStatus, UserInfo, UserRole,
};

/// Seeded in-memory sibling services.
#[derive(Clone, Default)]
pub struct DemoServices {
    pub carts: InMemoryCartRpc,
    pub foods: InMemoryFoodRpc,
    pub restaurants: InMemoryRestaurantRpc,
    pub cards: InMemoryCardRpc,
    pub users: InMemoryUserRpc,
}

impl DemoServices {
    /// Builds the services with one restaurant, its menu, a customer with a
    /// card and a ready cart, and a shipper.
    pub fn seeded() -> Self {
        let services = Self::default();

        for (id, first, last, role) in [
            ("user-1", "An", "Nguyen", UserRole::User),
            ("owner-1", "Chi", "Tran", UserRole::RestaurantOwner),
            ("shipper-1", "Binh", "Le", UserRole::Shipper),
        ] {
            services.users.add_user(UserInfo {
                id: UserId::new(id),
                email: format!("{id}@fooddelivery.local"),
                first_name: first.to_string(),
                last_name: last.to_string(),
                role,
            });
        }

        services.restaurants.add_restaurant(RestaurantInfo {
            id: RestaurantId::new("restaurant-1"),
            name: "Pho Thin".to_string(),
            status: RestaurantStatus::Active,
            shipping_fee_per_km: Money::from_cents(50),
            owner_id: UserId::new("owner-1"),
        });

        for (id, name, cents) in [
            ("food-1", "Pho bo", 650),
            ("food-2", "Quay", 100),
            ("food-3", "Tra da", 50),
        ] {
            services.foods.add_food(FoodInfo {
                id: FoodId::new(id),
                name: name.to_string(),
                description: String::new(),
                image: None,
                price: Money::from_cents(cents),
                restaurant_id: RestaurantId::new("restaurant-1"),
                status: FoodStatus::Active,
            });
        }

        services.cards.add_card(Card {
            id: CardId::new("card-1"),
            user_id: UserId::new("user-1"),
            status: CardStatus::Active,
        });

        let cart_id = CartId::new("cart-1");
        services
            .carts
            .add_cart(cart_id.clone(), UserId::new("user-1"));
        services.carts.add_item(
            &cart_id,
            FoodId::new("food-1"),
            RestaurantId::new("restaurant-1"),
            2,
        );
        services.carts.add_item(
            &cart_id,
            FoodId::new("food-2"),
            RestaurantId::new("restaurant-1"),
            2,
        );

        services
    }

    /// Wires the services with the simulated gateway and the logging email
    /// channel.
    pub fn collaborators(&self, sender: &str) -> Collaborators {
        Collaborators {
            carts: Arc::new(self.carts.clone()),
            foods: Arc::new(self.foods.clone()),
            restaurants: Arc::new(self.restaurants.clone()),
            cards: Arc::new(self.cards.clone()),
            users: Arc::new(self.users.clone()),
            gateway: Arc::new(SimulatedGateway::new()),
            channel: Arc::new(LoggingEmailChannel::new(sender)),
        }
    }
}
