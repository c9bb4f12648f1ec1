//! Shared identifier types used across the order fulfillment crates.

mod types;

pub use types::{CardId, CartId, FoodId, OrderId, RestaurantId, ShipperId, UserId};
