//! Contracts for the sibling services reached over RPC.
//!
//! Each contract is a trait with an in-memory implementation used by tests
//! and by the demo server. Transport bindings live outside this workspace.

pub mod card;
pub mod cart;
pub mod error;
pub mod food;
pub mod restaurant;
pub mod timeout;
pub mod user;

pub use card::{Card, CardRpc, CardStatus, InMemoryCardRpc};
pub use cart::{CartItem, CartRpc, CartStatus, InMemoryCartRpc};
pub use error::{Result, RpcError};
pub use food::{FoodInfo, FoodRpc, FoodStatus, InMemoryFoodRpc};
pub use restaurant::{InMemoryRestaurantRpc, RestaurantInfo, RestaurantRpc, RestaurantStatus};
pub use timeout::{DEFAULT_RPC_TIMEOUT, with_timeout};
pub use user::{InMemoryUserRpc, UserInfo, UserRole, UserRpc};
