use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares an opaque string identifier newtype.
///
/// Sibling services hand out their own identifiers, so ids are kept as
/// strings rather than parsed into UUIDs. Locally generated ids use UUID v4.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from an existing value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generates a new random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is empty or whitespace.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of an order (aggregate root).
    OrderId
);

string_id!(
    /// Identifier of a user account (customers, restaurant owners, shippers).
    UserId
);

string_id!(
    /// Identifier of a shopping cart.
    CartId
);

string_id!(
    /// Identifier of a catalog food item.
    FoodId
);

string_id!(
    /// Identifier of a restaurant.
    RestaurantId
);

string_id!(
    /// Identifier of a shipper. Shippers are users, so this converts into a [`UserId`].
    ShipperId
);

string_id!(
    /// Identifier of a stored payment card.
    CardId
);

impl From<ShipperId> for UserId {
    fn from(id: ShipperId) -> Self {
        UserId(id.0)
    }
}
