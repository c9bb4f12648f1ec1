//! Order state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::OrderError;

/// The fulfillment state of an order, held on its tracking record.
///
/// State transitions:
/// ```text
/// WaitingForShipper ──► Preparing ──► OnTheWay ──► Delivered
///        │                  │             │
///        └──────────────────┴─────────────┴──► Cancel
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    /// Order placed, no shipper has picked it up yet.
    #[default]
    WaitingForShipper,

    /// The restaurant is preparing the food.
    Preparing,

    /// A shipper is delivering the order.
    OnTheWay,

    /// The order reached the customer (terminal state).
    Delivered,

    /// The order was cancelled (terminal state).
    Cancel,
}

impl OrderState {
    /// Every defined state, in lifecycle order.
    pub const ALL: [OrderState; 5] = [
        OrderState::WaitingForShipper,
        OrderState::Preparing,
        OrderState::OnTheWay,
        OrderState::Delivered,
        OrderState::Cancel,
    ];

    /// Returns the states reachable from this one in a single transition.
    pub fn successors(&self) -> &'static [OrderState] {
        match self {
            OrderState::WaitingForShipper => &[OrderState::Preparing, OrderState::Cancel],
            OrderState::Preparing => &[OrderState::OnTheWay, OrderState::Cancel],
            OrderState::OnTheWay => &[OrderState::Delivered, OrderState::Cancel],
            OrderState::Delivered | OrderState::Cancel => &[],
        }
    }

    /// Returns true if `target` is in this state's successor set.
    pub fn can_transition_to(&self, target: OrderState) -> bool {
        self.successors().contains(&target)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    /// Returns true if an order in this state may be soft-deleted.
    pub fn is_deletable(&self) -> bool {
        matches!(self, OrderState::WaitingForShipper | OrderState::Preparing)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::WaitingForShipper => "waiting_for_shipper",
            OrderState::Preparing => "preparing",
            OrderState::OnTheWay => "on_the_way",
            OrderState::Delivered => "delivered",
            OrderState::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderState {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        OrderState::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| OrderError::InvalidState(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_waiting_for_shipper() {
        assert_eq!(OrderState::default(), OrderState::WaitingForShipper);
    }

    #[test]
    fn test_successor_sets() {
        assert_eq!(
            OrderState::WaitingForShipper.successors(),
            &[OrderState::Preparing, OrderState::Cancel]
        );
        assert_eq!(
            OrderState::Preparing.successors(),
            &[OrderState::OnTheWay, OrderState::Cancel]
        );
        assert_eq!(
            OrderState::OnTheWay.successors(),
            &[OrderState::Delivered, OrderState::Cancel]
        );
        assert!(OrderState::Delivered.successors().is_empty());
        assert!(OrderState::Cancel.successors().is_empty());
    }

    #[test]
    fn test_self_transitions_rejected() {
        for state in OrderState::ALL {
            assert!(!state.can_transition_to(state), "{state} -> {state}");
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OrderState::WaitingForShipper.is_terminal());
        assert!(!OrderState::Preparing.is_terminal());
        assert!(!OrderState::OnTheWay.is_terminal());
        assert!(OrderState::Delivered.is_terminal());
        assert!(OrderState::Cancel.is_terminal());
    }

    #[test]
    fn test_deletable_states() {
        assert!(OrderState::WaitingForShipper.is_deletable());
        assert!(OrderState::Preparing.is_deletable());
        assert!(!OrderState::OnTheWay.is_deletable());
        assert!(!OrderState::Delivered.is_deletable());
        assert!(!OrderState::Cancel.is_deletable());
    }

    #[test]
    fn test_parse_round_trips_display() {
        for state in OrderState::ALL {
            assert_eq!(state.to_string().parse::<OrderState>().unwrap(), state);
        }
        assert_eq!(
            "ON_THE_WAY".parse::<OrderState>().unwrap(),
            OrderState::OnTheWay
        );
        assert!(matches!(
            "shipped".parse::<OrderState>(),
            Err(OrderError::InvalidState(_))
        ));
    }

    #[test]
    fn test_serialization_uses_snake_case() {
        let json = serde_json::to_string(&OrderState::WaitingForShipper).unwrap();
        assert_eq!(json, "\"waiting_for_shipper\"");
        let deserialized: OrderState = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, OrderState::WaitingForShipper);
    }
}
