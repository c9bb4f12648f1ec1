//! Recipient resolution through the user and restaurant services.

use std::sync::Arc;
use std::time::Duration;

use common::{ShipperId, UserId};
use domain::{OrderAggregate, OrderNotification};
use rpc::{DEFAULT_RPC_TIMEOUT, RestaurantRpc, UserInfo, UserRpc, with_timeout};

use crate::{Audience, NotificationError, Result};

/// Finds the user account behind each audience of an order.
#[derive(Clone)]
pub struct RecipientResolver {
    users: Arc<dyn UserRpc>,
    restaurants: Arc<dyn RestaurantRpc>,
    timeout: Duration,
}

impl RecipientResolver {
    pub fn new(users: Arc<dyn UserRpc>, restaurants: Arc<dyn RestaurantRpc>) -> Self {
        Self {
            users,
            restaurants,
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolves the recipient for `audience`.
    ///
    /// Returns `Ok(None)` when the audience has nobody to notify, which only
    /// happens for the shipper of an order without one.
    pub async fn resolve(
        &self,
        audience: Audience,
        order: &OrderAggregate,
        event: &OrderNotification,
    ) -> Result<Option<UserInfo>> {
        let user_id = match audience {
            Audience::Customer => order.order.user_id.clone(),
            Audience::Restaurant => self.restaurant_owner(order).await?,
            Audience::Shipper => match shipper_for(order, event) {
                Some(shipper_id) => UserId::from(shipper_id),
                None => return Ok(None),
            },
        };

        let mut users = with_timeout(
            "user",
            self.timeout,
            self.users.find_by_ids(std::slice::from_ref(&user_id)),
        )
        .await?;

        users
            .remove(&user_id)
            .map(Some)
            .ok_or(NotificationError::RecipientNotFound {
                audience,
                id: user_id.to_string(),
            })
    }

    async fn restaurant_owner(&self, order: &OrderAggregate) -> Result<UserId> {
        let restaurant_id = &order.tracking.restaurant_id;
        let restaurants = with_timeout(
            "restaurant",
            self.timeout,
            self.restaurants
                .find_by_ids(std::slice::from_ref(restaurant_id)),
        )
        .await?;

        restaurants
            .get(restaurant_id)
            .map(|r| r.owner_id.clone())
            .ok_or(NotificationError::RecipientNotFound {
                audience: Audience::Restaurant,
                id: restaurant_id.to_string(),
            })
    }
}

/// The shipper an event concerns. A cancellation clears the order's shipper,
/// so the released shipper travels on the event instead.
fn shipper_for(order: &OrderAggregate, event: &OrderNotification) -> Option<ShipperId> {
    match event {
        OrderNotification::ShipperAssigned { shipper_id } => Some(shipper_id.clone()),
        OrderNotification::Cancelled {
            released_shipper, ..
        } => released_shipper
            .clone()
            .or_else(|| order.order.shipper_id.clone()),
        _ => order.order.shipper_id.clone(),
    }
}
