use chrono::{DateTime, Utc};
use common::{RestaurantId, ShipperId, UserId};
use domain::{Order, OrderAggregate, OrderState, OrderTracking, SagaStatus};

use crate::{Result, StoreError};

/// Default page size for order listings.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest page a single listing returns.
pub const MAX_PAGE_SIZE: usize = 100;

/// Builder for constructing order list queries.
///
/// Deleted orders are excluded unless `include_deleted` is set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderQuery {
    /// Filter by owning user.
    pub user_id: Option<UserId>,

    /// Filter by restaurant.
    pub restaurant_id: Option<RestaurantId>,

    /// Filter by assigned shipper.
    pub shipper_id: Option<ShipperId>,

    /// Filter by tracking state.
    pub state: Option<OrderState>,

    /// Filter by saga status (any of these).
    pub saga_statuses: Option<Vec<SagaStatus>>,

    /// Filter to orders created strictly before this timestamp.
    pub created_before: Option<DateTime<Utc>>,

    /// Include soft-deleted orders.
    pub include_deleted: bool,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn restaurant_id(mut self, restaurant_id: RestaurantId) -> Self {
        self.restaurant_id = Some(restaurant_id);
        self
    }

    pub fn shipper_id(mut self, shipper_id: ShipperId) -> Self {
        self.shipper_id = Some(shipper_id);
        self
    }

    pub fn state(mut self, state: OrderState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn saga_statuses(mut self, statuses: Vec<SagaStatus>) -> Self {
        self.saga_statuses = Some(statuses);
        self
    }

    pub fn created_before(mut self, timestamp: DateTime<Utc>) -> Self {
        self.created_before = Some(timestamp);
        self
    }

    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Page size with the default applied, capped at [`MAX_PAGE_SIZE`].
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)
    }

    /// Limit and offset as SQL integers.
    pub fn page_bounds(&self) -> Result<(i64, i64)> {
        let limit = i64::try_from(self.effective_limit())
            .map_err(|_| StoreError::InvalidQuery("limit out of range".to_string()))?;
        let offset = i64::try_from(self.offset.unwrap_or(0))
            .map_err(|_| StoreError::InvalidQuery("offset out of range".to_string()))?;
        Ok((limit, offset))
    }

    /// Returns true if the aggregate passes every filter (pagination aside).
    pub fn matches(&self, aggregate: &OrderAggregate) -> bool {
        let order = &aggregate.order;
        let tracking = &aggregate.tracking;

        if !self.include_deleted && aggregate.is_deleted() {
            return false;
        }
        if self.user_id.as_ref().is_some_and(|id| *id != order.user_id) {
            return false;
        }
        if self
            .restaurant_id
            .as_ref()
            .is_some_and(|id| *id != tracking.restaurant_id)
        {
            return false;
        }
        if self
            .shipper_id
            .as_ref()
            .is_some_and(|id| order.shipper_id.as_ref() != Some(id))
        {
            return false;
        }
        if self.state.is_some_and(|state| state != tracking.state) {
            return false;
        }
        if self
            .saga_statuses
            .as_ref()
            .is_some_and(|statuses| !statuses.contains(&order.saga_status))
        {
            return false;
        }
        if self
            .created_before
            .is_some_and(|before| order.audit.created_at >= before)
        {
            return false;
        }
        true
    }
}

/// One page of a listing, newest first, with the unpaginated match count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub trackings: Vec<OrderTracking>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{FoodId, OrderId};
    use domain::{DeliveryAddress, FoodSnapshot, Money, NewOrder, OrderLine, PaymentMethod};

    fn aggregate() -> OrderAggregate {
        OrderAggregate::create(
            NewOrder {
                order_id: OrderId::new("order-1"),
                user_id: UserId::new("user-1"),
                restaurant_id: RestaurantId::new("rest-1"),
                payment_method: PaymentMethod::Cash,
                card_id: None,
                delivery_address: DeliveryAddress::new("1 Main St", "Hanoi"),
                delivery_fee: Money::zero(),
                lines: vec![OrderLine::new(
                    FoodSnapshot {
                        food_id: FoodId::new("food-1"),
                        name: "Pho".to_string(),
                        description: "Beef noodle soup".to_string(),
                        image: None,
                    },
                    Money::from_cents(500),
                    1,
                )],
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn empty_query_matches_active_orders() {
        assert!(OrderQuery::new().matches(&aggregate()));
    }

    #[test]
    fn deleted_orders_excluded_by_default() {
        let mut deleted = aggregate();
        deleted.order.status = domain::RecordStatus::Deleted;

        assert!(!OrderQuery::new().matches(&deleted));
        assert!(OrderQuery::new().include_deleted().matches(&deleted));
    }

    #[test]
    fn filters_by_owner_restaurant_and_state() {
        let order = aggregate();

        assert!(OrderQuery::new().user_id(UserId::new("user-1")).matches(&order));
        assert!(!OrderQuery::new().user_id(UserId::new("user-2")).matches(&order));
        assert!(
            !OrderQuery::new()
                .restaurant_id(RestaurantId::new("rest-2"))
                .matches(&order)
        );
        assert!(
            OrderQuery::new()
                .state(OrderState::WaitingForShipper)
                .matches(&order)
        );
        assert!(!OrderQuery::new().state(OrderState::Preparing).matches(&order));
        assert!(!OrderQuery::new().shipper_id(ShipperId::new("S1")).matches(&order));
    }

    #[test]
    fn filters_by_saga_status_and_age() {
        let order = aggregate();
        let created_at = order.order.audit.created_at;

        assert!(
            OrderQuery::new()
                .saga_statuses(vec![SagaStatus::PaymentPending, SagaStatus::PaymentFailed])
                .matches(&order)
        );
        assert!(
            !OrderQuery::new()
                .saga_statuses(vec![SagaStatus::Confirmed])
                .matches(&order)
        );
        assert!(
            OrderQuery::new()
                .created_before(created_at + Duration::seconds(1))
                .matches(&order)
        );
        assert!(!OrderQuery::new().created_before(created_at).matches(&order));
    }

    #[test]
    fn query_builder_chain() {
        let query = OrderQuery::new()
            .user_id(UserId::new("user-1"))
            .state(OrderState::Preparing)
            .limit(10)
            .offset(20);

        assert_eq!(query.user_id, Some(UserId::new("user-1")));
        assert_eq!(query.state, Some(OrderState::Preparing));
        assert_eq!(query.effective_limit(), 10);
        assert_eq!(query.offset, Some(20));
        assert_eq!(OrderQuery::new().effective_limit(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn page_size_is_capped() {
        let query = OrderQuery::new().limit(usize::MAX);
        assert_eq!(query.effective_limit(), MAX_PAGE_SIZE);
        assert_eq!(query.page_bounds().unwrap(), (MAX_PAGE_SIZE as i64, 0));
    }

    #[test]
    fn offset_beyond_sql_range_rejected() {
        let query = OrderQuery::new().offset(usize::MAX);
        assert!(matches!(
            query.page_bounds(),
            Err(StoreError::InvalidQuery(_))
        ));
        assert_eq!(
            OrderQuery::new().offset(40).page_bounds().unwrap(),
            (DEFAULT_PAGE_SIZE as i64, 40)
        );
    }
}
