//! Fan-out of one order event to every interested audience.

use std::sync::Arc;

use domain::{OrderAggregate, OrderNotification};
use metrics::counter;
use tracing::{debug, warn};

use crate::{
    Audience, NotificationChannel, NotificationError, RecipientResolver, Result, render,
};

/// Outcome of fanning out one event.
#[derive(Debug, Clone, Default)]
pub struct FanoutReport {
    pub delivered: Vec<Audience>,
    /// Audiences with no template for the event or nobody to notify.
    pub skipped: Vec<Audience>,
    pub failed: Vec<(Audience, NotificationError)>,
}

impl FanoutReport {
    /// True when no audience failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Joins the failure messages into one line.
    pub fn failure_summary(&self) -> String {
        self.failed
            .iter()
            .map(|(audience, error)| format!("{audience}: {error}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Sends audience-tailored messages for order events.
#[derive(Clone)]
pub struct NotificationFanout {
    channel: Arc<dyn NotificationChannel>,
    resolver: RecipientResolver,
}

impl NotificationFanout {
    pub fn new(channel: Arc<dyn NotificationChannel>, resolver: RecipientResolver) -> Self {
        Self { channel, resolver }
    }

    /// Notifies every audience about `event`.
    ///
    /// Audiences are handled independently: a failed lookup or send for one
    /// never prevents the others.
    pub async fn notify(&self, order: &OrderAggregate, event: &OrderNotification) -> FanoutReport {
        self.notify_remaining(order, event, &[]).await
    }

    /// Like [`notify`](Self::notify), leaving out audiences in `reached`.
    /// They appear in neither list of the report.
    #[tracing::instrument(skip(self, order, event), fields(order_id = %order.id(), kind = %event.kind()))]
    pub async fn notify_remaining(
        &self,
        order: &OrderAggregate,
        event: &OrderNotification,
        reached: &[Audience],
    ) -> FanoutReport {
        let mut report = FanoutReport::default();

        for audience in Audience::ALL {
            if reached.contains(&audience) {
                continue;
            }
            match self.notify_audience(audience, order, event).await {
                Ok(true) => {
                    counter!("notifications_sent_total", "audience" => audience.as_str())
                        .increment(1);
                    report.delivered.push(audience);
                }
                Ok(false) => report.skipped.push(audience),
                Err(error) => {
                    warn!(%audience, error = %error, "Notification failed");
                    counter!("notifications_failed_total", "audience" => audience.as_str())
                        .increment(1);
                    report.failed.push((audience, error));
                }
            }
        }

        report
    }

    async fn notify_audience(
        &self,
        audience: Audience,
        order: &OrderAggregate,
        event: &OrderNotification,
    ) -> Result<bool> {
        // Skip before any lookup when the table has no entry.
        if render(audience, event, order, "").is_none() {
            return Ok(false);
        }

        let Some(recipient) = self.resolver.resolve(audience, order, event).await? else {
            debug!(%audience, "No recipient to notify");
            return Ok(false);
        };

        let Some(message) = render(audience, event, order, &recipient.full_name()) else {
            return Ok(false);
        };

        self.channel
            .send(&recipient.email, &message.subject, &message.body)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryChannel, SmsChannel};
    use chrono::Utc;
    use common::{FoodId, OrderId, RestaurantId, ShipperId, UserId};
    use domain::{DeliveryAddress, FoodSnapshot, Money, NewOrder, OrderLine, PaymentMethod};
    use rpc::{
        InMemoryRestaurantRpc, InMemoryUserRpc, RestaurantInfo, RestaurantStatus, UserInfo,
        UserRole,
    };

    fn setup(channel: Arc<dyn NotificationChannel>) -> (NotificationFanout, OrderAggregate) {
        let users = InMemoryUserRpc::new();
        for (id, role) in [
            ("customer", UserRole::User),
            ("owner", UserRole::RestaurantOwner),
            ("S1", UserRole::Shipper),
        ] {
            users.add_user(UserInfo {
                id: UserId::new(id),
                email: format!("{id}@example.com"),
                first_name: id.to_string(),
                last_name: String::new(),
                role,
            });
        }
        let restaurants = InMemoryRestaurantRpc::new();
        restaurants.add_restaurant(RestaurantInfo {
            id: RestaurantId::new("rest-1"),
            name: "Quan Ngon".to_string(),
            status: RestaurantStatus::Active,
            shipping_fee_per_km: Money::zero(),
            owner_id: UserId::new("owner"),
        });

        let order = OrderAggregate::create(
            NewOrder {
                order_id: OrderId::new("order-1"),
                user_id: UserId::new("customer"),
                restaurant_id: RestaurantId::new("rest-1"),
                payment_method: PaymentMethod::Cash,
                card_id: None,
                delivery_address: DeliveryAddress::new("1 Main St", "Hanoi"),
                delivery_fee: Money::zero(),
                lines: vec![OrderLine::new(
                    FoodSnapshot {
                        food_id: FoodId::new("f1"),
                        name: "Pho".to_string(),
                        description: "Noodles".to_string(),
                        image: None,
                    },
                    Money::from_cents(500),
                    1,
                )],
            },
            Utc::now(),
        )
        .unwrap();

        let resolver = RecipientResolver::new(Arc::new(users), Arc::new(restaurants));
        (NotificationFanout::new(channel, resolver), order)
    }

    #[tokio::test]
    async fn test_created_skips_shipper() {
        let channel = InMemoryChannel::new();
        let (fanout, order) = setup(Arc::new(channel.clone()));

        let report = fanout.notify(&order, &OrderNotification::Created).await;

        assert!(report.is_complete());
        assert_eq!(
            report.delivered,
            vec![Audience::Customer, Audience::Restaurant]
        );
        assert_eq!(report.skipped, vec![Audience::Shipper]);
        assert_eq!(channel.sent_count(), 2);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let channel = InMemoryChannel::new();
        channel.fail_for("owner@example.com");
        let (fanout, mut order) = setup(Arc::new(channel.clone()));
        order.order.shipper_id = Some(ShipperId::new("S1"));

        let report = fanout
            .notify(
                &order,
                &OrderNotification::ShipperAssigned {
                    shipper_id: ShipperId::new("S1"),
                },
            )
            .await;

        assert!(!report.is_complete());
        assert_eq!(report.delivered, vec![Audience::Customer, Audience::Shipper]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, Audience::Restaurant);
        assert!(report.failure_summary().starts_with("restaurant:"));
        assert_eq!(channel.sent_to("S1@example.com").len(), 1);
    }

    #[tokio::test]
    async fn test_reached_audiences_are_not_notified_again() {
        let channel = InMemoryChannel::new();
        let (fanout, order) = setup(Arc::new(channel.clone()));

        let report = fanout
            .notify_remaining(&order, &OrderNotification::Created, &[Audience::Customer])
            .await;

        assert!(report.is_complete());
        assert_eq!(report.delivered, vec![Audience::Restaurant]);
        assert!(channel.sent_to("customer@example.com").is_empty());
        assert_eq!(channel.sent_to("owner@example.com").len(), 1);
        assert_eq!("shipper".parse::<Audience>(), Ok(Audience::Shipper));
    }

    #[tokio::test]
    async fn test_unsupported_channel_reports_failures() {
        let (fanout, order) = setup(Arc::new(SmsChannel));

        let report = fanout.notify(&order, &OrderNotification::Created).await;
        assert_eq!(report.failed.len(), 2);
        assert!(matches!(
            report.failed[0].1,
            NotificationError::UnsupportedChannel(_)
        ));
    }
}
