//! Message templates keyed by audience and event kind.

use domain::{NotificationKind, OrderAggregate, OrderNotification};
use serde::Serialize;

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Customer,
    Restaurant,
    Shipper,
}

impl Audience {
    pub const ALL: [Audience; 3] = [Audience::Customer, Audience::Restaurant, Audience::Shipper];

    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Customer => "customer",
            Audience::Restaurant => "restaurant",
            Audience::Shipper => "shipper",
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Audience {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Audience::ALL
            .into_iter()
            .find(|audience| audience.as_str() == s)
            .ok_or_else(|| format!("unknown audience: {s}"))
    }
}

/// Subject and body ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

struct Template {
    subject: &'static str,
    body: &'static str,
}

const fn template(subject: &'static str, body: &'static str) -> Option<Template> {
    Some(Template { subject, body })
}

/// The template table. `None` means the audience is not told about the event.
fn lookup(audience: Audience, kind: NotificationKind) -> Option<Template> {
    use Audience::*;
    use NotificationKind::*;

    match (audience, kind) {
        (Customer, Created) => template(
            "Order {order_id} received",
            "Hi {name}, we received your order {order_id} totalling {total}. We'll let you know when a shipper picks it up.",
        ),
        (Restaurant, Created) => template(
            "New order {order_id}",
            "Hi {name}, a new order {order_id} totalling {total} is waiting for a shipper.",
        ),
        (Shipper, Created) => None,

        (Customer, StateChanged) => template(
            "Order {order_id} is now {to}",
            "Hi {name}, your order {order_id} moved from {from} to {to}.",
        ),
        (Restaurant, StateChanged) => template(
            "Order {order_id} is now {to}",
            "Hi {name}, order {order_id} moved from {from} to {to}.",
        ),
        (Shipper, StateChanged) => template(
            "Order {order_id} is now {to}",
            "Hi {name}, the order {order_id} you carry moved from {from} to {to}.",
        ),

        (Customer, ShipperAssigned) => template(
            "A shipper picked up order {order_id}",
            "Hi {name}, shipper {shipper_id} is handling your order {order_id}.",
        ),
        (Restaurant, ShipperAssigned) => template(
            "Shipper assigned to order {order_id}",
            "Hi {name}, shipper {shipper_id} will collect order {order_id}.",
        ),
        (Shipper, ShipperAssigned) => template(
            "You were assigned order {order_id}",
            "Hi {name}, please collect order {order_id}. Delivery address: {address}.",
        ),

        (Customer, PaymentStatusChanged) => template(
            "Payment for order {order_id} is {status}",
            "Hi {name}, the payment status of your order {order_id} is now {status}.",
        ),
        (Restaurant, PaymentStatusChanged) => template(
            "Payment for order {order_id} is {status}",
            "Hi {name}, the payment status of order {order_id} is now {status}.",
        ),
        (Shipper, PaymentStatusChanged) => None,

        (Customer, Cancelled) => template(
            "Order {order_id} was cancelled",
            "Hi {name}, your order {order_id} was cancelled: {reason}.",
        ),
        (Restaurant, Cancelled) => template(
            "Order {order_id} was cancelled",
            "Hi {name}, order {order_id} was cancelled: {reason}.",
        ),
        (Shipper, Cancelled) => template(
            "Order {order_id} was cancelled",
            "Hi {name}, you no longer need to deliver order {order_id}: {reason}.",
        ),
    }
}

/// Renders the message for one audience, if the audience is notified.
pub fn render(
    audience: Audience,
    event: &OrderNotification,
    order: &OrderAggregate,
    recipient_name: &str,
) -> Option<RenderedMessage> {
    let template = lookup(audience, event.kind())?;

    let address = &order.tracking.delivery_address;
    let mut values: Vec<(&str, String)> = vec![
        ("order_id", order.id().to_string()),
        ("name", recipient_name.to_string()),
        ("total", order.order.total_price.to_string()),
        ("address", format!("{}, {}", address.street, address.city)),
    ];
    match event {
        OrderNotification::Created => {}
        OrderNotification::StateChanged { from, to } => {
            values.push(("from", from.to_string()));
            values.push(("to", to.to_string()));
        }
        OrderNotification::ShipperAssigned { shipper_id } => {
            values.push(("shipper_id", shipper_id.to_string()));
        }
        OrderNotification::PaymentStatusChanged { status } => {
            values.push(("status", status.to_string()));
        }
        OrderNotification::Cancelled { reason, .. } => {
            values.push(("reason", reason.clone()));
        }
    }

    Some(RenderedMessage {
        subject: fill(template.subject, &values),
        body: fill(template.body, &values),
    })
}

fn fill(text: &str, values: &[(&str, String)]) -> String {
    values
        .iter()
        .fold(text.to_string(), |acc, (key, value)| {
            acc.replace(&format!("{{{key}}}"), value)
        })
}
