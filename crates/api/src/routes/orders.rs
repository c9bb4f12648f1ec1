//! Order creation, lifecycle and query endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};
use common::{CardId, CartId, OrderId, RestaurantId, ShipperId, UserId};
use domain::{
    DeliveryAddress, Order, OrderAggregate, OrderState, OrderTracking, PaymentMethod,
    PaymentStatus, TransitionRequest,
};
use fulfillment::{CreateOrderRequest, FulfillmentCore};
use order_store::{MAX_PAGE_SIZE, OrderQuery, OrderStore};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Header carrying the id of the calling user.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub fulfillment: FulfillmentCore<S>,
}

/// Id of the calling user, taken from the `x-user-id` header.
#[derive(Debug, Clone)]
pub struct Caller(pub UserId);

impl<St: Send + Sync> FromRequestParts<St> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Caller(UserId::new(value)))
            .ok_or(ApiError::MissingCaller)
    }
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderBody {
    pub cart_id: String,
    pub delivery_address: DeliveryAddress,
    pub payment_method: Option<String>,
    pub card_id: Option<String>,
}

#[derive(Deserialize)]
pub struct TransitionBody {
    pub state: String,
    pub shipper_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub payment_status: Option<String>,
}

#[derive(Deserialize)]
pub struct PaymentStatusBody {
    pub payment_status: String,
}

#[derive(Deserialize, Default)]
pub struct ListParams {
    pub user_id: Option<String>,
    pub restaurant_id: Option<String>,
    pub shipper_id: Option<String>,
    pub state: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: String,
}

#[derive(Serialize)]
pub struct OrderSummaryResponse {
    pub id: String,
    pub user_id: String,
    pub restaurant_id: String,
    pub shipper_id: Option<String>,
    pub state: String,
    pub payment_status: String,
    pub saga_status: String,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderSummaryResponse>,
    pub total: u64,
}

#[derive(Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub summary: OrderSummaryResponse,
    pub payment_method: String,
    pub card_id: Option<String>,
    pub delivery_address: DeliveryAddress,
    pub delivery_fee_cents: i64,
    pub cancellation_reason: Option<String>,
    pub estimated_delivery_minutes: Option<i64>,
    pub actual_delivery_minutes: Option<i64>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub food_id: String,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub unit_price_cents: i64,
    pub quantity: u32,
    pub discount_cents: i64,
}

impl OrderSummaryResponse {
    fn new(order: &Order, tracking: &OrderTracking) -> Self {
        Self {
            id: order.id.to_string(),
            user_id: order.user_id.to_string(),
            restaurant_id: tracking.restaurant_id.to_string(),
            shipper_id: order.shipper_id.as_ref().map(ToString::to_string),
            state: tracking.state.to_string(),
            payment_status: tracking.payment_status.to_string(),
            saga_status: order.saga_status.to_string(),
            total_cents: order.total_price.cents(),
            created_at: order.audit.created_at,
        }
    }
}

impl From<&OrderAggregate> for OrderResponse {
    fn from(aggregate: &OrderAggregate) -> Self {
        let order = &aggregate.order;
        let tracking = &aggregate.tracking;
        Self {
            summary: OrderSummaryResponse::new(order, tracking),
            payment_method: tracking.payment_method.to_string(),
            card_id: tracking.card_id.as_ref().map(ToString::to_string),
            delivery_address: tracking.delivery_address.clone(),
            delivery_fee_cents: tracking.delivery_fee.cents(),
            cancellation_reason: tracking.cancellation_reason.clone(),
            estimated_delivery_minutes: tracking.estimated_delivery_minutes,
            actual_delivery_minutes: tracking.actual_delivery_minutes,
            version: order.version.as_i64(),
            updated_at: order.audit.updated_at,
            items: aggregate
                .details
                .iter()
                .map(|detail| OrderItemResponse {
                    food_id: detail.food.food_id.to_string(),
                    name: detail.food.name.clone(),
                    description: detail.food.description.clone(),
                    image: detail.food.image.clone(),
                    unit_price_cents: detail.unit_price.cents(),
                    quantity: detail.quantity,
                    discount_cents: detail.discount.cents(),
                })
                .collect(),
        }
    }
}

// -- Handlers --

/// POST /orders — create an order from the caller's cart.
#[tracing::instrument(skip(state, body), fields(user_id = %caller.0))]
pub async fn create<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(body): Json<CreateOrderBody>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let payment_method = body
        .payment_method
        .as_deref()
        .map(str::parse::<PaymentMethod>)
        .transpose()?;

    let order_id = state
        .fulfillment
        .saga
        .execute(CreateOrderRequest {
            user_id: caller.0,
            cart_id: CartId::new(body.cart_id),
            delivery_address: body.delivery_address,
            payment_method,
            card_id: body.card_id.map(CardId::new),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order_id: order_id.to_string(),
        }),
    ))
}

/// GET /orders — list orders, newest first.
#[tracing::instrument(skip(state, params))]
pub async fn list<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<OrderListResponse>, ApiError> {
    let query = list_query(params)?;
    let page = state.fulfillment.lifecycle.list(query).await?;

    let trackings: HashMap<&OrderId, &OrderTracking> = page
        .trackings
        .iter()
        .map(|tracking| (&tracking.order_id, tracking))
        .collect();
    let orders = page
        .orders
        .iter()
        .filter_map(|order| {
            trackings
                .get(&order.id)
                .map(|tracking| OrderSummaryResponse::new(order, tracking))
        })
        .collect();

    Ok(Json(OrderListResponse {
        orders,
        total: page.total,
    }))
}

/// GET /orders/{id} — load one order with its lines.
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.fulfillment.lifecycle.get(&OrderId::new(id)).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// PATCH /orders/{id}/state — move an order to another state.
#[tracing::instrument(skip(state, body), fields(user_id = %caller.0, to = %body.state))]
pub async fn transition<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    caller: Caller,
    Json(body): Json<TransitionBody>,
) -> Result<Json<OrderResponse>, ApiError> {
    let mut request = TransitionRequest::to(body.state.parse::<OrderState>()?);
    if let Some(shipper_id) = body.shipper_id {
        request = request.with_shipper(ShipperId::new(shipper_id));
    }
    if let Some(reason) = body.cancellation_reason {
        request = request.with_reason(reason);
    }
    if let Some(status) = body.payment_status {
        request = request.with_payment_status(status.parse::<PaymentStatus>()?);
    }

    let order = state
        .fulfillment
        .lifecycle
        .transition(&OrderId::new(id), request, &caller.0)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// PATCH /orders/{id}/payment-status — override the payment status.
#[tracing::instrument(skip(state, body), fields(user_id = %caller.0))]
pub async fn update_payment_status<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    caller: Caller,
    Json(body): Json<PaymentStatusBody>,
) -> Result<Json<OrderResponse>, ApiError> {
    let status = body.payment_status.parse::<PaymentStatus>()?;
    let order = state
        .fulfillment
        .lifecycle
        .update_payment_status(&OrderId::new(id), status, &caller.0)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// DELETE /orders/{id} — soft-delete an order that has not left the restaurant.
#[tracing::instrument(skip(state), fields(user_id = %caller.0))]
pub async fn delete<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    caller: Caller,
) -> Result<StatusCode, ApiError> {
    state
        .fulfillment
        .lifecycle
        .delete(&OrderId::new(id), &caller.0)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn list_query(params: ListParams) -> Result<OrderQuery, ApiError> {
    let mut query = OrderQuery::new();
    if let Some(user_id) = params.user_id {
        query = query.user_id(UserId::new(user_id));
    }
    if let Some(restaurant_id) = params.restaurant_id {
        query = query.restaurant_id(RestaurantId::new(restaurant_id));
    }
    if let Some(shipper_id) = params.shipper_id {
        query = query.shipper_id(ShipperId::new(shipper_id));
    }
    if let Some(state) = params.state {
        query = query.state(state.parse::<OrderState>()?);
    }
    if let Some(limit) = params.limit {
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(ApiError::BadRequest(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        query = query.limit(limit);
    }
    if let Some(offset) = params.offset {
        if i64::try_from(offset).is_err() {
            return Err(ApiError::BadRequest("offset out of range".to_string()));
        }
        query = query.offset(offset);
    }
    Ok(query)
}
