//! Integration tests for the API server.

use std::sync::OnceLock;

use api::demo::DemoServices;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use fulfillment::FulfillmentSettings;
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::InMemoryOrderStore;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> axum::Router {
    let services = DemoServices::seeded();
    let state = api::create_state(
        InMemoryOrderStore::new(),
        services.collaborators("orders@test.local"),
        FulfillmentSettings::default(),
    );
    api::create_app(state, get_metrics_handle())
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn json_request(method: &str, uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn create_body(method: &str) -> Value {
    json!({
        "cart_id": "cart-1",
        "delivery_address": {
            "street": "13 Lo Duc",
            "district": "Hai Ba Trung",
            "city": "Hanoi",
            "distance_km": 2.0
        },
        "payment_method": method,
        "card_id": "card-1"
    })
}

async fn create_order(app: &axum::Router) -> String {
    let (status, json) = send(
        app,
        json_request("POST", "/orders", Some("user-1"), create_body("cash")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["order_id"].as_str().unwrap().to_string()
}

async fn patch_state(app: &axum::Router, order_id: &str, body: Value) -> (StatusCode, Value) {
    send(
        app,
        json_request(
            "PATCH",
            &format!("/orders/{order_id}/state"),
            Some("admin"),
            body,
        ),
    )
    .await
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();
    let (status, json) = send(&app, get_request("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["store"], "up");
}

#[tokio::test]
async fn test_create_and_get_order() {
    let app = setup();
    let order_id = create_order(&app).await;

    let (status, json) = send(&app, get_request(&format!("/orders/{order_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], order_id.as_str());
    assert_eq!(json["user_id"], "user-1");
    assert_eq!(json["state"], "waiting_for_shipper");
    assert_eq!(json["payment_status"], "pending");
    assert_eq!(json["payment_method"], "cash");
    assert_eq!(json["saga_status"], "confirmed");
    assert_eq!(json["total_cents"], 2 * 650 + 2 * 100);
    assert_eq!(json["delivery_fee_cents"], 100);
    assert_eq!(json["card_id"], Value::Null);
    assert_eq!(json["items"].as_array().unwrap().len(), 2);
    assert_eq!(json["delivery_address"]["city"], "Hanoi");
}

#[tokio::test]
async fn test_create_requires_caller() {
    let app = setup();
    let (status, json) = send(
        &app,
        json_request("POST", "/orders", None, create_body("cash")),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].as_str().unwrap().contains("x-user-id"));
}

#[tokio::test]
async fn test_create_rejects_bad_input() {
    let app = setup();

    let (status, _) = send(
        &app,
        json_request("POST", "/orders", Some("user-1"), create_body("bitcoin")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(
        &app,
        json_request("POST", "/orders", Some("user-2"), create_body("cash")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/orders",
            Some("user-1"),
            json!({
                "cart_id": "cart-404",
                "delivery_address": { "street": "1 Main St", "city": "Hanoi" },
                "payment_method": "cash"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_card_order_is_paid() {
    let app = setup();
    let (status, json) = send(
        &app,
        json_request("POST", "/orders", Some("user-1"), create_body("credit_card")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    let order_id = json["order_id"].as_str().unwrap();

    let (_, json) = send(&app, get_request(&format!("/orders/{order_id}"))).await;
    assert_eq!(json["payment_status"], "paid");
    assert_eq!(json["card_id"], "card-1");
}

#[tokio::test]
async fn test_full_lifecycle_through_http() {
    let app = setup();
    let order_id = create_order(&app).await;

    let (status, json) = patch_state(
        &app,
        &order_id,
        json!({ "state": "preparing", "shipper_id": "shipper-1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["state"], "preparing");
    assert_eq!(json["shipper_id"], "shipper-1");

    let (status, json) = patch_state(&app, &order_id, json!({ "state": "on_the_way" })).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["estimated_delivery_minutes"], 30);

    let (status, json) = patch_state(&app, &order_id, json!({ "state": "delivered" })).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["state"], "delivered");
    assert_eq!(json["payment_status"], "paid");

    let (status, _) = patch_state(
        &app,
        &order_id,
        json!({ "state": "cancel", "cancellation_reason": "too late" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_transition_errors() {
    let app = setup();
    let order_id = create_order(&app).await;

    let (status, _) = patch_state(&app, &order_id, json!({ "state": "delivered" })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, json) = patch_state(&app, &order_id, json!({ "state": "cancel" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("reason"));

    let (status, _) = patch_state(&app, &order_id, json!({ "state": "teleported" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = patch_state(&app, "missing", json!({ "state": "preparing" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payment_status_override_and_cancel() {
    let app = setup();
    let order_id = create_order(&app).await;

    let (status, json) = send(
        &app,
        json_request(
            "PATCH",
            &format!("/orders/{order_id}/payment-status"),
            Some("admin"),
            json!({ "payment_status": "PAID" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["payment_status"], "paid");

    let (status, json) = patch_state(
        &app,
        &order_id,
        json!({ "state": "cancel", "cancellation_reason": "out of stock" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["payment_status"], "pending");
    assert_eq!(json["cancellation_reason"], "out of stock");
}

#[tokio::test]
async fn test_delete_and_list() {
    let app = setup();
    let order_id = create_order(&app).await;

    let (status, json) = send(&app, get_request("/orders?user_id=user-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert_eq!(json["orders"][0]["id"], order_id.as_str());

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/orders/{order_id}"))
        .header("x-user-id", "admin")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get_request(&format!("/orders/{order_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, json) = send(&app, get_request("/orders?user_id=user-1")).await;
    assert_eq!(json["total"], 0);

    let (status, _) = send(&app, get_request("/orders?state=nowhere")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_rejects_out_of_range_paging() {
    let app = setup();
    create_order(&app).await;

    let (status, json) = send(&app, get_request("/orders?limit=18446744073709551615")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("limit"));

    let (status, _) = send(&app, get_request("/orders?offset=18446744073709551615")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(&app, get_request("/orders?limit=100")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    create_order(&app).await;

    let response = app.oneshot(get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("order_saga_executions_total"));
}
