//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderError;
use fulfillment::{ErrorKind, FulfillmentError};
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),

    /// The caller did not identify itself.
    #[error("Missing or empty x-user-id header")]
    MissingCaller,

    /// Error raised by the fulfillment services.
    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MissingCaller => StatusCode::UNAUTHORIZED,
            ApiError::Fulfillment(err) => match err.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Dependency => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, source = ?self, "internal server error");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Fulfillment(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use domain::OrderState;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(OrderError::CancellationReasonRequired).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(FulfillmentError::OrderNotFound(OrderId::new("o1"))).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(OrderError::InvalidStateTransition {
                from: OrderState::Delivered,
                to: OrderState::Preparing,
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(FulfillmentError::PaymentCaptureFailed {
                order_id: OrderId::new("o1"),
                reason: "declined".to_string(),
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::MissingCaller.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_internal_errors_hide_the_cause() {
        let response = ApiError::from(FulfillmentError::PaymentCaptureFailed {
            order_id: OrderId::new("o1"),
            reason: "gateway secret detail".to_string(),
        })
        .into_response();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }
}
