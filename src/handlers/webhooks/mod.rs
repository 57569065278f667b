pub mod stripe;

pub use stripe::handle_stripe_webhook;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Serialize;

use crate::db::AppState;
use crate::fulfillment::FulfillmentReport;

/// Body returned to the payment provider. Only the status code matters to
/// Stripe; the body shows up in its dashboard when debugging deliveries.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<FulfillmentReport>,
}

impl WebhookAck {
    pub fn new(status: &'static str) -> Self {
        Self {
            status,
            message: None,
            report: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_report(mut self, report: FulfillmentReport) -> Self {
        self.report = Some(report);
        self
    }

    pub fn respond(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook/stripe", post(handle_stripe_webhook))
}
