use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::models::{ProductKind, Transaction};

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    /// Checkout exists at Stripe but fulfillment has not recorded anything yet.
    Pending,
    Completed,
}

#[derive(Debug, Serialize)]
pub struct OrderItem {
    pub product_id: String,
    pub product_name: String,
    pub kind: ProductKind,
    pub price_cents: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_url: Option<String>,
}

impl From<Transaction> for OrderItem {
    fn from(tx: Transaction) -> Self {
        let contract_url = tx.contract_url();
        Self {
            product_id: tx.product_id,
            product_name: tx.product_name,
            kind: tx.product_kind,
            price_cents: tx.price_cents,
            currency: tx.currency,
            license_type: tx.license_type,
            contract_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub session_id: String,
    pub status: OrderState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    pub items: Vec<OrderItem>,
}

/// Ledger view of a checkout session, keyed by the session id Stripe returns
/// to the success page.
pub async fn get_order_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<OrderStatusResponse>> {
    if session_id.trim().is_empty() {
        return Err(AppError::BadRequest("session id is required".into()));
    }

    let conn = state.db.get()?;
    let rows = queries::list_transactions_by_session(&conn, &session_id)?;

    let Some(first) = rows.first() else {
        return Ok(Json(OrderStatusResponse {
            session_id,
            status: OrderState::Pending,
            order_id: None,
            payment_reference: None,
            items: Vec::new(),
        }));
    };

    let order_id = first.order_id();
    let payment_reference = Some(first.payment_reference.clone());

    Ok(Json(OrderStatusResponse {
        session_id,
        status: OrderState::Completed,
        order_id,
        payment_reference,
        items: rows.into_iter().map(OrderItem::from).collect(),
    }))
}
