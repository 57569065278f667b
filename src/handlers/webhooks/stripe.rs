use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use chrono::Utc;

use crate::db::{AppState, queries};
use crate::error::{FulfillmentError, msg};
use crate::fulfillment::{is_settled, purchase_event_from_session};
use crate::payments::{
    StripeCheckoutSession, StripeLineItem, StripeSubscription, StripeWebhookEvent,
};

use super::WebhookAck;

const PROVIDER: &str = "stripe";

fn extract_signature(headers: &HeaderMap) -> Result<&str, Response> {
    headers
        .get("stripe-signature")
        .ok_or_else(|| {
            WebhookAck::new("rejected")
                .with_message(msg::MISSING_SIGNATURE_HEADER)
                .respond(StatusCode::BAD_REQUEST)
        })?
        .to_str()
        .map_err(|e| {
            tracing::debug!("Invalid UTF-8 in Stripe signature header: {}", e);
            WebhookAck::new("rejected")
                .with_message(msg::INVALID_SIGNATURE_FORMAT)
                .respond(StatusCode::BAD_REQUEST)
        })
}

fn reject(error: &FulfillmentError) -> Response {
    WebhookAck::new("error")
        .with_message(error.to_string())
        .respond(error.status_code())
}

/// `POST /webhook/stripe`
///
/// 2xx acknowledges the delivery (including events we don't act on), 400
/// rejects a delivery that can never succeed, 500 asks Stripe to retry.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = match extract_signature(&headers) {
        Ok(s) => s,
        Err(response) => return response,
    };

    let event = match state.stripe.construct_event(&body, signature) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Stripe webhook rejected: {}", e);
            return reject(&e);
        }
    };

    tracing::debug!(
        "Stripe webhook {} ({}, livemode={})",
        event.id,
        event.event_type,
        event.livemode
    );

    match event.event_type.as_str() {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            handle_checkout_completed(&state, event).await
        }
        "customer.subscription.deleted" => handle_subscription_deleted(&state, event),
        other => {
            tracing::debug!("Ignoring Stripe event type {}", other);
            WebhookAck::new("ignored").respond(StatusCode::OK)
        }
    }
}

async fn handle_checkout_completed(state: &AppState, event: StripeWebhookEvent) -> Response {
    let session: StripeCheckoutSession = match serde_json::from_value(event.data.object) {
        Ok(session) => session,
        Err(e) => {
            let e = FulfillmentError::InvalidPayload(format!("checkout session: {}", e));
            tracing::warn!("Stripe event {}: {}", event.id, e);
            return reject(&e);
        }
    };

    if !is_settled(&session) {
        tracing::info!(
            "Checkout {} not settled yet (payment_status={}), waiting for a later event",
            session.id,
            session.payment_status
        );
        return WebhookAck::new("ignored")
            .with_message(format!("payment_status is {}", session.payment_status))
            .respond(StatusCode::OK);
    }

    let (line_items, fetch_error) = load_line_items(state, &session).await;

    let purchase = match purchase_event_from_session(&event.id, &session, &line_items) {
        Ok(purchase) => purchase,
        // Without line items the session metadata was our only chance; a failed
        // fetch is worth a retry.
        Err(e) => {
            let e = match fetch_error {
                Some(fetch_error) => FulfillmentError::Provider(format!(
                    "line items unavailable ({}), session metadata insufficient: {}",
                    fetch_error, e
                )),
                None => e,
            };
            tracing::error!("Checkout {} could not be interpreted: {}", session.id, e);
            return reject(&e);
        }
    };

    match state.fulfillment.fulfill(&purchase, Utc::now()).await {
        Ok(report) => WebhookAck::new("fulfilled")
            .with_report(report)
            .respond(StatusCode::OK),
        Err(e) => {
            tracing::error!("Fulfillment of checkout {} failed: {}", session.id, e);
            reject(&e)
        }
    }
}

/// Line items embedded in the event, or fetched from the Stripe API.
async fn load_line_items(
    state: &AppState,
    session: &StripeCheckoutSession,
) -> (Vec<StripeLineItem>, Option<String>) {
    if let Some(list) = &session.line_items {
        if !list.has_more && !list.data.is_empty() {
            return (list.data.clone(), None);
        }
    }

    match state.stripe.list_line_items(&session.id).await {
        Ok(items) => (items, None),
        Err(e) => {
            tracing::warn!(
                "Could not fetch line items for checkout {}, falling back to session metadata: {}",
                session.id,
                e
            );
            (Vec::new(), Some(e.to_string()))
        }
    }
}

fn handle_subscription_deleted(state: &AppState, event: StripeWebhookEvent) -> Response {
    let subscription: StripeSubscription = match serde_json::from_value(event.data.object) {
        Ok(subscription) => subscription,
        Err(e) => {
            let e = FulfillmentError::InvalidPayload(format!("subscription: {}", e));
            tracing::warn!("Stripe event {}: {}", event.id, e);
            return reject(&e);
        }
    };

    let result = (|| -> Result<Option<Option<String>>, FulfillmentError> {
        let mut conn = state.db.get()?;
        let tx = conn.transaction()?;
        if !queries::try_record_webhook_event(&tx, PROVIDER, &event.id)? {
            return Ok(None);
        }
        let profile_id = queries::clear_stripe_subscription(&tx, &subscription.id)?;
        tx.commit()?;
        Ok(Some(profile_id))
    })();

    match result {
        Ok(None) => WebhookAck::new("duplicate").respond(StatusCode::OK),
        Ok(Some(Some(profile_id))) => {
            // The paid period runs out on its own; only the link to Stripe goes.
            tracing::info!(
                "Stripe subscription {} ({}) ended for profile {}",
                subscription.id,
                subscription.status,
                profile_id
            );
            WebhookAck::new("ok").respond(StatusCode::OK)
        }
        Ok(Some(None)) => {
            tracing::warn!("No profile linked to Stripe subscription {}", subscription.id);
            WebhookAck::new("ignored")
                .with_message("subscription not linked to any profile")
                .respond(StatusCode::OK)
        }
        Err(e) => {
            tracing::error!("Failed to process subscription deletion {}: {}", subscription.id, e);
            reject(&e)
        }
    }
}
