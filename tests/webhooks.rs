//! Webhook signature verification and HTTP handler tests

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use serde_json::{Value, json};
use tower::ServiceExt;

use beatpay::error::{FulfillmentError, msg};

// ============ Stripe Signature Verification Tests ============

/// Get an old timestamp (for testing timestamp rejection)
fn old_timestamp() -> String {
    // 10 minutes ago - beyond the 5-minute tolerance
    (chrono::Utc::now().timestamp() - 600).to_string()
}

#[test]
fn test_stripe_valid_signature() {
    let client = test_stripe_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let header = signature_header(payload);

    let result = client
        .verify_webhook_signature(payload, &header)
        .expect("Verification should not error");

    assert!(result, "Valid signature should be accepted");
}

#[test]
fn test_stripe_signature_over_raw_bytes() {
    let client = test_stripe_client();
    // Not valid UTF-8: the signature must cover the exact bytes
    let payload: &[u8] = b"{\"name\":\"Canci\xf3n\"}";
    let header = signature_header(payload);

    assert!(client.verify_webhook_signature(payload, &header).unwrap());
}

#[test]
fn test_stripe_modified_payload() {
    let client = test_stripe_client();
    let original = b"{\"type\":\"checkout.session.completed\",\"amount\":50000}";
    let modified = b"{\"type\":\"checkout.session.completed\",\"amount\":50001}";
    let header = signature_header(original);

    let result = client
        .verify_webhook_signature(modified, &header)
        .expect("Verification should not error");

    assert!(!result, "Modified payload should be rejected");
}

const SIGNED_AT: i64 = 1_700_000_000;

fn signed_at(payload: &[u8]) -> String {
    let timestamp = SIGNED_AT.to_string();
    let signature = compute_stripe_signature(payload, WEBHOOK_SECRET, &timestamp);
    format!("t={},v1={}", timestamp, signature)
}

#[test]
fn test_stripe_every_body_byte_is_covered() {
    let client = test_stripe_client();
    let payload = stripe_event(
        "evt_bytes",
        "checkout.session.completed",
        json!({ "id": "cs_1", "amount_total": 50000, "currency": "mxn" }),
    );
    let header = signed_at(&payload);
    assert!(client.verify_webhook_signature_at(&payload, &header, SIGNED_AT).unwrap());

    for i in 0..payload.len() {
        let mut mutated = payload.clone();
        mutated[i] ^= 0x01;
        let result = client.verify_webhook_signature_at(&mutated, &header, SIGNED_AT);
        assert!(
            !matches!(result, Ok(true)),
            "body mutated at byte {} still verified",
            i
        );
    }
}

#[test]
fn test_stripe_every_header_char_is_covered() {
    let client = test_stripe_client();
    let payload = b"{\"id\":\"evt_1\"}";
    let header = signed_at(payload);
    assert!(client.verify_webhook_signature_at(payload, &header, SIGNED_AT).unwrap());

    for (i, c) in header.char_indices() {
        let replacement = if c == '0' { '1' } else { '0' };
        let mut mutated = header.clone();
        mutated.replace_range(i..i + c.len_utf8(), &replacement.to_string());
        let result = client.verify_webhook_signature_at(payload, &mutated, SIGNED_AT);
        assert!(
            !matches!(result, Ok(true)),
            "header mutated at {} ({:?}) still verified",
            i,
            mutated
        );
    }
}

#[test]
fn test_stripe_reserialized_body_fails_verification() {
    let client = test_stripe_client();
    // Spacing as sent on the wire; a JSON round trip compacts it
    let payload: &[u8] = b"{ \"id\": \"evt_spaced\",  \"type\": \"checkout.session.completed\" }";
    let header = signed_at(payload);

    let reserialized =
        serde_json::to_vec(&serde_json::from_slice::<Value>(payload).unwrap()).unwrap();
    assert_ne!(reserialized.as_slice(), payload);

    assert!(client.verify_webhook_signature_at(payload, &header, SIGNED_AT).unwrap());
    assert!(!client.verify_webhook_signature_at(&reserialized, &header, SIGNED_AT).unwrap());
}

#[test]
fn test_stripe_empty_secret_rejects_everything() {
    let client = StripeClient::new(&StripeConfig {
        secret_key: String::new(),
        webhook_secret: String::new(),
    });
    let body = stripe_event("evt_forged", "checkout.session.completed", json!({}));
    let timestamp = current_timestamp();
    let signature = compute_stripe_signature(&body, "", &timestamp);
    let header = format!("t={},v1={}", timestamp, signature);

    assert!(client.verify_webhook_signature(&body, &header).is_err());
    let err = client.construct_event(&body, &header).unwrap_err();
    assert!(matches!(err, FulfillmentError::Authentication(_)));
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

#[test]
fn test_stripe_wrong_secret() {
    let client = test_stripe_client();
    let payload = b"{}";
    let timestamp = current_timestamp();
    let signature = compute_stripe_signature(payload, "whsec_other", &timestamp);
    let header = format!("t={},v1={}", timestamp, signature);

    assert!(!client.verify_webhook_signature(payload, &header).unwrap());
}

#[test]
fn test_stripe_old_timestamp_fails_verification() {
    let client = test_stripe_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let timestamp = old_timestamp();
    let signature = compute_stripe_signature(payload, WEBHOOK_SECRET, &timestamp);
    let header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(payload, &header)
        .expect("Verification should not error");

    assert!(!result, "Old timestamp should be rejected (replay attack prevention)");
}

#[test]
fn test_stripe_fixed_clock_verification() {
    let client = test_stripe_client();
    let payload = b"{}";
    let signature = compute_stripe_signature(payload, WEBHOOK_SECRET, "1700000000");
    let header = format!("t=1700000000,v1={}", signature);

    assert!(client.verify_webhook_signature_at(payload, &header, 1_700_000_100).unwrap());
    assert!(!client.verify_webhook_signature_at(payload, &header, 1_700_000_301).unwrap());
    assert!(!client.verify_webhook_signature_at(payload, &header, 1_699_999_000).unwrap());
}

#[test]
fn test_stripe_any_v1_may_match() {
    let client = test_stripe_client();
    let payload = b"{\"id\":\"evt_1\"}";
    let timestamp = current_timestamp();
    let stale = compute_stripe_signature(payload, "whsec_rotated_out", &timestamp);
    let current = compute_stripe_signature(payload, WEBHOOK_SECRET, &timestamp);
    let header = format!("t={},v1={},v1={}", timestamp, stale, current);

    assert!(client.verify_webhook_signature(payload, &header).unwrap());
}

#[test]
fn test_stripe_malformed_headers_error() {
    let client = test_stripe_client();
    let payload = b"{}";

    assert!(client.verify_webhook_signature(payload, "v1=abc").is_err());
    assert!(client.verify_webhook_signature(payload, "t=123").is_err());
    assert!(client.verify_webhook_signature(payload, "t=notanumber,v1=abc").is_err());
    assert!(client.verify_webhook_signature(payload, "").is_err());
}

#[test]
fn test_construct_event_errors() {
    let client = test_stripe_client();

    let body = stripe_event("evt_1", "checkout.session.completed", json!({}));
    let header = signature_header(b"something else");
    let err = client.construct_event(&body, &header).unwrap_err();
    assert!(matches!(err, FulfillmentError::Authentication(_)));
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

    let garbage = b"not json at all";
    let err = client
        .construct_event(garbage, &signature_header(garbage))
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::InvalidPayload(_)));
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

// ============ HTTP handler ============

async fn post_webhook(app: axum::Router, body: Vec<u8>, signature: Option<String>) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method("POST")
        .uri("/webhook/stripe")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        request = request.header("stripe-signature", signature);
    }

    let response = app
        .oneshot(request.body(Body::from(body)).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn seeded_state() -> AppState {
    let (state, _blobs) = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        seed_beat_sale(&conn);
    }
    state
}

#[tokio::test]
async fn test_missing_signature_header_returns_bad_request() {
    let state = seeded_state();
    let body = stripe_event(
        "evt_nosig",
        "checkout.session.completed",
        beat_checkout_session("cs_nosig", "buyer-1"),
    );

    let (status, json) = post_webhook(test_app(state), body, None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], msg::MISSING_SIGNATURE_HEADER);
}

#[tokio::test]
async fn test_bad_signature_returns_bad_request_and_writes_nothing() {
    let state = seeded_state();
    let body = stripe_event(
        "evt_badsig",
        "checkout.session.completed",
        beat_checkout_session("cs_badsig", "buyer-1"),
    );
    let timestamp = current_timestamp();
    let signature = compute_stripe_signature(&body, "whsec_wrong", &timestamp);

    let (status, _) = post_webhook(
        test_app(state.clone()),
        body,
        Some(format!("t={},v1={}", timestamp, signature)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let conn = state.db.get().unwrap();
    assert_eq!(
        queries::count_transactions_by_payment(&conn, "pi_cs_badsig").unwrap(),
        0
    );
}

#[tokio::test]
async fn test_irrelevant_event_is_acknowledged() {
    let state = seeded_state();
    let body = stripe_event("evt_other", "invoice.created", json!({ "id": "in_1" }));
    let signature = signature_header(&body);

    let (status, json) = post_webhook(test_app(state), body, Some(signature)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ignored");
}

#[tokio::test]
async fn test_unpaid_checkout_is_ignored() {
    let state = seeded_state();
    let mut session = beat_checkout_session("cs_unpaid", "buyer-1");
    session["payment_status"] = json!("unpaid");
    let body = stripe_event("evt_unpaid", "checkout.session.completed", session);
    let signature = signature_header(&body);

    let (status, json) = post_webhook(test_app(state.clone()), body, Some(signature)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ignored");
    let conn = state.db.get().unwrap();
    assert_eq!(
        queries::count_transactions_by_payment(&conn, "pi_cs_unpaid").unwrap(),
        0
    );
}

#[tokio::test]
async fn test_checkout_completed_fulfills_and_replay_is_harmless() {
    let state = seeded_state();
    let body = stripe_event(
        "evt_paid",
        "checkout.session.completed",
        beat_checkout_session("cs_paid", "buyer-1"),
    );

    let (status, json) = post_webhook(
        test_app(state.clone()),
        body.clone(),
        Some(signature_header(&body)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", json);
    assert_eq!(json["status"], "fulfilled");
    assert_eq!(json["report"]["items"][0]["ledger"]["status"], "done");
    assert!(json["report"]["items"][0]["contract_url"].is_string());

    let (status, json) = post_webhook(
        test_app(state.clone()),
        body.clone(),
        Some(signature_header(&body)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["report"]["items"][0]["ledger"]["status"], "already_done");
    assert_eq!(json["report"]["items"][0]["balance"]["status"], "already_done");

    let conn = state.db.get().unwrap();
    assert_eq!(
        queries::count_transactions_by_payment(&conn, "pi_cs_paid").unwrap(),
        1
    );
    let producer = queries::get_profile_by_id(&conn, "producer-1").unwrap().unwrap();
    assert_eq!(producer.balance_cents, 42_564);
}

#[tokio::test]
async fn test_unknown_buyer_asks_for_retry() {
    let state = seeded_state();
    let mut session = beat_checkout_session("cs_ghost", "nobody");
    session["customer_details"] = json!({ "email": "ghost@example.com" });
    let body = stripe_event("evt_ghost", "checkout.session.completed", session);
    let signature = signature_header(&body);

    let (status, _) = post_webhook(test_app(state), body, Some(signature)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_checkout_without_product_information_is_retried() {
    let state = seeded_state();
    let mut session = beat_checkout_session("cs_empty", "buyer-1");
    session["metadata"] = json!({});
    let body = stripe_event("evt_empty", "checkout.session.completed", session);
    let signature = signature_header(&body);

    // Line items could not be fetched (no API key), so Stripe should retry
    let (status, _) = post_webhook(test_app(state), body, Some(signature)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_embedded_line_items_are_used() {
    let state = seeded_state();
    let mut session = beat_checkout_session("cs_embedded", "buyer-1");
    session["metadata"] = json!({ "producerId": "producer-1" });
    session["line_items"] = json!({
        "object": "list",
        "has_more": false,
        "data": [{
            "id": "li_1",
            "description": "Noche Azul",
            "amount_total": 50000,
            "quantity": 1,
            "price": {
                "id": "price_1",
                "unit_amount": 50000,
                "metadata": {},
                "product": {
                    "id": "prod_x",
                    "name": "Noche Azul",
                    "metadata": { "beat_id": "beat-1", "license_type": "Básica" },
                },
            },
        }],
    });
    let body = stripe_event("evt_embedded", "checkout.session.completed", session);
    let signature = signature_header(&body);

    let (status, json) = post_webhook(test_app(state.clone()), body, Some(signature)).await;

    assert_eq!(status, StatusCode::OK, "body: {}", json);
    let conn = state.db.get().unwrap();
    let row = queries::get_transaction(&conn, "pi_cs_embedded", "beat-1", 0)
        .unwrap()
        .expect("ledger row keyed by the metadata product id");
    assert_eq!(row.seller_id.as_deref(), Some("producer-1"));
    assert!(row.contract_url().is_some());
}

#[tokio::test]
async fn test_subscription_deleted_detaches_profile_once() {
    let state = seeded_state();
    {
        let conn = state.db.get().unwrap();
        queries::apply_subscription_change(
            &conn,
            "buyer-1",
            &SubscriptionChange {
                tier: Tier::Pro,
                pending_tier: Some(Tier::Premium),
                start: Some(1_700_000_000),
                expiry: 1_900_000_000,
                stripe_subscription_id: Some("sub_abc".to_string()),
            },
        )
        .unwrap();
    }

    let body = stripe_event(
        "evt_sub_deleted",
        "customer.subscription.deleted",
        json!({ "id": "sub_abc", "object": "subscription", "status": "canceled", "customer": "cus_1" }),
    );

    let (status, json) = post_webhook(
        test_app(state.clone()),
        body.clone(),
        Some(signature_header(&body)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");

    let (status, json) = post_webhook(
        test_app(state.clone()),
        body.clone(),
        Some(signature_header(&body)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "duplicate");

    let conn = state.db.get().unwrap();
    let profile = queries::get_profile_by_id(&conn, "buyer-1").unwrap().unwrap();
    assert_eq!(profile.stripe_subscription_id, None);
    assert_eq!(profile.pending_tier, None);
    // Paid period is left alone
    assert_eq!(profile.subscription_tier, Tier::Pro);
    assert_eq!(profile.subscription_expiry, Some(1_900_000_000));
}
