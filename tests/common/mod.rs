//! Test utilities and fixtures for Beatpay integration tests

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use serde_json::{Value, json};

pub use beatpay::config::StripeConfig;
pub use beatpay::db::{AppState, DbPool, init_db, queries};
pub use beatpay::fulfillment::{Fulfillment, FulfillmentSettings, StepOutcome};
pub use beatpay::models::*;
pub use beatpay::payments::StripeClient;
pub use beatpay::storage::{BlobStore, MemoryBlobStore, StorageError};

pub const WEBHOOK_SECRET: &str = "whsec_test123secret456";
pub const BLOB_BASE_URL: &str = "https://cdn.beatpay.test/contracts";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Pool over a single in-memory connection. Every `memory()` connection is its
/// own database, so the pool must never open a second one.
pub fn create_test_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }
    pool
}

pub fn test_stripe_client() -> StripeClient {
    // No secret key: line items can only come from the event itself, and no
    // test ever reaches the network.
    StripeClient::new(&StripeConfig {
        secret_key: String::new(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
    })
}

pub fn create_test_fulfillment(db: DbPool, blobs: Arc<dyn BlobStore>) -> Fulfillment {
    Fulfillment::new(db, blobs, Arc::new(FulfillmentSettings::default()))
}

pub fn create_test_app_state() -> (AppState, Arc<MemoryBlobStore>) {
    let db = create_test_pool();
    let blobs = Arc::new(MemoryBlobStore::new(BLOB_BASE_URL));
    let state = AppState {
        db: db.clone(),
        stripe: test_stripe_client(),
        fulfillment: create_test_fulfillment(db, blobs.clone()),
        contract_files: Some(blobs.clone()),
    };
    (state, blobs)
}

pub fn test_app(state: AppState) -> Router {
    beatpay::handlers::router().with_state(state)
}

/// Blob store that refuses every upload.
pub struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn put(&self, path: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<String, StorageError> {
        Err(StorageError::Upload {
            path: path.to_string(),
            message: "bucket unavailable".to_string(),
        })
    }
}

// ============ Fixtures ============

pub fn create_test_profile(conn: &Connection, id: &str, email: &str, name: &str) -> Profile {
    queries::create_profile(
        conn,
        &CreateProfile {
            id: Some(id.to_string()),
            email: Some(email.to_string()),
            display_name: Some(name.to_string()),
        },
    )
    .expect("Failed to create test profile")
}

/// Producer, buyer and one beat owned by the producer.
pub fn seed_beat_sale(conn: &Connection) {
    create_test_profile(conn, "producer-1", "producer@example.com", "DJ Tester");
    create_test_profile(conn, "buyer-1", "buyer@example.com", "Ana Compradora");
    queries::create_catalog_item(conn, ProductKind::Beat, "beat-1", "producer-1", "Noche Azul")
        .expect("Failed to create test beat");
}

pub fn beat_line_item(product_id: &str, license: Option<&str>, cents: i64) -> LineItem {
    LineItem {
        kind: ProductKind::Beat,
        product_id: product_id.to_string(),
        seller_id: Some("producer-1".to_string()),
        name: "Noche Azul".to_string(),
        amount_cents: cents,
        license_type: license.map(str::to_string),
        plan: None,
    }
}

pub fn plan_line_item(tier: Tier, cycle: BillingCycle, sequential: bool) -> LineItem {
    LineItem {
        kind: ProductKind::Plan,
        product_id: format!("plan-{}", tier.as_ref()),
        seller_id: None,
        name: format!("{} plan", tier.as_ref()),
        amount_cents: 14_900,
        license_type: None,
        plan: Some(PlanPurchase {
            tier,
            cycle,
            sequential,
        }),
    }
}

pub fn purchase_event(payment_intent: &str, items: Vec<LineItem>) -> PurchaseEvent {
    PurchaseEvent {
        event_id: format!("evt_{}", payment_intent),
        session_id: format!("cs_{}", payment_intent),
        payment_intent: Some(payment_intent.to_string()),
        buyer_id: Some("buyer-1".to_string()),
        buyer_email: Some("buyer@example.com".to_string()),
        amount_total_cents: items.iter().map(|i| i.amount_cents).sum(),
        currency: "mxn".to_string(),
        payment_method: "card".to_string(),
        subscription_id: None,
        coupon_id: None,
        metadata: Default::default(),
        line_items: items,
    }
}

// ============ Stripe payloads ============

pub fn compute_stripe_signature(payload: &[u8], secret: &str, timestamp: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Current Unix timestamp as a string (for webhook signature tests)
pub fn current_timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}

pub fn signature_header(payload: &[u8]) -> String {
    let timestamp = current_timestamp();
    let signature = compute_stripe_signature(payload, WEBHOOK_SECRET, &timestamp);
    format!("t={},v1={}", timestamp, signature)
}

pub fn stripe_event(event_id: &str, event_type: &str, object: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": event_id,
        "object": "event",
        "type": event_type,
        "livemode": false,
        "data": { "object": object },
    }))
    .unwrap()
}

/// Completed checkout of one beat described only by session metadata.
pub fn beat_checkout_session(session_id: &str, buyer_id: &str) -> Value {
    json!({
        "id": session_id,
        "object": "checkout.session",
        "mode": "payment",
        "payment_status": "paid",
        "payment_intent": format!("pi_{}", session_id),
        "client_reference_id": buyer_id,
        "customer_details": { "email": "buyer@example.com", "name": "Ana" },
        "amount_total": 50000,
        "currency": "mxn",
        "payment_method_types": ["card"],
        "metadata": {
            "productType": "beat",
            "beatId": "beat-1",
            "producerId": "producer-1",
            "licenseType": "basica",
            "productName": "Noche Azul",
        },
    })
}
