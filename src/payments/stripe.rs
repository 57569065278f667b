use std::collections::HashMap;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::StripeConfig;
use crate::error::{AppError, FulfillmentError, Result, msg};

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: Client::new(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    /// Stripe recommends 300 seconds (5 minutes).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    /// Clock skew tolerated for timestamps from the future.
    const WEBHOOK_FUTURE_SKEW_SECS: i64 = 60;

    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        self.verify_webhook_signature_at(payload, signature, chrono::Utc::now().timestamp())
    }

    /// Verify a `stripe-signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`)
    /// against the raw request body as of `now`.
    ///
    /// Returns `Ok(false)` for a well-formed header that does not match, and an
    /// error for a malformed one. Any `v1` entry may match, which keeps
    /// deliveries valid while the endpoint secret is being rolled.
    pub fn verify_webhook_signature_at(
        &self,
        payload: &[u8],
        signature: &str,
        now: i64,
    ) -> Result<bool> {
        // An empty key would make every forged signature verifiable.
        if self.webhook_secret.is_empty() {
            return Err(AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()));
        }

        let mut timestamp = None;
        let mut candidates = Vec::new();

        for part in signature.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                candidates.push(s);
            }
        }

        let timestamp_str =
            timestamp.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;
        if candidates.is_empty() {
            return Err(AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()));
        }

        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::BadRequest(msg::INVALID_TIMESTAMP_IN_SIGNATURE.into()))?;

        let age = now - timestamp;
        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }
        if age < -Self::WEBHOOK_FUTURE_SKEW_SECS {
            tracing::warn!("Stripe webhook rejected: timestamp in the future (age={}s)", age);
            return Ok(false);
        }

        // Signed payload is "{t}.{raw body}", byte for byte.
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
        mac.update(timestamp_str.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());
        let expected_bytes = expected.as_bytes();

        // Length is not secret (always 64 hex chars), only the content is.
        let matched = candidates.iter().fold(false, |found, candidate| {
            let provided = candidate.as_bytes();
            let equal = provided.len() == expected_bytes.len()
                && bool::from(expected_bytes.ct_eq(provided));
            found | equal
        });

        Ok(matched)
    }

    /// Authenticate and parse a webhook delivery.
    pub fn construct_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> std::result::Result<StripeWebhookEvent, FulfillmentError> {
        match self.verify_webhook_signature(payload, signature) {
            Ok(true) => {}
            Ok(false) => {
                return Err(FulfillmentError::Authentication(msg::SIGNATURE_MISMATCH.into()));
            }
            Err(e) => return Err(FulfillmentError::Authentication(e.to_string())),
        }

        serde_json::from_slice(payload)
            .map_err(|e| FulfillmentError::InvalidPayload(format!("event envelope: {}", e)))
    }

    /// Fetch every line item of a checkout session, with price and product expanded.
    pub async fn list_line_items(&self, session_id: &str) -> Result<Vec<StripeLineItem>> {
        if self.secret_key.is_empty() {
            return Err(AppError::Internal(
                "Stripe secret key not configured, cannot fetch line items".into(),
            ));
        }

        let url = format!(
            "{}/v1/checkout/sessions/{}/line_items",
            STRIPE_API_BASE, session_id
        );
        let mut items = Vec::new();
        let mut starting_after: Option<String> = None;

        loop {
            let page: StripeList<StripeLineItem> = {
                let mut query: Vec<(&str, &str)> =
                    vec![("limit", "100"), ("expand[]", "data.price.product")];
                if let Some(ref cursor) = starting_after {
                    query.push(("starting_after", cursor.as_str()));
                }

                let response = self
                    .client
                    .get(&url)
                    .basic_auth(&self.secret_key, None::<&str>)
                    .query(&query)
                    .send()
                    .await
                    .map_err(|e| AppError::Internal(format!("Stripe API error: {}", e)))?;

                if !response.status().is_success() {
                    let error_text = response.text().await.unwrap_or_default();
                    return Err(AppError::Internal(format!("Stripe API error: {}", error_text)));
                }

                response.json().await.map_err(|e| {
                    AppError::Internal(format!("Failed to parse Stripe response: {}", e))
                })?
            };

            starting_after = page.data.last().map(|item| item.id.clone());
            items.extend(page.data);

            if !page.has_more || starting_after.is_none() {
                break;
            }
        }

        Ok(items)
    }
}

/// Generic Stripe webhook event - object is parsed based on event_type
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
    #[serde(default)]
    pub livemode: bool,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// A field Stripe sends either as an id or as the expanded object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StripeRef {
    Id(String),
    Object { id: String },
}

impl StripeRef {
    pub fn id(&self) -> &str {
        match self {
            StripeRef::Id(id) => id,
            StripeRef::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeList<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

// ============ checkout.session.completed ============

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub mode: Option<String>, // "payment" or "subscription"
    pub payment_status: String,
    pub payment_intent: Option<StripeRef>,
    pub client_reference_id: Option<String>,
    pub customer: Option<StripeRef>,
    pub customer_email: Option<String>,
    pub customer_details: Option<StripeCustomerDetails>,
    pub subscription: Option<StripeRef>, // Present for subscription mode
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub payment_method_types: Vec<String>,
    /// Only present when the event was sent with line items expanded.
    pub line_items: Option<StripeList<StripeLineItem>>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCustomerDetails {
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeLineItem {
    pub id: String,
    pub description: Option<String>,
    pub amount_total: Option<i64>,
    pub amount_subtotal: Option<i64>,
    pub quantity: Option<i64>,
    pub price: Option<StripePrice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePrice {
    pub id: String,
    pub unit_amount: Option<i64>,
    pub recurring: Option<StripeRecurring>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub product: Option<StripeProductRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeRecurring {
    pub interval: String, // "month" or "year"
}

/// `price.product` is an id unless the request expanded it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StripeProductRef {
    Id(String),
    Object(StripeProduct),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeProduct {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

// ============ customer.subscription.deleted ============

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: Option<StripeRef>,
    pub status: String, // "active", "canceled", etc.
}
