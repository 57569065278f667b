//! Normalization of Stripe checkout sessions into `PurchaseEvent`s.
//!
//! Storefronts attach product details as metadata under a handful of
//! historical key spellings. All alias handling lives here so the rest of the
//! pipeline only sees canonical `LineItem`s.

use std::collections::HashMap;

use crate::error::FulfillmentError;
use crate::models::{BillingCycle, LineItem, PlanPurchase, ProductKind, PurchaseEvent, Tier};
use crate::payments::{StripeCheckoutSession, StripeLineItem, StripeProductRef};
use crate::util::fold_key;

const KIND_KEYS: &[&str] = &["product_type", "productType", "type", "kind", "item_type"];
const PRODUCT_ID_KEYS: &[&str] = &[
    "product_id", "productId", "beat_id", "beatId", "kit_id", "service_id", "plan_id", "item_id",
];
const SELLER_KEYS: &[&str] = &["seller_id", "sellerId", "producer_id", "producerId", "owner_id"];
const LICENSE_KEYS: &[&str] = &["license_type", "licenseType", "license"];
const TIER_KEYS: &[&str] = &["tier", "plan_tier", "subscription_tier", "plan"];
const CYCLE_KEYS: &[&str] = &["billing_cycle", "billingCycle", "cycle", "interval"];
const SEQUENTIAL_KEYS: &[&str] = &[
    "sequential", "sequential_activation", "sequentialActivation", "defer_activation",
];
const NAME_KEYS: &[&str] = &["product_name", "productName", "name", "title"];
const BUYER_KEYS: &[&str] = &["user_id", "userId", "buyer_id", "buyerId"];
const EMAIL_KEYS: &[&str] = &["email", "buyer_email"];
const COUPON_KEYS: &[&str] = &["coupon_id", "couponId", "coupon"];

/// Payment statuses that mean the money is secured.
const SETTLED_PAYMENT_STATUSES: &[&str] = &["paid", "no_payment_required"];

fn lookup<'a>(meta: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| meta.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(fold_key(value).as_str(), "true" | "1" | "yes" | "si" | "on")
}

fn parse_kind(value: &str) -> Option<ProductKind> {
    let key: String = fold_key(value)
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .collect();
    match key.as_str() {
        "beat" | "beats" | "instrumental" => Some(ProductKind::Beat),
        "soundkit" | "kit" | "drumkit" | "samplepack" => Some(ProductKind::SoundKit),
        "service" | "servicio" | "mixing" | "mastering" => Some(ProductKind::Service),
        "plan" | "subscription" | "membership" | "suscripcion" => Some(ProductKind::Plan),
        _ => None,
    }
}

/// Whether Stripe reports the session's payment as settled.
pub fn is_settled(session: &StripeCheckoutSession) -> bool {
    SETTLED_PAYMENT_STATUSES.contains(&session.payment_status.as_str())
}

/// Metadata layers of a line item, later layers win.
fn merged_metadata(
    session_meta: &HashMap<String, String>,
    item: Option<&StripeLineItem>,
    include_item_identity: bool,
) -> HashMap<String, String> {
    let mut merged: HashMap<String, String> = session_meta
        .iter()
        .filter(|(k, _)| {
            include_item_identity
                || !(PRODUCT_ID_KEYS.contains(&k.as_str()) || NAME_KEYS.contains(&k.as_str()))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    if let Some(price) = item.and_then(|i| i.price.as_ref()) {
        merged.extend(price.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(StripeProductRef::Object(product)) = &price.product {
            merged.extend(product.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
    merged
}

/// Build a canonical line item. `item` is `None` when the checkout carried no
/// line items and the session metadata describes the single product sold.
fn normalize_line_item(
    index: usize,
    session: &StripeCheckoutSession,
    item: Option<&StripeLineItem>,
    single_item: bool,
) -> LineItem {
    let meta = merged_metadata(&session.metadata, item, single_item);
    let price = item.and_then(|i| i.price.as_ref());
    let product = price.and_then(|p| match &p.product {
        Some(StripeProductRef::Object(product)) => Some(product),
        _ => None,
    });

    let license_type = lookup(&meta, LICENSE_KEYS).map(str::to_string);
    let tier_value = lookup(&meta, TIER_KEYS);

    let kind = match lookup(&meta, KIND_KEYS) {
        Some(raw) => parse_kind(raw).unwrap_or_else(|| {
            tracing::warn!(
                "Unknown product type '{}' on session {} item {}, inferring from metadata",
                raw,
                session.id,
                index
            );
            infer_kind(tier_value, license_type.as_deref())
        }),
        None => infer_kind(tier_value, license_type.as_deref()),
    };

    let product_id = lookup(&meta, PRODUCT_ID_KEYS)
        .map(str::to_string)
        .or_else(|| product.map(|p| p.id.clone()))
        .or_else(|| match price.and_then(|p| p.product.as_ref()) {
            Some(StripeProductRef::Id(id)) => Some(id.clone()),
            _ => None,
        })
        .or_else(|| price.map(|p| p.id.clone()))
        .or_else(|| item.map(|i| i.id.clone()))
        .unwrap_or_else(|| format!("{}:{}", session.id, index));

    let name = product
        .and_then(|p| p.name.clone())
        .or_else(|| item.and_then(|i| i.description.clone()))
        .or_else(|| lookup(&meta, NAME_KEYS).map(str::to_string))
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "Item".to_string());

    let amount_cents = match item {
        Some(i) => i
            .amount_total
            .or(i.amount_subtotal)
            .or_else(|| {
                price
                    .and_then(|p| p.unit_amount)
                    .map(|unit| unit * i.quantity.unwrap_or(1))
            })
            .unwrap_or(0),
        None => session.amount_total.unwrap_or(0),
    };

    let plan = if kind == ProductKind::Plan {
        let tier = tier_value.and_then(|t| t.parse::<Tier>().ok());
        if tier.is_none() {
            tracing::warn!(
                "Plan item {} on session {} has no valid tier ({:?})",
                product_id,
                session.id,
                tier_value
            );
        }
        let cycle = lookup(&meta, CYCLE_KEYS)
            .or_else(|| price.and_then(|p| p.recurring.as_ref()).map(|r| r.interval.as_str()))
            .and_then(|c| c.parse::<BillingCycle>().ok())
            .unwrap_or_default();
        let sequential = lookup(&meta, SEQUENTIAL_KEYS).is_some_and(parse_flag);
        tier.map(|tier| PlanPurchase {
            tier,
            cycle,
            sequential,
        })
    } else {
        None
    };

    LineItem {
        kind,
        product_id,
        seller_id: lookup(&meta, SELLER_KEYS).map(str::to_string),
        name,
        amount_cents,
        license_type: if kind.is_licensed() { license_type } else { None },
        plan,
    }
}

/// A tier means a plan, a license means a beat, anything else is a service.
fn infer_kind(tier: Option<&str>, license_type: Option<&str>) -> ProductKind {
    if tier.is_some() {
        ProductKind::Plan
    } else if license_type.is_some() {
        ProductKind::Beat
    } else {
        ProductKind::Service
    }
}

/// Turn a completed checkout session and its line items into a `PurchaseEvent`.
///
/// When `line_items` is empty the session metadata must identify the product
/// (single-product checkout); otherwise the event is rejected as malformed.
pub fn purchase_event_from_session(
    event_id: &str,
    session: &StripeCheckoutSession,
    line_items: &[StripeLineItem],
) -> Result<PurchaseEvent, FulfillmentError> {
    let single_item = line_items.len() <= 1;
    let items: Vec<LineItem> = if line_items.is_empty() {
        if lookup(&session.metadata, PRODUCT_ID_KEYS).is_none() {
            return Err(FulfillmentError::InvalidPayload(format!(
                "checkout session {} has no line items and no product metadata",
                session.id
            )));
        }
        vec![normalize_line_item(0, session, None, true)]
    } else {
        line_items
            .iter()
            .enumerate()
            .map(|(i, item)| normalize_line_item(i, session, Some(item), single_item))
            .collect()
    };

    let buyer_id = session
        .client_reference_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| lookup(&session.metadata, BUYER_KEYS))
        .map(str::to_string);

    let buyer_email = session
        .customer_details
        .as_ref()
        .and_then(|d| d.email.clone())
        .or_else(|| session.customer_email.clone())
        .or_else(|| lookup(&session.metadata, EMAIL_KEYS).map(str::to_string))
        .filter(|e| !e.trim().is_empty());

    let amount_total_cents = session
        .amount_total
        .unwrap_or_else(|| items.iter().map(|i| i.amount_cents).sum());

    Ok(PurchaseEvent {
        event_id: event_id.to_string(),
        session_id: session.id.clone(),
        payment_intent: session.payment_intent.as_ref().map(|p| p.id().to_string()),
        buyer_id,
        buyer_email,
        amount_total_cents,
        currency: session
            .currency
            .clone()
            .unwrap_or_else(|| "usd".to_string())
            .to_lowercase(),
        payment_method: session
            .payment_method_types
            .first()
            .cloned()
            .unwrap_or_else(|| "card".to_string()),
        subscription_id: session.subscription.as_ref().map(|s| s.id().to_string()),
        coupon_id: lookup(&session.metadata, COUPON_KEYS).map(str::to_string),
        metadata: session.metadata.clone(),
        line_items: items,
    })
}
