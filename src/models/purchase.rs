use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// What a checkout line item sells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductKind {
    Beat,
    SoundKit,
    Service,
    Plan,
}

impl ProductKind {
    /// Catalog table carrying the `sales_count` for this kind.
    pub fn inventory_table(&self) -> Option<&'static str> {
        match self {
            ProductKind::Beat => Some("beats"),
            ProductKind::SoundKit => Some("sound_kits"),
            ProductKind::Service => Some("services"),
            ProductKind::Plan => None,
        }
    }

    /// Digital goods sold under a usage license and shipped with a contract.
    pub fn is_licensed(&self) -> bool {
        matches!(self, ProductKind::Beat | ProductKind::SoundKit)
    }

    /// Goods owned by a seller who gets paid out for the sale.
    pub fn is_seller_owned(&self) -> bool {
        !matches!(self, ProductKind::Plan)
    }
}

/// Subscription level of a profile.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Premium,
}

impl Tier {
    pub fn rank(&self) -> u8 {
        match self {
            Tier::Free => 0,
            Tier::Pro => 1,
            Tier::Premium => 2,
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, Tier::Free)
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BillingCycle {
    #[default]
    #[strum(to_string = "monthly", serialize = "month")]
    Monthly,
    #[strum(to_string = "yearly", serialize = "year", serialize = "annual")]
    Yearly,
}

/// Plan details of a subscription line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPurchase {
    pub tier: Tier,
    pub cycle: BillingCycle,
    /// Defer the tier change until the current paid period ends.
    pub sequential: bool,
}

/// One purchased product, normalized from the provider's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub kind: ProductKind,
    pub product_id: String,
    pub seller_id: Option<String>,
    pub name: String,
    /// Gross amount charged for this line (minor units).
    pub amount_cents: i64,
    /// Raw license type as sent by the storefront (e.g. "basica").
    pub license_type: Option<String>,
    pub plan: Option<PlanPurchase>,
}

/// An authenticated, completed checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    pub event_id: String,
    pub session_id: String,
    pub payment_intent: Option<String>,
    pub buyer_id: Option<String>,
    pub buyer_email: Option<String>,
    pub amount_total_cents: i64,
    pub currency: String,
    pub payment_method: String,
    pub subscription_id: Option<String>,
    pub coupon_id: Option<String>,
    pub metadata: HashMap<String, String>,
    pub line_items: Vec<LineItem>,
}

impl PurchaseEvent {
    /// Stable reference for the payment: the payment intent when Stripe
    /// created one, the checkout session otherwise (subscriptions, free orders).
    pub fn payment_reference(&self) -> &str {
        self.payment_intent.as_deref().unwrap_or(&self.session_id)
    }
}
