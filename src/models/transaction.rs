use serde::{Deserialize, Serialize};

use super::{ProductKind, Tier};

/// Ledger row: one per purchased line item. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    /// Payment intent id, or the checkout session id when Stripe created none.
    pub payment_reference: String,
    pub session_id: String,
    pub buyer_id: String,
    pub seller_id: Option<String>,
    pub product_id: String,
    /// Position of the line item inside the checkout.
    pub line_index: i64,
    pub product_kind: ProductKind,
    pub product_name: String,
    // Amounts (cents)
    pub price_cents: i64,
    pub currency: String,
    /// Always "completed": only paid checkouts reach the ledger.
    pub payment_status: String,
    pub payment_method: String,
    /// Raw license type of a beat or sound kit sale.
    pub license_type: Option<String>,
    /// Tier bought by a plan sale.
    pub plan_tier: Option<Tier>,
    /// JSON-encoded `TransactionMetadata`.
    pub metadata: Option<String>,
    pub coupon_id: Option<String>,
    pub created_at: i64,
}

impl Transaction {
    pub fn parsed_metadata(&self) -> Option<TransactionMetadata> {
        self.metadata
            .as_deref()
            .and_then(|m| serde_json::from_str(m).ok())
    }

    pub fn contract_url(&self) -> Option<String> {
        self.parsed_metadata().and_then(|m| m.contract_url)
    }

    pub fn order_id(&self) -> Option<String> {
        self.parsed_metadata().map(|m| m.order_id)
    }
}

/// Structured part of the ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub order_id: String,
    /// Position of the line item inside the checkout.
    pub line_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_kind: Option<String>,
}

/// Data required to create a new ledger row
#[derive(Debug, Clone)]
pub struct CreateTransaction {
    pub payment_reference: String,
    pub session_id: String,
    pub buyer_id: String,
    pub seller_id: Option<String>,
    pub product_id: String,
    pub line_index: i64,
    pub product_kind: ProductKind,
    pub product_name: String,
    pub price_cents: i64,
    pub currency: String,
    pub payment_method: String,
    pub license_type: Option<String>,
    pub plan_tier: Option<Tier>,
    pub metadata: TransactionMetadata,
    pub coupon_id: Option<String>,
}
