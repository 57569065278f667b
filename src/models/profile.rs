use serde::{Deserialize, Serialize};

use super::Tier;

/// A marketplace user. Buyers and sellers share the same row: buyers carry the
/// subscription fields, sellers accumulate `balance_cents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub balance_cents: i64,
    pub subscription_tier: Tier,
    pub subscription_start: Option<i64>,
    pub subscription_expiry: Option<i64>,
    pub stripe_subscription_id: Option<String>,
    /// Tier waiting for the current paid period to end.
    pub pending_tier: Option<Tier>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Profile {
    /// Name printed on contracts: display name, then email, then the raw id.
    pub fn legal_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateProfile {
    pub id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Subscription fields written after a plan purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChange {
    pub tier: Tier,
    pub pending_tier: Option<Tier>,
    /// `None` keeps the stored start (pure renewal).
    pub start: Option<i64>,
    pub expiry: i64,
    pub stripe_subscription_id: Option<String>,
}
