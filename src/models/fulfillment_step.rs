use serde::Serialize;
use strum::{AsRefStr, EnumString};

/// A side effect claimed at most once per (payment reference, item).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FulfillmentStep {
    Ledger,
    Balance,
    SalesCount,
    Subscription,
    Coupon,
}
