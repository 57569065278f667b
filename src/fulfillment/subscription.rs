use chrono::{DateTime, Duration, Months, Utc};

use crate::models::{BillingCycle, PlanPurchase, Profile, SubscriptionChange, Tier};

/// Monthly list price per paid tier, used to convert leftover time on an
/// upgrade. A tier without a price never carries days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPricing {
    pub pro_monthly_cents: Option<i64>,
    pub premium_monthly_cents: Option<i64>,
}

impl Default for TierPricing {
    fn default() -> Self {
        Self {
            pro_monthly_cents: Some(14_900),
            premium_monthly_cents: Some(29_900),
        }
    }
}

impl TierPricing {
    pub fn monthly_cents(&self, tier: Tier) -> Option<i64> {
        match tier {
            Tier::Free => None,
            Tier::Pro => self.pro_monthly_cents,
            Tier::Premium => self.premium_monthly_cents,
        }
        .filter(|p| *p > 0)
    }
}

/// Subscription state of a profile as the reconciler sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentSubscription {
    pub tier: Tier,
    pub expiry: Option<DateTime<Utc>>,
}

impl CurrentSubscription {
    pub fn free() -> Self {
        Self {
            tier: Tier::Free,
            expiry: None,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.tier.is_paid() && self.expiry.is_some_and(|e| e > now)
    }
}

impl From<&Profile> for CurrentSubscription {
    fn from(profile: &Profile) -> Self {
        Self {
            tier: profile.subscription_tier,
            expiry: profile
                .subscription_expiry
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// Tier in effect after the purchase.
    pub tier: Tier,
    /// Tier that takes over once `expiry` passes (deferred activation).
    pub pending_tier: Option<Tier>,
    pub expiry: DateTime<Utc>,
    /// Days converted from the unused part of the previous tier.
    pub carried_days: i64,
    /// The subscription restarts now (new or changed tier).
    pub restarts: bool,
}

impl Reconciliation {
    pub fn into_change(
        self,
        now: DateTime<Utc>,
        stripe_subscription_id: Option<String>,
    ) -> SubscriptionChange {
        SubscriptionChange {
            tier: self.tier,
            pending_tier: self.pending_tier,
            start: self.restarts.then(|| now.timestamp()),
            expiry: self.expiry.timestamp(),
            stripe_subscription_id,
        }
    }
}

fn add_cycle(base: DateTime<Utc>, cycle: BillingCycle) -> DateTime<Utc> {
    let (months, fallback_days) = match cycle {
        BillingCycle::Monthly => (1, 30),
        BillingCycle::Yearly => (12, 365),
    };
    base.checked_add_months(Months::new(months))
        .unwrap_or_else(|| base + Duration::days(fallback_days))
}

/// Compute the subscription period that results from buying `purchase` on top
/// of `current` at `now`.
///
/// - free or lapsed: the new period starts now;
/// - same tier while active: the period is extended from the current expiry;
/// - upgrade while active: starts now, plus the remaining whole days converted
///   at the monthly price ratio of the two tiers (floored);
/// - downgrade or unpriced change while active: starts now, nothing carried.
///
/// A tier change while active is applied immediately unless the purchase asks
/// for sequential activation, in which case the current tier is kept and the
/// new one recorded as pending.
pub fn reconcile(
    current: CurrentSubscription,
    purchase: &PlanPurchase,
    now: DateTime<Utc>,
    pricing: &TierPricing,
) -> Reconciliation {
    let target = purchase.tier;

    if !current.is_active(now) {
        return Reconciliation {
            tier: target,
            pending_tier: None,
            expiry: add_cycle(now, purchase.cycle),
            carried_days: 0,
            restarts: true,
        };
    }

    // is_active guarantees an expiry in the future
    let current_expiry = current.expiry.unwrap_or(now);

    if current.tier == target {
        return Reconciliation {
            tier: target,
            pending_tier: None,
            expiry: add_cycle(current_expiry, purchase.cycle),
            carried_days: 0,
            restarts: false,
        };
    }

    let carried_days = if target.rank() > current.tier.rank() {
        match (pricing.monthly_cents(current.tier), pricing.monthly_cents(target)) {
            (Some(old_price), Some(new_price)) => {
                let remaining_days = (current_expiry - now).num_days().max(0);
                remaining_days * old_price / new_price
            }
            _ => 0,
        }
    } else {
        0
    };

    let expiry = add_cycle(now, purchase.cycle) + Duration::days(carried_days);

    if purchase.sequential {
        Reconciliation {
            tier: current.tier,
            pending_tier: Some(target),
            expiry,
            carried_days,
            restarts: false,
        }
    } else {
        Reconciliation {
            tier: target,
            pending_tier: None,
            expiry,
            carried_days,
            restarts: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn plan(tier: Tier, cycle: BillingCycle, sequential: bool) -> PlanPurchase {
        PlanPurchase {
            tier,
            cycle,
            sequential,
        }
    }

    #[test]
    fn yearly_from_free() {
        let now = at(2026, 3, 10);
        let r = reconcile(
            CurrentSubscription::free(),
            &plan(Tier::Premium, BillingCycle::Yearly, false),
            now,
            &TierPricing::default(),
        );
        assert_eq!(r.expiry, at(2027, 3, 10));
        assert!(r.restarts);
    }

    #[test]
    fn month_end_is_clamped() {
        let now = at(2026, 1, 31);
        let r = reconcile(
            CurrentSubscription::free(),
            &plan(Tier::Pro, BillingCycle::Monthly, false),
            now,
            &TierPricing::default(),
        );
        assert_eq!(r.expiry, at(2026, 2, 28));
    }

    #[test]
    fn unpriced_upgrade_carries_nothing() {
        let now = at(2026, 5, 1);
        let pricing = TierPricing {
            pro_monthly_cents: None,
            premium_monthly_cents: Some(29_900),
        };
        let current = CurrentSubscription {
            tier: Tier::Pro,
            expiry: Some(at(2026, 5, 21)),
        };
        let r = reconcile(current, &plan(Tier::Premium, BillingCycle::Monthly, false), now, &pricing);
        assert_eq!(r.carried_days, 0);
        assert_eq!(r.expiry, at(2026, 6, 1));
    }

    #[test]
    fn partial_days_are_floored() {
        let now = at(2026, 5, 1);
        let current = CurrentSubscription {
            tier: Tier::Pro,
            // 10 days and 11 hours left
            expiry: Some(at(2026, 5, 11) + Duration::hours(11)),
        };
        let r = reconcile(
            current,
            &plan(Tier::Premium, BillingCycle::Monthly, false),
            now,
            &TierPricing::default(),
        );
        // floor(10 * 14900 / 29900) = 4
        assert_eq!(r.carried_days, 4);
    }
}
