//! Idempotent side effects.
//!
//! Every effect runs in a SQLite transaction that first claims
//! `(payment_reference, item_key, step)` in `fulfillment_steps`. A claimed step
//! is never run again; a failed effect rolls its claim back so re-delivery
//! retries it.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::error::FulfillmentError;
use crate::models::{CreateTransaction, FulfillmentStep, LineItem, PlanPurchase};

use super::StepOutcome;
use super::payout::{FeeModel, compute_payout};
use super::subscription::{CurrentSubscription, TierPricing, reconcile};

/// Item key of event-level steps (the coupon).
pub const EVENT_ITEM_KEY: &str = "*";

/// Item key of a line item's steps: `{product_id}#{line_index}`. The same
/// product may appear on several lines of one checkout.
pub fn item_key(product_id: &str, line_index: usize) -> String {
    format!("{}#{}", product_id, line_index)
}

pub(crate) fn run_step<F>(
    conn: &mut Connection,
    payment_reference: &str,
    item_key: &str,
    step: FulfillmentStep,
    behavior: TransactionBehavior,
    effect: F,
) -> StepOutcome
where
    F: FnOnce(&Connection) -> Result<(), FulfillmentError>,
{
    let result = (|| -> Result<bool, FulfillmentError> {
        let tx = conn.transaction_with_behavior(behavior)?;
        if !queries::try_claim_step(&tx, payment_reference, item_key, step)? {
            return Ok(false);
        }
        effect(&*tx)?;
        tx.commit()?;
        Ok(true)
    })();

    match result {
        Ok(true) => StepOutcome::Done,
        Ok(false) => {
            tracing::debug!(
                "Step {} already applied for payment {} item {}",
                step.as_ref(),
                payment_reference,
                item_key
            );
            StepOutcome::AlreadyDone
        }
        Err(e) => {
            tracing::error!(
                "Step {} failed for payment {} item {}: {}",
                step.as_ref(),
                payment_reference,
                item_key,
                e
            );
            StepOutcome::Failed(e.to_string())
        }
    }
}

pub(crate) fn write_ledger(
    conn: &mut Connection,
    item_key: &str,
    input: &CreateTransaction,
) -> StepOutcome {
    run_step(
        conn,
        &input.payment_reference,
        item_key,
        FulfillmentStep::Ledger,
        TransactionBehavior::Deferred,
        |tx| {
            queries::insert_transaction(tx, input)?;
            Ok(())
        },
    )
}

pub(crate) fn credit_seller(
    conn: &mut Connection,
    payment_reference: &str,
    item_key: &str,
    item: &LineItem,
    fee_model: &FeeModel,
) -> StepOutcome {
    let Some(seller_id) = item.seller_id.as_deref() else {
        return StepOutcome::Skipped;
    };
    let payout = compute_payout(item.amount_cents, fee_model);

    let outcome = run_step(
        conn,
        payment_reference,
        item_key,
        FulfillmentStep::Balance,
        TransactionBehavior::Deferred,
        |tx| {
            if queries::increment_seller_balance(tx, seller_id, payout.net_cents)? {
                Ok(())
            } else {
                Err(FulfillmentError::Persistence(format!(
                    "seller profile {} not found",
                    seller_id
                )))
            }
        },
    );
    if outcome == StepOutcome::Done {
        tracing::info!(
            "Credited seller {} with {} cents for {} (gross {}, fee {}, commission {})",
            seller_id,
            payout.net_cents,
            item.product_id,
            payout.gross_cents,
            payout.processor_fee_cents,
            payout.commission_cents
        );
    }
    outcome
}

pub(crate) fn count_sale(
    conn: &mut Connection,
    payment_reference: &str,
    item_key: &str,
    item: &LineItem,
) -> StepOutcome {
    if item.kind.inventory_table().is_none() {
        return StepOutcome::Skipped;
    }
    run_step(
        conn,
        payment_reference,
        item_key,
        FulfillmentStep::SalesCount,
        TransactionBehavior::Deferred,
        |tx| {
            if queries::increment_sales_count(tx, item.kind, &item.product_id)? {
                Ok(())
            } else {
                Err(FulfillmentError::Persistence(format!(
                    "{} {} not found in catalog",
                    item.kind.as_ref(),
                    item.product_id
                )))
            }
        },
    )
}

/// Apply a plan purchase to the buyer's profile. Read-modify-write, so the
/// transaction takes the write lock up front.
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_plan(
    conn: &mut Connection,
    payment_reference: &str,
    item_key: &str,
    buyer_id: &str,
    plan: &PlanPurchase,
    stripe_subscription_id: Option<&str>,
    pricing: &TierPricing,
    now: DateTime<Utc>,
) -> StepOutcome {
    run_step(
        conn,
        payment_reference,
        item_key,
        FulfillmentStep::Subscription,
        TransactionBehavior::Immediate,
        |tx| {
            let profile = queries::get_profile_by_id(tx, buyer_id)?.ok_or_else(|| {
                FulfillmentError::Persistence(format!("buyer profile {} not found", buyer_id))
            })?;

            let current = CurrentSubscription::from(&profile);
            let result = reconcile(current, plan, now, pricing);
            tracing::info!(
                "Subscription for {}: {} -> {} (pending {:?}), expiry {}, carried {} days",
                buyer_id,
                profile.subscription_tier.as_ref(),
                result.tier.as_ref(),
                result.pending_tier,
                result.expiry,
                result.carried_days
            );

            let change = result.into_change(now, stripe_subscription_id.map(str::to_string));
            if queries::apply_subscription_change(tx, buyer_id, &change)? {
                Ok(())
            } else {
                Err(FulfillmentError::Persistence(format!(
                    "buyer profile {} vanished during update",
                    buyer_id
                )))
            }
        },
    )
}

pub(crate) fn redeem_coupon(
    conn: &mut Connection,
    payment_reference: &str,
    coupon_id: &str,
) -> StepOutcome {
    run_step(
        conn,
        payment_reference,
        EVENT_ITEM_KEY,
        FulfillmentStep::Coupon,
        TransactionBehavior::Deferred,
        |tx| {
            if queries::increment_coupon_usage(tx, coupon_id)? {
                Ok(())
            } else {
                Err(FulfillmentError::Persistence(format!(
                    "coupon {} not found",
                    coupon_id
                )))
            }
        },
    )
}

