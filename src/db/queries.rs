use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    COUPON_COLS, LICENSE_TEMPLATE_COLS, PROFILE_COLS, TRANSACTION_COLS, query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ Profiles ============

pub fn create_profile(conn: &Connection, input: &CreateProfile) -> Result<Profile> {
    let id = input.id.clone().unwrap_or_else(gen_id);
    let now = now();
    conn.execute(
        "INSERT INTO profiles (id, email, display_name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
        params![&id, &input.email, &input.display_name, now],
    )?;
    get_profile_by_id(conn, &id)?
        .ok_or_else(|| AppError::Internal(format!("profile {} vanished after insert", id)))
}

pub fn get_profile_by_id(conn: &Connection, id: &str) -> Result<Option<Profile>> {
    query_one(
        conn,
        &format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLS),
        &[&id],
    )
}

/// Case-insensitive email lookup. The oldest profile wins when an email is shared.
pub fn get_profile_by_email(conn: &Connection, email: &str) -> Result<Option<Profile>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM profiles WHERE email = ?1 COLLATE NOCASE ORDER BY created_at, id LIMIT 1",
            PROFILE_COLS
        ),
        &[&email.trim()],
    )
}

pub fn get_profile_by_stripe_subscription(
    conn: &Connection,
    subscription_id: &str,
) -> Result<Option<Profile>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM profiles WHERE stripe_subscription_id = ?1",
            PROFILE_COLS
        ),
        &[&subscription_id],
    )
}

/// Find the buyer of a checkout: by id first, then by email.
pub fn resolve_buyer(
    conn: &Connection,
    buyer_id: Option<&str>,
    email: Option<&str>,
) -> Result<Option<Profile>> {
    if let Some(id) = buyer_id.filter(|id| !id.is_empty()) {
        if let Some(profile) = get_profile_by_id(conn, id)? {
            return Ok(Some(profile));
        }
    }
    match email.filter(|e| !e.trim().is_empty()) {
        Some(email) => get_profile_by_email(conn, email),
        None => Ok(None),
    }
}

/// Write the outcome of a plan purchase. Returns false when the profile is gone.
pub fn apply_subscription_change(
    conn: &Connection,
    profile_id: &str,
    change: &SubscriptionChange,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE profiles SET
            subscription_tier = ?1,
            pending_tier = ?2,
            subscription_start = COALESCE(?3, subscription_start),
            subscription_expiry = ?4,
            stripe_subscription_id = COALESCE(?5, stripe_subscription_id),
            updated_at = ?6
         WHERE id = ?7",
        params![
            change.tier.as_ref(),
            change.pending_tier.map(|t| t.as_ref().to_string()),
            change.start,
            change.expiry,
            &change.stripe_subscription_id,
            now(),
            profile_id,
        ],
    )?;
    Ok(affected > 0)
}

/// Detach a cancelled Stripe subscription. The paid period is left to run out.
/// Returns the affected profile id, if any.
pub fn clear_stripe_subscription(conn: &Connection, subscription_id: &str) -> Result<Option<String>> {
    let Some(profile) = get_profile_by_stripe_subscription(conn, subscription_id)? else {
        return Ok(None);
    };
    conn.execute(
        "UPDATE profiles SET stripe_subscription_id = NULL, pending_tier = NULL, updated_at = ?1 WHERE id = ?2",
        params![now(), &profile.id],
    )?;
    Ok(Some(profile.id))
}

pub fn increment_seller_balance(conn: &Connection, seller_id: &str, amount_cents: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE profiles SET balance_cents = balance_cents + ?1, updated_at = ?2 WHERE id = ?3",
        params![amount_cents, now(), seller_id],
    )?;
    Ok(affected > 0)
}

// ============ Catalog ============

pub fn create_catalog_item(
    conn: &Connection,
    kind: ProductKind,
    id: &str,
    seller_id: &str,
    title: &str,
) -> Result<()> {
    let table = kind
        .inventory_table()
        .ok_or_else(|| AppError::BadRequest(format!("{} has no catalog table", kind.as_ref())))?;
    conn.execute(
        &format!(
            "INSERT INTO {} (id, seller_id, title, created_at) VALUES (?1, ?2, ?3, ?4)",
            table
        ),
        params![id, seller_id, title, now()],
    )?;
    Ok(())
}

pub fn get_sales_count(conn: &Connection, kind: ProductKind, id: &str) -> Result<Option<i64>> {
    let Some(table) = kind.inventory_table() else {
        return Ok(None);
    };
    let mut stmt = conn.prepare(&format!("SELECT sales_count FROM {} WHERE id = ?1", table))?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

/// Bump `sales_count` on the catalog table of `kind`. Returns false when the
/// product is unknown or the kind has no catalog table.
pub fn increment_sales_count(conn: &Connection, kind: ProductKind, product_id: &str) -> Result<bool> {
    let Some(table) = kind.inventory_table() else {
        return Ok(false);
    };
    let affected = conn.execute(
        &format!("UPDATE {} SET sales_count = sales_count + 1 WHERE id = ?1", table),
        params![product_id],
    )?;
    Ok(affected > 0)
}

// ============ License Templates ============

pub fn create_license_template(
    conn: &Connection,
    seller_id: &str,
    input: &CreateLicenseTemplate,
) -> Result<LicenseTemplate> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO license_templates (id, seller_id, license_type, max_streams, max_copies, max_videos, max_radio_stations, custom_text, include_standard_clauses, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            &id,
            seller_id,
            &input.license_type,
            input.max_streams,
            input.max_copies,
            input.max_videos,
            input.max_radio_stations,
            &input.custom_text,
            input.include_standard_clauses as i32,
            now(),
        ],
    )?;
    query_one(
        conn,
        &format!("SELECT {} FROM license_templates WHERE id = ?1", LICENSE_TEMPLATE_COLS),
        &[&id],
    )?
    .ok_or_else(|| AppError::Internal(format!("license template {} vanished after insert", id)))
}

pub fn get_license_template(
    conn: &Connection,
    seller_id: &str,
    license_type: &str,
) -> Result<Option<LicenseTemplate>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM license_templates WHERE seller_id = ?1 AND license_type = ?2",
            LICENSE_TEMPLATE_COLS
        ),
        &[&seller_id, &license_type],
    )
}

// ============ Coupons ============

pub fn create_coupon(conn: &Connection, code: &str) -> Result<Coupon> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO coupons (id, code, created_at) VALUES (?1, ?2, ?3)",
        params![&id, code, now()],
    )?;
    get_coupon(conn, &id)?
        .ok_or_else(|| AppError::Internal(format!("coupon {} vanished after insert", id)))
}

/// Look a coupon up by id or by code.
pub fn get_coupon(conn: &Connection, id_or_code: &str) -> Result<Option<Coupon>> {
    query_one(
        conn,
        &format!("SELECT {} FROM coupons WHERE id = ?1 OR code = ?1", COUPON_COLS),
        &[&id_or_code],
    )
}

pub fn increment_coupon_usage(conn: &Connection, id_or_code: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE coupons SET times_used = times_used + 1 WHERE id = ?1 OR code = ?1",
        params![id_or_code],
    )?;
    Ok(affected > 0)
}

// ============ Ledger ============

pub fn insert_transaction(conn: &Connection, input: &CreateTransaction) -> Result<Transaction> {
    let id = gen_id();
    let metadata = serde_json::to_string(&input.metadata)?;
    conn.execute(
        "INSERT INTO transactions (id, payment_reference, session_id, buyer_id, seller_id, product_id, line_index, product_kind, product_name, price_cents, currency, payment_status, payment_method, license_type, plan_tier, metadata, coupon_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'completed', ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            &id,
            &input.payment_reference,
            &input.session_id,
            &input.buyer_id,
            &input.seller_id,
            &input.product_id,
            input.line_index,
            input.product_kind.as_ref(),
            &input.product_name,
            input.price_cents,
            &input.currency,
            &input.payment_method,
            &input.license_type,
            input.plan_tier.map(|t| t.as_ref().to_string()),
            &metadata,
            &input.coupon_id,
            now(),
        ],
    )?;
    query_one(
        conn,
        &format!("SELECT {} FROM transactions WHERE id = ?1", TRANSACTION_COLS),
        &[&id],
    )?
    .ok_or_else(|| AppError::Internal(format!("transaction {} vanished after insert", id)))
}

/// Ledger row of one line item of a payment.
pub fn get_transaction(
    conn: &Connection,
    payment_reference: &str,
    product_id: &str,
    line_index: i64,
) -> Result<Option<Transaction>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM transactions WHERE payment_reference = ?1 AND product_id = ?2 AND line_index = ?3",
            TRANSACTION_COLS
        ),
        &[&payment_reference, &product_id, &line_index],
    )
}

/// Ledger rows of a checkout, in line item order.
pub fn list_transactions_by_session(conn: &Connection, session_id: &str) -> Result<Vec<Transaction>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM transactions WHERE session_id = ?1
             ORDER BY line_index, created_at",
            TRANSACTION_COLS
        ),
        &[&session_id],
    )
}

pub fn count_transactions_by_payment(conn: &Connection, payment_reference: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM transactions WHERE payment_reference = ?1",
        params![payment_reference],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

// ============ Fulfillment Steps ============

/// Claim a side effect for a payment, returning true if it was not claimed yet.
///
/// Must run inside the same SQLite transaction as the side effect itself so a
/// failed write releases the claim on rollback.
pub fn try_claim_step(
    conn: &Connection,
    payment_reference: &str,
    item_key: &str,
    step: FulfillmentStep,
) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO fulfillment_steps (payment_reference, item_key, step, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![payment_reference, item_key, step.as_ref(), now()],
    )?;
    Ok(affected > 0)
}

pub fn is_step_claimed(
    conn: &Connection,
    payment_reference: &str,
    item_key: &str,
    step: FulfillmentStep,
) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM fulfillment_steps WHERE payment_reference = ?1 AND item_key = ?2 AND step = ?3",
        params![payment_reference, item_key, step.as_ref()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Forget claims older than the retention period. Only safe once the provider
/// has stopped retrying those payments.
pub fn purge_old_fulfillment_steps(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM fulfillment_steps WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

// ============ Webhook Event Deduplication ============

/// Atomically record a webhook event, returning true if this is a new event.
/// Returns false if the event was already processed (replay attack prevention).
pub fn try_record_webhook_event(conn: &Connection, provider: &str, event_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO webhook_events (provider, event_id, created_at) VALUES (?1, ?2, ?3)",
        params![provider, event_id, now()],
    )?;
    Ok(affected > 0)
}

/// Purge old webhook events beyond the retention period.
/// Stripe retries for about three days, so a week of history is plenty.
pub fn purge_old_webhook_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM webhook_events WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
