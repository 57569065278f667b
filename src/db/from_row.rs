//! Row mapping trait and helpers for reducing boilerplate in queries.
//!
//! Models implement `FromRow` to describe how they are built from a row
//! selected with the matching `*_COLS` constant.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Same as `parse_enum` for nullable columns.
fn parse_enum_opt<T: std::str::FromStr>(
    row: &Row,
    col: usize,
    col_name: &str,
) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(col)? {
        Some(s) => s.parse::<T>().map(Some).map_err(|_| {
            rusqlite::Error::InvalidColumnType(
                col,
                col_name.to_string(),
                rusqlite::types::Type::Text,
            )
        }),
        None => Ok(None),
    }
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const PROFILE_COLS: &str = "id, email, display_name, balance_cents, subscription_tier, subscription_start, subscription_expiry, stripe_subscription_id, pending_tier, created_at, updated_at";

pub const TRANSACTION_COLS: &str = "id, payment_reference, session_id, buyer_id, seller_id, product_id, line_index, product_kind, product_name, price_cents, currency, payment_status, payment_method, license_type, plan_tier, metadata, coupon_id, created_at";

pub const LICENSE_TEMPLATE_COLS: &str = "id, seller_id, license_type, max_streams, max_copies, max_videos, max_radio_stations, custom_text, include_standard_clauses, created_at";

pub const COUPON_COLS: &str = "id, code, times_used, created_at";

// ============ FromRow Implementations ============

impl FromRow for Profile {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Profile {
            id: row.get(0)?,
            email: row.get(1)?,
            display_name: row.get(2)?,
            balance_cents: row.get(3)?,
            subscription_tier: parse_enum(row, 4, "subscription_tier")?,
            subscription_start: row.get(5)?,
            subscription_expiry: row.get(6)?,
            stripe_subscription_id: row.get(7)?,
            pending_tier: parse_enum_opt(row, 8, "pending_tier")?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

impl FromRow for Transaction {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Transaction {
            id: row.get(0)?,
            payment_reference: row.get(1)?,
            session_id: row.get(2)?,
            buyer_id: row.get(3)?,
            seller_id: row.get(4)?,
            product_id: row.get(5)?,
            line_index: row.get(6)?,
            product_kind: parse_enum(row, 7, "product_kind")?,
            product_name: row.get(8)?,
            price_cents: row.get(9)?,
            currency: row.get(10)?,
            payment_status: row.get(11)?,
            payment_method: row.get(12)?,
            license_type: row.get(13)?,
            plan_tier: parse_enum_opt(row, 14, "plan_tier")?,
            metadata: row.get(15)?,
            coupon_id: row.get(16)?,
            created_at: row.get(17)?,
        })
    }
}

impl FromRow for LicenseTemplate {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(LicenseTemplate {
            id: row.get(0)?,
            seller_id: row.get(1)?,
            license_type: row.get(2)?,
            max_streams: row.get(3)?,
            max_copies: row.get(4)?,
            max_videos: row.get(5)?,
            max_radio_stations: row.get(6)?,
            custom_text: row.get(7)?,
            include_standard_clauses: row.get::<_, i32>(8)? != 0,
            created_at: row.get(9)?,
        })
    }
}

impl FromRow for Coupon {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Coupon {
            id: row.get(0)?,
            code: row.get(1)?,
            times_used: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}
