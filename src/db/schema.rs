use rusqlite::Connection;

/// Initialize the database schema
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Profiles (buyers and sellers share one row)
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            email TEXT,
            display_name TEXT,
            balance_cents INTEGER NOT NULL DEFAULT 0,
            subscription_tier TEXT NOT NULL DEFAULT 'free' CHECK (subscription_tier IN ('free', 'pro', 'premium')),
            subscription_start INTEGER,
            subscription_expiry INTEGER,
            stripe_subscription_id TEXT,
            pending_tier TEXT CHECK (pending_tier IS NULL OR pending_tier IN ('free', 'pro', 'premium')),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_profiles_email ON profiles(email COLLATE NOCASE);
        CREATE INDEX IF NOT EXISTS idx_profiles_stripe_subscription ON profiles(stripe_subscription_id);

        -- Catalog (only the columns this service touches)
        CREATE TABLE IF NOT EXISTS beats (
            id TEXT PRIMARY KEY,
            seller_id TEXT NOT NULL,
            title TEXT NOT NULL,
            sales_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_beats_seller ON beats(seller_id);

        CREATE TABLE IF NOT EXISTS sound_kits (
            id TEXT PRIMARY KEY,
            seller_id TEXT NOT NULL,
            title TEXT NOT NULL,
            sales_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sound_kits_seller ON sound_kits(seller_id);

        CREATE TABLE IF NOT EXISTS services (
            id TEXT PRIMARY KEY,
            seller_id TEXT NOT NULL,
            title TEXT NOT NULL,
            sales_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_services_seller ON services(seller_id);

        -- Seller overrides of the platform license terms (NULL cap = unlimited)
        CREATE TABLE IF NOT EXISTS license_templates (
            id TEXT PRIMARY KEY,
            seller_id TEXT NOT NULL,
            license_type TEXT NOT NULL CHECK (license_type IN ('basic', 'premium', 'unlimited', 'exclusive', 'soundkit')),
            max_streams INTEGER,
            max_copies INTEGER,
            max_videos INTEGER,
            max_radio_stations INTEGER,
            custom_text TEXT,
            include_standard_clauses INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            UNIQUE(seller_id, license_type)
        );

        CREATE TABLE IF NOT EXISTS coupons (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            times_used INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );

        -- Ledger (write-once, one row per purchased line item; a checkout may
        -- repeat a product, so the line position is part of the key)
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            payment_reference TEXT NOT NULL,
            session_id TEXT NOT NULL,
            buyer_id TEXT NOT NULL,
            seller_id TEXT,
            product_id TEXT NOT NULL,
            line_index INTEGER NOT NULL DEFAULT 0,
            product_kind TEXT NOT NULL CHECK (product_kind IN ('beat', 'sound_kit', 'service', 'plan')),
            product_name TEXT NOT NULL,
            price_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            payment_status TEXT NOT NULL DEFAULT 'completed',
            payment_method TEXT NOT NULL,
            license_type TEXT,
            plan_tier TEXT,
            metadata TEXT,
            coupon_id TEXT,
            created_at INTEGER NOT NULL,
            UNIQUE(payment_reference, product_id, line_index)
        );
        CREATE INDEX IF NOT EXISTS idx_transactions_session ON transactions(session_id);
        CREATE INDEX IF NOT EXISTS idx_transactions_buyer ON transactions(buyer_id);
        CREATE INDEX IF NOT EXISTS idx_transactions_seller ON transactions(seller_id);

        -- Side effects already applied for a payment (idempotent re-delivery)
        CREATE TABLE IF NOT EXISTS fulfillment_steps (
            payment_reference TEXT NOT NULL,
            item_key TEXT NOT NULL,
            step TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (payment_reference, item_key, step)
        );
        CREATE INDEX IF NOT EXISTS idx_fulfillment_steps_created ON fulfillment_steps(created_at);

        -- Webhook events (for replay attack prevention)
        CREATE TABLE IF NOT EXISTS webhook_events (
            provider TEXT NOT NULL,
            event_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (provider, event_id)
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_events_created ON webhook_events(created_at);
        "#,
    )?;
    Ok(())
}
