use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::sync::Arc;
use std::time::Duration;

use beatpay::config::Config;
use beatpay::db::{AppState, create_pool, init_db, queries};
use beatpay::fulfillment::{Fulfillment, FulfillmentSettings};
use beatpay::handlers;
use beatpay::models::{CreateProfile, ProductKind};
use beatpay::payments::StripeClient;
use beatpay::storage::{BlobStore, MemoryBlobStore, S3BlobStore};

#[derive(Parser, Debug)]
#[command(name = "beatpay")]
#[command(about = "Stripe fulfillment for a beat marketplace: ledger, payouts, plans and license contracts")]
struct Cli {
    /// Seed the database with dev data (buyer, producer, beat, coupon)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,

    /// Days to keep fulfillment step claims before purging them (0 = keep forever)
    #[arg(long, env = "FULFILLMENT_STEP_RETENTION_DAYS", default_value_t = 0)]
    purge_steps_older_than_days: i64,
}

/// Seeds the database with a producer, a buyer, a beat and a coupon so a
/// Stripe CLI `trigger` can be fulfilled end to end.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    if queries::get_profile_by_id(&conn, "dev-producer")
        .expect("Failed to look up dev producer")
        .is_some()
    {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    let producer = queries::create_profile(
        &conn,
        &CreateProfile {
            id: Some("dev-producer".into()),
            email: Some("producer@beatpay.local".into()),
            display_name: Some("Dev Producer".into()),
        },
    )
    .expect("Failed to create dev producer");

    let buyer = queries::create_profile(
        &conn,
        &CreateProfile {
            id: Some("dev-buyer".into()),
            email: Some("buyer@beatpay.local".into()),
            display_name: Some("Dev Buyer".into()),
        },
    )
    .expect("Failed to create dev buyer");

    queries::create_catalog_item(&conn, ProductKind::Beat, "dev-beat", &producer.id, "Dev Beat")
        .expect("Failed to create dev beat");
    let coupon = queries::create_coupon(&conn, "DEV10").expect("Failed to create dev coupon");

    tracing::info!("============================================");
    tracing::info!("SEEDED DEV DATA");
    tracing::info!("Producer: {} ({:?})", producer.id, producer.email);
    tracing::info!("Buyer:    {} ({:?})", buyer.id, buyer.email);
    tracing::info!("Beat:     dev-beat");
    tracing::info!("Coupon:   {} ({})", coupon.code, coupon.id);
    tracing::info!("============================================");
}

fn spawn_cleanup_task(state: AppState, webhook_retention_days: i64, step_retention_days: i64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(60 * 60); // hourly

        loop {
            tokio::time::sleep(interval).await;

            let conn = match state.db.get() {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Failed to get db connection for cleanup: {}", e);
                    continue;
                }
            };

            match queries::purge_old_webhook_events(&conn, webhook_retention_days) {
                Ok(count) if count > 0 => {
                    tracing::debug!("Purged {} processed webhook event ids", count);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to purge webhook events: {}", e),
            }

            if step_retention_days > 0 {
                match queries::purge_old_fulfillment_steps(&conn, step_retention_days) {
                    Ok(count) if count > 0 => {
                        tracing::debug!("Purged {} fulfillment step claims", count);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Failed to purge fulfillment steps: {}", e),
                }
            }
        }
    });

    tracing::info!("Background cleanup task started (runs every hour)");
}

/// Contract store for the configured environment. The in-memory store is also
/// returned on its own so the dev server can serve its files.
async fn build_blob_store(config: &Config) -> (Arc<dyn BlobStore>, Option<Arc<MemoryBlobStore>>) {
    if config.storage.bucket.is_none() {
        if !config.dev_mode {
            eprintln!("S3_BUCKET is required outside dev mode (set BEATPAY_ENV=dev to use the in-memory store)");
            std::process::exit(1);
        }
        tracing::warn!(
            "No S3_BUCKET configured: contracts are kept in memory, served under {}/contracts and lost on restart",
            config.base_url
        );
        let store = Arc::new(MemoryBlobStore::new(format!("{}/contracts", config.base_url)));
        return (store.clone(), Some(store));
    }

    match S3BlobStore::from_config(&config.storage).await {
        Ok(store) => (Arc::new(store), None),
        Err(e) => {
            eprintln!("Failed to configure contract storage: {}", e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beatpay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.stripe.webhook_secret.is_empty() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET is not set: every webhook delivery will be rejected");
    }
    if config.stripe.secret_key.is_empty() {
        tracing::warn!("STRIPE_SECRET_KEY is not set: line items can only come from session metadata");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let (blobs, contract_files) = build_blob_store(&config).await;
    let settings = FulfillmentSettings {
        fee_model: config.fee_model,
        tier_pricing: config.tier_pricing,
        platform_name: config.platform_name.clone(),
    };

    let state = AppState {
        db: db_pool.clone(),
        stripe: StripeClient::new(&config.stripe),
        fulfillment: Fulfillment::new(db_pool, blobs, Arc::new(settings)),
        contract_files,
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set BEATPAY_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    spawn_cleanup_task(
        state.clone(),
        config.webhook_event_retention_days,
        cli.purge_steps_older_than_days,
    );

    let app = Router::new()
        .merge(handlers::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Beatpay server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        // Also remove WAL and SHM files if they exist
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
