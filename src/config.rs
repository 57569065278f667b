use std::env;

use crate::fulfillment::{FeeModel, TierPricing};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub dev_mode: bool,
    pub platform_name: String,
    pub stripe: StripeConfig,
    pub storage: StorageConfig,
    pub fee_model: FeeModel,
    pub tier_pricing: TierPricing,
    /// How long processed webhook event ids are kept for replay protection.
    pub webhook_event_retention_days: i64,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

/// S3-compatible bucket for generated contracts. `bucket = None` means the
/// in-memory store is used (dev mode only).
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    pub endpoint: Option<String>,
    pub public_base_url: Option<String>,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("BEATPAY_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env_parse("PORT").unwrap_or(3000);

        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let defaults = FeeModel::default();
        let fee_model = FeeModel {
            processor_percent: env_parse("PROCESSOR_FEE_PERCENT")
                .unwrap_or(defaults.processor_percent),
            processor_fixed_cents: env_parse("PROCESSOR_FEE_FIXED_CENTS")
                .unwrap_or(defaults.processor_fixed_cents),
            processor_tax_multiplier: env_parse("PROCESSOR_FEE_TAX_MULTIPLIER")
                .unwrap_or(defaults.processor_tax_multiplier),
            commission_percent: env_parse("PLATFORM_COMMISSION_PERCENT")
                .unwrap_or(defaults.commission_percent),
        };

        let pricing_defaults = TierPricing::default();
        let tier_pricing = TierPricing {
            pro_monthly_cents: env_parse("PRO_MONTHLY_PRICE_CENTS")
                .or(pricing_defaults.pro_monthly_cents),
            premium_monthly_cents: env_parse("PREMIUM_MONTHLY_PRICE_CENTS")
                .or(pricing_defaults.premium_monthly_cents),
        };

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "beatpay.db".to_string()),
            base_url,
            dev_mode,
            platform_name: env::var("PLATFORM_NAME").unwrap_or_else(|_| "Beatpay".to_string()),
            stripe: StripeConfig {
                secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
                webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            },
            storage: StorageConfig {
                bucket: env::var("S3_BUCKET").ok().filter(|b| !b.is_empty()),
                endpoint: env::var("S3_ENDPOINT").ok().filter(|e| !e.is_empty()),
                public_base_url: env::var("S3_PUBLIC_BASE_URL").ok().filter(|u| !u.is_empty()),
            },
            fee_model,
            tier_pricing,
            webhook_event_retention_days: env_parse("WEBHOOK_EVENT_RETENTION_DAYS").unwrap_or(7),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
