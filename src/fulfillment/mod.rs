//! Purchase fulfillment: the work done once a checkout is known to be paid.
//!
//! For every line item, in order: license contract (beats and sound kits),
//! ledger row, seller payout and sales count (seller-owned goods) or
//! subscription period (plans). The coupon is redeemed once per payment.
//! Each side effect is claimed in `fulfillment_steps`, so re-delivering the
//! same event only performs what did not happen the first time.

mod ingest;
mod order_id;
mod payout;
mod steps;
mod subscription;

pub use ingest::{is_settled, purchase_event_from_session};
pub use order_id::order_id;
pub use payout::{FeeModel, Payout, compute_payout};
pub use steps::{EVENT_ITEM_KEY, item_key};
pub use subscription::{CurrentSubscription, Reconciliation, TierPricing, reconcile};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use serde::Serialize;

use crate::contracts::{
    ContractData, LicenseKind, Party, render_contract, resolve_template,
};
use crate::db::{DbPool, queries};
use crate::error::FulfillmentError;
use crate::models::{
    CreateTransaction, LineItem, ProductKind, Profile, PurchaseEvent, TransactionMetadata,
};
use crate::storage::{BlobStore, PDF_CONTENT_TYPE, contract_path};

#[derive(Debug, Clone)]
pub struct FulfillmentSettings {
    pub fee_model: FeeModel,
    pub tier_pricing: TierPricing,
    /// Printed on contracts as the issuing marketplace.
    pub platform_name: String,
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        Self {
            fee_model: FeeModel::default(),
            tier_pricing: TierPricing::default(),
            platform_name: "Beatpay".to_string(),
        }
    }
}

/// Result of one fulfillment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepOutcome {
    Done,
    /// Applied by an earlier delivery of the same payment.
    AlreadyDone,
    /// Does not apply to this item.
    Skipped,
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub product_id: String,
    pub kind: ProductKind,
    pub contract: StepOutcome,
    pub contract_url: Option<String>,
    pub ledger: StepOutcome,
    pub balance: StepOutcome,
    pub sales_count: StepOutcome,
    pub subscription: StepOutcome,
}

impl ItemOutcome {
    fn new(item: &LineItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            kind: item.kind,
            contract: StepOutcome::Skipped,
            contract_url: None,
            ledger: StepOutcome::Skipped,
            balance: StepOutcome::Skipped,
            sales_count: StepOutcome::Skipped,
            subscription: StepOutcome::Skipped,
        }
    }

    fn steps(&self) -> [&StepOutcome; 5] {
        [
            &self.contract,
            &self.ledger,
            &self.balance,
            &self.sales_count,
            &self.subscription,
        ]
    }
}

/// Per-item account of what happened to an event. Failures in here were
/// logged and did not stop the remaining items.
#[derive(Debug, Clone, Serialize)]
pub struct FulfillmentReport {
    pub payment_reference: String,
    pub order_id: String,
    pub buyer_id: String,
    pub items: Vec<ItemOutcome>,
    pub coupon: StepOutcome,
}

impl FulfillmentReport {
    pub fn failure_count(&self) -> usize {
        self.items
            .iter()
            .flat_map(|i| i.steps())
            .chain(std::iter::once(&self.coupon))
            .filter(|s| s.is_failed())
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }
}

struct ContractResult {
    outcome: StepOutcome,
    url: Option<String>,
    kind: Option<LicenseKind>,
}

impl ContractResult {
    fn skipped() -> Self {
        Self {
            outcome: StepOutcome::Skipped,
            url: None,
            kind: None,
        }
    }

    fn failed(kind: Option<LicenseKind>, reason: String) -> Self {
        Self {
            outcome: StepOutcome::Failed(reason),
            url: None,
            kind,
        }
    }
}

#[derive(Clone)]
pub struct Fulfillment {
    db: DbPool,
    blobs: Arc<dyn BlobStore>,
    settings: Arc<FulfillmentSettings>,
}

impl Fulfillment {
    pub fn new(db: DbPool, blobs: Arc<dyn BlobStore>, settings: Arc<FulfillmentSettings>) -> Self {
        Self {
            db,
            blobs,
            settings,
        }
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, FulfillmentError> {
        Ok(self.db.get()?)
    }

    /// Fulfill a paid checkout.
    ///
    /// Only an unresolvable buyer (or no database at all) fails the whole
    /// event; everything else is recorded per item in the returned report.
    pub async fn fulfill(
        &self,
        event: &PurchaseEvent,
        now: DateTime<Utc>,
    ) -> Result<FulfillmentReport, FulfillmentError> {
        let payment_reference = event.payment_reference().to_string();

        let buyer = {
            let conn = self.conn()?;
            queries::resolve_buyer(&conn, event.buyer_id.as_deref(), event.buyer_email.as_deref())?
        };
        let Some(buyer) = buyer else {
            tracing::error!(
                "No profile for buyer of session {} (id={:?}, email={:?})",
                event.session_id,
                event.buyer_id,
                event.buyer_email
            );
            return Err(FulfillmentError::BuyerResolution {
                session_id: event.session_id.clone(),
            });
        };

        let order_id = order_id(
            event.line_items.iter().map(|i| i.name.as_str()),
            &payment_reference,
        );
        tracing::info!(
            "Fulfilling order {} (payment {}, {} items) for buyer {}",
            order_id,
            payment_reference,
            event.line_items.len(),
            buyer.id
        );

        let mut items = Vec::with_capacity(event.line_items.len());
        for (index, item) in event.line_items.iter().enumerate() {
            let outcome = self
                .fulfill_item(event, &buyer, &order_id, index, item, now)
                .await;
            items.push(outcome);
        }

        let coupon = match event.coupon_id.as_deref() {
            Some(coupon_id) => match self.conn() {
                Ok(mut conn) => steps::redeem_coupon(&mut conn, &payment_reference, coupon_id),
                Err(e) => StepOutcome::Failed(e.to_string()),
            },
            None => StepOutcome::Skipped,
        };

        let report = FulfillmentReport {
            payment_reference,
            order_id,
            buyer_id: buyer.id,
            items,
            coupon,
        };

        if report.has_failures() {
            tracing::warn!(
                "Order {} fulfilled with {} failed steps",
                report.order_id,
                report.failure_count()
            );
        } else {
            tracing::info!("Order {} fulfilled", report.order_id);
        }
        Ok(report)
    }

    async fn fulfill_item(
        &self,
        event: &PurchaseEvent,
        buyer: &Profile,
        order_id: &str,
        index: usize,
        item: &LineItem,
        now: DateTime<Utc>,
    ) -> ItemOutcome {
        let payment_reference = event.payment_reference();
        let key = item_key(&item.product_id, index);
        let mut outcome = ItemOutcome::new(item);

        let existing = self.conn().and_then(|conn| {
            queries::get_transaction(&conn, payment_reference, &item.product_id, index as i64)
                .map_err(FulfillmentError::from)
        });

        match existing {
            Ok(Some(row)) => {
                // Contract and ledger were produced by an earlier delivery.
                if item.kind.is_licensed() {
                    outcome.contract = StepOutcome::AlreadyDone;
                }
                outcome.contract_url = row.contract_url();
                outcome.ledger = StepOutcome::AlreadyDone;
            }
            Ok(None) => {
                let contract = self
                    .produce_contract(event, buyer, order_id, index, item, now)
                    .await;
                outcome.contract = contract.outcome;
                outcome.contract_url = contract.url.clone();

                let input = CreateTransaction {
                    payment_reference: payment_reference.to_string(),
                    session_id: event.session_id.clone(),
                    buyer_id: buyer.id.clone(),
                    seller_id: item.seller_id.clone(),
                    product_id: item.product_id.clone(),
                    line_index: index as i64,
                    product_kind: item.kind,
                    product_name: item.name.clone(),
                    price_cents: item.amount_cents,
                    currency: event.currency.clone(),
                    payment_method: event.payment_method.clone(),
                    license_type: item.license_type.clone().or_else(|| {
                        (item.kind == ProductKind::SoundKit)
                            .then(|| LicenseKind::SoundKit.as_ref().to_string())
                    }),
                    plan_tier: item.plan.map(|p| p.tier),
                    metadata: TransactionMetadata {
                        order_id: order_id.to_string(),
                        line_index: index,
                        contract_url: contract.url,
                        license_kind: contract.kind.map(|k| k.as_ref().to_string()),
                    },
                    coupon_id: event.coupon_id.clone(),
                };
                outcome.ledger = match self.conn() {
                    Ok(mut conn) => steps::write_ledger(&mut conn, &key, &input),
                    Err(e) => StepOutcome::Failed(e.to_string()),
                };
            }
            Err(e) => {
                tracing::error!(
                    "Ledger lookup failed for payment {} item {}: {}",
                    payment_reference,
                    item.product_id,
                    e
                );
                outcome.ledger = StepOutcome::Failed(e.to_string());
            }
        }

        if outcome.ledger.is_failed() {
            tracing::warn!(
                "Skipping payout and subscription for payment {} item {}: ledger write failed",
                payment_reference,
                item.product_id
            );
            return outcome;
        }

        let mut conn = match self.conn() {
            Ok(conn) => conn,
            Err(e) => {
                let failed = StepOutcome::Failed(e.to_string());
                outcome.balance = failed.clone();
                outcome.sales_count = failed.clone();
                outcome.subscription = failed;
                return outcome;
            }
        };

        if item.kind.is_seller_owned() {
            outcome.balance = steps::credit_seller(
                &mut conn,
                payment_reference,
                &key,
                item,
                &self.settings.fee_model,
            );
            outcome.sales_count = steps::count_sale(&mut conn, payment_reference, &key, item);
        }

        if item.kind == ProductKind::Plan {
            outcome.subscription = match item.plan {
                Some(ref plan) => steps::apply_plan(
                    &mut conn,
                    payment_reference,
                    &key,
                    &buyer.id,
                    plan,
                    event.subscription_id.as_deref(),
                    &self.settings.tier_pricing,
                    now,
                ),
                None => {
                    tracing::error!(
                        "Plan item {} of payment {} has no valid tier, subscription not applied",
                        item.product_id,
                        payment_reference
                    );
                    StepOutcome::Failed("plan item without a valid tier".to_string())
                }
            };
        }

        outcome
    }

    /// Render and upload the license contract of a beat or sound kit.
    async fn produce_contract(
        &self,
        event: &PurchaseEvent,
        buyer: &Profile,
        order_id: &str,
        index: usize,
        item: &LineItem,
        now: DateTime<Utc>,
    ) -> ContractResult {
        if !item.kind.is_licensed() {
            return ContractResult::skipped();
        }

        let kind = match item.license_type.as_deref() {
            Some(raw) => match LicenseKind::normalize(raw) {
                Some(kind) => kind,
                None => {
                    tracing::error!(
                        "Unknown license type '{}' for payment {} item {}, no contract issued",
                        raw,
                        event.payment_reference(),
                        item.product_id
                    );
                    return ContractResult::failed(None, format!("unknown license type '{}'", raw));
                }
            },
            None if item.kind == ProductKind::SoundKit => LicenseKind::SoundKit,
            None => {
                tracing::info!(
                    "Item {} of payment {} has no license type, no contract issued",
                    item.product_id,
                    event.payment_reference()
                );
                return ContractResult::skipped();
            }
        };

        let data = match self.contract_data(event, buyer, order_id, item, kind, now) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(
                    "Could not assemble contract for payment {} item {}: {}",
                    event.payment_reference(),
                    item.product_id,
                    e
                );
                return ContractResult::failed(Some(kind), e.to_string());
            }
        };

        let rendered = match render_contract(&data) {
            Ok(rendered) => rendered,
            Err(e) => {
                let e = FulfillmentError::from(e);
                tracing::error!(
                    "Contract rendering failed for payment {} item {}: {}",
                    event.payment_reference(),
                    item.product_id,
                    e
                );
                return ContractResult::failed(Some(kind), e.to_string());
            }
        };

        let path = contract_path(&buyer.id, &item.name, event.payment_reference(), index);
        match self.blobs.put(&path, rendered.bytes, PDF_CONTENT_TYPE).await {
            Ok(url) => {
                tracing::info!(
                    "Contract {} ({} pages, verification {}) stored at {}",
                    order_id,
                    rendered.page_count,
                    rendered.verification_id,
                    path
                );
                ContractResult {
                    outcome: StepOutcome::Done,
                    url: Some(url),
                    kind: Some(kind),
                }
            }
            Err(e) => {
                let e = FulfillmentError::from(e);
                tracing::error!(
                    "Contract upload failed for payment {} item {}: {}",
                    event.payment_reference(),
                    item.product_id,
                    e
                );
                ContractResult::failed(Some(kind), e.to_string())
            }
        }
    }

    fn contract_data(
        &self,
        event: &PurchaseEvent,
        buyer: &Profile,
        order_id: &str,
        item: &LineItem,
        kind: LicenseKind,
        now: DateTime<Utc>,
    ) -> Result<ContractData, FulfillmentError> {
        let conn = self.conn()?;
        let seller_id = item.seller_id.as_deref();

        let producer = match seller_id {
            Some(id) => match queries::get_profile_by_id(&conn, id)? {
                Some(profile) => Party {
                    id: profile.id.clone(),
                    name: profile.legal_name().to_string(),
                    email: profile.email.clone(),
                },
                None => Party {
                    id: id.to_string(),
                    name: id.to_string(),
                    email: None,
                },
            },
            None => Party {
                id: String::new(),
                name: "The Producer".to_string(),
                email: None,
            },
        };

        let terms = resolve_template(&conn, seller_id, kind).into_terms(kind);

        Ok(ContractData {
            order_id: order_id.to_string(),
            date: now.date_naive(),
            license_kind: kind,
            product_name: item.name.clone(),
            price_cents: item.amount_cents,
            currency: event.currency.clone(),
            producer,
            buyer: Party {
                id: buyer.id.clone(),
                name: buyer.legal_name().to_string(),
                email: buyer.email.clone().or_else(|| event.buyer_email.clone()),
            },
            terms,
            platform_name: self.settings.platform_name.clone(),
            rendered_at: now,
        })
    }
}
