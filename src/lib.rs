//! Beatpay - purchase fulfillment for a beat marketplace
//!
//! This library turns signed Stripe checkout events into ledger rows, license
//! contracts, seller payouts and subscription periods. The binary in `main.rs`
//! wires it into an HTTP server.

pub mod config;
pub mod contracts;
pub mod db;
pub mod error;
pub mod fulfillment;
pub mod handlers;
pub mod models;
pub mod payments;
pub mod storage;
pub mod util;
