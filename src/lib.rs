//! mailfolio — keeps local financial records in sync with statement
//! emails.
//!
//! Four statement sources (brokerage allotments, payment-platform orders,
//! pension statements, equity contract notes) are searched per account,
//! extracted per source, and merged idempotently into per-account JSON
//! stores and document vaults. A fixed-interval scheduler re-runs the
//! whole pipeline; stored pension PDFs can additionally be summarized.

pub mod config;
pub mod error;
pub mod extract;
pub mod google;
pub mod normalize;
pub mod record;
pub mod refresh;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod summarize;
pub mod vault;
