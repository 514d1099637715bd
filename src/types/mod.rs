//! Type definitions for the fraud inference service

pub mod prediction;
pub mod transaction;

pub use prediction::{Label, Prediction};
pub use transaction::{TransactionRecord, FEATURE_COLUMNS, FEATURE_COUNT};
