//! Transaction data structures for online payment fraud detection

use serde::{Deserialize, Serialize};

/// Number of numeric features the classifier was trained on.
pub const FEATURE_COUNT: usize = 29;

/// Canonical column order expected by the model: the 28 anonymized
/// principal components followed by the transaction amount.
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "V1", "V2", "V3", "V4", "V5", "V6", "V7", "V8", "V9", "V10", "V11", "V12", "V13", "V14",
    "V15", "V16", "V17", "V18", "V19", "V20", "V21", "V22", "V23", "V24", "V25", "V26", "V27",
    "V28", "Amount",
];

/// Represents one online transaction to be scored for fraud.
///
/// The `V1..V28` fields are PCA-derived components from the original
/// dataset and carry no individual meaning. `Amount` is the transaction
/// amount in monetary units; it is expected to be non-negative but no
/// bound is enforced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(rename = "V1")]
    pub v1: f64,
    #[serde(rename = "V2")]
    pub v2: f64,
    #[serde(rename = "V3")]
    pub v3: f64,
    #[serde(rename = "V4")]
    pub v4: f64,
    #[serde(rename = "V5")]
    pub v5: f64,
    #[serde(rename = "V6")]
    pub v6: f64,
    #[serde(rename = "V7")]
    pub v7: f64,
    #[serde(rename = "V8")]
    pub v8: f64,
    #[serde(rename = "V9")]
    pub v9: f64,
    #[serde(rename = "V10")]
    pub v10: f64,
    #[serde(rename = "V11")]
    pub v11: f64,
    #[serde(rename = "V12")]
    pub v12: f64,
    #[serde(rename = "V13")]
    pub v13: f64,
    #[serde(rename = "V14")]
    pub v14: f64,
    #[serde(rename = "V15")]
    pub v15: f64,
    #[serde(rename = "V16")]
    pub v16: f64,
    #[serde(rename = "V17")]
    pub v17: f64,
    #[serde(rename = "V18")]
    pub v18: f64,
    #[serde(rename = "V19")]
    pub v19: f64,
    #[serde(rename = "V20")]
    pub v20: f64,
    #[serde(rename = "V21")]
    pub v21: f64,
    #[serde(rename = "V22")]
    pub v22: f64,
    #[serde(rename = "V23")]
    pub v23: f64,
    #[serde(rename = "V24")]
    pub v24: f64,
    #[serde(rename = "V25")]
    pub v25: f64,
    #[serde(rename = "V26")]
    pub v26: f64,
    #[serde(rename = "V27")]
    pub v27: f64,
    #[serde(rename = "V28")]
    pub v28: f64,
    #[serde(rename = "Amount")]
    pub amount: f64,
}

impl TransactionRecord {
    /// Field values in canonical column order.
    pub fn values(&self) -> [f64; FEATURE_COUNT] {
        [
            self.v1, self.v2, self.v3, self.v4, self.v5, self.v6, self.v7, self.v8, self.v9,
            self.v10, self.v11, self.v12, self.v13, self.v14, self.v15, self.v16, self.v17,
            self.v18, self.v19, self.v20, self.v21, self.v22, self.v23, self.v24, self.v25,
            self.v26, self.v27, self.v28, self.amount,
        ]
    }

    /// Feature vector in the exact order the model expects.
    pub fn to_features(&self) -> Vec<f32> {
        self.values().iter().map(|&v| v as f32).collect()
    }
}
