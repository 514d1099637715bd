//! Prediction data structures

use serde::{Deserialize, Serialize};

/// Binary classification outcome for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Legitimate,
    Fraud,
}

impl Label {
    /// Map a raw model label (0 or 1) to an outcome. Any non-zero value
    /// counts as fraud, matching the positive-class convention.
    pub fn from_raw(value: i64) -> Self {
        if value == 1 {
            Label::Fraud
        } else {
            Label::Legitimate
        }
    }

    /// Threshold a fraud-class probability into an outcome.
    pub fn from_probability(fraud_probability: f64, threshold: f64) -> Self {
        if fraud_probability >= threshold {
            Label::Fraud
        } else {
            Label::Legitimate
        }
    }

    /// The 0/1 encoding used in exported tables.
    pub fn as_u8(self) -> u8 {
        match self {
            Label::Legitimate => 0,
            Label::Fraud => 1,
        }
    }

    pub fn is_fraud(self) -> bool {
        self == Label::Fraud
    }
}

/// Result of scoring one transaction record.
///
/// Predictions correspond one-to-one with their input rows and keep the
/// same ordinal position when batched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Thresholded classification outcome.
    pub label: Label,
    /// Model-estimated probability of the fraud class, in [0, 1].
    pub fraud_probability: f64,
}

impl Prediction {
    /// Probability of the legitimate class, used only for display.
    pub fn legitimate_probability(&self) -> f64 {
        1.0 - self.fraud_probability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_from_raw() {
        assert_eq!(Label::from_raw(0), Label::Legitimate);
        assert_eq!(Label::from_raw(1), Label::Fraud);
    }

    #[test]
    fn test_label_from_probability() {
        assert_eq!(Label::from_probability(0.49, 0.5), Label::Legitimate);
        assert_eq!(Label::from_probability(0.5, 0.5), Label::Fraud);
        assert_eq!(Label::from_probability(0.97, 0.5), Label::Fraud);
    }

    #[test]
    fn test_label_encoding() {
        assert_eq!(Label::Legitimate.as_u8(), 0);
        assert_eq!(Label::Fraud.as_u8(), 1);
        assert!(Label::Fraud.is_fraud());
        assert!(!Label::Legitimate.is_fraud());
    }

    #[test]
    fn test_complement_probability() {
        let prediction = Prediction {
            label: Label::Legitimate,
            fraud_probability: 0.03,
        };
        assert!((prediction.legitimate_probability() - 0.97).abs() < 1e-12);
    }
}
