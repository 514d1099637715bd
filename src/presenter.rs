//! User-facing rendering of prediction results

use crate::types::prediction::{Label, Prediction};
use crate::types::transaction::FEATURE_COLUMNS;
use serde::Serialize;

/// Default filename offered for exported batch results.
pub const DOWNLOAD_FILENAME: &str = "hasil_prediksi.csv";

/// Render the inline verdict message for one scored transaction.
///
/// A fraud verdict reports the fraud-class probability; a safe verdict
/// reports its complement. Both are formatted to two decimal places, as
/// shown to the end user.
pub fn verdict_message(prediction: &Prediction) -> String {
    match prediction.label {
        Label::Fraud => format!(
            "Transaksi TERDETEKSI sebagai PENIPUAN dengan probabilitas {:.2}",
            prediction.fraud_probability
        ),
        Label::Legitimate => format!(
            "Transaksi DIPREDIKSI AMAN dengan probabilitas {:.2}",
            prediction.legitimate_probability()
        ),
    }
}

/// One entry of the informational field reference.
#[derive(Debug, Clone, Serialize)]
pub struct FieldInfo {
    pub name: &'static str,
    pub description: String,
}

/// Static description of every input field, for the informational view.
pub fn field_reference() -> Vec<FieldInfo> {
    FEATURE_COLUMNS
        .iter()
        .map(|&name| FieldInfo {
            name,
            description: if name == "Amount" {
                "Transaction amount in monetary units".to_string()
            } else {
                format!(
                    "Anonymized principal component {} derived from the original transaction attributes",
                    &name[1..]
                )
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraud_message_embeds_fraud_probability() {
        let prediction = Prediction {
            label: Label::Fraud,
            fraud_probability: 0.87,
        };

        let message = verdict_message(&prediction);
        assert!(message.contains("PENIPUAN"));
        assert!(message.contains("0.87"));
    }

    #[test]
    fn test_safe_message_embeds_complement() {
        let prediction = Prediction {
            label: Label::Legitimate,
            fraud_probability: 0.03,
        };

        let message = verdict_message(&prediction);
        assert!(message.contains("AMAN"));
        assert!(message.contains("0.97"));
        assert!(!message.contains("0.03"));
    }

    #[test]
    fn test_field_reference_covers_all_columns() {
        let fields = field_reference();

        assert_eq!(fields.len(), FEATURE_COLUMNS.len());
        assert_eq!(fields[0].name, "V1");
        assert!(fields[0].description.contains("principal component 1"));
        assert_eq!(fields[28].name, "Amount");
        assert!(fields[28].description.contains("amount"));
    }
}
