//! Schema validation and tabular input/output.
//!
//! Guarantees that raw input, whether a single form submission or an
//! uploaded CSV, conforms to the 29-column transaction schema before any
//! inference is attempted. Extra columns in uploaded files are dropped by
//! projection; missing columns abort the request.

use crate::error::{ServiceError, ServiceResult};
use crate::types::prediction::Prediction;
use crate::types::transaction::{TransactionRecord, FEATURE_COLUMNS};
use std::collections::HashSet;
use std::io::Read;

/// Header of the appended label column in exported tables.
pub const PREDICTION_COLUMN: &str = "Prediction";

/// Header of the appended fraud-probability column in exported tables.
pub const PROBABILITY_COLUMN: &str = "Fraud Probability";

/// Build a record from one submitted form payload.
///
/// All 29 fields must be present and numeric; unknown fields are ignored.
pub fn record_from_value(value: serde_json::Value) -> ServiceResult<TransactionRecord> {
    serde_json::from_value(value)
        .map_err(|e| ServiceError::SchemaMismatch(format!("invalid transaction fields: {}", e)))
}

/// Parse an uploaded delimited file into validated records.
///
/// The file must carry a header row naming all required columns. Rows come
/// back in file order. A file with a valid header but no data rows is
/// rejected, since there is nothing to score.
pub fn read_batch<R: Read>(reader: R) -> ServiceResult<Vec<TransactionRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| ServiceError::SchemaMismatch(format!("unreadable header row: {}", e)))?
        .clone();
    let present: HashSet<&str> = headers.iter().collect();

    let missing: Vec<String> = FEATURE_COLUMNS
        .iter()
        .filter(|column| !present.contains(*column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ServiceError::missing_columns(&missing));
    }

    let mut records = Vec::new();
    for (index, result) in rdr.deserialize::<TransactionRecord>().enumerate() {
        let record = result.map_err(|e| {
            ServiceError::SchemaMismatch(format!(
                "row {} could not be coerced to numeric values: {}",
                index + 1,
                e
            ))
        })?;
        records.push(record);
    }

    if records.is_empty() {
        return Err(ServiceError::SchemaMismatch(
            "file contains no transaction rows".to_string(),
        ));
    }

    Ok(records)
}

/// Serialize scored records as a UTF-8 CSV table.
///
/// The output keeps the canonical 29 columns in upload row order and
/// appends `Prediction` and `Fraud Probability`.
pub fn write_scored_csv(
    records: &[TransactionRecord],
    predictions: &[Prediction],
) -> ServiceResult<Vec<u8>> {
    if records.len() != predictions.len() {
        return Err(ServiceError::Internal(format!(
            "{} predictions for {} records",
            predictions.len(),
            records.len()
        )));
    }

    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<&str> = FEATURE_COLUMNS.to_vec();
    header.push(PREDICTION_COLUMN);
    header.push(PROBABILITY_COLUMN);
    writer
        .write_record(&header)
        .map_err(|e| ServiceError::Internal(format!("csv header write: {}", e)))?;

    for (record, prediction) in records.iter().zip(predictions) {
        let mut row: Vec<String> = record.values().iter().map(|v| v.to_string()).collect();
        row.push(prediction.label.as_u8().to_string());
        row.push(prediction.fraud_probability.to_string());
        writer
            .write_record(&row)
            .map_err(|e| ServiceError::Internal(format!("csv row write: {}", e)))?;
    }

    writer
        .into_inner()
        .map_err(|e| ServiceError::Internal(format!("csv flush: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::prediction::Label;

    fn sample_csv(rows: usize) -> String {
        let mut out = FEATURE_COLUMNS.join(",");
        out.push('\n');
        for i in 0..rows {
            let row: Vec<String> = (0..29).map(|c| format!("{}.5", i * 29 + c)).collect();
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }

    #[test]
    fn test_read_batch_valid_file() {
        let csv = sample_csv(3);
        let records = read_batch(csv.as_bytes()).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].v1, 0.5);
        assert_eq!(records[0].amount, 28.5);
        assert_eq!(records[2].v1, 58.5);
    }

    #[test]
    fn test_missing_column_is_rejected() {
        let csv = sample_csv(2).replace("V17", "W17");
        let err = read_batch(csv.as_bytes()).unwrap_err();

        match err {
            ServiceError::SchemaMismatch(msg) => assert!(msg.contains("V17")),
            other => panic!("expected SchemaMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_extra_columns_are_projected_away() {
        let mut csv = String::from("Time,");
        csv.push_str(&FEATURE_COLUMNS.join(","));
        csv.push_str(",Class\n406,");
        csv.push_str(&vec!["1.0"; 29].join(","));
        csv.push_str(",1\n");

        let records = read_batch(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].v1, 1.0);
        assert_eq!(records[0].amount, 1.0);
    }

    #[test]
    fn test_non_numeric_value_is_schema_mismatch() {
        let mut csv = sample_csv(2);
        csv = csv.replacen("29.5", "abc", 1);

        let err = read_batch(csv.as_bytes()).unwrap_err();
        match err {
            ServiceError::SchemaMismatch(msg) => assert!(msg.contains("row 2")),
            other => panic!("expected SchemaMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_file_is_rejected() {
        let csv = sample_csv(0);
        assert!(matches!(
            read_batch(csv.as_bytes()),
            Err(ServiceError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_record_from_value_requires_all_fields() {
        let mut value = serde_json::to_value(TransactionRecord::default()).unwrap();
        value.as_object_mut().unwrap().remove("V17");

        let err = record_from_value(value).unwrap_err();
        match err {
            ServiceError::SchemaMismatch(msg) => assert!(msg.contains("V17")),
            other => panic!("expected SchemaMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_export_round_trip() {
        let csv = sample_csv(3);
        let records = read_batch(csv.as_bytes()).unwrap();
        let predictions: Vec<Prediction> = (0..3)
            .map(|i| Prediction {
                label: if i == 1 { Label::Fraud } else { Label::Legitimate },
                fraud_probability: 0.1 * (i as f64 + 1.0),
            })
            .collect();

        let exported = write_scored_csv(&records, &predictions).unwrap();
        let text = String::from_utf8(exported).unwrap();

        let mut lines = text.lines();
        let header: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(header.len(), 31);
        assert_eq!(header[28], "Amount");
        assert_eq!(header[29], PREDICTION_COLUMN);
        assert_eq!(header[30], PROBABILITY_COLUMN);

        // Re-parsing the export reproduces the validated input, in order,
        // with the two appended columns per row.
        let reparsed = read_batch(text.as_bytes()).unwrap();
        assert_eq!(reparsed, records);

        let second_row: Vec<&str> = text.lines().nth(2).unwrap().split(',').collect();
        assert_eq!(second_row.len(), 31);
        assert_eq!(second_row[29], "1");
        assert_eq!(second_row[30], "0.2");
    }

    #[test]
    fn test_prediction_count_must_match() {
        let records = read_batch(sample_csv(2).as_bytes()).unwrap();
        let predictions = vec![Prediction {
            label: Label::Legitimate,
            fraud_probability: 0.0,
        }];

        assert!(matches!(
            write_scored_csv(&records, &predictions),
            Err(ServiceError::Internal(_))
        ));
    }
}
