//! # Dataset Module
//!
//! The raw transaction table and its CSV loader.
//!
//! - Header row defines the schema
//! - Every row carries exactly the header's columns
//! - Cells are typed per column on load (see `ColumnType`); key and name
//!   columns are always text
//!
//! A `RecordSet` is immutable once handed to the pipeline; stages derive new
//! record sets from it instead of editing it in place.

use crate::primitives::TEXT_COLUMNS;
use crate::types::ColumnType;
use crate::{CardGraphError, Record};
use csv::ReaderBuilder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// An ordered collection of rows sharing one column list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordSet {
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl RecordSet {
    /// Create an empty record set with the given schema.
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Create a record set from a schema and rows.
    ///
    /// Attributes not in `columns` are dropped from each row.
    #[must_use]
    pub fn from_rows(columns: Vec<String>, rows: Vec<Record>) -> Self {
        let mut set = Self::new(columns);
        for row in rows {
            set.push(row);
        }
        set
    }

    /// Append a row, projected to this set's columns.
    pub fn push(&mut self, mut record: Record) {
        record.retain(|attr| self.columns.iter().any(|c| c == attr));
        self.rows.push(record);
    }

    /// Column names in schema order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the schema contains `name`.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Fail with `MissingColumn` unless the schema contains `name`.
    pub fn require_column(&self, name: &str) -> Result<(), CardGraphError> {
        if self.has_column(name) {
            Ok(())
        } else {
            Err(CardGraphError::MissingColumn(name.to_string()))
        }
    }

    /// All rows in input order.
    #[must_use]
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parse delimited text with a header row.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, CardGraphError> {
        let mut csv_reader = ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| CardGraphError::Csv(e.to_string()))?
            .clone();
        if headers.is_empty() {
            return Err(CardGraphError::EmptyDataset);
        }
        let columns: Vec<String> = headers.iter().map(str::to_string).collect();

        let mut raw_rows = Vec::new();
        for result in csv_reader.records() {
            raw_rows.push(result.map_err(|e| CardGraphError::Csv(e.to_string()))?);
        }

        let types: Vec<ColumnType> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                if TEXT_COLUMNS.contains(&column.as_str()) {
                    ColumnType::Text
                } else {
                    ColumnType::infer(raw_rows.iter().filter_map(|row| row.get(i)))
                }
            })
            .collect();

        let mut set = Self::new(columns);
        for row in &raw_rows {
            let record: Record = set
                .columns
                .iter()
                .zip(types.iter())
                .zip(row.iter())
                .map(|((column, ty), cell)| (column.clone(), ty.parse(cell)))
                .collect();
            set.rows.push(record);
        }

        tracing::debug!(
            rows = set.rows.len(),
            columns = set.columns.len(),
            "dataset parsed"
        );
        Ok(set)
    }

    /// Open and parse a CSV file.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, CardGraphError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            CardGraphError::Io(format!("Cannot open dataset '{}': {}", path.display(), e))
        })?;
        Self::from_csv_reader(BufReader::new(file))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    const SAMPLE: &str = "\
cc_num,merchant,amt,trans_date
4001,fraud_Kirlin,12.50,21/05/23
4002,fraud_Sporer,3,22/05/23
";

    #[test]
    fn parses_header_and_rows() {
        let set = RecordSet::from_csv_reader(SAMPLE.as_bytes()).expect("parse");

        assert_eq!(set.columns(), ["cc_num", "merchant", "amt", "trans_date"]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.rows()[0].get("cc_num"), Some(&Value::Integer(4001)));
        assert_eq!(set.rows()[0].get("amt"), Some(&Value::Float(12.5)));
        assert_eq!(set.rows()[1].get("merchant"), Some(&Value::text("fraud_Sporer")));
    }

    #[test]
    fn columns_are_typed_as_a_whole() {
        let set = RecordSet::from_csv_reader(
            "zip,amt,category\n10001,3,Nan\n10002,4.5,food\n".as_bytes(),
        )
        .expect("parse");

        assert_eq!(set.rows()[0].get("zip"), Some(&Value::Integer(10001)));
        assert_eq!(set.rows()[0].get("amt"), Some(&Value::Float(3.0)));
        assert_eq!(set.rows()[0].get("category"), Some(&Value::text("Nan")));
    }

    #[test]
    fn key_and_name_columns_stay_text() {
        let set = RecordSet::from_csv_reader(
            "cc_num,first,last,merchant,trans_num\n1,Nan,Doe,Infinity,0e12\n2,Ann,Poe,7,0e34\n"
                .as_bytes(),
        )
        .expect("parse");

        let first = &set.rows()[0];
        assert_eq!(first.get("cc_num"), Some(&Value::Integer(1)));
        assert_eq!(first.get("first"), Some(&Value::text("Nan")));
        assert_eq!(first.get("merchant"), Some(&Value::text("Infinity")));
        assert_eq!(first.get("trans_num"), Some(&Value::text("0e12")));
        assert_eq!(set.rows()[1].get("merchant"), Some(&Value::text("7")));
    }

    #[test]
    fn header_only_file_is_empty_set() {
        let set = RecordSet::from_csv_reader("cc_num,merchant\n".as_bytes()).expect("parse");
        assert!(set.is_empty());
        assert!(set.has_column("merchant"));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let result = RecordSet::from_csv_reader("a,b\n1,2\n3\n".as_bytes());
        assert!(matches!(result, Err(CardGraphError::Csv(_))));
    }

    #[test]
    fn empty_input_has_no_schema() {
        let result = RecordSet::from_csv_reader("".as_bytes());
        assert!(matches!(result, Err(CardGraphError::EmptyDataset)));
    }

    #[test]
    fn require_column_reports_missing_name() {
        let set = RecordSet::from_csv_reader(SAMPLE.as_bytes()).expect("parse");
        assert!(set.require_column("amt").is_ok());
        assert!(matches!(
            set.require_column("trans_num"),
            Err(CardGraphError::MissingColumn(name)) if name == "trans_num"
        ));
    }

    #[test]
    fn push_projects_to_schema() {
        let mut set = RecordSet::new(vec!["a".to_string()]);
        set.push([("a", 1_i64), ("b", 2_i64)].into_iter().collect());
        assert_eq!(set.rows()[0].len(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = RecordSet::from_csv_path("/nonexistent/fraudTrain.csv");
        assert!(matches!(result, Err(CardGraphError::Io(_))));
    }
}
