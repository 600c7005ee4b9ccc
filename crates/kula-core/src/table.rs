//! Tabular exchange format between the session and record stores
//!
//! A `Table` is a header row plus string rows. Converting to records maps
//! columns by name, so extra columns in a candidate file are carried along
//! untouched when the remaining rows are written back.

use serde::{Deserialize, Serialize};

use crate::{KulaError, Record, Result};

/// Column order used whenever records are written out
pub const RECORD_COLUMNS: [&str; 6] = [
    "sentence",
    "entity1",
    "entity1_label",
    "entity2",
    "entity2_label",
    "relation",
];

/// Fallback column used when a candidate file has no `sentence`
const TEXT_COLUMN: &str = "text";

/// A header row and its data rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Column headers
    pub headers: Vec<String>,

    /// Table rows
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table with the given headers
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Add rows
    pub fn with_rows(mut self, rows: Vec<Vec<String>>) -> Self {
        self.rows = rows;
        self
    }

    /// Add a row
    pub fn add_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    /// Get number of rows
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Build a table with exactly the six record columns
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        let headers = RECORD_COLUMNS.iter().map(|c| c.to_string()).collect();
        let rows = records
            .into_iter()
            .map(|r| r.values().iter().map(|v| v.to_string()).collect())
            .collect();

        Self { headers, rows }
    }

    /// Same headers, rows restricted to `indices`
    ///
    /// Indices outside the table are ignored; output follows the order of
    /// `indices`.
    pub fn select(&self, indices: impl IntoIterator<Item = usize>) -> Self {
        let rows = indices
            .into_iter()
            .filter_map(|i| self.rows.get(i).cloned())
            .collect();

        Self {
            headers: self.headers.clone(),
            rows,
        }
    }

    /// Coerce every row into a `Record`
    ///
    /// Missing cells and missing optional columns become empty strings. A
    /// `text` column stands in for `sentence` when the latter is absent. A
    /// table with neither column is rejected unless it is entirely empty.
    pub fn to_records(&self, source_id: &str) -> Result<Vec<Record>> {
        if self.headers.is_empty() && self.rows.is_empty() {
            return Ok(Vec::new());
        }

        let sentence_col = self
            .column_index("sentence")
            .or_else(|| self.column_index(TEXT_COLUMN))
            .ok_or_else(|| {
                KulaError::schema(source_id, "missing required column `sentence` (or `text`)")
            })?;

        let columns: Vec<Option<usize>> = RECORD_COLUMNS
            .iter()
            .map(|name| match *name {
                "sentence" => Some(sentence_col),
                other => self.column_index(other),
            })
            .collect();

        self.rows
            .iter()
            .enumerate()
            .map(|(line, row)| {
                if row.len() > self.headers.len() {
                    return Err(KulaError::schema(
                        source_id,
                        format!(
                            "row {} has {} cells but the header has {}",
                            line + 1,
                            row.len(),
                            self.headers.len()
                        ),
                    ));
                }

                let cell = |col: Option<usize>| {
                    col.and_then(|i| row.get(i)).cloned().unwrap_or_default()
                };

                Ok(Record {
                    sentence: cell(columns[0]),
                    entity1: cell(columns[1]),
                    entity1_label: cell(columns[2]),
                    entity2: cell(columns[3]),
                    entity2_label: cell(columns[4]),
                    relation: cell(columns[5]),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_missing_optional_columns_default_to_empty() {
        let table = Table::new(strings(&["sentence", "entity1"]))
            .with_rows(vec![strings(&["Alice runs.", "Alice"]), strings(&["Short"])]);

        let records = table.to_records("candidates.csv").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].entity1, "Alice");
        assert_eq!(records[0].relation, "");
        assert_eq!(records[1].entity1, "");
    }

    #[test]
    fn test_text_column_becomes_sentence() {
        let table = Table::new(strings(&["id", "text"]))
            .with_rows(vec![strings(&["1", "Raw paragraph text."])]);

        let records = table.to_records("chunks.csv").unwrap();
        assert_eq!(records[0].sentence, "Raw paragraph text.");
    }

    #[test]
    fn test_sentence_preferred_over_text() {
        let table = Table::new(strings(&["text", "sentence"]))
            .with_rows(vec![strings(&["paragraph", "sentence"])]);

        let records = table.to_records("mixed.csv").unwrap();
        assert_eq!(records[0].sentence, "sentence");
    }

    #[test]
    fn test_missing_sentence_column_is_schema_error() {
        let table = Table::new(strings(&["entity1"])).with_rows(vec![strings(&["Alice"])]);

        let err = table.to_records("bad.csv").unwrap_err();
        assert!(matches!(err, KulaError::SchemaError { .. }));
    }

    #[test]
    fn test_ragged_row_is_schema_error() {
        let table = Table::new(strings(&["sentence"])).with_rows(vec![strings(&["a", "b"])]);

        assert!(matches!(
            table.to_records("ragged.csv"),
            Err(KulaError::SchemaError { .. })
        ));
    }

    #[test]
    fn test_empty_table_has_no_records() {
        assert!(Table::default().to_records("empty.csv").unwrap().is_empty());
    }

    #[test]
    fn test_from_records_uses_fixed_columns() {
        let record = Record::new("s").with_entity1("a", "PERSON");
        let table = Table::from_records([&record]);

        assert_eq!(table.headers, strings(&RECORD_COLUMNS));
        assert_eq!(table.rows[0], strings(&["s", "a", "PERSON", "", "", ""]));
    }

    #[test]
    fn test_select_preserves_headers_and_order() {
        let table = Table::new(strings(&["sentence", "source"])).with_rows(vec![
            strings(&["r0", "x"]),
            strings(&["r1", "y"]),
            strings(&["r2", "z"]),
        ]);

        let selected = table.select([0, 2, 9]);
        assert_eq!(selected.headers, table.headers);
        assert_eq!(selected.rows, vec![strings(&["r0", "x"]), strings(&["r2", "z"])]);
    }
}
