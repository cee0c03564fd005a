use std::collections::HashMap;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::types::RowValue;

/// A row produced by [`crate::Connection::fetch`].
///
/// Column names are shared by every row of one query. The terminal call of a fetch
/// handler receives an empty row (no columns).
#[derive(Debug, Clone, Default)]
pub struct Row {
    column_names: Arc<Vec<String>>,
    values: Vec<RowValue>,
    // Column lookups by name, shared across the rows of one query
    column_index: Arc<HashMap<String, usize>>,
}

impl Row {
    /// Create a row from shared column names and its values.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<RowValue>) -> Self {
        let column_index = Arc::new(index_columns(&column_names));
        Self {
            column_names,
            values,
            column_index,
        }
    }

    pub(crate) fn with_index(
        column_names: Arc<Vec<String>>,
        column_index: Arc<HashMap<String, usize>>,
        values: Vec<RowValue>,
    ) -> Self {
        Self {
            column_names,
            values,
            column_index,
        }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn values(&self) -> &[RowValue] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` for the terminal row handed to fetch handlers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the index of a column by name
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index.get(column_name) {
            return Some(idx);
        }
        self.column_names.iter().position(|col| col == column_name)
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValue> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValue> {
        self.values.get(index)
    }
}

pub(crate) fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    column_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.column_names.iter().zip(&self.values) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_index() {
        let names = Arc::new(vec!["id".to_string(), "name".to_string()]);
        let row = Row::new(
            names,
            vec![RowValue::Int(7), RowValue::Text("seven".into())],
        );
        assert_eq!(row.get("id"), Some(&RowValue::Int(7)));
        assert_eq!(row.get("name").and_then(RowValue::as_text), Some("seven"));
        assert_eq!(row.get_by_index(1), Some(&RowValue::Text("seven".into())));
        assert!(row.get("missing").is_none());
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn default_row_is_empty() {
        let row = Row::default();
        assert!(row.is_empty());
        assert!(row.column_names().is_empty());
    }
}
