//! Query results.
//!
//! Rows come back as composite rows: each column holds either a scalar or
//! a composite instance mapped from a record reference. Single-result
//! access and column lookups are error-first — a missing column or an
//! unexpected row count fails loudly instead of returning null.

use crate::error::{Result, TesseraError};
use crate::instance::CompositeInstance;
use crate::value::Value;

/// One mapped column value.
#[derive(Clone, Debug)]
pub enum RowValue {
    /// Scalar passthrough.
    Scalar(Value),
    /// A record reference mapped to its composite instance.
    Instance(CompositeInstance),
}

impl RowValue {
    /// Borrows the scalar payload, if this is a scalar column.
    pub fn scalar(&self) -> Option<&Value> {
        match self {
            RowValue::Scalar(value) => Some(value),
            RowValue::Instance(_) => None,
        }
    }

    /// Borrows the instance payload, if this is an instance column.
    pub fn instance(&self) -> Option<&CompositeInstance> {
        match self {
            RowValue::Scalar(_) => None,
            RowValue::Instance(instance) => Some(instance),
        }
    }
}

/// One result row: ordered column name/value pairs.
#[derive(Clone, Debug)]
pub struct CompositeRow {
    cells: Vec<(String, RowValue)>,
}

impl CompositeRow {
    pub(crate) fn new(cells: Vec<(String, RowValue)>) -> Self {
        Self { cells }
    }

    /// The column names in result order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Looks a column up by name. Names are case sensitive; an unknown name
    /// fails with [`TesseraError::UnknownColumn`] listing the available
    /// columns.
    pub fn get(&self, column: &str) -> Result<&RowValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
            .ok_or_else(|| TesseraError::UnknownColumn {
                column: column.to_owned(),
                available: self.columns().map(str::to_owned).collect(),
            })
    }

    /// Looks up a scalar column.
    pub fn scalar(&self, column: &str) -> Result<&Value> {
        self.get(column)?
            .scalar()
            .ok_or_else(|| TesseraError::ValueKindMismatch {
                property: column.to_owned(),
                expected: "scalar",
                actual: "record",
            })
    }

    /// Looks up an instance column.
    pub fn instance(&self, column: &str) -> Result<&CompositeInstance> {
        self.get(column)?
            .instance()
            .ok_or_else(|| TesseraError::ValueKindMismatch {
                property: column.to_owned(),
                expected: "record",
                actual: "scalar",
            })
    }

    /// The value of the row's only column; fails if the row has more than
    /// one.
    pub fn value(&self) -> Result<&RowValue> {
        match self.cells.as_slice() {
            [(_, value)] => Ok(value),
            cells => Err(TesseraError::AmbiguousColumn(cells.len())),
        }
    }
}

/// The mapped rows of one query execution.
#[derive(Clone, Debug, Default)]
pub struct RowResult {
    rows: Vec<CompositeRow>,
}

impl RowResult {
    pub(crate) fn new(rows: Vec<CompositeRow>) -> Self {
        Self { rows }
    }

    /// Non-consuming existence check.
    pub fn has_result(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the result is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Borrows the mapped rows.
    pub fn rows(&self) -> &[CompositeRow] {
        &self.rows
    }

    /// Consumes the result, expecting exactly one row.
    pub fn single(mut self) -> Result<CompositeRow> {
        match self.rows.len() {
            0 => Err(TesseraError::NoResult),
            1 => Ok(self.rows.remove(0)),
            rows => Err(TesseraError::AmbiguousResult { rows }),
        }
    }
}

impl IntoIterator for RowResult {
    type Item = CompositeRow;
    type IntoIter = std::vec::IntoIter<CompositeRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// The instances returned by a typed `find`, with the same single-result
/// contract as [`RowResult`].
#[derive(Clone, Debug, Default)]
pub struct InstanceResult {
    instances: Vec<CompositeInstance>,
}

impl InstanceResult {
    pub(crate) fn new(instances: Vec<CompositeInstance>) -> Self {
        Self { instances }
    }

    /// Non-consuming existence check.
    pub fn has_result(&self) -> bool {
        !self.instances.is_empty()
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the result is empty.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Borrows the instances.
    pub fn instances(&self) -> &[CompositeInstance] {
        &self.instances
    }

    /// Consumes the result, expecting exactly one instance.
    pub fn single(mut self) -> Result<CompositeInstance> {
        match self.instances.len() {
            0 => Err(TesseraError::NoResult),
            1 => Ok(self.instances.remove(0)),
            rows => Err(TesseraError::AmbiguousResult { rows }),
        }
    }
}

impl IntoIterator for InstanceResult {
    type Item = CompositeInstance;
    type IntoIter = std::vec::IntoIter<CompositeInstance>;

    fn into_iter(self) -> Self::IntoIter {
        self.instances.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_row(cells: &[(&str, i64)]) -> CompositeRow {
        CompositeRow::new(
            cells
                .iter()
                .map(|(name, v)| ((*name).to_owned(), RowValue::Scalar(Value::Int(*v))))
                .collect(),
        )
    }

    #[test]
    fn single_result_contract() {
        assert!(matches!(
            RowResult::new(vec![]).single(),
            Err(TesseraError::NoResult)
        ));
        assert!(matches!(
            RowResult::new(vec![scalar_row(&[("n", 1)]), scalar_row(&[("n", 2)])]).single(),
            Err(TesseraError::AmbiguousResult { rows: 2 })
        ));
        let row = RowResult::new(vec![scalar_row(&[("n", 7)])])
            .single()
            .expect("single row");
        assert_eq!(row.scalar("n").expect("scalar"), &Value::Int(7));
    }

    #[test]
    fn has_result_does_not_consume() {
        let result = RowResult::new(vec![scalar_row(&[("n", 1)])]);
        assert!(result.has_result());
        assert_eq!(result.len(), 1);
        assert!(result.single().is_ok());
    }

    #[test]
    fn unknown_column_lists_available_names() {
        let row = scalar_row(&[("a", 1), ("b", 2)]);
        let err = row.get("A").expect_err("case mismatch");
        match err {
            TesseraError::UnknownColumn { column, available } => {
                assert_eq!(column, "A");
                assert_eq!(available, vec!["a".to_owned(), "b".to_owned()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn single_column_shortcut() {
        let row = scalar_row(&[("n", 3)]);
        assert_eq!(row.value().expect("value").scalar(), Some(&Value::Int(3)));
        let wide = scalar_row(&[("a", 1), ("b", 2)]);
        assert!(matches!(
            wide.value(),
            Err(TesseraError::AmbiguousColumn(2))
        ));
    }
}
