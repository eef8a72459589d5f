//! Query construction and execution.

use tracing::debug;

use crate::error::Result;
use crate::instance::{CompositeInstance, InstanceManager};
use crate::query::result::{CompositeRow, RowResult, RowValue};
use crate::session::{QueryParams, RawRow, RawValue};
use crate::transaction::Transaction;
use crate::value::Value;

/// The two supported query expression kinds: a free-form statement in the
/// backend's query language, or the name of a query pre-registered in the
/// schema.
#[derive(Clone, Debug)]
pub enum QueryExpression {
    /// A statement passed to the backend verbatim.
    Statement(String),
    /// A named query resolved through the registry at execution time.
    Named(String),
}

/// A parameterized query against the datastore.
///
/// Built by the manager facade; parameters accumulate on the builder and
/// `execute` maps the raw rows into composite rows.
pub struct Query {
    manager: InstanceManager,
    transaction: Transaction,
    expression: QueryExpression,
    parameters: QueryParams,
}

impl Query {
    pub(crate) fn new(
        manager: InstanceManager,
        transaction: Transaction,
        expression: QueryExpression,
    ) -> Self {
        Self {
            manager,
            transaction,
            expression,
            parameters: QueryParams::default(),
        }
    }

    /// Binds a scalar parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters
            .insert(name.into(), RawValue::Scalar(value.into()));
        self
    }

    /// Binds an instance parameter; the backend receives the underlying
    /// record reference.
    pub fn with_instance_parameter(
        mut self,
        name: impl Into<String>,
        instance: &CompositeInstance,
    ) -> Result<Self> {
        instance.ensure_alive()?;
        self.parameters
            .insert(name.into(), RawValue::Record(instance.record().clone()));
        Ok(self)
    }

    /// Executes the query and maps each row.
    ///
    /// Scalar columns pass through; record-reference columns resolve to the
    /// record's composite instance through the instance manager, so rows
    /// observe the same identity invariant as direct lookups.
    pub fn execute(&self) -> Result<RowResult> {
        self.transaction.ensure_active()?;
        let statement = match &self.expression {
            QueryExpression::Statement(statement) => statement.clone(),
            QueryExpression::Named(name) => {
                self.manager.registry().query(name)?.statement.clone()
            }
        };
        debug!(statement = %statement, "executing query");
        let raw = self.manager.session().execute(&statement, &self.parameters)?;
        let mut rows = Vec::with_capacity(raw.len());
        for row in raw {
            rows.push(self.map_row(row)?);
        }
        Ok(RowResult::new(rows))
    }

    fn map_row(&self, raw: RawRow) -> Result<CompositeRow> {
        let mut cells = Vec::with_capacity(raw.len());
        for (column, value) in raw {
            let mapped = match value {
                RawValue::Scalar(scalar) => RowValue::Scalar(scalar),
                RawValue::Record(record) => {
                    RowValue::Instance(self.manager.instance(&record)?)
                }
            };
            cells.push((column, mapped));
        }
        Ok(CompositeRow::new(cells))
    }
}
