//! Dialect-neutral CRUD intents.
//!
//! An intent is everything a renderer needs to print one statement: the
//! join plan, the projected columns, the compiled filter and the named
//! parameters. Builders consume themselves and return `Result<Self, _>`, so
//! a failed step leaves nothing half-built behind.

mod create;
mod delete;
mod query;
mod update;

pub use create::{
    ColumnSource, CreateIntent, InsertColumn, InsertStatement, KeyFetch, LinkInsert,
};
pub use delete::{DeleteBuilder, DeleteIntent};
pub use query::{Direction, OrderBy, ProjectedColumn, Projection, QueryBuilder, QueryIntent};
pub use update::{Assignment, UpdateBuilder, UpdateIntent};

use tablemap_core::{BuildError, Record, Schema, TableId, Value};

use crate::expr::Bindable;
use crate::params::{ParamTable, ParamValues};

/// Parameter holding the primary key in by-key statements.
pub const KEY_PARAM: &str = "key";

/// Intents whose filter can be rebound between executions.
pub trait Parameterized {
    fn params(&self) -> &ParamTable;

    fn params_mut(&mut self) -> &mut ParamTable;

    /// Bind a variable by name.
    fn set_variable(&mut self, name: &str, value: impl Into<Bindable>) -> Result<(), BuildError>
    where
        Self: Sized,
    {
        self.params_mut().set_variable(name, value)
    }

    /// Bind values positionally by type.
    fn prepare<I>(&mut self, values: I) -> Result<(), BuildError>
    where
        Self: Sized,
        I: IntoIterator,
        I::Item: Into<Bindable>,
    {
        self.params_mut().prepare(values)
    }

    /// Current filter parameter values, failing on unbound ones.
    fn param_values(&self) -> Result<ParamValues, BuildError> {
        self.params().require_values()
    }
}

/// Value of one written column, read from a record.
pub(crate) fn source_value(source: &ColumnSource, record: &Record) -> Option<Value> {
    match source {
        ColumnSource::Member(name) => Some(record.get(name).cloned().unwrap_or(Value::Null)),
        ColumnSource::Link { member, key_member } => {
            Some(record.link_id(member, key_member).unwrap_or(Value::Null))
        }
        ColumnSource::Discriminator(type_name) => Some(Value::Text(type_name.clone())),
        ColumnSource::GeneratedKey => None,
    }
}

/// Name of the key member of a link target.
pub(crate) fn target_key_name(schema: &Schema, target: Option<TableId>) -> String {
    target
        .and_then(|t| schema.key_member(t))
        .map_or_else(|| "id".to_string(), |k| k.name.clone())
}
