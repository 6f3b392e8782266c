//! Rendered SQL and the dialect seam.
//!
//! Intents are dialect-neutral. A [`SqlRenderer`] turns them into
//! [`RenderedSql`]: SQL text with named parameter slots that are bound to
//! placeholders only at execution time, so one rendering serves every
//! execution of a prepared statement.

use tablemap_core::{BuildError, LinkTable, Schema, TableId, Value};

use crate::intent::{CreateIntent, DeleteIntent, QueryIntent, UpdateIntent};
use crate::params::ParamValues;
use crate::where_tree::WhereGroup;

/// Parameter holding the owner key in link-table statements.
pub const LINK_OWNER_PARAM: &str = "owner";
/// Parameter holding the target key in link-table inserts.
pub const LINK_TARGET_PARAM: &str = "target";
/// Parameter holding the list of owner keys in link-table selects.
pub const LINK_OWNERS_PARAM: &str = "owners";
/// Parameter holding the table name in existence checks.
pub const TABLE_NAME_PARAM: &str = "table";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    /// Named parameter slot
    Param(String),
}

/// SQL text with named parameter slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedSql {
    segments: Vec<Segment>,
}

impl RenderedSql {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_str(&mut self, text: &str) {
        if let Some(Segment::Text(last)) = self.segments.last_mut() {
            last.push_str(text);
        } else {
            self.segments.push(Segment::Text(text.to_string()));
        }
    }

    pub fn push_param(&mut self, name: impl Into<String>) {
        self.segments.push(Segment::Param(name.into()));
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Parameter names in order of appearance.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Text(_) => None,
        })
    }

    /// Text with `@name` in place of each parameter.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Param(name) => {
                    out.push('@');
                    out.push_str(name);
                }
            }
        }
        out
    }

    /// Bind named values to positional placeholders.
    ///
    /// A list value expands to `(p1, p2, ...)`; an empty list renders
    /// `('')`, so that `x IN ('')` matches nothing.
    pub fn bind(
        &self,
        values: &ParamValues,
        placeholder: impl Fn(usize) -> String,
    ) -> Result<BoundSql, BuildError> {
        let mut sql = String::new();
        let mut params = Vec::new();
        for segment in &self.segments {
            let name = match segment {
                Segment::Text(text) => {
                    sql.push_str(text);
                    continue;
                }
                Segment::Param(name) => name,
            };
            let value = values
                .get(name)
                .ok_or_else(|| BuildError::UnboundParameter { name: name.clone() })?;
            match value {
                Value::Array(items) if items.is_empty() => sql.push_str("('')"),
                Value::Array(items) => {
                    sql.push('(');
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            sql.push_str(", ");
                        }
                        params.push(item.clone());
                        sql.push_str(&placeholder(params.len()));
                    }
                    sql.push(')');
                }
                other => {
                    params.push(other.clone());
                    sql.push_str(&placeholder(params.len()));
                }
            }
        }
        Ok(BoundSql { sql, params })
    }
}

impl From<&str> for RenderedSql {
    fn from(text: &str) -> Self {
        let mut sql = Self::new();
        sql.push_str(text);
        sql
    }
}

impl From<String> for RenderedSql {
    fn from(text: String) -> Self {
        Self::from(text.as_str())
    }
}

/// SQL ready for a [`Connection`](tablemap_core::Connection).
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSql {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Statements of one insert: one per table of the chain, root first, then
/// one template per many-to-many member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCreate {
    /// Aligned with [`CreateIntent::statements`]
    pub inserts: Vec<RenderedSql>,
    /// Aligned with [`CreateIntent::links`]
    pub links: Vec<RenderedSql>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedUpdate {
    /// Selects the keys of the rows the update will touch
    pub select: RenderedSql,
    pub update: RenderedSql,
}

/// The dialect seam.
pub trait SqlRenderer: Send + Sync {
    /// Positional placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    fn quote_identifier(&self, name: &str) -> String;

    fn render_where(&self, group: &WhereGroup) -> RenderedSql;

    fn render_create(&self, schema: &Schema, intent: &CreateIntent) -> RenderedCreate;

    fn render_query(&self, schema: &Schema, intent: &QueryIntent) -> RenderedSql;

    fn render_update(&self, schema: &Schema, intent: &UpdateIntent) -> RenderedUpdate;

    fn render_delete(&self, schema: &Schema, intent: &DeleteIntent) -> RenderedSql;

    /// One link row from [`LINK_OWNER_PARAM`] and [`LINK_TARGET_PARAM`].
    fn render_link_insert(&self, link: &LinkTable) -> RenderedSql;

    /// Owner/target pairs of a link table for the owners in
    /// [`LINK_OWNERS_PARAM`].
    fn render_link_select(&self, link: &LinkTable) -> RenderedSql;

    /// Remove the link rows of the owner in [`LINK_OWNER_PARAM`].
    fn render_link_delete(&self, link: &LinkTable) -> RenderedSql;

    /// One row whose `count` column is non-zero when the table in
    /// [`TABLE_NAME_PARAM`] exists.
    fn render_table_exists(&self) -> RenderedSql;

    fn render_create_table(&self, schema: &Schema, table: TableId) -> Vec<String>;

    fn render_create_link_table(&self, schema: &Schema, link: &LinkTable) -> Vec<String>;

    fn bind(&self, sql: &RenderedSql, values: &ParamValues) -> Result<BoundSql, BuildError> {
        sql.bind(values, |i| self.placeholder(i))
    }
}
