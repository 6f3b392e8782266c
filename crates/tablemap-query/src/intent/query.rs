//! Select intents.

use tablemap_core::{BuildError, DISCRIMINATOR_MEMBER, Entity, Schema, TableId};

use super::Parameterized;
use crate::compiler::{CompileMode, CompiledWhere, translate};
use crate::expr::Expr;
use crate::params::ParamTable;
use crate::resolver::{JoinPlan, PathResolver};
use crate::where_tree::{FieldRef, WhereGroup};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: FieldRef,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedColumn {
    pub column: String,
    pub member: String,
}

/// Selected columns of one joined table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub alias: String,
    pub table: TableId,
    pub columns: Vec<ProjectedColumn>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryIntent {
    pub root: TableId,
    pub plan: JoinPlan,
    /// In join order
    pub projections: Vec<Projection>,
    pub filter: Option<WhereGroup>,
    pub params: ParamTable,
    pub order: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl QueryIntent {
    pub fn projection(&self, alias: &str) -> Option<&Projection> {
        self.projections.iter().find(|p| p.alias == alias)
    }

    /// Discriminator column of the entity loaded under `path`, if its
    /// hierarchy has one.
    pub fn discriminator(&self, schema: &Schema, path: &str) -> Option<FieldRef> {
        let entry = self.plan.path(path)?;
        let root = schema.root_of(entry.table);
        let alias = self.plan.alias_in_family(entry, root)?;
        schema
            .table(root)
            .discriminator_member()
            .map(|m| FieldRef::new(alias, m.storage_name.clone(), DISCRIMINATOR_MEMBER))
    }
}

impl Parameterized for QueryIntent {
    fn params(&self) -> &ParamTable {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamTable {
        &mut self.params
    }
}

/// Builds a [`QueryIntent`].
///
/// ```ignore
/// let intent = QueryBuilder::for_type::<Person>(&schema)?
///     .include("location")?
///     .filter(field("location.city").eq("lyon"))?
///     .order_by("name", Direction::Asc)?
///     .limit(10)
///     .build();
/// ```
#[derive(Debug)]
pub struct QueryBuilder<'s> {
    resolver: PathResolver<'s>,
    filter: Option<CompiledWhere>,
    order: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl<'s> QueryBuilder<'s> {
    pub fn new(schema: &'s Schema, table: TableId) -> Self {
        let mut resolver = PathResolver::new(schema, table);
        resolver.project_root();
        Self {
            resolver,
            filter: None,
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn for_type<E: Entity>(schema: &'s Schema) -> Result<Self, BuildError> {
        Ok(Self::new(schema, schema.id_of(E::TYPE_NAME)?))
    }

    /// Load the entities along a link path eagerly.
    pub fn include(mut self, path: &str) -> Result<Self, BuildError> {
        self.resolver.include(path)?;
        Ok(self)
    }

    /// Set the filter, inlining captured variables.
    pub fn filter(self, expr: Expr) -> Result<Self, BuildError> {
        self.set_filter(&expr, CompileMode::Literal)
    }

    /// Set the filter, turning captured variables into parameters.
    pub fn filter_with_parameters(self, expr: Expr) -> Result<Self, BuildError> {
        self.set_filter(&expr, CompileMode::Parameterized)
    }

    fn set_filter(mut self, expr: &Expr, mode: CompileMode) -> Result<Self, BuildError> {
        if self.filter.is_some() {
            return Err(BuildError::WhereAlreadySet);
        }
        self.filter = Some(translate(&mut self.resolver, expr, mode)?);
        Ok(self)
    }

    pub fn order_by(mut self, path: &str, direction: Direction) -> Result<Self, BuildError> {
        let field = self.resolver.field(path)?;
        self.order.push(OrderBy { field, direction });
        Ok(self)
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn build(self) -> QueryIntent {
        let schema = self.resolver.schema();
        let root = self.resolver.root_table();
        let plan = self.resolver.into_plan();
        let projections = plan
            .projected()
            .map(|joined| Projection {
                alias: joined.alias.clone(),
                table: joined.table,
                columns: schema
                    .table(joined.table)
                    .stored_members()
                    .map(|m| ProjectedColumn {
                        column: m.storage_name.clone(),
                        member: m.name.clone(),
                    })
                    .collect(),
            })
            .collect();
        let mut order = self.order;
        if order.is_empty() {
            // Rows come back in key order unless told otherwise.
            let key = plan.root().and_then(|joined| {
                schema.table(joined.table).key_member().map(|member| {
                    FieldRef::new(joined.alias.clone(), member.storage_name.clone(), member.name.clone())
                })
            });
            order.extend(key.map(|field| OrderBy {
                field,
                direction: Direction::Asc,
            }));
        }
        let (filter, params) = match self.filter {
            Some(compiled) => (Some(compiled.root), compiled.params),
            None => (None, ParamTable::new()),
        };

        tracing::trace!(
            type_name = %schema.table(root).type_name,
            tables = plan.tables.len(),
            filtered = filter.is_some(),
            "built query intent"
        );

        QueryIntent {
            root,
            plan,
            projections,
            filter,
            params,
            order,
            limit: self.limit,
            offset: self.offset,
        }
    }
}
