//! Update intents.
//!
//! An update may write columns of several tables of an inheritance chain at
//! once. Alongside the update itself the intent carries a companion select
//! of the touched keys, run first so the engine can report how many (and
//! which) entities were changed.

use tablemap_core::{BuildError, Entity, LinkKind, Record, Schema, TableId};

use super::{KEY_PARAM, LinkInsert, Parameterized, source_value, target_key_name};
use crate::compiler::{CompileMode, CompiledWhere, translate};
use crate::expr::{BindType, Expr, field, param_of};
use crate::intent::ColumnSource;
use crate::params::{ParamTable, ParamValues};
use crate::resolver::{JoinPlan, PathResolver};
use crate::where_tree::{FieldRef, WhereGroup};

/// One `SET alias.column = @param`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub field: FieldRef,
    pub table: TableId,
    /// Parameter name, `set_{alias}_{column}`
    pub param: String,
    pub source: ColumnSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateIntent {
    pub root: TableId,
    pub plan: JoinPlan,
    pub assignments: Vec<Assignment>,
    /// Key column of the root entity, selected by the companion query
    pub key: FieldRef,
    pub filter: Option<WhereGroup>,
    pub params: ParamTable,
    /// Many-to-many members rewritten by per-entity updates
    pub links: Vec<LinkInsert>,
}

impl UpdateIntent {
    /// Build the per-entity update of every writable member, matched by
    /// primary key through the [`KEY_PARAM`] parameter.
    pub fn by_primary_key(schema: &Schema, table: TableId) -> Result<Self, BuildError> {
        let key = schema
            .key_member(table)
            .ok_or_else(|| BuildError::MissingPrimaryKey {
                type_name: schema.table(table).type_name.clone(),
            })?;
        UpdateBuilder::new(schema, table)
            .all_fields()
            .filter_with_parameters(field(key.name.clone()).eq(param_of(KEY_PARAM, BindType::Any)))?
            .build()
    }

    /// Assignment values read from a record.
    pub fn row_values(&self, record: &Record) -> ParamValues {
        self.assignments
            .iter()
            .filter_map(|a| source_value(&a.source, record).map(|v| (a.param.clone(), v)))
            .collect()
    }
}

impl Parameterized for UpdateIntent {
    fn params(&self) -> &ParamTable {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamTable {
        &mut self.params
    }
}

/// Builds an [`UpdateIntent`].
#[derive(Debug)]
pub struct UpdateBuilder<'s> {
    resolver: PathResolver<'s>,
    assignments: Vec<Assignment>,
    filter: Option<CompiledWhere>,
    all_fields: bool,
}

impl<'s> UpdateBuilder<'s> {
    pub fn new(schema: &'s Schema, table: TableId) -> Self {
        Self {
            resolver: PathResolver::new(schema, table),
            assignments: Vec::new(),
            filter: None,
            all_fields: false,
        }
    }

    pub fn for_type<E: Entity>(schema: &'s Schema) -> Result<Self, BuildError> {
        Ok(Self::new(schema, schema.id_of(E::TYPE_NAME)?))
    }

    /// Write one member of the root entity.
    pub fn field(mut self, name: &str) -> Result<Self, BuildError> {
        if name.contains('.') {
            return Err(BuildError::unsupported(format!(
                "'{name}' belongs to a linked entity, update it directly"
            )));
        }
        let resolved = self.resolver.resolve(name)?;
        let member = &resolved.member;
        if !member.is_writable() || member.primary_key || member.link == LinkKind::Parent {
            return Err(BuildError::unsupported(format!(
                "member '{name}' cannot be updated"
            )));
        }
        let source = match member.link {
            LinkKind::Simple => ColumnSource::Link {
                member: member.name.clone(),
                key_member: target_key_name(self.resolver.schema(), member.linked_table),
            },
            _ => ColumnSource::Member(member.name.clone()),
        };
        self.push(resolved.field, resolved.table, source);
        Ok(self)
    }

    /// Write every writable member of the root entity's chain.
    pub fn all_fields(mut self) -> Self {
        self.all_fields = true;
        let schema = self.resolver.schema();
        let root = self.resolver.root_table();
        let Some(entry) = self.resolver.plan().paths.first().cloned() else {
            return self;
        };
        for table in schema.chain(root) {
            let Some(alias) = self.resolver.plan().alias_in_family(&entry, table) else {
                continue;
            };
            let alias = alias.to_string();
            for m in &schema.table(table).members {
                if !m.is_writable() || m.primary_key || m.link == LinkKind::Parent {
                    continue;
                }
                let source = match m.link {
                    LinkKind::Simple => ColumnSource::Link {
                        member: m.name.clone(),
                        key_member: target_key_name(schema, m.linked_table),
                    },
                    _ => ColumnSource::Member(m.name.clone()),
                };
                self.push(
                    FieldRef::new(alias.clone(), m.storage_name.clone(), m.name.clone()),
                    table,
                    source,
                );
            }
        }
        self
    }

    fn push(&mut self, field: FieldRef, table: TableId, source: ColumnSource) {
        if self.assignments.iter().any(|a| a.field == field) {
            return;
        }
        let param = format!("set_{}_{}", field.alias, field.column);
        self.assignments.push(Assignment {
            field,
            table,
            param,
            source,
        });
    }

    pub fn filter(self, expr: Expr) -> Result<Self, BuildError> {
        self.set_filter(&expr, CompileMode::Literal)
    }

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

    pub fn build(self) -> Result<UpdateIntent, BuildError> {
        if self.assignments.is_empty() {
            return Err(BuildError::unsupported("update writes no members"));
        }
        let schema = self.resolver.schema();
        let root = self.resolver.root_table();
        let root_alias = self.resolver.root_alias().to_string();
        let key = schema
            .table(root)
            .key_member()
            .ok_or_else(|| BuildError::MissingPrimaryKey {
                type_name: schema.table(root).type_name.clone(),
            })?;
        let key = FieldRef::new(root_alias, key.storage_name.clone(), key.name.clone());

        let links = if self.all_fields {
            schema
                .chain_members(root)
                .into_iter()
                .filter(|(_, m)| m.link == LinkKind::Multiple)
                .filter_map(|(owner, m)| {
                    schema.link_table(owner, &m.name).map(|(link, _)| LinkInsert {
                        link,
                        member: m.name.clone(),
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        let (filter, params) = match self.filter {
            Some(compiled) => (Some(compiled.root), compiled.params),
            None => (None, ParamTable::new()),
        };

        tracing::trace!(
            type_name = %schema.table(root).type_name,
            assignments = self.assignments.len(),
            "built update intent"
        );

        Ok(UpdateIntent {
            root,
            plan: self.resolver.into_plan(),
            assignments: self.assignments,
            key,
            filter,
            params,
            links,
        })
    }
}
