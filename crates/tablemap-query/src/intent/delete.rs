//! Delete intents.
//!
//! Deleting an entity removes its row from every table of its family: the
//! ancestor rows holding inherited members and, when deleting through a base
//! type, the rows of whichever subtype each match actually is. The statement
//! only names the hierarchy root table; subtype and link-table rows go with
//! it through their cascading foreign keys.

use tablemap_core::{BuildError, Entity, Schema, TableId};

use super::{KEY_PARAM, Parameterized};
use crate::compiler::{CompileMode, CompiledWhere, translate};
use crate::expr::{BindType, Expr, field, param_of};
use crate::params::ParamTable;
use crate::resolver::{JoinPlan, PathResolver};
use crate::where_tree::WhereGroup;

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteIntent {
    pub root: TableId,
    pub plan: JoinPlan,
    /// Aliases of the tables rows are removed from
    pub targets: Vec<String>,
    /// Alias of the hierarchy root table, the one the statement deletes from
    pub root_alias: String,
    pub filter: Option<WhereGroup>,
    pub params: ParamTable,
}

impl DeleteIntent {
    /// Delete one entity matched by primary key through [`KEY_PARAM`].
    pub fn by_primary_key(schema: &Schema, table: TableId) -> Result<Self, BuildError> {
        let key = schema
            .key_member(table)
            .ok_or_else(|| BuildError::MissingPrimaryKey {
                type_name: schema.table(table).type_name.clone(),
            })?;
        Ok(DeleteBuilder::new(schema, table)
            .filter_with_parameters(field(key.name.clone()).eq(param_of(KEY_PARAM, BindType::Any)))?
            .build())
    }
}

impl Parameterized for DeleteIntent {
    fn params(&self) -> &ParamTable {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamTable {
        &mut self.params
    }
}

/// Builds a [`DeleteIntent`]. Without a filter every entity of the type is
/// deleted.
#[derive(Debug)]
pub struct DeleteBuilder<'s> {
    resolver: PathResolver<'s>,
    filter: Option<CompiledWhere>,
}

impl<'s> DeleteBuilder<'s> {
    pub fn new(schema: &'s Schema, table: TableId) -> Self {
        Self {
            resolver: PathResolver::new(schema, table),
            filter: None,
        }
    }

    pub fn for_type<E: Entity>(schema: &'s Schema) -> Result<Self, BuildError> {
        Ok(Self::new(schema, schema.id_of(E::TYPE_NAME)?))
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

    pub fn build(self) -> DeleteIntent {
        let schema = self.resolver.schema();
        let root = self.resolver.root_table();
        let plan = self.resolver.into_plan();
        let targets: Vec<String> = plan.root_family().into_iter().map(str::to_string).collect();
        let hierarchy_root = schema.root_of(root);
        let root_alias = plan
            .paths
            .first()
            .and_then(|entry| plan.alias_in_family(entry, hierarchy_root))
            .map(str::to_string)
            .or_else(|| targets.first().cloned())
            .unwrap_or_default();
        let (filter, params) = match self.filter {
            Some(compiled) => (Some(compiled.root), compiled.params),
            None => (None, ParamTable::new()),
        };
        tracing::trace!(targets = ?targets, root_alias = %root_alias, "built delete intent");
        DeleteIntent {
            root,
            plan,
            targets,
            root_alias,
            filter,
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::schema;
    use tablemap_core::Value;

    #[test]
    fn deleting_a_base_type_targets_subtypes() {
        let schema = schema();
        let animal = schema.id_of("Animal").unwrap();
        let intent = DeleteBuilder::new(&schema, animal)
            .filter(field("name").eq("felix"))
            .unwrap()
            .build();
        assert_eq!(intent.targets, vec!["A", "C", "D"]);
        assert_eq!(intent.root_alias, "A");
    }

    #[test]
    fn deleting_a_subtype_targets_ancestors() {
        let schema = schema();
        let cat = schema.id_of("Cat").unwrap();
        let mut intent = DeleteIntent::by_primary_key(&schema, cat).unwrap();
        assert_eq!(intent.targets, vec!["C", "A"]);
        assert_eq!(intent.root_alias, "A");
        intent.set_variable(KEY_PARAM, 4_i64).unwrap();
        assert_eq!(intent.param_values().unwrap()[KEY_PARAM], Value::BigInt(4));
    }

    #[test]
    fn filters_joining_links_do_not_add_targets() {
        let schema = schema();
        let cat = schema.id_of("Cat").unwrap();
        let intent = DeleteBuilder::new(&schema, cat)
            .filter(field("owner.name").eq("ann"))
            .unwrap()
            .build();
        assert_eq!(intent.targets, vec!["C", "A"]);
        assert_eq!(intent.plan.tables.len(), 3);
    }
}
