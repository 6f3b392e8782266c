//! Predicate compilation, join planning and CRUD intents for tablemap.
//!
//! `tablemap-query` sits between the schema model and a SQL dialect:
//!
//! - [`expr`] is the typed predicate API (`field("name").eq("ann")`).
//! - [`resolver`] turns member paths into aliased columns and joins,
//!   loading each entity's whole inheritance family.
//! - [`compiler`] lowers predicates into the dialect-neutral [`where_tree`].
//! - [`params`] tracks named parameters and rebinding of variables.
//! - [`intent`] holds the create/query/update/delete intents and builders.
//! - [`render`] defines [`SqlRenderer`], the seam a dialect implements.
//! - [`cache`] shares rendered statements per type and operation.

pub mod cache;
pub mod compiler;
pub mod expr;
pub mod intent;
pub mod params;
pub mod render;
pub mod resolver;
pub mod where_tree;

pub use cache::{StatementCache, cache_key};
pub use compiler::{CompileMode, CompiledWhere, translate};
pub use expr::{
    BinaryOp, BindType, Bindable, Expr, Method, Variable, entity_var, field, list, lit, param,
    param_of, var,
};
pub use intent::{
    Assignment, ColumnSource, CreateIntent, DeleteBuilder, DeleteIntent, Direction, InsertColumn,
    InsertStatement, KEY_PARAM, KeyFetch, LinkInsert, OrderBy, Parameterized, ProjectedColumn,
    Projection, QueryBuilder, QueryIntent, UpdateBuilder, UpdateIntent,
};
pub use params::{ParamTable, ParamValues, ParamsInfo, VariableSlot};
pub use render::{
    BoundSql, LINK_OWNER_PARAM, LINK_OWNERS_PARAM, LINK_TARGET_PARAM, RenderedCreate,
    RenderedSql, RenderedUpdate, Segment, SqlRenderer, TABLE_NAME_PARAM,
};
pub use resolver::{JoinKind, JoinPlan, JoinedTable, PathEntry, PathResolver, ResolvedField};
pub use where_tree::{
    Constant, ConstantKind, FieldRef, LikeMode, WhereGroup, WhereNode, WhereOperator,
};

#[cfg(test)]
pub(crate) mod test_support {
    use tablemap_core::{EntityDescriptor, MemberDescriptor, Schema, SqlType};

    /// People with locations and friends, and an abstract `Animal` root with
    /// `Cat` and `Dog` subtypes owned by people.
    pub(crate) fn schema() -> Schema {
        Schema::builder()
            .register_descriptor(
                EntityDescriptor::new("Country", "country")
                    .member(MemberDescriptor::key("id"))
                    .member(MemberDescriptor::of::<String>("name")),
            )
            .register_descriptor(
                EntityDescriptor::new("PersonLocation", "location")
                    .member(MemberDescriptor::key("id"))
                    .member(MemberDescriptor::of::<String>("city"))
                    .member(MemberDescriptor::link("country", "Country")),
            )
            .register_descriptor(
                EntityDescriptor::new("Person", "person")
                    .member(MemberDescriptor::key("id"))
                    .member(MemberDescriptor::of::<String>("name"))
                    .member(MemberDescriptor::link("location", "PersonLocation"))
                    .member(MemberDescriptor::link("previous", "PersonLocation").nullable(true))
                    .member(MemberDescriptor::many("friends", "Person")),
            )
            .register_descriptor(
                EntityDescriptor::new("Animal", "animal")
                    .abstract_type()
                    .member(MemberDescriptor::key("id"))
                    .member(MemberDescriptor::of::<String>("name"))
                    .member(MemberDescriptor::link("owner", "Person").nullable(true)),
            )
            .register_descriptor(
                EntityDescriptor::new("Cat", "cat")
                    .extends("Animal")
                    .member(MemberDescriptor::new("color", SqlType::VarChar(32)).nullable(true)),
            )
            .register_descriptor(
                EntityDescriptor::new("Dog", "dog")
                    .extends("Animal")
                    .member(MemberDescriptor::of::<bool>("trained")),
            )
            .build()
            .expect("test schema builds")
    }
}
