//! Schema registration and lookup.
//!
//! A [`SchemaBuilder`] collects descriptors and validates them as a whole in
//! [`SchemaBuilder::build`]. The resulting [`Schema`] is immutable: table
//! infos are built once, shared behind `Arc`, and every lookup returns the
//! same instance.

use crate::entity::Entity;
use crate::error::BuildError;
use crate::schema::descriptor::{EntityDescriptor, LinkDescriptor, MemberDescriptor, ReferentialAction};
use crate::schema::table::{
    DISCRIMINATOR_MEMBER, LinkKind, LinkTable, TableId, TableInfo, TableMemberInfo,
};
use crate::types::SqlType;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Collects entity descriptors before validation.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    descriptors: Vec<EntityDescriptor>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type by its descriptor.
    pub fn register<E: Entity>(self) -> Self {
        self.register_descriptor(E::descriptor())
    }

    pub fn register_descriptor(mut self, descriptor: EntityDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Validate every descriptor and build the table infos.
    ///
    /// Link targets, parents and keys are all checked here, so an invalid
    /// mapping never reaches query construction.
    #[tracing::instrument(level = "debug", skip(self), fields(types = self.descriptors.len()))]
    pub fn build(self) -> Result<Schema, BuildError> {
        let descriptors = self.descriptors;
        let count = descriptors.len();

        let mut by_name: HashMap<String, TableId> = HashMap::with_capacity(count);
        for (i, desc) in descriptors.iter().enumerate() {
            if by_name
                .insert(desc.type_name.to_string(), TableId(i))
                .is_some()
            {
                return Err(BuildError::DuplicateType {
                    type_name: desc.type_name.to_string(),
                });
            }
        }

        let mut parents: Vec<Option<TableId>> = Vec::with_capacity(count);
        for desc in &descriptors {
            let parent = match desc.parent {
                Some(parent) => Some(*by_name.get(parent).ok_or_else(|| {
                    BuildError::UnknownParent {
                        type_name: desc.type_name.to_string(),
                        parent: parent.to_string(),
                    }
                })?),
                None => None,
            };
            parents.push(parent);
        }

        let mut roots = Vec::with_capacity(count);
        for (i, desc) in descriptors.iter().enumerate() {
            let mut current = i;
            let mut steps = 0;
            while let Some(parent) = parents[current] {
                current = parent.0;
                steps += 1;
                if steps > count {
                    return Err(BuildError::CyclicInheritance {
                        type_name: desc.type_name.to_string(),
                    });
                }
            }
            roots.push(current);
        }

        for (i, desc) in descriptors.iter().enumerate() {
            if parents[i].is_none() {
                if !desc.members.iter().any(|m| m.primary_key) {
                    return Err(BuildError::MissingPrimaryKey {
                        type_name: desc.type_name.to_string(),
                    });
                }
            } else if let Some(member) = desc.members.iter().find(|m| m.primary_key) {
                return Err(BuildError::SubtypePrimaryKey {
                    type_name: desc.type_name.to_string(),
                    member: member.name.to_string(),
                });
            }
        }

        for (i, desc) in descriptors.iter().enumerate() {
            let mut seen = HashSet::new();
            let mut current = Some(TableId(i));
            while let Some(id) = current {
                for member in &descriptors[id.0].members {
                    if member.name == DISCRIMINATOR_MEMBER || !seen.insert(member.name) {
                        return Err(BuildError::DuplicateMember {
                            type_name: desc.type_name.to_string(),
                            member: member.name.to_string(),
                        });
                    }
                }
                current = parents[id.0];
            }

            for member in &desc.members {
                if let LinkDescriptor::Simple(target) | LinkDescriptor::Multiple(target) =
                    member.link
                {
                    if !by_name.contains_key(target) {
                        return Err(BuildError::UnmappedLinkTarget {
                            type_name: desc.type_name.to_string(),
                            member: member.name.to_string(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }

        let root_key = |index: usize| root_key_of(&descriptors, &roots, index);

        let mut tables = Vec::with_capacity(count);
        for (i, desc) in descriptors.iter().enumerate() {
            let id = TableId(i);
            let mut members = Vec::with_capacity(desc.members.len() + 1);
            let mut primary_key = Vec::new();

            if let Some(parent) = parents[i] {
                let key = root_key(i);
                primary_key.push(members.len());
                members.push(TableMemberInfo {
                    name: key.name.to_string(),
                    storage_name: key.column.unwrap_or(key.name).to_string(),
                    sql_type: key.sql_type,
                    link: LinkKind::Parent,
                    linked_table: Some(parent),
                    nullable: false,
                    auto_generated: false,
                    primary_key: true,
                    unique: false,
                    max_length: None,
                    pattern: None,
                    on_delete: Some(ReferentialAction::Cascade),
                    is_discriminator: false,
                });
            }

            for member in &desc.members {
                let (link, linked_table, sql_type, storage_name) = match member.link {
                    LinkDescriptor::None => (
                        LinkKind::None,
                        None,
                        member.sql_type,
                        member.column.unwrap_or(member.name).to_string(),
                    ),
                    LinkDescriptor::Simple(target) => {
                        let target = by_name[target];
                        (
                            LinkKind::Simple,
                            Some(target),
                            root_key(target.0).sql_type,
                            member
                                .column
                                .map_or_else(|| format!("{}_id", member.name), str::to_string),
                        )
                    }
                    LinkDescriptor::Multiple(target) => {
                        let target = by_name[target];
                        (
                            LinkKind::Multiple,
                            Some(target),
                            root_key(target.0).sql_type,
                            member.column.unwrap_or(member.name).to_string(),
                        )
                    }
                };

                let pattern = member
                    .pattern
                    .map(|p| {
                        Regex::new(p).map_err(|e| BuildError::InvalidPattern {
                            type_name: desc.type_name.to_string(),
                            member: member.name.to_string(),
                            message: e.to_string(),
                        })
                    })
                    .transpose()?;

                if member.primary_key {
                    primary_key.push(members.len());
                }
                members.push(TableMemberInfo {
                    name: member.name.to_string(),
                    storage_name,
                    sql_type,
                    link,
                    linked_table,
                    nullable: member.nullable,
                    auto_generated: member.auto_increment,
                    primary_key: member.primary_key,
                    unique: member.unique,
                    max_length: member.max_length,
                    pattern,
                    on_delete: member.on_delete,
                    is_discriminator: false,
                });
            }

            let children: Vec<TableId> = (0..count)
                .filter(|&j| parents[j] == Some(id))
                .map(TableId)
                .collect();

            let discriminator = if parents[i].is_none() && !children.is_empty() {
                members.push(TableMemberInfo {
                    name: DISCRIMINATOR_MEMBER.to_string(),
                    storage_name: DISCRIMINATOR_MEMBER.to_string(),
                    sql_type: SqlType::VarChar(255),
                    link: LinkKind::None,
                    linked_table: None,
                    nullable: false,
                    auto_generated: false,
                    primary_key: false,
                    unique: false,
                    max_length: Some(255),
                    pattern: None,
                    on_delete: None,
                    is_discriminator: true,
                });
                Some(members.len() - 1)
            } else {
                None
            };

            tracing::trace!(
                type_name = desc.type_name,
                storage = desc.storage_name,
                members = members.len(),
                children = children.len(),
                "built table info"
            );

            tables.push(TableInfo {
                id,
                type_name: desc.type_name.to_string(),
                storage_name: desc.storage_name.to_string(),
                is_abstract: desc.is_abstract,
                primary_key,
                members,
                parent: parents[i],
                children,
                discriminator,
            });
        }

        let mut link_tables = Vec::new();
        for table in &tables {
            for member in table.members.iter().filter(|m| m.link == LinkKind::Multiple) {
                let Some(target) = member.linked_table else {
                    continue;
                };
                let target_info = &tables[target.0];
                let owner_key = root_key(table.id.0);
                let target_column = if target_info.storage_name == table.storage_name {
                    format!("{}_ref_id", target_info.storage_name)
                } else {
                    format!("{}_id", target_info.storage_name)
                };
                link_tables.push(LinkTable {
                    storage_name: format!("{}_{}", table.storage_name, member.storage_name),
                    owner: table.id,
                    member: member.name.clone(),
                    owner_column: format!("{}_id", table.storage_name),
                    owner_type: owner_key.sql_type,
                    target,
                    target_column,
                    target_type: member.sql_type,
                });
            }
        }

        tracing::debug!(
            tables = tables.len(),
            link_tables = link_tables.len(),
            "schema built"
        );

        Ok(Schema {
            tables: tables.into_iter().map(Arc::new).collect(),
            by_name,
            link_tables,
        })
    }
}

/// Declared key of the hierarchy root of `descriptors[index]`. Every root
/// is checked to declare one before this is called.
fn root_key_of<'a>(
    descriptors: &'a [EntityDescriptor],
    roots: &[usize],
    index: usize,
) -> &'a MemberDescriptor {
    let root = &descriptors[roots[index]];
    root.members
        .iter()
        .find(|m| m.primary_key)
        .unwrap_or(&root.members[0])
}

/// The immutable registry of every mapped type.
///
/// `Schema` is `Send + Sync` and is shared behind an `Arc` by the engine.
/// [`TableId`]s are only meaningful for the schema that issued them.
#[derive(Debug)]
pub struct Schema {
    tables: Vec<Arc<TableInfo>>,
    by_name: HashMap<String, TableId>,
    link_tables: Vec<LinkTable>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Iterate all tables in registration order.
    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableInfo>> {
        self.tables.iter()
    }

    /// Get a table by id.
    pub fn table(&self, id: TableId) -> &Arc<TableInfo> {
        &self.tables[id.0]
    }

    /// Get the table info of a type by name. Idempotent: every call returns
    /// the same shared instance.
    pub fn get_table_info(&self, type_name: &str) -> Result<&Arc<TableInfo>, BuildError> {
        self.id_of(type_name).map(|id| self.table(id))
    }

    /// Get the table info of an entity type.
    pub fn table_of<E: Entity>(&self) -> Result<&Arc<TableInfo>, BuildError> {
        self.get_table_info(E::TYPE_NAME)
    }

    pub fn id_of(&self, type_name: &str) -> Result<TableId, BuildError> {
        self.by_name
            .get(type_name)
            .copied()
            .ok_or_else(|| BuildError::UnknownType {
                type_name: type_name.to_string(),
            })
    }

    /// Find a member on a table or any of its ancestors, returning the
    /// table that declares it.
    pub fn find_member(&self, id: TableId, name: &str) -> Option<(TableId, &TableMemberInfo)> {
        let mut current = Some(id);
        while let Some(table_id) = current {
            let table = self.table(table_id);
            if let Some(member) = table.member(name) {
                return Some((table_id, member));
            }
            current = table.parent;
        }
        None
    }

    /// Link kind of a member reachable from `id`.
    pub fn link_kind(&self, id: TableId, member: &str) -> Result<LinkKind, BuildError> {
        self.find_member(id, member)
            .map(|(_, m)| m.link)
            .ok_or_else(|| BuildError::UnknownMember {
                type_name: self.table(id).type_name.clone(),
                path: member.to_string(),
            })
    }

    /// Ancestors of a table, nearest parent first, root last.
    pub fn ancestors(&self, id: TableId) -> Vec<TableId> {
        let mut out = Vec::new();
        let mut current = self.table(id).parent;
        while let Some(parent) = current {
            out.push(parent);
            current = self.table(parent).parent;
        }
        out
    }

    /// Inheritance chain from the root down to `id` inclusive.
    pub fn chain(&self, id: TableId) -> Vec<TableId> {
        let mut out = self.ancestors(id);
        out.reverse();
        out.push(id);
        out
    }

    /// Every descendant of a table in depth-first pre-order.
    pub fn descendants(&self, id: TableId) -> Vec<TableId> {
        let mut out = Vec::new();
        let mut stack: Vec<TableId> = self.table(id).children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.table(next).children.iter().rev().copied());
        }
        out
    }

    pub fn root_of(&self, id: TableId) -> TableId {
        self.ancestors(id).last().copied().unwrap_or(id)
    }

    /// Is `id` the table `of` or one of its descendants?
    pub fn is_same_or_descendant(&self, id: TableId, of: TableId) -> bool {
        id == of || self.ancestors(id).contains(&of)
    }

    /// The declared primary-key member of the hierarchy root of `id`.
    pub fn key_member(&self, id: TableId) -> Option<&TableMemberInfo> {
        self.table(self.root_of(id)).key_member()
    }

    /// Every member of a concrete type, root-first, as seen by the entity
    /// (inheritance links excluded).
    pub fn chain_members(&self, id: TableId) -> Vec<(TableId, &TableMemberInfo)> {
        self.chain(id)
            .into_iter()
            .flat_map(|table_id| {
                self.table(table_id)
                    .members
                    .iter()
                    .filter(|m| m.link != LinkKind::Parent)
                    .map(move |m| (table_id, m))
            })
            .collect()
    }

    pub fn link_tables(&self) -> &[LinkTable] {
        &self.link_tables
    }

    /// The intermediate table of a many-to-many member.
    pub fn link_table(&self, owner: TableId, member: &str) -> Option<(usize, &LinkTable)> {
        self.link_tables
            .iter()
            .enumerate()
            .find(|(_, link)| link.owner == owner && link.member == member)
    }
}
