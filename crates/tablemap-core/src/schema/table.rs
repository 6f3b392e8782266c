//! Resolved storage shape of each mapped type.

use crate::schema::descriptor::ReferentialAction;
use crate::types::SqlType;
use regex::Regex;

/// Name of the synthesized discriminator member stored on hierarchy roots.
pub const DISCRIMINATOR_MEMBER: &str = "__type";

/// Identity of a table inside one [`Schema`](super::Schema).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub(crate) usize);

impl TableId {
    pub const fn index(self) -> usize {
        self.0
    }
}

/// How a member relates to other tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Plain stored value
    None,
    /// Foreign key to exactly one row
    Simple,
    /// Many-to-many through an intermediate link table
    Multiple,
    /// Inheritance link from a subtype table to its parent's primary key
    Parent,
}

/// One mapped member of a table.
#[derive(Debug, Clone)]
pub struct TableMemberInfo {
    pub name: String,
    pub storage_name: String,
    pub sql_type: SqlType,
    pub link: LinkKind,
    /// Target of `Simple`/`Multiple` links, parent table of `Parent` links
    pub linked_table: Option<TableId>,
    pub nullable: bool,
    pub auto_generated: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub max_length: Option<u32>,
    pub pattern: Option<Regex>,
    pub on_delete: Option<ReferentialAction>,
    pub is_discriminator: bool,
}

impl TableMemberInfo {
    /// Does this member occupy a column of its own table?
    pub fn is_stored(&self) -> bool {
        self.link != LinkKind::Multiple
    }

    /// Is this member written from the entity's own data on insert/update?
    pub fn is_writable(&self) -> bool {
        self.is_stored() && !self.auto_generated && !self.is_discriminator
    }
}

/// Storage description of one mapped type.
///
/// Only members declared on this type are listed. Inherited members live on
/// the ancestor tables reachable through `parent`.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub id: TableId,
    pub type_name: String,
    pub storage_name: String,
    pub is_abstract: bool,
    /// Indexes into `members` of the primary-key members
    pub primary_key: Vec<usize>,
    pub members: Vec<TableMemberInfo>,
    pub parent: Option<TableId>,
    pub children: Vec<TableId>,
    /// Index into `members` of the discriminator, set on hierarchy roots
    pub discriminator: Option<usize>,
}

impl TableInfo {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Find a member declared on this table.
    pub fn member(&self, name: &str) -> Option<&TableMemberInfo> {
        self.members.iter().find(|m| m.name == name)
    }

    /// The key member of this table. On subtype tables this is the
    /// `Parent` link holding the inherited key.
    pub fn key_member(&self) -> Option<&TableMemberInfo> {
        self.primary_key.first().and_then(|&i| self.members.get(i))
    }

    /// The inheritance link of a subtype table.
    pub fn parent_member(&self) -> Option<&TableMemberInfo> {
        self.members.iter().find(|m| m.link == LinkKind::Parent)
    }

    pub fn discriminator_member(&self) -> Option<&TableMemberInfo> {
        self.discriminator.and_then(|i| self.members.get(i))
    }

    /// Members that occupy a column of this table, in declaration order.
    pub fn stored_members(&self) -> impl Iterator<Item = &TableMemberInfo> {
        self.members.iter().filter(|m| m.is_stored())
    }
}

/// Intermediate table of a many-to-many member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTable {
    pub storage_name: String,
    pub owner: TableId,
    pub member: String,
    pub owner_column: String,
    pub owner_type: SqlType,
    pub target: TableId,
    pub target_column: String,
    pub target_type: SqlType,
}
