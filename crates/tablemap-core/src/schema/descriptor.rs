//! Already-resolved schema metadata supplied per entity type.
//!
//! Descriptors are what a schema source (derive output, hand-written impls,
//! configuration) hands to the registry. They name types by string so that a
//! descriptor never needs the linked Rust type to be in scope.

use crate::types::{SqlType, TypeInfo};

/// Referential action for foreign key constraints (ON DELETE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferentialAction {
    /// Raise an error if any references exist.
    #[default]
    NoAction,
    /// Same as NO ACTION.
    Restrict,
    /// Delete referencing rows.
    Cascade,
    /// Set referencing columns to NULL.
    SetNull,
}

impl ReferentialAction {
    /// Get the SQL representation of this action.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
        }
    }
}

/// Declared link of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDescriptor {
    /// Plain stored value.
    None,
    /// Foreign key to one row of the named type.
    Simple(&'static str),
    /// Many-to-many link to rows of the named type.
    Multiple(&'static str),
}

/// Metadata about one declared member.
#[derive(Debug, Clone)]
pub struct MemberDescriptor {
    /// Logical member name
    pub name: &'static str,
    /// Storage column override
    pub column: Option<&'static str>,
    /// Declared SQL type. For `Simple` links this is replaced by the
    /// target's primary key type.
    pub sql_type: SqlType,
    pub link: LinkDescriptor,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    /// Maximum character length checked before writes
    pub max_length: Option<u32>,
    /// Regular expression checked before writes
    pub pattern: Option<&'static str>,
    /// ON DELETE action of a `Simple` link
    pub on_delete: Option<ReferentialAction>,
}

impl MemberDescriptor {
    /// Create a plain member with minimal required data.
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            column: None,
            sql_type,
            link: LinkDescriptor::None,
            nullable: false,
            primary_key: false,
            auto_increment: false,
            unique: false,
            max_length: None,
            pattern: None,
            on_delete: None,
        }
    }

    /// Create a plain member typed from a Rust type.
    ///
    /// `Option<T>` members are nullable.
    pub const fn of<T: TypeInfo>(name: &'static str) -> Self {
        Self::new(name, T::SQL_TYPE).nullable(T::NULLABLE)
    }

    /// Create a foreign-key member linking to `target`.
    pub const fn link(name: &'static str, target: &'static str) -> Self {
        let mut member = Self::new(name, SqlType::BigInt);
        member.link = LinkDescriptor::Simple(target);
        member
    }

    /// Create a many-to-many member linking to `target`.
    pub const fn many(name: &'static str, target: &'static str) -> Self {
        let mut member = Self::new(name, SqlType::BigInt);
        member.link = LinkDescriptor::Multiple(target);
        member.nullable = true;
        member
    }

    /// Create an auto-generated integer primary key.
    pub const fn key(name: &'static str) -> Self {
        Self::new(name, SqlType::BigInt)
            .primary_key(true)
            .auto_increment(true)
    }

    /// Set the storage column name.
    pub const fn column(mut self, name: &'static str) -> Self {
        self.column = Some(name);
        self
    }

    /// Set nullable flag.
    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Set primary key flag.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Set auto-increment flag.
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    /// Set unique flag.
    pub const fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Set the maximum character length.
    pub const fn max_length(mut self, value: u32) -> Self {
        self.max_length = Some(value);
        self
    }

    /// Set the validation pattern.
    pub const fn pattern(mut self, regex: &'static str) -> Self {
        self.pattern = Some(regex);
        self
    }

    /// Set ON DELETE action for a foreign key.
    pub const fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }
}

/// Storage description of one entity type.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub type_name: &'static str,
    pub storage_name: &'static str,
    /// Mapped supertype, stored in its own joined table
    pub parent: Option<&'static str>,
    /// Abstract types have a table but are never stored on their own
    pub is_abstract: bool,
    /// Members declared on this type only, in declaration order
    pub members: Vec<MemberDescriptor>,
}

impl EntityDescriptor {
    pub fn new(type_name: &'static str, storage_name: &'static str) -> Self {
        Self {
            type_name,
            storage_name,
            parent: None,
            is_abstract: false,
            members: Vec::new(),
        }
    }

    /// Declare the mapped supertype.
    pub fn extends(mut self, parent: &'static str) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Mark the type abstract.
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Append a member.
    pub fn member(mut self, member: MemberDescriptor) -> Self {
        self.members.push(member);
        self
    }
}
