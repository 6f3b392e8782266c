//! Core types and traits for tablemap.
//!
//! `tablemap-core` is the **foundation layer** for the workspace. It defines
//! the schema model every other crate resolves paths and renders SQL
//! against, plus the values, rows and backend traits that cross crate
//! boundaries.
//!
//! # Role In The Architecture
//!
//! - **Schema model**: [`EntityDescriptor`] in, immutable [`Schema`] of
//!   [`TableInfo`]s out, with class-table inheritance links.
//! - **Entities**: [`Entity`] and its [`Record`] snapshot.
//! - **Values and rows**: [`Value`], [`Row`], [`FromValue`].
//! - **Backend interface**: [`Connection`] and [`TransactionOps`], driven
//!   through asupersync's `Cx` and `Outcome`.
//! - **Errors**: [`BuildError`] for programmer errors, [`Error`] for backend
//!   failures, [`DataError`]/[`ResultWithError`] for carried runtime errors.

pub mod connection;
pub mod entity;
pub mod error;
pub mod result;
pub mod row;
pub mod schema;
pub mod types;
pub mod validate;
pub mod value;

pub use connection::{Connection, IsolationLevel, TransactionOps};
pub use entity::{Entity, Record};
pub use error::{
    BuildError, ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind, Result,
    TypeError, ValidationError, ValidationErrorKind,
};
pub use result::{DataError, DataErrorCode, ResultWithError};
pub use row::{ALIAS_SEPARATOR, FromValue, Row, aliased_label};
pub use schema::{
    DISCRIMINATOR_MEMBER, EntityDescriptor, LinkDescriptor, LinkKind, LinkTable,
    MemberDescriptor, ReferentialAction, Schema, SchemaBuilder, TableId, TableInfo,
    TableMemberInfo,
};
pub use types::{SqlType, TypeInfo};
pub use validate::validate_record;
pub use value::Value;

// Re-export asupersync types for convenience
pub use asupersync::{Cx, Outcome};
