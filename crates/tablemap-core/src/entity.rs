//! Entities and their dialect-neutral snapshots.
//!
//! The engine never inspects Rust structs directly. An [`Entity`] converts
//! itself to and from a [`Record`], and polymorphic roots are modelled as
//! enums over their concrete subtypes whose `from_record` dispatches on
//! [`Record::type_name`].

use crate::error::{Error, Result, TypeError};
use crate::row::FromValue;
use crate::schema::EntityDescriptor;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A snapshot of one entity instance.
///
/// - `values` holds plain members and, for foreign-key links, the linked
///   row's identifier under the member name.
/// - `links` holds linked entities that were loaded eagerly.
/// - `many` holds the identifiers of many-to-many links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Concrete type of the instance
    pub type_name: String,
    pub values: BTreeMap<String, Value>,
    pub links: BTreeMap<String, Record>,
    pub many: BTreeMap<String, Vec<Value>>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    /// Builder-style member assignment.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Builder-style eager link assignment.
    pub fn with_link(mut self, name: impl Into<String>, record: Record) -> Self {
        self.links.insert(name.into(), record);
        self
    }

    /// Builder-style many-to-many assignment.
    pub fn with_many(mut self, name: impl Into<String>, ids: Vec<Value>) -> Self {
        self.many.insert(name.into(), ids);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Typed member access. A missing member reads as NULL, so optional
    /// members decode to `None`.
    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.values.get(name).unwrap_or(&Value::Null);
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }

    /// Required typed member access: NULL or missing is an error.
    pub fn require<T: FromValue>(&self, name: &str) -> Result<T> {
        match self.values.get(name) {
            Some(value) if !value.is_null() => self.get_as(name),
            _ => Err(Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: "missing value".to_string(),
                column: Some(name.to_string()),
                rust_type: None,
            })),
        }
    }

    pub fn link(&self, name: &str) -> Option<&Record> {
        self.links.get(name)
    }

    pub fn many(&self, name: &str) -> &[Value] {
        self.many.get(name).map_or(&[][..], Vec::as_slice)
    }

    /// Identifier of a foreign-key link, read from `values` or collapsed from
    /// an eagerly loaded link record using the target's key member.
    pub fn link_id(&self, name: &str, key_member: &str) -> Option<Value> {
        match self.values.get(name) {
            Some(value) if !value.is_null() => Some(value.clone()),
            _ => self
                .links
                .get(name)
                .and_then(|linked| linked.values.get(key_member))
                .filter(|v| !v.is_null())
                .cloned(),
        }
    }
}

/// A type whose instances are stored through the schema.
///
/// ```ignore
/// #[derive(Debug, Clone)]
/// struct Cat { id: Option<i64>, name: String, color: Option<String> }
///
/// impl Entity for Cat {
///     const TYPE_NAME: &'static str = "Cat";
///
///     fn descriptor() -> EntityDescriptor {
///         EntityDescriptor::new("Cat", "cat")
///             .extends("Animal")
///             .member(MemberDescriptor::of::<Option<String>>("color"))
///     }
///     // to_record / from_record / set_member ...
/// }
/// ```
pub trait Entity: Sized + Send + Sync + 'static {
    /// The name the type is registered under.
    const TYPE_NAME: &'static str;

    /// Storage description of the members declared on this type.
    fn descriptor() -> EntityDescriptor;

    /// Snapshot the instance. `type_name` must be the concrete type.
    fn to_record(&self) -> Record;

    /// Rebuild an instance from a snapshot.
    fn from_record(record: &Record) -> Result<Self>;

    /// Assign one member, used to write generated keys back.
    fn set_member(&mut self, name: &str, value: Value) -> Result<()>;
}
