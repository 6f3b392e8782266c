//! Result rows and typed extraction of their values.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::Arc;

/// Separator between table alias and column in projected column labels
/// (`"C*color"`).
pub const ALIAS_SEPARATOR: char = '*';

/// Build the projected label for `alias`.`column`.
pub fn aliased_label(alias: &str, column: &str) -> String {
    format!("{alias}{ALIAS_SEPARATOR}{column}")
}

/// Label lookup shared by every row of one result set.
#[derive(Debug)]
struct Labels {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

/// One result row: values in projection order, addressed by position or
/// by label.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    labels: Arc<Labels>,
}

impl Row {
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let index = column_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            values,
            labels: Arc::new(Labels {
                names: column_names,
                index,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.labels
            .index
            .get(name)
            .and_then(|&i| self.values.get(i))
    }

    /// Value projected for `alias`.`column`, labelled `"alias*column"`.
    pub fn get_aliased(&self, alias: &str, column: &str) -> Option<&Value> {
        self.get_by_name(&aliased_label(alias, column))
    }

    /// Typed value at `index`.
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        match self.get(index) {
            Some(value) => T::from_value(value),
            None => Err(Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("no column {index} in a row of {}", self.len()),
                column: None,
                rust_type: None,
            })),
        }
    }

    /// Typed value under `name`; conversion errors carry the label.
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let Some(value) = self.get_by_name(name) else {
            return Err(Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: "missing column".to_string(),
                column: Some(name.to_string()),
                rust_type: None,
            }));
        };
        T::from_value(value).map_err(|e| match e {
            Error::Type(te) => Error::Type(TypeError {
                column: Some(name.to_string()),
                ..te
            }),
            other => other,
        })
    }

    /// `(label, value)` pairs in projection order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.labels
            .names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Typed view of a single [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn type_error(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
        rust_type: None,
    })
}

/// Conversions that are a straight [`Value`] accessor.
macro_rules! from_accessor {
    ($($ty:ty => $name:literal, |$v:ident| $access:expr;)*) => {
        $(
            impl FromValue for $ty {
                fn from_value($v: &Value) -> Result<Self> {
                    $access.ok_or_else(|| type_error($name, $v))
                }
            }
        )*
    };
}

from_accessor! {
    bool => "bool", |value| value.as_bool();
    i64 => "i64", |value| value.as_i64();
    f64 => "f64", |value| value.as_f64();
    String => "String", |value| value.as_str().map(str::to_string);
    Vec<u8> => "Vec<u8>", |value| value.as_bytes().map(<[u8]>::to_vec);
    NaiveDateTime => "NaiveDateTime", |value| value.as_datetime();
}

fn narrow<T: TryFrom<i64>>(value: &Value, name: &'static str) -> Result<T> {
    let wide = value.as_i64().ok_or_else(|| type_error(name, value))?;
    T::try_from(wide).map_err(|_| {
        Error::Type(TypeError {
            expected: name,
            actual: format!("{wide} does not fit"),
            column: None,
            rust_type: Some(name),
        })
    })
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        narrow(value, "i32")
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Result<Self> {
        narrow(value, "u64")
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            Value::Text(s) => serde_json::from_str(s).map_err(|e| {
                Error::Type(TypeError {
                    expected: "JSON",
                    actual: format!("unparsable text ({e})"),
                    column: None,
                    rust_type: None,
                })
            }),
            _ => Err(type_error("JSON", value)),
        }
    }
}

impl FromValue for [u8; 16] {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Uuid(v) => Ok(*v),
            Value::Bytes(v) => v
                .as_slice()
                .try_into()
                .map_err(|_| type_error("UUID", value)),
            _ => Err(type_error("UUID", value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliased_lookup() {
        let row = Row::new(
            vec!["C*id".to_string(), "C*color".to_string()],
            vec![Value::BigInt(1), Value::Text("brun".to_string())],
        );
        assert_eq!(
            row.get_aliased("C", "color"),
            Some(&Value::Text("brun".to_string()))
        );
        assert!(row.get_aliased("A", "color").is_none());
        assert_eq!(row.get_named::<i64>("C*id").unwrap(), 1);
    }

    #[test]
    fn get_named_reports_column() {
        let row = Row::new(vec!["name".to_string()], vec![Value::Int(3)]);
        match row.get_named::<String>("name") {
            Err(Error::Type(te)) => assert_eq!(te.column.as_deref(), Some("name")),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(row.get_named::<String>("missing").is_err());
    }

    #[test]
    fn narrowing_integer_conversion() {
        assert_eq!(i32::from_value(&Value::BigInt(12)).unwrap(), 12);
        assert!(i32::from_value(&Value::BigInt(i64::MAX)).is_err());
        assert!(u64::from_value(&Value::BigInt(-1)).is_err());
        assert_eq!(Option::<i64>::from_value(&Value::Null).unwrap(), None);
    }
}
