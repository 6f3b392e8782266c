//! Carried runtime errors.
//!
//! Storage failures are never thrown at the caller of an engine operation.
//! They are collected into a [`ResultWithError`] so a batch can report every
//! failing item while the others succeed.

use crate::error::{BuildError, ConnectionErrorKind, Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a runtime/data error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataErrorCode {
    UnknownError,
    StorageDisconnected,
    NoConnection,
    ConstraintViolation,
    ItemNotFound,
    ValidationError,
    BuildError,
    TypeMismatch,
    Cancelled,
}

impl DataErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DataErrorCode::UnknownError => "unknown_error",
            DataErrorCode::StorageDisconnected => "storage_disconnected",
            DataErrorCode::NoConnection => "no_connection",
            DataErrorCode::ConstraintViolation => "constraint_violation",
            DataErrorCode::ItemNotFound => "item_not_found",
            DataErrorCode::ValidationError => "validation_error",
            DataErrorCode::BuildError => "build_error",
            DataErrorCode::TypeMismatch => "type_mismatch",
            DataErrorCode::Cancelled => "cancelled",
        }
    }
}

/// One runtime error carried in a [`ResultWithError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataError {
    pub code: DataErrorCode,
    pub message: String,
    /// Index of the item in a batch operation, when the error belongs to one.
    pub item: Option<usize>,
}

impl DataError {
    pub fn new(code: DataErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            item: None,
        }
    }

    pub fn not_found(type_name: &str) -> Self {
        Self::new(
            DataErrorCode::ItemNotFound,
            format!("no {} matched the request", type_name),
        )
    }

    /// Attach the batch position of the failing item.
    pub fn at(mut self, item: usize) -> Self {
        self.item = Some(item);
        self
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.item {
            Some(item) => write!(f, "[{}] item {}: {}", self.code.as_str(), item, self.message),
            None => write!(f, "[{}] {}", self.code.as_str(), self.message),
        }
    }
}

impl From<&Error> for DataError {
    fn from(err: &Error) -> Self {
        let code = match err {
            Error::Connection(c) => match c.kind {
                ConnectionErrorKind::Disconnected => DataErrorCode::StorageDisconnected,
                _ => DataErrorCode::NoConnection,
            },
            Error::Io(_) | Error::Timeout => DataErrorCode::StorageDisconnected,
            Error::Query(q) if q.is_constraint_violation() => DataErrorCode::ConstraintViolation,
            Error::Validation(_) => DataErrorCode::ValidationError,
            Error::Build(_) => DataErrorCode::BuildError,
            Error::Type(_) => DataErrorCode::TypeMismatch,
            Error::Cancelled => DataErrorCode::Cancelled,
            _ => DataErrorCode::UnknownError,
        };
        DataError::new(code, err.to_string())
    }
}

impl From<Error> for DataError {
    fn from(err: Error) -> Self {
        DataError::from(&err)
    }
}

impl From<BuildError> for DataError {
    fn from(err: BuildError) -> Self {
        DataError::new(DataErrorCode::BuildError, err.to_string())
    }
}

/// The outcome of an engine operation: a value plus every error collected
/// while producing it. Success means the error list is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultWithError<T> {
    pub result: Option<T>,
    pub errors: Vec<DataError>,
}

impl<T> ResultWithError<T> {
    pub fn ok(value: T) -> Self {
        Self {
            result: Some(value),
            errors: Vec::new(),
        }
    }

    pub fn failed(error: impl Into<DataError>) -> Self {
        Self {
            result: None,
            errors: vec![error.into()],
        }
    }

    /// A partial result: a value that coexists with carried errors.
    pub fn partial(value: T, errors: Vec<DataError>) -> Self {
        Self {
            result: Some(value),
            errors,
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push_error(&mut self, error: impl Into<DataError>) {
        self.errors.push(error.into());
    }

    pub fn has_code(&self, code: DataErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ResultWithError<U> {
        ResultWithError {
            result: self.result.map(f),
            errors: self.errors,
        }
    }

    /// Collapse into a plain `Result`, dropping any partial value on failure.
    pub fn into_result(self) -> std::result::Result<T, Vec<DataError>> {
        match self.result {
            Some(value) if self.errors.is_empty() => Ok(value),
            _ if !self.errors.is_empty() => Err(self.errors),
            _ => Err(vec![DataError::new(
                DataErrorCode::UnknownError,
                "operation produced no result",
            )]),
        }
    }
}

impl<T: Default> Default for ResultWithError<T> {
    fn default() -> Self {
        Self::ok(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConnectionError, QueryError, QueryErrorKind};

    #[test]
    fn constraint_errors_are_classified() {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Constraint,
            sql: None,
            sqlstate: Some("23000".to_string()),
            message: "Duplicate entry 'felix' for key 'name'".to_string(),
            source: None,
        });
        let data = DataError::from(&err);
        assert_eq!(data.code, DataErrorCode::ConstraintViolation);
        assert!(data.message.contains("Duplicate entry"));
    }

    #[test]
    fn connection_errors_are_classified() {
        let lost = Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Disconnected,
            message: "gone".to_string(),
            source: None,
        });
        assert_eq!(DataError::from(&lost).code, DataErrorCode::StorageDisconnected);

        let missing = Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::NotConnected,
            message: "no connection".to_string(),
            source: None,
        });
        assert_eq!(DataError::from(&missing).code, DataErrorCode::NoConnection);
    }

    #[test]
    fn success_means_no_errors() {
        let ok: ResultWithError<u32> = ResultWithError::ok(3);
        assert!(ok.is_success());
        assert_eq!(ok.into_result(), Ok(3));

        let mut partial = ResultWithError::partial(vec![1, 2], Vec::new());
        partial.push_error(DataError::not_found("Cat").at(1));
        assert!(!partial.is_success());
        assert!(partial.has_code(DataErrorCode::ItemNotFound));
        assert_eq!(partial.result.as_deref(), Some(&[1, 2][..]));
        assert_eq!(partial.errors[0].to_string(), "[item_not_found] item 1: no Cat matched the request");
    }
}
