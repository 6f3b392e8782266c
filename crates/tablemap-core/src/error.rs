//! Error types for tablemap operations.
//!
//! Two classes are kept apart:
//!
//! - [`BuildError`] covers programmer and configuration mistakes: schema
//!   registration problems, unmapped member paths, unsupported predicate
//!   shapes, a second filter on a builder, unbound parameters. These surface
//!   immediately from the call that detected them.
//! - [`Error`] covers failures reported by the storage backend while a
//!   statement executes. The engine converts these into carried
//!   [`DataError`](crate::DataError)s instead of propagating them.

use std::fmt;

type Source = Box<dyn std::error::Error + Send + Sync>;

/// A failure reported while talking to the storage backend.
#[derive(Debug)]
pub enum Error {
    Connection(ConnectionError),
    Query(QueryError),
    /// A fetched value does not convert to the requested type.
    Type(TypeError),
    /// Member checks failed before anything was written.
    Validation(ValidationError),
    Build(BuildError),
    Io(std::io::Error),
    Timeout,
    /// The surrounding [`Cx`](asupersync::Cx) was cancelled.
    Cancelled,
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Source>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    Connect,
    Authentication,
    /// The link to the server dropped mid-operation.
    Disconnected,
    NotConnected,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Source>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    Syntax,
    /// Unique, foreign key or not-null violation.
    Constraint,
    NotFound,
    DataTruncation,
    Deadlock,
    Timeout,
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

/// Validation error for member-level checks performed before writes.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub errors: Vec<FieldValidationError>,
}

/// A single validation error for a member.
#[derive(Debug, Clone)]
pub struct FieldValidationError {
    /// The member name that failed validation
    pub field: String,
    /// The kind of validation that failed
    pub kind: ValidationErrorKind,
    /// Human-readable error message
    pub message: String,
}

/// The type of validation constraint that was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// String is longer than maximum length
    MaxLength,
    /// Value doesn't match regex pattern
    Pattern,
    /// Required member is missing/null
    Required,
}

impl ValidationError {
    /// Create a new empty validation error container.
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Check if there are any validation errors.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add a member validation error.
    pub fn add(
        &mut self,
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) {
        self.errors.push(FieldValidationError {
            field: field.into(),
            kind,
            message: message.into(),
        });
    }

    /// Add a max length error.
    pub fn add_max_length(&mut self, field: impl Into<String>, max: u32, actual: usize) {
        self.add(
            field,
            ValidationErrorKind::MaxLength,
            format!("must be at most {max} characters, got {actual}"),
        );
    }

    /// Add a pattern match error.
    pub fn add_pattern(&mut self, field: impl Into<String>, pattern: &str) {
        self.add(
            field,
            ValidationErrorKind::Pattern,
            format!("must match pattern '{pattern}'"),
        );
    }

    /// Add a required member error.
    pub fn add_required(&mut self, field: impl Into<String>) {
        self.add(
            field,
            ValidationErrorKind::Required,
            "is required".to_string(),
        );
    }

    /// Convert to Result, returning Ok(()) if no errors, Err(self) otherwise.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl Default for ValidationError {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== Build errors ====================

/// A programmer or configuration error detected while registering a schema,
/// resolving a member path, compiling a predicate or binding parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Two descriptors share one type name.
    DuplicateType { type_name: String },
    /// A type was requested that is not part of the schema.
    UnknownType { type_name: String },
    /// A descriptor names a parent type that was never registered.
    UnknownParent { type_name: String, parent: String },
    /// The parent chain of a type loops back onto itself.
    CyclicInheritance { type_name: String },
    /// A hierarchy root declares no primary key.
    MissingPrimaryKey { type_name: String },
    /// A subtype declares its own primary key; subtypes share the root key.
    SubtypePrimaryKey { type_name: String, member: String },
    /// A member name appears twice along one inheritance chain.
    DuplicateMember { type_name: String, member: String },
    /// A link member targets a type that is not mapped.
    UnmappedLinkTarget {
        type_name: String,
        member: String,
        target: String,
    },
    /// A member validation pattern is not a valid regular expression.
    InvalidPattern {
        type_name: String,
        member: String,
        message: String,
    },
    /// A dotted path names a member that does not exist.
    UnknownMember { type_name: String, path: String },
    /// A path traverses a member that is not a foreign-key link.
    NotALink { type_name: String, member: String },
    /// A predicate or builder call uses a shape the compiler does not map.
    UnsupportedExpression { message: String },
    /// `filter` or `filter_with_parameters` was called twice on one builder.
    WhereAlreadySet,
    /// `set_variable` named a variable the compiled unit does not declare.
    UnknownVariable { name: String },
    /// A bound value does not match the declared variable type.
    VariableTypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    /// A positional value matched no remaining variable.
    NoMatchingParameter { position: usize, actual: String },
    /// A parameter has no value at execution time.
    UnboundParameter { name: String },
    /// An abstract type cannot be stored on its own.
    AbstractType { type_name: String },
    /// A record does not carry what the operation needs.
    InvalidRecord { type_name: String, message: String },
}

impl BuildError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        BuildError::UnsupportedExpression {
            message: message.into(),
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::DuplicateType { type_name } => {
                write!(f, "type '{}' is registered twice", type_name)
            }
            BuildError::UnknownType { type_name } => {
                write!(f, "type '{}' is not part of the schema", type_name)
            }
            BuildError::UnknownParent { type_name, parent } => write!(
                f,
                "type '{}' extends '{}', which is not registered",
                type_name, parent
            ),
            BuildError::CyclicInheritance { type_name } => {
                write!(f, "inheritance chain of '{}' is cyclic", type_name)
            }
            BuildError::MissingPrimaryKey { type_name } => {
                write!(f, "root type '{}' declares no primary key", type_name)
            }
            BuildError::SubtypePrimaryKey { type_name, member } => write!(
                f,
                "subtype '{}' declares primary key '{}'; subtypes inherit the root key",
                type_name, member
            ),
            BuildError::DuplicateMember { type_name, member } => write!(
                f,
                "member '{}' is declared more than once in the chain of '{}'",
                member, type_name
            ),
            BuildError::UnmappedLinkTarget {
                type_name,
                member,
                target,
            } => write!(
                f,
                "member '{}.{}' links to unmapped type '{}'",
                type_name, member, target
            ),
            BuildError::InvalidPattern {
                type_name,
                member,
                message,
            } => write!(
                f,
                "pattern of member '{}.{}' is invalid: {}",
                type_name, member, message
            ),
            BuildError::UnknownMember { type_name, path } => {
                write!(f, "'{}' has no member path '{}'", type_name, path)
            }
            BuildError::NotALink { type_name, member } => write!(
                f,
                "member '{}.{}' is not a link and cannot be traversed",
                type_name, member
            ),
            BuildError::UnsupportedExpression { message } => {
                write!(f, "unsupported expression: {}", message)
            }
            BuildError::WhereAlreadySet => write!(f, "the filter of this builder is already set"),
            BuildError::UnknownVariable { name } => write!(f, "unknown variable '{}'", name),
            BuildError::VariableTypeMismatch {
                name,
                expected,
                actual,
            } => write!(
                f,
                "variable '{}' expects {}, got {}",
                name, expected, actual
            ),
            BuildError::NoMatchingParameter { position, actual } => write!(
                f,
                "value #{} ({}) matches no unbound variable",
                position, actual
            ),
            BuildError::UnboundParameter { name } => {
                write!(f, "parameter '{}' has no bound value", name)
            }
            BuildError::AbstractType { type_name } => {
                write!(f, "abstract type '{}' cannot be stored directly", type_name)
            }
            BuildError::InvalidRecord { type_name, message } => {
                write!(f, "invalid record for '{}': {}", type_name, message)
            }
        }
    }
}

impl std::error::Error for BuildError {}

impl Error {
    /// The statement text a query error was raised for.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl QueryError {
    /// Integrity violations, by kind or by SQLSTATE class `23`.
    pub fn is_constraint_violation(&self) -> bool {
        self.kind == QueryErrorKind::Constraint
            || self
                .sqlstate
                .as_deref()
                .is_some_and(|state| state.starts_with("23"))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "connection error: {}", e),
            Error::Query(e) => write!(f, "query failed: {}", e),
            Error::Type(e) => write!(f, "type error: {}", e),
            Error::Validation(e) => write!(f, "{}", e),
            Error::Build(e) => write!(f, "build error: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Timeout => write!(f, "operation timed out"),
            Error::Cancelled => write!(f, "operation cancelled"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let boxed = match self {
            Error::Connection(e) => e.source.as_deref(),
            Error::Query(e) => e.source.as_deref(),
            Error::Build(e) => return Some(e),
            Error::Io(e) => return Some(e),
            _ => None,
        };
        boxed.map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            write!(f, "validation passed")
        } else if self.errors.len() == 1 {
            let err = &self.errors[0];
            write!(f, "validation error on '{}': {}", err.field, err.message)
        } else {
            writeln!(f, "validation errors:")?;
            for err in &self.errors {
                writeln!(f, "  - {}: {}", err.field, err.message)?;
            }
            Ok(())
        }
    }
}

impl std::error::Error for ValidationError {}

macro_rules! error_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Error {
                fn from(err: $source) -> Self {
                    Error::$variant(err)
                }
            }
        )*
    };
}

error_from! {
    std::io::Error => Io,
    ConnectionError => Connection,
    QueryError => Query,
    TypeError => Type,
    ValidationError => Validation,
    BuildError => Build,
}

/// Result type alias for backend operations.
pub type Result<T> = std::result::Result<T, Error>;
