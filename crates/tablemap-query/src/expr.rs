//! Predicate expressions.
//!
//! Predicates are an explicit, serializable tree built through a small typed
//! API instead of opaque closures:
//!
//! ```ignore
//! use tablemap_query::expr::{field, list, param};
//!
//! // c => c.color == "brun" && c.name.starts_with("fe")
//! let filter = field("color").eq("brun").and(field("name").starts_with("fe"));
//!
//! // p => ids.contains(p.id)
//! let in_list = field("id").is_in(list([1_i64, 2, 3]));
//!
//! // p => p.location == location, rebound later through `set_variable`
//! let reusable = field("location").eq(param::<Location>("location"));
//! ```

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tablemap_core::{Entity, Record, Value};

/// A predicate or value expression over one root entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Dotted member path from the root entity (`"location.country.name"`).
    Field(String),
    /// A literal value.
    Literal(Value),
    /// A literal list, usable as the haystack of `contains`.
    List(Vec<Value>),
    /// A value captured from outside the predicate.
    Variable(Variable),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    Call {
        method: Method,
        target: Box<Expr>,
        argument: Box<Expr>,
    },
    /// Member access on a computed value. Never compiles; kept so that
    /// `member` stays total.
    Member { target: Box<Expr>, member: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub const fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub const fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }
}

/// Recognized method calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    StartsWith,
    EndsWith,
    /// Substring test on strings, membership test on lists.
    Contains,
}

/// Declared type of a variable's root value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindType {
    /// A record of the named entity type (or one of its subtypes).
    Entity(String),
    Text,
    Integer,
    Float,
    Bool,
    DateTime,
    Bytes,
    List,
    /// Whatever the first bound value is.
    Any,
}

impl BindType {
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Text(_) | Value::Decimal(_) => BindType::Text,
            Value::TinyInt(_) | Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_) => {
                BindType::Integer
            }
            Value::Float(_) | Value::Double(_) => BindType::Float,
            Value::Bool(_) => BindType::Bool,
            Value::DateTime(_) => BindType::DateTime,
            Value::Bytes(_) => BindType::Bytes,
            Value::Array(_) => BindType::List,
            Value::Null | Value::Uuid(_) | Value::Json(_) => BindType::Any,
        }
    }

    /// Can a plain value be bound to a variable of this type? NULL binds to
    /// anything but a list.
    pub fn accepts_value(&self, value: &Value) -> bool {
        if value.is_null() {
            return !matches!(self, BindType::List);
        }
        match self {
            BindType::Any => true,
            BindType::Entity(_) => !matches!(value, Value::Array(_)),
            BindType::Float => matches!(
                BindType::of_value(value),
                BindType::Float | BindType::Integer
            ),
            other => *other == BindType::of_value(value),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            BindType::Entity(name) => name.clone(),
            BindType::Text => "text".to_string(),
            BindType::Integer => "integer".to_string(),
            BindType::Float => "float".to_string(),
            BindType::Bool => "bool".to_string(),
            BindType::DateTime => "datetime".to_string(),
            BindType::Bytes => "bytes".to_string(),
            BindType::List => "list".to_string(),
            BindType::Any => "any value".to_string(),
        }
    }
}

/// A value that can be bound to a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Bindable {
    Value(Value),
    Record(Record),
}

impl Bindable {
    /// Snapshot an entity for binding.
    pub fn entity<E: Entity>(entity: &E) -> Self {
        Bindable::Record(entity.to_record())
    }

    pub fn bind_type(&self) -> BindType {
        match self {
            Bindable::Value(v) => BindType::of_value(v),
            Bindable::Record(r) => BindType::Entity(r.type_name.clone()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Bindable::Value(v) => v.type_name().to_string(),
            Bindable::Record(r) => r.type_name.clone(),
        }
    }
}

impl From<Value> for Bindable {
    fn from(v: Value) -> Self {
        Bindable::Value(v)
    }
}

impl From<Record> for Bindable {
    fn from(r: Record) -> Self {
        Bindable::Record(r)
    }
}

macro_rules! bindable_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Bindable {
                fn from(v: $ty) -> Self {
                    Bindable::Value(Value::from(v))
                }
            }
        )*
    };
}

bindable_from!(bool, i32, i64, f64, String, &str, NaiveDateTime, Vec<Value>, Vec<i64>, Vec<String>, Vec<&str>);

/// A captured value and the member chain read from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub root: BindType,
    pub chain: Vec<String>,
    pub value: Option<Bindable>,
}

// ==================== Constructors ====================

/// Reference a member path of the root entity.
pub fn field(path: impl Into<String>) -> Expr {
    Expr::Field(path.into())
}

/// A literal value.
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

/// A literal list.
pub fn list<I, V>(items: I) -> Expr
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    Expr::List(items.into_iter().map(Into::into).collect())
}

/// A captured variable with a current value.
pub fn var(name: impl Into<String>, value: impl Into<Bindable>) -> Expr {
    let value = value.into();
    Expr::Variable(Variable {
        name: name.into(),
        root: value.bind_type(),
        chain: Vec::new(),
        value: Some(value),
    })
}

/// A captured entity variable.
pub fn entity_var<E: Entity>(name: impl Into<String>, entity: &E) -> Expr {
    Expr::Variable(Variable {
        name: name.into(),
        root: BindType::Entity(E::TYPE_NAME.to_string()),
        chain: Vec::new(),
        value: Some(Bindable::entity(entity)),
    })
}

/// An unbound entity variable, filled later by `prepare`/`set_variable`.
pub fn param<E: Entity>(name: impl Into<String>) -> Expr {
    param_of(name, BindType::Entity(E::TYPE_NAME.to_string()))
}

/// An unbound variable of the given type.
pub fn param_of(name: impl Into<String>, root: BindType) -> Expr {
    Expr::Variable(Variable {
        name: name.into(),
        root,
        chain: Vec::new(),
        value: None,
    })
}

// ==================== Combinators ====================

impl Expr {
    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    fn call(self, method: Method, argument: impl Into<Expr>) -> Expr {
        Expr::Call {
            method,
            target: Box::new(self),
            argument: Box::new(argument.into()),
        }
    }

    /// Access a member: extends a field path or a variable's chain.
    pub fn member(self, name: impl Into<String>) -> Expr {
        let name = name.into();
        match self {
            Expr::Field(path) => Expr::Field(format!("{path}.{name}")),
            Expr::Variable(mut v) => {
                v.chain.push(name);
                Expr::Variable(v)
            }
            other => Expr::Member {
                target: Box::new(other),
                member: name,
            },
        }
    }

    pub fn eq(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ne, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn le(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Le, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn ge(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ge, other)
    }

    pub fn and(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Or, other)
    }

    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn add(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Add, other)
    }

    pub fn sub(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Sub, other)
    }

    pub fn mul(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Mul, other)
    }

    pub fn div(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Div, other)
    }

    pub fn rem(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Mod, other)
    }

    pub fn is_null(self) -> Expr {
        self.eq(Value::Null)
    }

    pub fn is_not_null(self) -> Expr {
        self.ne(Value::Null)
    }

    pub fn starts_with(self, prefix: impl Into<Expr>) -> Expr {
        self.call(Method::StartsWith, prefix)
    }

    pub fn ends_with(self, suffix: impl Into<Expr>) -> Expr {
        self.call(Method::EndsWith, suffix)
    }

    /// Substring test on a string member, membership test on a list.
    pub fn contains(self, needle: impl Into<Expr>) -> Expr {
        self.call(Method::Contains, needle)
    }

    /// `haystack.contains(self)`.
    pub fn is_in(self, haystack: impl Into<Expr>) -> Expr {
        haystack.into().call(Method::Contains, self)
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<Variable> for Expr {
    fn from(v: Variable) -> Self {
        Expr::Variable(v)
    }
}

macro_rules! expr_from_literal {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Expr {
                fn from(v: $ty) -> Self {
                    Expr::Literal(Value::from(v))
                }
            }
        )*
    };
}

expr_from_literal!(bool, i32, i64, f64, String, &str, NaiveDateTime);
