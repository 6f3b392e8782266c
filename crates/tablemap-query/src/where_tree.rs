//! Dialect-neutral WHERE tree.
//!
//! The compiler lowers an [`Expr`](crate::expr::Expr) into nested
//! [`WhereGroup`]s whose leaves already carry table aliases and storage
//! columns, so that a renderer only has to print them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tablemap_core::Value;

/// A parenthesized sequence of nodes, optionally negated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhereGroup {
    pub nodes: Vec<WhereNode>,
    pub negate: bool,
}

impl WhereGroup {
    pub fn new(nodes: Vec<WhereNode>) -> Self {
        Self {
            nodes,
            negate: false,
        }
    }

    /// `left op right` as a new group.
    pub fn binary(left: WhereNode, op: WhereOperator, right: WhereNode) -> Self {
        Self::new(vec![left, WhereNode::Operator(op), right])
    }

    /// Decompose a `x = NULL` / `x <> NULL` group into `(x, is_not)`.
    pub fn as_null_check(&self) -> Option<(&WhereNode, bool)> {
        match self.nodes.as_slice() {
            [
                left,
                WhereNode::Operator(op @ (WhereOperator::Equal | WhereOperator::NotEqual)),
                WhereNode::Constant(constant),
            ] if constant.kind == ConstantKind::Null => {
                Some((left, *op == WhereOperator::NotEqual))
            }
            _ => None,
        }
    }

    /// Every parameter name referenced by the tree, in order of appearance.
    pub fn parameter_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_parameters(&mut out);
        out
    }

    fn collect_parameters<'a>(&'a self, out: &mut Vec<&'a str>) {
        for node in &self.nodes {
            match node {
                WhereNode::Group(group) => group.collect_parameters(out),
                WhereNode::Constant(Constant {
                    kind: ConstantKind::Parameter(name),
                    ..
                }) => out.push(name),
                _ => {}
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WhereNode {
    Group(WhereGroup),
    Operator(WhereOperator),
    Field(FieldRef),
    Constant(Constant),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WhereOperator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
    Like,
    In,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

/// A column of one joined table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub alias: String,
    pub column: String,
    /// Member name the column stores
    pub member: String,
}

impl FieldRef {
    pub fn new(
        alias: impl Into<String>,
        column: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            column: column.into(),
            member: member.into(),
        }
    }
}

/// Wildcard placement for LIKE operands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LikeMode {
    #[default]
    None,
    /// `value%`
    StartsWith,
    /// `%value`
    EndsWith,
    /// `%value%`
    Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstantKind {
    Null,
    Bool(bool),
    String(String),
    DateTime(NaiveDateTime),
    /// Numeric text printed as-is
    Raw(String),
    List(Vec<Value>),
    /// Named parameter resolved at bind time
    Parameter(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub kind: ConstantKind,
    pub like: LikeMode,
}

impl Constant {
    pub fn new(kind: ConstantKind) -> Self {
        Self {
            kind,
            like: LikeMode::None,
        }
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        Self::new(ConstantKind::Parameter(name.into()))
    }
}

impl From<Constant> for WhereNode {
    fn from(c: Constant) -> Self {
        WhereNode::Constant(c)
    }
}

impl From<FieldRef> for WhereNode {
    fn from(f: FieldRef) -> Self {
        WhereNode::Field(f)
    }
}

impl From<WhereGroup> for WhereNode {
    fn from(g: WhereGroup) -> Self {
        WhereNode::Group(g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_checks_are_recognized() {
        let field = FieldRef::new("P", "email", "email");
        let group = WhereGroup::binary(
            field.clone().into(),
            WhereOperator::NotEqual,
            Constant::new(ConstantKind::Null).into(),
        );
        let (left, is_not) = group.as_null_check().unwrap();
        assert_eq!(*left, WhereNode::Field(field));
        assert!(is_not);

        let plain = WhereGroup::binary(
            FieldRef::new("P", "name", "name").into(),
            WhereOperator::Equal,
            Constant::new(ConstantKind::String("ann".to_string())).into(),
        );
        assert!(plain.as_null_check().is_none());
    }

    #[test]
    fn parameter_names_in_order() {
        let inner = WhereGroup::binary(
            FieldRef::new("P", "name", "name").into(),
            WhereOperator::Equal,
            Constant::parameter("name").into(),
        );
        let outer = WhereGroup::new(vec![
            inner.into(),
            WhereNode::Operator(WhereOperator::And),
            WhereGroup::binary(
                FieldRef::new("P", "age", "age").into(),
                WhereOperator::Greater,
                Constant::parameter("age").into(),
            )
            .into(),
        ]);
        assert_eq!(outer.parameter_names(), vec!["name", "age"]);
    }

    #[test]
    fn trees_serialize() {
        let group = WhereGroup::binary(
            FieldRef::new("C", "color", "color").into(),
            WhereOperator::Like,
            Constant {
                kind: ConstantKind::String("br".to_string()),
                like: LikeMode::StartsWith,
            }
            .into(),
        );
        let json = serde_json::to_string(&group).unwrap();
        let back: WhereGroup = serde_json::from_str(&json).unwrap();
        assert_eq!(back, group);
    }
}
