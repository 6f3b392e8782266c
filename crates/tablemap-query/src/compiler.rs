//! Predicate compilation.
//!
//! Lowers an [`Expr`] into a [`WhereGroup`] against a [`PathResolver`]:
//! member paths become aliased columns (joining links on demand), literals
//! and captured variables become constants or named parameters.

use tablemap_core::{BuildError, LinkKind, SqlType, Value};

use crate::expr::{BinaryOp, BindType, Expr, Method, Variable};
use crate::params::{ParamTable, ParamsInfo, VariableSlot, extract};
use crate::resolver::PathResolver;
use crate::where_tree::{Constant, ConstantKind, LikeMode, WhereGroup, WhereNode, WhereOperator};

/// How captured variables are lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileMode {
    /// Variables are evaluated now and inlined as constants.
    Literal,
    /// Variables become named parameters that can be rebound.
    Parameterized,
}

/// A compiled predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledWhere {
    pub root: WhereGroup,
    pub params: ParamTable,
}

/// Compile `expr` against the plan of `resolver`.
pub fn translate(
    resolver: &mut PathResolver<'_>,
    expr: &Expr,
    mode: CompileMode,
) -> Result<CompiledWhere, BuildError> {
    let mut compiler = Compiler {
        resolver,
        mode,
        params: ParamTable::new(),
    };
    let operand = compiler.visit(expr)?;
    let root = predicate(operand)?;
    tracing::trace!(
        ?mode,
        params = compiler.params.len(),
        "compiled predicate"
    );
    Ok(CompiledWhere {
        root,
        params: compiler.params,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Predicate,
    Boolean,
    Text,
    Numeric,
    Temporal,
    List,
    Null,
    Unknown,
}

impl Shape {
    fn of_sql(sql_type: SqlType) -> Self {
        if sql_type == SqlType::Boolean {
            Shape::Boolean
        } else if sql_type.is_text() {
            Shape::Text
        } else if sql_type.is_numeric() {
            Shape::Numeric
        } else if sql_type.is_temporal() {
            Shape::Temporal
        } else {
            Shape::Unknown
        }
    }

    fn of_bind(bind: &BindType) -> Self {
        match bind {
            BindType::Text => Shape::Text,
            BindType::Integer | BindType::Float => Shape::Numeric,
            BindType::Bool => Shape::Boolean,
            BindType::DateTime => Shape::Temporal,
            BindType::List => Shape::List,
            BindType::Entity(_) | BindType::Bytes | BindType::Any => Shape::Unknown,
        }
    }
}

#[derive(Debug)]
struct Operand {
    node: WhereNode,
    shape: Shape,
    /// Storage type of a column operand
    column_type: Option<SqlType>,
    /// Name of a parameter operand
    param: Option<String>,
}

impl Operand {
    fn new(node: WhereNode, shape: Shape) -> Self {
        Self {
            node,
            shape,
            column_type: None,
            param: None,
        }
    }

    fn is_field(&self) -> bool {
        matches!(self.node, WhereNode::Field(_))
    }
}

struct Compiler<'r, 's> {
    resolver: &'r mut PathResolver<'s>,
    mode: CompileMode,
    params: ParamTable,
}

impl Compiler<'_, '_> {
    fn visit(&mut self, expr: &Expr) -> Result<Operand, BuildError> {
        match expr {
            Expr::Field(path) => {
                let resolved = self.resolver.resolve(path)?;
                let shape = if resolved.member.link == LinkKind::Simple {
                    Shape::Unknown
                } else {
                    Shape::of_sql(resolved.member.sql_type)
                };
                Ok(Operand {
                    column_type: Some(resolved.member.sql_type),
                    ..Operand::new(WhereNode::Field(resolved.field), shape)
                })
            }
            Expr::Literal(value) => constant(value.clone()),
            Expr::List(items) => Ok(Operand::new(
                Constant::new(ConstantKind::List(items.clone())).into(),
                Shape::List,
            )),
            Expr::Variable(variable) => self.variable(variable),
            Expr::Binary { left, op, right } => self.binary(left, *op, right),
            Expr::Not(inner) => {
                let operand = self.visit(inner)?;
                let mut group = predicate(operand)?;
                group.negate = !group.negate;
                Ok(Operand::new(group.into(), Shape::Predicate))
            }
            Expr::Call {
                method,
                target,
                argument,
            } => self.call(*method, target, argument),
            Expr::Member { member, .. } => Err(BuildError::unsupported(format!(
                "member '{member}' accessed on a computed value"
            ))),
        }
    }

    fn binary(&mut self, left: &Expr, op: BinaryOp, right: &Expr) -> Result<Operand, BuildError> {
        if op.is_logical() {
            let left = predicate(self.visit(left)?)?;
            let right = predicate(self.visit(right)?)?;
            let op = where_operator(op);
            return Ok(Operand::new(
                WhereGroup::binary(left.into(), op, right.into()).into(),
                Shape::Predicate,
            ));
        }

        let mut left = self.visit(left)?;
        let mut right = self.visit(right)?;
        for operand in [&left, &right] {
            if matches!(operand.shape, Shape::Predicate | Shape::List) {
                return Err(BuildError::unsupported(format!(
                    "{op:?} cannot take a predicate or list operand"
                )));
            }
        }

        if op.is_arithmetic() {
            for operand in [&left, &right] {
                if matches!(operand.shape, Shape::Text | Shape::Boolean | Shape::Null) {
                    return Err(BuildError::unsupported(format!(
                        "arithmetic {op:?} needs numeric operands"
                    )));
                }
            }
            return Ok(Operand::new(
                WhereGroup::binary(left.node, where_operator(op), right.node).into(),
                Shape::Numeric,
            ));
        }

        if left.shape == Shape::Null && right.shape != Shape::Null {
            std::mem::swap(&mut left, &mut right);
        }
        if right.shape == Shape::Null {
            if left.shape == Shape::Null {
                return Err(BuildError::unsupported("comparison of two null constants"));
            }
            if !matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
                return Err(BuildError::unsupported(format!(
                    "{op:?} cannot compare with null"
                )));
            }
        }
        self.type_parameter(&left, &right);
        self.type_parameter(&right, &left);

        Ok(Operand::new(
            WhereGroup::binary(left.node, where_operator(op), right.node).into(),
            Shape::Predicate,
        ))
    }

    fn call(&mut self, method: Method, target: &Expr, argument: &Expr) -> Result<Operand, BuildError> {
        let target = self.visit(target)?;

        if method == Method::Contains && target.shape == Shape::List {
            let needle = self.visit(argument)?;
            if !needle.is_field() {
                return Err(BuildError::unsupported(
                    "list membership needs a member on the left",
                ));
            }
            self.type_parameter(&needle, &target);
            return Ok(Operand::new(
                WhereGroup::binary(needle.node, WhereOperator::In, target.node).into(),
                Shape::Predicate,
            ));
        }

        if !target.is_field() {
            return Err(BuildError::unsupported(format!(
                "{method:?} must be called on a member"
            )));
        }
        if !matches!(target.shape, Shape::Text | Shape::Unknown) {
            return Err(BuildError::unsupported(format!(
                "{method:?} needs a text member"
            )));
        }

        let mut argument = self.visit(argument)?;
        let like = match method {
            Method::StartsWith => LikeMode::StartsWith,
            Method::EndsWith => LikeMode::EndsWith,
            Method::Contains => LikeMode::Contains,
        };
        match &mut argument.node {
            WhereNode::Constant(constant)
                if matches!(
                    constant.kind,
                    ConstantKind::String(_) | ConstantKind::Parameter(_)
                ) =>
            {
                constant.like = like;
            }
            _ => {
                return Err(BuildError::unsupported(format!(
                    "{method:?} needs a string argument"
                )));
            }
        }
        if !matches!(argument.shape, Shape::Text | Shape::Unknown) {
            return Err(BuildError::unsupported(format!(
                "{method:?} needs a string argument"
            )));
        }
        self.type_parameter(&target, &argument);

        Ok(Operand::new(
            WhereGroup::binary(target.node, WhereOperator::Like, argument.node).into(),
            Shape::Predicate,
        ))
    }

    /// Give a parameter operand the storage type of the column it is
    /// compared with.
    fn type_parameter(&mut self, column: &Operand, param: &Operand) {
        if let (Some(db_type), Some(name)) = (column.column_type, &param.param) {
            self.params.set_db_type(name, db_type);
        }
    }

    fn variable(&mut self, variable: &Variable) -> Result<Operand, BuildError> {
        let read = self.resolve_chain(variable)?;
        match self.mode {
            CompileMode::Literal => {
                let value =
                    variable
                        .value
                        .as_ref()
                        .ok_or_else(|| BuildError::UnboundParameter {
                            name: variable.name.clone(),
                        })?;
                let value = extract(
                    value,
                    &variable.chain,
                    read.key_member.as_deref(),
                    &variable.name,
                )?;
                constant(value)
            }
            CompileMode::Parameterized => {
                let name = if variable.chain.is_empty() {
                    variable.name.clone()
                } else {
                    format!("{}_{}", variable.name, variable.chain.join("_"))
                };
                let mut info = ParamsInfo {
                    name,
                    variable: variable.name.clone(),
                    chain: variable.chain.clone(),
                    key_member: read.key_member,
                    db_type: None,
                    value: None,
                };
                if let Some(value) = &variable.value {
                    info.value = Some(extract(
                        value,
                        &variable.chain,
                        info.key_member.as_deref(),
                        &variable.name,
                    )?);
                }
                let slot = VariableSlot {
                    name: variable.name.clone(),
                    root: variable.root.clone(),
                    accepts: read.accepts,
                };
                let name = self.params.declare(slot, info);
                let shape = read
                    .sql_type
                    .map_or_else(|| Shape::of_bind(&variable.root), Shape::of_sql);
                Ok(Operand {
                    param: Some(name.clone()),
                    ..Operand::new(Constant::parameter(name).into(), shape)
                })
            }
        }
    }

    /// Check a variable's member chain against the schema.
    fn resolve_chain(&self, variable: &Variable) -> Result<ChainRead, BuildError> {
        let schema = self.resolver.schema();
        let type_name = match &variable.root {
            BindType::Entity(type_name) => type_name,
            _ if variable.chain.is_empty() => {
                return Ok(ChainRead::default());
            }
            other => {
                return Err(BuildError::unsupported(format!(
                    "member access on a {} variable '{}'",
                    other.describe(),
                    variable.name
                )));
            }
        };

        let root = schema.id_of(type_name)?;
        let mut accepts = vec![type_name.clone()];
        accepts.extend(
            schema
                .descendants(root)
                .into_iter()
                .map(|id| schema.table(id).type_name.clone()),
        );

        let Some((last, links)) = variable.chain.split_last() else {
            let key = schema
                .key_member(root)
                .ok_or_else(|| BuildError::MissingPrimaryKey {
                    type_name: type_name.clone(),
                })?;
            return Ok(ChainRead {
                sql_type: Some(key.sql_type),
                key_member: Some(key.name.clone()),
                accepts,
            });
        };

        let mut table = root;
        for link in links {
            let (_, member) = schema.find_member(table, link).ok_or_else(|| {
                BuildError::UnknownMember {
                    type_name: schema.table(table).type_name.clone(),
                    path: link.clone(),
                }
            })?;
            table = match (member.link, member.linked_table) {
                (LinkKind::Simple, Some(target)) => target,
                (LinkKind::Multiple, _) => {
                    return Err(BuildError::unsupported(format!(
                        "many-to-many member '{link}' cannot be read from a variable"
                    )));
                }
                _ => {
                    return Err(BuildError::NotALink {
                        type_name: schema.table(table).type_name.clone(),
                        member: link.clone(),
                    });
                }
            };
        }

        let (_, member) =
            schema
                .find_member(table, last)
                .ok_or_else(|| BuildError::UnknownMember {
                    type_name: schema.table(table).type_name.clone(),
                    path: last.clone(),
                })?;
        let key_member = match (member.link, member.linked_table) {
            (LinkKind::Simple, Some(target)) => schema.key_member(target).map(|k| k.name.clone()),
            (LinkKind::Multiple, _) => {
                return Err(BuildError::unsupported(format!(
                    "many-to-many member '{last}' cannot be read from a variable"
                )));
            }
            _ => None,
        };
        Ok(ChainRead {
            sql_type: Some(member.sql_type),
            key_member,
            accepts,
        })
    }
}

#[derive(Debug, Default)]
struct ChainRead {
    sql_type: Option<SqlType>,
    key_member: Option<String>,
    accepts: Vec<String>,
}

/// Coerce an operand into a group usable as a condition.
fn predicate(operand: Operand) -> Result<WhereGroup, BuildError> {
    match (operand.node, operand.shape) {
        (WhereNode::Group(group), Shape::Predicate) => Ok(group),
        (node @ (WhereNode::Field(_) | WhereNode::Constant(_)), Shape::Boolean) => {
            if let WhereNode::Constant(Constant {
                kind: ConstantKind::Bool(value),
                ..
            }) = node
            {
                let raw = |s: &str| WhereNode::Constant(Constant::new(ConstantKind::Raw(s.into())));
                return Ok(WhereGroup::binary(
                    raw("1"),
                    WhereOperator::Equal,
                    raw(if value { "1" } else { "0" }),
                ));
            }
            Ok(WhereGroup::binary(
                node,
                WhereOperator::Equal,
                Constant::new(ConstantKind::Bool(true)).into(),
            ))
        }
        _ => Err(BuildError::unsupported("expression is not a condition")),
    }
}

fn constant(value: Value) -> Result<Operand, BuildError> {
    let (kind, shape) = match value {
        Value::Null => (ConstantKind::Null, Shape::Null),
        Value::Bool(b) => (ConstantKind::Bool(b), Shape::Boolean),
        Value::Text(s) => (ConstantKind::String(s), Shape::Text),
        Value::DateTime(dt) => (ConstantKind::DateTime(dt), Shape::Temporal),
        Value::Array(items) => (ConstantKind::List(items), Shape::List),
        Value::Bytes(_) => {
            return Err(BuildError::unsupported(
                "binary values cannot be inlined, bind them as parameters",
            ));
        }
        Value::Uuid(_) | Value::Json(_) => (ConstantKind::String(value.to_string()), Shape::Text),
        numeric => (ConstantKind::Raw(numeric.to_string()), Shape::Numeric),
    };
    Ok(Operand::new(Constant::new(kind).into(), shape))
}

fn where_operator(op: BinaryOp) -> WhereOperator {
    match op {
        BinaryOp::Eq => WhereOperator::Equal,
        BinaryOp::Ne => WhereOperator::NotEqual,
        BinaryOp::Lt => WhereOperator::Less,
        BinaryOp::Le => WhereOperator::LessOrEqual,
        BinaryOp::Gt => WhereOperator::Greater,
        BinaryOp::Ge => WhereOperator::GreaterOrEqual,
        BinaryOp::And => WhereOperator::And,
        BinaryOp::Or => WhereOperator::Or,
        BinaryOp::Add => WhereOperator::Add,
        BinaryOp::Sub => WhereOperator::Subtract,
        BinaryOp::Mul => WhereOperator::Multiply,
        BinaryOp::Div => WhereOperator::Divide,
        BinaryOp::Mod => WhereOperator::Modulo,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Bindable, field, list, param_of, var};
    use crate::test_support::schema;
    use crate::where_tree::FieldRef;
    use tablemap_core::Record;

    fn compile(root: &str, expr: &Expr, mode: CompileMode) -> Result<CompiledWhere, BuildError> {
        let schema = schema();
        let table = schema.id_of(root).unwrap();
        let mut resolver = PathResolver::new(&schema, table);
        translate(&mut resolver, expr, mode)
    }

    fn field_node(alias: &str, column: &str) -> WhereNode {
        WhereNode::Field(FieldRef::new(alias, column, column))
    }

    fn text(s: &str) -> WhereNode {
        Constant::new(ConstantKind::String(s.to_string())).into()
    }

    #[test]
    fn comparison_with_literal() {
        let compiled = compile("Cat", &field("color").eq("brun"), CompileMode::Literal).unwrap();
        assert_eq!(
            compiled.root,
            WhereGroup::binary(field_node("C", "color"), WhereOperator::Equal, text("brun"))
        );
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn null_moves_to_the_right() {
        let expr = Expr::Literal(Value::Null).eq(field("color"));
        let compiled = compile("Cat", &expr, CompileMode::Literal).unwrap();
        assert!(compiled.root.as_null_check().is_some());

        let err = compile("Cat", &field("color").lt(Value::Null), CompileMode::Literal);
        assert!(matches!(err, Err(BuildError::UnsupportedExpression { .. })));
    }

    #[test]
    fn boolean_members_are_conditions() {
        let compiled = compile("Dog", &field("trained").not(), CompileMode::Literal).unwrap();
        assert!(compiled.root.negate);
        assert_eq!(
            compiled.root.nodes,
            vec![
                field_node("D", "trained"),
                WhereNode::Operator(WhereOperator::Equal),
                Constant::new(ConstantKind::Bool(true)).into(),
            ]
        );
    }

    #[test]
    fn logical_operators_nest_groups() {
        let expr = field("name").eq("felix").or(field("color").ne("noir"));
        let compiled = compile("Cat", &expr, CompileMode::Literal).unwrap();
        match compiled.root.nodes.as_slice() {
            [WhereNode::Group(left), WhereNode::Operator(WhereOperator::Or), WhereNode::Group(right)] => {
                assert_eq!(left.nodes[0], field_node("A", "name"));
                assert_eq!(right.nodes[0], field_node("C", "color"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn string_methods_become_like() {
        let compiled = compile("Cat", &field("name").starts_with("fe"), CompileMode::Literal).unwrap();
        assert_eq!(
            compiled.root.nodes[2],
            WhereNode::Constant(Constant {
                kind: ConstantKind::String("fe".to_string()),
                like: LikeMode::StartsWith,
            })
        );
        assert_eq!(compiled.root.nodes[1], WhereNode::Operator(WhereOperator::Like));

        let err = compile(
            "Cat",
            &Expr::Literal(Value::from("felix")).starts_with("fe"),
            CompileMode::Literal,
        );
        assert!(err.is_err());
    }

    #[test]
    fn list_contains_becomes_in() {
        let compiled =
            compile("Person", &field("id").is_in(list([1_i64, 2])), CompileMode::Literal).unwrap();
        assert_eq!(compiled.root.nodes[1], WhereNode::Operator(WhereOperator::In));
        assert_eq!(
            compiled.root.nodes[2],
            WhereNode::Constant(Constant::new(ConstantKind::List(vec![
                Value::BigInt(1),
                Value::BigInt(2)
            ])))
        );
    }

    #[test]
    fn literal_mode_inlines_variables() {
        let location = Record::new("PersonLocation").with("id", 5_i64).with("city", "lyon");
        let expr = field("location").eq(var("loc", location.clone()));
        let compiled = compile("Person", &expr, CompileMode::Literal).unwrap();
        assert_eq!(
            compiled.root.nodes[2],
            WhereNode::Constant(Constant::new(ConstantKind::Raw("5".to_string())))
        );

        let expr = field("location.city").eq(var("loc", location).member("city"));
        let compiled = compile("Person", &expr, CompileMode::Literal).unwrap();
        assert_eq!(compiled.root.nodes[2], text("lyon"));
    }

    #[test]
    fn parameterized_mode_names_parameters() {
        let person = Record::new("Person")
            .with("name", "ann")
            .with_link("location", Record::new("PersonLocation").with("id", 8_i64));
        let expr = field("name")
            .eq(var("p", person.clone()).member("name"))
            .and(field("location").eq(var("p", person).member("location")));
        let compiled = compile("Person", &expr, CompileMode::Parameterized).unwrap();
        let names: Vec<_> = compiled.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["p_name", "p_location"]);
        assert_eq!(compiled.params.variables().len(), 1);
        let values = compiled.params.values();
        assert_eq!(values["p_location"], Value::BigInt(8));
        assert_eq!(
            compiled.params.get("p_name").unwrap().db_type,
            Some(SqlType::Text)
        );
        assert_eq!(
            compiled.root.parameter_names(),
            vec!["p_name", "p_location"]
        );
    }

    #[test]
    fn unbound_parameters_compile() {
        let expr = field("name").ends_with(param_of("suffix", BindType::Text));
        let mut compiled = compile("Person", &expr, CompileMode::Parameterized).unwrap();
        assert!(compiled.params.unbound().is_some());
        compiled.params.set_variable("suffix", "son").unwrap();
        assert_eq!(
            compiled.params.require_values().unwrap()["suffix"],
            Value::Text("son".to_string())
        );
    }

    #[test]
    fn literal_mode_rejects_unbound_variables() {
        let expr = field("name").eq(param_of("n", BindType::Text));
        assert_eq!(
            compile("Person", &expr, CompileMode::Literal).unwrap_err(),
            BuildError::UnboundParameter {
                name: "n".to_string()
            }
        );
    }

    #[test]
    fn variable_chains_are_checked() {
        let expr = field("name").eq(var("n", "ann").member("len"));
        assert!(compile("Person", &expr, CompileMode::Literal).is_err());

        let person = Record::new("Person");
        let expr = field("name").eq(var("p", person).member("shoe_size"));
        assert!(matches!(
            compile("Person", &expr, CompileMode::Parameterized),
            Err(BuildError::UnknownMember { .. })
        ));
    }

    #[test]
    fn arithmetic_nests_inside_comparisons() {
        let raw = |s: &str| WhereNode::Constant(Constant::new(ConstantKind::Raw(s.into())));
        let compiled = compile("Person", &field("id").sub(1).ge(10), CompileMode::Literal).unwrap();
        assert_eq!(
            compiled.root,
            WhereGroup::binary(
                WhereGroup::binary(field_node("P", "id"), WhereOperator::Subtract, raw("1")).into(),
                WhereOperator::GreaterOrEqual,
                raw("10"),
            )
        );

        let expr = field("id").div(2).le(3).and(field("name").is_not_null());
        assert!(compile("Person", &expr, CompileMode::Literal).is_ok());
        assert!(compile("Person", &field("name").mul(2).le(3), CompileMode::Literal).is_err());
    }

    #[test]
    fn non_conditions_are_rejected() {
        assert!(compile("Person", &field("name"), CompileMode::Literal).is_err());
        assert!(compile("Person", &field("id").add(1), CompileMode::Literal).is_err());
        assert!(
            compile("Person", &field("id").add(1).gt(3), CompileMode::Literal).is_ok()
        );
    }

    #[test]
    fn list_variables_are_lists() {
        let ids = Bindable::from(vec![1_i64, 2]);
        let expr = field("id").is_in(var("ids", ids));
        let compiled = compile("Person", &expr, CompileMode::Parameterized).unwrap();
        assert_eq!(compiled.root.nodes[1], WhereNode::Operator(WhereOperator::In));
        assert_eq!(
            compiled.params.get("ids").unwrap().db_type,
            Some(SqlType::BigInt)
        );
    }
}
