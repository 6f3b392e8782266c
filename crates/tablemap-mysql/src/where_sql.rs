//! WHERE tree rendering for MySQL.

use tablemap_core::Value;
use tablemap_query::{
    Constant, ConstantKind, FieldRef, LikeMode, RenderedSql, WhereGroup, WhereNode, WhereOperator,
};

use crate::types::{datetime_literal, escape_like, quote_identifier, quote_string};

/// Render a group with its parentheses.
pub fn render_group(group: &WhereGroup, out: &mut RenderedSql) {
    out.push_str(if group.negate { "NOT (" } else { "(" });
    if let Some((left, is_not)) = group.as_null_check() {
        render_node(left, out);
        out.push_str(if is_not { " IS NOT NULL" } else { " IS NULL" });
    } else {
        for node in &group.nodes {
            match node {
                WhereNode::Operator(op) => {
                    out.push_str(" ");
                    out.push_str(operator_sql(*op));
                    out.push_str(" ");
                }
                other => render_node(other, out),
            }
        }
    }
    out.push_str(")");
}

fn render_node(node: &WhereNode, out: &mut RenderedSql) {
    match node {
        WhereNode::Group(group) => render_group(group, out),
        WhereNode::Field(field) => out.push_str(&column(field)),
        WhereNode::Constant(constant) => render_constant(constant, out),
        WhereNode::Operator(op) => out.push_str(operator_sql(*op)),
    }
}

/// `alias.`column``
pub fn column(field: &FieldRef) -> String {
    format!("{}.{}", field.alias, quote_identifier(&field.column))
}

fn render_constant(constant: &Constant, out: &mut RenderedSql) {
    match &constant.kind {
        ConstantKind::Null => out.push_str("NULL"),
        ConstantKind::Bool(b) => out.push_str(if *b { "TRUE" } else { "FALSE" }),
        ConstantKind::String(s) => {
            let text = match constant.like {
                LikeMode::None => s.clone(),
                LikeMode::StartsWith => format!("{}%", escape_like(s)),
                LikeMode::EndsWith => format!("%{}", escape_like(s)),
                LikeMode::Contains => format!("%{}%", escape_like(s)),
            };
            out.push_str(&quote_string(&text));
        }
        ConstantKind::DateTime(dt) => out.push_str(&datetime_literal(dt)),
        ConstantKind::Raw(raw) => out.push_str(raw),
        ConstantKind::List(items) => out.push_str(&list_literal(items)),
        ConstantKind::Parameter(name) => match constant.like {
            LikeMode::None => out.push_param(name.clone()),
            LikeMode::StartsWith => {
                out.push_str("CONCAT(");
                push_like_param(name, out);
                out.push_str(", '%')");
            }
            LikeMode::EndsWith => {
                out.push_str("CONCAT('%', ");
                push_like_param(name, out);
                out.push_str(")");
            }
            LikeMode::Contains => {
                out.push_str("CONCAT('%', ");
                push_like_param(name, out);
                out.push_str(", '%')");
            }
        },
    }
}

/// Parameter slot whose bound text has backslash, `%` and `_` escaped on the
/// server, matching what [`escape_like`] does for literals.
fn push_like_param(name: &str, out: &mut RenderedSql) {
    out.push_str("REPLACE(REPLACE(REPLACE(");
    out.push_param(name.to_string());
    out.push_str(LIKE_PARAM_ESCAPES);
}

const LIKE_PARAM_ESCAPES: &str = r", '\\', '\\\\'), '%', '\\%'), '_', '\\_')";

/// Literal of a list. An empty list renders `('')` so that `IN` matches
/// nothing.
fn list_literal(items: &[Value]) -> String {
    if items.is_empty() {
        return "('')".to_string();
    }
    let parts: Vec<String> = items.iter().map(value_literal).collect();
    format!("({})", parts.join(", "))
}

/// Inline literal of a value.
pub fn value_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::TinyInt(_)
        | Value::SmallInt(_)
        | Value::Int(_)
        | Value::BigInt(_)
        | Value::Float(_)
        | Value::Double(_)
        | Value::Decimal(_) => value.to_string(),
        Value::Text(s) => quote_string(s),
        Value::DateTime(dt) => datetime_literal(dt),
        Value::Bytes(bytes) => hex_literal(bytes),
        Value::Uuid(bytes) => hex_literal(bytes),
        Value::Json(json) => quote_string(&json.to_string()),
        Value::Array(items) => list_literal(items),
    }
}

fn hex_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 3);
    out.push_str("X'");
    for byte in bytes {
        out.push_str(&format!("{byte:02X}"));
    }
    out.push('\'');
    out
}

pub const fn operator_sql(op: WhereOperator) -> &'static str {
    match op {
        WhereOperator::Equal => "=",
        WhereOperator::NotEqual => "<>",
        WhereOperator::Less => "<",
        WhereOperator::LessOrEqual => "<=",
        WhereOperator::Greater => ">",
        WhereOperator::GreaterOrEqual => ">=",
        WhereOperator::And => "AND",
        WhereOperator::Or => "OR",
        WhereOperator::Like => "LIKE",
        WhereOperator::In => "IN",
        WhereOperator::Add => "+",
        WhereOperator::Subtract => "-",
        WhereOperator::Multiply => "*",
        WhereOperator::Divide => "/",
        WhereOperator::Modulo => "%",
    }
}
