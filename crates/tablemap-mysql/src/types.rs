//! Mapping of portable storage types onto MySQL column types.

use chrono::NaiveDateTime;
use tablemap_core::{LinkKind, SqlType, TableMemberInfo};

/// Length used for text columns that must be indexable.
pub const INDEXED_TEXT_LENGTH: u32 = 255;

/// Largest length rendered as `VARCHAR` for a text member with a
/// `max_length`.
const MAX_VARCHAR: u32 = 16_383;

/// Column type of a plain storage type.
pub fn mysql_type(sql_type: SqlType) -> String {
    match sql_type {
        SqlType::TinyInt => "TINYINT".to_string(),
        SqlType::SmallInt => "SMALLINT".to_string(),
        SqlType::Integer => "INT".to_string(),
        SqlType::BigInt => "BIGINT".to_string(),
        SqlType::Real => "FLOAT".to_string(),
        SqlType::Double => "DOUBLE".to_string(),
        SqlType::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
        SqlType::Boolean => "TINYINT(1)".to_string(),
        SqlType::Char(len) => format!("CHAR({len})"),
        SqlType::VarChar(len) => format!("VARCHAR({len})"),
        SqlType::Text => "TEXT".to_string(),
        SqlType::Blob => "LONGBLOB".to_string(),
        SqlType::Date => "DATE".to_string(),
        SqlType::Time => "TIME".to_string(),
        SqlType::DateTime => "DATETIME(6)".to_string(),
        SqlType::Timestamp => "TIMESTAMP(6)".to_string(),
        SqlType::Uuid => "BINARY(16)".to_string(),
        SqlType::Json => "JSON".to_string(),
        SqlType::Custom(name) => name.to_string(),
    }
}

/// Column type of a member. Text members that are keys, unique, links or
/// bounded by `max_length` become `VARCHAR` so they can be indexed.
pub fn member_type(member: &TableMemberInfo) -> String {
    if member.sql_type == SqlType::Text {
        let indexed = member.primary_key
            || member.unique
            || member.link != LinkKind::None
            || member.is_discriminator;
        match member.max_length {
            Some(len) if len <= MAX_VARCHAR => return format!("VARCHAR({len})"),
            _ if indexed => return format!("VARCHAR({INDEXED_TEXT_LENGTH})"),
            _ => {}
        }
    }
    mysql_type(member.sql_type)
}

/// Quote an identifier with backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a string literal.
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Escape LIKE wildcards so the value matches literally.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Datetime literal with microseconds.
pub fn datetime_literal(value: &NaiveDateTime) -> String {
    format!("'{}'", value.format("%Y-%m-%d %H:%M:%S%.6f"))
}
