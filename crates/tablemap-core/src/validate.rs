//! Member constraint checks run before writes.
//!
//! Checks come from the schema: non-nullable members must carry a value,
//! `max_length` bounds text members and `pattern` must match text members.
//! Keys generated by the backend and the discriminator are never checked.

use crate::entity::Record;
use crate::error::ValidationError;
use crate::schema::{LinkKind, Schema, TableId, TableMemberInfo};
use crate::value::Value;

/// Validate a record against every member of the concrete table's chain.
pub fn validate_record(
    schema: &Schema,
    table: TableId,
    record: &Record,
) -> Result<(), ValidationError> {
    let mut errors = ValidationError::new();

    for (_, member) in schema.chain_members(table) {
        if member.auto_generated || member.is_discriminator || member.link == LinkKind::Multiple {
            continue;
        }
        let value = member_value(schema, member, record);
        match value {
            None => {
                if !member.nullable {
                    errors.add_required(&member.name);
                }
            }
            Some(Value::Text(text)) => check_text(member, &text, &mut errors),
            Some(_) => {}
        }
    }

    if !errors.is_empty() {
        tracing::debug!(
            type_name = %record.type_name,
            failures = errors.errors.len(),
            "record failed validation"
        );
    }
    errors.into_result()
}

fn member_value(schema: &Schema, member: &TableMemberInfo, record: &Record) -> Option<Value> {
    match member.link {
        LinkKind::Simple => {
            let key = member
                .linked_table
                .and_then(|target| schema.key_member(target))
                .map_or("id", |m| m.name.as_str());
            record.link_id(&member.name, key)
        }
        _ => record.get(&member.name).filter(|v| !v.is_null()).cloned(),
    }
}

fn check_text(member: &TableMemberInfo, text: &str, errors: &mut ValidationError) {
    let limit = member.max_length.or_else(|| member.sql_type.char_length());
    if let Some(max) = limit {
        let len = text.chars().count();
        if len > max as usize {
            errors.add_max_length(&member.name, max, len);
        }
    }
    if let Some(pattern) = &member.pattern {
        if !pattern.is_match(text) {
            errors.add_pattern(&member.name, pattern.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationErrorKind;
    use crate::schema::{EntityDescriptor, MemberDescriptor};
    use crate::types::SqlType;

    fn schema() -> Schema {
        Schema::builder()
            .register_descriptor(
                EntityDescriptor::new("Location", "location").member(MemberDescriptor::key("id")),
            )
            .register_descriptor(
                EntityDescriptor::new("Person", "person")
                    .member(MemberDescriptor::key("id"))
                    .member(MemberDescriptor::new("name", SqlType::VarChar(5)))
                    .member(
                        MemberDescriptor::of::<Option<String>>("email").pattern(r"^[^@]+@[^@]+$"),
                    )
                    .member(MemberDescriptor::link("location", "Location")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn accepts_valid_record() {
        let schema = schema();
        let person = schema.id_of("Person").unwrap();
        let record = Record::new("Person")
            .with("name", "ann")
            .with("email", "ann@example.org")
            .with_link("location", Record::new("Location").with("id", 3_i64));
        assert!(validate_record(&schema, person, &record).is_ok());
    }

    #[test]
    fn reports_every_failure() {
        let schema = schema();
        let person = schema.id_of("Person").unwrap();
        let record = Record::new("Person")
            .with("name", "bartholomew")
            .with("email", "not-an-address");
        let err = validate_record(&schema, person, &record).unwrap_err();
        let kinds: Vec<_> = err.errors.iter().map(|e| (e.field.as_str(), e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("name", ValidationErrorKind::MaxLength),
                ("email", ValidationErrorKind::Pattern),
                ("location", ValidationErrorKind::Required),
            ]
        );
    }
}
