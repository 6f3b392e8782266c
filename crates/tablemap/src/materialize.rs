//! Row materialization.
//!
//! A query returns one row per root entity with every projected column
//! labelled `alias*column`. Each row is split back into the tables of the
//! entity's family, the discriminator picks the concrete type, and links
//! that were included become nested records. Rows keep their database order.

use std::collections::HashMap;

use tablemap_core::{
    Error, LinkKind, Record, Result, Row, Schema, TableId, TypeError, Value,
};
use tablemap_query::{LINK_OWNER_PARAM, LINK_TARGET_PARAM, QueryIntent};

/// Rebuild the root records of `rows`.
pub fn records(schema: &Schema, intent: &QueryIntent, rows: &[Row]) -> Result<Vec<Record>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(record) = record_at(schema, intent, row, "")? {
            out.push(record);
        }
    }
    tracing::trace!(rows = rows.len(), records = out.len(), "materialized rows");
    Ok(out)
}

/// Record of the entity loaded under `path`, or `None` when an outer join
/// found no row for it.
fn record_at(
    schema: &Schema,
    intent: &QueryIntent,
    row: &Row,
    path: &str,
) -> Result<Option<Record>> {
    let Some(entry) = intent.plan.path(path) else {
        return Ok(None);
    };
    let root = schema.root_of(entry.table);
    let Some(root_alias) = intent.plan.alias_in_family(entry, root) else {
        return Ok(None);
    };
    let Some(key) = schema.table(root).key_member() else {
        return Ok(None);
    };
    match row.get_aliased(root_alias, &key.storage_name) {
        None | Some(Value::Null) => return Ok(None),
        Some(_) => {}
    }

    let concrete = concrete_type(schema, intent, row, path, entry.table)?;
    let mut record = Record::new(schema.table(concrete).type_name.clone());

    for table in schema.chain(concrete) {
        let Some(alias) = intent.plan.alias_in_family(entry, table) else {
            continue;
        };
        for member in schema.table(table).stored_members() {
            if member.link == LinkKind::Parent || member.is_discriminator {
                continue;
            }
            let value = row
                .get_aliased(alias, &member.storage_name)
                .cloned()
                .unwrap_or(Value::Null);
            if member.link == LinkKind::Simple {
                let sub_path = if path.is_empty() {
                    member.name.clone()
                } else {
                    format!("{path}.{}", member.name)
                };
                if is_projected(intent, &sub_path) {
                    if let Some(linked) = record_at(schema, intent, row, &sub_path)? {
                        record.links.insert(member.name.clone(), linked);
                    }
                }
            }
            record.values.insert(member.name.clone(), value);
        }
    }
    Ok(Some(record))
}

fn is_projected(intent: &QueryIntent, path: &str) -> bool {
    intent
        .plan
        .path(path)
        .and_then(|entry| entry.family.first())
        .is_some_and(|&i| intent.plan.tables[i].projected)
}

/// Concrete type of a row, read from the hierarchy's discriminator.
fn concrete_type(
    schema: &Schema,
    intent: &QueryIntent,
    row: &Row,
    path: &str,
    loaded: TableId,
) -> Result<TableId> {
    let Some(field) = intent.discriminator(schema, path) else {
        return Ok(loaded);
    };
    let name = match row.get_aliased(&field.alias, &field.column) {
        Some(Value::Text(name)) => name,
        None | Some(Value::Null) => return Ok(loaded),
        Some(other) => {
            return Err(Error::Type(TypeError {
                expected: "type name",
                actual: other.type_name().to_string(),
                column: Some(field.column.clone()),
                rust_type: None,
            }));
        }
    };
    match schema.id_of(name) {
        Ok(id) if schema.is_same_or_descendant(id, loaded) => Ok(id),
        _ => Err(Error::Type(TypeError {
            expected: "mapped subtype",
            actual: name.clone(),
            column: Some(field.column.clone()),
            rust_type: None,
        })),
    }
}

/// Many-to-many members of the loaded records: `(link table index, owner
/// table, member)` for every member declared on a table some record's
/// chain passes through.
pub fn many_members(schema: &Schema, records: &[Record]) -> Vec<(usize, TableId, String)> {
    let mut members: Vec<(usize, TableId, String)> = Vec::new();
    for record in records {
        let Ok(table) = schema.id_of(&record.type_name) else {
            continue;
        };
        for (owner, member) in schema.chain_members(table) {
            if member.link != LinkKind::Multiple {
                continue;
            }
            if let Some((index, _)) = schema.link_table(owner, &member.name) {
                if !members.iter().any(|(i, _, _)| *i == index) {
                    members.push((index, owner, member.name.clone()));
                }
            }
        }
    }
    members
}

/// Keys of the records whose chain includes `owner`.
pub fn owner_keys(schema: &Schema, records: &[Record], owner: TableId) -> Vec<Value> {
    let Some(key) = schema.key_member(owner) else {
        return Vec::new();
    };
    records
        .iter()
        .filter(|r| {
            schema
                .id_of(&r.type_name)
                .is_ok_and(|t| schema.is_same_or_descendant(t, owner))
        })
        .filter_map(|r| r.get(&key.name).filter(|v| !v.is_null()).cloned())
        .collect()
}

/// Distribute link-select rows onto the owning records.
pub fn assign_many(
    schema: &Schema,
    records: &mut [Record],
    owner: TableId,
    member: &str,
    rows: &[Row],
) {
    let mut targets: HashMap<String, Vec<Value>> = HashMap::new();
    for row in rows {
        let (Some(o), Some(t)) = (
            row.get_by_name(LINK_OWNER_PARAM),
            row.get_by_name(LINK_TARGET_PARAM),
        ) else {
            continue;
        };
        targets.entry(o.to_string()).or_default().push(t.clone());
    }
    let Some(key) = schema.key_member(owner) else {
        return;
    };
    for record in records.iter_mut() {
        let owned = schema
            .id_of(&record.type_name)
            .is_ok_and(|t| schema.is_same_or_descendant(t, owner));
        if !owned {
            continue;
        }
        let ids = record
            .get(&key.name)
            .and_then(|k| targets.get(&k.to_string()))
            .cloned()
            .unwrap_or_default();
        record.many.insert(member.to_string(), ids);
    }
}
