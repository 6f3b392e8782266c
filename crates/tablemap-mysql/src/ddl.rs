//! MySQL DDL generation.
//!
//! `create_table` returns the `CREATE TABLE` statement first, followed by
//! one `ALTER TABLE ... ADD CONSTRAINT` per foreign-key link. Link targets
//! may be created later than their owners (or be the owner itself), so
//! callers run every create before any of the trailing constraints.
//! Inheritance constraints stay inline: parents are always created first.

use tablemap_core::{LinkKind, LinkTable, ReferentialAction, Schema, SqlType, TableId};

use crate::config::MySqlConfig;
use crate::types::{INDEXED_TEXT_LENGTH, member_type, mysql_type, quote_identifier};

/// Statements creating the table of `table`.
pub fn create_table(schema: &Schema, table: TableId, config: &MySqlConfig) -> Vec<String> {
    let info = schema.table(table);
    let name = quote_identifier(&info.storage_name);
    let mut lines = Vec::new();
    let mut alters = Vec::new();

    for m in info.stored_members() {
        let mut line = format!("{} {}", quote_identifier(&m.storage_name), member_type(m));
        if !m.nullable || m.primary_key {
            line.push_str(" NOT NULL");
        }
        if m.auto_generated && m.sql_type.is_integer() {
            line.push_str(" AUTO_INCREMENT");
        }
        lines.push(line);
    }

    let pk: Vec<String> = info
        .primary_key
        .iter()
        .filter_map(|&i| info.members.get(i))
        .map(|m| quote_identifier(&m.storage_name))
        .collect();
    if !pk.is_empty() {
        lines.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }

    for m in info.stored_members().filter(|m| m.unique && !m.primary_key) {
        lines.push(format!(
            "UNIQUE KEY {} ({})",
            quote_identifier(&format!("uq_{}_{}", info.storage_name, m.storage_name)),
            quote_identifier(&m.storage_name)
        ));
    }

    for m in info.stored_members() {
        let Some(target) = m.linked_table else {
            continue;
        };
        let target_info = schema.table(target);
        let target_key = target_info
            .key_member()
            .map_or("id", |k| k.storage_name.as_str());
        let constraint = quote_identifier(&format!("fk_{}_{}", info.storage_name, m.storage_name));
        let references = format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_identifier(&m.storage_name),
            quote_identifier(&target_info.storage_name),
            quote_identifier(target_key)
        );
        match m.link {
            LinkKind::Parent => {
                lines.push(format!(
                    "CONSTRAINT {constraint} {references} ON DELETE CASCADE"
                ));
            }
            LinkKind::Simple => {
                alters.push(format!(
                    "ALTER TABLE {name} ADD CONSTRAINT {constraint} {references}{}",
                    on_delete(m.on_delete)
                ));
            }
            LinkKind::None | LinkKind::Multiple => {}
        }
    }

    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {name} (\n  {}\n) ENGINE={} DEFAULT CHARSET={}",
        lines.join(",\n  "),
        config.engine,
        config.charset
    );
    tracing::debug!(table = %info.storage_name, constraints = alters.len(), "generated CREATE TABLE");
    tracing::trace!(sql = %sql, "MySQL DDL statement");

    let mut statements = vec![sql];
    statements.extend(alters);
    statements
}

/// Statements creating the intermediate table of a many-to-many member.
/// Both key columns cascade, so link rows go with either side.
pub fn create_link_table(schema: &Schema, link: &LinkTable, config: &MySqlConfig) -> Vec<String> {
    let name = quote_identifier(&link.storage_name);
    let owner = schema.table(link.owner);
    let target = schema.table(link.target);
    let owner_col = quote_identifier(&link.owner_column);
    let target_col = quote_identifier(&link.target_column);
    let key_of = |info: &tablemap_core::TableInfo| {
        quote_identifier(info.key_member().map_or("id", |k| k.storage_name.as_str()))
    };

    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {name} (\n  \
         {owner_col} {} NOT NULL,\n  \
         {target_col} {} NOT NULL,\n  \
         PRIMARY KEY ({owner_col}, {target_col})\n\
         ) ENGINE={} DEFAULT CHARSET={}",
        key_type(link.owner_type),
        key_type(link.target_type),
        config.engine,
        config.charset
    );
    let owner_fk = format!(
        "ALTER TABLE {name} ADD CONSTRAINT {} FOREIGN KEY ({owner_col}) REFERENCES {} ({}) ON DELETE CASCADE",
        quote_identifier(&format!("fk_{}_{}", link.storage_name, link.owner_column)),
        quote_identifier(&owner.storage_name),
        key_of(owner)
    );
    let target_fk = format!(
        "ALTER TABLE {name} ADD CONSTRAINT {} FOREIGN KEY ({target_col}) REFERENCES {} ({}) ON DELETE CASCADE",
        quote_identifier(&format!("fk_{}_{}", link.storage_name, link.target_column)),
        quote_identifier(&target.storage_name),
        key_of(target)
    );

    tracing::debug!(table = %link.storage_name, "generated CREATE TABLE for link table");
    tracing::trace!(sql = %sql, "MySQL DDL statement");
    vec![sql, owner_fk, target_fk]
}

fn key_type(sql_type: SqlType) -> String {
    if sql_type == SqlType::Text {
        format!("VARCHAR({INDEXED_TEXT_LENGTH})")
    } else {
        mysql_type(sql_type)
    }
}

fn on_delete(action: Option<ReferentialAction>) -> String {
    match action {
        None | Some(ReferentialAction::NoAction) => String::new(),
        Some(action) => format!(" ON DELETE {}", action.as_sql()),
    }
}
