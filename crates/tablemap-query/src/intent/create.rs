//! Insert intents.
//!
//! A concrete subtype is stored as one row per table of its inheritance
//! chain. The root row is written first; when the key is generated by the
//! backend it is fetched right after that insert and reused as the key of
//! every subtype row and of the link-table rows.

use tablemap_core::{BuildError, LinkKind, Record, Schema, TableId, Value};

use super::{source_value, target_key_name};
use crate::params::ParamValues;
use crate::render::{LINK_OWNER_PARAM, LINK_TARGET_PARAM};

/// Where the value of an inserted column comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    /// A plain member of the record
    Member(String),
    /// The key of a linked entity
    Link { member: String, key_member: String },
    /// The key generated by the root insert
    GeneratedKey,
    /// The concrete type name
    Discriminator(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertColumn {
    pub column: String,
    /// Parameter name, `{table}_{column}`
    pub param: String,
    pub source: ColumnSource,
}

/// Read back the generated key after an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFetch {
    pub column: String,
    pub member: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    pub table: TableId,
    pub storage_name: String,
    pub columns: Vec<InsertColumn>,
    pub key_fetch: Option<KeyFetch>,
}

/// Link-table rows written for one many-to-many member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInsert {
    /// Index into [`Schema::link_tables`]
    pub link: usize,
    pub member: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIntent {
    pub table: TableId,
    pub type_name: String,
    /// Root table first
    pub statements: Vec<InsertStatement>,
    pub links: Vec<LinkInsert>,
    pub key_member: String,
    pub key_generated: bool,
}

impl CreateIntent {
    pub fn build(schema: &Schema, table: TableId) -> Result<Self, BuildError> {
        let info = schema.table(table);
        if info.is_abstract {
            return Err(BuildError::AbstractType {
                type_name: info.type_name.clone(),
            });
        }
        let key = schema
            .key_member(table)
            .ok_or_else(|| BuildError::MissingPrimaryKey {
                type_name: info.type_name.clone(),
            })?;
        let key_generated = key.auto_generated;

        let mut statements = Vec::new();
        for id in schema.chain(table) {
            let t = schema.table(id);
            let mut columns = Vec::new();
            for m in &t.members {
                let source = match m.link {
                    LinkKind::Multiple => continue,
                    LinkKind::Parent if key_generated => ColumnSource::GeneratedKey,
                    LinkKind::Parent => ColumnSource::Member(m.name.clone()),
                    _ if m.is_discriminator => ColumnSource::Discriminator(info.type_name.clone()),
                    _ if m.auto_generated => continue,
                    LinkKind::Simple => ColumnSource::Link {
                        member: m.name.clone(),
                        key_member: target_key_name(schema, m.linked_table),
                    },
                    LinkKind::None => ColumnSource::Member(m.name.clone()),
                };
                columns.push(InsertColumn {
                    column: m.storage_name.clone(),
                    param: format!("{}_{}", t.storage_name, m.storage_name),
                    source,
                });
            }
            let key_fetch = (t.is_root() && key_generated).then(|| KeyFetch {
                column: key.storage_name.clone(),
                member: key.name.clone(),
            });
            statements.push(InsertStatement {
                table: id,
                storage_name: t.storage_name.clone(),
                columns,
                key_fetch,
            });
        }

        let links = schema
            .chain_members(table)
            .into_iter()
            .filter(|(_, m)| m.link == LinkKind::Multiple)
            .filter_map(|(owner, m)| {
                schema.link_table(owner, &m.name).map(|(link, _)| LinkInsert {
                    link,
                    member: m.name.clone(),
                })
            })
            .collect();

        tracing::trace!(
            type_name = %info.type_name,
            tables = statements.len(),
            key_generated,
            "built create intent"
        );

        Ok(Self {
            table,
            type_name: info.type_name.clone(),
            statements,
            links,
            key_member: key.name.clone(),
            key_generated,
        })
    }

    /// Parameter values of every insert statement. The generated key is
    /// left out until [`assign_generated_key`](Self::assign_generated_key).
    pub fn row_values(&self, record: &Record) -> ParamValues {
        self.statements
            .iter()
            .flat_map(|s| s.columns.iter())
            .filter_map(|c| source_value(&c.source, record).map(|v| (c.param.clone(), v)))
            .collect()
    }

    pub fn assign_generated_key(&self, values: &mut ParamValues, key: &Value) {
        for column in self.statements.iter().flat_map(|s| s.columns.iter()) {
            if column.source == ColumnSource::GeneratedKey {
                values.insert(column.param.clone(), key.clone());
            }
        }
    }

    /// The record's own key, when it is not generated.
    pub fn record_key(&self, record: &Record) -> Value {
        record.get(&self.key_member).cloned().unwrap_or(Value::Null)
    }

    /// Link-table rows to insert: `(index into self.links, values)`.
    pub fn link_rows(&self, record: &Record, key: &Value) -> Vec<(usize, ParamValues)> {
        let mut rows = Vec::new();
        for (i, link) in self.links.iter().enumerate() {
            for target in record.many(&link.member) {
                let mut values = ParamValues::new();
                values.insert(LINK_OWNER_PARAM.to_string(), key.clone());
                values.insert(LINK_TARGET_PARAM.to_string(), target.clone());
                rows.push((i, values));
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::schema;

    #[test]
    fn subtype_rows_follow_root_row() {
        let schema = schema();
        let cat = schema.id_of("Cat").unwrap();
        let intent = CreateIntent::build(&schema, cat).unwrap();
        let tables: Vec<_> = intent
            .statements
            .iter()
            .map(|s| s.storage_name.as_str())
            .collect();
        assert_eq!(tables, vec!["animal", "cat"]);
        assert!(intent.key_generated);
        assert_eq!(
            intent.statements[0].key_fetch,
            Some(KeyFetch {
                column: "id".to_string(),
                member: "id".to_string()
            })
        );
        assert!(intent.statements[1].key_fetch.is_none());

        let root_columns: Vec<_> = intent.statements[0]
            .columns
            .iter()
            .map(|c| c.column.as_str())
            .collect();
        assert_eq!(root_columns, vec!["name", "owner_id", "__type"]);
        assert_eq!(intent.statements[1].columns[0].source, ColumnSource::GeneratedKey);
    }

    #[test]
    fn abstract_types_cannot_be_created() {
        let schema = schema();
        let animal = schema.id_of("Animal").unwrap();
        assert_eq!(
            CreateIntent::build(&schema, animal).unwrap_err(),
            BuildError::AbstractType {
                type_name: "Animal".to_string()
            }
        );
    }

    #[test]
    fn row_values_read_record() {
        let schema = schema();
        let cat = schema.id_of("Cat").unwrap();
        let intent = CreateIntent::build(&schema, cat).unwrap();
        let record = Record::new("Cat")
            .with("name", "felix")
            .with("color", "brun")
            .with("owner", 3_i64);
        let mut values = intent.row_values(&record);
        assert_eq!(values["animal_name"], Value::Text("felix".to_string()));
        assert_eq!(values["animal_owner_id"], Value::BigInt(3));
        assert_eq!(values["animal___type"], Value::Text("Cat".to_string()));
        assert_eq!(values["cat_color"], Value::Text("brun".to_string()));
        assert!(!values.contains_key("cat_id"));

        intent.assign_generated_key(&mut values, &Value::BigInt(11));
        assert_eq!(values["cat_id"], Value::BigInt(11));
    }

    #[test]
    fn many_links_produce_link_rows() {
        let schema = schema();
        let person = schema.id_of("Person").unwrap();
        let intent = CreateIntent::build(&schema, person).unwrap();
        assert_eq!(intent.links.len(), 1);
        assert_eq!(intent.links[0].member, "friends");

        let record = Record::new("Person")
            .with("name", "ann")
            .with_many("friends", vec![Value::BigInt(2), Value::BigInt(5)]);
        let rows = intent.link_rows(&record, &Value::BigInt(9));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].1[LINK_OWNER_PARAM], Value::BigInt(9));
        assert_eq!(rows[1].1[LINK_TARGET_PARAM], Value::BigInt(5));
    }
}
