//! [`SqlRenderer`] for MySQL.

use tablemap_core::{LinkTable, Schema, TableId, aliased_label};
use tablemap_query::{
    CreateIntent, DeleteIntent, JoinKind, JoinPlan, JoinedTable, LINK_OWNER_PARAM,
    LINK_OWNERS_PARAM, LINK_TARGET_PARAM, QueryIntent, RenderedCreate, RenderedSql,
    RenderedUpdate, SqlRenderer, TABLE_NAME_PARAM, UpdateIntent, WhereGroup,
};

use crate::config::MySqlConfig;
use crate::ddl;
use crate::types::{quote_identifier, quote_string};
use crate::where_sql::{column, render_group};

/// Largest row count MySQL accepts in `LIMIT`, used when only an offset is
/// given.
const NO_LIMIT: u64 = u64::MAX;

/// Renders intents as MySQL statements with `?` placeholders.
#[derive(Debug, Clone, Default)]
pub struct MySqlRenderer {
    config: MySqlConfig,
}

impl MySqlRenderer {
    pub fn new(config: MySqlConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MySqlConfig {
        &self.config
    }

    /// `FROM` clause with every join of the plan.
    fn from_clause(&self, schema: &Schema, plan: &JoinPlan) -> String {
        let mut sql = String::from("FROM ");
        for (i, joined) in plan.tables.iter().enumerate() {
            let table = quote_identifier(&schema.table(joined.table).storage_name);
            if i == 0 {
                sql.push_str(&format!("{table} {}", joined.alias));
                continue;
            }
            let own_key = key_column(schema, joined.table);
            let (join, on) = match &joined.kind {
                JoinKind::Root => continue,
                JoinKind::Parent { of, required } => {
                    let inner = *required && self.path_is_inner(plan, &joined.path);
                    (inner, format!("{}.{own_key} = {of}.{}", joined.alias, of_key(schema, plan, of)))
                }
                JoinKind::Child { of } => (
                    false,
                    format!("{}.{own_key} = {of}.{}", joined.alias, of_key(schema, plan, of)),
                ),
                JoinKind::Link {
                    from,
                    column,
                    nullable,
                    ..
                } => (
                    self.link_is_inner(*nullable) && self.path_is_inner(plan, &joined.path),
                    format!("{}.{own_key} = {from}.{}", joined.alias, quote_identifier(column)),
                ),
            };
            let join = if join { "INNER JOIN" } else { "LEFT OUTER JOIN" };
            sql.push_str(&format!(" {join} {table} {} ON {on}", joined.alias));
        }
        sql
    }

    fn link_is_inner(&self, nullable: bool) -> bool {
        self.config.inner_join_required_links && !nullable
    }

    /// Are all links leading to `path` inner joins? An inner join hanging off
    /// an outer-joined table would drop the rows the outer join kept.
    fn path_is_inner(&self, plan: &JoinPlan, path: &str) -> bool {
        plan.paths
            .iter()
            .filter(|entry| {
                !entry.path.is_empty()
                    && (entry.path == path || path.starts_with(&format!("{}.", entry.path)))
            })
            .all(|entry| match entry.family.first().map(|&i| &plan.tables[i].kind) {
                Some(JoinKind::Link { nullable, .. }) => self.link_is_inner(*nullable),
                _ => true,
            })
    }

    fn where_clause(&self, filter: Option<&WhereGroup>, out: &mut RenderedSql) {
        if let Some(group) = filter {
            out.push_str(" WHERE ");
            render_group(group, out);
        }
    }
}

fn key_column(schema: &Schema, table: TableId) -> String {
    quote_identifier(
        schema
            .table(table)
            .key_member()
            .map_or("id", |k| k.storage_name.as_str()),
    )
}

fn of_key(schema: &Schema, plan: &JoinPlan, alias: &str) -> String {
    plan.by_alias(alias)
        .map_or_else(|| quote_identifier("id"), |t: &JoinedTable| key_column(schema, t.table))
}

impl SqlRenderer for MySqlRenderer {
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_identifier(name)
    }

    fn render_where(&self, group: &WhereGroup) -> RenderedSql {
        let mut out = RenderedSql::new();
        render_group(group, &mut out);
        out
    }

    fn render_create(&self, schema: &Schema, intent: &CreateIntent) -> RenderedCreate {
        let inserts = intent
            .statements
            .iter()
            .map(|statement| {
                let mut sql = RenderedSql::from(format!(
                    "INSERT INTO {} (",
                    quote_identifier(&statement.storage_name)
                ));
                let columns: Vec<String> = statement
                    .columns
                    .iter()
                    .map(|c| quote_identifier(&c.column))
                    .collect();
                sql.push_str(&columns.join(", "));
                sql.push_str(") VALUES (");
                for (i, c) in statement.columns.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    sql.push_param(c.param.clone());
                }
                sql.push_str(")");
                if let Some(fetch) = &statement.key_fetch {
                    sql.push_str(&format!(
                        "; SELECT LAST_INSERT_ID() AS {}",
                        quote_identifier(&fetch.column)
                    ));
                }
                tracing::trace!(sql = %sql.text(), "rendered insert");
                sql
            })
            .collect();

        let links = intent
            .links
            .iter()
            .filter_map(|link| schema.link_tables().get(link.link))
            .map(|link| self.render_link_insert(link))
            .collect();

        RenderedCreate { inserts, links }
    }

    fn render_query(&self, schema: &Schema, intent: &QueryIntent) -> RenderedSql {
        let columns: Vec<String> = intent
            .projections
            .iter()
            .flat_map(|p| {
                p.columns.iter().map(move |c| {
                    format!(
                        "{}.{} AS \"{}\"",
                        p.alias,
                        quote_identifier(&c.column),
                        aliased_label(&p.alias, &c.column)
                    )
                })
            })
            .collect();

        let mut sql = RenderedSql::from(format!(
            "SELECT {} {}",
            columns.join(", "),
            self.from_clause(schema, &intent.plan)
        ));
        self.where_clause(intent.filter.as_ref(), &mut sql);

        if !intent.order.is_empty() {
            let order: Vec<String> = intent
                .order
                .iter()
                .map(|o| format!("{} {}", column(&o.field), o.direction.as_sql()))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }
        match (intent.limit, intent.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT {NO_LIMIT} OFFSET {offset}")),
            (None, None) => {}
        }

        tracing::trace!(sql = %sql.text(), "rendered query");
        sql
    }

    fn render_update(&self, schema: &Schema, intent: &UpdateIntent) -> RenderedUpdate {
        let root = quote_identifier(&schema.table(intent.root).storage_name);
        let from = self.from_clause(schema, &intent.plan);

        let mut select = RenderedSql::from(format!(
            "SELECT DISTINCT {} AS \"{}\" {from}",
            column(&intent.key),
            aliased_label(&intent.key.alias, &intent.key.column)
        ));
        self.where_clause(intent.filter.as_ref(), &mut select);

        // Multi-table UPDATE takes the joins right after the root table.
        let joins = from
            .strip_prefix(&format!("FROM {root} {}", intent.key.alias))
            .unwrap_or_default();
        let mut update = RenderedSql::from(format!("UPDATE {root} {}{joins} SET ", intent.key.alias));
        for (i, assignment) in intent.assignments.iter().enumerate() {
            if i > 0 {
                update.push_str(", ");
            }
            update.push_str(&format!("{} = ", column(&assignment.field)));
            update.push_param(assignment.param.clone());
        }
        self.where_clause(intent.filter.as_ref(), &mut update);

        tracing::trace!(select = %select.text(), update = %update.text(), "rendered update");
        RenderedUpdate { select, update }
    }

    /// Deletes from the hierarchy root only; subtype rows go through their
    /// `ON DELETE CASCADE` keys.
    fn render_delete(&self, schema: &Schema, intent: &DeleteIntent) -> RenderedSql {
        let mut sql = RenderedSql::from(format!(
            "DELETE {} {}",
            intent.root_alias,
            self.from_clause(schema, &intent.plan)
        ));
        self.where_clause(intent.filter.as_ref(), &mut sql);
        tracing::trace!(sql = %sql.text(), "rendered delete");
        sql
    }

    fn render_link_insert(&self, link: &LinkTable) -> RenderedSql {
        let mut sql = RenderedSql::from(format!(
            "INSERT INTO {} ({}, {}) VALUES (",
            quote_identifier(&link.storage_name),
            quote_identifier(&link.owner_column),
            quote_identifier(&link.target_column)
        ));
        sql.push_param(LINK_OWNER_PARAM);
        sql.push_str(", ");
        sql.push_param(LINK_TARGET_PARAM);
        sql.push_str(")");
        sql
    }

    fn render_link_select(&self, link: &LinkTable) -> RenderedSql {
        let owner = quote_identifier(&link.owner_column);
        let mut sql = RenderedSql::from(format!(
            "SELECT {owner} AS {}, {} AS {} FROM {} WHERE {owner} IN ",
            quote_identifier(LINK_OWNER_PARAM),
            quote_identifier(&link.target_column),
            quote_identifier(LINK_TARGET_PARAM),
            quote_identifier(&link.storage_name)
        ));
        sql.push_param(LINK_OWNERS_PARAM);
        sql
    }

    fn render_link_delete(&self, link: &LinkTable) -> RenderedSql {
        let mut sql = RenderedSql::from(format!(
            "DELETE FROM {} WHERE {} = ",
            quote_identifier(&link.storage_name),
            quote_identifier(&link.owner_column)
        ));
        sql.push_param(LINK_OWNER_PARAM);
        sql
    }

    fn render_table_exists(&self) -> RenderedSql {
        let database = self
            .config
            .database
            .as_deref()
            .map_or_else(|| "DATABASE()".to_string(), quote_string);
        let mut sql = RenderedSql::from(format!(
            "SELECT COUNT(*) AS `count` FROM information_schema.tables \
             WHERE table_schema = {database} AND table_name = "
        ));
        sql.push_param(TABLE_NAME_PARAM);
        sql
    }

    fn render_create_table(&self, schema: &Schema, table: TableId) -> Vec<String> {
        ddl::create_table(schema, table, &self.config)
    }

    fn render_create_link_table(&self, schema: &Schema, link: &LinkTable) -> Vec<String> {
        ddl::create_link_table(schema, link, &self.config)
    }
}
