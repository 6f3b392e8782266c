//! The engine: schema, connection and renderer wired together.
//!
//! Every public operation returns a [`ResultWithError`]. Build errors met
//! while preparing a statement, backend failures and validation failures
//! are all carried as [`DataError`]s; nothing here panics or returns early
//! through `?` to the caller.

use std::sync::Arc;

use tablemap_core::{
    BuildError, Connection, Cx, DataError, DataErrorCode, Entity, Error, Outcome, Record,
    ResultWithError, Row, Schema, TableId, TransactionOps, Value, validate_record,
};
use tablemap_mysql::MySqlRenderer;
use tablemap_query::{
    BindType, BoundSql, CreateIntent, DeleteBuilder, DeleteIntent, Expr, KEY_PARAM,
    LINK_OWNER_PARAM, LINK_OWNERS_PARAM, LINK_TARGET_PARAM, ParamValues, Parameterized,
    QueryBuilder, QueryIntent, RenderedCreate, RenderedSql, RenderedUpdate, SqlRenderer,
    StatementCache, TABLE_NAME_PARAM, UpdateBuilder, UpdateIntent, field, param_of,
};

use crate::config::EngineConfig;
use crate::materialize;
use crate::query::CompiledQuery;

// ==================== Prepared statements ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Lookup {
    All,
    ByKey,
}

#[derive(Debug)]
struct PreparedCreate {
    intent: CreateIntent,
    rendered: RenderedCreate,
}

#[derive(Debug)]
struct PreparedUpdate {
    intent: UpdateIntent,
    rendered: RenderedUpdate,
    /// Aligned with `intent.links`
    link_deletes: Vec<RenderedSql>,
    link_inserts: Vec<RenderedSql>,
}

#[derive(Debug)]
struct PreparedDelete {
    intent: DeleteIntent,
    sql: RenderedSql,
}

#[derive(Debug)]
struct PreparedQuery {
    intent: QueryIntent,
    sql: RenderedSql,
}

// ==================== Engine ====================

/// Maps entities onto tables through one connection and one SQL dialect.
///
/// Statements for by-key operations are rendered once per type and kept in
/// statement caches; filtered operations are rendered per call, or once
/// through [`compile_query`](Self::compile_query).
pub struct Engine<C, R = MySqlRenderer> {
    schema: Arc<Schema>,
    conn: C,
    renderer: R,
    config: EngineConfig,
    creates: StatementCache<TableId, PreparedCreate>,
    updates: StatementCache<TableId, PreparedUpdate>,
    deletes: StatementCache<TableId, PreparedDelete>,
    selects: StatementCache<(TableId, Lookup), PreparedQuery>,
}

impl<C: Connection> Engine<C, MySqlRenderer> {
    /// An engine rendering MySQL with default settings.
    pub fn mysql(schema: impl Into<Arc<Schema>>, conn: C) -> Self {
        Self::new(schema, conn, MySqlRenderer::default(), EngineConfig::default())
    }
}

impl<C: Connection, R: SqlRenderer> Engine<C, R> {
    pub fn new(
        schema: impl Into<Arc<Schema>>,
        conn: C,
        renderer: R,
        config: EngineConfig,
    ) -> Self {
        let size = config.statement_cache_size;
        Self {
            schema: schema.into(),
            conn,
            renderer,
            config,
            creates: StatementCache::new(size),
            updates: StatementCache::new(size),
            deletes: StatementCache::new(size),
            selects: StatementCache::new(size),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ==================== Bootstrap ====================

    /// Check the connection and, when configured, create missing tables.
    ///
    /// Tables are created roots first, then link tables. Foreign-key
    /// constraints between tables run once every table exists.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn connect(&self, cx: &Cx) -> ResultWithError<()> {
        carried(self.connect_inner(cx).await)
    }

    async fn connect_inner(&self, cx: &Cx) -> Result<(), DataError> {
        from_outcome(self.conn.ping(cx).await)?;
        if !self.config.create_missing_tables {
            return Ok(());
        }

        let mut tables: Vec<TableId> = self.schema.tables().map(|t| t.id).collect();
        tables.sort_by_key(|&id| self.schema.ancestors(id).len());

        let mut constraints = Vec::new();
        for id in tables {
            let storage_name = &self.schema.table(id).storage_name;
            if self.table_exists(cx, storage_name).await? {
                continue;
            }
            let mut statements = self.renderer.render_create_table(&self.schema, id).into_iter();
            if let Some(create) = statements.next() {
                self.execute_text(cx, &create).await?;
            }
            constraints.extend(statements);
            tracing::info!(table = %storage_name, "created table");
        }
        for link in self.schema.link_tables() {
            if self.table_exists(cx, &link.storage_name).await? {
                continue;
            }
            let mut statements = self
                .renderer
                .render_create_link_table(&self.schema, link)
                .into_iter();
            if let Some(create) = statements.next() {
                self.execute_text(cx, &create).await?;
            }
            constraints.extend(statements);
            tracing::info!(table = %link.storage_name, "created link table");
        }
        for sql in constraints {
            self.execute_text(cx, &sql).await?;
        }
        Ok(())
    }

    async fn table_exists(&self, cx: &Cx, storage_name: &str) -> Result<bool, DataError> {
        let mut values = ParamValues::new();
        values.insert(
            TABLE_NAME_PARAM.to_string(),
            Value::Text(storage_name.to_string()),
        );
        let bound = self.renderer.bind(&self.renderer.render_table_exists(), &values)?;
        let rows = self.query_rows(cx, &bound).await?;
        let count = rows
            .first()
            .and_then(|row| row.get_by_name("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(count > 0)
    }

    // ==================== Create ====================

    /// Insert one entity and write its generated key back.
    pub async fn create<E: Entity>(&self, cx: &Cx, entity: &mut E) -> ResultWithError<()> {
        carried(self.create_one(cx, entity).await)
    }

    /// Insert entities one transaction each. A failed item is rolled back
    /// and keeps its original key; the others are stored.
    #[tracing::instrument(level = "debug", skip_all, fields(type_name = E::TYPE_NAME, count = entities.len()))]
    pub async fn create_many<E: Entity>(&self, cx: &Cx, entities: &mut [E]) -> ResultWithError<()> {
        let mut errors = Vec::new();
        for (index, entity) in entities.iter_mut().enumerate() {
            if let Err(error) = self.create_one(cx, entity).await {
                tracing::warn!(item = index, error = %error, "create failed");
                errors.push(error.at(index));
            }
        }
        ResultWithError::partial((), errors)
    }

    async fn create_one<E: Entity>(&self, cx: &Cx, entity: &mut E) -> Result<(), DataError> {
        let record = entity.to_record();
        let table = self.concrete_table::<E>(&record)?;
        self.validate(table, &record)?;
        let prepared = self
            .creates
            .get_or_try_insert(table, || self.prepare_create(table))?;

        let tx = from_outcome(self.conn.begin_with(cx, self.config.isolation).await)?;
        let inserted = self.insert_rows(cx, &tx, &prepared, &record).await;
        let key = match inserted {
            Ok(key) => key,
            Err(error) => {
                rollback(cx, tx).await;
                return Err(error);
            }
        };
        from_outcome(tx.commit(cx).await)?;

        if prepared.intent.key_generated {
            entity
                .set_member(&prepared.intent.key_member, key)
                .map_err(DataError::from)?;
        }
        Ok(())
    }

    fn prepare_create(&self, table: TableId) -> Result<PreparedCreate, BuildError> {
        let intent = CreateIntent::build(&self.schema, table)?;
        let rendered = self.renderer.render_create(&self.schema, &intent);
        Ok(PreparedCreate { intent, rendered })
    }

    /// Root row first, then subtype rows carrying the key, then link rows.
    async fn insert_rows<T: TransactionOps>(
        &self,
        cx: &Cx,
        tx: &T,
        prepared: &PreparedCreate,
        record: &Record,
    ) -> Result<Value, DataError> {
        let intent = &prepared.intent;
        let mut values = intent.row_values(record);
        let mut key = intent.record_key(record);

        for (statement, sql) in intent.statements.iter().zip(&prepared.rendered.inserts) {
            let bound = self.renderer.bind(sql, &values)?;
            let Some(fetch) = &statement.key_fetch else {
                tx_execute(cx, tx, &bound).await?;
                continue;
            };
            let rows = tx_query(cx, tx, &bound).await?;
            key = rows
                .first()
                .and_then(|row| row.get_by_name(&fetch.column))
                .filter(|v| !v.is_null())
                .cloned()
                .ok_or_else(|| {
                    DataError::new(
                        DataErrorCode::UnknownError,
                        format!("no generated key returned for {}", intent.type_name),
                    )
                })?;
            intent.assign_generated_key(&mut values, &key);
        }

        for (link, link_values) in intent.link_rows(record, &key) {
            let sql = prepared
                .rendered
                .links
                .get(link)
                .ok_or_else(|| BuildError::unsupported("link insert was not rendered"))?;
            let bound = self.renderer.bind(sql, &link_values)?;
            tx_execute(cx, tx, &bound).await?;
        }
        Ok(key)
    }

    // ==================== Read ====================

    /// Every stored entity of `E`, subtypes included.
    pub async fn get_all<E: Entity>(&self, cx: &Cx) -> ResultWithError<Vec<E>> {
        let prepared = match self.prepared_select::<E>(Lookup::All) {
            Ok(prepared) => prepared,
            Err(error) => return ResultWithError::failed(error),
        };
        self.fetch(cx, &prepared.intent, &prepared.sql, &ParamValues::new())
            .await
    }

    /// The entity with key `id`, `ItemNotFound` when there is none.
    pub async fn get_by_id<E: Entity>(&self, cx: &Cx, id: impl Into<Value>) -> ResultWithError<E> {
        carried(self.get_by_id_inner(cx, id.into()).await)
    }

    async fn get_by_id_inner<E: Entity>(&self, cx: &Cx, id: Value) -> Result<E, DataError> {
        let prepared = self.prepared_select::<E>(Lookup::ByKey)?;
        let mut params = prepared.intent.params.clone();
        params.set_variable(KEY_PARAM, id)?;
        let values = params.require_values()?;
        let records = self
            .load_records(cx, &prepared.intent, &prepared.sql, &values)
            .await?;
        let record = records
            .first()
            .ok_or_else(|| DataError::not_found(E::TYPE_NAME))?;
        E::from_record(record).map_err(DataError::from)
    }

    /// Entities of `E` matching `filter`, with captured variables inlined.
    pub async fn where_<E: Entity>(&self, cx: &Cx, filter: Expr) -> ResultWithError<Vec<E>> {
        let compiled = self
            .query::<E>()
            .and_then(|builder| builder.filter(filter))
            .and_then(|builder| self.compile_query::<E>(builder));
        match compiled {
            Ok(compiled) => self.run_query(cx, &compiled).await,
            Err(error) => ResultWithError::failed(error),
        }
    }

    /// Start a query over `E`.
    pub fn query<E: Entity>(&self) -> Result<QueryBuilder<'_>, BuildError> {
        QueryBuilder::for_type::<E>(&self.schema)
    }

    /// Render a query once for repeated execution.
    pub fn compile_query<E: Entity>(
        &self,
        builder: QueryBuilder<'_>,
    ) -> Result<CompiledQuery<E>, BuildError> {
        let intent = builder.build();
        let table = self.schema.id_of(E::TYPE_NAME)?;
        if !self.schema.is_same_or_descendant(intent.root, table) {
            return Err(BuildError::unsupported(format!(
                "a query over '{}' cannot load '{}'",
                self.schema.table(intent.root).type_name,
                E::TYPE_NAME
            )));
        }
        let sql = self.renderer.render_query(&self.schema, &intent);
        Ok(CompiledQuery::new(intent, sql))
    }

    /// Execute a compiled query with its current parameter values.
    pub async fn run_query<E: Entity>(
        &self,
        cx: &Cx,
        query: &CompiledQuery<E>,
    ) -> ResultWithError<Vec<E>> {
        match query.param_values() {
            Ok(values) => self.fetch(cx, query.intent(), query.sql(), &values).await,
            Err(error) => ResultWithError::failed(error),
        }
    }

    fn prepared_select<E: Entity>(&self, lookup: Lookup) -> Result<Arc<PreparedQuery>, BuildError> {
        let table = self.schema.id_of(E::TYPE_NAME)?;
        self.selects
            .get_or_try_insert((table, lookup), || self.prepare_select(table, lookup))
    }

    fn prepare_select(&self, table: TableId, lookup: Lookup) -> Result<PreparedQuery, BuildError> {
        let builder = QueryBuilder::new(&self.schema, table);
        let builder = match lookup {
            Lookup::All => builder,
            Lookup::ByKey => builder.filter_with_parameters(
                field(self.key_name(table)?).eq(param_of(KEY_PARAM, BindType::Any)),
            )?,
        };
        let intent = builder.build();
        let sql = self.renderer.render_query(&self.schema, &intent);
        Ok(PreparedQuery { intent, sql })
    }

    /// Load records and convert them. Records that fail to convert are
    /// reported by position and left out.
    async fn fetch<E: Entity>(
        &self,
        cx: &Cx,
        intent: &QueryIntent,
        sql: &RenderedSql,
        values: &ParamValues,
    ) -> ResultWithError<Vec<E>> {
        let records = match self.load_records(cx, intent, sql, values).await {
            Ok(records) => records,
            Err(error) => return ResultWithError::failed(error),
        };
        let mut entities = Vec::with_capacity(records.len());
        let mut errors = Vec::new();
        for (index, record) in records.iter().enumerate() {
            match E::from_record(record) {
                Ok(entity) => entities.push(entity),
                Err(error) => errors.push(DataError::from(&error).at(index)),
            }
        }
        ResultWithError::partial(entities, errors)
    }

    async fn load_records(
        &self,
        cx: &Cx,
        intent: &QueryIntent,
        sql: &RenderedSql,
        values: &ParamValues,
    ) -> Result<Vec<Record>, DataError> {
        let bound = self.renderer.bind(sql, values)?;
        let rows = self.query_rows(cx, &bound).await?;
        let mut records = materialize::records(&self.schema, intent, &rows)?;

        for (index, owner, member) in materialize::many_members(&self.schema, &records) {
            let Some(link) = self.schema.link_tables().get(index) else {
                continue;
            };
            let keys = materialize::owner_keys(&self.schema, &records, owner);
            if keys.is_empty() {
                continue;
            }
            let mut link_values = ParamValues::new();
            link_values.insert(LINK_OWNERS_PARAM.to_string(), Value::Array(keys));
            let bound = self
                .renderer
                .bind(&self.renderer.render_link_select(link), &link_values)?;
            let rows = self.query_rows(cx, &bound).await?;
            materialize::assign_many(&self.schema, &mut records, owner, &member, &rows);
        }
        Ok(records)
    }

    // ==================== Update ====================

    /// Write every member of `entity`, matched by its key.
    pub async fn update<E: Entity>(&self, cx: &Cx, entity: &E) -> ResultWithError<()> {
        carried(self.update_one(cx, entity).await)
    }

    async fn update_one<E: Entity>(&self, cx: &Cx, entity: &E) -> Result<(), DataError> {
        let record = entity.to_record();
        let table = self.concrete_table::<E>(&record)?;
        self.validate(table, &record)?;
        let prepared = self
            .updates
            .get_or_try_insert(table, || self.prepare_update(table))?;
        let key = self.record_key(table, &record)?;

        let mut params = prepared.intent.params.clone();
        params.set_variable(KEY_PARAM, key.clone())?;
        let mut values = params.require_values()?;
        values.extend(prepared.intent.row_values(&record));

        let tx = from_outcome(self.conn.begin_with(cx, self.config.isolation).await)?;
        let updated = self
            .update_rows(cx, &tx, &prepared, &values, &record, &key)
            .await;
        match updated {
            Ok(true) => from_outcome(tx.commit(cx).await),
            Ok(false) => {
                rollback(cx, tx).await;
                Err(DataError::not_found(E::TYPE_NAME))
            }
            Err(error) => {
                rollback(cx, tx).await;
                Err(error)
            }
        }
    }

    fn prepare_update(&self, table: TableId) -> Result<PreparedUpdate, BuildError> {
        let intent = UpdateIntent::by_primary_key(&self.schema, table)?;
        let rendered = self.renderer.render_update(&self.schema, &intent);
        let mut link_deletes = Vec::new();
        let mut link_inserts = Vec::new();
        for insert in &intent.links {
            let link = self
                .schema
                .link_tables()
                .get(insert.link)
                .ok_or_else(|| BuildError::unsupported("link table is not registered"))?;
            link_deletes.push(self.renderer.render_link_delete(link));
            link_inserts.push(self.renderer.render_link_insert(link));
        }
        Ok(PreparedUpdate {
            intent,
            rendered,
            link_deletes,
            link_inserts,
        })
    }

    /// Returns `false` when no row matched the key.
    async fn update_rows<T: TransactionOps>(
        &self,
        cx: &Cx,
        tx: &T,
        prepared: &PreparedUpdate,
        values: &ParamValues,
        record: &Record,
        key: &Value,
    ) -> Result<bool, DataError> {
        let select = self.renderer.bind(&prepared.rendered.select, values)?;
        if tx_query(cx, tx, &select).await?.is_empty() {
            return Ok(false);
        }
        let update = self.renderer.bind(&prepared.rendered.update, values)?;
        tx_execute(cx, tx, &update).await?;

        let links = prepared
            .intent
            .links
            .iter()
            .zip(prepared.link_deletes.iter().zip(&prepared.link_inserts));
        for (link, (delete, insert)) in links {
            let mut link_values = ParamValues::new();
            link_values.insert(LINK_OWNER_PARAM.to_string(), key.clone());
            tx_execute(cx, tx, &self.renderer.bind(delete, &link_values)?).await?;
            for target in record.many(&link.member) {
                link_values.insert(LINK_TARGET_PARAM.to_string(), target.clone());
                tx_execute(cx, tx, &self.renderer.bind(insert, &link_values)?).await?;
            }
        }
        Ok(true)
    }

    /// Apply an update to every match of the builder's filter, taking the
    /// assigned values from `values`, and return the updated entities.
    #[tracing::instrument(level = "debug", skip_all, fields(type_name = E::TYPE_NAME))]
    pub async fn update_where<E: Entity>(
        &self,
        cx: &Cx,
        builder: UpdateBuilder<'_>,
        values: &E,
    ) -> ResultWithError<Vec<E>> {
        match self.update_matching::<E>(cx, builder, values).await {
            Ok(Some(reload)) => self.run_query(cx, &reload).await,
            Ok(None) => ResultWithError::ok(Vec::new()),
            Err(error) => ResultWithError::failed(error),
        }
    }

    /// Run the companion select and the update; returns the reload query of
    /// the touched keys, `None` when nothing matched.
    async fn update_matching<E: Entity>(
        &self,
        cx: &Cx,
        builder: UpdateBuilder<'_>,
        entity: &E,
    ) -> Result<Option<CompiledQuery<E>>, DataError> {
        let intent = builder.build()?;
        let base = self.schema.id_of(E::TYPE_NAME)?;
        if !self.schema.is_same_or_descendant(intent.root, base) {
            return Err(BuildError::unsupported(format!(
                "an update of '{}' cannot return '{}'",
                self.schema.table(intent.root).type_name,
                E::TYPE_NAME
            ))
            .into());
        }
        let rendered = self.renderer.render_update(&self.schema, &intent);
        let mut values = intent.param_values()?;
        values.extend(intent.row_values(&entity.to_record()));

        let tx = from_outcome(self.conn.begin_with(cx, self.config.isolation).await)?;
        let selected = self
            .update_selected(cx, &tx, &intent, &rendered, &values)
            .await;
        let keys = match selected {
            Ok(keys) => keys,
            Err(error) => {
                rollback(cx, tx).await;
                return Err(error);
            }
        };
        from_outcome(tx.commit(cx).await)?;
        tracing::debug!(updated = keys.len(), "update applied");

        if keys.is_empty() {
            return Ok(None);
        }
        let reload = QueryBuilder::new(&self.schema, intent.root)
            .filter(field(intent.key.member.clone()).is_in(Expr::List(keys)))?;
        Ok(Some(self.compile_query::<E>(reload)?))
    }

    async fn update_selected<T: TransactionOps>(
        &self,
        cx: &Cx,
        tx: &T,
        intent: &UpdateIntent,
        rendered: &RenderedUpdate,
        values: &ParamValues,
    ) -> Result<Vec<Value>, DataError> {
        let select = self.renderer.bind(&rendered.select, values)?;
        let keys: Vec<Value> = tx_query(cx, tx, &select)
            .await?
            .iter()
            .filter_map(|row| row.get_aliased(&intent.key.alias, &intent.key.column).cloned())
            .collect();
        if !keys.is_empty() {
            let update = self.renderer.bind(&rendered.update, values)?;
            tx_execute(cx, tx, &update).await?;
        }
        Ok(keys)
    }

    // ==================== Delete ====================

    /// Delete one entity by key, `ItemNotFound` when it is not stored.
    pub async fn delete<E: Entity>(&self, cx: &Cx, entity: &E) -> ResultWithError<()> {
        carried(self.delete_one(cx, entity).await)
    }

    async fn delete_one<E: Entity>(&self, cx: &Cx, entity: &E) -> Result<(), DataError> {
        let record = entity.to_record();
        let table = self.concrete_table::<E>(&record)?;
        let prepared = self
            .deletes
            .get_or_try_insert(table, || self.prepare_delete(table))?;
        let key = self.record_key(table, &record)?;

        let mut params = prepared.intent.params.clone();
        params.set_variable(KEY_PARAM, key)?;
        let bound = self
            .renderer
            .bind(&prepared.sql, &params.require_values()?)?;
        if self.execute(cx, &bound).await? == 0 {
            return Err(DataError::not_found(E::TYPE_NAME));
        }
        Ok(())
    }

    fn prepare_delete(&self, table: TableId) -> Result<PreparedDelete, BuildError> {
        let intent = DeleteIntent::by_primary_key(&self.schema, table)?;
        let sql = self.renderer.render_delete(&self.schema, &intent);
        Ok(PreparedDelete { intent, sql })
    }

    /// Delete every entity of `E` matching `filter` and return them.
    #[tracing::instrument(level = "debug", skip_all, fields(type_name = E::TYPE_NAME))]
    pub async fn delete_where<E: Entity>(&self, cx: &Cx, filter: Expr) -> ResultWithError<Vec<E>> {
        let loaded = self.where_::<E>(cx, filter).await;
        if !loaded.is_success() {
            return loaded;
        }
        let entities = loaded.result.unwrap_or_default();
        match self.delete_loaded::<E>(cx, &entities).await {
            Ok(()) => ResultWithError::ok(entities),
            Err(error) => ResultWithError::failed(error),
        }
    }

    /// Delete exactly the loaded entities, matched by key.
    async fn delete_loaded<E: Entity>(&self, cx: &Cx, entities: &[E]) -> Result<(), DataError> {
        let table = self.schema.id_of(E::TYPE_NAME)?;
        let key = self.key_name(table)?;
        let keys: Vec<Value> = entities
            .iter()
            .filter_map(|e| e.to_record().get(&key).cloned())
            .collect();
        if keys.is_empty() {
            return Ok(());
        }
        let intent = DeleteBuilder::new(&self.schema, table)
            .filter(field(key).is_in(Expr::List(keys)))?
            .build();
        let sql = self.renderer.render_delete(&self.schema, &intent);
        let bound = self.renderer.bind(&sql, &ParamValues::new())?;
        let deleted = self.execute(cx, &bound).await?;
        tracing::debug!(entities = entities.len(), rows = deleted, "deleted entities");
        Ok(())
    }

    // ==================== Helpers ====================

    /// Concrete table of a record, which must be `E` or one of its subtypes.
    fn concrete_table<E: Entity>(&self, record: &Record) -> Result<TableId, DataError> {
        let base = self.schema.id_of(E::TYPE_NAME)?;
        let table = self.schema.id_of(&record.type_name)?;
        if !self.schema.is_same_or_descendant(table, base) {
            return Err(BuildError::InvalidRecord {
                type_name: record.type_name.clone(),
                message: format!("'{}' is not a subtype of '{}'", record.type_name, E::TYPE_NAME),
            }
            .into());
        }
        Ok(table)
    }

    fn key_name(&self, table: TableId) -> Result<String, BuildError> {
        self.schema
            .key_member(table)
            .map(|k| k.name.clone())
            .ok_or_else(|| BuildError::MissingPrimaryKey {
                type_name: self.schema.table(table).type_name.clone(),
            })
    }

    fn record_key(&self, table: TableId, record: &Record) -> Result<Value, DataError> {
        let key = self.key_name(table)?;
        record
            .get(&key)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| {
                BuildError::InvalidRecord {
                    type_name: record.type_name.clone(),
                    message: format!("key member '{key}' is not set"),
                }
                .into()
            })
    }

    fn validate(&self, table: TableId, record: &Record) -> Result<(), DataError> {
        if !self.config.validate_on_write {
            return Ok(());
        }
        validate_record(&self.schema, table, record).map_err(|e| DataError::from(Error::Validation(e)))
    }

    async fn query_rows(&self, cx: &Cx, bound: &BoundSql) -> Result<Vec<Row>, DataError> {
        tracing::debug!(sql = %bound.sql, params = bound.params.len(), "query");
        from_outcome(self.conn.query(cx, &bound.sql, &bound.params).await)
    }

    async fn execute(&self, cx: &Cx, bound: &BoundSql) -> Result<u64, DataError> {
        tracing::debug!(sql = %bound.sql, params = bound.params.len(), "execute");
        from_outcome(self.conn.execute(cx, &bound.sql, &bound.params).await)
    }

    async fn execute_text(&self, cx: &Cx, sql: &str) -> Result<u64, DataError> {
        tracing::debug!(sql = %sql, "execute");
        from_outcome(self.conn.execute(cx, sql, &[]).await)
    }
}

async fn tx_query<T: TransactionOps>(
    cx: &Cx,
    tx: &T,
    bound: &BoundSql,
) -> Result<Vec<Row>, DataError> {
    tracing::debug!(sql = %bound.sql, params = bound.params.len(), "query in transaction");
    from_outcome(tx.query(cx, &bound.sql, &bound.params).await)
}

async fn tx_execute<T: TransactionOps>(
    cx: &Cx,
    tx: &T,
    bound: &BoundSql,
) -> Result<u64, DataError> {
    tracing::debug!(sql = %bound.sql, params = bound.params.len(), "execute in transaction");
    from_outcome(tx.execute(cx, &bound.sql, &bound.params).await)
}

async fn rollback<T: TransactionOps>(cx: &Cx, tx: T) {
    if let Err(error) = from_outcome(tx.rollback(cx).await) {
        tracing::warn!(error = %error, "rollback failed");
    }
}

fn from_outcome<T>(outcome: Outcome<T, Error>) -> Result<T, DataError> {
    match outcome {
        Outcome::Ok(value) => Ok(value),
        Outcome::Err(error) => Err(DataError::from(&error)),
        Outcome::Cancelled(reason) => Err(DataError::new(
            DataErrorCode::Cancelled,
            format!("operation cancelled: {reason:?}"),
        )),
        Outcome::Panicked(payload) => Err(DataError::new(
            DataErrorCode::UnknownError,
            format!("backend panicked: {payload:?}"),
        )),
    }
}

fn carried<T>(result: Result<T, DataError>) -> ResultWithError<T> {
    match result {
        Ok(value) => ResultWithError::ok(value),
        Err(error) => ResultWithError::failed(error),
    }
}
