//! Scripted connection and entities shared by the engine tests.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};

use asupersync::runtime::RuntimeBuilder;
use chrono::NaiveDateTime;
use tablemap::prelude::*;
use tablemap::{Connection, IsolationLevel, Row, TransactionOps};
use tablemap_core::{QueryError, QueryErrorKind, Result};

// ==================== Mock connection ====================

/// One executed statement, or a transaction marker (`BEGIN`, `COMMIT`,
/// `ROLLBACK`) with no parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub log: Vec<Executed>,
    /// `(sql fragment, queued row sets)`; the last set of a rule repeats
    responses: Vec<(String, VecDeque<Vec<Row>>)>,
    /// Statements containing one of these fragments fail
    failures: Vec<String>,
    /// Affected-row count of every `execute`
    affected: u64,
    /// Tables the table-exists check reports as present
    existing: HashSet<String>,
    /// Isolation requested by the last `begin_with`
    isolation: Option<IsolationLevel>,
}

impl MockState {
    fn respond(&mut self, sql: &str) -> Vec<Row> {
        if sql.contains("information_schema.tables") {
            return Vec::new();
        }
        for (fragment, sets) in &mut self.responses {
            if sql.contains(fragment.as_str()) {
                return if sets.len() > 1 {
                    sets.pop_front().unwrap_or_default()
                } else {
                    sets.front().cloned().unwrap_or_default()
                };
            }
        }
        Vec::new()
    }

    fn run(&mut self, sql: &str, params: &[Value]) -> std::result::Result<(), Error> {
        self.log.push(Executed {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        match self.failures.iter().find(|f| sql.contains(f.as_str())) {
            Some(_) => Err(Error::Query(QueryError {
                kind: QueryErrorKind::Constraint,
                sql: Some(sql.to_string()),
                sqlstate: Some("23000".to_string()),
                message: "duplicate entry".to_string(),
                source: None,
            })),
            None => Ok(()),
        }
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Outcome<Vec<Row>, Error> {
        if let Err(e) = self.run(sql, params) {
            return Outcome::Err(e);
        }
        if sql.contains("information_schema.tables") {
            let exists = match params.first() {
                Some(Value::Text(name)) => self.existing.contains(name),
                _ => false,
            };
            return Outcome::Ok(vec![Row::new(
                vec!["count".to_string()],
                vec![Value::BigInt(i64::from(exists))],
            )]);
        }
        Outcome::Ok(self.respond(sql))
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Outcome<u64, Error> {
        match self.run(sql, params) {
            Ok(()) => Outcome::Ok(self.affected),
            Err(e) => Outcome::Err(e),
        }
    }

    fn marker(&mut self, name: &str) {
        self.log.push(Executed {
            sql: name.to_string(),
            params: Vec::new(),
        });
    }
}

/// Connection answering from a script and logging every statement.
#[derive(Debug, Clone)]
pub struct MockConnection {
    pub state: Arc<Mutex<MockState>>,
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnection {
    pub fn new() -> Self {
        let state = MockState {
            affected: 1,
            ..MockState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Queue rows for queries containing `fragment`.
    pub fn on_query(&self, fragment: &str, rows: Vec<Row>) -> &Self {
        let mut state = self.state.lock().expect("lock poisoned");
        match state.responses.iter_mut().find(|(f, _)| f == fragment) {
            Some((_, sets)) => sets.push_back(rows),
            None => state
                .responses
                .push((fragment.to_string(), VecDeque::from([rows]))),
        }
        self
    }

    pub fn fail_on(&self, fragment: &str) -> &Self {
        let mut state = self.state.lock().expect("lock poisoned");
        state.failures.push(fragment.to_string());
        self
    }

    pub fn set_affected(&self, affected: u64) -> &Self {
        self.state.lock().expect("lock poisoned").affected = affected;
        self
    }

    pub fn set_existing(&self, tables: &[&str]) -> &Self {
        let mut state = self.state.lock().expect("lock poisoned");
        state.existing = tables.iter().map(|t| (*t).to_string()).collect();
        self
    }

    pub fn log(&self) -> Vec<Executed> {
        self.state.lock().expect("lock poisoned").log.clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.log().into_iter().map(|e| e.sql).collect()
    }

    pub fn last_isolation(&self) -> Option<IsolationLevel> {
        self.state.lock().expect("lock poisoned").isolation
    }

    pub fn clear_log(&self) {
        self.state.lock().expect("lock poisoned").log.clear();
    }
}

impl Connection for MockConnection {
    type Tx<'conn>
        = MockTransaction
    where
        Self: 'conn;

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let outcome = self.state.lock().expect("lock poisoned").query(sql, params);
        async move { outcome }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = self.state.lock().expect("lock poisoned").execute(sql, params);
        async move { outcome }
    }

    fn begin(&self, _cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        self.state.lock().expect("lock poisoned").marker("BEGIN");
        let tx = MockTransaction {
            state: Arc::clone(&self.state),
        };
        async move { Outcome::Ok(tx) }
    }

    fn begin_with(
        &self,
        cx: &Cx,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        self.state.lock().expect("lock poisoned").isolation = Some(isolation);
        self.begin(cx)
    }

    fn ping(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        async { Outcome::Ok(()) }
    }
}

pub struct MockTransaction {
    state: Arc<Mutex<MockState>>,
}

impl TransactionOps for MockTransaction {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let outcome = self.state.lock().expect("lock poisoned").query(sql, params);
        async move { outcome }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = self.state.lock().expect("lock poisoned").execute(sql, params);
        async move { outcome }
    }

    fn commit(self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.state.lock().expect("lock poisoned").marker("COMMIT");
        async { Outcome::Ok(()) }
    }

    fn rollback(self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.state.lock().expect("lock poisoned").marker("ROLLBACK");
        async { Outcome::Ok(()) }
    }
}

// ==================== Runtime ====================

pub fn run<F: Future>(test: impl FnOnce(Cx) -> F) -> F::Output {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(test(cx))
}

pub fn row(columns: &[&str], values: Vec<Value>) -> Row {
    Row::new(columns.iter().map(|c| (*c).to_string()).collect(), values)
}

pub fn key_row(id: i64) -> Row {
    row(&["id"], vec![Value::BigInt(id)])
}

// ==================== Entities ====================

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: Option<i64>,
    pub name: String,
    pub born: Option<NaiveDateTime>,
    pub friends: Vec<i64>,
}

impl Person {
    pub fn named(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            born: None,
            friends: Vec::new(),
        }
    }
}

impl Entity for Person {
    const TYPE_NAME: &'static str = "Person";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("Person", "person")
            .member(MemberDescriptor::key("id"))
            .member(MemberDescriptor::of::<String>("name").max_length(16))
            .member(MemberDescriptor::of::<Option<NaiveDateTime>>("born"))
            .member(MemberDescriptor::many("friends", "Person"))
    }

    fn to_record(&self) -> Record {
        Record::new(Self::TYPE_NAME)
            .with("id", self.id)
            .with("name", self.name.as_str())
            .with("born", self.born)
            .with_many("friends", self.friends.iter().map(|&f| Value::BigInt(f)).collect())
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.get_as("id")?,
            name: record.require("name")?,
            born: record.get_as("born")?,
            friends: record.many("friends").iter().filter_map(Value::as_i64).collect(),
        })
    }

    fn set_member(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "id" => self.id = value.as_i64(),
            other => return Err(Error::Custom(format!("Person has no member '{other}'"))),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cat {
    pub id: Option<i64>,
    pub name: String,
    pub owner: Option<i64>,
    pub color: Option<String>,
}

impl Entity for Cat {
    const TYPE_NAME: &'static str = "Cat";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("Cat", "cat")
            .extends("Animal")
            .member(MemberDescriptor::new("color", SqlType::VarChar(32)).nullable(true))
    }

    fn to_record(&self) -> Record {
        Record::new(Self::TYPE_NAME)
            .with("id", self.id)
            .with("name", self.name.as_str())
            .with("owner", self.owner)
            .with("color", self.color.clone())
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.get_as("id")?,
            name: record.require("name")?,
            owner: record.get_as("owner")?,
            color: record.get_as("color")?,
        })
    }

    fn set_member(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "id" => self.id = value.as_i64(),
            other => return Err(Error::Custom(format!("Cat has no member '{other}'"))),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dog {
    pub id: Option<i64>,
    pub name: String,
    pub owner: Option<i64>,
    pub trained: bool,
}

impl Entity for Dog {
    const TYPE_NAME: &'static str = "Dog";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("Dog", "dog")
            .extends("Animal")
            .member(MemberDescriptor::of::<bool>("trained"))
    }

    fn to_record(&self) -> Record {
        Record::new(Self::TYPE_NAME)
            .with("id", self.id)
            .with("name", self.name.as_str())
            .with("owner", self.owner)
            .with("trained", self.trained)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.get_as("id")?,
            name: record.require("name")?,
            owner: record.get_as("owner")?,
            trained: record.require("trained")?,
        })
    }

    fn set_member(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "id" => self.id = value.as_i64(),
            other => return Err(Error::Custom(format!("Dog has no member '{other}'"))),
        }
        Ok(())
    }
}

/// The abstract root, loaded as whichever subtype a row holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Animal {
    Cat(Cat),
    Dog(Dog),
}

impl Entity for Animal {
    const TYPE_NAME: &'static str = "Animal";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("Animal", "animal")
            .abstract_type()
            .member(MemberDescriptor::key("id"))
            .member(MemberDescriptor::of::<String>("name"))
            .member(MemberDescriptor::link("owner", "Person").nullable(true))
    }

    fn to_record(&self) -> Record {
        match self {
            Animal::Cat(cat) => cat.to_record(),
            Animal::Dog(dog) => dog.to_record(),
        }
    }

    fn from_record(record: &Record) -> Result<Self> {
        match record.type_name.as_str() {
            "Cat" => Cat::from_record(record).map(Animal::Cat),
            "Dog" => Dog::from_record(record).map(Animal::Dog),
            other => Err(Error::Custom(format!("'{other}' is not an animal"))),
        }
    }

    fn set_member(&mut self, name: &str, value: Value) -> Result<()> {
        match self {
            Animal::Cat(cat) => cat.set_member(name, value),
            Animal::Dog(dog) => dog.set_member(name, value),
        }
    }
}

pub fn schema() -> Schema {
    Schema::builder()
        .register::<Person>()
        .register::<Animal>()
        .register::<Cat>()
        .register::<Dog>()
        .build()
        .expect("test schema builds")
}

pub fn engine() -> (Engine<MockConnection>, MockConnection) {
    let conn = MockConnection::new();
    (Engine::mysql(schema(), conn.clone()), conn)
}

pub fn felix() -> Cat {
    Cat {
        id: None,
        name: "felix".to_string(),
        owner: None,
        color: Some("black".to_string()),
    }
}

/// A row of the `Cat` select.
pub fn cat_row(id: i64, name: &str, color: &str) -> Row {
    row(
        &["C*id", "C*color", "A*id", "A*name", "A*owner_id", "A*__type"],
        vec![
            Value::BigInt(id),
            Value::Text(color.to_string()),
            Value::BigInt(id),
            Value::Text(name.to_string()),
            Value::Null,
            Value::Text("Cat".to_string()),
        ],
    )
}
