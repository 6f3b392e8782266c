//! Tablemap - class-table inheritance mapping for Rust.
//!
//! Entities are mapped onto one table per type: a subtype's table holds
//! only its own members and shares the key of its root table. Tablemap
//! provides:
//!
//! - A schema model with inheritance chains, links and link tables
//! - Typed predicates compiled to SQL with rebindable parameters
//! - Transactional create, update and delete across the whole chain
//! - Polymorphic loading through a discriminator column
//! - A MySQL dialect, with the renderer as the seam for others
//!
//! # Quick Start
//!
//! ```ignore
//! use tablemap::prelude::*;
//!
//! let schema = Schema::builder()
//!     .register::<Animal>()
//!     .register::<Cat>()
//!     .register::<Dog>()
//!     .build()?;
//! let engine = Engine::mysql(schema, conn);
//! engine.connect(&cx).await.into_result()?;
//!
//! let mut felix = Cat { id: None, name: "felix".into(), color: Some("black".into()) };
//! engine.create(&cx, &mut felix).await;
//!
//! // Every animal, each loaded as its concrete type.
//! let animals = engine.get_all::<Animal>(&cx).await;
//!
//! let black = engine
//!     .where_::<Cat>(&cx, field("color").eq("black"))
//!     .await;
//! ```
//!
//! # Crates
//!
//! - `tablemap-core` - values, rows, the schema model, errors and the
//!   connection traits
//! - `tablemap-query` - predicate compilation, join planning and CRUD intents
//! - `tablemap-mysql` - the MySQL renderer and DDL

pub mod config;
pub mod engine;
pub mod materialize;
pub mod query;

pub use config::EngineConfig;
pub use engine::Engine;
pub use query::CompiledQuery;

pub use tablemap_core::{
    BuildError, Connection, Cx, DataError, DataErrorCode, Entity, EntityDescriptor, Error,
    IsolationLevel, LinkKind, MemberDescriptor, Outcome, Record, ReferentialAction, Result,
    ResultWithError, Row, Schema, SchemaBuilder, SqlType, TableId, TransactionOps, Value,
};
pub use tablemap_mysql::{MySqlConfig, MySqlRenderer};
pub use tablemap_query::{
    BindType, Direction, Expr, Parameterized, QueryBuilder, SqlRenderer, UpdateBuilder, field,
    list, lit, param, param_of, var,
};

/// Everything an application mapping entities usually needs.
pub mod prelude {
    pub use crate::{
        // asupersync
        Cx,
        Outcome,
        // Schema and entities
        Entity,
        EntityDescriptor,
        MemberDescriptor,
        Record,
        ReferentialAction,
        Schema,
        SqlType,
        Value,
        // Engine
        CompiledQuery,
        Engine,
        EngineConfig,
        MySqlConfig,
        MySqlRenderer,
        // Predicates
        BindType,
        Direction,
        Expr,
        Parameterized,
        field,
        list,
        lit,
        param,
        param_of,
        var,
        // Results
        DataError,
        DataErrorCode,
        Error,
        ResultWithError,
    };
}
