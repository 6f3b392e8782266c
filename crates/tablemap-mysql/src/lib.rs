//! MySQL dialect for tablemap.
//!
//! This crate renders the dialect-neutral intents of `tablemap-query` as
//! MySQL statements. It provides:
//!
//! - Type mapping from portable storage types to MySQL column types
//! - WHERE tree rendering, including LIKE escaping and `IS NULL` checks
//! - SELECT/INSERT/UPDATE/DELETE rendering with inheritance and link joins
//! - `CREATE TABLE` generation for entity and link tables
//!
//! Connections are supplied by the caller through
//! [`tablemap_core::Connection`]; this crate never talks to a server.
//!
//! # Example
//!
//! ```rust,ignore
//! use tablemap_mysql::{MySqlConfig, MySqlRenderer};
//!
//! let renderer = MySqlRenderer::new(MySqlConfig::new().database("zoo"));
//! let sql = renderer.render_query(&schema, &intent);
//! ```

pub mod config;
pub mod ddl;
pub mod renderer;
pub mod types;
pub mod where_sql;

pub use config::MySqlConfig;
pub use renderer::MySqlRenderer;
pub use types::{member_type, mysql_type, quote_identifier, quote_string};
