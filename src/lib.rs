//! sqlogs: SQL SELECT to LogsQL translation.
//!
//! This crate is the primary entrypoint for the sqlogs toolkit. It re-exports
//! the translator, the table/view stores it resolves names against, and the
//! HTTP client that ships translated queries to a VictoriaLogs-style backend,
//! so downstream applications see a single surface.
//!
//! The pipeline starts in [`sqlogs_translate`], which parses statements via
//! [`sqlparser`](https://docs.rs/sqlparser) and lowers a `SELECT` AST into a
//! LogsQL program: a source filter or upstream pipeline followed by
//! `|`-separated pipes (`filter`, `stats`, `sort`, `join`, `format`, ...).
//! Table and view names are resolved through [`sqlogs_store`], and the
//! resulting LogsQL string can be executed against a backend with
//! [`sqlogs_client`]. Failures across all crates share the
//! [`sqlogs_result::Error`] enum, which carries an HTTP-style status code.
//!
//! # Example
//!
//! ```no_run
//! use sqlogs::{MemoryTableStore, Provider, translate_sql};
//!
//! let mut tables = MemoryTableStore::new();
//! tables.insert("logs", "*");
//! let provider = Provider::new(tables);
//!
//! let logsql = translate_sql("SELECT msg FROM logs WHERE level = 'ERROR'", &provider)?;
//! assert_eq!(logsql, "* | filter level:ERROR | fields msg");
//! # Ok::<(), sqlogs::Error>(())
//! ```

pub use sqlogs_client::{EndpointConfig, LogsClient, RequestParams};
pub use sqlogs_result::{Error, Result};
pub use sqlogs_store::{
    MemoryTableStore, MemoryViewStore, Provider, StoreConfig, TableStore, ViewQuery, ViewStore,
};
pub use sqlogs_translate::{translate_query, translate_sql};
