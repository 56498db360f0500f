//! Scope-driven SQL compilation and execution for Rust record types.
//!
//! `ormscope` is the facade crate. It wires the shape layer (`ormscope-core`), the
//! statement builders (`ormscope-query`) and the dialects (`ormscope-schema`) into a
//! per-operation [`Engine`] and a long-lived [`Db`] handle.
//!
//! # Role In The Architecture
//!
//! - **Db**: resolves a dialect by name, owns the metadata cache, a copy-on-write hook
//!   registry and one connection.
//! - **Engine**: assembled fresh for every operation; runs before hooks, compiles the
//!   statement into the operation's `Scope`, runs after hooks and hands the result to
//!   the connection.
//! - **Hooks**: named stages per `(OperationKind, Phase)`; the first failing stage
//!   stops the operation before anything reaches the connection.
//! - **exec_tx**: begin → execute → commit, rolling back on failure or cancellation.
//!
//! # Example
//!
//! ```rust,ignore
//! use ormscope::prelude::*;
//!
//! let db = Db::open(OpenConfig::new("ql-mem").source("test.db"), &connector)?;
//! let ddl = db.create_table_sql(&[RecordRef::of::<Hero>()])?;
//! // BEGIN TRANSACTION;
//! //     CREATE TABLE IF NOT EXISTS heroes (id int64 NOT NULL, name string NOT NULL);
//! // COMMIT;
//!
//! match db.create(&cx, &hero).await {
//!     Outcome::Ok(rows) => println!("inserted {rows}"),
//!     Outcome::Err(e) => eprintln!("insert failed: {e}"),
//!     Outcome::Cancelled(_) | Outcome::Panicked(_) => {}
//! }
//! ```

pub mod db;
pub mod engine;
pub mod exec;
pub mod hooks;

pub use db::{ConnectionSource, Db, OpenConfig};
pub use engine::{Engine, combine_statements};
pub use exec::exec_tx;
pub use hooks::{HookRegistry, OperationKind, Phase, StageFn};

pub use ormscope_core::{
    CompiledExpression, Connection, Connector, Cx, DeclaredType, Dialect, Error, FieldDescriptor,
    FieldMetadata, MetadataCache, NamingConfig, Outcome, PlaceholderStyle, Record, RecordRef,
    RecordShape, Result, Row, ShapeDescriptor, SqlType, TableMetadata, TransactionOps, Value,
};
pub use ormscope_query::{Scope, Search};
pub use ormscope_schema::{PostgresDialect, QlDialect, SqliteDialect, dialect_for_name};

/// Commonly used items.
pub mod prelude {
    pub use crate::{
        Connection, ConnectionSource, Connector, Cx, Db, DeclaredType, Engine, Error, FieldDescriptor,
        HookRegistry, OpenConfig, OperationKind, Outcome, Phase, Record, RecordRef, Result, Row,
        Scope, Search, ShapeDescriptor, Value,
    };
}
