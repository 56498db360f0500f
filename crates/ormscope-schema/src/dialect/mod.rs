//! Dialect implementations and selection by name.

mod postgres;
mod ql;
mod sqlite;

use std::sync::Arc;

use ormscope_core::{Dialect, Error, Result};

pub use postgres::PostgresDialect;
pub use ql::QlDialect;
pub use sqlite::SqliteDialect;

/// Resolve a dialect by name.
///
/// Known names: `ql` (file backed), `ql-mem` (in memory), `sqlite`/`sqlite3`,
/// `postgres`/`postgresql`. Matching ignores ASCII case and surrounding whitespace.
pub fn dialect_for_name(name: &str) -> Result<Arc<dyn Dialect>> {
    let dialect: Arc<dyn Dialect> = match name.trim().to_ascii_lowercase().as_str() {
        "ql" => Arc::new(QlDialect::file()),
        "ql-mem" => Arc::new(QlDialect::memory()),
        "sqlite" | "sqlite3" => Arc::new(SqliteDialect),
        "postgres" | "postgresql" => Arc::new(PostgresDialect),
        _ => return Err(Error::UnsupportedDialect(name.to_string())),
    };
    tracing::debug!(requested = name, dialect = dialect.name(), "Resolved dialect");
    Ok(dialect)
}
