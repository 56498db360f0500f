//! The database handle.
//!
//! A `Db` owns one connection plus the shared, long-lived state every operation reads:
//! the resolved dialect, the metadata cache and a copy-on-write hook registry. Each
//! operation gets a fresh [`Engine`] from [`Db::new_engine`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ormscope_core::{
    CompiledExpression, Connection, Connector, Cx, Dialect, Error, MetadataCache, NamingConfig,
    Outcome, Record, RecordRef, Result, Row, Value,
};
use ormscope_query::Search;
use ormscope_schema::dialect_for_name;

use crate::engine::Engine;
use crate::exec;
use crate::hooks::HookRegistry;

/// Options for opening a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenConfig {
    /// Dialect name, e.g. `ql`, `ql-mem`, `sqlite`, `postgres`.
    pub dialect: String,
    /// Driver name passed to the connector. Defaults to the dialect's name.
    pub driver: Option<String>,
    /// Data source name passed to the connector.
    pub source: Option<String>,
    /// Use singular table names instead of pluralized ones.
    pub singular_table: bool,
}

impl Default for OpenConfig {
    fn default() -> Self {
        Self {
            dialect: String::from("ql"),
            driver: None,
            source: None,
            singular_table: false,
        }
    }
}

impl OpenConfig {
    pub fn new(dialect: impl Into<String>) -> Self {
        Self {
            dialect: dialect.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn singular_table(mut self, singular: bool) -> Self {
        self.singular_table = singular;
        self
    }

    fn naming(&self) -> NamingConfig {
        NamingConfig {
            singular_table: self.singular_table,
        }
    }

    fn driver_name<'a>(&'a self, dialect: &'a str) -> Result<&'a str> {
        match self.driver.as_deref() {
            Some(driver) if driver.trim().is_empty() => Err(Error::argument("empty driver name")),
            Some(driver) => Ok(driver),
            None => Ok(dialect),
        }
    }
}

/// Where the connection comes from.
#[derive(Debug)]
pub enum ConnectionSource<C> {
    /// Open a new connection through a [`Connector`].
    Dsn(String),
    /// Use an already open connection.
    Handle(C),
}

/// A database: dialect, metadata cache, hook registry and one connection.
pub struct Db<C: Connection> {
    dialect: Arc<dyn Dialect>,
    cache: Arc<MetadataCache>,
    hooks: Arc<HookRegistry>,
    conn: C,
}

impl<C: Connection> fmt::Debug for Db<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("dialect", &self.dialect.name())
            .field("cached_tables", &self.cache.len())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl<C: Connection> Db<C> {
    /// Open a database from `config.source` through `connector`.
    pub fn open<K>(config: OpenConfig, connector: &K) -> Result<Self>
    where
        K: Connector<Connection = C>,
    {
        // Resolve first so an unknown dialect is reported before config problems.
        dialect_for_name(&config.dialect)?;
        let source = config
            .source
            .clone()
            .ok_or_else(|| Error::argument("missing connection source"))?;
        Self::connect(config, ConnectionSource::Dsn(source), connector)
    }

    /// Open a database from an explicit [`ConnectionSource`].
    pub fn connect<K>(config: OpenConfig, source: ConnectionSource<C>, connector: &K) -> Result<Self>
    where
        K: Connector<Connection = C>,
    {
        match source {
            ConnectionSource::Handle(conn) => Self::open_with_connection(config, conn),
            ConnectionSource::Dsn(dsn) => {
                let dialect = dialect_for_name(&config.dialect)?;
                let driver = config.driver_name(dialect.name())?;
                if dsn.trim().is_empty() {
                    return Err(Error::argument("missing connection source"));
                }
                if config.source.as_deref().is_some_and(|s| s != dsn) {
                    return Err(Error::argument("conflicting connection sources"));
                }
                tracing::info!(dialect = dialect.name(), driver, "Opening connection");
                let conn = connector.connect(driver, &dsn)?;
                Ok(Self::assemble(&config, dialect, conn))
            }
        }
    }

    /// Wrap an already open connection.
    pub fn open_with_connection(config: OpenConfig, conn: C) -> Result<Self> {
        let dialect = dialect_for_name(&config.dialect)?;
        config.driver_name(dialect.name())?;
        if config.source.is_some() {
            return Err(Error::argument(
                "both a connection source and an open connection were given",
            ));
        }
        tracing::info!(dialect = dialect.name(), "Using existing connection");
        Ok(Self::assemble(&config, dialect, conn))
    }

    fn assemble(config: &OpenConfig, dialect: Arc<dyn Dialect>, conn: C) -> Self {
        Self {
            dialect,
            cache: Arc::new(MetadataCache::new(config.naming())),
            hooks: Arc::new(HookRegistry::global().clone()),
            conn,
        }
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// This database's own hook registry. Other databases are unaffected.
    pub fn hooks_mut(&mut self) -> &mut HookRegistry {
        Arc::make_mut(&mut self.hooks)
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn into_connection(self) -> C {
        self.conn
    }

    /// Switch table naming. Cached metadata is discarded.
    pub fn set_singular_table(&mut self, singular: bool) {
        if self.cache.naming().singular_table == singular {
            return;
        }
        tracing::debug!(singular, "Resetting metadata cache for new naming");
        self.cache = Arc::new(MetadataCache::new(NamingConfig {
            singular_table: singular,
        }));
    }

    /// A fresh engine for one operation.
    pub fn new_engine(&self) -> Engine<'_, C> {
        Engine::new(self.dialect.as_ref(), &self.cache, &self.hooks, &self.conn)
    }

    /// Compile `CREATE TABLE` for every record into one expression. No args are bound.
    pub fn create_table_sql(&self, records: &[RecordRef]) -> Result<CompiledExpression> {
        self.new_engine().compile_create_table(records)
    }

    /// Compile `DROP TABLE` for every record into one expression.
    pub fn drop_table_sql(&self, records: &[RecordRef]) -> Result<CompiledExpression> {
        self.new_engine().compile_drop_table(records)
    }

    /// Run one statement in its own transaction.
    pub async fn exec_tx(&self, cx: &Cx, sql: &str, args: &[Value]) -> Outcome<u64, Error> {
        exec::exec_tx(cx, &self.conn, sql, args).await
    }

    #[tracing::instrument(level = "debug", skip(self, cx, records), fields(tables = records.len()))]
    pub async fn create_table(&self, cx: &Cx, records: &[RecordRef]) -> Outcome<u64, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let expr = match self.create_table_sql(records) {
            Ok(expr) => expr,
            Err(e) => return Outcome::Err(e),
        };
        self.exec_tx(cx, &expr.sql, &expr.args).await
    }

    #[tracing::instrument(level = "debug", skip(self, cx, records), fields(tables = records.len()))]
    pub async fn drop_table(&self, cx: &Cx, records: &[RecordRef]) -> Outcome<u64, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let expr = match self.drop_table_sql(records) {
            Ok(expr) => expr,
            Err(e) => return Outcome::Err(e),
        };
        self.exec_tx(cx, &expr.sql, &expr.args).await
    }

    /// Insert a record.
    #[tracing::instrument(level = "debug", skip_all, fields(shape = T::shape().name()))]
    pub async fn create<T: Record>(&self, cx: &Cx, record: &T) -> Outcome<u64, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let expr = match self.new_engine().compile_insert(record) {
            Ok(expr) => expr,
            Err(e) => return Outcome::Err(e),
        };
        self.exec_tx(cx, &expr.sql, &expr.args).await
    }

    /// Query rows of a record kind; `build` configures the search.
    #[tracing::instrument(level = "debug", skip_all, fields(shape = T::shape().name()))]
    pub async fn find<T, F>(&self, cx: &Cx, build: F) -> Outcome<Vec<Row>, Error>
    where
        T: Record,
        F: FnOnce(&mut Search),
    {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let mut engine = self.new_engine();
        build(engine.search());
        let expr = match engine.compile_query::<T>() {
            Ok(expr) => expr,
            Err(e) => return Outcome::Err(e),
        };
        engine.query(cx, &expr).await
    }

    /// Update a record by primary key.
    #[tracing::instrument(level = "debug", skip_all, fields(shape = T::shape().name()))]
    pub async fn update<T: Record>(&self, cx: &Cx, record: &T) -> Outcome<u64, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let expr = match self.new_engine().compile_update(record) {
            Ok(expr) => expr,
            Err(e) => return Outcome::Err(e),
        };
        self.exec_tx(cx, &expr.sql, &expr.args).await
    }

    /// Delete a record by primary key. Records with a `deleted_at` column are soft deleted.
    #[tracing::instrument(level = "debug", skip_all, fields(shape = T::shape().name()))]
    pub async fn delete<T: Record>(&self, cx: &Cx, record: &T) -> Outcome<u64, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let expr = match self.new_engine().compile_delete(record) {
            Ok(expr) => expr,
            Err(e) => return Outcome::Err(e),
        };
        self.exec_tx(cx, &expr.sql, &expr.args).await
    }
}
