//! The executable SQL sink.
//!
//! Drivers implement `Connection` and `TransactionOps`; ormscope only hands them
//! compiled text plus ordered arguments. Every call takes a `Cx` so drivers can honour
//! cancellation and budgets, and returns an `Outcome` rather than a plain `Result`.

use std::future::Future;

use asupersync::{Cx, Outcome};

use crate::error::{Error, Result};
use crate::row::Row;
use crate::value::Value;

/// A live backend connection.
pub trait Connection: Send + Sync {
    /// Transaction handle borrowed from this connection.
    type Tx<'conn>: TransactionOps
    where
        Self: 'conn;

    /// Run a statement that returns rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Run a statement and return the number of affected rows.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send;
}

/// Operations available inside an open transaction.
///
/// `commit` and `rollback` consume the handle, so a transaction ends exactly once.
pub trait TransactionOps: Send {
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    fn commit(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    fn rollback(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;
}

/// Opens driver connections from a driver name and data source string.
pub trait Connector {
    type Connection: Connection;

    fn connect(&self, driver: &str, source: &str) -> Result<Self::Connection>;
}
