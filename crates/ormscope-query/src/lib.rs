//! Scope and search builders for ormscope.
//!
//! This crate turns one logical operation into SQL text plus ordered arguments:
//!
//! - [`Scope`] holds all state for a single operation (target table, bound arguments,
//!   auxiliary statements, write values, error slot).
//! - [`Search`] records conditions and clauses and renders them into a scope using the
//!   dialect's placeholders.
//! - [`statement`] compiles `CREATE TABLE`, `DROP TABLE`, `INSERT`, `SELECT`, `UPDATE`
//!   and `DELETE` from a populated scope.
//!
//! Nothing here performs I/O; the result of [`Scope::finish`] is handed to a
//! `Connection` by the caller.

pub mod scope;
pub mod search;
pub mod statement;

pub use scope::Scope;
pub use search::{Condition, Search};
