//! Core types and traits for ormscope.
//!
//! `ormscope-core` is the foundation layer of the workspace. It defines the data model
//! that every other crate shares and the two capabilities the rest of the system is
//! written against.
//!
//! # Role In The Architecture
//!
//! - **Shape layer**: `Record`, `ShapeDescriptor` and `RecordShape` describe user record
//!   kinds without runtime reflection. `derive_table_metadata` turns a descriptor into
//!   `TableMetadata` and `MetadataCache` memoizes it per shape.
//! - **Contract layer**: `Dialect` (how a backend spells SQL) and `Connection` (the
//!   executable SQL sink a driver provides).
//! - **Data model**: `Value`, `SqlType`, `Row` and `CompiledExpression` travel between
//!   the query, schema and facade crates.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from asupersync so every
//!   call into a driver is cancel-correct.
//!
//! # Who Uses This Crate
//!
//! - `ormscope-schema` implements `Dialect` and renders DDL from `TableMetadata`.
//! - `ormscope-query` builds `Scope`/`Search` state on top of `TableMetadata`.
//! - `ormscope` drives hooks and execution against a `Connection`.

pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod dialect;
pub mod error;
pub mod expr;
pub mod field;
pub mod identifiers;
pub mod metadata;
pub mod relationship;
pub mod row;
pub mod shape;
pub mod types;
pub mod value;

pub use connection::{Connection, Connector, TransactionOps};
pub use dialect::Dialect;
pub use error::{Error, ExecutionError, Result, ShapeError};
pub use expr::{CompiledExpression, PlaceholderStyle, count_placeholders, offset_placeholders};
pub use field::FieldMetadata;
pub use identifiers::{is_valid_identifier, pluralize, quote_double, quote_literal, to_snake_case};
pub use metadata::{IndexMetadata, MetadataCache, NamingConfig, TableMetadata, derive_table_metadata};
pub use relationship::{JoinTableInfo, RelationInfo, RelationKind};
pub use row::Row;
pub use shape::{DeclaredType, FieldDescriptor, Record, RecordRef, RecordShape, ShapeDescriptor};
pub use types::SqlType;
pub use value::Value;
