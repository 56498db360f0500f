//! SQL dialects and DDL rendering for ormscope.
//!
//! Each backend gets one `Dialect` implementation; they share the statement layout in
//! [`ddl`] and differ only in type names, quoting, placeholders and constraint support.
//!
//! | name | placeholders | quoting | multi-statement |
//! |------|--------------|---------|-----------------|
//! | `ql`, `ql-mem` | `$N` | none | no |
//! | `sqlite`, `sqlite3` | `?` | `"x"` | yes |
//! | `postgres`, `postgresql` | `$N` | `"x"` | yes |
//!
//! Use [`dialect_for_name`] to pick one at open time.

pub mod ddl;
pub mod dialect;

pub use ddl::{ConstraintStyle, column_definition, create_table};
pub use dialect::{PostgresDialect, QlDialect, SqliteDialect, dialect_for_name};
