//! Storage types for columns.

use serde::{Deserialize, Serialize};

/// Backend-neutral storage type of a column.
///
/// Dialects translate this into concrete type names; see `Dialect::column_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    /// Variable length text. A `size` on the field turns this into a bounded string.
    Text,
    Bytes,
    Timestamp,
    Json,
    Decimal { precision: u8, scale: u8 },
}

impl SqlType {
    /// Whether the type is an integer (signed or unsigned).
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            SqlType::Int8
                | SqlType::Int16
                | SqlType::Int32
                | SqlType::Int64
                | SqlType::UInt8
                | SqlType::UInt16
                | SqlType::UInt32
                | SqlType::UInt64
        )
    }

    pub const fn is_unsigned(&self) -> bool {
        matches!(
            self,
            SqlType::UInt8 | SqlType::UInt16 | SqlType::UInt32 | SqlType::UInt64
        )
    }

    /// Generic ANSI-ish name, used in diagnostics.
    pub fn sql_name(&self) -> String {
        match self {
            SqlType::Bool => "BOOLEAN".to_string(),
            SqlType::Int8 | SqlType::UInt8 => "TINYINT".to_string(),
            SqlType::Int16 | SqlType::UInt16 => "SMALLINT".to_string(),
            SqlType::Int32 | SqlType::UInt32 => "INTEGER".to_string(),
            SqlType::Int64 | SqlType::UInt64 => "BIGINT".to_string(),
            SqlType::Float32 => "REAL".to_string(),
            SqlType::Float64 => "DOUBLE PRECISION".to_string(),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Bytes => "BLOB".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Json => "JSON".to_string(),
            SqlType::Decimal { precision, scale } => format!("DECIMAL({}, {})", precision, scale),
        }
    }
}
