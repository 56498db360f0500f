//! PostgreSQL dialect.

use ormscope_core::{
    CompiledExpression, Dialect, FieldMetadata, PlaceholderStyle, Result, SqlType, TableMetadata,
    quote_double,
};

use crate::ddl::{self, ConstraintStyle};

/// PostgreSQL: `$N` placeholders, double-quoted identifiers, serial keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_double(name)
    }

    fn column_type(&self, field: &FieldMetadata) -> Result<String> {
        if let Some(ty) = &field.type_override {
            return Ok(ty.clone());
        }
        if field.auto_increment && field.sql_type.is_integer() {
            let serial = match field.sql_type {
                SqlType::Int64 | SqlType::UInt32 | SqlType::UInt64 => "BIGSERIAL",
                _ => "SERIAL",
            };
            return Ok(serial.to_string());
        }
        let ty = match field.sql_type {
            SqlType::Bool => "BOOLEAN".to_string(),
            SqlType::Int8 | SqlType::Int16 | SqlType::UInt8 => "SMALLINT".to_string(),
            SqlType::Int32 | SqlType::UInt16 => "INTEGER".to_string(),
            SqlType::Int64 | SqlType::UInt32 | SqlType::UInt64 => "BIGINT".to_string(),
            SqlType::Float32 => "REAL".to_string(),
            SqlType::Float64 => "DOUBLE PRECISION".to_string(),
            SqlType::Text => match field.size {
                Some(size) => format!("VARCHAR({})", size),
                None => "TEXT".to_string(),
            },
            SqlType::Bytes => "BYTEA".to_string(),
            SqlType::Timestamp => "TIMESTAMP WITH TIME ZONE".to_string(),
            SqlType::Json => "JSONB".to_string(),
            SqlType::Decimal { precision, scale } => format!("NUMERIC({}, {})", precision, scale),
        };
        Ok(ty)
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    fn render_create_table(&self, table: &TableMetadata) -> Result<CompiledExpression> {
        ddl::create_table(self, table, ConstraintStyle::Full)
    }

    fn supports_multi_statement(&self) -> bool {
        true
    }
}
