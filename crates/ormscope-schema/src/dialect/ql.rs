//! QL dialect.
//!
//! QL is an embedded SQL database with `$N` placeholders, no identifier quoting and no
//! key constraints (every row carries a built-in `id()`). It runs one statement per call,
//! so multi-statement work is wrapped in an explicit transaction envelope.

use ormscope_core::{
    CompiledExpression, Dialect, Error, FieldMetadata, IndexMetadata, JoinTableInfo,
    PlaceholderStyle, Result, SqlType, TableMetadata,
};

use crate::ddl::{self, ConstraintStyle};

/// QL, either file backed (`ql`) or in memory (`ql-mem`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QlDialect {
    in_memory: bool,
}

impl QlDialect {
    pub const fn file() -> Self {
        Self { in_memory: false }
    }

    pub const fn memory() -> Self {
        Self { in_memory: true }
    }

    pub const fn is_in_memory(&self) -> bool {
        self.in_memory
    }
}

impl Dialect for QlDialect {
    fn name(&self) -> &str {
        if self.in_memory { "ql-mem" } else { "ql" }
    }

    fn quote_identifier(&self, name: &str) -> String {
        name.to_string()
    }

    fn column_type(&self, field: &FieldMetadata) -> Result<String> {
        if let Some(ty) = &field.type_override {
            return Ok(ty.clone());
        }
        let ty = match field.sql_type {
            SqlType::Bool => "bool",
            SqlType::Int8 => "int8",
            SqlType::Int16 => "int16",
            SqlType::Int32 => "int32",
            SqlType::Int64 => "int64",
            SqlType::UInt8 => "uint8",
            SqlType::UInt16 => "uint16",
            SqlType::UInt32 => "uint32",
            SqlType::UInt64 => "uint64",
            SqlType::Float32 => "float32",
            SqlType::Float64 => "float64",
            SqlType::Text | SqlType::Json => "string",
            SqlType::Bytes => "blob",
            SqlType::Timestamp => "time",
            SqlType::Decimal { .. } => {
                return Err(Error::compile(format!(
                    "ql has no decimal type for column {}; set a type override",
                    field.column_name
                )));
            }
        };
        Ok(ty.to_string())
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    fn render_create_table(&self, table: &TableMetadata) -> Result<CompiledExpression> {
        ddl::create_table(self, table, ConstraintStyle::ColumnsOnly)
    }

    fn supports_multi_statement(&self) -> bool {
        false
    }

    /// QL indexes cover exactly one column.
    fn render_create_index(
        &self,
        table_name: &str,
        index: &IndexMetadata,
    ) -> Result<CompiledExpression> {
        let [column] = index.columns.as_slice() else {
            return Err(Error::compile(format!(
                "ql index {} on {} must cover exactly one column, got {}",
                index.name,
                table_name,
                index.columns.len()
            )));
        };
        Ok(CompiledExpression::raw(format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            index.name,
            table_name,
            column
        )))
    }

    fn render_join_table(&self, join: &JoinTableInfo) -> Result<CompiledExpression> {
        let owner = FieldMetadata::new(&join.owner_column, &join.owner_column, join.owner_type);
        let related =
            FieldMetadata::new(&join.related_column, &join.related_column, join.related_type);
        Ok(CompiledExpression::raw(format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, {})",
            join.table_name,
            ddl::column_definition(self, &owner, ConstraintStyle::ColumnsOnly)?,
            ddl::column_definition(self, &related, ConstraintStyle::ColumnsOnly)?,
        )))
    }

    fn current_timestamp_default(&self) -> &'static str {
        "now()"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_and_names() {
        let d = QlDialect::file();
        assert_eq!(d.name(), "ql");
        assert_eq!(QlDialect::memory().name(), "ql-mem");
        assert!(QlDialect::memory().is_in_memory());
        assert_eq!(d.placeholder(1), "$1");
        assert_eq!(d.placeholder(12), "$12");
        assert!(!d.supports_multi_statement());
    }

    #[test]
    fn test_column_types() {
        let d = QlDialect::file();
        let cases = [
            (SqlType::Bool, "bool"),
            (SqlType::UInt16, "uint16"),
            (SqlType::Float64, "float64"),
            (SqlType::Json, "string"),
            (SqlType::Timestamp, "time"),
            (SqlType::Bytes, "blob"),
        ];
        for (ty, expected) in cases {
            let field = FieldMetadata::new("F", "f", ty);
            assert_eq!(d.column_type(&field).unwrap(), expected);
        }
    }

    #[test]
    fn test_decimal_needs_override() {
        let d = QlDialect::file();
        let ty = SqlType::Decimal {
            precision: 10,
            scale: 2,
        };
        let field = FieldMetadata::new("Price", "price", ty);
        assert!(matches!(d.column_type(&field), Err(Error::Compile(_))));

        let field = FieldMetadata::new("Price", "price", ty).type_override("string");
        assert_eq!(d.column_type(&field).unwrap(), "string");
    }

    #[test]
    fn test_index_and_drop_are_unquoted() {
        let d = QlDialect::file();
        let index = IndexMetadata {
            name: "idx_users_name".to_string(),
            columns: vec!["name".to_string()],
            unique: false,
        };
        assert_eq!(
            d.render_create_index("users", &index).unwrap().sql,
            "CREATE INDEX IF NOT EXISTS idx_users_name ON users (name)"
        );
        assert_eq!(d.render_drop_table("users").sql, "DROP TABLE IF EXISTS users");
    }

    #[test]
    fn test_multi_column_index_is_rejected() {
        let d = QlDialect::memory();
        let index = IndexMetadata {
            name: "uix_users_email".to_string(),
            columns: vec!["email".to_string(), "tenant".to_string()],
            unique: true,
        };
        assert!(matches!(
            d.render_create_index("users", &index),
            Err(Error::Compile(_))
        ));
    }

    #[test]
    fn test_join_table_has_no_key_constraint() {
        let d = QlDialect::file();
        let join = JoinTableInfo::new("user_languages", "user_id", "language_id")
            .types(SqlType::UInt64, SqlType::Int64);
        assert_eq!(
            d.render_join_table(&join).unwrap().sql,
            "CREATE TABLE IF NOT EXISTS user_languages (user_id uint64 NOT NULL, language_id int64 NOT NULL)"
        );
    }
}
