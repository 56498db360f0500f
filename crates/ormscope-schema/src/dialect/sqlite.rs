//! SQLite dialect.

use ormscope_core::{
    CompiledExpression, Dialect, FieldMetadata, PlaceholderStyle, Result, SqlType, TableMetadata,
    quote_double,
};

use crate::ddl::{self, ConstraintStyle};

/// SQLite: `?` placeholders, double-quoted identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_double(name)
    }

    fn column_type(&self, field: &FieldMetadata) -> Result<String> {
        if let Some(ty) = &field.type_override {
            return Ok(ty.clone());
        }
        // Only an INTEGER PRIMARY KEY column aliases the rowid.
        if field.primary_key && field.auto_increment && field.sql_type.is_integer() {
            return Ok("INTEGER PRIMARY KEY AUTOINCREMENT".to_string());
        }
        let ty = match field.sql_type {
            SqlType::Bool => "BOOLEAN".to_string(),
            t if t.is_integer() => "INTEGER".to_string(),
            SqlType::Float32 | SqlType::Float64 => "REAL".to_string(),
            SqlType::Text => match field.size {
                Some(size) => format!("VARCHAR({})", size),
                None => "TEXT".to_string(),
            },
            SqlType::Json => "TEXT".to_string(),
            SqlType::Bytes => "BLOB".to_string(),
            SqlType::Timestamp => "DATETIME".to_string(),
            SqlType::Decimal { precision, scale } => format!("DECIMAL({}, {})", precision, scale),
            _ => field.sql_type.sql_name(),
        };
        Ok(ty)
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    fn render_create_table(&self, table: &TableMetadata) -> Result<CompiledExpression> {
        if table.primary_keys.len() < 2 {
            return ddl::create_table(self, table, ConstraintStyle::Full);
        }
        // A composite key cannot alias the rowid; its columns stay plain INTEGER.
        let mut composite = table.clone();
        for field in composite.fields.iter_mut().filter(|f| f.primary_key) {
            field.auto_increment = false;
        }
        ddl::create_table(self, &composite, ConstraintStyle::Full)
    }

    fn supports_multi_statement(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormscope_core::{IndexMetadata, JoinTableInfo};

    #[test]
    fn test_dialect() {
        let d = SqliteDialect;
        assert_eq!(d.name(), "sqlite");
        assert_eq!(d.placeholder(1), "?");
        assert_eq!(d.placeholder(7), "?");
        assert_eq!(d.quote_identifier("users"), "\"users\"");
        assert!(d.supports_multi_statement());
    }

    #[test]
    fn test_auto_increment_aliases_rowid() {
        let d = SqliteDialect;
        let id = FieldMetadata::new("ID", "id", SqlType::UInt64)
            .primary_key(true)
            .auto_increment(true);
        assert_eq!(d.column_type(&id).unwrap(), "INTEGER PRIMARY KEY AUTOINCREMENT");

        let plain = FieldMetadata::new("Count", "count", SqlType::Int16);
        assert_eq!(d.column_type(&plain).unwrap(), "INTEGER");
    }

    #[test]
    fn test_composite_key_does_not_alias_rowid() {
        let d = SqliteDialect;
        let table = TableMetadata {
            shape: ormscope_core::RecordShape::of::<SqliteDialect>(),
            shape_name: "Membership".to_string(),
            table_name: "memberships".to_string(),
            fields: vec![
                FieldMetadata::new("UserID", "user_id", SqlType::Int64)
                    .primary_key(true)
                    .auto_increment(true),
                FieldMetadata::new("GroupID", "group_id", SqlType::Int64)
                    .primary_key(true)
                    .auto_increment(true),
            ],
            primary_keys: vec!["user_id".to_string(), "group_id".to_string()],
            relations: Vec::new(),
            indexes: Vec::new(),
        };
        assert_eq!(
            d.render_create_table(&table).unwrap().sql,
            "CREATE TABLE IF NOT EXISTS \"memberships\" (\"user_id\" INTEGER NOT NULL, \
             \"group_id\" INTEGER NOT NULL, PRIMARY KEY (\"user_id\", \"group_id\"))"
        );
    }

    #[test]
    fn test_create_unique_index() {
        let d = SqliteDialect;
        let index = IndexMetadata {
            name: "uix_users_email".to_string(),
            columns: vec!["email".to_string(), "tenant".to_string()],
            unique: true,
        };
        assert_eq!(
            d.render_create_index("users", &index).unwrap().sql,
            "CREATE UNIQUE INDEX IF NOT EXISTS \"uix_users_email\" ON \"users\" (\"email\", \"tenant\")"
        );
    }

    #[test]
    fn test_join_table() {
        let d = SqliteDialect;
        let join = JoinTableInfo::new("user_languages", "user_id", "language_id");
        assert_eq!(
            d.render_join_table(&join).unwrap().sql,
            "CREATE TABLE IF NOT EXISTS \"user_languages\" (\"user_id\" INTEGER NOT NULL, \
             \"language_id\" INTEGER NOT NULL, PRIMARY KEY (\"user_id\", \"language_id\"))"
        );
    }

    #[test]
    fn test_limit_offset() {
        let d = SqliteDialect;
        assert_eq!(d.render_limit_offset(Some(10), Some(20)), " LIMIT 10 OFFSET 20");
        assert_eq!(d.render_limit_offset(None, None), "");
    }
}
