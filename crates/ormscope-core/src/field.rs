//! Column metadata derived from a record's fields.

use crate::types::SqlType;

/// Metadata about one stored column.
///
/// Built once per record shape by `derive_table_metadata` and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMetadata {
    /// Field name as declared on the record (`outer.inner` for embedded fields)
    pub name: String,
    /// Database column name
    pub column_name: String,
    /// Storage type for this column
    pub sql_type: SqlType,
    /// Explicit type string from a `type` annotation.
    /// When set, this takes precedence over `sql_type` in DDL generation.
    pub type_override: Option<String>,
    /// Length bound for text columns (from a `size` annotation)
    pub size: Option<u32>,
    /// Whether this column is nullable
    pub nullable: bool,
    /// Whether this is (part of) the primary key
    pub primary_key: bool,
    /// Whether the backend generates this column's value
    pub auto_increment: bool,
    /// Whether this column has a unique constraint
    pub unique: bool,
    /// Default value expression (SQL)
    pub default: Option<String>,
    /// Name of a plain index covering this column
    pub index: Option<String>,
    /// Name of a unique index covering this column
    pub unique_index: Option<String>,
    /// Set when the column was flattened from an embedded record; holds that field's name.
    pub embedded_from: Option<String>,
}

impl FieldMetadata {
    /// Create field metadata with minimal required data.
    pub fn new(name: impl Into<String>, column_name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            column_name: column_name.into(),
            sql_type,
            type_override: None,
            size: None,
            nullable: false,
            primary_key: false,
            auto_increment: false,
            unique: false,
            default: None,
            index: None,
            unique_index: None,
            embedded_from: None,
        }
    }

    /// Set explicit SQL type override.
    ///
    /// Use this for backend-specific types like `VARCHAR(255)` or `DECIMAL(10,2)`.
    pub fn type_override(mut self, type_str: impl Into<String>) -> Self {
        self.type_override = Some(type_str.into());
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    pub fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    pub fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    pub fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    pub fn unique_index(mut self, name: impl Into<String>) -> Self {
        self.unique_index = Some(name.into());
        self
    }

    /// Mark the column as flattened from the given embedded field.
    pub fn embedded_from(mut self, field: impl Into<String>) -> Self {
        self.embedded_from = Some(field.into());
        self
    }

    pub fn is_embedded(&self) -> bool {
        self.embedded_from.is_some()
    }
}
