//! DDL rendering shared by every dialect.
//!
//! Dialects differ in column types, quoting and whether the primary key is written as a
//! table constraint; the statement layout is the same everywhere.

use ormscope_core::{CompiledExpression, Dialect, FieldMetadata, Result, TableMetadata};

/// Which table constraints a backend understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintStyle {
    /// Column `UNIQUE` plus a trailing `PRIMARY KEY (a, b)`, unless a column type already
    /// carries the key.
    Full,
    /// Only `NOT NULL` and `DEFAULT`; rows are keyed internally by the backend.
    ColumnsOnly,
}

/// Render one column definition: name, type, then constraints.
pub fn column_definition<D: Dialect + ?Sized>(
    dialect: &D,
    field: &FieldMetadata,
    style: ConstraintStyle,
) -> Result<String> {
    let sql_type = dialect.column_type(field)?;
    let mut def = format!("{} {}", dialect.quote_identifier(&field.column_name), sql_type);

    let inline_key = carries_primary_key(&sql_type);
    if !field.nullable && !inline_key {
        def.push_str(" NOT NULL");
    }
    if style == ConstraintStyle::Full && field.unique && !field.primary_key {
        def.push_str(" UNIQUE");
    }
    if let Some(default) = &field.default {
        def.push_str(" DEFAULT ");
        def.push_str(default);
    }
    Ok(def)
}

fn carries_primary_key(sql_type: &str) -> bool {
    sql_type.to_ascii_uppercase().contains("PRIMARY KEY")
}

/// Render `CREATE TABLE IF NOT EXISTS` for a table's own columns.
pub fn create_table<D: Dialect + ?Sized>(
    dialect: &D,
    table: &TableMetadata,
    style: ConstraintStyle,
) -> Result<CompiledExpression> {
    tracing::debug!(
        dialect = dialect.name(),
        table = %table.table_name,
        columns = table.fields.len(),
        "Generating CREATE TABLE"
    );

    let mut parts = Vec::with_capacity(table.fields.len() + 1);
    let mut inline_key = false;
    for field in &table.fields {
        let def = column_definition(dialect, field, style)?;
        if field.primary_key && carries_primary_key(&def) {
            inline_key = true;
        }
        parts.push(def);
    }

    if style == ConstraintStyle::Full && !inline_key && !table.primary_keys.is_empty() {
        let keys: Vec<String> = table
            .primary_keys
            .iter()
            .map(|k| dialect.quote_identifier(k))
            .collect();
        parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }

    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        dialect.quote_identifier(&table.table_name),
        parts.join(", ")
    );
    tracing::trace!(sql = %sql, "Generated DDL");
    Ok(CompiledExpression::raw(sql))
}
