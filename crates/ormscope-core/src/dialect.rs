//! The dialect contract: how one backend spells SQL.
//!
//! A dialect is stateless per call and lives for the whole process, shared as
//! `Arc<dyn Dialect>`. Implementations live in `ormscope-schema`.

use std::fmt;

use crate::error::Result;
use crate::expr::{CompiledExpression, PlaceholderStyle};
use crate::field::FieldMetadata;
use crate::metadata::{IndexMetadata, TableMetadata};
use crate::relationship::JoinTableInfo;

/// Backend-specific SQL rendering.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Canonical dialect name (`"ql"`, `"sqlite"`, `"postgres"`, ...).
    fn name(&self) -> &str;

    /// Quote a table or column name for this backend.
    fn quote_identifier(&self, name: &str) -> String;

    /// Column type for a field, honouring `type_override` and `size`.
    fn column_type(&self, field: &FieldMetadata) -> Result<String>;

    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Placeholder for the 1-based argument `index`.
    fn placeholder(&self, index: usize) -> String {
        self.placeholder_style().render(index)
    }

    /// `CREATE TABLE` for the table itself (no indexes, no join tables).
    fn render_create_table(&self, table: &TableMetadata) -> Result<CompiledExpression>;

    /// Whether the backend accepts several `;`-separated statements in one call.
    fn supports_multi_statement(&self) -> bool;

    fn render_drop_table(&self, table_name: &str) -> CompiledExpression {
        CompiledExpression::raw(format!(
            "DROP TABLE IF EXISTS {}",
            self.quote_identifier(table_name)
        ))
    }

    fn render_create_index(
        &self,
        table_name: &str,
        index: &IndexMetadata,
    ) -> Result<CompiledExpression> {
        let columns: Vec<String> = index
            .columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        Ok(CompiledExpression::raw(format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_identifier(&index.name),
            self.quote_identifier(table_name),
            columns.join(", ")
        )))
    }

    /// `CREATE TABLE` for a many-to-many join table.
    fn render_join_table(&self, join: &JoinTableInfo) -> Result<CompiledExpression> {
        let owner = FieldMetadata::new(&join.owner_column, &join.owner_column, join.owner_type);
        let related =
            FieldMetadata::new(&join.related_column, &join.related_column, join.related_type);
        Ok(CompiledExpression::raw(format!(
            "CREATE TABLE IF NOT EXISTS {} ({} {} NOT NULL, {} {} NOT NULL, PRIMARY KEY ({}, {}))",
            self.quote_identifier(&join.table_name),
            self.quote_identifier(&join.owner_column),
            self.column_type(&owner)?,
            self.quote_identifier(&join.related_column),
            self.column_type(&related)?,
            self.quote_identifier(&join.owner_column),
            self.quote_identifier(&join.related_column),
        )))
    }

    /// Literal `LIMIT`/`OFFSET` clause, empty when neither is set.
    fn render_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut out = String::new();
        if let Some(limit) = limit {
            out.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = offset {
            out.push_str(&format!(" OFFSET {}", offset));
        }
        out
    }

    fn current_timestamp_default(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }
}
