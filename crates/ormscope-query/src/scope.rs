//! Per-operation state.
//!
//! A `Scope` is created at the start of one logical operation, mutated by hook stages,
//! search builders and statement compilation, and consumed exactly once by
//! [`Scope::finish`]. It is never shared between operations, so it takes no locks.

use std::sync::Arc;

use ormscope_core::{CompiledExpression, Dialect, Error, Result, TableMetadata, Value};

use crate::search::Search;

/// Mutable accumulator for one logical operation.
#[derive(Debug, Default)]
pub struct Scope {
    table: Option<Arc<TableMetadata>>,
    search: Search,
    sql: String,
    args: Vec<Value>,
    exprs: Vec<CompiledExpression>,
    multi_expr: bool,
    values: Vec<(String, Value)>,
    soft_delete: bool,
    error: Option<Error>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope targeting `table`.
    pub fn for_table(table: Arc<TableMetadata>) -> Self {
        let mut scope = Self::new();
        scope.set_table(table);
        scope
    }

    pub fn set_table(&mut self, table: Arc<TableMetadata>) {
        self.table = Some(table);
    }

    pub fn table(&self) -> Option<&Arc<TableMetadata>> {
        self.table.as_ref()
    }

    /// The table targeted by this operation: the search override, else the record's table.
    pub fn table_name(&self) -> Option<&str> {
        self.search
            .table_override()
            .or_else(|| self.table.as_deref().map(|t| t.table_name.as_str()))
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.table.as_deref().is_some_and(|t| t.has_column(column))
    }

    pub fn search(&self) -> &Search {
        &self.search
    }

    pub fn search_mut(&mut self) -> &mut Search {
        &mut self.search
    }

    /// Append raw text to the primary statement.
    pub fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Bind an argument to the primary statement and return its placeholder.
    pub fn add_arg<D: Dialect + ?Sized>(&mut self, dialect: &D, value: Value) -> String {
        self.args.push(value);
        dialect.placeholder(self.args.len())
    }

    /// Render the search's WHERE body against the primary statement's arguments.
    pub fn render_where<D: Dialect + ?Sized>(&mut self, dialect: &D) -> Result<String> {
        self.search.render_where(dialect, &mut self.args)
    }

    /// Render the search's trailing clauses against the primary statement's arguments.
    pub fn render_tail<D: Dialect + ?Sized>(&mut self, dialect: &D) -> Result<String> {
        self.search.render_tail(dialect, &mut self.args)
    }

    /// Replace the primary statement.
    pub fn set_primary(&mut self, expr: CompiledExpression) {
        self.sql = expr.sql;
        self.args = expr.args;
    }

    /// Snapshot of the primary statement.
    pub fn primary(&self) -> CompiledExpression {
        CompiledExpression::new(self.sql.clone(), self.args.clone())
    }

    pub fn primary_sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Queue an auxiliary statement to run after the primary one.
    pub fn append_expression(&mut self, expr: CompiledExpression) {
        self.exprs.push(expr);
    }

    pub fn expressions(&self) -> &[CompiledExpression] {
        &self.exprs
    }

    /// Flag the operation as producing more than one statement.
    pub fn mark_multi_expr(&mut self) {
        self.multi_expr = true;
    }

    pub fn is_multi_expr(&self) -> bool {
        self.multi_expr
    }

    /// Record an error. The first one wins; later ones are only traced.
    pub fn set_error(&mut self, err: Error) {
        if let Some(existing) = &self.error {
            tracing::trace!(error = %err, first = %existing, "Scope already failed, dropping error");
            return;
        }
        self.error = Some(err);
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Column values for a write, keyed by column name.
    pub fn set_values(&mut self, values: Vec<(String, Value)>) {
        self.values = values;
    }

    /// Set one column value, replacing any existing entry.
    pub fn set_value(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.values.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => self.values.push((column, value)),
        }
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.values.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }

    pub fn set_soft_delete(&mut self, soft: bool) {
        self.soft_delete = soft;
    }

    pub fn soft_delete(&self) -> bool {
        self.soft_delete
    }

    /// Consume the scope: the primary statement first, then auxiliary ones in order.
    pub fn finish(self) -> Result<Vec<CompiledExpression>> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let mut out = Vec::with_capacity(self.exprs.len() + 1);
        if !self.sql.trim().is_empty() {
            out.push(CompiledExpression::new(self.sql, self.args));
        }
        out.extend(self.exprs);
        Ok(out)
    }
}
