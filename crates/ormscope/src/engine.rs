//! Per-operation façade.
//!
//! An `Engine` is assembled for one logical operation from the database's dialect,
//! metadata cache and hook registry plus a fresh `Scope`, and a reference to the
//! connection. It is never shared between concurrent operations.

use ormscope_core::{
    CompiledExpression, Connection, Cx, Dialect, Error, MetadataCache, Outcome, PlaceholderStyle,
    Record, RecordRef, Result, Row, TableMetadata, Value, offset_placeholders,
};
use ormscope_query::{Scope, Search, statement};

use crate::hooks::{HookRegistry, OperationKind, Phase};

/// Wiring for one operation: dialect, cache, hooks, scope and connection.
pub struct Engine<'a, C: Connection> {
    dialect: &'a dyn Dialect,
    cache: &'a MetadataCache,
    hooks: &'a HookRegistry,
    scope: Scope,
    conn: &'a C,
}

impl<'a, C: Connection> std::fmt::Debug for Engine<'a, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("dialect", &self.dialect.name())
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl<'a, C: Connection> Engine<'a, C> {
    pub fn new(
        dialect: &'a dyn Dialect,
        cache: &'a MetadataCache,
        hooks: &'a HookRegistry,
        conn: &'a C,
    ) -> Self {
        Self {
            dialect,
            cache,
            hooks,
            scope: Scope::new(),
            conn,
        }
    }

    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }

    /// The search builder bound to this operation's scope.
    pub fn search(&mut self) -> &mut Search {
        self.scope.search_mut()
    }

    pub fn into_scope(self) -> Scope {
        self.scope
    }

    /// Compile `CREATE TABLE` for every record into one multi-statement expression.
    ///
    /// Each record gets its own scope. Dialects without native multi-statement support
    /// get the statements wrapped in a `BEGIN TRANSACTION; … COMMIT;` envelope.
    pub fn compile_create_table(&self, records: &[RecordRef]) -> Result<CompiledExpression> {
        self.compile_ddl(records, |scope, dialect| statement::create_table(scope, dialect))
    }

    /// Compile `DROP TABLE` for every record, combined like [`Engine::compile_create_table`].
    pub fn compile_drop_table(&self, records: &[RecordRef]) -> Result<CompiledExpression> {
        self.compile_ddl(records, |scope, dialect| statement::drop_table(scope, dialect))
    }

    fn compile_ddl<F>(&self, records: &[RecordRef], compile: F) -> Result<CompiledExpression>
    where
        F: Fn(&mut Scope, &dyn Dialect) -> Result<()>,
    {
        if records.is_empty() {
            return Err(Error::argument("no record shapes given"));
        }
        let mut statements = Vec::new();
        for record in records {
            let table = self.cache.get(record)?;
            let mut scope = Scope::for_table(table);
            compile(&mut scope, self.dialect)?;
            statements.extend(scope.finish()?);
        }
        let combined = combine_statements(self.dialect, &statements);
        combined.check_parity(self.dialect.placeholder_style())?;
        tracing::debug!(
            dialect = self.dialect.name(),
            tables = records.len(),
            statements = statements.len(),
            "Compiled DDL"
        );
        Ok(combined)
    }

    /// Compile an `INSERT` for a record, running create hooks around it.
    pub fn compile_insert<T: Record>(&mut self, record: &T) -> Result<CompiledExpression> {
        let values = Some(record.values());
        self.compile_operation(
            T::record_ref(),
            OperationKind::Create,
            values,
            |scope, dialect| statement::insert(scope, dialect),
        )
    }

    /// Compile a `SELECT` for a record kind from the current search, running query hooks.
    pub fn compile_query<T: Record>(&mut self) -> Result<CompiledExpression> {
        self.compile_operation(
            T::record_ref(),
            OperationKind::Query,
            None,
            |scope, dialect| statement::select(scope, dialect),
        )
    }

    /// Compile an `UPDATE` keyed by the record's primary key, running update hooks.
    pub fn compile_update<T: Record>(&mut self, record: &T) -> Result<CompiledExpression> {
        let values = Some(record.values());
        self.compile_operation(
            T::record_ref(),
            OperationKind::Update,
            values,
            |scope, dialect| statement::update(scope, dialect),
        )
    }

    /// Compile a `DELETE` (or soft delete) keyed by the record's primary key.
    pub fn compile_delete<T: Record>(&mut self, record: &T) -> Result<CompiledExpression> {
        let values = Some(record.values());
        self.compile_operation(
            T::record_ref(),
            OperationKind::Delete,
            values,
            |scope, dialect| statement::delete(scope, dialect),
        )
    }

    fn compile_operation<F>(
        &mut self,
        record: RecordRef,
        kind: OperationKind,
        values: Option<Vec<(String, Value)>>,
        compile: F,
    ) -> Result<CompiledExpression>
    where
        F: FnOnce(&mut Scope, &dyn Dialect) -> Result<()>,
    {
        let table = self.cache.get(&record)?;
        if let Some(values) = values {
            self.scope.set_values(column_values(&table, values));
        }
        self.scope.set_table(table);

        if !self.scope.has_error() {
            if let Err(err) = self.hooks.run(Phase::Before, kind, &mut self.scope) {
                self.scope.set_error(err);
            }
        }
        if !self.scope.has_error() {
            if let Err(err) = compile(&mut self.scope, self.dialect) {
                self.scope.set_error(err);
            }
        }
        if !self.scope.has_error() {
            if let Err(err) = self.hooks.run(Phase::After, kind, &mut self.scope) {
                self.scope.set_error(err);
            }
        }

        let scope = std::mem::take(&mut self.scope);
        let statements = scope.finish()?;
        tracing::debug!(
            kind = kind.as_str(),
            shape = record.shape().name(),
            statements = statements.len(),
            "Compiled operation"
        );
        match statements.as_slice() {
            [] => Err(Error::compile(format!("{} produced no statement", kind.as_str()))),
            [only] => Ok(only.clone()),
            _ => Ok(combine_statements(self.dialect, &statements)),
        }
    }

    /// Hand a compiled statement to the connection.
    pub async fn execute(&self, cx: &Cx, expr: &CompiledExpression) -> Outcome<u64, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        tracing::trace!(sql = %expr.sql, args = expr.args.len(), "Executing");
        self.conn.execute(cx, &expr.sql, &expr.args).await
    }

    /// Hand a compiled query to the connection and collect its rows.
    pub async fn query(&self, cx: &Cx, expr: &CompiledExpression) -> Outcome<Vec<Row>, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        tracing::trace!(sql = %expr.sql, args = expr.args.len(), "Querying");
        self.conn.query(cx, &expr.sql, &expr.args).await
    }
}

/// Map declared field names to column names; values for unknown fields are dropped.
fn column_values(table: &TableMetadata, values: Vec<(String, Value)>) -> Vec<(String, Value)> {
    values
        .into_iter()
        .filter_map(|(name, value)| match table.field_by_name(&name) {
            Some(field) => Some((field.column_name.clone(), value)),
            None => {
                tracing::trace!(table = %table.table_name, field = %name, "Skipping unmapped value");
                None
            }
        })
        .collect()
}

/// Join statements into one expression.
///
/// Dialects that run several statements per call get them joined with `;`. Otherwise the
/// statements are wrapped in an explicit `BEGIN TRANSACTION; … COMMIT;` envelope, one
/// tab-indented statement per line.
///
/// Args are concatenated in statement order. Numbered placeholders of each statement are
/// shifted by the number of args bound before it, so `$1` of the second statement
/// becomes `$N+1`.
pub fn combine_statements<D: Dialect + ?Sized>(
    dialect: &D,
    statements: &[CompiledExpression],
) -> CompiledExpression {
    let numbered = dialect.placeholder_style() == PlaceholderStyle::Dollar;
    let mut args: Vec<Value> = Vec::new();
    let mut parts: Vec<String> = Vec::with_capacity(statements.len());
    for stmt in statements {
        if numbered {
            parts.push(offset_placeholders(&stmt.sql, args.len()));
        } else {
            parts.push(stmt.sql.clone());
        }
        args.extend(stmt.args.iter().cloned());
    }

    if dialect.supports_multi_statement() {
        return CompiledExpression::new(format!("{};", parts.join(";\n")), args);
    }

    let mut sql = String::from("BEGIN TRANSACTION; \n");
    for part in &parts {
        sql.push('\t');
        sql.push_str(part);
        sql.push_str(";\n");
    }
    sql.push_str("COMMIT;");
    CompiledExpression::new(sql, args)
}
