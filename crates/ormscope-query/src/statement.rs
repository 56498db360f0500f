//! Statement compilation.
//!
//! Each function reads the scope's table metadata, search and values, writes the primary
//! statement (plus any auxiliary ones) back into the scope, and checks that the number
//! of placeholders matches the bound arguments.

use ormscope_core::{Dialect, Error, FieldMetadata, RelationKind, Result, TableMetadata, Value};

use crate::scope::Scope;

/// Column stamped by a soft delete.
pub const DELETED_AT: &str = "deleted_at";

fn require_table(scope: &Scope) -> Result<std::sync::Arc<TableMetadata>> {
    scope
        .table()
        .cloned()
        .ok_or_else(|| Error::argument("operation has no target table"))
}

fn target_table(scope: &Scope) -> Result<String> {
    scope
        .table_name()
        .map(str::to_string)
        .ok_or_else(|| Error::argument("operation has no target table"))
}

fn check<D: Dialect + ?Sized>(scope: &Scope, dialect: &D) -> Result<()> {
    let primary = scope.primary();
    primary.check_parity(dialect.placeholder_style())?;
    tracing::trace!(sql = %primary.sql, args = primary.args.len(), "Compiled statement");
    Ok(())
}

/// `CREATE TABLE` plus join tables for many-to-many relations and declared indexes.
pub fn create_table<D: Dialect + ?Sized>(scope: &mut Scope, dialect: &D) -> Result<()> {
    let table = require_table(scope)?;
    scope.set_primary(dialect.render_create_table(&table)?);

    for relation in &table.relations {
        if relation.kind != RelationKind::ManyToMany {
            continue;
        }
        if let Some(join) = &relation.join_table {
            scope.append_expression(dialect.render_join_table(join)?);
        }
    }
    for index in &table.indexes {
        scope.append_expression(dialect.render_create_index(&table.table_name, index)?);
    }
    if !scope.expressions().is_empty() {
        scope.mark_multi_expr();
    }

    tracing::debug!(
        table = %table.table_name,
        statements = scope.expressions().len() + 1,
        "Compiled CREATE TABLE"
    );
    check(scope, dialect)
}

/// `DROP TABLE IF EXISTS` for the target table and its join tables.
pub fn drop_table<D: Dialect + ?Sized>(scope: &mut Scope, dialect: &D) -> Result<()> {
    let table = require_table(scope)?;
    scope.set_primary(dialect.render_drop_table(&table.table_name));
    for relation in &table.relations {
        if let Some(join) = &relation.join_table {
            scope.append_expression(dialect.render_drop_table(&join.table_name));
        }
    }
    if !scope.expressions().is_empty() {
        scope.mark_multi_expr();
    }
    check(scope, dialect)
}

/// Whether `value` leaves an auto-increment column for the backend to assign.
///
/// NULL and integer zero both count as unset.
fn is_unassigned_key(field: &FieldMetadata, value: &Value) -> bool {
    if !field.auto_increment {
        return false;
    }
    match value {
        Value::Null => true,
        Value::TinyInt(n) => *n == 0,
        Value::SmallInt(n) => *n == 0,
        Value::Int(n) => *n == 0,
        Value::BigInt(n) => *n == 0,
        Value::UBigInt(n) => *n == 0,
        _ => false,
    }
}

/// `INSERT INTO t (cols) VALUES (placeholders)` from the scope's values.
///
/// An unset (NULL or zero) auto-increment key is left out so the backend assigns it.
pub fn insert<D: Dialect + ?Sized>(scope: &mut Scope, dialect: &D) -> Result<()> {
    let table = require_table(scope)?;
    let name = target_table(scope)?;
    let values: Vec<(String, Value)> = scope
        .values()
        .iter()
        .filter(|(column, value)| {
            !table
                .field_by_column(column)
                .is_some_and(|f| is_unassigned_key(f, value))
        })
        .cloned()
        .collect();
    if values.is_empty() {
        return Err(Error::argument(format!("nothing to insert into {}", name)));
    }

    let columns: Vec<String> = values
        .iter()
        .map(|(c, _)| dialect.quote_identifier(c))
        .collect();
    let mut placeholders = Vec::with_capacity(values.len());
    for (_, value) in values {
        placeholders.push(scope.add_arg(dialect, value));
    }
    scope.push_sql(&format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dialect.quote_identifier(&name),
        columns.join(", "),
        placeholders.join(", ")
    ));
    check(scope, dialect)
}

/// `SELECT` with the search's conditions and trailing clauses.
pub fn select<D: Dialect + ?Sized>(scope: &mut Scope, dialect: &D) -> Result<()> {
    let name = target_table(scope)?;
    let columns = if scope.search().selected().is_empty() {
        "*".to_string()
    } else {
        scope.search().selected().join(", ")
    };
    let mut sql = format!("SELECT {} FROM {}", columns, dialect.quote_identifier(&name));
    let body = scope.render_where(dialect)?;
    if !body.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&body);
    }
    sql.push_str(&scope.render_tail(dialect)?);
    scope.push_sql(&sql);
    check(scope, dialect)
}

/// Add `pk = ?` conditions for every primary key with an assigned value.
///
/// NULL never keys a row; neither does zero on an auto-increment key.
fn scope_to_primary_key(scope: &mut Scope, table: &TableMetadata) {
    let keyed: Vec<(String, Value)> = table
        .primary_keys
        .iter()
        .filter_map(|pk| {
            let value = scope.value(pk).filter(|v| !v.is_null())?;
            if table
                .field_by_column(pk)
                .is_some_and(|f| is_unassigned_key(f, value))
            {
                return None;
            }
            Some((pk.clone(), value.clone()))
        })
        .collect();
    for (column, value) in keyed {
        scope.search_mut().where_eq(&column, value);
    }
}

fn require_conditions(scope: &Scope, verb: &str, table: &str) -> Result<()> {
    if scope.search().has_conditions() {
        Ok(())
    } else {
        Err(Error::argument(format!(
            "refusing {} on {} without a condition or primary key value",
            verb, table
        )))
    }
}

/// `UPDATE t SET ... WHERE ...`; primary keys become conditions, not assignments.
pub fn update<D: Dialect + ?Sized>(scope: &mut Scope, dialect: &D) -> Result<()> {
    let table = require_table(scope)?;
    let name = target_table(scope)?;
    scope_to_primary_key(scope, &table);
    require_conditions(scope, "UPDATE", &name)?;

    let assignments: Vec<(String, Value)> = scope
        .values()
        .iter()
        .filter(|(c, _)| !table.primary_keys.contains(c))
        .cloned()
        .collect();
    if assignments.is_empty() {
        return Err(Error::argument(format!("nothing to update on {}", name)));
    }

    let mut sets = Vec::with_capacity(assignments.len());
    for (column, value) in assignments {
        let placeholder = scope.add_arg(dialect, value);
        sets.push(format!("{} = {}", dialect.quote_identifier(&column), placeholder));
    }
    let body = scope.render_where(dialect)?;
    scope.push_sql(&format!(
        "UPDATE {} SET {} WHERE {}",
        dialect.quote_identifier(&name),
        sets.join(", "),
        body
    ));
    check(scope, dialect)
}

/// `DELETE FROM t WHERE ...`, or `UPDATE t SET deleted_at = ? WHERE deleted_at IS NULL AND
/// ...` when the scope is marked soft-delete, so rows already deleted keep their stamp.
pub fn delete<D: Dialect + ?Sized>(scope: &mut Scope, dialect: &D) -> Result<()> {
    let table = require_table(scope)?;
    let name = target_table(scope)?;
    scope_to_primary_key(scope, &table);
    require_conditions(scope, "DELETE", &name)?;

    if scope.soft_delete() {
        let stamp = scope
            .value(DELETED_AT)
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(Value::now);
        let placeholder = scope.add_arg(dialect, stamp);
        scope.search_mut().scope_soft_delete(DELETED_AT);
        let body = scope.render_where(dialect)?;
        scope.push_sql(&format!(
            "UPDATE {} SET {} = {} WHERE {}",
            dialect.quote_identifier(&name),
            dialect.quote_identifier(DELETED_AT),
            placeholder,
            body
        ));
    } else {
        let body = scope.render_where(dialect)?;
        scope.push_sql(&format!(
            "DELETE FROM {} WHERE {}",
            dialect.quote_identifier(&name),
            body
        ));
    }
    check(scope, dialect)
}
