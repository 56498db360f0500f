//! Condition building.
//!
//! `Search` only records what the caller asked for. Nothing is rendered until a
//! statement is compiled, at which point each `?` marker is replaced by the dialect's
//! placeholder for the next argument index and the argument is appended to the same
//! list the rest of the statement uses. Search never executes anything.
//!
//! Composition follows the usual ORM convention:
//!
//! ```text
//! WHERE (a) AND (b) AND NOT (c) OR (d) OR (e)
//! ```
//!
//! and with soft-delete scoping active:
//!
//! ```text
//! WHERE deleted_at IS NULL AND ((a) AND (b) OR (d))
//! ```

use ormscope_core::{CompiledExpression, Dialect, Error, Result, Value, is_valid_identifier};

/// A raw condition fragment with `?` markers and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub fragment: String,
    pub args: Vec<Value>,
}

impl Condition {
    pub fn new(fragment: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            fragment: fragment.into(),
            args,
        }
    }
}

/// Accumulated query conditions and clauses for one operation.
#[derive(Debug, Clone, Default)]
pub struct Search {
    where_conditions: Vec<Condition>,
    not_conditions: Vec<Condition>,
    or_conditions: Vec<Condition>,
    having_conditions: Vec<Condition>,
    select: Vec<String>,
    order: Vec<String>,
    group: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    table: Option<String>,
    soft_delete_column: Option<String>,
    unscoped: bool,
    error: Option<String>,
}

impl Search {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition joined with AND.
    pub fn where_(&mut self, fragment: impl Into<String>, args: Vec<Value>) -> &mut Self {
        self.where_conditions.push(Condition::new(fragment, args));
        self
    }

    /// Alias of [`Search::where_`].
    pub fn and(&mut self, fragment: impl Into<String>, args: Vec<Value>) -> &mut Self {
        self.where_(fragment, args)
    }

    /// Add a condition joined with OR.
    pub fn or(&mut self, fragment: impl Into<String>, args: Vec<Value>) -> &mut Self {
        self.or_conditions.push(Condition::new(fragment, args));
        self
    }

    /// Add a negated condition joined with AND.
    pub fn not(&mut self, fragment: impl Into<String>, args: Vec<Value>) -> &mut Self {
        self.not_conditions.push(Condition::new(fragment, args));
        self
    }

    /// `column = ?` with one argument.
    pub fn where_eq(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        if !self.check_identifier(column) {
            return self;
        }
        self.where_(format!("{} = ?", column), vec![value.into()])
    }

    /// Restrict the selected columns. Each entry is used verbatim.
    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn order(&mut self, clause: impl Into<String>) -> &mut Self {
        self.order.push(clause.into());
        self
    }

    pub fn group(&mut self, clause: impl Into<String>) -> &mut Self {
        self.group.push(clause.into());
        self
    }

    pub fn having(&mut self, fragment: impl Into<String>, args: Vec<Value>) -> &mut Self {
        self.having_conditions.push(Condition::new(fragment, args));
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// Target a different table than the record's own.
    pub fn table(&mut self, name: &str) -> &mut Self {
        if self.check_identifier(name) {
            self.table = Some(name.to_string());
        }
        self
    }

    /// Disable soft-delete scoping for this operation.
    pub fn unscoped(&mut self) -> &mut Self {
        self.unscoped = true;
        self
    }

    /// Restrict results to rows whose `column` is NULL, unless unscoped.
    pub fn scope_soft_delete(&mut self, column: &str) -> &mut Self {
        if self.check_identifier(column) {
            self.soft_delete_column = Some(column.to_string());
        }
        self
    }

    fn check_identifier(&mut self, name: &str) -> bool {
        if is_valid_identifier(name) {
            return true;
        }
        if self.error.is_none() {
            self.error = Some(format!("invalid identifier {:?}", name));
        }
        false
    }

    pub fn is_unscoped(&self) -> bool {
        self.unscoped
    }

    /// Whether any caller-supplied condition exists (soft-delete scoping excluded).
    pub fn has_conditions(&self) -> bool {
        !(self.where_conditions.is_empty()
            && self.not_conditions.is_empty()
            && self.or_conditions.is_empty())
    }

    pub fn table_override(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn selected(&self) -> &[String] {
        &self.select
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// First invalid input recorded by a builder call.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Render the WHERE body (without the keyword), appending arguments to `args`.
    ///
    /// Returns an empty string when there is nothing to filter on.
    pub fn render_where<D: Dialect + ?Sized>(
        &self,
        dialect: &D,
        args: &mut Vec<Value>,
    ) -> Result<String> {
        if let Some(msg) = &self.error {
            return Err(Error::argument(msg.clone()));
        }

        let mut and_parts = Vec::new();
        for cond in &self.where_conditions {
            and_parts.push(format!("({})", bind(cond, dialect, args)?));
        }
        for cond in &self.not_conditions {
            and_parts.push(format!("NOT ({})", bind(cond, dialect, args)?));
        }
        let mut or_parts = Vec::new();
        for cond in &self.or_conditions {
            or_parts.push(format!("({})", bind(cond, dialect, args)?));
        }

        let combined = match (and_parts.is_empty(), or_parts.is_empty()) {
            (true, true) => String::new(),
            (false, true) => and_parts.join(" AND "),
            (true, false) => or_parts.join(" OR "),
            (false, false) => format!("{} OR {}", and_parts.join(" AND "), or_parts.join(" OR ")),
        };

        match (&self.soft_delete_column, self.unscoped) {
            (Some(column), false) => {
                let scoped = format!("{} IS NULL", dialect.quote_identifier(column));
                if combined.is_empty() {
                    Ok(scoped)
                } else {
                    Ok(format!("{} AND ({})", scoped, combined))
                }
            }
            _ => Ok(combined),
        }
    }

    /// Render GROUP BY / HAVING / ORDER BY / LIMIT / OFFSET, appending HAVING arguments.
    pub fn render_tail<D: Dialect + ?Sized>(
        &self,
        dialect: &D,
        args: &mut Vec<Value>,
    ) -> Result<String> {
        let mut sql = String::new();
        if !self.group.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group.join(", "));
        }
        if !self.having_conditions.is_empty() {
            let mut parts = Vec::with_capacity(self.having_conditions.len());
            for cond in &self.having_conditions {
                parts.push(format!("({})", bind(cond, dialect, args)?));
            }
            sql.push_str(" HAVING ");
            sql.push_str(&parts.join(" AND "));
        }
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.join(", "));
        }
        sql.push_str(&dialect.render_limit_offset(self.limit, self.offset));
        Ok(sql)
    }

    /// Compile just the WHERE body into a standalone expression numbered from 1.
    pub fn compile<D: Dialect + ?Sized>(&self, dialect: &D) -> Result<CompiledExpression> {
        let mut args = Vec::new();
        let sql = self.render_where(dialect, &mut args)?;
        Ok(CompiledExpression::new(sql, args))
    }
}

/// Replace each `?` marker outside quotes with the next placeholder.
fn bind<D: Dialect + ?Sized>(cond: &Condition, dialect: &D, args: &mut Vec<Value>) -> Result<String> {
    let mut out = String::with_capacity(cond.fragment.len() + 8);
    let mut pending = cond.args.iter();
    let mut used = 0usize;
    let mut quote: Option<char> = None;

    for c in cond.fragment.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' => {
                    let Some(arg) = pending.next() else {
                        return Err(marker_mismatch(cond, used + 1));
                    };
                    used += 1;
                    args.push(arg.clone());
                    out.push_str(&dialect.placeholder(args.len()));
                }
                _ => out.push(c),
            },
        }
    }

    if used != cond.args.len() {
        return Err(marker_mismatch(cond, used));
    }
    Ok(out)
}

fn marker_mismatch(cond: &Condition, markers: usize) -> Error {
    Error::argument(format!(
        "condition {:?} has at least {} markers but {} arguments",
        cond.fragment,
        markers,
        cond.args.len()
    ))
}
