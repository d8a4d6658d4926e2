//! A fluent query builder for the statements issued by the repository.
//!
//! Identifiers are checked with [`is_valid_field_name`] when SQL is built;
//! values are always bound as parameters. A builder can carry a deferred
//! error (see [`QueryBuilder::fail`]): once set, further scopes are skipped
//! and every `build_*` call returns it.
//!
//! # Example
//!
//! ```
//! use ambit_data::query::{Dialect, QueryBuilder};
//!
//! let (sql, params) = QueryBuilder::new("users")
//!     .dialect(Dialect::Postgres)
//!     .where_eq("email", "a@b.com")
//!     .order_by("id", true)
//!     .limit(10)
//!     .build_select("*")
//!     .unwrap();
//! assert_eq!(sql, "SELECT * FROM users WHERE email = $1 ORDER BY id ASC LIMIT 10");
//! assert_eq!(params.len(), 1);
//! ```

use crate::error::DataError;
use crate::field::is_valid_field_name;
use crate::scope::Scope;
use crate::value::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// Generic SQL using `?` placeholders (default).
    #[default]
    Generic,
    /// SQLite-style `?` placeholders; no row locking.
    Sqlite,
    /// MySQL-style `?` placeholders with backtick quoting; no `RETURNING`.
    MySql,
    /// Postgres-style `$1, $2, ...` placeholders.
    Postgres,
}

impl Dialect {
    /// Map an `AnyConnection::backend_name()` to a dialect.
    pub fn from_backend_name(name: &str) -> Self {
        match name {
            "SQLite" => Dialect::Sqlite,
            "PostgreSQL" => Dialect::Postgres,
            "MySQL" => Dialect::MySql,
            _ => Dialect::Generic,
        }
    }

    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Generic | Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Generic | Dialect::Sqlite | Dialect::Postgres => '"',
        }
    }

    /// Whether `INSERT`/`UPDATE ... RETURNING *` is available.
    pub fn supports_returning(self) -> bool {
        !matches!(self, Dialect::MySql)
    }

    /// The exclusive row lock clause, if the engine has row locks.
    pub fn lock_clause(self) -> Option<&'static str> {
        match self {
            Dialect::Sqlite => None,
            Dialect::Generic | Dialect::MySql | Dialect::Postgres => Some("FOR UPDATE"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdentifierPolicy {
    /// Validate identifiers and emit them as written.
    #[default]
    Validate,
    /// Validate and quote identifiers using the dialect quoting style.
    Quote,
}

/// A single `WHERE` predicate. Predicates are joined with `AND`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    Gte(String, Value),
    Lte(String, Value),
    Between(String, Value, Value),
    In(String, Vec<Value>),
    IsNull(String),
    IsNotNull(String),
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    conditions: Vec<Condition>,
    order: Vec<(String, bool)>,
    limit_val: Option<u64>,
    offset_val: Option<u64>,
    preloads: Vec<String>,
    lock: bool,
    returning: bool,
    dialect: Dialect,
    identifier_policy: IdentifierPolicy,
    error: Option<String>,
}

impl QueryBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            conditions: Vec::new(),
            order: Vec::new(),
            limit_val: None,
            offset_val: None,
            preloads: Vec::new(),
            lock: false,
            returning: false,
            dialect: Dialect::Generic,
            identifier_policy: IdentifierPolicy::Validate,
            error: None,
        }
    }

    /// Create a new builder with an explicit SQL dialect.
    pub fn new_with_dialect(table: &str, dialect: Dialect) -> Self {
        Self::new(table).dialect(dialect)
    }

    /// Set the SQL dialect (affects placeholders, quoting, locking and `RETURNING`).
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Configure identifier quoting behavior.
    pub fn identifier_policy(mut self, policy: IdentifierPolicy) -> Self {
        self.identifier_policy = policy;
        self
    }

    /// Apply a scope, unless an earlier scope already attached an error.
    pub fn scope(self, scope: impl Scope) -> Self {
        if self.error.is_some() {
            return self;
        }
        scope.apply(self)
    }

    /// Attach a validation error. The first error wins; it is reported when
    /// the query is built.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
        self
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn push_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.push_condition(Condition::Eq(column.to_string(), value.into()))
    }

    pub fn where_gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.push_condition(Condition::Gte(column.to_string(), value.into()))
    }

    pub fn where_lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.push_condition(Condition::Lte(column.to_string(), value.into()))
    }

    pub fn where_between(
        self,
        column: &str,
        start: impl Into<Value>,
        end: impl Into<Value>,
    ) -> Self {
        self.push_condition(Condition::Between(
            column.to_string(),
            start.into(),
            end.into(),
        ))
    }

    pub fn where_in(self, column: &str, values: Vec<Value>) -> Self {
        self.push_condition(Condition::In(column.to_string(), values))
    }

    pub fn where_null(self, column: &str) -> Self {
        self.push_condition(Condition::IsNull(column.to_string()))
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.push_condition(Condition::IsNotNull(column.to_string()))
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order.push((column.to_string(), ascending));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit_val = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset_val = Some(offset);
        self
    }

    /// Record a relation to eager-load after the main query runs.
    pub fn preload(mut self, relation: &str) -> Self {
        self.preloads.push(relation.to_string());
        self
    }

    /// Request an exclusive row lock on the selected rows.
    pub fn lock(mut self) -> Self {
        self.lock = true;
        self
    }

    /// Ask `INSERT`/`UPDATE` statements to return the written row, where the
    /// dialect supports it.
    pub fn returning(mut self) -> Self {
        self.returning = true;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn get_dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn preloads(&self) -> &[String] {
        &self.preloads
    }

    pub fn is_locked(&self) -> bool {
        self.lock
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Build a SELECT query returning `(sql, bind_values)`.
    ///
    /// `columns` is `"*"` or a comma-separated list of column names.
    pub fn build_select(&self, columns: &str) -> Result<(String, Vec<Value>), DataError> {
        self.check_error()?;
        let table = self.ident(&self.table, "table")?;
        let columns = self.column_list(columns)?;

        let mut sql = format!("SELECT {columns} FROM {table}");
        let mut params = Vec::new();
        let mut placeholder_idx = 1usize;
        self.append_where(&mut sql, &mut params, &mut placeholder_idx)?;
        self.append_order(&mut sql)?;
        self.append_limit_offset(&mut sql);
        if self.lock {
            if let Some(clause) = self.dialect.lock_clause() {
                sql.push(' ');
                sql.push_str(clause);
            }
        }
        Ok((sql, params))
    }

    /// Build a COUNT query returning `(sql, bind_values)`.
    pub fn build_count(&self) -> Result<(String, Vec<Value>), DataError> {
        self.check_error()?;
        let table = self.ident(&self.table, "table")?;
        let mut sql = format!("SELECT COUNT(*) FROM {table}");
        let mut params = Vec::new();
        let mut placeholder_idx = 1usize;
        self.append_where(&mut sql, &mut params, &mut placeholder_idx)?;
        Ok((sql, params))
    }

    /// Build a single-row INSERT.
    pub fn build_insert(
        &self,
        values: Vec<(&str, Value)>,
    ) -> Result<(String, Vec<Value>), DataError> {
        self.check_error()?;
        let table = self.ident(&self.table, "table")?;
        let mut sql = if values.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES")
        } else {
            let mut columns = Vec::with_capacity(values.len());
            let mut placeholders = Vec::with_capacity(values.len());
            for (idx, (column, _)) in values.iter().enumerate() {
                columns.push(self.ident(column, "column")?);
                placeholders.push(self.dialect.placeholder(idx + 1));
            }
            format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        self.append_returning(&mut sql);
        Ok((sql, values.into_iter().map(|(_, v)| v).collect()))
    }

    /// Build an UPDATE setting every given column, restricted by the
    /// builder's conditions.
    pub fn build_update(
        &self,
        values: Vec<(&str, Value)>,
    ) -> Result<(String, Vec<Value>), DataError> {
        self.check_error()?;
        if values.is_empty() {
            return Err(DataError::validation("update requires at least one column"));
        }
        let table = self.ident(&self.table, "table")?;
        let mut params = Vec::with_capacity(values.len() + self.conditions.len());
        let mut placeholder_idx = 1usize;
        let mut assignments = Vec::with_capacity(values.len());
        for (column, value) in values {
            let column = self.ident(column, "column")?;
            let placeholder = self.dialect.placeholder(placeholder_idx);
            placeholder_idx += 1;
            assignments.push(format!("{column} = {placeholder}"));
            params.push(value);
        }
        let mut sql = format!("UPDATE {table} SET {}", assignments.join(", "));
        self.append_where(&mut sql, &mut params, &mut placeholder_idx)?;
        self.append_returning(&mut sql);
        Ok((sql, params))
    }

    /// Build a DELETE restricted by the builder's conditions.
    ///
    /// A DELETE without conditions is refused.
    pub fn build_delete(&self) -> Result<(String, Vec<Value>), DataError> {
        self.check_error()?;
        if self.conditions.is_empty() {
            return Err(DataError::validation("delete requires at least one condition"));
        }
        let table = self.ident(&self.table, "table")?;
        let mut sql = format!("DELETE FROM {table}");
        let mut params = Vec::new();
        let mut placeholder_idx = 1usize;
        self.append_where(&mut sql, &mut params, &mut placeholder_idx)?;
        Ok((sql, params))
    }

    fn check_error(&self) -> Result<(), DataError> {
        match &self.error {
            Some(msg) => Err(DataError::Validation(msg.clone())),
            None => Ok(()),
        }
    }

    fn append_where(
        &self,
        sql: &mut String,
        params: &mut Vec<Value>,
        placeholder_idx: &mut usize,
    ) -> Result<(), DataError> {
        if self.conditions.is_empty() {
            return Ok(());
        }
        let mut next = || {
            let placeholder = self.dialect.placeholder(*placeholder_idx);
            *placeholder_idx += 1;
            placeholder
        };
        sql.push_str(" WHERE ");
        let mut first = true;
        for cond in &self.conditions {
            if !first {
                sql.push_str(" AND ");
            }
            first = false;
            match cond {
                Condition::Eq(col, val) => {
                    let col = self.ident(col, "column")?;
                    sql.push_str(&format!("{col} = {}", next()));
                    params.push(val.clone());
                }
                Condition::Gte(col, val) => {
                    let col = self.ident(col, "column")?;
                    sql.push_str(&format!("{col} >= {}", next()));
                    params.push(val.clone());
                }
                Condition::Lte(col, val) => {
                    let col = self.ident(col, "column")?;
                    sql.push_str(&format!("{col} <= {}", next()));
                    params.push(val.clone());
                }
                Condition::Between(col, start, end) => {
                    let col = self.ident(col, "column")?;
                    let (low, high) = (next(), next());
                    sql.push_str(&format!("{col} BETWEEN {low} AND {high}"));
                    params.push(start.clone());
                    params.push(end.clone());
                }
                Condition::In(col, vals) => {
                    let col = self.ident(col, "column")?;
                    if vals.is_empty() {
                        // `IN ()` is not valid SQL; an empty set matches nothing.
                        sql.push_str("1 = 0");
                        continue;
                    }
                    let placeholders: Vec<_> = vals.iter().map(|_| next()).collect();
                    sql.push_str(&format!("{col} IN ({})", placeholders.join(", ")));
                    params.extend(vals.iter().cloned());
                }
                Condition::IsNull(col) => {
                    let col = self.ident(col, "column")?;
                    sql.push_str(&format!("{col} IS NULL"));
                }
                Condition::IsNotNull(col) => {
                    let col = self.ident(col, "column")?;
                    sql.push_str(&format!("{col} IS NOT NULL"));
                }
            }
        }
        Ok(())
    }

    fn append_order(&self, sql: &mut String) -> Result<(), DataError> {
        if self.order.is_empty() {
            return Ok(());
        }
        sql.push_str(" ORDER BY ");
        let mut clauses = Vec::with_capacity(self.order.len());
        for (col, asc) in &self.order {
            let col = self.ident(col, "field")?;
            if *asc {
                clauses.push(format!("{col} ASC"));
            } else {
                clauses.push(format!("{col} DESC"));
            }
        }
        sql.push_str(&clauses.join(", "));
        Ok(())
    }

    fn append_limit_offset(&self, sql: &mut String) {
        if let Some(limit) = self.limit_val {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset_val {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
    }

    fn append_returning(&self, sql: &mut String) {
        if self.returning && self.dialect.supports_returning() {
            sql.push_str(" RETURNING *");
        }
    }

    fn column_list(&self, columns: &str) -> Result<String, DataError> {
        if columns.trim() == "*" {
            return Ok("*".to_string());
        }
        let mut out = Vec::new();
        for col in columns.split(',') {
            out.push(self.ident(col.trim(), "column")?);
        }
        Ok(out.join(", "))
    }

    fn ident(&self, ident: &str, kind: &'static str) -> Result<String, DataError> {
        if !is_valid_field_name(ident) {
            return Err(DataError::Validation(format!("invalid {kind} name: {ident}")));
        }
        match self.identifier_policy {
            IdentifierPolicy::Quote => Ok(quote_identifier(ident, self.dialect)),
            IdentifierPolicy::Validate => Ok(ident.to_string()),
        }
    }
}

fn quote_identifier(ident: &str, dialect: Dialect) -> String {
    let quote = dialect.quote_char();
    ident
        .split('.')
        .map(|part| format!("{quote}{part}{quote}"))
        .collect::<Vec<_>>()
        .join(".")
}
