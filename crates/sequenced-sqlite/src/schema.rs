use rusqlite::types;
use sequenced::{Scope, UniqueConstraint, Value};

/// Table holding one row per `(type, column, scope)` for
/// [`CounterStrategy`](sequenced::CounterStrategy).
pub(crate) const COUNTERS: &str = "sequenced_counters";

pub(crate) const CREATE_COUNTERS: &str = "CREATE TABLE IF NOT EXISTS sequenced_counters (
    sequenced_type   TEXT    NOT NULL,
    sequenced_column TEXT    NOT NULL,
    scope            TEXT    NOT NULL,
    last_value       INTEGER NOT NULL,
    PRIMARY KEY (sequenced_type, sequenced_column, scope)
)";

/// Quotes an identifier for interpolation into SQL.
pub(crate) fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub(crate) fn sql_value(value: &Value) -> types::Value {
    match value {
        Value::Null => types::Value::Null,
        Value::Int(v) => types::Value::Integer(*v),
        Value::Text(s) => types::Value::Text(s.clone()),
    }
}

/// `CREATE TABLE` for an entity table: a rowid primary key plus untyped
/// columns, which SQLite stores with whatever affinity the value has.
pub(crate) fn create_table(table: &str, columns: &[&str]) -> String {
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT",
        quote(table)
    );
    for column in columns {
        sql.push_str(", ");
        sql.push_str(&quote(column));
    }
    sql.push(')');
    sql
}

pub(crate) fn create_unique_index(table: &str, constraint: &UniqueConstraint) -> String {
    let name = format!("{table}_{}_unique", constraint.columns().join("_"));
    let columns: Vec<_> = constraint.columns().iter().map(|c| quote(c)).collect();
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
        quote(&name),
        quote(table),
        columns.join(", ")
    )
}

/// Appends one equality filter per scope attribute to `sql`, pushing the
/// bound values onto `params`.
pub(crate) fn push_scope(sql: &mut String, params: &mut Vec<types::Value>, scope: &Scope) {
    for (attribute, value) in scope.filters() {
        params.push(sql_value(value));
        sql.push_str(&format!(" AND {} = ?{}", quote(attribute), params.len()));
    }
}
