use crate::error::map_error;
use crate::schema::{
    COUNTERS, CREATE_COUNTERS, create_table, create_unique_index, push_scope, quote, sql_value,
};
use core::time::Duration;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params, params_from_iter, types};
use sequenced::{
    CounterKey, Entity, Error, Result, Row, RowId, Scope, Store, Transaction, UniqueConstraint,
};
use std::path::{Path, PathBuf};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Largest wait SQLite's busy handler accepts (`int` milliseconds).
const MAX_BUSY_TIMEOUT: Duration = Duration::from_millis(i32::MAX as u64);

/// A [`Store`] over a SQLite database file.
///
/// The database must be a file: each transaction opens its own connection,
/// so a private in-memory database would not be shared between them.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and prepares the
    /// counter table.
    ///
    /// # Errors
    ///
    /// [`Error::Store`] if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        let conn = store.connect()?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| store.error(e))?;
        conn.execute_batch(CREATE_COUNTERS)
            .map_err(|e| store.error(e))?;
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates `R`'s table if it does not exist yet: an `id` rowid key plus
    /// one column per entry of [`Entity::COLUMNS`].
    ///
    /// Unique indexes are created on first insert from the registered specs.
    ///
    /// # Errors
    ///
    /// [`Error::Store`] on database failure.
    pub fn ensure_table<R: Entity>(&self) -> Result<()> {
        self.connect()?
            .execute_batch(&create_table(R::TYPE_NAME, R::COLUMNS))
            .map_err(|e| self.error(e))
    }

    /// Committed values of `column` in `table`, in row id order.
    ///
    /// # Errors
    ///
    /// [`Error::Store`] on database failure, including an unknown table.
    pub fn column(&self, table: &str, column: &str) -> Result<Vec<Option<i64>>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {} FROM {} ORDER BY id", quote(column), quote(table));
        let mut stmt = conn.prepare(&sql).map_err(|e| self.error(e))?;
        let values = stmt
            .query_map([], |row| row.get::<_, Option<i64>>(0))
            .map_err(|e| self.error(e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| self.error(e))?;
        Ok(values)
    }

    /// Last committed value of a counter row.
    ///
    /// # Errors
    ///
    /// [`Error::Store`] on database failure.
    pub fn counter(&self, key: &CounterKey) -> Result<Option<i64>> {
        read_counter(&self.connect()?, key).map_err(|e| self.error(e))
    }

    fn connect(&self) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Connection::open_with_flags(&self.path, flags).map_err(|e| self.error(e))
    }

    fn error(&self, err: rusqlite::Error) -> Error {
        map_error(err, &self.path.display().to_string(), Duration::ZERO)
    }
}

impl Store for SqliteStore {
    type Tx<'a> = SqliteTx;

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self), fields(path = %self.path.display())))]
    fn begin(&self, lock_timeout: Duration) -> Result<SqliteTx> {
        let conn = self.connect()?;
        let database = self.path.display().to_string();
        conn.busy_timeout(lock_timeout.min(MAX_BUSY_TIMEOUT))
            .map_err(|e| map_error(e, &database, lock_timeout))?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| map_error(e, &database, lock_timeout))?;
        Ok(SqliteTx {
            conn,
            database,
            lock_timeout,
            depth: 0,
            finished: false,
        })
    }
}

fn read_counter(conn: &Connection, key: &CounterKey) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        &format!(
            "SELECT last_value FROM {COUNTERS} \
             WHERE sequenced_type = ?1 AND sequenced_column = ?2 AND scope = ?3"
        ),
        params![key.sequenced_type, key.column, key.scope.to_string()],
        |row| row.get(0),
    )
    .optional()
}

/// A `BEGIN IMMEDIATE` transaction on its own connection.
///
/// Holds the database write lock from [`Store::begin`] until commit or drop,
/// so [`Transaction::lock_scope`] and [`Transaction::lock_counter`] never
/// wait. Nested work runs in numbered `SAVEPOINT`s.
pub struct SqliteTx {
    conn: Connection,
    database: String,
    lock_timeout: Duration,
    depth: usize,
    finished: bool,
}

impl SqliteTx {
    fn error(&self, err: rusqlite::Error, table: &str) -> Error {
        map_error(err, table, self.lock_timeout)
    }

    fn exec(&self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| map_error(e, &self.database, self.lock_timeout))
    }

    /// A table that already holds duplicates cannot take the index; that is
    /// a schema problem, not a retryable collision.
    fn ensure_unique(&self, table: &str, unique: &[UniqueConstraint]) -> Result<()> {
        for constraint in unique {
            self.conn
                .execute_batch(&create_unique_index(table, constraint))
                .map_err(|e| match self.error(e, table) {
                    Error::DuplicateSequenceValue { constraint, .. } => Error::Store(format!(
                        "cannot create unique index on {table}: {constraint}"
                    )),
                    other => other,
                })?;
        }
        Ok(())
    }
}

fn sql_row_id(id: RowId) -> Result<i64> {
    i64::try_from(id.0).map_err(|_| Error::Store(format!("row id {id} out of range")))
}

impl Transaction for SqliteTx {
    fn lock_scope(&mut self, _table: &'static str, _scope: &Scope) -> Result<()> {
        Ok(())
    }

    fn max_value(
        &mut self,
        table: &'static str,
        column: &'static str,
        scope: &Scope,
    ) -> Result<Option<i64>> {
        let mut sql = format!(
            "SELECT MAX({}) FROM {} WHERE 1 = 1",
            quote(column),
            quote(table)
        );
        let mut params = Vec::new();
        push_scope(&mut sql, &mut params, scope);
        self.conn
            .query_row(&sql, params_from_iter(params), |row| row.get(0))
            .map_err(|e| self.error(e, table))
    }

    fn value_exists(
        &mut self,
        table: &'static str,
        column: &'static str,
        value: i64,
        scope: &Scope,
        exclude: Option<RowId>,
    ) -> Result<bool> {
        let exclude = match exclude {
            Some(id) => types::Value::Integer(sql_row_id(id)?),
            None => types::Value::Null,
        };
        let mut sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = ?1 AND id IS NOT ?2",
            quote(table),
            quote(column)
        );
        let mut params = vec![types::Value::Integer(value), exclude];
        push_scope(&mut sql, &mut params, scope);
        sql.push(')');
        self.conn
            .query_row(&sql, params_from_iter(params), |row| row.get(0))
            .map_err(|e| self.error(e, table))
    }

    fn lock_counter(&mut self, key: &CounterKey) -> Result<Option<i64>> {
        read_counter(&self.conn, key).map_err(|e| self.error(e, COUNTERS))
    }

    fn write_counter(&mut self, key: &CounterKey, last_value: i64) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {COUNTERS} (sequenced_type, sequenced_column, scope, last_value) \
                     VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT (sequenced_type, sequenced_column, scope) \
                     DO UPDATE SET last_value = excluded.last_value"
                ),
                params![key.sequenced_type, key.column, key.scope.to_string(), last_value],
            )
            .map(drop)
            .map_err(|e| self.error(e, COUNTERS))
    }

    fn insert(
        &mut self,
        table: &'static str,
        row: Row,
        unique: &[UniqueConstraint],
    ) -> Result<RowId> {
        self.ensure_unique(table, unique)?;

        let sql = if row.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote(table))
        } else {
            let columns: Vec<_> = row.iter().map(|(column, _)| quote(column)).collect();
            let placeholders: Vec<_> = (1..=row.len()).map(|i| format!("?{i}")).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(table),
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        let params: Vec<_> = row.iter().map(|(_, value)| sql_value(value)).collect();
        self.conn
            .execute(&sql, params_from_iter(params))
            .map_err(|e| self.error(e, table))?;

        let id = self.conn.last_insert_rowid();
        u64::try_from(id)
            .map(RowId)
            .map_err(|_| Error::Store(format!("{table} returned row id {id}")))
    }

    fn update(
        &mut self,
        table: &'static str,
        id: RowId,
        row: Row,
        unique: &[UniqueConstraint],
    ) -> Result<()> {
        self.ensure_unique(table, unique)?;

        let mut params: Vec<_> = row.iter().map(|(_, value)| sql_value(value)).collect();
        params.push(types::Value::Integer(sql_row_id(id)?));
        let sql = if row.is_empty() {
            // Still fails for a missing row.
            format!("UPDATE {} SET id = id WHERE id = ?1", quote(table))
        } else {
            let assignments: Vec<_> = row
                .iter()
                .enumerate()
                .map(|(i, (column, _))| format!("{} = ?{}", quote(column), i + 1))
                .collect();
            format!(
                "UPDATE {} SET {} WHERE id = ?{}",
                quote(table),
                assignments.join(", "),
                params.len()
            )
        };

        let changed = self
            .conn
            .execute(&sql, params_from_iter(params))
            .map_err(|e| self.error(e, table))?;
        if changed == 0 {
            return Err(Error::Store(format!("{table} has no row {id}")));
        }
        Ok(())
    }

    fn savepoint<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let name = format!("sequenced_{}", self.depth + 1);
        self.exec(&format!("SAVEPOINT {name}"))?;
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;

        match result {
            Ok(value) => {
                self.exec(&format!("RELEASE {name}"))?;
                Ok(value)
            }
            Err(e) => {
                // The caller's error wins; a failed rollback leaves the outer
                // transaction to be rolled back on drop.
                let rollback = format!("ROLLBACK TO {name}; RELEASE {name}");
                if let Err(_failure) = self.exec(&rollback) {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(savepoint = %name, error = %_failure, "savepoint rollback failed");
                }
                Err(e)
            }
        }
    }

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self), fields(database = %self.database)))]
    fn commit(mut self) -> Result<()> {
        self.exec("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        if !self.finished {
            // Nothing to report to: the connection closes right after.
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}
