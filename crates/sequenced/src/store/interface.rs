use crate::{Result, Row, RowId, Scope, ScopeKey};
use core::{fmt, time::Duration};

/// Columns that must be jointly unique across a table.
///
/// Rows holding `NULL` in any of the columns never collide, as in SQL.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UniqueConstraint {
    columns: Vec<&'static str>,
}

impl UniqueConstraint {
    #[must_use]
    pub const fn new(columns: Vec<&'static str>) -> Self {
        Self { columns }
    }

    #[must_use]
    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }
}

impl fmt::Display for UniqueConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.columns.join(", "))
    }
}

/// Identity of a counter row: one per sequenced column and scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey {
    pub sequenced_type: &'static str,
    pub column: &'static str,
    pub scope: ScopeKey,
}

impl CounterKey {
    #[must_use]
    pub const fn new(sequenced_type: &'static str, column: &'static str, scope: ScopeKey) -> Self {
        Self {
            sequenced_type,
            column,
            scope,
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.sequenced_type, self.column, self.scope)
    }
}

/// A transactional backing store.
///
/// The store only needs relational filtering over the sequenced and scope
/// columns, an exclusive lock primitive (or serializable isolation), and
/// optionally unique constraints as a last line of defense.
pub trait Store: Send + Sync {
    type Tx<'a>: Transaction
    where
        Self: 'a;

    /// Opens a top-level transaction.
    ///
    /// `lock_timeout` bounds every lock acquisition made through the
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockTimeout`](crate::Error::LockTimeout) if the store
    /// serializes transactions up front and could not do so in time.
    fn begin(&self, lock_timeout: Duration) -> Result<Self::Tx<'_>>;
}

/// One unit of work against a [`Store`].
///
/// Dropping a transaction without calling [`Transaction::commit`] rolls it
/// back. Every lock taken through a transaction is held until the outermost
/// transaction ends, whatever the outcome.
pub trait Transaction {
    /// Acquires the exclusive serialization point for `scope` within `table`.
    ///
    /// Re-entrant: acquiring a lock the transaction already holds returns
    /// immediately. A store may lock more coarsely than one scope (a whole
    /// table or database), at the cost of contention between scopes.
    ///
    /// # Errors
    ///
    /// [`Error::LockTimeout`](crate::Error::LockTimeout) if the lock was not
    /// granted within the transaction's timeout.
    fn lock_scope(&mut self, table: &'static str, scope: &Scope) -> Result<()>;

    /// Highest non-null value of `column` among rows in `scope`, by numeric
    /// order. Includes this transaction's own uncommitted writes.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn max_value(
        &mut self,
        table: &'static str,
        column: &'static str,
        scope: &Scope,
    ) -> Result<Option<i64>>;

    /// Whether any row in `scope` other than `exclude` holds `value` in
    /// `column`.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn value_exists(
        &mut self,
        table: &'static str,
        column: &'static str,
        value: i64,
        scope: &Scope,
        exclude: Option<RowId>,
    ) -> Result<bool>;

    /// Locks the counter row for `key` (select-for-update) and returns its
    /// last issued value, or `None` if the row does not exist yet.
    ///
    /// The lock covers the key even while the row is absent, so two
    /// transactions cannot both bootstrap the same counter.
    ///
    /// # Errors
    ///
    /// [`Error::LockTimeout`](crate::Error::LockTimeout) or backend failures.
    fn lock_counter(&mut self, key: &CounterKey) -> Result<Option<i64>>;

    /// Inserts or updates the counter row for `key`. The caller must hold
    /// the lock from [`Transaction::lock_counter`].
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn write_counter(&mut self, key: &CounterKey, last_value: i64) -> Result<()>;

    /// Inserts a row, declaring `unique` constraints on its table.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateSequenceValue`](crate::Error::DuplicateSequenceValue)
    /// if a constraint is violated, here or at commit.
    fn insert(
        &mut self,
        table: &'static str,
        row: Row,
        unique: &[UniqueConstraint],
    ) -> Result<RowId>;

    /// Replaces the persisted columns of row `id`.
    ///
    /// # Errors
    ///
    /// As for [`Transaction::insert`], plus [`Error::Store`](crate::Error::Store)
    /// if the row does not exist.
    fn update(
        &mut self,
        table: &'static str,
        id: RowId,
        row: Row,
        unique: &[UniqueConstraint],
    ) -> Result<()>;

    /// Runs `f` in a nested transaction.
    ///
    /// If `f` fails only the writes made inside it are discarded. Locks taken
    /// inside stay with the outermost transaction.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns, or backend failures.
    fn savepoint<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T>
    where
        Self: Sized;

    /// Makes every write durable and releases every lock.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateSequenceValue`](crate::Error::DuplicateSequenceValue)
    /// if a unique constraint is violated, or backend failures. Locks are
    /// released either way.
    fn commit(self) -> Result<()>
    where
        Self: Sized;
}
