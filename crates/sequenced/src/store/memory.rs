use super::lock::{LockKey, LockManager, TxId};
use crate::{
    CounterKey, Error, Result, Row, RowId, Scope, Store, Transaction, UniqueConstraint, Value,
};
use core::time::Duration;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicU64, Ordering},
};
#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Default)]
struct Table {
    rows: BTreeMap<RowId, Row>,
    indexes: Vec<UniqueConstraint>,
}

impl Table {
    fn declare(&mut self, unique: &[UniqueConstraint]) {
        for constraint in unique {
            if !self.indexes.contains(constraint) {
                self.indexes.push(constraint.clone());
            }
        }
    }

    /// Finds the first index that `row` (stored as `id`) violates.
    fn violation(&self, id: RowId, row: &Row) -> Option<&UniqueConstraint> {
        self.indexes.iter().find(|index| {
            let Some(key) = index_key(index, row) else {
                return false;
            };
            self.rows
                .iter()
                .any(|(other, candidate)| *other != id && index_key(index, candidate).as_ref() == Some(&key))
        })
    }
}

/// Values of `row` for the index columns, or `None` if any is `NULL`.
fn index_key(index: &UniqueConstraint, row: &Row) -> Option<Vec<Value>> {
    index
        .columns()
        .iter()
        .map(|column| row.get(column).filter(|v| !v.is_null()).cloned())
        .collect()
}

#[derive(Default)]
struct State {
    tables: HashMap<&'static str, Table>,
    counters: HashMap<CounterKey, i64>,
}

/// An in-process reference [`Store`].
///
/// Rows live in memory. Each transaction buffers its writes and applies them
/// atomically on commit, after checking every declared unique constraint.
/// Scope and counter locks are exclusive per key and held until the
/// transaction ends, so different scopes never contend.
///
/// Suitable for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    locks: LockManager,
    next_tx: AtomicU64,
    next_row: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows of `table`, in row id order.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<(RowId, Row)> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.iter().map(|(id, row)| (*id, row.clone())).collect())
            .unwrap_or_default()
    }

    /// Committed values of `column` in `table`, in row id order. `NULL`s
    /// are reported as `None`.
    #[must_use]
    pub fn column(&self, table: &str, column: &str) -> Vec<Option<i64>> {
        self.rows(table)
            .iter()
            .map(|(_, row)| row.get(column).and_then(Value::as_int))
            .collect()
    }

    /// Last committed value of a counter row.
    #[must_use]
    pub fn counter(&self, key: &CounterKey) -> Option<i64> {
        self.state.lock().counters.get(key).copied()
    }
}

impl Store for MemoryStore {
    type Tx<'a> = MemoryTx<'a>;

    fn begin(&self, lock_timeout: Duration) -> Result<Self::Tx<'_>> {
        Ok(MemoryTx {
            store: self,
            id: self.next_tx.fetch_add(1, Ordering::Relaxed),
            lock_timeout,
            held: Vec::new(),
            writes: Vec::new(),
            finished: false,
        })
    }
}

#[derive(Clone, Debug)]
enum Write {
    Row {
        table: &'static str,
        id: RowId,
        row: Row,
        unique: Vec<UniqueConstraint>,
        insert: bool,
    },
    Counter {
        key: CounterKey,
        last_value: i64,
    },
}

/// A transaction on a [`MemoryStore`].
pub struct MemoryTx<'a> {
    store: &'a MemoryStore,
    id: TxId,
    lock_timeout: Duration,
    held: Vec<LockKey>,
    writes: Vec<Write>,
    finished: bool,
}

impl MemoryTx<'_> {
    fn lock(&mut self, key: LockKey) -> Result<()> {
        if self.store.locks.acquire(&key, self.id, self.lock_timeout)? {
            self.held.push(key);
        }
        Ok(())
    }

    /// Committed rows of `table` overlaid with this transaction's writes.
    fn visible_rows(&self, table: &str) -> BTreeMap<RowId, Row> {
        let mut rows = self
            .store
            .state
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default();
        for write in &self.writes {
            match write {
                Write::Row {
                    table: t, id, row, ..
                } if *t == table => {
                    rows.insert(*id, row.clone());
                }
                _ => {}
            }
        }
        rows
    }

    fn release(&mut self) {
        self.finished = true;
        self.store.locks.release_all(&self.held, self.id);
        self.held.clear();
    }

    fn apply(&self) -> Result<()> {
        let mut state = self.store.state.lock();
        let mut staged: HashMap<&'static str, Table> = HashMap::new();
        let mut counters = Vec::new();

        for write in &self.writes {
            match write {
                Write::Row {
                    table,
                    id,
                    row,
                    unique,
                    insert,
                } => {
                    let target = staged
                        .entry(*table)
                        .or_insert_with(|| state.tables.get(table).cloned().unwrap_or_default());
                    if !*insert && !target.rows.contains_key(id) {
                        return Err(Error::Store(format!("{table} has no row {id}")));
                    }
                    target.declare(unique);
                    if let Some(index) = target.violation(*id, row) {
                        return Err(Error::DuplicateSequenceValue {
                            table: (*table).to_owned(),
                            constraint: index.to_string(),
                        });
                    }
                    target.rows.insert(*id, row.clone());
                }
                Write::Counter { key, last_value } => counters.push((key.clone(), *last_value)),
            }
        }

        state.tables.extend(staged);
        state.counters.extend(counters);
        Ok(())
    }
}

impl Transaction for MemoryTx<'_> {
    fn lock_scope(&mut self, table: &'static str, scope: &Scope) -> Result<()> {
        self.lock(LockKey::Scope {
            table,
            scope: scope.clone(),
        })
    }

    fn max_value(
        &mut self,
        table: &'static str,
        column: &'static str,
        scope: &Scope,
    ) -> Result<Option<i64>> {
        Ok(self
            .visible_rows(table)
            .values()
            .filter(|row| scope.matches(row))
            .filter_map(|row| row.get(column).and_then(Value::as_int))
            .max())
    }

    fn value_exists(
        &mut self,
        table: &'static str,
        column: &'static str,
        value: i64,
        scope: &Scope,
        exclude: Option<RowId>,
    ) -> Result<bool> {
        Ok(self.visible_rows(table).iter().any(|(id, row)| {
            Some(*id) != exclude
                && scope.matches(row)
                && row.get(column).and_then(Value::as_int) == Some(value)
        }))
    }

    fn lock_counter(&mut self, key: &CounterKey) -> Result<Option<i64>> {
        self.lock(LockKey::Counter(key.clone()))?;
        let pending = self.writes.iter().rev().find_map(|write| match write {
            Write::Counter { key: k, last_value } if k == key => Some(*last_value),
            _ => None,
        });
        Ok(pending.or_else(|| self.store.counter(key)))
    }

    fn write_counter(&mut self, key: &CounterKey, last_value: i64) -> Result<()> {
        self.writes.push(Write::Counter {
            key: key.clone(),
            last_value,
        });
        Ok(())
    }

    fn insert(
        &mut self,
        table: &'static str,
        row: Row,
        unique: &[UniqueConstraint],
    ) -> Result<RowId> {
        let id = RowId(self.store.next_row.fetch_add(1, Ordering::Relaxed) + 1);
        self.writes.push(Write::Row {
            table,
            id,
            row,
            unique: unique.to_vec(),
            insert: true,
        });
        Ok(id)
    }

    fn update(
        &mut self,
        table: &'static str,
        id: RowId,
        row: Row,
        unique: &[UniqueConstraint],
    ) -> Result<()> {
        if !self.visible_rows(table).contains_key(&id) {
            return Err(Error::Store(format!("{table} has no row {id}")));
        }
        self.writes.push(Write::Row {
            table,
            id,
            row,
            unique: unique.to_vec(),
            insert: false,
        });
        Ok(())
    }

    fn savepoint<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let mark = self.writes.len();
        let result = f(self);
        if result.is_err() {
            self.writes.truncate(mark);
        }
        result
    }

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self), fields(tx = self.id)))]
    fn commit(mut self) -> Result<()> {
        let result = self.apply();
        self.release();
        result
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.release();
        }
    }
}
