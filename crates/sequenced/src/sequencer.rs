use crate::{
    Assignment, Entity, Registry, Result, RowId, SequenceGenerator, SequencerConfig, Store,
    Strategy, Transaction,
};
use std::thread;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Runs registered sequence specs as part of saving records to a [`Store`].
///
/// This is the hook a persistence layer calls before a row is inserted: every
/// spec registered for the record's type is applied in registration order,
/// then the row is written together with the unique constraints the specs
/// ask for.
///
/// ```rust
/// use sequenced::{
///     define_entity, MemoryStore, Registry, RowId, SequenceSpec, Sequencer, SequencerConfig,
/// };
///
/// #[derive(Default)]
/// struct Invoice {
///     id: Option<RowId>,
///     account_id: Option<i64>,
///     sequential_id: Option<i64>,
/// }
///
/// define_entity! {
///     Invoice {
///         table: "invoices",
///         id: id,
///         attributes: [account_id],
///         sequences: [sequential_id],
///     }
/// }
///
/// let mut registry = Registry::builder();
/// registry.register(SequenceSpec::<Invoice>::new().scope(["account_id"]).start_at(1000))?;
/// let sequencer = Sequencer::new(MemoryStore::new(), registry.build(), SequencerConfig::default());
///
/// let mut first = Invoice { account_id: Some(1), ..Invoice::default() };
/// let mut second = Invoice { account_id: Some(1), ..Invoice::default() };
/// sequencer.create(&mut first)?;
/// sequencer.create(&mut second)?;
///
/// assert_eq!(first.sequential_id, Some(1000));
/// assert_eq!(second.sequential_id, Some(1001));
/// # Ok::<(), sequenced::Error>(())
/// ```
pub struct Sequencer<S> {
    store: S,
    registry: Registry,
    config: SequencerConfig,
    generator: SequenceGenerator<Strategy>,
}

impl<S: Store> Sequencer<S> {
    #[must_use]
    pub fn new(store: S, registry: Registry, config: SequencerConfig) -> Self {
        Self {
            store,
            registry,
            generator: SequenceGenerator::new(Strategy::from_config(&config)),
            config,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub const fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Opens a transaction using the configured lock timeout.
    ///
    /// # Errors
    ///
    /// See [`Store::begin`].
    pub fn begin(&self) -> Result<S::Tx<'_>> {
        self.store.begin(self.config.lock_timeout)
    }

    /// Runs `f` in a new transaction and commits it if `f` succeeds.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns, or a commit failure.
    pub fn transaction<'s, T>(
        &'s self,
        f: impl FnOnce(&mut S::Tx<'s>) -> Result<T>,
    ) -> Result<T> {
        let mut tx = self.begin()?;
        let value = f(&mut tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Applies every spec registered for `R` to `record`, in registration
    /// order.
    ///
    /// If any spec fails, values assigned by earlier specs in this call are
    /// cleared again, so the record is left as it was.
    ///
    /// # Errors
    ///
    /// The first error raised by [`SequenceGenerator::assign`].
    pub fn before_save<R: Entity, T: Transaction>(
        &self,
        tx: &mut T,
        record: &mut R,
    ) -> Result<Vec<Assignment>> {
        let specs = self.registry.specs::<R>();
        let mut assignments = Vec::with_capacity(specs.len());
        for spec in specs {
            match self.generator.assign(tx, spec, record) {
                Ok(assignment) => assignments.push(assignment),
                Err(e) => {
                    self.clear_generated(record, &assignments);
                    return Err(e);
                }
            }
        }
        Ok(assignments)
    }

    /// Assigns sequence values and writes `record` within `tx`.
    ///
    /// New records are inserted and receive their [`RowId`]; persisted
    /// records are updated in place. Sequenced columns that already hold a
    /// value are never reassigned, so a column is only regenerated on update
    /// if the caller cleared it first.
    ///
    /// The work runs in a savepoint: on error nothing written here survives
    /// in `tx`, and the record's generated columns are cleared again.
    ///
    /// # Errors
    ///
    /// Generation errors, or
    /// [`Error::DuplicateSequenceValue`](crate::Error::DuplicateSequenceValue)
    /// if a unique constraint is violated.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip_all, fields(table = R::TYPE_NAME))
    )]
    pub fn save<R: Entity, T: Transaction>(&self, tx: &mut T, record: &mut R) -> Result<RowId> {
        let unique: Vec<_> = self
            .registry
            .specs::<R>()
            .iter()
            .filter_map(|spec| spec.unique_constraint())
            .collect();

        tx.savepoint(|tx| {
            let assignments = self.before_save(tx, record)?;
            let written = match record.row_id() {
                Some(id) => tx.update(R::TYPE_NAME, id, record.to_row(), &unique).map(|()| id),
                None => tx.insert(R::TYPE_NAME, record.to_row(), &unique),
            };
            written.inspect_err(|_| self.clear_generated(record, &assignments))
        })
        .inspect(|id| record.set_row_id(Some(*id)))
    }

    /// Saves `record` in its own transaction, retrying the whole operation on
    /// transient failures.
    ///
    /// On [`Error::LockTimeout`](crate::Error::LockTimeout) or
    /// [`Error::DuplicateSequenceValue`](crate::Error::DuplicateSequenceValue)
    /// the columns generated by the failed attempt are cleared (manually set
    /// values are kept), and generation starts over with a fresh scan, up to
    /// [`RetryPolicy::max_attempts`](crate::RetryPolicy::max_attempts) times.
    ///
    /// # Errors
    ///
    /// The last error if every attempt failed, or the first non-retryable
    /// error.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip_all, fields(table = R::TYPE_NAME))
    )]
    pub fn create<R: Entity>(&self, record: &mut R) -> Result<RowId> {
        let persisted = record.row_id();
        let unset: Vec<bool> = self
            .registry
            .specs::<R>()
            .iter()
            .map(|spec| spec.current(record).is_none())
            .collect();
        let max_attempts = self.config.retry.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            let err = match self.transaction(|tx| self.save(tx, record)) {
                Ok(id) => return Ok(id),
                Err(e) => e,
            };

            // `save` may have succeeded before the commit failed.
            for (spec, &was_unset) in self.registry.specs::<R>().iter().zip(&unset) {
                if was_unset {
                    spec.assign(record, None);
                }
            }
            record.set_row_id(persisted);

            if !err.is_retryable() || attempt >= max_attempts {
                return Err(err);
            }
            #[cfg(feature = "tracing")]
            tracing::warn!(table = R::TYPE_NAME, attempt, error = %err, "retrying sequenced save");
            attempt += 1;
            if !self.config.retry.backoff.is_zero() {
                thread::sleep(self.config.retry.backoff);
            }
        }
    }

    fn clear_generated<R: Entity>(&self, record: &mut R, assignments: &[Assignment]) {
        for (spec, assignment) in self.registry.specs::<R>().iter().zip(assignments) {
            if let Assignment::Assigned(_) = assignment {
                spec.assign(record, None);
            }
        }
    }
}
