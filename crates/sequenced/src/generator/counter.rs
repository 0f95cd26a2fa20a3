use super::interface::{first_candidate, increment, probe};
use crate::{CounterKey, GenerationRequest, Result, RowId, SequenceStrategy, Transaction};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Generation through a dedicated counter row per sequenced column and scope.
///
/// 1. Locks the counter row for `(type, column, scope)` (select-for-update).
/// 2. If the row does not exist yet, bootstraps it once from the same scan
///    [`ScanStrategy`] performs, under the scope lock.
/// 3. Increments the counter; the result is raised to `start_at` if the start
///    value has since moved up.
/// 4. Skips values already stored in the scope, so manual assignments made
///    after the bootstrap do not collide, and writes the counter back.
///
/// Steady state reads one counter row plus an indexed existence probe instead
/// of scanning for the scope maximum.
///
/// Manual values saved through the generator raise the counter (see
/// [`SequenceStrategy::observe_preset`]), so numbering keeps following the
/// scope maximum.
///
/// ## Caveats
/// Rows written behind the generator's back after bootstrap are skipped
/// rather than followed: with a counter at `2` and a row `10` inserted
/// directly, the next value is `3`, where [`ScanStrategy`] would hand out
/// `11`.
///
/// ## See Also
/// - [`ScanStrategy`]
///
/// [`ScanStrategy`]: crate::ScanStrategy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CounterStrategy {
    max_collisions: u32,
}

impl CounterStrategy {
    #[must_use]
    pub const fn new(max_collisions: u32) -> Self {
        Self { max_collisions }
    }
}

impl Default for CounterStrategy {
    fn default() -> Self {
        Self::new(64)
    }
}

impl SequenceStrategy for CounterStrategy {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip(self, tx), fields(scope = %request.scope))
    )]
    fn next_value<T: Transaction>(
        &self,
        tx: &mut T,
        table: &'static str,
        request: &GenerationRequest,
        exclude: Option<RowId>,
    ) -> Result<i64> {
        let key = CounterKey::new(table, request.column, request.scope.key().clone());

        let candidate = match tx.lock_counter(&key)? {
            Some(last) => increment(table, request, last)?.max(request.start_at),
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!(counter = %key, "bootstrapping counter from table scan");
                tx.lock_scope(table, &request.scope)?;
                let highest = tx.max_value(table, request.column, &request.scope)?;
                first_candidate(table, request, highest)?
            }
        };

        let value = probe(tx, table, request, exclude, candidate, self.max_collisions)?;
        tx.write_counter(&key, value)?;
        Ok(value)
    }

    fn observe_preset<T: Transaction>(
        &self,
        tx: &mut T,
        table: &'static str,
        request: &GenerationRequest,
        value: i64,
    ) -> Result<()> {
        let key = CounterKey::new(table, request.column, request.scope.key().clone());
        // Without a counter row the next bootstrap scan sees the value anyway.
        match tx.lock_counter(&key)? {
            Some(last) if value > last => tx.write_counter(&key, value),
            _ => Ok(()),
        }
    }
}
