use super::interface::{first_candidate, probe};
use crate::{GenerationRequest, Result, RowId, SequenceStrategy, Transaction};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Scan-and-retry generation without a dedicated counter table.
///
/// 1. Locks the scope, so concurrent transactions cannot both read the same
///    maximum. The lock lives until the enclosing transaction ends.
/// 2. Reads the highest stored value in the scope (nulls excluded).
/// 3. Starts at `max(highest + 1, start_at)`.
/// 4. Skips values already stored in the scope (manual assignments or rows
///    written by a sibling strategy), excluding the record's own row.
///
/// With the lock held, step 4 retries at most once per manually inserted
/// value above the maximum, which in practice means never.
///
/// ## Recommended When
/// - Rows may be numbered manually and the next value must follow the true
///   current maximum
/// - The scope columns are indexed together with the sequenced column
///
/// ## See Also
/// - [`CounterStrategy`]
///
/// [`CounterStrategy`]: crate::CounterStrategy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanStrategy {
    max_collisions: u32,
}

impl ScanStrategy {
    /// Creates a scan strategy that gives up with
    /// [`Error::DuplicateSequenceValue`](crate::Error::DuplicateSequenceValue)
    /// after `max_collisions` taken values.
    #[must_use]
    pub const fn new(max_collisions: u32) -> Self {
        Self { max_collisions }
    }
}

impl Default for ScanStrategy {
    fn default() -> Self {
        Self::new(64)
    }
}

impl SequenceStrategy for ScanStrategy {
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
        tx.lock_scope(table, &request.scope)?;
        let highest = tx.max_value(table, request.column, &request.scope)?;
        let candidate = first_candidate(table, request, highest)?;
        probe(tx, table, request, exclude, candidate, self.max_collisions)
    }
}
