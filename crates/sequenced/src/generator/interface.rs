use crate::{Error, GenerationRequest, Result, RowId, Transaction};

/// A minimal interface for producing the next value of a scoped sequence.
///
/// Implementations run inside the caller's transaction and must leave the
/// scope serialized (locked) until that transaction ends, so no concurrent
/// transaction can observe the same "last value".
pub trait SequenceStrategy {
    /// Computes the next free value for `request` within `table`.
    ///
    /// `exclude` is the persisted identity of the record being sequenced, if
    /// any; its own row never counts as a collision.
    ///
    /// # Errors
    ///
    /// - [`Error::LockTimeout`] if the serialization point was not granted.
    /// - [`Error::DuplicateSequenceValue`] if no free value was found within
    ///   the strategy's collision budget.
    /// - [`Error::Exhausted`] if the next value would overflow.
    fn next_value<T: Transaction>(
        &self,
        tx: &mut T,
        table: &'static str,
        request: &GenerationRequest,
        exclude: Option<RowId>,
    ) -> Result<i64>;

    /// Observes a value the caller assigned manually before it is stored.
    ///
    /// Strategies that keep their own state use this to stay at or above the
    /// scope's true maximum. The default does nothing.
    ///
    /// # Errors
    ///
    /// [`Error::LockTimeout`] if the strategy's state could not be locked.
    fn observe_preset<T: Transaction>(
        &self,
        tx: &mut T,
        table: &'static str,
        request: &GenerationRequest,
        value: i64,
    ) -> Result<()> {
        let _ = (tx, table, request, value);
        Ok(())
    }
}

/// `max(highest + 1, start_at)`, or `start_at` for an empty scope.
pub(crate) fn first_candidate(
    table: &'static str,
    request: &GenerationRequest,
    highest: Option<i64>,
) -> Result<i64> {
    match highest {
        None => Ok(request.start_at),
        Some(highest) => Ok(increment(table, request, highest)?.max(request.start_at)),
    }
}

pub(crate) fn increment(table: &'static str, request: &GenerationRequest, value: i64) -> Result<i64> {
    value.checked_add(1).ok_or(Error::Exhausted {
        table,
        column: request.column,
    })
}

/// Advances `candidate` past every value already taken in the scope.
pub(crate) fn probe<T: Transaction>(
    tx: &mut T,
    table: &'static str,
    request: &GenerationRequest,
    exclude: Option<RowId>,
    mut candidate: i64,
    max_collisions: u32,
) -> Result<i64> {
    for _ in 0..=max_collisions {
        if !tx.value_exists(table, request.column, candidate, &request.scope, exclude)? {
            return Ok(candidate);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(table, column = request.column, candidate, "sequence value taken, probing next");
        candidate = increment(table, request, candidate)?;
    }
    Err(Error::DuplicateSequenceValue {
        table: table.to_owned(),
        constraint: request.column.to_owned(),
    })
}
