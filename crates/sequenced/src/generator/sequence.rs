use crate::{Entity, ResolvedSpec, Resolution, Result, SequenceStrategy, Transaction, resolve};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// What happened to one sequenced column during [`SequenceGenerator::assign`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assignment {
    /// The column already held a value, which was left untouched.
    Preset(i64),
    /// The spec's skip predicate matched; the column stays unset.
    Skipped,
    /// A fresh value was generated and written to the column.
    Assigned(i64),
}

impl Assignment {
    /// The column's value after assignment, if any.
    #[must_use]
    pub const fn value(&self) -> Option<i64> {
        match self {
            Self::Preset(v) | Self::Assigned(v) => Some(*v),
            Self::Skipped => None,
        }
    }
}

/// Assigns sequence values to records through a [`SequenceStrategy`].
///
/// Generation is idempotent: a record whose column is already set is never
/// touched, which is also how callers assign numbers manually. Such preset
/// values are still reported to the strategy. The column is
/// written only after resolution, locking and the scan have all succeeded;
/// on error the record is left unmodified. Nothing is persisted here.
#[derive(Clone, Debug, Default)]
pub struct SequenceGenerator<S> {
    strategy: S,
}

impl<S: SequenceStrategy> SequenceGenerator<S> {
    #[must_use]
    pub const fn new(strategy: S) -> Self {
        Self { strategy }
    }

    #[must_use]
    pub const fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Generates and assigns the next value of `spec` to `record`, within
    /// `tx`.
    ///
    /// # Errors
    ///
    /// Resolution errors (see [`resolve`]) and strategy errors (see
    /// [`SequenceStrategy::next_value`]).
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip_all, fields(table = R::TYPE_NAME, column = spec.column_name()))
    )]
    pub fn assign<R: Entity, T: Transaction>(
        &self,
        tx: &mut T,
        spec: &ResolvedSpec<R>,
        record: &mut R,
    ) -> Result<Assignment> {
        if let Some(value) = spec.current(record) {
            // A preset on a record that would not be generated (skipped, or
            // outside any complete scope) has nothing to report.
            if let Ok(Resolution::Generate(request)) = resolve(spec, record) {
                self.strategy
                    .observe_preset(tx, R::TYPE_NAME, &request, value)?;
            }
            return Ok(Assignment::Preset(value));
        }

        let request = match resolve(spec, record)? {
            Resolution::Skip => return Ok(Assignment::Skipped),
            Resolution::Generate(request) => request,
        };

        let value = self
            .strategy
            .next_value(tx, R::TYPE_NAME, &request, record.row_id())?;
        spec.assign(record, Some(value));
        Ok(Assignment::Assigned(value))
    }
}
