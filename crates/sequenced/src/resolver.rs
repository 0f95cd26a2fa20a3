use crate::{Entity, Error, ResolvedSpec, Result, Scope, ScopeKey, StartAt, Value};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// A concrete request for the next value of one sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    pub column: &'static str,
    pub scope: Scope,
    pub start_at: i64,
}

/// Outcome of resolving a spec against a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The spec's skip predicate matched; leave the column as the caller set
    /// it.
    Skip,
    Generate(GenerationRequest),
}

/// Translates a spec and a record into a [`GenerationRequest`].
///
/// The skip predicate is evaluated first; a matching record is never
/// inspected further. Then every scope attribute is read in declaration
/// order, and finally the start value is evaluated. The record is never
/// modified.
///
/// # Errors
///
/// - [`Error::MissingScopeValue`] if a scope attribute is `NULL` on `record`.
/// - [`Error::InvalidStartValue`] if a computed start value is not an
///   integer.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "trace", skip_all, fields(table = R::TYPE_NAME, column = spec.column_name()))
)]
pub fn resolve<R: Entity>(spec: &ResolvedSpec<R>, record: &R) -> Result<Resolution> {
    if spec.should_skip(record) {
        return Ok(Resolution::Skip);
    }

    let mut attributes = Vec::with_capacity(spec.scope_accessors().len());
    let mut values = Vec::with_capacity(spec.scope_accessors().len());
    for &(attribute, get) in spec.scope_accessors() {
        let value = get(record);
        if value.is_null() {
            return Err(Error::MissingScopeValue { attribute });
        }
        attributes.push(attribute);
        values.push(value);
    }

    let start_at = match spec.start() {
        StartAt::Fixed(v) => *v,
        StartAt::Computed(f) => match f(record) {
            Value::Int(v) => v,
            found => {
                return Err(Error::InvalidStartValue {
                    column: spec.column_name(),
                    found,
                });
            }
        },
    };

    Ok(Resolution::Generate(GenerationRequest {
        column: spec.column_name(),
        scope: Scope::new(attributes, ScopeKey::new(values)),
        start_at,
    }))
}
