use crate::{Entity, Error, Getter, Result, SequenceColumn, Value};
use core::fmt;
use std::sync::Arc;

/// Default name of the sequenced column.
pub const DEFAULT_COLUMN: &str = "sequential_id";

/// Default first value of a sequence.
pub const DEFAULT_START_AT: i64 = 1;

/// Predicate that bypasses generation for a record.
pub type SkipFn<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;

/// Computation of a record's start value.
pub type StartFn<R> = Arc<dyn Fn(&R) -> Value + Send + Sync>;

/// The lowest value a sequence may hand out.
pub enum StartAt<R> {
    Fixed(i64),
    /// Evaluated once per generation attempt against the record's current
    /// state. Anything other than [`Value::Int`] is rejected with
    /// [`Error::InvalidStartValue`].
    Computed(StartFn<R>),
}

impl<R> StartAt<R> {
    pub fn computed(f: impl Fn(&R) -> Value + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }
}

impl<R> Clone for StartAt<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Fixed(v) => Self::Fixed(*v),
            Self::Computed(f) => Self::Computed(Arc::clone(f)),
        }
    }
}

impl<R> fmt::Debug for StartAt<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(v) => f.debug_tuple("Fixed").field(v).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Declarative configuration of one sequenced column on an entity type.
///
/// ```rust
/// use sequenced::{SequenceSpec, Value};
/// # #[derive(Default)]
/// # struct Invoice { account_id: Option<i64>, draft: bool }
///
/// let spec = SequenceSpec::<Invoice>::new()
///     .scope(["account_id"])
///     .start_at(1000)
///     .skip(|invoice| invoice.draft);
///
/// assert_eq!(spec.column_name(), "sequential_id");
/// assert_eq!(spec.scope_names(), &["account_id"]);
/// ```
pub struct SequenceSpec<R> {
    column: &'static str,
    scope: Vec<&'static str>,
    start_at: StartAt<R>,
    skip: Option<SkipFn<R>>,
    unique: bool,
}

impl<R> SequenceSpec<R> {
    /// A global sequence on `sequential_id` starting at `1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            column: DEFAULT_COLUMN,
            scope: Vec::new(),
            start_at: StartAt::Fixed(DEFAULT_START_AT),
            skip: None,
            unique: true,
        }
    }

    #[must_use]
    pub fn column(mut self, column: &'static str) -> Self {
        self.column = column;
        self
    }

    /// Scopes the sequence on the given attributes, in order.
    #[must_use]
    pub fn scope(mut self, attributes: impl IntoIterator<Item = &'static str>) -> Self {
        self.scope = attributes.into_iter().collect();
        self
    }

    #[must_use]
    pub fn start_at(mut self, start_at: i64) -> Self {
        self.start_at = StartAt::Fixed(start_at);
        self
    }

    #[must_use]
    pub fn start_at_with(mut self, f: impl Fn(&R) -> Value + Send + Sync + 'static) -> Self {
        self.start_at = StartAt::computed(f);
        self
    }

    #[must_use]
    pub fn skip(mut self, f: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        self.skip = Some(Arc::new(f));
        self
    }

    /// Do not ask the store for a unique index on `(scope..., column)`.
    ///
    /// Manually assigned duplicates are then accepted, and the scan's
    /// collision check is the only guard.
    #[must_use]
    pub fn without_unique_index(mut self) -> Self {
        self.unique = false;
        self
    }

    #[must_use]
    pub const fn column_name(&self) -> &'static str {
        self.column
    }

    #[must_use]
    pub fn scope_names(&self) -> &[&'static str] {
        &self.scope
    }
}

impl<R> Default for SequenceSpec<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Entity> SequenceSpec<R> {
    /// Binds every name in this spec to `R`'s accessors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the column is not an integer
    /// sequence column of `R`, or if a scope attribute is undefined on `R`.
    pub fn resolve_for(self) -> Result<ResolvedSpec<R>> {
        let column = R::sequence_column(self.column).ok_or_else(|| {
            Error::configuration(
                R::TYPE_NAME,
                format!("column `{}` is not defined", self.column),
            )
        })?;

        let scope = self
            .scope
            .iter()
            .map(|&name| {
                R::attribute(name)
                    .map(|get| (name, get))
                    .ok_or_else(|| {
                        Error::configuration(
                            R::TYPE_NAME,
                            format!("scope attribute `{name}` is not defined"),
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ResolvedSpec {
            column_name: self.column,
            column,
            scope,
            start_at: self.start_at,
            skip: self.skip,
            unique: self.unique,
        })
    }
}

/// A [`SequenceSpec`] whose names are bound to `R`'s accessor functions.
pub struct ResolvedSpec<R> {
    column_name: &'static str,
    column: SequenceColumn<R>,
    scope: Vec<(&'static str, Getter<R>)>,
    start_at: StartAt<R>,
    skip: Option<SkipFn<R>>,
    unique: bool,
}

impl<R> ResolvedSpec<R> {
    #[must_use]
    pub const fn column_name(&self) -> &'static str {
        self.column_name
    }

    #[must_use]
    pub fn scope_names(&self) -> Vec<&'static str> {
        self.scope.iter().map(|(name, _)| *name).collect()
    }

    /// Current value of the sequenced column on `record`.
    #[must_use]
    pub fn current(&self, record: &R) -> Option<i64> {
        self.column.get(record)
    }

    pub(crate) fn assign(&self, record: &mut R, value: Option<i64>) {
        self.column.set(record, value);
    }

    pub(crate) fn scope_accessors(&self) -> &[(&'static str, Getter<R>)] {
        &self.scope
    }

    pub(crate) const fn start(&self) -> &StartAt<R> {
        &self.start_at
    }

    pub(crate) fn should_skip(&self, record: &R) -> bool {
        self.skip.as_ref().is_some_and(|skip| skip(record))
    }

    /// Columns of the unique index backing this sequence, if one is wanted.
    #[must_use]
    pub fn unique_constraint(&self) -> Option<crate::UniqueConstraint> {
        self.unique.then(|| {
            let mut columns = self.scope_names();
            columns.push(self.column_name);
            crate::UniqueConstraint::new(columns)
        })
    }
}

impl<R> fmt::Debug for ResolvedSpec<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSpec")
            .field("column", &self.column_name)
            .field("scope", &self.scope_names())
            .field("start_at", &self.start_at)
            .field("skip", &self.skip.is_some())
            .field("unique", &self.unique)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RowId, define_entity};

    #[derive(Default)]
    struct Product {
        id: Option<RowId>,
        account_id: Option<i64>,
        sequential_id: Option<i64>,
    }

    define_entity! {
        Product {
            table: "products",
            id: id,
            attributes: [account_id],
            sequences: [sequential_id],
        }
    }

    #[test]
    fn defaults_match_a_global_sequence_from_one() {
        let spec = SequenceSpec::<Product>::new();
        assert_eq!(spec.column_name(), DEFAULT_COLUMN);
        assert!(spec.scope_names().is_empty());
        assert!(matches!(spec.start_at, StartAt::Fixed(1)));

        let resolved = spec.resolve_for().unwrap();
        let unique = resolved.unique_constraint().unwrap();
        assert_eq!(unique.columns(), &["sequential_id"]);
    }

    #[test]
    fn undefined_scope_attribute_is_a_configuration_error() {
        let err = SequenceSpec::<Product>::new()
            .scope(["non_existent_column"])
            .resolve_for()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { type_name: "products", .. }));
        assert!(err.to_string().contains("non_existent_column"));
    }

    #[test]
    fn undefined_column_is_a_configuration_error() {
        let err = SequenceSpec::<Product>::new()
            .column("custom_sequential_id")
            .resolve_for()
            .unwrap_err();
        assert!(err.to_string().contains("custom_sequential_id"));
    }

    #[test]
    fn resolved_accessors_read_and_write_the_record() {
        let resolved = SequenceSpec::<Product>::new()
            .scope(["account_id"])
            .resolve_for()
            .unwrap();
        let mut product = Product {
            account_id: Some(4),
            ..Product::default()
        };

        assert_eq!(resolved.current(&product), None);
        resolved.assign(&mut product, Some(9));
        assert_eq!(product.sequential_id, Some(9));

        let (name, get) = resolved.scope_accessors()[0];
        assert_eq!(name, "account_id");
        assert_eq!(get(&product), Value::Int(4));
    }

    #[test]
    fn unique_index_can_be_disabled() {
        let resolved = SequenceSpec::<Product>::new()
            .without_unique_index()
            .resolve_for()
            .unwrap();
        assert!(resolved.unique_constraint().is_none());
    }
}
