use core::fmt;

/// A single storage-level scalar.
///
/// Scope attributes, computed start values and rows handed to a
/// [`Store`](crate::Store) are all expressed in terms of [`Value`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    /// An unset attribute (SQL `NULL`).
    #[default]
    Null,
    /// An integer.
    Int(i64),
    /// A string.
    Text(String),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer if this is a [`Value::Int`].
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<RowId> for Value {
    fn from(v: RowId) -> Self {
        // Row ids come from the store's own integer key space.
        Self::Int(v.0 as i64)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// The ordered tuple of attribute values that partitions a sequence.
///
/// An empty key is the global scope: one sequence per entity type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey(Vec<Value>);

impl ScopeKey {
    /// The unit key shared by every row of an unscoped sequence.
    #[must_use]
    pub const fn global() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub const fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    #[must_use]
    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str(")")
    }
}

/// A resolved scope: the attribute names a sequence is scoped on, paired
/// with the values a specific record holds for them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Scope {
    attributes: Vec<&'static str>,
    key: ScopeKey,
}

impl Scope {
    #[must_use]
    pub const fn global() -> Self {
        Self {
            attributes: Vec::new(),
            key: ScopeKey::global(),
        }
    }

    /// # Panics
    /// Panics in debug builds if `attributes` and `key` differ in length.
    #[must_use]
    pub fn new(attributes: Vec<&'static str>, key: ScopeKey) -> Self {
        debug_assert_eq!(attributes.len(), key.values().len());
        Self { attributes, key }
    }

    #[must_use]
    pub fn attributes(&self) -> &[&'static str] {
        &self.attributes
    }

    #[must_use]
    pub const fn key(&self) -> &ScopeKey {
        &self.key
    }

    /// Iterates `(attribute, value)` equality filters.
    pub fn filters(&self) -> impl Iterator<Item = (&'static str, &Value)> + '_ {
        self.attributes.iter().copied().zip(self.key.values())
    }

    /// Returns `true` if `row` holds this scope's value for every attribute.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.filters()
            .all(|(attribute, value)| row.get(attribute) == Some(value))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attributes.is_empty() {
            return f.write_str("<global>");
        }
        for (i, (attribute, value)) in self.filters().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{attribute}={value}")?;
        }
        Ok(())
    }
}

/// Store-assigned identity of a persisted row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Column/value pairs of one row, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(&'static str, Value)>,
}

impl Row {
    #[must_use]
    pub const fn new() -> Self {
        Self { cells: Vec::new() }
    }

    /// Appends a cell, replacing an earlier cell of the same column.
    #[must_use]
    pub fn with(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.set(column, value.into());
        self
    }

    pub fn set(&mut self, column: &'static str, value: Value) {
        match self.cells.iter_mut().find(|(c, _)| *c == column) {
            Some((_, slot)) => *slot = value,
            None => self.cells.push((column, value)),
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find_map(|(c, v)| (*c == column).then_some(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> + '_ {
        self.cells.iter().map(|(c, v)| (*c, v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
