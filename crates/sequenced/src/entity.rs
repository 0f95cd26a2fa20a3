use crate::{Row, RowId, Value};
use core::fmt;

/// Reads one attribute of a record as a storage [`Value`].
pub type Getter<R> = fn(&R) -> Value;

/// Typed access to an integer column that receives generated values.
pub struct SequenceColumn<R> {
    get: fn(&R) -> Option<i64>,
    set: fn(&mut R, Option<i64>),
}

impl<R> SequenceColumn<R> {
    #[must_use]
    pub const fn new(get: fn(&R) -> Option<i64>, set: fn(&mut R, Option<i64>)) -> Self {
        Self { get, set }
    }

    #[must_use]
    pub fn get(&self, record: &R) -> Option<i64> {
        (self.get)(record)
    }

    pub fn set(&self, record: &mut R, value: Option<i64>) {
        (self.set)(record, value);
    }
}

impl<R> Clone for SequenceColumn<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for SequenceColumn<R> {}

impl<R> fmt::Debug for SequenceColumn<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceColumn").finish_non_exhaustive()
    }
}

/// A record type whose rows live in one table and may carry sequenced
/// columns.
///
/// Attribute names are resolved to plain function pointers once, when a
/// [`SequenceSpec`](crate::SequenceSpec) is registered. The generation path
/// never looks attributes up by name. Implementations are usually produced
/// by [`define_entity!`](crate::define_entity).
///
/// Subtypes that share a table (single-table inheritance) share
/// [`Entity::TYPE_NAME`] and therefore share unscoped sequences.
pub trait Entity: Sized + 'static {
    /// Entity type identifier and table name.
    const TYPE_NAME: &'static str;

    /// Every persisted column except the row id, in table order.
    const COLUMNS: &'static [&'static str];

    /// Resolves an attribute name to its accessor, or `None` if the type has
    /// no such attribute.
    fn attribute(name: &str) -> Option<Getter<Self>>;

    /// Resolves an integer column that can receive generated values.
    fn sequence_column(name: &str) -> Option<SequenceColumn<Self>>;

    /// Identity of the persisted row, if the record has been saved.
    fn row_id(&self) -> Option<RowId>;

    fn set_row_id(&mut self, id: Option<RowId>);

    /// Snapshot of the record's persisted columns.
    fn to_row(&self) -> Row;
}

/// Implements [`Entity`] for a plain struct by generating one accessor
/// function per listed field.
///
/// - `table`: entity type identifier and table name.
/// - `id`: an `Option<RowId>` field holding the persisted identity.
/// - `attributes`: fields convertible into [`Value`] (cloned on read).
/// - `sequences`: `Option<i64>` fields that may receive generated values.
///
/// ```rust
/// use sequenced::{define_entity, Entity, RowId};
///
/// #[derive(Default)]
/// struct Answer {
///     id: Option<RowId>,
///     question_id: Option<i64>,
///     sequential_id: Option<i64>,
/// }
///
/// define_entity! {
///     Answer {
///         table: "answers",
///         id: id,
///         attributes: [question_id],
///         sequences: [sequential_id],
///     }
/// }
///
/// assert_eq!(Answer::COLUMNS, &["question_id", "sequential_id"]);
/// assert!(Answer::attribute("question_id").is_some());
/// assert!(Answer::sequence_column("question_id").is_none());
/// ```
#[macro_export]
macro_rules! define_entity {
    (
        $ty:ty {
            table: $table:expr,
            id: $id:ident,
            attributes: [$($attr:ident),* $(,)?],
            sequences: [$($seq:ident),* $(,)?] $(,)?
        }
    ) => {
        impl $crate::Entity for $ty {
            const TYPE_NAME: &'static str = $table;
            const COLUMNS: &'static [&'static str] = &[
                $(stringify!($attr),)*
                $(stringify!($seq),)*
            ];

            fn attribute(name: &str) -> Option<$crate::Getter<Self>> {
                match name {
                    $(stringify!($attr) => Some(
                        (|r: &Self| $crate::Value::from(r.$attr.clone())) as $crate::Getter<Self>
                    ),)*
                    $(stringify!($seq) => Some(
                        (|r: &Self| $crate::Value::from(r.$seq)) as $crate::Getter<Self>
                    ),)*
                    _ => None,
                }
            }

            fn sequence_column(name: &str) -> Option<$crate::SequenceColumn<Self>> {
                match name {
                    $(stringify!($seq) => Some($crate::SequenceColumn::<Self>::new(
                        |r: &Self| r.$seq,
                        |r: &mut Self, v: Option<i64>| r.$seq = v,
                    )),)*
                    _ => None,
                }
            }

            fn row_id(&self) -> Option<$crate::RowId> {
                self.$id
            }

            fn set_row_id(&mut self, id: Option<$crate::RowId>) {
                self.$id = id;
            }

            fn to_row(&self) -> $crate::Row {
                $crate::Row::new()
                    $(.with(stringify!($attr), $crate::Value::from(self.$attr.clone())))*
                    $(.with(stringify!($seq), $crate::Value::from(self.$seq)))*
            }
        }
    };
}
