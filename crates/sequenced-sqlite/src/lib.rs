//! # sequenced-sqlite
//!
//! A [`sequenced::Store`] backed by a SQLite database file through
//! [`rusqlite`].
//!
//! Every transaction opens its own connection and starts with
//! `BEGIN IMMEDIATE`, which takes the database write lock up front. That lock
//! is coarser than a scope lock but gives the same guarantee: no two
//! transactions can read the same scope maximum or counter row and both write
//! a value derived from it. The transaction's lock timeout becomes the
//! connection's busy timeout; running out of it surfaces as
//! [`Error::LockTimeout`](sequenced::Error::LockTimeout).
//!
//! ```rust,no_run
//! use sequenced::{define_entity, Registry, RowId, SequenceSpec, Sequencer, SequencerConfig};
//! use sequenced_sqlite::SqliteStore;
//!
//! #[derive(Default)]
//! struct Answer {
//!     id: Option<RowId>,
//!     question_id: Option<i64>,
//!     sequential_id: Option<i64>,
//! }
//!
//! define_entity! {
//!     Answer {
//!         table: "answers",
//!         id: id,
//!         attributes: [question_id],
//!         sequences: [sequential_id],
//!     }
//! }
//!
//! let store = SqliteStore::open("answers.db")?;
//! store.ensure_table::<Answer>()?;
//!
//! let mut registry = Registry::builder();
//! registry.register(SequenceSpec::<Answer>::new().scope(["question_id"]))?;
//! let sequencer = Sequencer::new(store, registry.build(), SequencerConfig::default());
//!
//! let mut answer = Answer { question_id: Some(1), ..Answer::default() };
//! sequencer.create(&mut answer)?;
//! # Ok::<(), sequenced::Error>(())
//! ```

mod error;
mod schema;
mod store;

pub use crate::store::*;
