use core::time::Duration;
use sequenced::{
    CounterKey, Entity, Error, Registry, RegistryBuilder, RetryPolicy, RowId, ScopeKey,
    SequenceSpec, Sequencer, SequencerConfig, Store, StrategyKind, Transaction, Value,
    define_entity,
};
use sequenced_sqlite::SqliteStore;
use std::{
    sync::{Arc, Barrier},
    thread,
};
use tempfile::TempDir;

const KINDS: [StrategyKind; 2] = [StrategyKind::Scan, StrategyKind::Counter];

#[derive(Clone, Debug, Default)]
struct Answer {
    id: Option<RowId>,
    question_id: Option<i64>,
    sequential_id: Option<i64>,
}

define_entity! {
    Answer {
        table: "answers",
        id: id,
        attributes: [question_id],
        sequences: [sequential_id],
    }
}

fn answer(question_id: i64) -> Answer {
    Answer {
        question_id: Some(question_id),
        ..Answer::default()
    }
}

#[derive(Clone, Debug, Default)]
struct Email {
    id: Option<RowId>,
    emailable_id: Option<i64>,
    emailable_type: Option<String>,
    sequential_id: Option<i64>,
}

define_entity! {
    Email {
        table: "emails",
        id: id,
        attributes: [emailable_id, emailable_type],
        sequences: [sequential_id],
    }
}

#[derive(Clone, Debug, Default)]
struct Doppelganger {
    id: Option<RowId>,
    sequential_id_one: Option<i64>,
    sequential_id_two: Option<i64>,
}

define_entity! {
    Doppelganger {
        table: "doppelgangers",
        id: id,
        attributes: [],
        sequences: [sequential_id_one, sequential_id_two],
    }
}

#[derive(Clone, Debug, Default)]
struct Rating {
    id: Option<RowId>,
    comment_id: Option<i64>,
    score: i64,
    sequential_id: Option<i64>,
}

define_entity! {
    Rating {
        table: "ratings",
        id: id,
        attributes: [comment_id, score],
        sequences: [sequential_id],
    }
}

/// A database in a fresh temporary directory, removed on drop.
struct Fixture {
    _dir: TempDir,
    store: SqliteStore,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("sequenced.db")).unwrap();
        store.ensure_table::<Answer>().unwrap();
        store.ensure_table::<Email>().unwrap();
        store.ensure_table::<Doppelganger>().unwrap();
        store.ensure_table::<Rating>().unwrap();
        Self { _dir: dir, store }
    }

    fn sequencer(
        &self,
        config: SequencerConfig,
        registry: RegistryBuilder,
    ) -> Sequencer<SqliteStore> {
        Sequencer::new(self.store.clone(), registry.build(), config)
    }
}

fn answers(fixture: &Fixture, kind: StrategyKind) -> Sequencer<SqliteStore> {
    let mut registry = Registry::builder();
    registry
        .register(SequenceSpec::<Answer>::new().scope(["question_id"]))
        .unwrap();
    fixture.sequencer(SequencerConfig::default().with_strategy(kind), registry)
}

fn values(store: &SqliteStore, table: &str, column: &str) -> Vec<i64> {
    store
        .column(table, column)
        .unwrap()
        .into_iter()
        .flatten()
        .collect()
}

#[test]
fn scopes_number_independently_from_start_at() {
    for kind in KINDS {
        let fixture = Fixture::new();
        let sequencer = answers(&fixture, kind);

        for question_id in [1, 1, 2, 1, 2] {
            sequencer.create(&mut answer(question_id)).unwrap();
        }
        assert_eq!(
            values(&fixture.store, "answers", "sequential_id"),
            vec![1, 2, 1, 3, 2],
            "{kind:?}"
        );
    }
}

#[test]
fn manual_override_is_kept_and_followed() {
    for kind in KINDS {
        let fixture = Fixture::new();
        let sequencer = answers(&fixture, kind);
        sequencer.create(&mut answer(1)).unwrap();

        let mut manual = Answer {
            sequential_id: Some(10),
            ..answer(1)
        };
        sequencer.create(&mut manual).unwrap();
        let mut next = answer(1);
        sequencer.create(&mut next).unwrap();

        assert_eq!(manual.sequential_id, Some(10));
        assert_eq!(next.sequential_id, Some(11), "{kind:?}");
        assert_eq!(
            values(&fixture.store, "answers", "sequential_id"),
            vec![1, 10, 11]
        );
    }
}

#[test]
fn counter_rows_persist_per_scope() {
    let fixture = Fixture::new();
    let sequencer = answers(&fixture, StrategyKind::Counter);
    sequencer.create(&mut answer(1)).unwrap();
    sequencer.create(&mut answer(1)).unwrap();
    sequencer.create(&mut answer(2)).unwrap();

    let key = |question_id| {
        CounterKey::new(
            "answers",
            "sequential_id",
            ScopeKey::new(vec![Value::Int(question_id)]),
        )
    };
    assert_eq!(fixture.store.counter(&key(1)).unwrap(), Some(2));
    assert_eq!(fixture.store.counter(&key(2)).unwrap(), Some(1));
    assert_eq!(fixture.store.counter(&key(3)).unwrap(), None);
}

#[test]
fn skipped_records_stay_null() {
    for kind in KINDS {
        let fixture = Fixture::new();
        let mut registry = Registry::builder();
        registry
            .register(
                SequenceSpec::<Rating>::new()
                    .scope(["comment_id"])
                    .skip(|rating| rating.score == 0),
            )
            .unwrap();
        let sequencer =
            fixture.sequencer(SequencerConfig::default().with_strategy(kind), registry);

        let unrated = || Rating {
            comment_id: Some(1),
            ..Rating::default()
        };
        sequencer.create(&mut unrated()).unwrap();
        sequencer.create(&mut unrated()).unwrap();
        sequencer
            .create(&mut Rating {
                score: 4,
                ..unrated()
            })
            .unwrap();

        assert_eq!(
            fixture.store.column("ratings", "sequential_id").unwrap(),
            vec![None, None, Some(1)],
            "{kind:?}"
        );
    }
}

#[test]
fn concurrent_creates_yield_a_dense_sequence() {
    const N: usize = 50;
    for kind in KINDS {
        let fixture = Fixture::new();
        let mut registry = Registry::builder();
        registry
            .register(SequenceSpec::<Answer>::new().scope(["question_id"]))
            .unwrap();
        let sequencer = fixture.sequencer(
            SequencerConfig::default()
                .with_strategy(kind)
                .with_lock_timeout(Duration::from_secs(30)),
            registry,
        );
        let barrier = Arc::new(Barrier::new(N));

        thread::scope(|s| {
            for _ in 0..N {
                let barrier = Arc::clone(&barrier);
                let sequencer = &sequencer;
                s.spawn(move || {
                    barrier.wait();
                    sequencer.create(&mut answer(1)).unwrap();
                });
            }
        });

        let mut found = values(&fixture.store, "answers", "sequential_id");
        found.sort_unstable();
        assert_eq!(found, (1..=N as i64).collect::<Vec<_>>(), "{kind:?}");
    }
}

#[test]
fn nested_savepoints_share_the_outer_lock() {
    for kind in KINDS {
        let fixture = Fixture::new();
        let sequencer = answers(&fixture, kind);
        let mut records: Vec<_> = (0..10).map(|_| answer(1)).collect();

        sequencer
            .transaction(|tx| {
                for record in &mut records {
                    tx.savepoint(|tx| tx.savepoint(|tx| sequencer.save(tx, record)))?;
                }
                let err = fixture
                    .store
                    .begin(Duration::from_millis(20))
                    .err()
                    .unwrap();
                assert!(matches!(err, Error::LockTimeout { .. }), "{err}");
                Ok(())
            })
            .unwrap();

        assert_eq!(
            values(&fixture.store, "answers", "sequential_id"),
            (1..=10).collect::<Vec<_>>(),
            "{kind:?}"
        );
    }
}

#[test]
fn rolled_back_savepoints_and_transactions_leave_no_rows() {
    for kind in KINDS {
        let fixture = Fixture::new();
        let sequencer = answers(&fixture, kind);

        sequencer
            .transaction(|tx| {
                sequencer.save(tx, &mut answer(1))?;
                let err = sequencer.save(tx, &mut Answer::default()).unwrap_err();
                assert_eq!(
                    err,
                    Error::MissingScopeValue {
                        attribute: "question_id"
                    }
                );
                Ok(())
            })
            .unwrap();

        {
            let mut tx = sequencer.begin().unwrap();
            sequencer.save(&mut tx, &mut answer(1)).unwrap();
        }

        let mut next = answer(1);
        sequencer.create(&mut next).unwrap();
        assert_eq!(next.sequential_id, Some(2), "{kind:?}");
        assert_eq!(values(&fixture.store, "answers", "sequential_id"), vec![1, 2]);
    }
}

#[test]
fn multi_column_scopes_differ_by_any_component() {
    for kind in KINDS {
        let fixture = Fixture::new();
        let mut registry = Registry::builder();
        registry
            .register(SequenceSpec::<Email>::new().scope(["emailable_id", "emailable_type"]))
            .unwrap();
        let sequencer =
            fixture.sequencer(SequencerConfig::default().with_strategy(kind), registry);

        for (id, ty) in [(1, "A"), (1, "B"), (1, "A"), (2, "A")] {
            sequencer
                .create(&mut Email {
                    emailable_id: Some(id),
                    emailable_type: Some(ty.to_owned()),
                    ..Email::default()
                })
                .unwrap();
        }
        assert_eq!(
            values(&fixture.store, "emails", "sequential_id"),
            vec![1, 1, 2, 1],
            "{kind:?}"
        );
    }
}

#[test]
fn multiple_sequences_on_one_type() {
    for kind in KINDS {
        let fixture = Fixture::new();
        let mut registry = Registry::builder();
        registry
            .register(SequenceSpec::<Doppelganger>::new().column("sequential_id_one"))
            .unwrap()
            .register(
                SequenceSpec::<Doppelganger>::new()
                    .column("sequential_id_two")
                    .start_at(1000),
            )
            .unwrap();
        let sequencer =
            fixture.sequencer(SequencerConfig::default().with_strategy(kind), registry);

        sequencer.create(&mut Doppelganger::default()).unwrap();
        sequencer.create(&mut Doppelganger::default()).unwrap();

        assert_eq!(
            values(&fixture.store, "doppelgangers", "sequential_id_one"),
            vec![1, 2],
            "{kind:?}"
        );
        assert_eq!(
            values(&fixture.store, "doppelgangers", "sequential_id_two"),
            vec![1000, 1001],
            "{kind:?}"
        );
    }
}

#[test]
fn unique_index_rejects_manual_duplicates() {
    let fixture = Fixture::new();
    let mut registry = Registry::builder();
    registry
        .register(SequenceSpec::<Answer>::new().scope(["question_id"]))
        .unwrap();
    let sequencer = fixture.sequencer(
        SequencerConfig::default().with_retry(RetryPolicy {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }),
        registry,
    );
    sequencer.create(&mut answer(1)).unwrap();

    let mut duplicate = Answer {
        sequential_id: Some(1),
        ..answer(1)
    };
    let err = sequencer.create(&mut duplicate).unwrap_err();
    assert!(matches!(err, Error::DuplicateSequenceValue { .. }), "{err}");
    assert_eq!(duplicate.id, None);

    // Same value in another scope is fine.
    let mut elsewhere = Answer {
        sequential_id: Some(1),
        ..answer(2)
    };
    sequencer.create(&mut elsewhere).unwrap();
}

#[test]
fn existing_duplicates_block_the_unique_index_without_retrying() {
    let fixture = Fixture::new();
    let mut lenient = Registry::builder();
    lenient
        .register(
            SequenceSpec::<Answer>::new()
                .scope(["question_id"])
                .without_unique_index(),
        )
        .unwrap();
    let lenient = fixture.sequencer(SequencerConfig::default(), lenient);
    for _ in 0..2 {
        lenient
            .create(&mut Answer {
                sequential_id: Some(1),
                ..answer(1)
            })
            .unwrap();
    }

    let mut registry = Registry::builder();
    registry
        .register(SequenceSpec::<Answer>::new().scope(["question_id"]))
        .unwrap();
    let strict = fixture.sequencer(
        SequencerConfig::default().with_retry(RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_secs(5),
        }),
        registry,
    );
    let mut record = answer(1);
    let err = strict.create(&mut record).unwrap_err();
    assert!(matches!(err, Error::Store(_)), "{err}");
    assert!(!err.is_retryable());
    assert_eq!(record.sequential_id, None);
    assert_eq!(values(&fixture.store, "answers", "sequential_id"), vec![1, 1]);
}

#[test]
fn month_long_lock_timeout_is_accepted() {
    for kind in KINDS {
        let fixture = Fixture::new();
        let mut registry = Registry::builder();
        registry
            .register(SequenceSpec::<Answer>::new().scope(["question_id"]))
            .unwrap();
        let sequencer = fixture.sequencer(
            SequencerConfig::default()
                .with_strategy(kind)
                .with_lock_timeout(Duration::from_millis(2_592_000_000)),
            registry,
        );

        let mut record = answer(1);
        sequencer.create(&mut record).unwrap();
        assert_eq!(record.sequential_id, Some(1), "{kind:?}");
    }
}

#[test]
fn updates_keep_the_assigned_value() {
    for kind in KINDS {
        let fixture = Fixture::new();
        let sequencer = answers(&fixture, kind);
        let mut record = answer(1);
        let id = sequencer.create(&mut record).unwrap();

        record.question_id = Some(5);
        let updated = sequencer
            .transaction(|tx| sequencer.save(tx, &mut record))
            .unwrap();

        assert_eq!(updated, id);
        assert_eq!(record.sequential_id, Some(1));
        assert_eq!(values(&fixture.store, "answers", "question_id"), vec![5]);
    }
}

#[test]
fn updating_a_missing_row_fails() {
    let fixture = Fixture::new();
    let mut tx = fixture.store.begin(Duration::from_secs(1)).unwrap();
    let err = tx
        .update("answers", RowId(42), answer(1).to_row(), &[])
        .unwrap_err();
    assert!(matches!(err, Error::Store(_)));
}
