//! Property tests for the annotation session
//!
//! Random sequences of Save/Skip/Undo are replayed against a session backed
//! by the in-memory store, checking the state invariants after every step.

use std::collections::BTreeSet;

use kula_annotator::{AnnotationSession, SessionState};
use kula_core::{KulaError, Record, RecordStore, Table};
use kula_store::MemoryRecordStore;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Save(String),
    Skip,
    Undo,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => "[a-z]{1,8}".prop_map(Op::Save),
        2 => Just(Op::Skip),
        2 => Just(Op::Undo),
    ]
}

fn source_table(n: usize) -> Table {
    let headers = vec!["sentence".to_string(), "batch".to_string()];
    let rows = (0..n)
        .map(|i| vec![format!("candidate {i}"), format!("b{}", i % 3)])
        .collect();
    Table::new(headers).with_rows(rows)
}

fn session_with(
    n: usize,
    capacity: usize,
) -> (MemoryRecordStore, AnnotationSession<MemoryRecordStore>) {
    let store = MemoryRecordStore::new();
    store.insert("source", source_table(n)).unwrap();
    let mut session = AnnotationSession::new(store.clone(), "output").with_undo_capacity(capacity);
    session.load("source").unwrap();
    (store, session)
}

fn assert_invariant(state: &SessionState) {
    let saved = state.saved_indices();
    assert_eq!(saved.len(), state.saved().len(), "index saved twice");
    assert!(saved.is_disjoint(state.skipped()));
    let union: BTreeSet<usize> = saved.union(state.skipped()).copied().collect();
    assert_eq!(&union, state.processed());
}

proptest! {
    #[test]
    fn prop_invariants_hold_for_any_sequence(
        n in 0usize..12,
        capacity in 1usize..6,
        ops in prop::collection::vec(op_strategy(), 0..40),
    ) {
        let (_store, mut session) = session_with(n, capacity);
        // Model of the recoverable history: states before each mutation
        let mut history: Vec<SessionState> = Vec::new();

        for op in ops {
            let before = session.state().clone();
            match op {
                Op::Save(text) => match session.save(Record::new(text)) {
                    Ok(_) => {
                        prop_assert_eq!(session.state().cursor(), before.cursor() + 1);
                        prop_assert_eq!(
                            session.state().processed().len(),
                            before.processed().len() + 1
                        );
                        history.push(before);
                    }
                    Err(KulaError::OutOfRange { .. }) => {
                        prop_assert_eq!(before.cursor(), n);
                        prop_assert_eq!(session.state(), &before);
                    }
                    Err(e) => prop_assert!(false, "unexpected error: {e}"),
                },
                Op::Skip => match session.skip() {
                    Ok(_) => {
                        prop_assert_eq!(session.state().cursor(), before.cursor() + 1);
                        prop_assert_eq!(
                            session.state().processed().len(),
                            before.processed().len() + 1
                        );
                        history.push(before);
                    }
                    Err(KulaError::OutOfRange { .. }) => {
                        prop_assert_eq!(session.state(), &before);
                    }
                    Err(e) => prop_assert!(false, "unexpected error: {e}"),
                },
                Op::Undo => {
                    if history.len() > capacity {
                        history.drain(..history.len() - capacity);
                    }
                    match (session.undo(), history.pop()) {
                        (Ok(_), Some(expected)) => prop_assert_eq!(session.state(), &expected),
                        (Err(KulaError::NoHistory), None) => {
                            prop_assert_eq!(session.state(), &before);
                        }
                        (result, expected) => prop_assert!(
                            false,
                            "undo mismatch: {:?} vs model {:?}",
                            result.is_ok(),
                            expected.is_some()
                        ),
                    }
                }
            }

            assert_invariant(session.state());
            prop_assert!(session.state().cursor() <= n);
        }
    }

    #[test]
    fn prop_finish_partitions_source(
        n in 0usize..15,
        decisions in prop::collection::vec(any::<bool>(), 0..15),
    ) {
        let (store, mut session) = session_with(n, 50);
        let original = source_table(n);

        for save in decisions.into_iter().take(n) {
            if save {
                session.save(Record::new("approved")).unwrap();
            } else {
                session.skip().unwrap();
            }
        }
        let processed = session.state().processed().clone();
        let summary = session.finish().unwrap();

        let remaining = store.load("source").unwrap();
        prop_assert_eq!(&remaining.headers, &original.headers);
        prop_assert_eq!(summary.remaining_count, remaining.num_rows());
        prop_assert_eq!(
            summary.saved_count + summary.skipped_count + summary.remaining_count,
            n
        );

        // Remaining rows plus processed rows rebuild the source, in order
        let mut remaining_rows = remaining.rows.into_iter();
        for (i, row) in original.rows.iter().enumerate() {
            if !processed.contains(&i) {
                let next = remaining_rows.next();
                prop_assert_eq!(next.as_ref(), Some(row));
            }
        }
        prop_assert!(remaining_rows.next().is_none());

        let output = store.load("output").unwrap();
        prop_assert_eq!(output.num_rows(), summary.saved_count);
    }
}

#[test]
fn bounded_history_keeps_only_latest() {
    let (_store, mut session) = session_with(10, 2);
    for _ in 0..3 {
        session.save(Record::new("x")).unwrap();
    }

    assert!(session.undo().is_ok());
    assert!(session.undo().is_ok());
    assert!(matches!(session.undo(), Err(KulaError::NoHistory)));
    assert_eq!(session.state().cursor(), 1);
    assert_eq!(session.state().saved().len(), 1);
}
