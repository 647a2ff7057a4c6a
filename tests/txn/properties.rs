//! Model-based properties of the merged cursor
//!
//! A reference model (a plain ordered map built from the committed
//! pairs with the staged pairs applied on top) predicts what every
//! scan and seek must produce. Keys are drawn from a tiny alphabet so
//! staged/committed collisions are common.

use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeMap;
use tempfile::tempdir;
use varve::{CursorState, EnvBuilder, EnvFlags, Environment, Txn, TxnFlags, WriteFlags};

fn small_pairs() -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
    vec(
        (
            vec(0u8..4, 0..3),
            vec(any::<u8>(), 1..4),
        ),
        0..12,
    )
}

fn probe_key() -> impl Strategy<Value = Vec<u8>> {
    vec(0u8..4, 0..3)
}

struct Harness {
    _dir: tempfile::TempDir,
    env: Environment,
    model: BTreeMap<Vec<u8>, Vec<u8>>,
    staged_keys: Vec<Vec<u8>>,
}

fn build(
    committed: Vec<(Vec<u8>, Vec<u8>)>,
    staged: Vec<(Vec<u8>, Vec<u8>)>,
) -> (Harness, Txn) {
    let dir = tempdir().unwrap();
    let env = EnvBuilder::new()
        .open(dir.path(), EnvFlags::NOSYNC, 0o600)
        .unwrap();

    let mut txn = Txn::begin(&env, None, TxnFlags::empty()).unwrap();
    for (k, v) in &committed {
        txn.put(k, v, WriteFlags::empty()).unwrap();
    }
    txn.commit().unwrap();

    let mut model: BTreeMap<Vec<u8>, Vec<u8>> = committed.into_iter().collect();
    let mut writer = Txn::begin(&env, None, TxnFlags::empty()).unwrap();
    let mut staged_keys = Vec::new();
    for (k, v) in &staged {
        writer.put(k, v, WriteFlags::empty()).unwrap();
        model.insert(k.clone(), v.clone());
        staged_keys.push(k.clone());
    }
    (
        Harness {
            _dir: dir,
            env,
            model,
            staged_keys,
        },
        writer,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn forward_scan_matches_the_model(committed in small_pairs(), staged in small_pairs()) {
        let (h, txn) = build(committed, staged);
        let mut cursor = txn.open_cursor().unwrap();

        let mut scanned = Vec::new();
        let mut step = cursor.first(1);
        while let Ok(pair) = step {
            scanned.push(pair);
            step = cursor.next(1);
        }
        let expected: Vec<_> = h.model.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        prop_assert_eq!(scanned, expected);
    }

    #[test]
    fn reverse_scan_matches_the_model(committed in small_pairs(), staged in small_pairs()) {
        let (h, txn) = build(committed, staged);
        let mut cursor = txn.open_cursor().unwrap();

        let mut scanned = Vec::new();
        let mut step = cursor.first(-1);
        while let Ok(pair) = step {
            scanned.push(pair);
            step = cursor.next(-1);
        }
        let expected: Vec<_> = h.model.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect();
        prop_assert_eq!(scanned, expected);
    }

    #[test]
    fn scans_are_strictly_monotone(committed in small_pairs(), staged in small_pairs()) {
        let (_h, txn) = build(committed, staged);
        let mut cursor = txn.open_cursor().unwrap();

        let mut prev: Option<Vec<u8>> = None;
        let mut step = cursor.first(1);
        while let Ok((k, _)) = step {
            if let Some(p) = &prev {
                prop_assert!(p < &k, "keys must strictly ascend");
            }
            prev = Some(k);
            step = cursor.next(1);
        }
    }

    #[test]
    fn shadowed_keys_yield_exactly_once(committed in small_pairs(), staged in small_pairs()) {
        let (h, txn) = build(committed, staged);
        let mut cursor = txn.open_cursor().unwrap();

        let mut seen: BTreeMap<Vec<u8>, usize> = BTreeMap::new();
        let mut step = cursor.first(1);
        while let Ok((k, v)) = step {
            *seen.entry(k.clone()).or_default() += 1;
            // Staged values shadow committed ones.
            prop_assert_eq!(&v, h.model.get(&k).unwrap());
            step = cursor.next(1);
        }
        for (k, count) in seen {
            prop_assert_eq!(count, 1, "key {:?} yielded more than once", k);
        }
    }

    #[test]
    fn seek_agrees_with_the_model(
        committed in small_pairs(),
        staged in small_pairs(),
        probes in vec(probe_key(), 1..8),
    ) {
        let (h, txn) = build(committed, staged);
        let mut cursor = txn.open_cursor().unwrap();

        for probe in probes {
            // Exact.
            match cursor.seek(&probe, 0) {
                Ok((k, v)) => {
                    prop_assert_eq!(&k, &probe);
                    prop_assert_eq!(Some(&v), h.model.get(&probe));
                }
                Err(e) => {
                    prop_assert!(e.is_not_found());
                    prop_assert!(!h.model.contains_key(&probe));
                }
            }
            // First at or after.
            let expected = h.model.range(probe.clone()..).next();
            match cursor.seek(&probe, 1) {
                Ok((k, v)) => prop_assert_eq!(Some((&k, &v)), expected),
                Err(e) => {
                    prop_assert!(e.is_not_found());
                    prop_assert!(expected.is_none());
                }
            }
            // Last at or before.
            let expected = h.model.range(..=probe.clone()).next_back();
            match cursor.seek(&probe, -1) {
                Ok((k, v)) => prop_assert_eq!(Some((&k, &v)), expected),
                Err(e) => {
                    prop_assert!(e.is_not_found());
                    prop_assert!(expected.is_none());
                }
            }
        }
    }

    #[test]
    fn staged_keys_read_back_with_their_own_state(
        committed in small_pairs(),
        staged in small_pairs(),
    ) {
        let (h, txn) = build(committed, staged);
        let mut cursor = txn.open_cursor().unwrap();

        for key in &h.staged_keys {
            let (k, v) = cursor.seek(key, 0).unwrap();
            prop_assert_eq!(&k, key);
            prop_assert_eq!(Some(&v), h.model.get(key));
            prop_assert!(matches!(
                cursor.state(),
                CursorState::Pending | CursorState::Equal
            ));
        }
    }

    #[test]
    fn committed_state_is_what_a_reader_sees(
        committed in small_pairs(),
        staged in small_pairs(),
    ) {
        let (h, writer) = build(committed, staged);
        writer.commit().unwrap();

        let txn = Txn::begin(&h.env, None, TxnFlags::RDONLY).unwrap();
        let mut cursor = txn.open_cursor().unwrap();
        let mut scanned = Vec::new();
        let mut step = cursor.first(1);
        while let Ok(pair) = step {
            scanned.push(pair);
            step = cursor.next(1);
        }
        let expected: Vec<_> = h.model.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        prop_assert_eq!(scanned, expected);
    }
}
