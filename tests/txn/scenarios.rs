//! Concrete end-to-end scenarios for the transactional core

use std::cmp::Ordering;
use std::sync::Arc;
use tempfile::tempdir;
use varve::{
    Comparator, CursorState, EnvBuilder, EnvFlags, Environment, Error, Txn, TxnFlags, WriteFlags,
};

fn open(dir: &std::path::Path) -> Environment {
    EnvBuilder::new()
        .open(dir, EnvFlags::empty(), 0o600)
        .unwrap()
}

fn commit_pairs(env: &Environment, pairs: &[(&[u8], &[u8])]) {
    let mut txn = Txn::begin(env, None, TxnFlags::empty()).unwrap();
    for (k, v) in pairs {
        txn.put(k, v, WriteFlags::empty()).unwrap();
    }
    txn.commit().unwrap();
}

#[test]
fn seek_in_a_committed_store_honors_direction() {
    let dir = tempdir().unwrap();
    let env = open(dir.path());
    commit_pairs(&env, &[(b"a", b"1"), (b"c", b"3")]);

    let txn = Txn::begin(&env, None, TxnFlags::RDONLY).unwrap();
    let mut cursor = txn.open_cursor().unwrap();

    let (k, v) = cursor.seek(b"b", 1).unwrap();
    assert_eq!((k.as_slice(), v.as_slice()), (b"c".as_slice(), b"3".as_slice()));
    let (k, v) = cursor.seek(b"b", -1).unwrap();
    assert_eq!((k.as_slice(), v.as_slice()), (b"a".as_slice(), b"1".as_slice()));
    let (k, v) = cursor.seek(b"a", 0).unwrap();
    assert_eq!((k.as_slice(), v.as_slice()), (b"a".as_slice(), b"1".as_slice()));
    assert!(cursor.seek(b"b", 0).unwrap_err().is_not_found());
}

#[test]
fn staged_overwrite_yields_once_with_equal_state() {
    let dir = tempdir().unwrap();
    let env = open(dir.path());
    commit_pairs(&env, &[(b"b", b"2")]);

    let mut txn = Txn::begin(&env, None, TxnFlags::empty()).unwrap();
    txn.put(b"b", b"B", WriteFlags::empty()).unwrap();
    let mut cursor = txn.open_cursor().unwrap();

    let (k, v) = cursor.first(1).unwrap();
    assert_eq!((k.as_slice(), v.as_slice()), (b"b".as_slice(), b"B".as_slice()));
    assert_eq!(cursor.state(), CursorState::Equal);
    assert!(cursor.next(1).unwrap_err().is_not_found());
}

#[test]
fn full_scan_interleaves_staged_and_committed() {
    let dir = tempdir().unwrap();
    let env = open(dir.path());
    commit_pairs(&env, &[(b"a", b"1"), (b"c", b"3")]);

    let mut txn = Txn::begin(&env, None, TxnFlags::empty()).unwrap();
    txn.put(b"b", b"2", WriteFlags::empty()).unwrap();
    let mut cursor = txn.open_cursor().unwrap();

    let mut scanned = Vec::new();
    let mut step = cursor.first(1);
    while let Ok((k, v)) = step {
        scanned.push((k, v));
        step = cursor.next(1);
    }
    assert_eq!(
        scanned,
        vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
        ]
    );
}

#[test]
fn read_your_writes_within_one_transaction() {
    let dir = tempdir().unwrap();
    let env = open(dir.path());

    let mut txn = Txn::begin(&env, None, TxnFlags::empty()).unwrap();
    txn.put(b"k", b"v", WriteFlags::empty()).unwrap();
    let mut cursor = txn.open_cursor().unwrap();
    let (k, v) = cursor.seek(b"k", 0).unwrap();
    assert_eq!((k.as_slice(), v.as_slice()), (b"k".as_slice(), b"v".as_slice()));
    assert!(matches!(
        cursor.state(),
        CursorState::Pending | CursorState::Equal
    ));
}

#[test]
fn snapshot_isolation_across_a_concurrent_commit() {
    let dir = tempdir().unwrap();
    let env = open(dir.path());
    commit_pairs(&env, &[(b"stable", b"0")]);

    let reader = Txn::begin(&env, None, TxnFlags::RDONLY).unwrap();
    commit_pairs(&env, &[(b"added", b"1"), (b"stable", b"changed")]);

    assert!(reader.get(b"added").unwrap_err().is_not_found());
    assert_eq!(reader.get(b"stable").unwrap(), b"0");

    let fresh = Txn::begin(&env, None, TxnFlags::RDONLY).unwrap();
    assert_eq!(fresh.get(b"added").unwrap(), b"1");
    assert_eq!(fresh.get(b"stable").unwrap(), b"changed");
}

#[test]
fn atomic_commit_is_all_or_nothing() {
    let dir = tempdir().unwrap();
    let env = open(dir.path());

    let mut writer = Txn::begin(&env, None, TxnFlags::empty()).unwrap();
    for i in 0..100u32 {
        writer
            .put(&i.to_be_bytes(), b"v", WriteFlags::empty())
            .unwrap();
    }
    writer.commit().unwrap();

    let txn = Txn::begin(&env, None, TxnFlags::RDONLY).unwrap();
    for i in 0..100u32 {
        assert!(txn.get(&i.to_be_bytes()).is_ok(), "key {i}");
    }
}

#[test]
fn conflicting_writers_resolve_to_the_later_commit() {
    let dir = tempdir().unwrap();
    let env = open(dir.path());

    let mut first = Txn::begin(&env, None, TxnFlags::empty()).unwrap();
    let mut second = Txn::begin(&env, None, TxnFlags::empty()).unwrap();
    first.put(b"k", b"A", WriteFlags::empty()).unwrap();
    second.put(b"k", b"B", WriteFlags::empty()).unwrap();
    // Neither writer observes an error; the later commit wins.
    first.commit().unwrap();
    second.commit().unwrap();

    let txn = Txn::begin(&env, None, TxnFlags::RDONLY).unwrap();
    assert_eq!(txn.get(b"k").unwrap(), b"B");
}

#[test]
fn no_overwrite_conflicts_exactly_when_seek_would_hit() {
    let dir = tempdir().unwrap();
    let env = open(dir.path());
    commit_pairs(&env, &[(b"taken", b"1")]);

    let mut txn = Txn::begin(&env, None, TxnFlags::empty()).unwrap();
    let cursor = txn.cursor().unwrap();
    assert!(cursor.seek(b"taken", 0).is_ok());
    assert!(cursor
        .put(b"taken", b"2", WriteFlags::NOOVERWRITE)
        .unwrap_err()
        .is_key_exist());

    assert!(cursor.seek(b"free", 0).unwrap_err().is_not_found());
    cursor.put(b"free", b"2", WriteFlags::NOOVERWRITE).unwrap();
}

#[test]
fn committed_state_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let env = open(dir.path());
        commit_pairs(&env, &[(b"a", b"1"), (b"b", b"2")]);
        commit_pairs(&env, &[(b"b", b"B"), (b"c", b"3")]);
    }
    let env = open(dir.path());
    let txn = Txn::begin(&env, None, TxnFlags::RDONLY).unwrap();
    assert_eq!(txn.get(b"a").unwrap(), b"1");
    assert_eq!(txn.get(b"b").unwrap(), b"B");
    assert_eq!(txn.get(b"c").unwrap(), b"3");
}

#[test]
fn uncommitted_writes_never_reach_disk() {
    let dir = tempdir().unwrap();
    {
        let env = open(dir.path());
        let mut txn = Txn::begin(&env, None, TxnFlags::empty()).unwrap();
        txn.put(b"ghost", b"1", WriteFlags::empty()).unwrap();
        txn.abort();
    }
    let env = open(dir.path());
    let txn = Txn::begin(&env, None, TxnFlags::RDONLY).unwrap();
    assert!(txn.get(b"ghost").unwrap_err().is_not_found());
}

#[test]
fn custom_comparator_governs_every_ordered_view() {
    struct ReverseOrder;
    impl Comparator for ReverseOrder {
        fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
            b.cmp(a)
        }
    }

    let dir = tempdir().unwrap();
    let env = EnvBuilder::new()
        .comparator(Arc::new(ReverseOrder))
        .open(dir.path(), EnvFlags::empty(), 0o600)
        .unwrap();
    commit_pairs(&env, &[(b"a", b"1"), (b"c", b"3")]);

    let mut txn = Txn::begin(&env, None, TxnFlags::empty()).unwrap();
    txn.put(b"b", b"2", WriteFlags::empty()).unwrap();
    let mut cursor = txn.open_cursor().unwrap();

    // "First" under the reversed order is the largest byte string.
    let mut keys = Vec::new();
    let mut step = cursor.first(1);
    while let Ok((k, _)) = step {
        keys.push(k);
        step = cursor.next(1);
    }
    assert_eq!(keys, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);

    // Seek with direction follows the installed order too.
    let (k, _) = cursor.seek(b"b", -1).unwrap();
    assert_eq!(k, b"b");
    let (k, _) = cursor.seek(b"bb", -1).unwrap();
    assert_eq!(k, b"c");
}

#[test]
fn dir_zero_outside_seek_is_invalid() {
    let dir = tempdir().unwrap();
    let env = open(dir.path());
    commit_pairs(&env, &[(b"a", b"1")]);
    let txn = Txn::begin(&env, None, TxnFlags::RDONLY).unwrap();
    let mut cursor = txn.open_cursor().unwrap();
    assert!(matches!(cursor.first(0), Err(Error::Invalid(_))));
    assert!(matches!(cursor.next(0), Err(Error::Invalid(_))));
}
