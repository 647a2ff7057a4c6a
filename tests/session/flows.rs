//! End-to-end session flows over a real environment

use tempfile::tempdir;
use varve::{
    has_permission, parse_cookie, EnvBuilder, EnvFlags, Error, Mode, SessionCache, Txn, TxnFlags,
};
use varve_session::schema;

fn cache(dir: &std::path::Path) -> SessionCache {
    let env = EnvBuilder::new()
        .open(dir, EnvFlags::empty(), 0o600)
        .unwrap();
    SessionCache::new(env, 32, Mode::RDWR)
}

/// Bootstrap the first user the way an installer would: written
/// directly inside one transaction, then logged in.
fn bootstrap_admin(cache: &SessionCache) -> std::sync::Arc<varve::Session> {
    let mut txn = Txn::begin(cache.env(), None, TxnFlags::empty()).unwrap();
    let record = schema::UserRecord {
        username: "admin".into(),
        passhash: varve_session::auth::hash_password("hunter22").unwrap(),
        mode: Mode::ROOT,
        parent: 0,
        time: 0,
    };
    txn.put(
        &schema::user_by_id_key(1),
        &schema::user_by_id_val(&record),
        varve::WriteFlags::NOOVERWRITE,
    )
    .unwrap();
    txn.put(
        &schema::user_id_by_name_key("admin").unwrap(),
        &schema::user_id_by_name_val(1),
        varve::WriteFlags::NOOVERWRITE,
    )
    .unwrap();
    txn.commit().unwrap();
    cache.login("admin", "hunter22").unwrap()
}

#[test]
fn login_cookie_round_trips_through_the_cache() {
    let dir = tempdir().unwrap();
    let cache = cache(dir.path());
    let admin = bootstrap_admin(&cache);

    let cookie = admin.cookie().unwrap();
    let (id, _) = parse_cookie(&cookie).unwrap();
    assert_eq!(id, admin.id());

    let session = cache.active_session(Some(&cookie)).unwrap().unwrap();
    assert_eq!(session.user_id(), 1);
    assert!(session.permits(Mode::ROOT));
}

#[test]
fn created_users_can_log_in_with_their_granted_mode() {
    let dir = tempdir().unwrap();
    let cache = cache(dir.path());
    let admin = bootstrap_admin(&cache);

    let mut txn = Txn::begin(cache.env(), None, TxnFlags::empty()).unwrap();
    cache
        .create_user(Some(&admin), &mut txn, "reader", "secret")
        .unwrap();
    txn.commit().unwrap();

    let session = cache.login("reader", "secret").unwrap();
    // Registration mode is RDWR; the admin's ROOT does not leak in.
    assert_eq!(session.mode(), Mode::RDWR);
    assert!(has_permission(Some(&session), Mode::RDONLY));
    assert!(!has_permission(Some(&session), Mode::ROOT));
}

#[test]
fn aborting_the_transaction_rolls_back_user_creation() {
    let dir = tempdir().unwrap();
    let cache = cache(dir.path());
    let admin = bootstrap_admin(&cache);

    let mut txn = Txn::begin(cache.env(), None, TxnFlags::empty()).unwrap();
    cache
        .create_user(Some(&admin), &mut txn, "ghost", "pw")
        .unwrap();
    txn.abort();

    assert!(matches!(cache.login("ghost", "pw"), Err(Error::Access(_))));
    // The name is free again in a fresh transaction.
    let mut txn = Txn::begin(cache.env(), None, TxnFlags::empty()).unwrap();
    cache
        .create_user(Some(&admin), &mut txn, "ghost", "pw")
        .unwrap();
    txn.commit().unwrap();
    assert!(cache.login("ghost", "pw").is_ok());
}

#[test]
fn username_validation_and_conflicts_follow_the_contract() {
    let dir = tempdir().unwrap();
    let cache = cache(dir.path());
    let admin = bootstrap_admin(&cache);
    let mut txn = Txn::begin(cache.env(), None, TxnFlags::empty()).unwrap();

    assert!(matches!(
        cache.create_user(Some(&admin), &mut txn, "x", "pw"),
        Err(Error::Invalid(_))
    ));
    assert!(matches!(
        cache.create_user(Some(&admin), &mut txn, &"x".repeat(33), "pw"),
        Err(Error::Invalid(_))
    ));
    cache
        .create_user(Some(&admin), &mut txn, "xy", "pw")
        .unwrap();
    assert!(matches!(
        cache.create_user(Some(&admin), &mut txn, "xy", "pw"),
        Err(Error::KeyExist)
    ));
}

#[test]
fn anonymous_callers_have_no_permissions_anywhere() {
    let dir = tempdir().unwrap();
    let cache = cache(dir.path());

    assert!(!has_permission(None, Mode::RDONLY));
    assert!(matches!(
        cache.file_info(None, "hash://x"),
        Err(Error::Access(_))
    ));
    assert!(matches!(
        cache.value_for_field(None, "hash://x", "title"),
        Err(Error::Access(_))
    ));
}

#[test]
fn sessions_survive_environment_reopen_via_their_cookie() {
    let dir = tempdir().unwrap();
    let cookie;
    {
        let cache = cache(dir.path());
        let admin = bootstrap_admin(&cache);
        cookie = admin.cookie().unwrap();
    }
    // A new process: fresh cache, same data directory.
    let cache = cache(dir.path());
    let session = cache.active_session(Some(&cookie)).unwrap().unwrap();
    assert_eq!(session.user_id(), 1);
    assert_eq!(session.username(), Some("admin"));
}

#[test]
fn file_metadata_flows_through_composite_keys() {
    let dir = tempdir().unwrap();
    let cache = cache(dir.path());
    let admin = bootstrap_admin(&cache);

    let mut txn = Txn::begin(cache.env(), None, TxnFlags::empty()).unwrap();
    txn.put(
        &schema::uri_and_file_id_key("hash://blob", 7).unwrap(),
        b"",
        varve::WriteFlags::empty(),
    )
    .unwrap();
    txn.put(
        &schema::file_by_id_key(7),
        &schema::file_by_id_val("cafebabe", "image/png", 2048),
        varve::WriteFlags::empty(),
    )
    .unwrap();
    txn.put(
        &schema::target_uri_and_meta_file_id_key("hash://blob", 11).unwrap(),
        b"",
        varve::WriteFlags::empty(),
    )
    .unwrap();
    txn.put(
        &schema::meta_field_value_key(11, "title", "A Picture").unwrap(),
        b"",
        varve::WriteFlags::empty(),
    )
    .unwrap();
    txn.commit().unwrap();

    let info = cache.file_info(Some(&admin), "hash://blob").unwrap();
    assert_eq!(info.hash, "cafebabe");
    assert_eq!(info.media_type, "image/png");
    assert_eq!(info.size, 2048);

    let title = cache
        .value_for_field(Some(&admin), "hash://blob", "title")
        .unwrap();
    assert_eq!(title, "A Picture");
}
