//! The session cache
//!
//! Maps cookies to live session objects. Hits resolve entirely in
//! memory; misses authenticate against the store under a short-lived
//! read transaction and fill the fixed-size table. The table is
//! indexed by `session id % size`, and a colliding insert simply
//! replaces the older occupant.

use crate::auth;
use crate::schema;
use crate::session::{encrypt_key, has_permission, parse_cookie, Mode, Session, SESSION_KEY_LEN};
use parking_lot::RwLock;
use rand::RngCore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use varve_core::{Error, Result};
use varve_txn::{Cursor, Environment, Txn, TxnFlags, WriteFlags};

const USER_MIN: usize = 2;
const USER_MAX: usize = 32;
const PASS_MIN: usize = 0;
const PASS_MAX: usize = 72;

/// Resolved metadata for one stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// The internal content hash.
    pub hash: String,
    /// Where the blob lives on disk.
    pub path: PathBuf,
    /// The declared media type.
    pub media_type: String,
    /// Size in bytes.
    pub size: u64,
}

/// Cookie → session resolution plus the user/session write paths
pub struct SessionCache {
    env: Environment,
    table: RwLock<Vec<Option<Arc<Session>>>>,
    registration_mode: Mode,
}

impl SessionCache {
    /// A cache with `size` slots over `env`. `registration_mode` caps
    /// the mode granted to users created through [`Self::create_user`].
    pub fn new(env: Environment, size: usize, registration_mode: Mode) -> SessionCache {
        SessionCache {
            env,
            table: RwLock::new(vec![None; size.max(1)]),
            registration_mode,
        }
    }

    /// The environment this cache authenticates against.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Resolve a cookie to its session.
    ///
    /// Returns `Ok(None)` for an absent, malformed, or unauthentic
    /// cookie: the caller proceeds anonymously. Only infrastructure
    /// failures surface as errors.
    pub fn active_session(&self, cookie: Option<&str>) -> Result<Option<Arc<Session>>> {
        let Some(cookie) = cookie else {
            return Ok(None);
        };
        let Ok((id, raw)) = parse_cookie(cookie) else {
            return Ok(None);
        };
        let enc = encrypt_key(&raw);

        let slot = (id % self.table.read().len() as u64) as usize;
        if let Some(cached) = &self.table.read()[slot] {
            if cached.id() == id && cached.key_cmp(&enc) == 0 {
                return Ok(Some(Arc::clone(cached)));
            }
        }

        let txn = Txn::begin(&self.env, None, TxnFlags::RDONLY)?;
        let record = match txn.get(&schema::session_by_id_key(id)) {
            Ok(val) => schema::unpack_session_by_id_val(&val)?,
            Err(Error::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        if record.enc_key != enc {
            debug!(session = id, "cookie key mismatch");
            return Ok(None);
        }
        let user = match txn.get(&schema::user_by_id_key(record.user_id)) {
            Ok(val) => schema::unpack_user_by_id_val(&val)?,
            Err(Error::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        drop(txn);
        if user.mode.is_empty() {
            return Ok(None);
        }

        let session = Session::new_internal(
            id,
            Some(raw),
            Some(record.enc_key),
            record.user_id,
            user.mode,
            Some(user.username),
        )?;
        self.table.write()[slot] = Some(Arc::clone(&session));
        Ok(Some(session))
    }

    /// Mint a session for `user_id`, persist it, and cache it.
    pub fn create_session(&self, user_id: u64) -> Result<Arc<Session>> {
        let mut txn = Txn::begin(&self.env, None, TxnFlags::empty())?;
        let user = match txn.get(&schema::user_by_id_key(user_id)) {
            Ok(val) => schema::unpack_user_by_id_val(&val)?,
            Err(Error::NotFound) => return Err(Error::Access("no such user")),
            Err(e) => return Err(e),
        };
        if user.mode.is_empty() {
            return Err(Error::Access("user grants no permissions"));
        }

        let id = schema::next_id(&txn, schema::SESSION_BY_ID)?;
        let mut raw = [0u8; SESSION_KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut raw);
        let enc = encrypt_key(&raw);

        txn.put(
            &schema::session_by_id_key(id),
            &schema::session_by_id_val(&schema::SessionRecord {
                enc_key: enc,
                user_id,
            }),
            WriteFlags::NOOVERWRITE,
        )?;
        txn.commit()?;

        let session = Session::new_internal(
            id,
            Some(raw),
            Some(enc),
            user_id,
            user.mode,
            Some(user.username),
        )?;
        let slot = (id % self.table.read().len() as u64) as usize;
        self.table.write()[slot] = Some(Arc::clone(&session));
        debug!(session = id, user = user_id, "session created");
        Ok(session)
    }

    /// Authenticate a username and password and mint a session.
    pub fn login(&self, username: &str, password: &str) -> Result<Arc<Session>> {
        let user_id = {
            let txn = Txn::begin(&self.env, None, TxnFlags::RDONLY)?;
            let user_id = match txn.get(&schema::user_id_by_name_key(username)?) {
                Ok(val) => schema::unpack_user_id_by_name_val(&val)?,
                Err(Error::NotFound) => return Err(Error::Access("bad credentials")),
                Err(e) => return Err(e),
            };
            let user = schema::unpack_user_by_id_val(&txn.get(&schema::user_by_id_key(user_id))?)?;
            if !auth::verify_password(password, &user.passhash) {
                return Err(Error::Access("bad credentials"));
            }
            user_id
        };
        self.create_session(user_id)
    }

    /// Create a user inside `txn` with the cache's registration mode.
    pub fn create_user(
        &self,
        session: Option<&Session>,
        txn: &mut Txn,
        username: &str,
        password: &str,
    ) -> Result<u64> {
        self.create_user_internal(session, txn, username, password, self.registration_mode)
    }

    /// Create a user inside `txn`, granting at most the caller's mode.
    ///
    /// The new user's mode is `mode_unsafe ∩ caller's mode` and must be
    /// non-zero. Both the name row and the record row are written with
    /// `NOOVERWRITE`, so a taken username fails with `KeyExist` and
    /// stages nothing the caller cannot roll back by aborting.
    pub fn create_user_internal(
        &self,
        session: Option<&Session>,
        txn: &mut Txn,
        username: &str,
        password: &str,
        mode_unsafe: Mode,
    ) -> Result<u64> {
        let Some(session) = session else {
            return Err(Error::Invalid("user creation requires a session"));
        };
        if username.len() < USER_MIN || username.len() > USER_MAX {
            return Err(Error::Invalid("username length out of range"));
        }
        if password.len() < PASS_MIN || password.len() > PASS_MAX {
            return Err(Error::Invalid("password length out of range"));
        }
        let mode = mode_unsafe & session.mode();
        if mode.is_empty() {
            return Err(Error::Invalid("requested mode grants nothing"));
        }

        let parent = session.user_id();
        let time = chrono::Utc::now().timestamp().max(0) as u64;
        let user_id = schema::next_id(txn, schema::USER_BY_ID)?;
        let passhash = auth::hash_password(password)?;

        txn.put(
            &schema::user_id_by_name_key(username)?,
            &schema::user_id_by_name_val(user_id),
            WriteFlags::NOOVERWRITE,
        )?;
        txn.put(
            &schema::user_by_id_key(user_id),
            &schema::user_by_id_val(&schema::UserRecord {
                username: username.to_string(),
                passhash,
                mode,
                parent,
                time,
            }),
            WriteFlags::NOOVERWRITE,
        )?;
        debug!(user = user_id, parent, "user created");
        Ok(user_id)
    }

    /// Resolve `uri` to its stored file metadata.
    ///
    /// Requires read permission; runs a private read transaction and
    /// scans the URI window for the first file carrying the URI.
    pub fn file_info(&self, session: Option<&Session>, uri: &str) -> Result<FileInfo> {
        if !has_permission(session, Mode::RDONLY) {
            return Err(Error::Access("read permission required"));
        }
        if uri.is_empty() {
            return Err(Error::Invalid("empty uri"));
        }

        let txn = Txn::begin(&self.env, None, TxnFlags::RDONLY)?;
        let mut cursor = txn.open_cursor()?;
        let window = schema::uri_and_file_id_range(uri)?;
        let (key, _) = cursor.first_in_range(&window, 1)?;
        let (_, file_id) = schema::unpack_uri_and_file_id_key(&key)?;

        let val = txn.get(&schema::file_by_id_key(file_id))?;
        let (hash, media_type, size) = schema::unpack_file_by_id_val(&val)?;
        let path = self.blob_path(&hash);
        Ok(FileInfo {
            hash,
            path,
            media_type,
            size,
        })
    }

    /// The first non-empty value any meta-file targeting `uri` assigns
    /// to `field`.
    ///
    /// Requires read permission; walks the meta-file window with one
    /// cursor and each meta-file's field window with another.
    pub fn value_for_field(
        &self,
        session: Option<&Session>,
        uri: &str,
        field: &str,
    ) -> Result<String> {
        if !has_permission(session, Mode::RDONLY) {
            return Err(Error::Access("read permission required"));
        }
        if field.is_empty() {
            return Err(Error::Invalid("empty field"));
        }

        let txn = Txn::begin(&self.env, None, TxnFlags::RDONLY)?;
        let mut meta_files = txn.open_cursor()?;
        let mut values = txn.open_cursor()?;

        let meta_window = schema::target_uri_and_meta_file_id_range(uri)?;
        let mut meta = meta_files.first_in_range(&meta_window, 1);
        loop {
            let (meta_key, _) = match meta {
                Ok(found) => found,
                Err(Error::NotFound) => return Err(Error::NotFound),
                Err(e) => return Err(e),
            };
            let (_, meta_file_id) = schema::unpack_target_uri_and_meta_file_id_key(&meta_key)?;

            if let Some(value) = first_field_value(&mut values, meta_file_id, field)? {
                return Ok(value);
            }
            meta = meta_files.next_in_range(&meta_window, 1);
        }
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        let shard = &hash[..hash.len().min(2)];
        self.env.path().join("blobs").join(shard).join(hash)
    }
}

/// Scan one meta-file's field window for its first non-empty value.
fn first_field_value(
    cursor: &mut Cursor,
    meta_file_id: u64,
    field: &str,
) -> Result<Option<String>> {
    let window = schema::meta_field_value_range(meta_file_id, field)?;
    let mut step = cursor.first_in_range(&window, 1);
    loop {
        let (key, _) = match step {
            Ok(found) => found,
            Err(Error::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        let (_, _, value) = schema::unpack_meta_field_value_key(&key)?;
        if !value.is_empty() {
            return Ok(Some(value));
        }
        step = cursor.next_in_range(&window, 1);
    }
}
