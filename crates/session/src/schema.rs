//! Table layout and composite-key packing
//!
//! The single keyspace is partitioned by a one-byte table id, followed
//! by the table's key fields in order-preserving encodings. Values use
//! the compact encodings. Every accessor in this crate builds its keys
//! and windows here.

use crate::session::Mode;
use varve_core::{codec, Error, Range, Result};
use varve_txn::Txn;

/// user id → user record
pub const USER_BY_ID: u8 = 0x01;
/// username → user id
pub const USER_ID_BY_NAME: u8 = 0x02;
/// session id → encrypted key + user id
pub const SESSION_BY_ID: u8 = 0x03;
/// content URI → file id (one row per file carrying the URI)
pub const URI_AND_FILE_ID: u8 = 0x10;
/// file id → file record
pub const FILE_BY_ID: u8 = 0x11;
/// target URI → meta-file id (one row per meta-file about the URI)
pub const TARGET_URI_AND_META_FILE_ID: u8 = 0x12;
/// (meta-file id, field, value) → empty
pub const META_FILE_ID_FIELD_AND_VALUE: u8 = 0x13;

/// A stored user row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// The unique username.
    pub username: String,
    /// PHC password hash.
    pub passhash: String,
    /// Permission mode granted at creation.
    pub mode: Mode,
    /// The user id of whoever created this user.
    pub parent: u64,
    /// Creation time, seconds since the epoch.
    pub time: u64,
}

/// A stored session row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// SHA-256 of the raw session key.
    pub enc_key: [u8; 32],
    /// The authenticated user.
    pub user_id: u64,
}

// === users ===

/// `[USER_BY_ID][id]`
pub fn user_by_id_key(id: u64) -> Vec<u8> {
    let mut key = vec![USER_BY_ID];
    codec::pack_u64(&mut key, id);
    key
}

/// Pack a [`UserRecord`].
pub fn user_by_id_val(record: &UserRecord) -> Vec<u8> {
    let mut val = Vec::new();
    codec::pack_lenstr(&mut val, &record.username);
    codec::pack_lenstr(&mut val, &record.passhash);
    codec::pack_varint(&mut val, u64::from(record.mode.bits()));
    codec::pack_varint(&mut val, record.parent);
    codec::pack_varint(&mut val, record.time);
    val
}

/// Unpack a [`UserRecord`].
pub fn unpack_user_by_id_val(mut val: &[u8]) -> Result<UserRecord> {
    let username = codec::unpack_lenstr(&mut val)?.to_string();
    let passhash = codec::unpack_lenstr(&mut val)?.to_string();
    let mode = codec::unpack_varint(&mut val)?;
    let mode = Mode::from_bits(mode as u32).ok_or(Error::Invalid("unknown mode bits"))?;
    let parent = codec::unpack_varint(&mut val)?;
    let time = codec::unpack_varint(&mut val)?;
    Ok(UserRecord {
        username,
        passhash,
        mode,
        parent,
        time,
    })
}

/// `[USER_ID_BY_NAME][username\0]`
pub fn user_id_by_name_key(username: &str) -> Result<Vec<u8>> {
    let mut key = vec![USER_ID_BY_NAME];
    codec::pack_str(&mut key, username)?;
    Ok(key)
}

/// Pack the user id a username resolves to.
pub fn user_id_by_name_val(id: u64) -> Vec<u8> {
    let mut val = Vec::new();
    codec::pack_varint(&mut val, id);
    val
}

/// Unpack the user id a username resolves to.
pub fn unpack_user_id_by_name_val(mut val: &[u8]) -> Result<u64> {
    codec::unpack_varint(&mut val)
}

// === sessions ===

/// `[SESSION_BY_ID][id]`
pub fn session_by_id_key(id: u64) -> Vec<u8> {
    let mut key = vec![SESSION_BY_ID];
    codec::pack_u64(&mut key, id);
    key
}

/// Pack a [`SessionRecord`].
pub fn session_by_id_val(record: &SessionRecord) -> Vec<u8> {
    let mut val = record.enc_key.to_vec();
    codec::pack_varint(&mut val, record.user_id);
    val
}

/// Unpack a [`SessionRecord`].
pub fn unpack_session_by_id_val(mut val: &[u8]) -> Result<SessionRecord> {
    if val.len() < 32 {
        return Err(Error::Invalid("session record too short"));
    }
    let mut enc_key = [0u8; 32];
    enc_key.copy_from_slice(&val[..32]);
    val = &val[32..];
    let user_id = codec::unpack_varint(&mut val)?;
    Ok(SessionRecord { enc_key, user_id })
}

// === files ===

/// `[URI_AND_FILE_ID][uri\0][file id]`
pub fn uri_and_file_id_key(uri: &str, file_id: u64) -> Result<Vec<u8>> {
    let mut key = vec![URI_AND_FILE_ID];
    codec::pack_str(&mut key, uri)?;
    codec::pack_u64(&mut key, file_id);
    Ok(key)
}

/// Window over every file id recorded for `uri`.
pub fn uri_and_file_id_range(uri: &str) -> Result<Range> {
    let mut prefix = vec![URI_AND_FILE_ID];
    codec::pack_str(&mut prefix, uri)?;
    Ok(Range::prefix(&prefix))
}

/// Unpack `(uri, file id)` from a [`URI_AND_FILE_ID`] key.
pub fn unpack_uri_and_file_id_key(key: &[u8]) -> Result<(String, u64)> {
    let mut rest = strip_table(key, URI_AND_FILE_ID)?;
    let uri = codec::unpack_str(&mut rest)?.to_string();
    let file_id = codec::unpack_u64(&mut rest)?;
    Ok((uri, file_id))
}

/// `[FILE_BY_ID][id]`
pub fn file_by_id_key(id: u64) -> Vec<u8> {
    let mut key = vec![FILE_BY_ID];
    codec::pack_u64(&mut key, id);
    key
}

/// Pack a file record `{internal hash, media type, size}`.
pub fn file_by_id_val(hash: &str, media_type: &str, size: u64) -> Vec<u8> {
    let mut val = Vec::new();
    codec::pack_lenstr(&mut val, hash);
    codec::pack_lenstr(&mut val, media_type);
    codec::pack_varint(&mut val, size);
    val
}

/// Unpack a file record into `(hash, media type, size)`.
pub fn unpack_file_by_id_val(mut val: &[u8]) -> Result<(String, String, u64)> {
    let hash = codec::unpack_lenstr(&mut val)?.to_string();
    let media_type = codec::unpack_lenstr(&mut val)?.to_string();
    let size = codec::unpack_varint(&mut val)?;
    Ok((hash, media_type, size))
}

// === meta-files ===

/// `[TARGET_URI_AND_META_FILE_ID][uri\0][meta-file id]`
pub fn target_uri_and_meta_file_id_key(uri: &str, meta_file_id: u64) -> Result<Vec<u8>> {
    let mut key = vec![TARGET_URI_AND_META_FILE_ID];
    codec::pack_str(&mut key, uri)?;
    codec::pack_u64(&mut key, meta_file_id);
    Ok(key)
}

/// Window over every meta-file targeting `uri`.
pub fn target_uri_and_meta_file_id_range(uri: &str) -> Result<Range> {
    let mut prefix = vec![TARGET_URI_AND_META_FILE_ID];
    codec::pack_str(&mut prefix, uri)?;
    Ok(Range::prefix(&prefix))
}

/// Unpack `(uri, meta-file id)` from a [`TARGET_URI_AND_META_FILE_ID`] key.
pub fn unpack_target_uri_and_meta_file_id_key(key: &[u8]) -> Result<(String, u64)> {
    let mut rest = strip_table(key, TARGET_URI_AND_META_FILE_ID)?;
    let uri = codec::unpack_str(&mut rest)?.to_string();
    let meta_file_id = codec::unpack_u64(&mut rest)?;
    Ok((uri, meta_file_id))
}

/// `[META_FILE_ID_FIELD_AND_VALUE][meta-file id][field\0][value\0]`
pub fn meta_field_value_key(meta_file_id: u64, field: &str, value: &str) -> Result<Vec<u8>> {
    let mut key = vec![META_FILE_ID_FIELD_AND_VALUE];
    codec::pack_u64(&mut key, meta_file_id);
    codec::pack_str(&mut key, field)?;
    codec::pack_str(&mut key, value)?;
    Ok(key)
}

/// Window over every value a meta-file assigns to `field`.
pub fn meta_field_value_range(meta_file_id: u64, field: &str) -> Result<Range> {
    let mut prefix = vec![META_FILE_ID_FIELD_AND_VALUE];
    codec::pack_u64(&mut prefix, meta_file_id);
    codec::pack_str(&mut prefix, field)?;
    Ok(Range::prefix(&prefix))
}

/// Unpack `(meta-file id, field, value)` from a
/// [`META_FILE_ID_FIELD_AND_VALUE`] key.
pub fn unpack_meta_field_value_key(key: &[u8]) -> Result<(u64, String, String)> {
    let mut rest = strip_table(key, META_FILE_ID_FIELD_AND_VALUE)?;
    let meta_file_id = codec::unpack_u64(&mut rest)?;
    let field = codec::unpack_str(&mut rest)?.to_string();
    let value = codec::unpack_str(&mut rest)?.to_string();
    Ok((meta_file_id, field, value))
}

// === id allocation ===

/// Allocate the next id in `table`: one past the largest id present,
/// starting at 1. Fails with an access error once the id space is
/// exhausted.
pub fn next_id(txn: &Txn, table: u8) -> Result<u64> {
    let mut cursor = txn.open_cursor()?;
    let window = Range::prefix(&[table]);
    let last = match cursor.first_in_range(&window, -1) {
        Ok((key, _)) => {
            let mut rest = strip_table(&key, table)?;
            codec::unpack_u64(&mut rest)?
        }
        Err(Error::NotFound) => 0,
        Err(e) => return Err(e),
    };
    last.checked_add(1)
        .ok_or(Error::Access("id space exhausted"))
}

fn strip_table(key: &[u8], table: u8) -> Result<&[u8]> {
    match key.split_first() {
        Some((&t, rest)) if t == table => Ok(rest),
        _ => Err(Error::Invalid("key from the wrong table")),
    }
}
