//! Append-only record log
//!
//! One record per committed batch, in the framed format:
//!
//! ```text
//! [length: u32 LE][flags: u8][payload: bytes][crc32: u32 LE]
//! ```
//!
//! - **length**: size of flags + payload + crc (NOT including length itself)
//! - **flags**: bit 0 set when the payload is zstd-compressed
//! - **payload**: bincode-serialized list of (key, value) pairs
//! - **crc32**: checksum over \[flags\]\[payload\]
//!
//! The file starts with an 8-byte magic. Replay stops at the first
//! record that does not reach end-of-file intact: a record cut short by
//! a crash is truncated away with a warning, while a checksum failure in
//! the interior of the file is reported as corruption.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use varve_core::{Error, Result};

const MAGIC: &[u8; 8] = b"varvelog";
const FLAG_COMPRESSED: u8 = 1 << 0;
/// Payloads below this size are stored raw even with compression on.
const COMPRESS_MIN: usize = 128;
/// Sanity cap; a length beyond this is treated as damage, not data.
const MAX_RECORD: u32 = 1 << 30;

#[derive(Serialize, Deserialize)]
struct Record {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

pub(crate) struct Log {
    file: File,
    path: PathBuf,
    len: u64,
}

impl Log {
    /// Open or create the log and validate its header.
    pub(crate) fn open(path: &Path, create: bool) -> Result<Log> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(path)?;
        let mut len = file.metadata()?.len();
        let mut log = Log {
            file,
            path: path.to_path_buf(),
            len,
        };
        if len == 0 {
            log.file.write_all(MAGIC)?;
            log.file.sync_data()?;
            len = MAGIC.len() as u64;
            log.len = len;
        } else {
            let mut magic = [0u8; 8];
            if len < MAGIC.len() as u64 {
                return Err(Error::Corruption(format!(
                    "log shorter than header: {}",
                    path.display()
                )));
            }
            log.file.seek(SeekFrom::Start(0))?;
            log.file.read_exact(&mut magic)?;
            if &magic != MAGIC {
                return Err(Error::Corruption(format!(
                    "bad log magic in {}",
                    path.display()
                )));
            }
        }
        Ok(log)
    }

    /// Replay every intact record in order, applying `apply` to each
    /// batch. Truncates a torn tail; fails on interior damage.
    pub(crate) fn replay<F>(&mut self, mut apply: F) -> Result<()>
    where
        F: FnMut(Vec<(Vec<u8>, Vec<u8>)>),
    {
        let file_len = self.len;
        let mut read_half = self.file.try_clone()?;
        read_half.seek(SeekFrom::Start(MAGIC.len() as u64))?;
        let mut reader = BufReader::new(read_half);
        let mut offset = MAGIC.len() as u64;
        let mut records = 0usize;

        loop {
            if offset == file_len {
                break;
            }
            if file_len - offset < 4 {
                return self.truncate_tail(offset, "length cut short");
            }
            let rec_len = reader.read_u32::<LittleEndian>()?;
            if rec_len < 5 || rec_len > MAX_RECORD || file_len - offset - 4 < u64::from(rec_len) {
                return self.truncate_tail(offset, "record cut short");
            }
            let mut body = vec![0u8; rec_len as usize];
            reader.read_exact(&mut body)?;

            let (framed, crc_bytes) = body.split_at(body.len() - 4);
            let stored_crc = LittleEndian::read_u32(crc_bytes);
            if crc32fast::hash(framed) != stored_crc {
                // A bad checksum on the final record is a torn write; the
                // same in the interior means the file is damaged.
                if offset + 4 + u64::from(rec_len) == file_len {
                    return self.truncate_tail(offset, "checksum mismatch at tail");
                }
                return Err(Error::Corruption(format!(
                    "checksum mismatch at offset {offset} in {}",
                    self.path.display()
                )));
            }

            let (flags, payload) = (framed[0], &framed[1..]);
            let raw;
            let payload = if flags & FLAG_COMPRESSED != 0 {
                raw = zstd::decode_all(payload)
                    .map_err(|e| Error::Corruption(format!("zstd: {e}")))?;
                raw.as_slice()
            } else {
                payload
            };
            let record: Record = bincode::deserialize(payload)
                .map_err(|e| Error::Corruption(format!("record decode: {e}")))?;
            apply(record.entries);

            offset += 4 + u64::from(rec_len);
            records += 1;
        }
        debug!(records, bytes = self.len, "log replayed");
        Ok(())
    }

    /// Append one batch as a single record. Not visible to readers until
    /// the caller publishes the new index generation.
    pub(crate) fn append(&mut self, entries: &[(Vec<u8>, Vec<u8>)], compress: bool) -> Result<()> {
        let record = Record {
            entries: entries.to_vec(),
        };
        let payload = bincode::serialize(&record)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        let mut flags = 0u8;
        let body = if compress && payload.len() >= COMPRESS_MIN {
            flags |= FLAG_COMPRESSED;
            zstd::encode_all(payload.as_slice(), 0).map_err(Error::Io)?
        } else {
            payload
        };

        let mut framed = Vec::with_capacity(body.len() + 9);
        framed.write_u32::<LittleEndian>((body.len() + 5) as u32)?;
        framed.push(flags);
        framed.extend_from_slice(&body);
        let crc = crc32fast::hash(&framed[4..]);
        framed.write_u32::<LittleEndian>(crc)?;

        self.file.seek(SeekFrom::Start(self.len))?;
        self.file.write_all(&framed)?;
        self.len += framed.len() as u64;
        Ok(())
    }

    /// Force appended records to durable storage.
    pub(crate) fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn truncate_tail(&mut self, offset: u64, why: &str) -> Result<()> {
        warn!(
            offset,
            dropped = self.len - offset,
            path = %self.path.display(),
            "torn log tail truncated: {why}"
        );
        self.file.set_len(offset)?;
        self.file.sync_data()?;
        self.len = offset;
        Ok(())
    }
}
