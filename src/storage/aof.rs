//! Append-only log of upsert requests.
//!
//! Layout: a fixed header (`MAGIC`, `VERSION`, id scope tag) followed by
//! frames of `[u32 big-endian payload length][bincode payload]`. A frame is written in
//! one `write_all` before the in-memory apply. A torn trailing frame left by a
//! crash is cut off on open.

use crate::config::{IdScope, SyncMode, SyncPolicy};
use crate::db::UpsertRequest;
use crate::error::{RegistryError, Result};
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const MAGIC: &[u8] = b"GEOCELL_AOF";
const VERSION: u8 = 2;
const HEADER_LEN: u64 = MAGIC.len() as u64 + 2;
const LEN_FIELD_LEN: usize = 4;
/// Frames larger than this are treated as corruption rather than allocated.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const SCRATCH_INITIAL_CAPACITY: usize = 4 * 1024;
const SCRATCH_SHRINK_THRESHOLD: usize = 1 << 20;

/// A logged mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    Upsert(UpsertRequest),
}

/// Append-only persistence log
pub struct PersistenceLog {
    file: File,
    writer: BufWriter<File>,
    path: PathBuf,
    size: u64,
    sync_policy: SyncPolicy,
    sync_mode: SyncMode,
    last_sync: Instant,
    scratch: BytesMut,
    id_scope: IdScope,
    max_frame_len: usize,
}

fn scope_tag(scope: IdScope) -> u8 {
    match scope {
        IdScope::PerBucket => 0,
        IdScope::Global => 1,
    }
}

fn scope_from_tag(tag: u8) -> Option<IdScope> {
    match tag {
        0 => Some(IdScope::PerBucket),
        1 => Some(IdScope::Global),
        _ => None,
    }
}

impl PersistenceLog {
    /// Open or create the log at `path`, writing the header to a new file.
    ///
    /// `id_scope` is recorded in the header of a new file. For an existing
    /// file the recorded scope is read back by `replay`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        sync_policy: SyncPolicy,
        sync_mode: SyncMode,
        id_scope: IdScope,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;

        let mut size = file.metadata()?.len();
        if size == 0 {
            file.write_all(MAGIC)?;
            file.write_all(&[VERSION, scope_tag(id_scope)])?;
            file.sync_all()?;
            size = HEADER_LEN;
        }

        let writer = BufWriter::new(file.try_clone()?);

        Ok(Self {
            file,
            writer,
            path,
            size,
            sync_policy,
            sync_mode,
            last_sync: Instant::now(),
            scratch: BytesMut::with_capacity(SCRATCH_INITIAL_CAPACITY),
            id_scope,
            max_frame_len: MAX_FRAME_LEN,
        })
    }

    /// Id scope the log was written under. Authoritative after `replay`.
    pub fn id_scope(&self) -> IdScope {
        self.id_scope
    }

    #[cfg(test)]
    pub(crate) fn set_max_frame_len(&mut self, len: usize) {
        self.max_frame_len = len;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file size in bytes, header included.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read every complete entry from the start of the log.
    ///
    /// A partial trailing frame is dropped and the file truncated to the last
    /// complete frame so later appends start on a frame boundary.
    pub fn replay(&mut self) -> Result<Vec<LogEntry>> {
        self.writer.flush()?;
        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut self.file);

        let mut header = vec![0u8; HEADER_LEN as usize];
        reader.read_exact(&mut header).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => RegistryError::InvalidFormat,
            _ => RegistryError::Io(e),
        })?;
        if &header[..MAGIC.len()] != MAGIC || header[MAGIC.len()] != VERSION {
            return Err(RegistryError::InvalidFormat);
        }
        self.id_scope =
            scope_from_tag(header[MAGIC.len() + 1]).ok_or(RegistryError::InvalidFormat)?;

        let mut entries = Vec::new();
        let mut valid_len = HEADER_LEN;

        loop {
            let mut len_buf = [0u8; LEN_FIELD_LEN];
            match read_full(&mut reader, &mut len_buf)? {
                0 => break,
                n if n < LEN_FIELD_LEN => {
                    log::warn!(
                        "Truncated frame header at offset {} in {:?}; dropping tail",
                        valid_len,
                        self.path
                    );
                    break;
                }
                _ => {}
            }

            let len = u32::from_be_bytes(len_buf) as usize;
            if len > MAX_FRAME_LEN {
                return Err(RegistryError::InvalidFormat);
            }

            let mut payload = vec![0u8; len];
            if read_full(&mut reader, &mut payload)? < len {
                log::warn!(
                    "Truncated frame at offset {} in {:?}; dropping tail",
                    valid_len,
                    self.path
                );
                break;
            }

            let entry: LogEntry =
                bincode::deserialize(&payload).map_err(|_| RegistryError::InvalidFormat)?;
            entries.push(entry);
            valid_len += (LEN_FIELD_LEN + len) as u64;
        }

        drop(reader);
        if valid_len < self.size {
            self.file.set_len(valid_len)?;
            self.file.sync_all()?;
            self.size = valid_len;
        }

        log::debug!("Replayed {} entries from {:?}", entries.len(), self.path);
        Ok(entries)
    }

    /// Append one entry and honor the sync policy.
    ///
    /// On failure the file is cut back to its previous length so no partial
    /// frame survives.
    pub fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let payload = bincode::serialize(entry)?;
        if payload.len() > self.max_frame_len {
            return Err(RegistryError::WriteFailure(format!(
                "log entry of {} bytes exceeds frame limit",
                payload.len()
            )));
        }

        self.scratch.clear();
        self.scratch.reserve(LEN_FIELD_LEN + payload.len());
        self.scratch.put_u32(payload.len() as u32);
        self.scratch.put_slice(&payload);
        let written_len = self.scratch.len();

        if let Err(e) = self.write_frame() {
            self.rollback();
            return Err(e);
        }
        self.size += written_len as u64;

        if self.scratch.capacity() > SCRATCH_SHRINK_THRESHOLD {
            self.scratch = BytesMut::with_capacity(SCRATCH_INITIAL_CAPACITY);
        }

        Ok(())
    }

    fn write_frame(&mut self) -> Result<()> {
        self.writer.write_all(&self.scratch)?;
        self.writer.flush()?;

        match self.sync_policy {
            SyncPolicy::Always => self.sync()?,
            SyncPolicy::EverySecond if self.last_sync.elapsed() >= Duration::from_secs(1) => {
                self.sync()?
            }
            _ => {}
        }

        Ok(())
    }

    fn rollback(&mut self) {
        let restored = self
            .file
            .set_len(self.size)
            .and_then(|_| self.file.try_clone());
        match restored {
            Ok(file) => {
                let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
                // into_parts drops the buffered bytes instead of flushing them
                let _ = stale.into_parts();
            }
            Err(e) => log::warn!("Failed to roll back log {:?}: {}", self.path, e),
        }
    }

    /// Flush buffered writes and sync to disk with the configured mode.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        match self.sync_mode {
            SyncMode::All => self.file.sync_all()?,
            SyncMode::Data => self.file.sync_data()?,
        }
        self.last_sync = Instant::now();
        Ok(())
    }
}

/// Fill `buf` as far as the reader allows; returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
