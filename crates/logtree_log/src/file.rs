//! File-backed log.

use crate::error::{LogError, LogResult};
use crate::frame::{self, FrameKind, HEADER_SIZE};
use crate::log::{Log, LogEntry, Position};
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy)]
enum Slot {
    /// Payload location: byte offset of the payload and its length.
    Data { offset: u64, len: u32 },
    Filled,
}

#[derive(Debug)]
struct Inner {
    file: File,
    /// Byte size of the valid prefix of the file.
    size: u64,
    index: HashMap<Position, Slot>,
    tail: Position,
}

/// A log stored in a single file of CRC-checked frames.
///
/// The position index is rebuilt by scanning the file on open.
///
/// # Recovery Policy
///
/// - A truncated frame at the end of the file is a write cut short by a
///   crash; it is discarded and the file is truncated back to the last
///   complete frame.
/// - A CRC mismatch, bad magic or unknown frame kind is corruption and fails
///   the open.
///
/// # Locking
///
/// The file is locked exclusively for the lifetime of the `FileLog`; a second
/// open of the same path fails with [`LogError::Locked`].
///
/// # Example
///
/// ```no_run
/// use logtree_log::{FileLog, Log};
/// use std::path::Path;
///
/// let log = FileLog::open(Path::new("store.log")).unwrap();
/// let pos = log.append(b"intention").unwrap();
/// log.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    sync_on_append: bool,
    inner: Mutex<Inner>,
}

impl FileLog {
    /// Opens or creates a log file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is locked, or is
    /// corrupted.
    pub fn open(path: &Path) -> LogResult<Self> {
        Self::open_with_options(path, false)
    }

    /// Opens or creates a log file, optionally syncing after every append.
    ///
    /// # Errors
    ///
    /// See [`FileLog::open`].
    pub fn open_with_options(path: &Path, sync_on_append: bool) -> LogResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(LogError::Locked);
        }

        let (size, index, tail) = scan(&mut file)?;
        let file_len = file.metadata()?.len();
        if file_len > size {
            tracing::warn!(
                path = %path.display(),
                discarded = file_len - size,
                "discarding truncated trailing frame"
            );
            file.set_len(size)?;
            file.sync_all()?;
        }

        tracing::debug!(path = %path.display(), entries = index.len(), tail, "opened file log");

        Ok(Self {
            path: path.to_path_buf(),
            sync_on_append,
            inner: Mutex::new(Inner {
                file,
                size,
                index,
                tail,
            }),
        })
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the byte size of the log file.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Forces all appended frames to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> LogResult<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }

    fn write_frame(
        &self,
        inner: &mut Inner,
        kind: FrameKind,
        position: Position,
        payload: &[u8],
    ) -> LogResult<u64> {
        let bytes = frame::encode_frame(kind, position, payload)?;
        let offset = inner.size;
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(&bytes)?;
        if self.sync_on_append {
            inner.file.sync_data()?;
        } else {
            inner.file.flush()?;
        }
        inner.size += bytes.len() as u64;
        Ok(offset)
    }
}

/// Scans every complete frame, returning the valid byte size, the index and
/// the tail.
fn scan(file: &mut File) -> LogResult<(u64, HashMap<Position, Slot>, Position)> {
    let mut contents = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut contents)?;

    let mut index = HashMap::new();
    let mut tail: Position = 0;
    let mut offset = 0usize;

    while contents.len() - offset >= HEADER_SIZE {
        let header = frame::decode_header(&contents[offset..], offset as u64)?;
        let frame_len = header.frame_len() as usize;
        if contents.len() - offset < frame_len {
            break;
        }
        frame::verify_frame(&contents[offset..offset + frame_len], offset as u64)?;

        let slot = match header.kind {
            FrameKind::Data => Slot::Data {
                offset: (offset + HEADER_SIZE) as u64,
                len: header.len,
            },
            FrameKind::Fill => Slot::Filled,
        };
        if index.insert(header.position, slot).is_some() {
            return Err(LogError::corrupted(format!(
                "position {} recorded twice",
                header.position
            )));
        }
        tail = tail.max(header.position + 1);
        offset += frame_len;
    }

    Ok((offset as u64, index, tail))
}

impl Log for FileLog {
    fn append(&self, payload: &[u8]) -> LogResult<Position> {
        let mut inner = self.inner.lock();
        let position = inner.tail;
        let offset = self.write_frame(&mut inner, FrameKind::Data, position, payload)?;
        let len = payload.len() as u32;
        inner.index.insert(
            position,
            Slot::Data {
                offset: offset + HEADER_SIZE as u64,
                len,
            },
        );
        inner.tail = position + 1;
        Ok(position)
    }

    fn read(&self, position: Position) -> LogResult<LogEntry> {
        let mut inner = self.inner.lock();
        match inner.index.get(&position).copied() {
            Some(Slot::Data { offset, len }) => {
                let mut buffer = vec![0u8; len as usize];
                inner.file.seek(SeekFrom::Start(offset))?;
                inner.file.read_exact(&mut buffer)?;
                Ok(LogEntry::Data(buffer))
            }
            Some(Slot::Filled) => Ok(LogEntry::Filled),
            None => Err(LogError::NotWritten {
                position,
                tail: inner.tail,
            }),
        }
    }

    fn fill(&self, position: Position) -> LogResult<()> {
        let mut inner = self.inner.lock();
        match inner.index.get(&position) {
            Some(Slot::Data { .. }) => return Err(LogError::AlreadyWritten { position }),
            Some(Slot::Filled) => return Ok(()),
            None => {}
        }
        self.write_frame(&mut inner, FrameKind::Fill, position, &[])?;
        inner.index.insert(position, Slot::Filled);
        inner.tail = inner.tail.max(position + 1);
        Ok(())
    }

    fn tail(&self) -> LogResult<Position> {
        Ok(self.inner.lock().tail)
    }
}
