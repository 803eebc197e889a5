//! Raw byte access to cell files and the open/closed/invalid slot that owns it.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use memmap2::Mmap;

use super::{AccessMode, CellStatus};
use crate::error::{ElevationError, Result};

/// Read-only bytes of one cell file.
#[derive(Debug)]
pub enum PostSource {
    /// The whole file mapped into memory.
    Mapped(Mmap),
    /// A file handle; every read seeks under the mutex.
    Streamed(Mutex<File>),
}

impl PostSource {
    /// Open `path` with the requested access mode.
    pub fn open(path: &Path, access: AccessMode) -> io::Result<Self> {
        let file = File::open(path)?;
        match access {
            AccessMode::Mapped => {
                // SAFETY: the mapping is read-only and never handed out. Cell
                // files are treated as immutable while a database is open.
                let mmap = unsafe { Mmap::map(&file)? };
                Ok(PostSource::Mapped(mmap))
            }
            AccessMode::Streamed => Ok(PostSource::Streamed(Mutex::new(file))),
        }
    }

    /// Total length of the underlying file in bytes.
    pub fn len(&self) -> io::Result<u64> {
        match self {
            PostSource::Mapped(mmap) => Ok(mmap.len() as u64),
            PostSource::Streamed(file) => Ok(lock(file).metadata()?.len()),
        }
    }

    /// Fill `buf` from `offset`. Short files are an `UnexpectedEof` error.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        match self {
            PostSource::Mapped(mmap) => {
                let start = usize::try_from(offset).map_err(|_| eof())?;
                let end = start.checked_add(buf.len()).ok_or_else(eof)?;
                let bytes = mmap.get(start..end).ok_or_else(eof)?;
                buf.copy_from_slice(bytes);
                Ok(())
            }
            PostSource::Streamed(file) => {
                let mut file = lock(file);
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(buf)
            }
        }
    }

    /// Read a two-byte post word.
    pub fn read_word(&self, offset: u64) -> io::Result<[u8; 2]> {
        let mut word = [0u8; 2];
        self.read_at(offset, &mut word)?;
        Ok(word)
    }
}

fn eof() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of cell file")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum SlotState<T> {
    Closed,
    Open(Arc<T>),
    Invalid,
}

/// Lifecycle state of a handler plus the data it reads from while open.
///
/// Readers clone the `Arc` out and drop the lock before doing any I/O, so
/// `close()` never waits on a reader. The file or mapping is released when
/// the last in-flight reader drops its clone.
pub(crate) struct SourceSlot<T> {
    path: PathBuf,
    state: Mutex<SlotState<T>>,
}

impl<T> SourceSlot<T> {
    /// A slot that starts open with `value`.
    pub(crate) fn open(path: &Path, value: T) -> Self {
        Self {
            path: path.to_path_buf(),
            state: Mutex::new(SlotState::Open(Arc::new(value))),
        }
    }

    pub(crate) fn status(&self) -> CellStatus {
        match *lock(&self.state) {
            SlotState::Closed => CellStatus::Closed,
            SlotState::Open(_) => CellStatus::Open,
            SlotState::Invalid => CellStatus::Invalid,
        }
    }

    /// The open source, or the error matching the current state.
    pub(crate) fn acquire(&self) -> Result<Arc<T>> {
        match &*lock(&self.state) {
            SlotState::Open(value) => Ok(Arc::clone(value)),
            SlotState::Closed => Err(ElevationError::CellClosed {
                path: self.path.clone(),
            }),
            SlotState::Invalid => Err(ElevationError::CellInvalid {
                path: self.path.clone(),
            }),
        }
    }

    /// Re-open a closed slot with `load`. A load failure makes it invalid.
    ///
    /// The lock is held across `load`, so concurrent callers open once.
    pub(crate) fn reopen_with<F>(&self, load: F) -> Result<()>
    where
        F: FnOnce() -> Result<T>,
    {
        let mut state = lock(&self.state);
        match *state {
            SlotState::Open(_) => Ok(()),
            SlotState::Invalid => Err(ElevationError::CellInvalid {
                path: self.path.clone(),
            }),
            SlotState::Closed => match load() {
                Ok(value) => {
                    *state = SlotState::Open(Arc::new(value));
                    Ok(())
                }
                Err(e) => {
                    *state = SlotState::Invalid;
                    Err(e)
                }
            },
        }
    }

    /// Open → Closed. Invalid stays invalid.
    pub(crate) fn close(&self) {
        let mut state = lock(&self.state);
        if matches!(*state, SlotState::Open(_)) {
            *state = SlotState::Closed;
        }
    }

    /// Terminal transition; the handler is never used again.
    pub(crate) fn invalidate(&self) {
        *lock(&self.state) = SlotState::Invalid;
    }

    /// Run a read against the open source, invalidating the slot on I/O error.
    pub(crate) fn read<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&T) -> io::Result<R>,
    {
        let value = self.acquire()?;
        f(&value).map_err(|e| {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "cell read failed, marking invalid"
            );
            self.invalidate();
            ElevationError::Io(e)
        })
    }
}

impl<T> std::fmt::Debug for SourceSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSlot")
            .field("path", &self.path)
            .field("status", &self.status())
            .finish()
    }
}
