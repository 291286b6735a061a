//! Write-behind buffered channel over a random-access file.

use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A buffered channel over a random-access file.
///
/// Writes are appended to an in-memory buffer and drained to the file
/// whenever the buffer reaches its capacity. Reads may target bytes that
/// are still sitting in the write buffer; the channel serves them
/// consistently, so a byte is readable as soon as `write` returns.
///
/// # Positions
///
/// The channel maintains a single logical end-of-stream position:
/// the bytes already written through to the file plus the bytes still
/// buffered. [`position`](Self::position) and [`size`](Self::size) both
/// report this logical value, never the raw file length.
///
/// # Thread Safety
///
/// All operations lock one internal mutex, so a reader racing a writer
/// observes either the pre-write or the post-write state, never a torn
/// buffer.
///
/// # Example
///
/// ```no_run
/// use ledgerlog_storage::BufferedChannel;
/// use std::path::Path;
///
/// let channel = BufferedChannel::create(Path::new("0.log"), 64 * 1024).unwrap();
/// channel.write(b"framed bytes").unwrap();
/// channel.flush(true).unwrap(); // drain and fsync
/// ```
pub struct BufferedChannel {
    path: PathBuf,
    capacity: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    /// Open file handle; `None` once the channel is closed.
    file: Option<File>,
    /// Bytes already written through to the file.
    flushed: u64,
    /// Pending bytes not yet written to the file.
    buffer: Vec<u8>,
}

impl BufferedChannel {
    /// Creates a new file at `path` and opens a channel over it.
    ///
    /// Any existing file at `path` is truncated.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: &Path, capacity: usize) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            capacity,
            inner: Mutex::new(Inner {
                file: Some(file),
                flushed: 0,
                buffer: Vec::with_capacity(capacity),
            }),
        })
    }

    /// Opens a channel over an existing file.
    ///
    /// The logical position starts at the current file size, so writes
    /// append and previously written bytes remain readable.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path, capacity: usize) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let flushed = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            capacity,
            inner: Mutex::new(Inner {
                file: Some(file),
                flushed,
                buffer: Vec::with_capacity(capacity),
            }),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends bytes at the logical end of the stream.
    ///
    /// The bytes land in the write buffer; once the buffer reaches
    /// capacity it is drained to the file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] if the channel is closed, or an
    /// I/O error if draining the buffer fails.
    pub fn write(&self, data: &[u8]) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        if inner.file.is_none() {
            return Err(StorageError::Closed);
        }
        inner.buffer.extend_from_slice(data);
        if inner.buffer.len() >= self.capacity {
            inner.drain()?;
        }
        Ok(())
    }

    /// Returns the logical end-of-stream position, buffered bytes included.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] if the channel is closed.
    pub fn position(&self) -> StorageResult<u64> {
        let inner = self.inner.lock();
        if inner.file.is_none() {
            return Err(StorageError::Closed);
        }
        Ok(inner.flushed + inner.buffer.len() as u64)
    }

    /// Returns the logical size of the stream, buffered bytes included.
    ///
    /// For an append-only channel this equals [`position`](Self::position).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] if the channel is closed.
    pub fn size(&self) -> StorageResult<u64> {
        self.position()
    }

    /// Reads up to `dst.len()` bytes starting at `pos`.
    ///
    /// Bytes below the flushed prefix come from the file; bytes beyond it
    /// come from the write buffer. Returns the number of bytes actually
    /// read, which is short when `pos + dst.len()` runs past the logical
    /// end of the stream.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] if the channel is closed, or an
    /// I/O error from the underlying file read.
    pub fn read_at(&self, dst: &mut [u8], pos: u64) -> StorageResult<usize> {
        let mut inner = self.inner.lock();
        if inner.file.is_none() {
            return Err(StorageError::Closed);
        }

        let flushed = inner.flushed;
        let total = flushed + inner.buffer.len() as u64;
        if dst.is_empty() || pos >= total {
            return Ok(0);
        }

        let want = dst.len().min((total - pos) as usize);
        let mut filled = 0usize;

        if pos < flushed {
            let from_file = want.min((flushed - pos) as usize);
            let file = inner.file.as_mut().ok_or(StorageError::Closed)?;
            file.seek(SeekFrom::Start(pos))?;
            file.read_exact(&mut dst[..from_file])?;
            filled = from_file;
        }

        if filled < want {
            let start = (pos + filled as u64 - flushed) as usize;
            dst[filled..want].copy_from_slice(&inner.buffer[start..start + want - filled]);
            filled = want;
        }

        Ok(filled)
    }

    /// Drains the write buffer to the file.
    ///
    /// When `durable` is true the file is additionally fsynced, so all
    /// previously written bytes survive process termination.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] if the channel is closed, or an
    /// I/O error from the write or sync.
    pub fn flush(&self, durable: bool) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.drain()?;
        if durable {
            let file = inner.file.as_ref().ok_or(StorageError::Closed)?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// Drains the buffer and releases the file handle.
    ///
    /// Subsequent operations fail with [`StorageError::Closed`]. The
    /// handle must be released before the file can be unlinked on hosts
    /// that lock open files.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if draining the buffer fails; the handle is
    /// released regardless.
    pub fn close(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        let result = inner.drain();
        inner.file = None;
        result
    }
}

impl Inner {
    /// Writes all buffered bytes through to the file.
    fn drain(&mut self) -> StorageResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let flushed = self.flushed;
        let file = self.file.as_mut().ok_or(StorageError::Closed)?;
        file.seek(SeekFrom::Start(flushed))?;
        file.write_all(&self.buffer)?;
        self.flushed += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }
}

impl std::fmt::Debug for BufferedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedChannel")
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_starts_empty() {
        let dir = tempdir().unwrap();
        let channel = BufferedChannel::create(&dir.path().join("a.log"), 1024).unwrap();
        assert_eq!(channel.position().unwrap(), 0);
        assert_eq!(channel.size().unwrap(), 0);
    }

    #[test]
    fn write_and_read_from_buffer() {
        let dir = tempdir().unwrap();
        let channel = BufferedChannel::create(&dir.path().join("a.log"), 1024).unwrap();

        channel.write(b"hello world").unwrap();
        assert_eq!(channel.position().unwrap(), 11);

        // Nothing drained yet, but buffered bytes must be readable.
        let mut buf = [0u8; 5];
        let n = channel.read_at(&mut buf, 6).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn read_spans_file_and_buffer() {
        let dir = tempdir().unwrap();
        let channel = BufferedChannel::create(&dir.path().join("a.log"), 1024).unwrap();

        channel.write(b"on disk ").unwrap();
        channel.flush(false).unwrap();
        channel.write(b"in buffer").unwrap();

        let mut buf = [0u8; 17];
        let n = channel.read_at(&mut buf, 0).unwrap();
        assert_eq!(n, 17);
        assert_eq!(&buf, b"on disk in buffer");
    }

    #[test]
    fn short_read_past_end() {
        let dir = tempdir().unwrap();
        let channel = BufferedChannel::create(&dir.path().join("a.log"), 1024).unwrap();
        channel.write(b"abc").unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(channel.read_at(&mut buf, 0).unwrap(), 3);
        assert_eq!(channel.read_at(&mut buf, 3).unwrap(), 0);
        assert_eq!(channel.read_at(&mut buf, 100).unwrap(), 0);
    }

    #[test]
    fn buffer_drains_at_capacity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.log");
        let channel = BufferedChannel::create(&path, 8).unwrap();

        channel.write(b"0123456789").unwrap();
        // Capacity reached, so the bytes went through to the file.
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 10);
        assert_eq!(channel.position().unwrap(), 10);
    }

    #[test]
    fn flush_durable_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.log");

        {
            let channel = BufferedChannel::create(&path, 1024).unwrap();
            channel.write(b"persistent").unwrap();
            channel.flush(true).unwrap();
        }

        let channel = BufferedChannel::open(&path, 1024).unwrap();
        assert_eq!(channel.size().unwrap(), 10);
        let mut buf = [0u8; 10];
        assert_eq!(channel.read_at(&mut buf, 0).unwrap(), 10);
        assert_eq!(&buf, b"persistent");
    }

    #[test]
    fn open_positions_at_end() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.log");

        {
            let channel = BufferedChannel::create(&path, 1024).unwrap();
            channel.write(b"first").unwrap();
            channel.flush(false).unwrap();
        }

        let channel = BufferedChannel::open(&path, 1024).unwrap();
        assert_eq!(channel.position().unwrap(), 5);
        channel.write(b"second").unwrap();
        channel.flush(false).unwrap();

        let mut buf = [0u8; 11];
        assert_eq!(channel.read_at(&mut buf, 0).unwrap(), 11);
        assert_eq!(&buf, b"firstsecond");
    }

    #[test]
    fn closed_channel_rejects_operations() {
        let dir = tempdir().unwrap();
        let channel = BufferedChannel::create(&dir.path().join("a.log"), 1024).unwrap();
        channel.write(b"data").unwrap();
        channel.close().unwrap();

        assert!(matches!(channel.write(b"x"), Err(StorageError::Closed)));
        assert!(matches!(channel.position(), Err(StorageError::Closed)));
        let mut buf = [0u8; 1];
        assert!(matches!(
            channel.read_at(&mut buf, 0),
            Err(StorageError::Closed)
        ));
    }

    #[test]
    fn close_drains_pending_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.log");
        let channel = BufferedChannel::create(&path, 1024).unwrap();
        channel.write(b"pending").unwrap();
        channel.close().unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 7);
    }
}
