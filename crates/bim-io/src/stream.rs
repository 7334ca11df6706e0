//! Uniform blocking stream over a file or an in-memory buffer.
//!
//! Parsers only ever see a [`Stream`]: it implements [`Read`], [`Write`] and
//! [`Seek`] regardless of the medium, and adds a few helpers the plugins
//! need everywhere (`tell`, `len`, bounds-checked reads at an offset,
//! magic-byte peeking). It knows nothing about endianness.
//!
//! # Example
//!
//! ```rust
//! use bim_io::Stream;
//! use std::io::Read;
//!
//! let mut s = Stream::from_bytes(b"NRRD0004\n".to_vec());
//! assert_eq!(s.peek(4)?, b"NRRD");
//! let mut buf = [0u8; 4];
//! s.read_exact_at(4, &mut buf)?;
//! assert_eq!(&buf, b"0004");
//! # Ok::<(), bim_io::IoError>(())
//! ```

use crate::error::{IoError, IoResult};
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Direction a stream (and the handle owning it) was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoMode {
    /// Reading an existing image.
    #[default]
    Read,
    /// Writing a new image.
    Write,
}

#[derive(Debug)]
enum Medium {
    File(File),
    Memory(Cursor<Vec<u8>>),
}

/// A seekable byte stream over a file or a memory buffer.
#[derive(Debug)]
pub struct Stream {
    medium: Medium,
    path: Option<PathBuf>,
    mode: IoMode,
}

impl Stream {
    /// Opens `path` for reading, or creates/truncates it for writing.
    pub fn open(path: impl AsRef<Path>, mode: IoMode) -> IoResult<Self> {
        let path = path.as_ref();
        let file = match mode {
            IoMode::Read => File::open(path)?,
            IoMode::Write => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
        };
        Ok(Self {
            medium: Medium::File(file),
            path: Some(path.to_path_buf()),
            mode,
        })
    }

    /// Wraps an in-memory buffer for reading.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            medium: Medium::Memory(Cursor::new(data)),
            path: None,
            mode: IoMode::Read,
        }
    }

    /// Creates an empty in-memory stream for writing.
    pub fn memory_writer() -> Self {
        Self {
            medium: Medium::Memory(Cursor::new(Vec::new())),
            path: None,
            mode: IoMode::Write,
        }
    }

    /// Path the stream was opened from, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// File name component used for extension-based validation.
    pub fn file_name(&self) -> &str {
        self.path
            .as_deref()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }

    /// Mode the stream was opened with.
    pub fn mode(&self) -> IoMode {
        self.mode
    }

    /// Current position.
    pub fn tell(&mut self) -> IoResult<u64> {
        Ok(self.stream_position()?)
    }

    /// Total length in bytes.
    pub fn len(&mut self) -> IoResult<u64> {
        match &self.medium {
            Medium::File(f) => Ok(f.metadata()?.len()),
            Medium::Memory(c) => Ok(c.get_ref().len() as u64),
        }
    }

    /// Returns `true` if the stream holds no bytes.
    pub fn is_empty(&mut self) -> IoResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads up to `n` bytes from the start without moving the position.
    ///
    /// Returns fewer than `n` bytes only if the stream is shorter.
    pub fn peek(&mut self, n: usize) -> IoResult<Vec<u8>> {
        let pos = self.tell()?;
        self.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::with_capacity(n);
        let read = Read::take(&mut *self, n as u64).read_to_end(&mut buf);
        self.seek(SeekFrom::Start(pos))?;
        read?;
        Ok(buf)
    }

    /// Fills `buf` from `offset`, failing with [`IoError::UnrecognizedHeader`]
    /// if the region extends past the end of the stream.
    pub fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> IoResult<()> {
        self.ensure_range(offset, buf.len() as u64)?;
        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(buf)?;
        Ok(())
    }

    /// Reads `len` bytes at `offset` into a new buffer, bounds-checked
    /// before allocating.
    pub fn read_vec_at(&mut self, offset: u64, len: u64) -> IoResult<Vec<u8>> {
        self.ensure_range(offset, len)?;
        let len = usize::try_from(len)
            .map_err(|_| IoError::header(format!("region of {len} bytes does not fit in memory")))?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|e| bim_core::Error::allocation_failed(len as u64, e.to_string()))?;
        buf.resize(len, 0);
        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Checks that `[offset, offset + len)` lies inside the stream.
    pub fn ensure_range(&mut self, offset: u64, len: u64) -> IoResult<()> {
        let total = self.len()?;
        let end = offset
            .checked_add(len)
            .ok_or_else(|| IoError::header("region end overflows"))?;
        if end > total {
            return Err(IoError::header(format!(
                "region {offset}..{end} extends past end of stream ({total} bytes)"
            )));
        }
        Ok(())
    }

    /// Returns the buffer of a memory stream, or `None` for a file.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self.medium {
            Medium::Memory(c) => Some(c.into_inner()),
            Medium::File(_) => None,
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.medium {
            Medium::File(f) => f.read(buf),
            Medium::Memory(c) => c.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.mode == IoMode::Read {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "stream opened for reading",
            ));
        }
        match &mut self.medium {
            Medium::File(f) => f.write(buf),
            Medium::Memory(c) => c.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.medium {
            Medium::File(f) => f.flush(),
            Medium::Memory(c) => c.flush(),
        }
    }
}

impl Seek for Stream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.medium {
            Medium::File(f) => f.seek(pos),
            Medium::Memory(c) => c.seek(pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_read_seek_tell() {
        let mut s = Stream::from_bytes((0u8..10).collect());
        assert_eq!(s.len().unwrap(), 10);
        s.seek(SeekFrom::Start(3)).unwrap();
        let mut b = [0u8; 2];
        s.read_exact(&mut b).unwrap();
        assert_eq!(b, [3, 4]);
        assert_eq!(s.tell().unwrap(), 5);
    }

    #[test]
    fn test_peek_keeps_position() {
        let mut s = Stream::from_bytes(vec![1, 2, 3]);
        s.seek(SeekFrom::Start(2)).unwrap();
        assert_eq!(s.peek(8).unwrap(), vec![1, 2, 3]);
        assert_eq!(s.tell().unwrap(), 2);
    }

    #[test]
    fn test_read_past_end_rejected() {
        let mut s = Stream::from_bytes(vec![0; 8]);
        let mut buf = [0u8; 4];
        assert!(s.read_exact_at(6, &mut buf).is_err());
        assert!(matches!(
            s.read_vec_at(u64::MAX, 2),
            Err(IoError::UnrecognizedHeader(_))
        ));
        assert_eq!(s.read_vec_at(4, 4).unwrap().len(), 4);
    }

    #[test]
    fn test_write_on_read_stream_fails() {
        let mut s = Stream::from_bytes(vec![]);
        assert!(s.write_all(b"x").is_err());

        let mut w = Stream::memory_writer();
        w.write_all(b"abc").unwrap();
        assert_eq!(w.into_bytes().unwrap(), b"abc");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        {
            let mut w = Stream::open(&path, IoMode::Write).unwrap();
            w.write_all(b"hello").unwrap();
        }
        let mut r = Stream::open(&path, IoMode::Read).unwrap();
        assert_eq!(r.file_name(), "a.bin");
        assert_eq!(r.len().unwrap(), 5);
        assert_eq!(r.read_vec_at(1, 3).unwrap(), b"ell");
    }
}
