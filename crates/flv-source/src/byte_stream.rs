//! # Byte Streams
//!
//! The engine reads its input through [`ByteStream`]: a seekable source with
//! a synchronous cursor and asynchronous reads. Two implementations ship with
//! the crate, one over an in-memory buffer and one over a file.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

/// What a [`ByteStream`] supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCapabilities {
    pub readable: bool,
    pub seekable: bool,
}

impl Default for StreamCapabilities {
    fn default() -> Self {
        Self {
            readable: true,
            seekable: true,
        }
    }
}

/// A seekable byte source.
///
/// Reads start at the current position and advance it by the number of
/// bytes returned. A read returns at most `len` bytes; an empty result means
/// the end of the stream was reached.
#[async_trait]
pub trait ByteStream: Send + Sync {
    fn capabilities(&self) -> StreamCapabilities;

    /// Moves the cursor and returns the new absolute position.
    fn seek(&self, pos: SeekFrom) -> io::Result<u64>;

    fn position(&self) -> io::Result<u64>;

    async fn read(&self, len: usize) -> io::Result<Bytes>;
}

fn resolve_seek(current: u64, len: u64, pos: SeekFrom) -> io::Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => Some(offset),
        SeekFrom::Current(delta) => current.checked_add_signed(delta),
        SeekFrom::End(delta) => len.checked_add_signed(delta),
    };

    target.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "seek before the start of the stream",
        )
    })
}

/// A [`ByteStream`] over a buffer held in memory.
#[derive(Debug)]
pub struct MemoryByteStream {
    data: Bytes,
    position: Mutex<u64>,
    capabilities: StreamCapabilities,
}

impl MemoryByteStream {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            position: Mutex::new(0),
            capabilities: StreamCapabilities::default(),
        }
    }

    /// Overrides the reported capabilities; reads and seeks keep working.
    pub fn with_capabilities(mut self, capabilities: StreamCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl ByteStream for MemoryByteStream {
    fn capabilities(&self) -> StreamCapabilities {
        self.capabilities
    }

    fn seek(&self, pos: SeekFrom) -> io::Result<u64> {
        let mut position = self.position.lock();
        *position = resolve_seek(*position, self.data.len() as u64, pos)?;
        Ok(*position)
    }

    fn position(&self) -> io::Result<u64> {
        Ok(*self.position.lock())
    }

    async fn read(&self, len: usize) -> io::Result<Bytes> {
        let mut position = self.position.lock();
        let start = (*position as usize).min(self.data.len());
        let end = start.saturating_add(len).min(self.data.len());

        *position = end as u64;
        Ok(self.data.slice(start..end))
    }
}

#[derive(Debug, Default)]
struct FileCursor {
    offset: u64,
    /// Bumped by every seek, so a read that raced a seek leaves the cursor alone
    generation: u64,
}

/// A [`ByteStream`] over a file. Reads run on the blocking thread pool.
#[derive(Debug)]
pub struct FileByteStream {
    file: Arc<Mutex<File>>,
    cursor: Mutex<FileCursor>,
}

impl FileByteStream {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::from_file(File::open(path)?))
    }

    pub fn from_file(file: File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
            cursor: Mutex::new(FileCursor::default()),
        }
    }

    fn file_len(&self) -> io::Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }
}

#[async_trait]
impl ByteStream for FileByteStream {
    fn capabilities(&self) -> StreamCapabilities {
        StreamCapabilities::default()
    }

    fn seek(&self, pos: SeekFrom) -> io::Result<u64> {
        let len = match pos {
            SeekFrom::End(_) => self.file_len()?,
            _ => 0,
        };

        let mut cursor = self.cursor.lock();
        cursor.offset = resolve_seek(cursor.offset, len, pos)?;
        cursor.generation = cursor.generation.wrapping_add(1);
        Ok(cursor.offset)
    }

    fn position(&self) -> io::Result<u64> {
        Ok(self.cursor.lock().offset)
    }

    async fn read(&self, len: usize) -> io::Result<Bytes> {
        let (offset, generation) = {
            let cursor = self.cursor.lock();
            (cursor.offset, cursor.generation)
        };

        let file = self.file.clone();
        let data = tokio::task::spawn_blocking(move || -> io::Result<Vec<u8>> {
            let mut file = file.lock();
            file.seek(SeekFrom::Start(offset))?;

            let mut buf = Vec::with_capacity(len);
            file.by_ref().take(len as u64).read_to_end(&mut buf)?;
            Ok(buf)
        })
        .await
        .map_err(io::Error::other)??;

        let mut cursor = self.cursor.lock();
        if cursor.generation == generation {
            cursor.offset = offset + data.len() as u64;
        }
        Ok(Bytes::from(data))
    }
}
