//! Archive destinations.
//!
//! A [`DestinationFactory`] hands out fresh, independent handles to one
//! physical target: one for the sequential pass, one per fill task. Whether
//! random access is possible is decided per handle through the
//! [`Destination`] variant.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use boxtar_core::error::{ArchiveError, Result};
use parking_lot::Mutex;
use tokio::io::{AsyncSeek, AsyncWrite};

/// A writable sink that supports random-access positioning.
pub trait SeekableSink: AsyncWrite + AsyncSeek + Send + Unpin {}

impl<T: AsyncWrite + AsyncSeek + Send + Unpin> SeekableSink for T {}

/// An opened destination handle.
pub enum Destination {
    /// Random access supported; placeholders can be filled in later.
    Seekable(Box<dyn SeekableSink>),
    /// Append-only (pipes, terminals).
    Stream(Box<dyn AsyncWrite + Send + Unpin>),
}

impl Destination {
    pub fn is_seekable(&self) -> bool {
        matches!(self, Destination::Seekable(_))
    }
}

impl std::fmt::Debug for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Seekable(_) => f.write_str("Destination::Seekable"),
            Destination::Stream(_) => f.write_str("Destination::Stream"),
        }
    }
}

/// Opens handles to the same physical target.
#[async_trait]
pub trait DestinationFactory: Send + Sync {
    /// Open a fresh handle. Must not truncate what earlier handles wrote.
    async fn open(&self) -> Result<Destination>;

    /// Human-readable target, for logs and errors.
    fn target(&self) -> String;
}

/// A file on disk.
///
/// Regular files are seekable. FIFOs and character devices are streams.
#[derive(Debug, Clone)]
pub struct FileDestination {
    path: PathBuf,
}

impl FileDestination {
    /// Prepare `path` for writing: regular files are created or truncated.
    ///
    /// Existing FIFOs and devices are left untouched.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let is_special = match tokio::fs::metadata(&path).await {
            Ok(metadata) => !metadata.is_file(),
            Err(_) => false,
        };

        if !is_special {
            tokio::fs::File::create(&path)
                .await
                .map_err(|e| open_error(&path, e))?;
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DestinationFactory for FileDestination {
    async fn open(&self) -> Result<Destination> {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&self.path)
            .await
            .map_err(|e| open_error(&self.path, e))?;

        let metadata = file
            .metadata()
            .await
            .map_err(|e| open_error(&self.path, e))?;

        if metadata.is_file() {
            Ok(Destination::Seekable(Box::new(file)))
        } else {
            Ok(Destination::Stream(Box::new(file)))
        }
    }

    fn target(&self) -> String {
        self.path.display().to_string()
    }
}

fn open_error(path: &Path, err: std::io::Error) -> ArchiveError {
    ArchiveError::OpenError {
        target: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Standard output; never seekable.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutDestination;

#[async_trait]
impl DestinationFactory for StdoutDestination {
    async fn open(&self) -> Result<Destination> {
        Ok(Destination::Stream(Box::new(tokio::io::stdout())))
    }

    fn target(&self) -> String {
        "stdout".to_string()
    }
}

/// Shared in-memory buffer.
///
/// Every handle has its own cursor over the same bytes. Writes past the end
/// zero-extend the buffer.
#[derive(Debug, Clone)]
pub struct MemoryDestination {
    buffer: Arc<Mutex<Vec<u8>>>,
    seekable: bool,
    opened: Arc<Mutex<usize>>,
}

impl MemoryDestination {
    /// Random-access buffer.
    pub fn seekable() -> Self {
        Self::new(true)
    }

    /// Buffer that only accepts appends, like a pipe.
    pub fn non_seekable() -> Self {
        Self::new(false)
    }

    fn new(seekable: bool) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            seekable,
            opened: Arc::new(Mutex::new(0)),
        }
    }

    /// Snapshot of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }

    /// Number of handles opened so far.
    pub fn open_count(&self) -> usize {
        *self.opened.lock()
    }
}

#[async_trait]
impl DestinationFactory for MemoryDestination {
    async fn open(&self) -> Result<Destination> {
        *self.opened.lock() += 1;

        let handle = MemoryHandle {
            buffer: Arc::clone(&self.buffer),
            position: 0,
        };
        if self.seekable {
            Ok(Destination::Seekable(Box::new(handle)))
        } else {
            Ok(Destination::Stream(Box::new(handle)))
        }
    }

    fn target(&self) -> String {
        if self.seekable {
            "memory (seekable)".to_string()
        } else {
            "memory (stream)".to_string()
        }
    }
}

/// Cursor over a [`MemoryDestination`] buffer.
#[derive(Debug)]
struct MemoryHandle {
    buffer: Arc<Mutex<Vec<u8>>>,
    position: u64,
}

impl AsyncWrite for MemoryHandle {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        let start = usize::try_from(this.position)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "offset overflow"))?;
        let end = start + buf.len();

        let mut data = this.buffer.lock();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        this.position = end as u64;

        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for MemoryHandle {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> std::io::Result<()> {
        let this = self.get_mut();
        let (base, offset) = match position {
            SeekFrom::Start(n) => {
                this.position = n;
                return Ok(());
            }
            SeekFrom::Current(n) => (this.position, n),
            SeekFrom::End(n) => (this.buffer.lock().len() as u64, n),
        };

        this.position = base.checked_add_signed(offset).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<u64>> {
        Poll::Ready(Ok(self.position))
    }
}
