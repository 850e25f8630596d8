//! Attachment content handles for a compound write.
//!
//! Handles are opened while the record is staged and must stay open until the
//! remote flush has been attempted: the transport reads from them while it
//! builds the request. Every read starts from the beginning of the content, so
//! a batch can be encoded more than once. `AttachmentSet::release_all` closes
//! the handles afterwards.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Readable, rewindable attachment content.
pub trait ContentHandle: Read + Seek + Send {
    /// Close the handle. The default just drops it.
    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

impl ContentHandle for File {}

/// Where attachment content comes from.
pub trait ContentSource: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn length(&self, path: &Path) -> io::Result<u64>;
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn ContentHandle>>;
}

/// Local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsContentSource;

impl ContentSource for FsContentSource {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn length(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn ContentHandle>> {
        Ok(Box::new(File::open(path)?))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("attachment does not exist: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("attachment is empty: {}", path.display())]
    Empty { path: PathBuf },
    #[error("attachment could not be opened: {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An opened attachment. Clones share the same underlying handle, which is
/// owned by the `AttachmentSet` that staged it.
#[derive(Clone)]
pub struct StagedContent {
    path: PathBuf,
    file_name: String,
    len: u64,
    handle: Arc<Mutex<Option<Box<dyn ContentHandle>>>>,
}

impl fmt::Debug for StagedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedContent")
            .field("path", &self.path)
            .field("file_name", &self.file_name)
            .field("len", &self.len)
            .field("released", &self.is_released())
            .finish()
    }
}

impl StagedContent {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name the attachment is stored under (final path component).
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Length observed when the attachment was staged.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_released(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Read the whole content from the start.
    ///
    /// Fails once the owning set released the handle, and when the content
    /// no longer holds the `len()` bytes seen at staging time.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        let mut guard = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = guard.as_mut().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("content handle for {} already released", self.file_name),
            )
        })?;
        handle.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::with_capacity(usize::try_from(self.len).unwrap_or(0));
        (&mut **handle).take(self.len).read_to_end(&mut buf)?;
        if buf.len() as u64 != self.len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "{} shrank after staging: read {} of {} bytes",
                    self.file_name,
                    buf.len(),
                    self.len
                ),
            ));
        }
        Ok(buf)
    }

    fn take(&self) -> Option<Box<dyn ContentHandle>> {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Outcome of `release_all`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseSummary {
    pub closed: usize,
    pub failed: usize,
}

/// Tracks every handle opened for one compound write and guarantees release.
pub struct AttachmentSet {
    source: Arc<dyn ContentSource>,
    staged: Vec<StagedContent>,
    released: bool,
}

impl AttachmentSet {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self {
            source,
            staged: Vec::new(),
            released: false,
        }
    }

    /// Open `path` and add it to the release list.
    pub fn stage(&mut self, path: &Path) -> Result<StagedContent, AttachmentError> {
        if !self.source.exists(path) {
            return Err(AttachmentError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let len = self.source.length(path).map_err(|source| AttachmentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if len == 0 {
            return Err(AttachmentError::Empty {
                path: path.to_path_buf(),
            });
        }
        let handle = self.source.open_read(path).map_err(|source| AttachmentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let content = StagedContent {
            path: path.to_path_buf(),
            file_name,
            len,
            handle: Arc::new(Mutex::new(Some(handle))),
        };
        tracing::debug!(path = %path.display(), len, "attachment staged");
        self.staged.push(content.clone());
        Ok(content)
    }

    pub fn staged(&self) -> &[StagedContent] {
        &self.staged
    }

    /// Close every handle. Close failures are logged and counted, never raised.
    /// Subsequent calls are no-ops.
    pub fn release_all(&mut self) -> ReleaseSummary {
        let mut summary = ReleaseSummary::default();
        if self.released {
            return summary;
        }
        self.released = true;
        for content in &self.staged {
            let Some(handle) = content.take() else {
                continue;
            };
            match handle.close() {
                Ok(()) => summary.closed += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(path = %content.path.display(), "closing attachment failed: {}", e);
                }
            }
        }
        summary
    }
}

impl Drop for AttachmentSet {
    fn drop(&mut self) {
        self.release_all();
    }
}
