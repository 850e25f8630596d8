//! In-memory collaborators shared by unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::attachments::{ContentHandle, ContentSource};
use crate::control::CancelToken;
use crate::retry::Sleeper;
use crate::transport::{
    Fields, FlushOutcome, Operation, RequestBatch, Response, Throttle, Transport, TransportError,
};

/// Ordered event log shared by the fakes, so tests can assert interleaving.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub(crate) fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub(crate) fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

/// Content source backed by a map of path → bytes.
pub(crate) struct MemoryContent {
    files: HashMap<PathBuf, Vec<u8>>,
    failing_close: HashSet<String>,
    journal: Journal,
}

impl MemoryContent {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            files: HashMap::new(),
            failing_close: HashSet::new(),
            journal,
        }
    }

    pub(crate) fn with_file(mut self, path: &str, bytes: &[u8]) -> Self {
        self.files.insert(PathBuf::from(path), bytes.to_vec());
        self
    }

    pub(crate) fn failing_close(mut self, file_name: &str) -> Self {
        self.failing_close.insert(file_name.to_string());
        self
    }
}

struct MemoryHandle {
    name: String,
    data: Cursor<Vec<u8>>,
    fail_close: bool,
    journal: Journal,
}

impl Read for MemoryHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.data.read(buf)
    }
}

impl Seek for MemoryHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.data.seek(pos)
    }
}

impl ContentHandle for MemoryHandle {
    fn close(self: Box<Self>) -> io::Result<()> {
        self.journal.push(format!("close:{}", self.name));
        if self.fail_close {
            return Err(io::Error::new(io::ErrorKind::Other, "close failed"));
        }
        Ok(())
    }
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl ContentSource for MemoryContent {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn length(&self, path: &Path) -> io::Result<u64> {
        self.files
            .get(path)
            .map(|b| b.len() as u64)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn ContentHandle>> {
        let data = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        let name = name_of(path);
        self.journal.push(format!("open:{}", name));
        Ok(Box::new(MemoryHandle {
            fail_close: self.failing_close.contains(&name),
            name,
            data: Cursor::new(data),
            journal: self.journal.clone(),
        }))
    }
}

/// Scripted answer for one round trip.
pub(crate) enum Step {
    Apply(Response),
    Throttle(Option<&'static str>),
    Fail(TransportError),
    /// Cancels the token, yields so the cancel is observed mid-flight, then
    /// answers with the response and journals `settled:<token>`.
    CancelThenApply(CancelToken, Response),
}

/// Transport that answers from a script and records what it was sent.
///
/// When the script runs out every round trip is applied with `{"id": 1}`.
/// Tokens are indexes into the recorded batches.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    batches: Mutex<Vec<Vec<&'static str>>>,
    fields: Mutex<Vec<Fields>>,
    round_trips: AtomicU32,
    journal: Journal,
}

impl ScriptedTransport {
    pub(crate) fn new(journal: Journal, script: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            journal,
            ..Self::default()
        }
    }

    pub(crate) fn round_trips(&self) -> u32 {
        self.round_trips.load(Ordering::SeqCst)
    }

    /// Operation names of every flushed batch (resends are not repeated here).
    pub(crate) fn batches(&self) -> Vec<Vec<&'static str>> {
        self.batches.lock().unwrap().clone()
    }

    /// Every `SetFields` payload that was flushed.
    pub(crate) fn submitted_fields(&self) -> Vec<Fields> {
        self.fields.lock().unwrap().clone()
    }

    async fn answer(&self, token: usize) -> Result<FlushOutcome<usize>, TransportError> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            None => Ok(FlushOutcome::Applied(applied(1))),
            Some(Step::Apply(r)) => Ok(FlushOutcome::Applied(r)),
            Some(Step::Throttle(hint)) => Ok(FlushOutcome::Throttled(Throttle {
                status: 429,
                retry_after: hint.map(str::to_string),
                token,
            })),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::CancelThenApply(cancel, r)) => {
                cancel.cancel();
                tokio::task::yield_now().await;
                self.journal.push(format!("settled:{}", token));
                Ok(FlushOutcome::Applied(r))
            }
        }
    }
}

pub(crate) fn applied(id: u64) -> Response {
    Response {
        results: vec![serde_json::json!({ "id": id })],
    }
}

impl Transport for ScriptedTransport {
    type Token = usize;

    async fn flush(&self, batch: &RequestBatch) -> Result<FlushOutcome<usize>, TransportError> {
        let names: Vec<_> = batch.operations().iter().map(Operation::name).collect();
        self.journal.push(format!("flush:{}", names.join(",")));
        for op in batch.operations() {
            match op {
                Operation::AddAttachment { content, .. } => {
                    // Mirrors a real transport reading content while encoding.
                    content
                        .read_all()
                        .map_err(|source| TransportError::ContentUnavailable {
                            file_name: content.file_name().to_string(),
                            source,
                        })?;
                    self.journal.push(format!("read:{}", content.file_name()));
                }
                Operation::SetFields { fields, .. } => {
                    self.fields.lock().unwrap().push(fields.clone());
                }
                _ => {}
            }
        }
        let token = {
            let mut batches = self.batches.lock().unwrap();
            batches.push(names);
            batches.len() - 1
        };
        self.answer(token).await
    }

    async fn resend(&self, token: &usize) -> Result<FlushOutcome<usize>, TransportError> {
        self.journal.push(format!("resend:{}", token));
        self.answer(*token).await
    }
}

/// Sleeper that records requested delays and returns immediately.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
    journal: Journal,
}

impl RecordingSleeper {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            delays: Arc::default(),
            journal,
        }
    }

    pub(crate) fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
        self.journal.push(format!("sleep:{}", delay.as_millis()));
    }
}

/// Sleeper that fires a cancel token and then waits forever.
#[derive(Debug, Clone)]
pub(crate) struct CancellingSleeper(pub(crate) CancelToken);

impl Sleeper for CancellingSleeper {
    async fn sleep(&self, _delay: Duration) {
        self.0.cancel();
        std::future::pending::<()>().await
    }
}
