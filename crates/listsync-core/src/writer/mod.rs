//! Compound item creation: one record plus its attachments as a single
//! logical write.
//!
//! The store has no transaction spanning record creation and attachment
//! upload. The writer stages the record hidden from readers, sends record,
//! attachments, field values and publication in one batch through the
//! retrying executor, and deletes the staged record when anything fails.

mod error;
mod record;

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::attachments::{AttachmentSet, ContentSource};
use crate::control::CancelToken;
use crate::retry::{RetryingExecutor, Sleeper, TokioSleeper};
use crate::transport::{Fields, Transport};

pub use error::{WriteContext, WriteError, WriteErrorKind};
pub use record::{CREATED_FIELD, CREATED_FORMAT, TITLE_FIELD};

use record::{apply_fields, title_of, PendingRecord};

/// A committed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHandle {
    /// Client-side staging key the record was created under.
    pub key: Uuid,
    /// Server-assigned id, when the response carried one.
    pub id: Option<u64>,
    pub list: String,
    pub folder: Option<String>,
    pub title: Option<String>,
    /// File names of the registered attachments, in order.
    pub attachments: Vec<String>,
}

type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Creates records with attachments in one list.
pub struct CompoundItemWriter<T, S = TokioSleeper> {
    executor: RetryingExecutor<T, S>,
    content: Arc<dyn ContentSource>,
    list: String,
    clock: Clock,
}

impl<T: Transport, S: Sleeper> CompoundItemWriter<T, S> {
    pub fn new(
        executor: RetryingExecutor<T, S>,
        content: Arc<dyn ContentSource>,
        list: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            content,
            list: list.into(),
            clock: Arc::new(|| chrono::Local::now().naive_local()),
        }
    }

    /// Replace the wall clock used for an empty `Created` field.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn executor(&self) -> &RetryingExecutor<T, S> {
        &self.executor
    }

    pub fn list(&self) -> &str {
        &self.list
    }

    /// Create one record in `target_container` (root folder when `None` or
    /// empty) with `fields` and the files at `attachment_paths`.
    ///
    /// Either the whole record becomes visible or the staged record is
    /// deleted before this returns. Attachment handles are released exactly
    /// once, after the submission resolved.
    ///
    /// Stop a write through the executor's `CancelToken`. Dropping the
    /// returned future skips the rollback and can leave a staged record.
    pub async fn create<P: AsRef<Path>>(
        &self,
        target_container: Option<&str>,
        fields: &Fields,
        attachment_paths: &[P],
    ) -> Result<RecordHandle, WriteError> {
        let folder = target_container
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        let context = WriteContext {
            list: self.list.clone(),
            container: folder.clone(),
            title: title_of(fields),
        };
        tracing::info!(
            title = context.title.as_deref().unwrap_or(""),
            list = %self.list,
            attachments = attachment_paths.len(),
            "item creation started"
        );

        if fields.is_empty() {
            return Err(WriteError::new(
                &context,
                WriteErrorKind::InvalidInput("no field values supplied".to_string()),
            ));
        }

        let mut record = PendingRecord::stage(&self.list, folder);
        let mut streams = AttachmentSet::new(Arc::clone(&self.content));
        let result = self
            .write(&mut record, &mut streams, fields, attachment_paths, &context)
            .await;
        let released = streams.release_all();
        tracing::debug!(closed = released.closed, failed = released.failed, "attachments released");

        match &result {
            Ok(handle) => tracing::info!(
                title = context.title.as_deref().unwrap_or(""),
                id = handle.id,
                "item creation completed"
            ),
            Err(e) => tracing::error!("{}", e),
        }
        result
    }

    async fn write<P: AsRef<Path>>(
        &self,
        record: &mut PendingRecord,
        streams: &mut AttachmentSet,
        fields: &Fields,
        attachment_paths: &[P],
        context: &WriteContext,
    ) -> Result<RecordHandle, WriteError> {
        for path in attachment_paths {
            match streams.stage(path.as_ref()) {
                Ok(content) => record.attachments.push(content),
                Err(e) => {
                    self.rollback(record, context).await;
                    return Err(WriteError::new(context, WriteErrorKind::AttachmentFailed(e)));
                }
            }
        }

        record.fields = apply_fields(fields, (self.clock)());
        let batch = record.commit_batch();

        match self.executor.execute(&batch).await {
            Ok(response) => Ok(RecordHandle {
                key: record.key,
                id: response.first_id(),
                list: record.list.clone(),
                folder: record.folder.clone(),
                title: context.title.clone(),
                attachments: record
                    .attachments
                    .iter()
                    .map(|c| c.file_name().to_string())
                    .collect(),
            }),
            Err(e) => {
                self.rollback(record, context).await;
                Err(WriteError::new(context, WriteErrorKind::SubmissionFailed(e)))
            }
        }
    }

    /// Best-effort delete of the staged record. Runs even after cancellation
    /// of the write itself; a failure is logged, never returned.
    async fn rollback(&self, record: &PendingRecord, context: &WriteContext) {
        let batch = record.delete_batch();
        match self.executor.execute_with(&batch, &CancelToken::new()).await {
            Ok(_) => tracing::info!(key = %record.key, "staged item deleted"),
            Err(e) => {
                let err = WriteError::new(context, WriteErrorKind::RollbackFailed(e));
                tracing::warn!(key = %record.key, "{}; manual cleanup may be required", err);
            }
        }
    }
}
