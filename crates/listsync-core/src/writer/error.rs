//! Error type for compound item creation.

use std::fmt;

use crate::attachments::AttachmentError;
use crate::retry::ExecutorError;

/// Where a failed write was headed, for logging and correlation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteContext {
    pub list: String,
    /// Target folder; `None` is the list's root folder.
    pub container: Option<String>,
    /// Value of the `Title` field, if the caller supplied one.
    pub title: Option<String>,
}

impl fmt::Display for WriteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item")?;
        if let Some(title) = &self.title {
            write!(f, " {:?}", title)?;
        }
        write!(f, " in {}", self.list)?;
        if let Some(container) = &self.container {
            write!(f, "/{}", container)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WriteErrorKind {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("attachment failed: {0}")]
    AttachmentFailed(#[source] AttachmentError),
    #[error("submission failed: {0}")]
    SubmissionFailed(#[source] ExecutorError),
    /// Deleting the staged record after a failure did not succeed. Logged only;
    /// the original failure is what the caller receives.
    #[error("rollback failed: {0}")]
    RollbackFailed(#[source] ExecutorError),
}

/// Failure of `CompoundItemWriter::create`.
#[derive(Debug, thiserror::Error)]
#[error("failed to create {context}: {kind}")]
pub struct WriteError {
    pub context: WriteContext,
    #[source]
    pub kind: WriteErrorKind,
}

impl WriteError {
    pub(crate) fn new(context: &WriteContext, kind: WriteErrorKind) -> Self {
        Self {
            context: context.clone(),
            kind,
        }
    }
}
