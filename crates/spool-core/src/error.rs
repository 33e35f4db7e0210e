//! Error types for tasks and the scheduler loop.

use std::io;
use std::os::unix::io::RawFd;

use crate::config::ConfigError;

/// Error payload carried through a task's delegation stack.
///
/// A parent unit receives this as `Err(..)` when a child fails, and may
/// recover, retry, or re-raise it by returning [`Step::Error`](crate::Step::Error).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// Failure raised by unit code
    #[error("task failed: {0}")]
    Failed(String),

    /// I/O error raised while a unit performed an operation
    #[error("I/O error ({kind:?}): {message}")]
    Io {
        /// Error kind reported by the operating system
        kind: io::ErrorKind,
        /// Rendered error message
        message: String,
    },

    /// The descriptor being waited on failed or was closed under the waiter
    #[error("descriptor {0} closed while waiting")]
    DescriptorClosed(RawFd),

    /// A scheduler primitive was used where it has no meaning
    #[error("misuse: {0}")]
    Misuse(String),

    /// A delegation would exceed the configured depth limit
    #[error("delegation depth limit of {0} exceeded")]
    DepthExceeded(usize),
}

impl TaskError {
    /// Create a [`TaskError::Failed`] from anything displayable.
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }

    /// Create a [`TaskError::Misuse`] from anything displayable.
    pub fn misuse(message: impl Into<String>) -> Self {
        TaskError::Misuse(message.into())
    }

    /// Whether this error reports misuse of the scheduler protocol.
    pub fn is_misuse(&self) -> bool {
        matches!(self, TaskError::Misuse(_))
    }
}

impl From<io::Error> for TaskError {
    fn from(err: io::Error) -> Self {
        TaskError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Errors that end a call to [`Scheduler::run`](crate::Scheduler::run) or
/// reject a submission.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The readiness-polling primitive itself failed
    #[error("readiness poll failed: {0}")]
    Poll(#[source] io::Error),

    /// The configured live-task limit is reached
    #[error("task limit of {0} reached")]
    TaskLimit(usize),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}
