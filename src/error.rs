//! Top-level error taxonomy (§7): the scheduler/job-boundary concerns
//! layered on top of `lattice_nnets::error::InferenceError` (construction-
//! and execution-time failures intrinsic to the engine, kept one layer
//! down in that crate).

use std::fmt;

/// The chunk store file could not be opened or parsed (§7).
#[derive(Debug)]
pub struct IOError(pub String);

impl fmt::Display for IOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I/O error: {}", self.0)
    }
}
impl std::error::Error for IOError {}

impl From<std::io::Error> for IOError {
    fn from(e: std::io::Error) -> Self {
        IOError(e.to_string())
    }
}

/// A job was cancelled before completing. Not itself a failure (§7: "not
/// an error, signalled through the Job status") — kept in the error enum
/// only so callers that treat `Result` uniformly have a variant to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aborted;

impl fmt::Display for Aborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job aborted")
    }
}
impl std::error::Error for Aborted {}

/// Every error raised by an operation during `Model::execute` is wrapped
/// with the operation's name before being re-raised to the job owner (§7
/// propagation policy).
#[derive(Debug)]
pub struct InferenceTimeError {
    pub operation: String,
    pub source: lattice_nnets::error::InferenceError,
}

impl fmt::Display for InferenceTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation '{}' failed: {}", self.operation, self.source)
    }
}
impl std::error::Error for InferenceTimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// The error type surfaced across the scheduler/Job boundary (§7).
#[derive(Debug)]
pub enum Error {
    Inference(InferenceTimeError),
    Io(IOError),
    Aborted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Inference(e) => write!(f, "{e}"),
            Error::Io(e) => write!(f, "{e}"),
            Error::Aborted => write!(f, "{}", Aborted),
        }
    }
}
impl std::error::Error for Error {}

impl From<InferenceTimeError> for Error {
    fn from(e: InferenceTimeError) -> Self {
        Error::Inference(e)
    }
}
impl From<IOError> for Error {
    fn from(e: IOError) -> Self {
        Error::Io(e)
    }
}
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(IOError::from(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Receives failure notifications for jobs run on a `Pool` (§7: "a task
/// listener receives `task_fail(pool, task, error)` callbacks").
pub trait TaskListener: Send + Sync {
    fn task_fail(&self, pool_label: &str, task_label: &str, error: &Error);
}
