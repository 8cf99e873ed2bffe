//! Error taxonomy intrinsic to the inference engine (§7). Scheduler- and
//! job-level concerns (`IOError`, `Aborted`, the operation-name-tagged
//! `InferenceTimeError` wrapper) live one layer up, in `lattice::error`.

use std::fmt;

/// A parameter violates an operation's constraints at construction time
/// (e.g. a bad channel count or padding combination).
#[derive(Debug, Clone)]
pub struct InvalidArgument(pub String);

impl fmt::Display for InvalidArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid argument: {}", self.0)
    }
}
impl std::error::Error for InvalidArgument {}

/// A chunk referenced by an operation is missing or has the wrong size.
#[derive(Debug, Clone)]
pub struct InconsistentModelData(pub String);

impl fmt::Display for InconsistentModelData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inconsistent model data: {}", self.0)
    }
}
impl std::error::Error for InconsistentModelData {}

/// An operation is executed before `Model::prepare` has run.
#[derive(Debug, Clone)]
pub struct NotReady(pub String);

impl fmt::Display for NotReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not ready: {}", self.0)
    }
}
impl std::error::Error for NotReady {}

/// An unmet precondition at run time (missing input, size mismatch), or a
/// backend failure (OOM, driver error) bubbled up from `lattice-gpu`.
#[derive(Debug)]
pub enum RuntimeError {
    MissingInput { op: String, input: usize },
    SizeMismatch { op: String, expected: String, actual: String },
    Backend(lattice_gpu::GpuError),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::MissingInput { op, input } => {
                write!(f, "operation '{op}' has no storage bound to input {input}")
            }
            RuntimeError::SizeMismatch { op, expected, actual } => {
                write!(f, "operation '{op}': expected size {expected}, got {actual}")
            }
            RuntimeError::Backend(e) => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for RuntimeError {}

impl From<lattice_gpu::GpuError> for RuntimeError {
    fn from(e: lattice_gpu::GpuError) -> Self {
        RuntimeError::Backend(e)
    }
}

/// The engine's unified error type, one variant per §7 engine-level kind.
#[derive(Debug)]
pub enum InferenceError {
    InvalidArgument(InvalidArgument),
    InconsistentModelData(InconsistentModelData),
    NotReady(NotReady),
    Runtime(RuntimeError),
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceError::InvalidArgument(e) => write!(f, "{e}"),
            InferenceError::InconsistentModelData(e) => write!(f, "{e}"),
            InferenceError::NotReady(e) => write!(f, "{e}"),
            InferenceError::Runtime(e) => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for InferenceError {}

impl From<InvalidArgument> for InferenceError {
    fn from(e: InvalidArgument) -> Self {
        InferenceError::InvalidArgument(e)
    }
}
impl From<InconsistentModelData> for InferenceError {
    fn from(e: InconsistentModelData) -> Self {
        InferenceError::InconsistentModelData(e)
    }
}
impl From<NotReady> for InferenceError {
    fn from(e: NotReady) -> Self {
        InferenceError::NotReady(e)
    }
}
impl From<RuntimeError> for InferenceError {
    fn from(e: RuntimeError) -> Self {
        InferenceError::Runtime(e)
    }
}
impl From<lattice_gpu::GpuError> for InferenceError {
    fn from(e: lattice_gpu::GpuError) -> Self {
        InferenceError::Runtime(RuntimeError::Backend(e))
    }
}

pub type Result<T> = std::result::Result<T, InferenceError>;
