//! Error types surfaced by the graphics pipeline abstraction.

use std::fmt;

/// A failure raised while compiling a shader program.
#[derive(Debug)]
pub struct ShaderCompileError {
    pub source_name: String,
    pub log: String,
    /// Rendered diagnostic (source snippet + line/column), built with
    /// `codespan-reporting` from the driver's raw info log.
    pub rendered: String,
}

impl fmt::Display for ShaderCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shader '{}' failed to compile:\n{}", self.source_name, self.rendered)
    }
}

impl std::error::Error for ShaderCompileError {}

/// A failure reported by the GL driver (allocation failure, context loss, ...).
#[derive(Debug)]
pub struct GpuError(pub String);

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPU error: {}", self.0)
    }
}

impl std::error::Error for GpuError {}

/// Raised when a GPU-affine call is attempted from a thread other than the
/// context's GPU-owning worker.
#[derive(Debug)]
pub struct WrongThreadError;

impl fmt::Display for WrongThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPU call attempted outside the GPU-owning thread")
    }
}

impl std::error::Error for WrongThreadError {}
