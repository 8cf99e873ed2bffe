//! GPU-backed neural-network inference engine (§1–§9): task scheduler,
//! chunk store, textual model serialization, the `InferenceRunner`, and
//! the boundary traits the out-of-scope bitmap/scene-graph collaborator
//! implements against.
//!
//! Layered on `lattice-gpu` (the graphics pipeline abstraction) and
//! `lattice-nnets` (the domain engine: `Size`, `Storage`, the shader
//! emitter, operations, `Model`).

pub mod chunk_store;
pub mod config;
pub mod error;
pub mod external;
pub mod runner;
pub mod scheduler;
pub mod serialization;

pub use chunk_store::{ChunkStore, ChunkWriter, MODEL_LISTING_CHUNK_ID};
pub use config::{ModelConfig, RunnerConfig};
pub use error::{Error, Result, TaskListener};
pub use external::{BitmapContentLock, ExternalBitmap, ExternalTextureSource, ReadLockGuard};
pub use runner::{InferenceRunner, OpRef};
pub use scheduler::{AbstractTask, Device, JobId, Pool, ThreadContext};
pub use serialization::{deserialize_model, serialize_model};

pub use lattice_gpu::{Context, ContextDesc};
pub use lattice_nnets::{Model, OpKey};
