//! Operations (§4.4): Conv2D, Pooling2D, Dense, ImageSampler, Softmax.
//!
//! Each operation implements the `Operation` trait, which the allocator
//! (`crate::model::allocator`) consults during `prepare()` and the model
//! consults during `execute()`. Operations never touch the scheduler
//! directly — that wiring lives in the `lattice` root crate.

pub mod conv2d;
pub mod dense;
pub mod image_sampler;
pub mod pooling2d;
pub mod softmax;

pub use conv2d::{Conv2D, Conv2DParams};
pub use dense::{Dense, DenseParams};
pub use image_sampler::{ImageSampler, ImageSamplerParams, Rotation};
pub use pooling2d::{PoolOp, Pooling2D, Pooling2DParams};
pub use softmax::Softmax;

use crate::emitter::Activation;
pub(crate) use crate::emitter::InputBinding;
use crate::error::Result;
use crate::size::Size;
use crate::storage::{Storage, View};
use lattice_gpu::Context;

/// Where an operation's weights/biases come from (§3 "Chunk store").
/// `prepare` looks up `<op-name>/w`, `<op-name>/b` by well-known suffix.
pub trait ChunkSource {
    fn chunk(&self, id: &str) -> Option<&[u8]>;
}

/// What an operation's input/output slot is bound to after
/// `Model::prepare` has materialized connections (§4.2 "Connection
/// materialization").
pub enum Binding<'a> {
    Storage(&'a Storage),
    View(View),
    /// An external texture handed in across the `ExternalTextureSource`
    /// boundary (§6), identified by an opaque backend handle.
    ExternalTexture(lattice_gpu::Texture),
    Vector(&'a [f32]),
}

/// Minimum/maximum channel counts an operation samples from a given
/// input in one fragment invocation, used for depth-capping (§4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampledChannels {
    pub min: u32,
    pub max: u32,
}

/// The contract every operation implements so the allocator can compute
/// sizes, paddings and depth-capping budgets without knowing the concrete
/// operation type (§4.2, §4.4).
pub trait Operation: std::fmt::Debug {
    fn name(&self) -> &str;

    fn input_count(&self) -> usize;

    fn output_count(&self) -> usize {
        1
    }

    fn accepts_storage_input(&self, input: usize) -> bool;

    fn accepts_texture_input(&self, _input: usize) -> bool {
        false
    }

    fn accepts_vector_input(&self, _input: usize) -> bool {
        false
    }

    fn accepts_storage_output(&self, output: usize) -> bool;

    fn accepts_vector_output(&self, _output: usize) -> bool {
        false
    }

    /// Derives the logical size of `output` from the sizes already bound
    /// to this operation's inputs (§3 "derivation of output size").
    fn get_output_size(&self, output: usize, input_sizes: &[Size]) -> Size;

    /// Spatial padding this operation requires of the storage bound to
    /// `input` (§4.2 step 1: `P = max over all sinks`).
    fn get_input_padding(&self, input: usize) -> u32 {
        let _ = input;
        0
    }

    /// Channel counts this operation samples from `input` in one
    /// invocation; used to compute depth-capping reserves (§4.2).
    fn get_sampled_channels(&self, input: usize) -> SampledChannels {
        let _ = input;
        SampledChannels { min: 4, max: 4 }
    }

    /// Compiles shaders and resolves weights/biases from `chunks`. Called
    /// once per op during the first `Model::prepare`.
    fn prepare(&mut self, gpu: &Context, chunks: &dyn ChunkSource) -> Result<()>;

    /// Binds inputs/output and draws/dispatches (§4.4 "Execution").
    fn execute(&mut self, gpu: &Context, inputs: &[Binding<'_>], output: &Storage) -> Result<()>;

    /// Exposes this operation's concrete `Softmax` view, if it is one
    /// (§4.4.5). `Model::execute` uses this to drive the CPU-only
    /// `before_execute`/`execute_slice`/`after_execute` protocol instead of
    /// the generic GPU-bound `execute` above, which Softmax never
    /// implements.
    fn as_softmax(&self) -> Option<&softmax::Softmax> {
        None
    }

    /// Downcast hooks for the textual model serializer (§6), which needs
    /// each operation's concrete, type-specific parameters back out of
    /// the graph (§9 "tagged-variant Operation trait").
    fn as_conv2d(&self) -> Option<&conv2d::Conv2D> {
        None
    }
    fn as_pooling2d(&self) -> Option<&pooling2d::Pooling2D> {
        None
    }
    fn as_dense(&self) -> Option<&dense::Dense> {
        None
    }
    fn as_image_sampler(&self) -> Option<&image_sampler::ImageSampler> {
        None
    }
}

pub fn activation_from_str(s: &str) -> Option<Activation> {
    match s {
        "default" => Some(Activation::Default),
        "brelu6" => Some(Activation::Brelu6),
        "sigmoid_like" => Some(Activation::SigmoidLike),
        _ => None,
    }
}

pub fn activation_to_str(activation: Activation) -> &'static str {
    match activation {
        Activation::Default => "default",
        Activation::Brelu6 => "brelu6",
        Activation::SigmoidLike => "sigmoid_like",
    }
}
