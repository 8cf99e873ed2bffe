//! The `Hub`: central storage for all GPU resources (§4.1, §4.5).
//!
//! Follows the teacher's concurrency model: command recording and texture
//! binding take a read lock (high frequency, concurrent with themselves),
//! resource creation/destruction takes a write lock (low frequency,
//! performed only from the GPU-owning thread).

use crate::handles::{BufferKey, ProgramKey, TextureKey};
use slotmap::SlotMap;
use std::sync::RwLock;

pub(crate) struct TextureEntry {
    pub(crate) raw: glow::Texture,
    /// New textures need a clear before first use (§3 dirty flag).
    pub(crate) dirty: bool,
    /// Framebuffer object bound to this texture, created lazily the first
    /// time it is used as an output (§4.1 `bind_output`).
    pub(crate) framebuffer: Option<glow::Framebuffer>,
}

pub(crate) struct BufferEntry {
    pub(crate) raw: glow::Buffer,
    /// Host shadow memory for buffers the CPU reads back (e.g. Dense
    /// bias vectors, Softmax input).
    pub(crate) shadow: Option<Box<[u8]>>,
}

pub(crate) struct ProgramEntry {
    pub(crate) raw: glow::Program,
    pub(crate) source_hash: u64,
    pub(crate) refcount: u32,
}

pub(crate) struct Hub {
    pub(crate) textures: SlotMap<TextureKey, TextureEntry>,
    pub(crate) buffers: SlotMap<BufferKey, BufferEntry>,
    pub(crate) programs: SlotMap<ProgramKey, ProgramEntry>,
}

impl Hub {
    pub(crate) fn new() -> Self {
        Self {
            textures: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            programs: SlotMap::with_key(),
        }
    }
}

pub(crate) type HubLock = RwLock<Hub>;
