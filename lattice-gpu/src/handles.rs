//! Resource handle types (Copy-able, generational).
//!
//! Mirrors the teacher's `webgpu` backend: every resource is addressed by a
//! `slotmap`-generational key wrapped in a small `Copy` struct carrying just
//! enough cached metadata (size, format) to answer cheap queries without
//! touching the `Hub`.

use slotmap::new_key_type;

new_key_type! {
    pub struct BufferKey;
    pub struct TextureKey;
    pub struct ProgramKey;
}

/// GPU texture format. The engine only ever allocates RGBA8 storage
/// textures (§3), but the backend keeps the enum open for framebuffer
/// targets handed in by the out-of-scope bitmap collaborator.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8Unorm,
    R8Unorm,
}

impl TextureFormat {
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm => 4,
            TextureFormat::R8Unorm => 1,
        }
    }
}

bitflags::bitflags! {
    /// Usage flags for a texture, mirroring the teacher's `TextureUsage`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TextureUsage: u32 {
        /// Sampled by a shader.
        const SAMPLED = 1 << 0;
        /// Bound as a framebuffer color attachment.
        const TARGET = 1 << 1;
        /// Bound as a compute shader image (load/store), ES 3.1+ only.
        const STORAGE = 1 << 2;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BufferUsage: u32 {
        /// Host-writable uniform data.
        const UNIFORM = 1 << 0;
        /// Host-readable staging buffer (readback).
        const READBACK = 1 << 1;
        /// Shader storage buffer object, ES 3.1+ only.
        const STORAGE = 1 << 2;
    }
}

/// Texture sampling filter, as exposed to `bind_texture` (§4.1).
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// A three-dimensional extent in texels. Used for texture allocation; the
/// depth component is 1 for ordinary 2D textures.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// Handle to a GPU texture. `Copy`, cheap to pass around; the actual
/// `glow` object lives in the `Hub`.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Texture {
    pub(crate) raw: TextureKey,
    pub format: TextureFormat,
    pub size: Extent,
}

/// Handle to a GPU buffer.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Buffer {
    pub(crate) raw: BufferKey,
    pub size: u64,
}

/// Handle to a compiled, possibly shared, shader program (§4.5).
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Program {
    pub(crate) raw: ProgramKey,
}
