//! Graphics Pipeline Abstraction (§4.1): a single GPU-owning worker that
//! compiles shaders, binds textures, and dispatches draws/computes against
//! a GL ES 2.0/3.1 driver. Windowing, presentation and the concrete
//! multi-backend dispatch the teacher provides are explicitly out of
//! scope here — `gl` is the one backend this crate knows about.

mod error;
mod gl;
mod handles;
mod hub;
mod limits;
mod program_bank;
mod recycle_bin;

pub use error::{GpuError, ShaderCompileError, WrongThreadError};
pub use gl::{CommandEncoder, Context, ContextDesc, NormalizedRect, PassEncoder, PixelRect, PlatformError};
pub use handles::{
    Buffer, BufferUsage, Extent, FilterMode, Program, Texture, TextureFormat, TextureUsage,
};
pub use limits::{GlCapability, LimitKind};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_usage_flags_compose() {
        let usage = TextureUsage::SAMPLED | TextureUsage::TARGET;
        assert!(usage.contains(TextureUsage::SAMPLED));
        assert!(usage.contains(TextureUsage::TARGET));
        assert!(!usage.contains(TextureUsage::STORAGE));
    }

    #[test]
    fn capability_version_headers_differ() {
        assert_ne!(
            GlCapability::Es20.version_header(),
            GlCapability::Es31.version_header()
        );
        assert!(!GlCapability::Es20.supports_compute());
        assert!(GlCapability::Es31.supports_compute());
    }
}
