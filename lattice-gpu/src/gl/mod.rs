//! GL ES backend for lattice-gpu.
//!
//! Single concrete backend module standing in for "the underlying OpenGL
//! driver" (§1: modelled abstractly — compiling shaders, binding textures,
//! dispatching). Uses `glow` as the real binding crate, the way the teacher
//! uses `glow` for its own `cfg(gles)` target.

mod command;
mod framebuffer;
mod pipeline;
mod platform;
mod resource;

pub use command::{CommandEncoder, PassEncoder};
pub use platform::PlatformError;

use crate::error::{GpuError, WrongThreadError};
use crate::handles::{Buffer, BufferUsage, Extent, FilterMode, Program, Texture, TextureFormat, TextureUsage};
use crate::hub::{Hub, HubLock};
use crate::limits::{GlCapability, LimitKind, Limits};
use crate::program_bank::ProgramBank;
use crate::recycle_bin::{Deleter, RecycleBin};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::ThreadId;

/// Configuration used at context creation time, following the teacher's
/// `SurfaceConfig`/`ContextDesc`-style descriptor-struct idiom.
#[derive(Clone, Debug, Default)]
pub struct ContextDesc {
    /// Force a specific capability tier instead of probing the driver.
    pub capability_hint: Option<GlCapability>,
    /// Enable extra driver-side validation (debug callback), at a
    /// performance cost.
    pub validation: bool,
}

/// Area of an image expressed in pixels, used by `set_texture_coordinates`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Normalized rectangle sent to the vertex shader so the fragment `(x, y)`
/// of the output samples the requested input rectangle (§4.1).
#[derive(Clone, Copy, Debug, Default)]
pub struct NormalizedRect {
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

/// The single GPU-owning context. All GL-touching methods assert they are
/// called from the thread that created the context (§4.1 ordering
/// guarantee); a dedicated worker (see `lattice::scheduler`) is the only
/// legitimate caller.
pub struct Context {
    gl: glow::Context,
    owner_thread: ThreadId,
    pub(crate) hub: Arc<HubLock>,
    pub(crate) recycle_bin: Arc<RecycleBin>,
    program_bank: Mutex<ProgramBank>,
    limits: Limits,
    capability: GlCapability,
}

// SAFETY: all GL object access is gated by `Context::check_thread`, which
// rejects calls from any thread other than the one that created the
// `glow::Context`. No two threads ever touch `self.gl` concurrently.
unsafe impl Send for Context {}
unsafe impl Sync for Context {}

impl Context {
    /// Creates a context from a GL function loader, to be called exactly
    /// once on the thread that will own the context thereafter (the
    /// scheduler's GPU-affine worker, see `lattice::scheduler::Pool`).
    ///
    /// # Safety
    /// `loader` must return valid GL function pointers for a current
    /// context on the calling thread.
    pub unsafe fn init(
        desc: &ContextDesc,
        loader: impl FnMut(&str) -> *const std::ffi::c_void,
    ) -> Result<Self, PlatformError> {
        platform::create_context(desc, loader)
    }

    fn check_thread(&self) -> Result<(), WrongThreadError> {
        if std::thread::current().id() == self.owner_thread {
            Ok(())
        } else {
            Err(WrongThreadError)
        }
    }

    pub fn capability(&self) -> GlCapability {
        self.capability
    }

    pub fn get_limit(&self, kind: LimitKind) -> u32 {
        self.limits.get(kind)
    }

    /// Creates a 2D texture of the given size/format/usage. New textures
    /// start dirty (§3: "new texture needs a clear before first use").
    pub fn create_texture(
        &self,
        size: Extent,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Result<Texture, GpuError> {
        self.check_thread().map_err(|e| GpuError(e.to_string()))?;
        resource::create_texture(self, size, format, usage)
    }

    pub fn destroy_texture(&self, texture: Texture) {
        // Droppable from any thread: enqueue, the GPU thread reaps it.
        self.recycle_bin.enqueue(Deleter::Texture(texture.raw));
    }

    pub fn create_buffer(&self, size: u64, usage: BufferUsage) -> Result<Buffer, GpuError> {
        self.check_thread().map_err(|e| GpuError(e.to_string()))?;
        resource::create_buffer(self, size, usage)
    }

    pub fn destroy_buffer(&self, buffer: Buffer) {
        self.recycle_bin.enqueue(Deleter::Buffer(buffer.raw));
    }

    /// Compiles GLSL source into a program, consulting the program bank
    /// first (§4.5). Returns a ref-counted handle; call `release_program`
    /// when done with it.
    pub fn compile(&self, source: &str, label: &str) -> Result<Program, crate::error::ShaderCompileError> {
        if let Some(existing) = self.program_bank.lock().unwrap().find(source) {
            self.bump_refcount(existing);
            return Ok(existing);
        }
        let program = pipeline::compile(self, source, label)?;
        self.program_bank.lock().unwrap().insert(source, program);
        Ok(program)
    }

    fn bump_refcount(&self, program: Program) {
        if let Ok(mut hub) = self.hub.write() {
            if let Some(entry) = hub.programs.get_mut(program.raw) {
                entry.refcount += 1;
            }
        }
    }

    /// Drops a reference to a banked program; destroys it on this (GPU)
    /// thread when the count reaches zero.
    pub fn release_program(&self, program: Program) {
        let should_destroy = {
            let mut hub = self.hub.write().unwrap();
            match hub.programs.get_mut(program.raw) {
                Some(entry) => {
                    entry.refcount = entry.refcount.saturating_sub(1);
                    entry.refcount == 0
                }
                None => false,
            }
        };
        if should_destroy {
            self.program_bank.lock().unwrap().forget(program);
            if let Ok(mut hub) = self.hub.write() {
                if let Some(entry) = hub.programs.remove(program.raw) {
                    unsafe {
                        use glow::HasContext;
                        self.gl.delete_program(entry.raw);
                    }
                }
            }
        }
    }

    /// Reads a texture's pixels back to host memory (§6 "Operation
    /// outputs as host vectors"). Used by the inference runner to fill
    /// user-output vectors once `flush()` has drained the GPU pipeline.
    pub fn read_texture(&self, texture: Texture) -> Result<Vec<u8>, GpuError> {
        self.check_thread().map_err(|e| GpuError(e.to_string()))?;
        resource::read_texture(self, texture)
    }

    /// Binds a texture to a sampling unit with the given filter (§4.1).
    pub fn bind_texture(&self, texture: Texture, unit: u32, filter: FilterMode) -> Result<(), GpuError> {
        self.check_thread().map_err(|e| GpuError(e.to_string()))?;
        resource::bind_texture(self, texture, unit, filter)
    }

    /// Sets the draw framebuffer to the given texture (or, via the
    /// external-texture boundary, a bitmap handed in by the host app).
    pub fn bind_output(&self, texture: Texture) -> Result<(), GpuError> {
        self.check_thread().map_err(|e| GpuError(e.to_string()))?;
        framebuffer::bind_output(self, texture)
    }

    /// Computes the normalized source rectangle so the fragment `(x, y)`
    /// of an `output_size`-sized framebuffer samples `area` of a texture
    /// sized `texture_size` (§4.1).
    pub fn set_texture_coordinates(
        &self,
        area_in_pixels: PixelRect,
        texture_size_in_pixels: Extent,
        output_size_in_pixels: Extent,
    ) -> NormalizedRect {
        let _ = output_size_in_pixels;
        let tw = texture_size_in_pixels.width.max(1) as f32;
        let th = texture_size_in_pixels.height.max(1) as f32;
        NormalizedRect {
            u0: area_in_pixels.x as f32 / tw,
            v0: area_in_pixels.y as f32 / th,
            u1: (area_in_pixels.x + area_in_pixels.width) as f32 / tw,
            v1: (area_in_pixels.y + area_in_pixels.height) as f32 / th,
        }
    }

    /// Barrier: drains the recycle bin and issues a GL flush.
    pub fn flush(&self) -> Result<(), GpuError> {
        self.check_thread().map_err(|e| GpuError(e.to_string()))?;
        self.drain_recycle_bin();
        unsafe {
            use glow::HasContext;
            self.gl.flush();
        }
        Ok(())
    }

    pub(crate) fn drain_recycle_bin(&self) {
        use glow::HasContext;
        let pending = self.recycle_bin.drain();
        if pending.is_empty() {
            return;
        }
        let mut hub = self.hub.write().unwrap();
        for deleter in pending {
            match deleter {
                Deleter::Texture(key) => {
                    if let Some(entry) = hub.textures.remove(key) {
                        unsafe {
                            if let Some(fbo) = entry.framebuffer {
                                self.gl.delete_framebuffer(fbo);
                            }
                            self.gl.delete_texture(entry.raw);
                        }
                    }
                }
                Deleter::Buffer(key) => {
                    if let Some(entry) = hub.buffers.remove(key) {
                        unsafe { self.gl.delete_buffer(entry.raw) };
                    }
                }
                Deleter::Program(key) => {
                    if let Some(entry) = hub.programs.remove(key) {
                        unsafe { self.gl.delete_program(entry.raw) };
                    }
                }
            }
        }
    }

    pub(crate) fn gl(&self) -> &glow::Context {
        &self.gl
    }

    pub(crate) fn hub(&self) -> &RwLock<Hub> {
        &self.hub
    }
}
