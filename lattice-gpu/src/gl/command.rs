//! Draw/dispatch command encoding for the GL ES backend.
//!
//! Unlike the teacher's deferred WebGPU command buffers, GL ES draws are
//! issued immediately against current bindings — there is no separate
//! submit step, only the `Context::flush` barrier (§5). `CommandEncoder`
//! still exists as the public surface operations program against, so the
//! call shape mirrors the teacher's `PassEncoder` even though recording is
//! immediate.

use super::Context;
use crate::error::GpuError;
use crate::handles::Program;
use glow::HasContext;

/// Issues draw/dispatch calls against the context the operations were
/// prepared with. One `CommandEncoder` is handed to each operation's
/// `execute` for the duration of a single run (§4.4).
pub struct CommandEncoder<'a> {
    ctx: &'a Context,
}

impl<'a> CommandEncoder<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// Begins a render pass: binds `program` and returns a `PassEncoder`
    /// to set uniforms and draw with it.
    pub fn render(&mut self, program: Program) -> Result<PassEncoder<'_>, GpuError> {
        let hub = self.ctx.hub.read().unwrap();
        let entry = hub
            .programs
            .get(program.raw)
            .ok_or_else(|| GpuError("render: stale program handle".into()))?;
        unsafe {
            self.ctx.gl().use_program(Some(entry.raw));
        }
        Ok(PassEncoder { ctx: self.ctx, program })
    }
}

/// Active render pass: set uniforms, then draw the full output rectangle
/// (§4.4.1 step 4: "`program.blend()` draws the full output rectangle").
pub struct PassEncoder<'a> {
    ctx: &'a Context,
    program: Program,
}

impl<'a> PassEncoder<'a> {
    fn location(&self, gl: &glow::Context, raw_program: glow::Program, name: &str) -> Option<glow::UniformLocation> {
        unsafe { gl.get_uniform_location(raw_program, name) }
    }

    fn with_program<R>(&self, f: impl FnOnce(&glow::Context, glow::Program) -> R) -> Option<R> {
        let hub = self.ctx.hub.read().unwrap();
        hub.programs.get(self.program.raw).map(|entry| f(self.ctx.gl(), entry.raw))
    }

    pub fn set_uniform_1i(&self, name: &str, value: i32) {
        self.with_program(|gl, raw| {
            if let Some(loc) = self.location(gl, raw, name) {
                unsafe { gl.uniform_1_i32(Some(&loc), value) };
            }
        });
    }

    pub fn set_uniform_2f(&self, name: &str, value: [f32; 2]) {
        self.with_program(|gl, raw| {
            if let Some(loc) = self.location(gl, raw, name) {
                unsafe { gl.uniform_2_f32(Some(&loc), value[0], value[1]) };
            }
        });
    }

    pub fn set_uniform_2f_array(&self, name: &str, values: &[[f32; 2]]) {
        self.with_program(|gl, raw| {
            if let Some(loc) = self.location(gl, raw, name) {
                let flat: Vec<f32> = values.iter().flatten().copied().collect();
                unsafe { gl.uniform_2_f32_slice(Some(&loc), &flat) };
            }
        });
    }

    pub fn set_uniform_3f_array(&self, name: &str, values: &[[f32; 3]]) {
        self.with_program(|gl, raw| {
            if let Some(loc) = self.location(gl, raw, name) {
                let flat: Vec<f32> = values.iter().flatten().copied().collect();
                unsafe { gl.uniform_3_f32_slice(Some(&loc), &flat) };
            }
        });
    }

    pub fn set_uniform_4f_array(&self, name: &str, values: &[[f32; 4]]) {
        self.with_program(|gl, raw| {
            if let Some(loc) = self.location(gl, raw, name) {
                let flat: Vec<f32> = values.iter().flatten().copied().collect();
                unsafe { gl.uniform_4_f32_slice(Some(&loc), &flat) };
            }
        });
    }

    pub fn set_uniform_mat4_array(&self, name: &str, values: &[[f32; 16]]) {
        self.with_program(|gl, raw| {
            if let Some(loc) = self.location(gl, raw, name) {
                let flat: Vec<f32> = values.iter().flatten().copied().collect();
                unsafe { gl.uniform_matrix_4_f32_slice(Some(&loc), false, &flat) };
            }
        });
    }

    /// Draws a full-screen rectangle (two triangles covering the bound
    /// output's framebuffer), the way every operation's fragment program
    /// is invoked (§4.4: "draws the full output rectangle").
    pub fn blend(&self) {
        unsafe {
            self.ctx.gl().draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
        }
    }

    /// ES 3.1+ compute dispatch, used by operations opting into compute
    /// shaders instead of fragment programs (§4.1 `LOCAL_GROUPS_*`).
    pub fn dispatch(&self, groups_x: u32, groups_y: u32, groups_z: u32) {
        unsafe {
            self.ctx.gl().dispatch_compute(groups_x, groups_y, groups_z);
            self.ctx.gl().memory_barrier(glow::SHADER_IMAGE_ACCESS_BARRIER_BIT);
        }
    }
}
