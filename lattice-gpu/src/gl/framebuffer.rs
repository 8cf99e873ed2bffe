//! Framebuffer binding (§4.1 `bind_output`).
//!
//! Every operation's output is a texture (or, via the external-texture
//! boundary, a caller-owned bitmap) bound as a framebuffer color
//! attachment — there is never a presentable swapchain surface in this
//! engine (§1 scope), so this replaces the teacher's `surface.rs`
//! swapchain-configuration logic with a per-texture framebuffer cached in
//! the texture's own `Hub` entry.

use super::Context;
use crate::error::GpuError;
use crate::handles::Texture;
use glow::HasContext;

pub(super) fn bind_output(ctx: &Context, texture: Texture) -> Result<(), GpuError> {
    let gl = ctx.gl();
    let fbo = {
        let mut hub = ctx.hub.write().unwrap();
        let entry = hub
            .textures
            .get_mut(texture.raw)
            .ok_or_else(|| GpuError("bind_output: stale texture handle".into()))?;
        match entry.framebuffer {
            Some(fbo) => fbo,
            None => {
                let fbo = unsafe {
                    let fbo = gl
                        .create_framebuffer()
                        .map_err(|e| GpuError(format!("create_framebuffer: {e}")))?;
                    gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
                    gl.framebuffer_texture_2d(
                        glow::FRAMEBUFFER,
                        glow::COLOR_ATTACHMENT0,
                        glow::TEXTURE_2D,
                        Some(entry.raw),
                        0,
                    );
                    let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
                    if status != glow::FRAMEBUFFER_COMPLETE {
                        gl.delete_framebuffer(fbo);
                        return Err(GpuError(format!("framebuffer incomplete: 0x{status:x}")));
                    }
                    fbo
                };
                entry.framebuffer = Some(fbo);
                fbo
            }
        }
    };
    unsafe {
        gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
        gl.viewport(0, 0, texture.size.width as i32, texture.size.height.max(1) as i32);
    }
    Ok(())
}
