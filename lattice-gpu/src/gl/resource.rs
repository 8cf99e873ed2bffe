//! Texture and buffer resource creation for the GL ES backend.

use super::Context;
use crate::error::GpuError;
use crate::handles::{Buffer, Extent, FilterMode, Texture, TextureFormat, TextureUsage};
use crate::hub::{BufferEntry, TextureEntry};
use glow::HasContext;

pub(super) fn map_texture_format(format: TextureFormat) -> (u32, u32, u32) {
    // (internal_format, format, type)
    match format {
        TextureFormat::Rgba8Unorm => (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
        TextureFormat::R8Unorm => (glow::R8, glow::RED, glow::UNSIGNED_BYTE),
    }
}

fn map_filter(filter: FilterMode) -> i32 {
    match filter {
        FilterMode::Nearest => glow::NEAREST as i32,
        FilterMode::Linear => glow::LINEAR as i32,
    }
}

pub(super) fn create_texture(
    ctx: &Context,
    size: Extent,
    format: TextureFormat,
    usage: TextureUsage,
) -> Result<Texture, GpuError> {
    let gl = ctx.gl();
    let (internal_format, data_format, data_type) = map_texture_format(format);
    let raw = unsafe {
        let tex = gl
            .create_texture()
            .map_err(|e| GpuError(format!("create_texture: {e}")))?;
        gl.bind_texture(glow::TEXTURE_2D, Some(tex));
        gl.tex_image_2d(
            glow::TEXTURE_2D,
            0,
            internal_format as i32,
            size.width as i32,
            size.height.max(1) as i32,
            0,
            data_format,
            data_type,
            glow::PixelUnpackData::Slice(None),
        );
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
        tex
    };
    let _ = usage;
    let key = ctx
        .hub
        .write()
        .unwrap()
        .textures
        .insert(TextureEntry { raw, dirty: true, framebuffer: None });
    Ok(Texture { raw: key, format, size })
}

pub(super) fn create_buffer(ctx: &Context, size: u64, usage: crate::handles::BufferUsage) -> Result<Buffer, GpuError> {
    let gl = ctx.gl();
    let raw = unsafe {
        let buf = gl
            .create_buffer()
            .map_err(|e| GpuError(format!("create_buffer: {e}")))?;
        let target = if usage.contains(crate::handles::BufferUsage::STORAGE) {
            glow::SHADER_STORAGE_BUFFER
        } else {
            glow::UNIFORM_BUFFER
        };
        gl.bind_buffer(target, Some(buf));
        gl.buffer_data_size(target, size as i32, glow::DYNAMIC_DRAW);
        buf
    };
    let shadow = if usage.contains(crate::handles::BufferUsage::READBACK) {
        Some(vec![0u8; size as usize].into_boxed_slice())
    } else {
        None
    };
    let key = ctx
        .hub
        .write()
        .unwrap()
        .buffers
        .insert(BufferEntry { raw, shadow });
    Ok(Buffer { raw: key, size })
}

/// Reads a texture's pixels back to the host via its framebuffer (§6
/// "Operation outputs as host vectors"). Always returns tightly-packed
/// rows in the texture's native format.
pub(super) fn read_texture(ctx: &Context, texture: Texture) -> Result<Vec<u8>, GpuError> {
    super::framebuffer::bind_output(ctx, texture)?;
    let gl = ctx.gl();
    let (_, data_format, data_type) = map_texture_format(texture.format);
    let row_bytes = texture.size.width as usize * texture.format.bytes_per_texel() as usize;
    let mut pixels = vec![0u8; row_bytes * texture.size.height.max(1) as usize];
    unsafe {
        gl.read_pixels(
            0,
            0,
            texture.size.width as i32,
            texture.size.height.max(1) as i32,
            data_format,
            data_type,
            glow::PixelPackData::Slice(Some(&mut pixels)),
        );
    }
    Ok(pixels)
}

pub(super) fn bind_texture(ctx: &Context, texture: Texture, unit: u32, filter: FilterMode) -> Result<(), GpuError> {
    let hub = ctx.hub.read().unwrap();
    let entry = hub
        .textures
        .get(texture.raw)
        .ok_or_else(|| GpuError("bind_texture: stale handle".into()))?;
    let gl = ctx.gl();
    unsafe {
        gl.active_texture(glow::TEXTURE0 + unit);
        gl.bind_texture(glow::TEXTURE_2D, Some(entry.raw));
        let f = map_filter(filter);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, f);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, f);
    }
    Ok(())
}
