//! `Storage`: the activation container (§3, §4.2).
//!
//! A logical (W, H, D) tensor packed into a set of RGBA8 textures with
//! spatial padding and spatial packing factors chosen so that the whole
//! storage can be sampled in a single shader within the driver's
//! texture-unit budget.

pub mod view;

use crate::size::Size;
use lattice_gpu::{Context, Extent, Texture, TextureFormat, TextureUsage};

pub use view::View;

slotmap::new_key_type! {
    /// Key into a `Model`'s storage arena (§3 "Model... owns the Storages
    /// it allocates").
    pub struct StorageKey;
}

bitflags::bitflags! {
    /// Where a storage's bytes currently live (§3: "residency flags").
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Residency: u8 {
        const CPU = 1 << 0;
        const GPU = 1 << 1;
    }
}

/// Spatial packing factors chosen at allocation (§3, §4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Packing {
    pub px: u32,
    pub py: u32,
}

impl Packing {
    pub fn unpacked() -> Self {
        Self { px: 1, py: 1 }
    }
}

/// The activation container (§3). `N = ceil(D / (4·pX·pY))` RGBA8
/// textures, each sized `((W+pad)·pX + pad, (H+pad)·pY + pad)`.
pub struct Storage {
    size: Size,
    pad: u32,
    packing: Packing,
    /// Extra channel slots reserved for a co-sampled storage's channels to
    /// be packed alongside this one (§4.2 depth capping).
    reserved_channels: u32,
    textures: Vec<Texture>,
    dirty: Vec<bool>,
    residency: Residency,
}

impl Storage {
    /// Channel quads this storage logically holds (`D/4`), not counting
    /// reserved slots.
    pub fn channel_quads(&self) -> u32 {
        self.size.channel_quads()
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn pad(&self) -> u32 {
        self.pad
    }

    pub fn packing(&self) -> Packing {
        self.packing
    }

    pub fn reserved_channels(&self) -> u32 {
        self.reserved_channels
    }

    pub fn textures(&self) -> &[Texture] {
        &self.textures
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn is_dirty(&self, texture_index: usize) -> bool {
        self.dirty[texture_index]
    }

    pub fn mark_clean(&mut self, texture_index: usize) {
        self.dirty[texture_index] = false;
    }

    pub fn residency(&self) -> Residency {
        self.residency
    }

    pub fn set_residency(&mut self, residency: Residency) {
        self.residency = residency;
    }

    /// Whether this is a "flat" storage: a (1, 1, D) vector packed as a
    /// column of quads in a single texture (GLOSSARY).
    pub fn is_flat(&self) -> bool {
        self.size.width == 1 && self.size.height == 1
    }

    /// Physical size in texels of one texture: `((W+pad)·pX + pad,
    /// (H+pad)·pY + pad)` (§3).
    pub fn texture_extent(&self) -> Extent {
        texture_extent(self.size, self.pad, self.packing)
    }

    /// The (texture index, origin-in-texels) pair a given channel quad
    /// maps to (§3: "per-channel-quad origin computable from
    /// (pX, pY, pad, W, H)").
    pub fn quad_location(&self, quad_index: u32) -> (usize, (u32, u32)) {
        quad_location(self.size, self.pad, self.packing, quad_index)
    }

    /// Number of RGBA8 textures required to hold `depth` (plus any
    /// reserved channels) at the given packing factors
    /// (`N = ceil(D / (4·pX·pY))`, §3).
    pub fn texture_count_for(depth: u32, reserved_channels: u32, packing: Packing) -> usize {
        let quads = (depth + reserved_channels).div_ceil(4);
        (quads as usize).div_ceil((packing.px * packing.py) as usize).max(1)
    }

    /// Chooses `(pX, pY)` so that `ceil(D' / T)` textures fit the GPU's
    /// per-shader texture-unit budget, where `T = TEXTURE_IMAGE_UNITS · 4`
    /// and `D' = D + reserved_channels` (§4.2).
    pub fn choose_packing(depth: u32, reserved_channels: u32, texture_image_units: u32) -> Packing {
        let t = texture_image_units.max(1) * 4;
        let d_prime = depth + reserved_channels;
        if d_prime <= t {
            return Packing::unpacked();
        }
        let factor = d_prime.div_ceil(t);
        let px = largest_divisor_at_most_sqrt(factor);
        let py = factor.div_ceil(px);
        Packing { px, py }
    }

    /// Allocates a 2D storage on the GPU (§4.2 `allocate`).
    pub fn allocate(
        gpu: &Context,
        size: Size,
        pad: u32,
        reserved_channels: u32,
    ) -> Result<Self, lattice_gpu::GpuError> {
        debug_assert!(size.is_valid_depth());
        let packing = Self::choose_packing(size.depth, reserved_channels, gpu.get_limit(lattice_gpu::LimitKind::TextureImageUnits));
        let extent = texture_extent(size, pad, packing);
        let n = Self::texture_count_for(size.depth, reserved_channels, packing);
        let mut textures = Vec::with_capacity(n);
        for _ in 0..n {
            textures.push(gpu.create_texture(extent, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED | TextureUsage::TARGET)?);
        }
        Ok(Self {
            size,
            pad,
            packing,
            reserved_channels,
            dirty: vec![true; textures.len()],
            textures,
            residency: Residency::GPU,
        })
    }

    /// Allocates a single-texture, column-stacked "flat" storage for use
    /// as Dense input (§4.2 `allocate_flat`, GLOSSARY "Flat storage").
    pub fn allocate_flat(gpu: &Context, depth: u32) -> Result<Self, lattice_gpu::GpuError> {
        let size = Size::new(1, 1, depth);
        let quads = size.channel_quads();
        let extent = Extent { width: 1, height: quads.max(1), depth: 1 };
        let texture = gpu.create_texture(extent, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED | TextureUsage::TARGET)?;
        Ok(Self {
            size,
            pad: 0,
            packing: Packing::unpacked(),
            reserved_channels: 0,
            dirty: vec![true],
            textures: vec![texture],
            residency: Residency::GPU,
        })
    }

    /// Reads the whole storage back to host memory, normalized to `[0, 1]`
    /// (§6 "Operation outputs as host vectors"). Flat storages come back
    /// as a plain `D`-length vector; ordinary 2D storages come back
    /// row-major `(H, W, C)`.
    pub fn read_to_host(&self, gpu: &Context) -> Result<Vec<f32>, lattice_gpu::GpuError> {
        let extent = self.texture_extent();
        let row_stride = extent.width as usize * 4;
        let mut texture_pixels = Vec::with_capacity(self.textures.len());
        for &texture in &self.textures {
            texture_pixels.push(gpu.read_texture(texture)?);
        }
        let (w, h, d) = (self.size.width, self.size.height, self.size.depth);
        let flat = self.is_flat();
        let mut out = vec![0f32; (w * h * d) as usize];
        for quad in 0..self.channel_quads() {
            let (tex_index, (ox, oy)) = self.quad_location(quad);
            let pixels = &texture_pixels[tex_index];
            for y in 0..h {
                for x in 0..w {
                    let offset = ((oy + y) as usize * row_stride) + ((ox + x) as usize * 4);
                    let texel = &pixels[offset..offset + 4];
                    for c in 0..4 {
                        let channel = quad * 4 + c;
                        if channel >= d {
                            break;
                        }
                        let out_index = if flat {
                            channel as usize
                        } else {
                            (y as usize * w as usize + x as usize) * d as usize + channel as usize
                        };
                        out[out_index] = texel[c as usize] as f32 / 255.0;
                    }
                }
            }
        }
        Ok(out)
    }

    /// Destroys the storage's textures via the GPU's deferred recycle bin
    /// (§3 lifecycle).
    pub fn destroy(self, gpu: &Context) {
        for texture in self.textures {
            gpu.destroy_texture(texture);
        }
    }
}

fn texture_extent(size: Size, pad: u32, packing: Packing) -> Extent {
    Extent {
        width: (size.width + pad) * packing.px + pad,
        height: (size.height + pad) * packing.py + pad,
        depth: 1,
    }
}

fn quad_location(size: Size, pad: u32, packing: Packing, quad_index: u32) -> (usize, (u32, u32)) {
    let per_texture = packing.px * packing.py;
    let texture_index = (quad_index / per_texture) as usize;
    let slot = quad_index % per_texture;
    let col = slot % packing.px;
    let row = slot / packing.px;
    let x = pad + col * (size.width + pad);
    let y = pad + row * (size.height + pad);
    (texture_index, (x, y))
}

fn largest_divisor_at_most_sqrt(n: u32) -> u32 {
    let limit = (n as f64).sqrt() as u32;
    for d in (1..=limit.max(1)).rev() {
        if n % d == 0 {
            return d;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_stays_unpacked_under_budget() {
        let packing = Storage::choose_packing(16, 0, 8);
        assert_eq!(packing, Packing::unpacked());
    }

    #[test]
    fn packing_factors_when_over_budget() {
        // T = 8*4 = 32, D' = 128 -> factor = 4 -> px=2, py=2
        let packing = Storage::choose_packing(128, 0, 8);
        assert_eq!(packing, Packing { px: 2, py: 2 });
    }

    #[test]
    fn quad_location_maps_within_texture_when_unpacked() {
        let size = Size::new(16, 16, 16);
        let (tex, (x, y)) = quad_location(size, 2, Packing::unpacked(), 3);
        assert_eq!(tex, 3);
        assert_eq!((x, y), (2, 2));
    }

    #[test]
    fn texture_count_matches_quads_over_packing() {
        let packing = Packing { px: 2, py: 2 };
        assert_eq!(Storage::texture_count_for(64, 0, packing), 4);
    }
}
