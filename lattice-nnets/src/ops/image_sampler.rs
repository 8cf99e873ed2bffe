//! ImageSampler (§4.4.4): crop/rotate/filter an external texture into a
//! fixed-size output texture.

use super::{Binding, ChunkSource, Operation, SampledChannels};
use crate::emitter::Emitter;
use crate::error::RuntimeError;
use crate::size::Size;
use crate::storage::Storage;
use lattice_gpu::{Context, Extent, FilterMode, PixelRect, Program};

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Rotation {
    None,
    Quarter,
    Half,
    ThreeQuarters,
}

#[derive(Debug, Clone)]
pub struct ImageSamplerParams {
    pub output_width: u32,
    pub output_height: u32,
    pub center_crop: bool,
    pub linear_interp: bool,
    pub rotation: Rotation,
}

pub struct ImageSampler {
    name: String,
    params: ImageSamplerParams,
    program: Option<Program>,
}

impl std::fmt::Debug for ImageSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSampler").field("name", &self.name).field("params", &self.params).finish()
    }
}

impl ImageSampler {
    pub fn params(&self) -> &ImageSamplerParams {
        &self.params
    }

    pub fn new(name: impl Into<String>, params: ImageSamplerParams) -> Self {
        Self { name: name.into(), params, program: None }
    }

    /// Computes the crop rectangle (in source pixels) that preserves
    /// aspect ratio when `center_crop` is set (§4.4.4).
    pub fn crop_rect(&self, source_width: u32, source_height: u32) -> PixelRect {
        if !self.params.center_crop {
            return PixelRect { x: 0, y: 0, width: source_width, height: source_height };
        }
        let target_aspect = self.params.output_width as f32 / self.params.output_height.max(1) as f32;
        let source_aspect = source_width as f32 / source_height.max(1) as f32;
        if source_aspect > target_aspect {
            let width = (source_height as f32 * target_aspect).round() as u32;
            PixelRect { x: (source_width.saturating_sub(width)) / 2, y: 0, width, height: source_height }
        } else {
            let height = (source_width as f32 / target_aspect).round() as u32;
            PixelRect { x: 0, y: (source_height.saturating_sub(height)) / 2, width: source_width, height }
        }
    }

    fn emit_source(&self, gpu: &Context) -> String {
        let mut emitter = Emitter::new(gpu.capability());
        emitter.input(&super::InputBinding { name: "u_input".into(), unit: 0 });
        emitter.uniform("vec2 u_crop_offset");
        emitter.uniform("vec2 u_crop_scale");
        emitter.declare("varying vec2 v_uv;");
        emitter.statement("vec2 cropped_uv = u_crop_offset + v_uv * u_crop_scale;");
        let rotated_uv = match self.params.rotation {
            Rotation::None => "cropped_uv".to_string(),
            Rotation::Quarter => "vec2(cropped_uv.y, 1.0 - cropped_uv.x)".to_string(),
            Rotation::Half => "vec2(1.0 - cropped_uv.x, 1.0 - cropped_uv.y)".to_string(),
            Rotation::ThreeQuarters => "vec2(1.0 - cropped_uv.y, cropped_uv.x)".to_string(),
        };
        emitter.finish_fragment(&format!("texture2D(u_input, {rotated_uv})"))
    }
}

impl Operation for ImageSampler {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_count(&self) -> usize {
        1
    }

    fn accepts_storage_input(&self, _input: usize) -> bool {
        false
    }

    fn accepts_texture_input(&self, input: usize) -> bool {
        input == 0
    }

    fn accepts_storage_output(&self, output: usize) -> bool {
        output == 0
    }

    fn get_output_size(&self, _output: usize, _input_sizes: &[Size]) -> Size {
        Size::new(self.params.output_width, self.params.output_height, 3)
    }

    fn get_sampled_channels(&self, _input: usize) -> SampledChannels {
        SampledChannels { min: 3, max: 3 }
    }

    fn prepare(&mut self, gpu: &Context, _chunks: &dyn ChunkSource) -> Result<(), crate::error::InferenceError> {
        let source = self.emit_source(gpu);
        let program = gpu
            .compile(&source, &self.name)
            .map_err(|e| crate::error::RuntimeError::Backend(lattice_gpu::GpuError(e.to_string())))?;
        self.program = Some(program);
        Ok(())
    }

    fn execute(&mut self, gpu: &Context, inputs: &[Binding<'_>], output: &Storage) -> Result<(), crate::error::InferenceError> {
        let program = self.program.ok_or_else(|| {
            crate::error::InferenceError::NotReady(crate::error::NotReady(self.name.clone()))
        })?;
        let texture = match inputs.first() {
            Some(Binding::ExternalTexture(texture)) => *texture,
            _ => return Err(RuntimeError::MissingInput { op: self.name.clone(), input: 0 }.into()),
        };
        let filter = if self.params.linear_interp { FilterMode::Linear } else { FilterMode::Nearest };
        gpu.bind_texture(texture, 0, filter)?;
        if let Some(&out_texture) = output.textures().first() {
            gpu.bind_output(out_texture)?;
        }

        let area = self.crop_rect(texture.size.width, texture.size.height);
        let output_size = Extent { width: self.params.output_width, height: self.params.output_height, depth: 1 };
        let rect = gpu.set_texture_coordinates(area, texture.size, output_size);

        let mut encoder = lattice_gpu::CommandEncoder::new(gpu);
        let pass = encoder.render(program)?;
        pass.set_uniform_2f("u_crop_offset", [rect.u0, rect.v0]);
        pass.set_uniform_2f("u_crop_scale", [rect.u1 - rect.u0, rect.v1 - rect.v0]);
        pass.blend();
        Ok(())
    }

    fn as_image_sampler(&self) -> Option<&ImageSampler> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_rect_is_full_source_when_disabled() {
        let sampler = ImageSampler::new(
            "s",
            ImageSamplerParams { output_width: 224, output_height: 224, center_crop: false, linear_interp: true, rotation: Rotation::None },
        );
        let rect = sampler.crop_rect(640, 480);
        assert_eq!(rect, PixelRect { x: 0, y: 0, width: 640, height: 480 });
    }

    #[test]
    fn crop_rect_trims_wider_source_to_target_aspect() {
        let sampler = ImageSampler::new(
            "s",
            ImageSamplerParams { output_width: 1, output_height: 1, center_crop: true, linear_interp: true, rotation: Rotation::None },
        );
        // Target is square; a 640x480 source is wider than square, so the
        // crop should narrow width to match height and center horizontally.
        let rect = sampler.crop_rect(640, 480);
        assert_eq!(rect.height, 480);
        assert_eq!(rect.width, 480);
        assert_eq!(rect.x, (640 - 480) / 2);
        assert_eq!(rect.y, 0);
    }

    #[test]
    fn crop_rect_trims_taller_source_to_target_aspect() {
        let sampler = ImageSampler::new(
            "s",
            ImageSamplerParams { output_width: 1, output_height: 1, center_crop: true, linear_interp: true, rotation: Rotation::None },
        );
        let rect = sampler.crop_rect(480, 640);
        assert_eq!(rect.width, 480);
        assert_eq!(rect.height, 480);
        assert_eq!(rect.x, 0);
        assert_eq!(rect.y, (640 - 480) / 2);
    }
}
