//! Pooling2D (§4.4.2): a single fragment program reused across output
//! channel quads via a runtime `shift` uniform.

use super::{Binding, ChunkSource, Operation, SampledChannels};
use crate::emitter::{Emitter, SpatialMixin};
use crate::error::{InvalidArgument, RuntimeError};
use crate::size::{Padding, Size};
use crate::storage::Storage;
use lattice_gpu::{Context, FilterMode, Program};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum PoolOp {
    Max,
    Average,
}

#[derive(Debug, Clone)]
pub struct Pooling2DParams {
    pub op: PoolOp,
    pub size: u32,
    pub stride: u32,
    pub padding: Padding,
}

pub struct Pooling2D {
    name: String,
    params: Pooling2DParams,
    program: Option<Program>,
}

impl std::fmt::Debug for Pooling2D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pooling2D").field("name", &self.name).field("params", &self.params).finish()
    }
}

impl Pooling2D {
    pub fn params(&self) -> &Pooling2DParams {
        &self.params
    }

    pub fn new(name: impl Into<String>, params: Pooling2DParams) -> Result<Self, InvalidArgument> {
        let name = name.into();
        if params.op == PoolOp::Average && params.padding != Padding::Valid {
            return Err(InvalidArgument(format!("{name}: average pooling requires VALID padding")));
        }
        Ok(Self { name, params, program: None })
    }

    fn emit_source(&self, gpu: &Context) -> String {
        let mixin = SpatialMixin::new(self.params.size, self.params.size);
        let mut emitter = Emitter::new(gpu.capability());
        for decl in mixin.declarations() {
            emitter.declare(format!("{decl};"));
        }
        emitter.input(&super::InputBinding { name: "u_input".into(), unit: 0 });
        emitter.uniform("vec2 u_shift");
        emitter.declare("varying vec2 v_uv;");

        let n = self.params.size;
        match self.params.op {
            PoolOp::Max => {
                emitter.statement("vec4 acc = vec4(-1.0e9);");
                for ky in 0..n {
                    for kx in 0..n {
                        let idx = (ky * n + kx).min(mixin.delta_count() - 1);
                        let sample = mixin.sample_inline("u_input", idx, (kx as i32, ky as i32), Some("u_shift"));
                        emitter.statement(format!("acc = max(acc, {sample});"));
                    }
                }
            }
            PoolOp::Average => {
                emitter.statement("vec4 acc = vec4(0.0);");
                for ky in 0..n {
                    for kx in 0..n {
                        let idx = (ky * n + kx).min(mixin.delta_count() - 1);
                        let sample = mixin.sample_inline("u_input", idx, (kx as i32, ky as i32), Some("u_shift"));
                        emitter.statement(format!("acc += {sample};"));
                    }
                }
                emitter.statement(format!("acc /= float({});", n * n));
            }
        }
        emitter.finish_fragment("acc")
    }
}

impl Operation for Pooling2D {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_count(&self) -> usize {
        1
    }

    fn accepts_storage_input(&self, input: usize) -> bool {
        input == 0
    }

    fn accepts_storage_output(&self, output: usize) -> bool {
        output == 0
    }

    fn get_output_size(&self, _output: usize, input_sizes: &[Size]) -> Size {
        let input = input_sizes[0];
        input.transform((self.params.size, self.params.size), self.params.stride, self.params.padding, input.depth)
    }

    fn get_input_padding(&self, _input: usize) -> u32 {
        match self.params.padding {
            Padding::Same => (self.params.size.max(1) - 1) / 2,
            Padding::Valid => 0,
        }
    }

    fn get_sampled_channels(&self, _input: usize) -> SampledChannels {
        SampledChannels { min: 4, max: 4 }
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
        let input_storage = match inputs.first() {
            Some(Binding::Storage(storage)) => *storage,
            _ => return Err(RuntimeError::MissingInput { op: self.name.clone(), input: 0 }.into()),
        };
        let mixin = SpatialMixin::new(self.params.size, self.params.size);
        let in_extent = input_storage.texture_extent();
        let deltas: Vec<[f32; 2]> = mixin.deltas_for_texture(in_extent.width, in_extent.height).into_iter().map(|(x, y)| [x, y]).collect();

        for quad in 0..output.channel_quads() {
            let (out_tex, _) = output.quad_location(quad);
            let in_quad = quad.min(input_storage.channel_quads().saturating_sub(1));
            let (in_tex, (ox, oy)) = input_storage.quad_location(in_quad);
            gpu.bind_output(output.textures()[out_tex])?;
            gpu.bind_texture(input_storage.textures()[in_tex], 0, FilterMode::Nearest)?;
            let mut encoder = lattice_gpu::CommandEncoder::new(gpu);
            let pass = encoder.render(program)?;
            pass.set_uniform_2f_array("u_delta", &deltas);
            let shift = [ox as f32 / in_extent.width as f32, oy as f32 / in_extent.height as f32];
            pass.set_uniform_2f("u_shift", shift);
            pass.blend();
        }
        Ok(())
    }

    fn as_pooling2d(&self) -> Option<&Pooling2D> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_pooling_requires_valid_padding() {
        let result = Pooling2D::new("p", Pooling2DParams { op: PoolOp::Average, size: 2, stride: 2, padding: Padding::Same });
        assert!(result.is_err());
    }

    #[test]
    fn max_pooling_output_size_halves_with_stride_two() {
        let pool = Pooling2D::new("p", Pooling2DParams { op: PoolOp::Max, size: 2, stride: 2, padding: Padding::Valid }).unwrap();
        let output = pool.get_output_size(0, &[Size::new(8, 8, 16)]);
        assert_eq!(output, Size::new(4, 4, 16));
    }
}
