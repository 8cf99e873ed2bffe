//! Dense (§4.4.3): `A·x + b` over a flat (column-stacked) input, with `A`
//! packed as groups of 4×4 submatrices.

use super::{Binding, ChunkSource, Operation, SampledChannels};
use crate::emitter::Emitter;
use crate::error::{InconsistentModelData, InvalidArgument, RuntimeError};
use crate::size::Size;
use crate::storage::Storage;
use lattice_gpu::{Context, FilterMode, GlCapability, Program};

#[derive(Debug, Clone)]
pub struct DenseParams {
    pub input_channels: u32,
    pub output_channels: u32,
    pub use_bias: bool,
}

pub struct Dense {
    name: String,
    params: DenseParams,
    /// `Cin/4 × Cout/4` row-major grid of 4×4 submatrices, each 16 floats.
    weights: Vec<f32>,
    bias: Vec<f32>,
    program: Option<Program>,
}

impl std::fmt::Debug for Dense {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dense").field("name", &self.name).field("params", &self.params).finish()
    }
}

impl Dense {
    pub fn params(&self) -> &DenseParams {
        &self.params
    }

    pub fn new(name: impl Into<String>, params: DenseParams) -> Result<Self, InvalidArgument> {
        let name = name.into();
        if params.input_channels % 8 != 0 {
            return Err(InvalidArgument(format!(
                "{name}: input_channels must be a multiple of 8, got {}",
                params.input_channels
            )));
        }
        if params.output_channels % 4 != 0 {
            return Err(InvalidArgument(format!(
                "{name}: output_channels must be a multiple of 4, got {}",
                params.output_channels
            )));
        }
        Ok(Self { name, params, weights: Vec::new(), bias: Vec::new(), program: None })
    }

    fn submatrix_grid(&self) -> (u32, u32) {
        (self.params.input_channels / 4, self.params.output_channels / 4)
    }

    fn emit_source(&self, gpu: &Context) -> String {
        let (cin_quads, cout_quads) = self.submatrix_grid();
        let mut emitter = Emitter::new(gpu.capability());
        emitter.input(&super::InputBinding { name: "u_input".into(), unit: 0 });
        emitter.uniform(format!("mat4 u_matrix[{}]", cin_quads * cout_quads));
        if self.params.use_bias {
            emitter.uniform("vec4 u_bias");
        }
        emitter.uniform("int u_row");
        emitter.declare("varying vec2 v_uv;");

        emitter.statement("vec4 acc = vec4(0.0);");
        emitter.statement("int row = u_row;");
        for cin_q in 0..cin_quads {
            emitter.statement(format!(
                "acc += u_matrix[row * {cin_quads} + {cin_q}] * texture2D(u_input, vec2(0.5, (float({cin_q}) + 0.5) / float({cin_quads})));"
            ));
        }
        if self.params.use_bias {
            emitter.statement("acc += u_bias;");
        }
        let out_expr = match gpu.capability() {
            // §4.4.3: ES 2.0 output is 16-bit fixed point (precision 8);
            // ES 3.1+ keeps float. Encoding the fixed-point pack explicitly
            // so the difference is visible in generated source rather than
            // hidden behind a runtime branch.
            GlCapability::Es20 => "clamp(acc * (1.0 / 256.0) + 0.5, 0.0, 1.0)".to_string(),
            GlCapability::Es31 => "acc".to_string(),
        };
        emitter.finish_fragment(&out_expr)
    }
}

impl Operation for Dense {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_count(&self) -> usize {
        1
    }

    fn accepts_storage_input(&self, input: usize) -> bool {
        input == 0
    }

    fn accepts_vector_input(&self, input: usize) -> bool {
        input == 0
    }

    fn accepts_storage_output(&self, output: usize) -> bool {
        output == 0
    }

    fn accepts_vector_output(&self, output: usize) -> bool {
        output == 0
    }

    fn get_output_size(&self, _output: usize, _input_sizes: &[Size]) -> Size {
        Size::new(1, 1, self.params.output_channels)
    }

    fn prepare(&mut self, gpu: &Context, chunks: &dyn ChunkSource) -> Result<(), crate::error::InferenceError> {
        let (cin_quads, cout_quads) = self.submatrix_grid();
        let expected_len = (cin_quads * cout_quads * 16) as usize;
        let w_id = format!("{}/w", self.name);
        let bytes = chunks.chunk(&w_id).ok_or_else(|| InconsistentModelData(format!("missing weight chunk '{w_id}'")))?;
        if bytes.len() != expected_len * 4 {
            return Err(InconsistentModelData(format!(
                "chunk '{w_id}' has {} bytes, expected {}",
                bytes.len(),
                expected_len * 4
            ))
            .into());
        }
        self.weights = bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();

        if self.params.use_bias {
            let b_id = format!("{}/b", self.name);
            let bytes = chunks.chunk(&b_id).ok_or_else(|| InconsistentModelData(format!("missing bias chunk '{b_id}'")))?;
            if bytes.len() != self.params.output_channels as usize * 4 {
                return Err(InconsistentModelData(format!("chunk '{b_id}' has wrong size")).into());
            }
            self.bias = bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
        }

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
        let (cin_quads, cout_quads) = self.submatrix_grid();
        let matrix: Vec<[f32; 16]> = self
            .weights
            .chunks_exact(16)
            .map(|c| {
                let mut m = [0.0f32; 16];
                m.copy_from_slice(c);
                m
            })
            .collect();
        debug_assert_eq!(matrix.len(), (cin_quads * cout_quads) as usize);

        for row in 0..cout_quads {
            let (out_tex, _) = output.quad_location(row);
            gpu.bind_output(output.textures()[out_tex])?;
            if let Some(&texture) = input_storage.textures().first() {
                gpu.bind_texture(texture, 0, FilterMode::Nearest)?;
            }
            let mut encoder = lattice_gpu::CommandEncoder::new(gpu);
            let pass = encoder.render(program)?;
            pass.set_uniform_1i("u_row", row as i32);
            pass.set_uniform_mat4_array("u_matrix", &matrix);
            if self.params.use_bias {
                let b = row as usize * 4;
                let bias = [
                    self.bias.get(b).copied().unwrap_or(0.0),
                    self.bias.get(b + 1).copied().unwrap_or(0.0),
                    self.bias.get(b + 2).copied().unwrap_or(0.0),
                    self.bias.get(b + 3).copied().unwrap_or(0.0),
                ];
                pass.set_uniform_4f_array("u_bias", &[bias]);
            }
            pass.blend();
        }
        Ok(())
    }

    fn as_dense(&self) -> Option<&Dense> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_multiple_channel_counts() {
        assert!(Dense::new("d", DenseParams { input_channels: 7, output_channels: 4, use_bias: false }).is_err());
        assert!(Dense::new("d", DenseParams { input_channels: 8, output_channels: 5, use_bias: false }).is_err());
    }

    #[test]
    fn submatrix_grid_divides_channels_by_four() {
        let dense = Dense::new("d", DenseParams { input_channels: 16, output_channels: 8, use_bias: true }).unwrap();
        assert_eq!(dense.submatrix_grid(), (4, 2));
    }
}
