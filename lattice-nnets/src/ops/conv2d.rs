//! Conv2D (§4.4.1): grouped 2D convolution, emitted as one fragment
//! program per quad of output channels.

use super::{Binding, ChunkSource, Operation, SampledChannels};
use crate::emitter::{Activation, Emitter, SpatialMixin};
use crate::error::{InconsistentModelData, InvalidArgument, RuntimeError};
use crate::size::{Padding, Size};
use crate::storage::Storage;
use lattice_gpu::{Context, FilterMode, LimitKind, Program};

/// Programs are hard-coded (weights as GLSL literals, letting the driver
/// constant-fold) when a layer needs at most this many output-channel
/// programs; wider layers use uniform-carried weights instead (§4.4.1).
/// Chosen to match the spec's own worked heuristic ("empirically ≤ 1").
const MAX_HARDCODED_PROGRAMS: u32 = 1;

/// Uniform vector slots reserved for non-weight uniforms (deltas, shift,
/// residual offset) when deciding whether a program's weights fit in
/// uniforms rather than falling back to hard-coded literals (§4.4.1).
const UNIFORM_HEADROOM_VECS: u32 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WeightStrategy {
    Uniform,
    HardCoded,
}

/// One compiled program covering a quad of output channels.
struct CompiledProgram {
    program: Program,
    strategy: WeightStrategy,
    out_quad: u32,
}

#[derive(Debug, Clone)]
pub struct Conv2DParams {
    pub kernel: (u32, u32),
    pub input_channels: u32,
    pub output_channels: u32,
    pub stride: u32,
    pub padding: Padding,
    pub use_bias: bool,
    pub groups: u32,
    pub activation: Activation,
}

pub struct Conv2D {
    name: String,
    params: Conv2DParams,
    weights: Vec<f32>,
    bias: Vec<f32>,
    programs: Vec<CompiledProgram>,
}

impl std::fmt::Debug for Conv2D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conv2D").field("name", &self.name).field("params", &self.params).finish()
    }
}

impl Conv2D {
    pub fn params(&self) -> &Conv2DParams {
        &self.params
    }

    pub fn new(name: impl Into<String>, mut params: Conv2DParams) -> Result<Self, InvalidArgument> {
        let name = name.into();
        let cin = params.input_channels;
        let cout = params.output_channels;
        params.groups = params.groups.max(1);

        if !(cin == 3 || cin % 4 == 0) {
            return Err(InvalidArgument(format!(
                "{name}: input_channels must be 3 or a multiple of 4, got {cin}"
            )));
        }
        if cout % 4 != 0 {
            return Err(InvalidArgument(format!("{name}: output_channels must be a multiple of 4, got {cout}")));
        }
        let groups = params.groups.max(1);
        let depthwise = groups == cin && groups == cout;
        if !(groups == 1 || depthwise) {
            let cin_g = cin / groups;
            let cout_g = cout / groups;
            if cin % groups != 0
                || cout % groups != 0
                || cin_g % 4 != 0
                || cout_g % 4 != 0
                || cin_g < 4
            {
                return Err(InvalidArgument(format!(
                    "{name}: groups={groups} incompatible with input_channels={cin}, output_channels={cout}"
                )));
            }
        }

        Ok(Self { name, params, weights: Vec::new(), bias: Vec::new(), programs: Vec::new() })
    }

    fn is_depthwise(&self) -> bool {
        let p = &self.params;
        p.groups == p.input_channels && p.groups == p.output_channels
    }

    fn is_image_input(&self) -> bool {
        self.params.input_channels == 3
    }

    /// `Cin/groups` and `Cout/groups` used when iterating weights per
    /// group.
    fn per_group_channels(&self) -> (u32, u32) {
        (self.params.input_channels / self.params.groups, self.params.output_channels / self.params.groups)
    }

    /// Number of input-storage channel quads a single group spans
    /// (§4.4.1 general case: "summed over every input-channel quad
    /// `Cin/4` in the group").
    fn input_quads_per_group(&self) -> u32 {
        self.per_group_channels().0.div_ceil(4).max(1)
    }

    /// Number of output-channel quads a single group spans.
    fn output_quads_per_group(&self) -> u32 {
        (self.per_group_channels().1 / 4).max(1)
    }

    fn weight_at(&self, group: u32, cout_local: u32, cin_local: u32, ky: u32, kx: u32) -> f32 {
        let (cin_g, cout_g) = self.per_group_channels();
        let (kw, kh) = self.params.kernel;
        let cout_global = group * cout_g + cout_local;
        let idx = (((cout_global * cin_g + cin_local) * kh + ky) * kw + kx) as usize;
        self.weights.get(idx).copied().unwrap_or(0.0)
    }

    fn bias_at(&self, channel: u32) -> f32 {
        self.bias.get(channel as usize).copied().unwrap_or(0.0)
    }

    fn decide_strategy(&self, gpu: &Context, program_count: u32, vecs_per_program: u32) -> WeightStrategy {
        let limit = gpu.get_limit(LimitKind::FragmentUniformVectors);
        if program_count <= MAX_HARDCODED_PROGRAMS {
            WeightStrategy::HardCoded
        } else if vecs_per_program + UNIFORM_HEADROOM_VECS <= limit {
            WeightStrategy::Uniform
        } else {
            WeightStrategy::HardCoded
        }
    }

    /// Emits the depthwise branch (§4.4.1): one weight per channel per
    /// kernel tap, applied as a componentwise `vec4` multiply — groups ==
    /// Cin == Cout, every quad samples the matching input quad directly.
    fn emit_depthwise(&self, emitter: &mut Emitter, mixin: &SpatialMixin, out_quad: u32, strategy: WeightStrategy) {
        emitter.input(&super::InputBinding { name: "u_input".into(), unit: 0 });
        let (kw, kh) = self.params.kernel;
        if strategy == WeightStrategy::Uniform {
            emitter.uniform(format!("vec4 u_weights[{}]", kw * kh));
        }
        if self.params.use_bias {
            emitter.uniform("vec4 u_bias");
        }
        emitter.declare("varying vec2 v_uv;");
        emitter.statement("vec4 sum = vec4(0.0);");
        for ky in 0..kh {
            for kx in 0..kw {
                let idx = ky * kw + kx;
                let sample = mixin.sample_inline("u_input", idx.min(mixin.delta_count() - 1), (kx as i32, ky as i32), None);
                match strategy {
                    WeightStrategy::Uniform => {
                        emitter.statement(format!("sum += u_weights[{idx}] * {sample};"));
                    }
                    WeightStrategy::HardCoded => {
                        let w: Vec<f32> =
                            (0..4).map(|lane| self.weight_at(out_quad * 4 + lane, 0, 0, ky, kx)).collect();
                        emitter.statement(format!(
                            "sum += vec4({:.6}, {:.6}, {:.6}, {:.6}) * {sample};",
                            w[0], w[1], w[2], w[3]
                        ));
                    }
                }
            }
        }
        if self.params.use_bias {
            emitter.statement("sum += u_bias;");
        }
    }

    /// Emits the image-input branch (§4.4.1): each output channel is a
    /// dot product of the sampled RGB texel against that channel's
    /// per-tap weight vector.
    fn emit_image_input(&self, emitter: &mut Emitter, mixin: &SpatialMixin, out_quad: u32, strategy: WeightStrategy) {
        emitter.input(&super::InputBinding { name: "u_input".into(), unit: 0 });
        let (kw, kh) = self.params.kernel;
        if strategy == WeightStrategy::Uniform {
            emitter.uniform(format!("vec3 u_weights[{}]", kw * kh * 4));
        }
        if self.params.use_bias {
            emitter.uniform("vec4 u_bias");
        }
        emitter.declare("varying vec2 v_uv;");
        emitter.statement("vec4 sum = vec4(0.0);");
        for ky in 0..kh {
            for kx in 0..kw {
                let idx = ky * kw + kx;
                let sample = mixin.sample_inline("u_input", idx.min(mixin.delta_count() - 1), (kx as i32, ky as i32), None);
                let rgb_var = format!("rgb_{ky}_{kx}");
                emitter.statement(format!("vec3 {rgb_var} = ({sample}).rgb;"));
                for lane in 0..4u32 {
                    match strategy {
                        WeightStrategy::Uniform => {
                            let widx = idx * 4 + lane;
                            emitter.statement(format!("sum[{lane}] += dot(u_weights[{widx}], {rgb_var});"));
                        }
                        WeightStrategy::HardCoded => {
                            let w = [
                                self.weight_at(0, out_quad * 4 + lane, 0, ky, kx),
                                self.weight_at(0, out_quad * 4 + lane, 1, ky, kx),
                                self.weight_at(0, out_quad * 4 + lane, 2, ky, kx),
                            ];
                            emitter.statement(format!(
                                "sum[{lane}] += dot(vec3({:.6}, {:.6}, {:.6}), {rgb_var});",
                                w[0], w[1], w[2]
                            ));
                        }
                    }
                }
            }
        }
        if self.params.use_bias {
            emitter.statement("sum += u_bias;");
        }
    }

    /// Emits the general (dense or grouped, non-depthwise) branch
    /// (§4.4.1): inline samples multiplied by a `mat4` whose columns are
    /// consecutive weight vectors, summed over every input-channel quad
    /// in the group. One sampler per input quad in the group.
    fn emit_general(&self, emitter: &mut Emitter, mixin: &SpatialMixin, out_quad: u32, strategy: WeightStrategy) {
        let cin_quads = self.input_quads_per_group();
        let (kw, kh) = self.params.kernel;
        for q in 0..cin_quads {
            emitter.input(&super::InputBinding { name: format!("u_input{q}"), unit: q });
        }
        if strategy == WeightStrategy::Uniform {
            emitter.uniform(format!("mat4 u_weights[{}]", kw * kh * cin_quads));
        }
        if self.params.use_bias {
            emitter.uniform("vec4 u_bias");
        }
        emitter.declare("varying vec2 v_uv;");
        emitter.statement("vec4 sum = vec4(0.0);");

        let cout_quads_per_group = self.output_quads_per_group();
        let group = out_quad / cout_quads_per_group;
        let local_out_quad = out_quad % cout_quads_per_group;

        for ky in 0..kh {
            for kx in 0..kw {
                let idx = ky * kw + kx;
                for q in 0..cin_quads {
                    let input_name = format!("u_input{q}");
                    let sample =
                        mixin.sample_inline(&input_name, idx.min(mixin.delta_count() - 1), (kx as i32, ky as i32), None);
                    match strategy {
                        WeightStrategy::Uniform => {
                            let widx = idx * cin_quads + q;
                            emitter.statement(format!("sum += u_weights[{widx}] * {sample};"));
                        }
                        WeightStrategy::HardCoded => {
                            // mat4(...) fills columns first: flat[c*4+lane] becomes
                            // column c, row lane, so mat*vec sums column c * vec[c] -
                            // matching result[lane] = sum_c weight(lane, c) * vec[c]
                            // requires the weight at that index, not weight(c, lane).
                            let mut w = [0.0f32; 16];
                            for lane in 0..4u32 {
                                let cout_local = local_out_quad * 4 + lane;
                                for c in 0..4u32 {
                                    let cin_local = q * 4 + c;
                                    w[(c * 4 + lane) as usize] =
                                        self.weight_at(group, cout_local, cin_local, ky, kx);
                                }
                            }
                            emitter.statement(format!(
                                "sum += mat4({}) * {sample};",
                                w.iter().map(|v| format!("{v:.6}")).collect::<Vec<_>>().join(", ")
                            ));
                        }
                    }
                }
            }
        }
        if self.params.use_bias {
            emitter.statement("sum += u_bias;");
        }
    }

    fn emit_source(&self, gpu: &Context, out_quad: u32, strategy: WeightStrategy) -> String {
        let mixin = SpatialMixin::new(self.params.kernel.0, self.params.kernel.1);
        let mut emitter = Emitter::new(gpu.capability());
        for decl in mixin.declarations() {
            emitter.declare(format!("{decl};"));
        }

        if self.is_image_input() {
            self.emit_image_input(&mut emitter, &mixin, out_quad, strategy);
        } else if self.is_depthwise() {
            self.emit_depthwise(&mut emitter, &mixin, out_quad, strategy);
        } else {
            self.emit_general(&mut emitter, &mixin, out_quad, strategy);
        }

        let activated = self.params.activation.apply_expr("sum");
        emitter.finish_fragment(&activated)
    }

    /// Uploads `u_delta` and, for the `Uniform` strategy, `u_weights`/
    /// `u_bias` for the program covering `out_quad` (§4.3, §4.4.1).
    fn upload_uniforms(&self, pass: &lattice_gpu::PassEncoder<'_>, compiled: &CompiledProgram, deltas: &[(f32, f32)]) {
        let delta_array: Vec<[f32; 2]> = deltas.iter().map(|&(x, y)| [x, y]).collect();
        pass.set_uniform_2f_array("u_delta", &delta_array);

        if compiled.strategy != WeightStrategy::Uniform {
            return;
        }
        let (kw, kh) = self.params.kernel;
        let out_quad = compiled.out_quad;

        if self.is_image_input() {
            let mut weights = Vec::with_capacity((kw * kh * 4) as usize);
            for ky in 0..kh {
                for kx in 0..kw {
                    for lane in 0..4u32 {
                        weights.push([
                            self.weight_at(0, out_quad * 4 + lane, 0, ky, kx),
                            self.weight_at(0, out_quad * 4 + lane, 1, ky, kx),
                            self.weight_at(0, out_quad * 4 + lane, 2, ky, kx),
                        ]);
                    }
                }
            }
            pass.set_uniform_3f_array("u_weights", &weights);
        } else if self.is_depthwise() {
            let mut weights = Vec::with_capacity((kw * kh) as usize);
            for ky in 0..kh {
                for kx in 0..kw {
                    let w: Vec<f32> = (0..4).map(|lane| self.weight_at(out_quad * 4 + lane, 0, 0, ky, kx)).collect();
                    weights.push([w[0], w[1], w[2], w[3]]);
                }
            }
            pass.set_uniform_4f_array("u_weights", &weights);
        } else {
            let cin_quads = self.input_quads_per_group();
            let cout_quads_per_group = self.output_quads_per_group();
            let group = out_quad / cout_quads_per_group;
            let local_out_quad = out_quad % cout_quads_per_group;
            let mut weights = Vec::with_capacity((kw * kh * cin_quads) as usize);
            for ky in 0..kh {
                for kx in 0..kw {
                    for q in 0..cin_quads {
                        let mut mat = [0.0f32; 16];
                        for lane in 0..4u32 {
                            let cout_local = local_out_quad * 4 + lane;
                            for c in 0..4u32 {
                                let cin_local = q * 4 + c;
                                mat[(c * 4 + lane) as usize] = self.weight_at(group, cout_local, cin_local, ky, kx);
                            }
                        }
                        weights.push(mat);
                    }
                }
            }
            pass.set_uniform_mat4_array("u_weights", &weights);
        }

        if self.params.use_bias {
            let bias = [
                self.bias_at(out_quad * 4),
                self.bias_at(out_quad * 4 + 1),
                self.bias_at(out_quad * 4 + 2),
                self.bias_at(out_quad * 4 + 3),
            ];
            pass.set_uniform_4f_array("u_bias", &[bias]);
        }
    }
}

impl Operation for Conv2D {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_count(&self) -> usize {
        1
    }

    fn accepts_storage_input(&self, input: usize) -> bool {
        input == 0 && !self.is_image_input()
    }

    fn accepts_texture_input(&self, input: usize) -> bool {
        input == 0 && self.is_image_input()
    }

    fn accepts_storage_output(&self, output: usize) -> bool {
        output == 0
    }

    fn get_output_size(&self, _output: usize, input_sizes: &[Size]) -> Size {
        let input = input_sizes[0];
        input.transform(self.params.kernel, self.params.stride, self.params.padding, self.params.output_channels)
    }

    fn get_input_padding(&self, input: usize) -> u32 {
        if input == 0 {
            match self.params.padding {
                Padding::Same => (self.params.kernel.0.max(self.params.kernel.1) - 1) / 2,
                Padding::Valid => 0,
            }
        } else {
            0
        }
    }

    fn get_sampled_channels(&self, input: usize) -> SampledChannels {
        if input == 0 {
            let (cin_g, _) = self.per_group_channels();
            SampledChannels { min: cin_g.min(4), max: cin_g }
        } else {
            SampledChannels { min: self.params.output_channels, max: self.params.output_channels }
        }
    }

    fn prepare(&mut self, gpu: &Context, chunks: &dyn ChunkSource) -> Result<(), crate::error::InferenceError> {
        let (cin_g, cout_g) = self.per_group_channels();
        let (kw, kh) = self.params.kernel;
        let weight_len = (self.params.groups * cout_g * cin_g * kh * kw) as usize;

        let w_id = format!("{}/w", self.name);
        let bytes = chunks.chunk(&w_id).ok_or_else(|| {
            InconsistentModelData(format!("missing weight chunk '{w_id}'"))
        })?;
        if bytes.len() != weight_len * 4 {
            return Err(InconsistentModelData(format!(
                "chunk '{w_id}' has {} bytes, expected {} (float32 OIHW)",
                bytes.len(),
                weight_len * 4
            ))
            .into());
        }
        self.weights = bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();

        if self.params.use_bias {
            let b_id = format!("{}/b", self.name);
            let bytes = chunks.chunk(&b_id).ok_or_else(|| {
                InconsistentModelData(format!("missing bias chunk '{b_id}'"))
            })?;
            if bytes.len() != self.params.output_channels as usize * 4 {
                return Err(InconsistentModelData(format!(
                    "chunk '{b_id}' has {} bytes, expected {}",
                    bytes.len(),
                    self.params.output_channels * 4
                ))
                .into());
            }
            self.bias = bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
        }

        let out_quads = self.params.output_channels / 4;
        let vecs_per_program = if self.is_image_input() {
            kw * kh * 4
        } else if self.is_depthwise() {
            kw * kh
        } else {
            kw * kh * self.input_quads_per_group() * 4
        };
        let strategy = self.decide_strategy(gpu, out_quads, vecs_per_program);
        self.programs.clear();
        for out_quad in 0..out_quads {
            let source = self.emit_source(gpu, out_quad, strategy);
            let program = gpu.compile(&source, &format!("{}#{}", self.name, out_quad)).map_err(|e| {
                crate::error::RuntimeError::Backend(lattice_gpu::GpuError(e.to_string()))
            })?;
            self.programs.push(CompiledProgram { program, strategy, out_quad });
        }
        Ok(())
    }

    fn execute(&mut self, gpu: &Context, inputs: &[Binding<'_>], output: &Storage) -> Result<(), crate::error::InferenceError> {
        let mixin = SpatialMixin::new(self.params.kernel.0, self.params.kernel.1);
        let input_quads_per_group = self.input_quads_per_group();
        let cout_quads_per_group = self.output_quads_per_group();

        for compiled in &self.programs {
            let (texture_index, _origin) = output.quad_location(compiled.out_quad);
            let texture = output.textures()[texture_index];
            gpu.bind_output(texture)?;

            let deltas = match inputs.first() {
                Some(Binding::Storage(storage)) => {
                    let group = compiled.out_quad / cout_quads_per_group;
                    for q in 0..input_quads_per_group {
                        let in_quad = group * input_quads_per_group + q;
                        let (in_tex, _) = storage.quad_location(in_quad.min(storage.channel_quads().saturating_sub(1)));
                        gpu.bind_texture(storage.textures()[in_tex], q, FilterMode::Nearest)?;
                    }
                    let extent = storage.texture_extent();
                    mixin.deltas_for_texture(extent.width, extent.height)
                }
                Some(Binding::ExternalTexture(texture)) => {
                    gpu.bind_texture(*texture, 0, FilterMode::Linear)?;
                    mixin.deltas_for_texture(texture.size.width, texture.size.height)
                }
                _ => {
                    return Err(RuntimeError::MissingInput { op: self.name.clone(), input: 0 }.into());
                }
            };

            let mut encoder = lattice_gpu::CommandEncoder::new(gpu);
            let pass = encoder.render(compiled.program)?;
            if !self.is_image_input() && !self.is_depthwise() {
                for q in 1..input_quads_per_group {
                    pass.set_uniform_1i(&format!("u_input{q}"), q as i32);
                }
            }
            self.upload_uniforms(&pass, compiled, &deltas);
            pass.blend();
        }
        Ok(())
    }

    fn as_conv2d(&self) -> Option<&Conv2D> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::Activation;

    fn params(kernel: (u32, u32), cin: u32, cout: u32, groups: u32) -> Conv2DParams {
        Conv2DParams {
            kernel,
            input_channels: cin,
            output_channels: cout,
            stride: 1,
            padding: Padding::Same,
            use_bias: false,
            groups,
            activation: Activation::Default,
        }
    }

    #[test]
    fn rejects_incompatible_groups() {
        let err = Conv2D::new("c", params((1, 1), 8, 8, 3));
        assert!(err.is_err());
    }

    #[test]
    fn detects_depthwise_and_image_input() {
        let depthwise = Conv2D::new("dw", params((3, 3), 8, 8, 8)).unwrap();
        assert!(depthwise.is_depthwise());
        assert!(!depthwise.is_image_input());

        let image = Conv2D::new("img", params((3, 3), 3, 32, 1)).unwrap();
        assert!(image.is_image_input());
        assert!(!image.is_depthwise());
    }

    #[test]
    fn per_group_and_input_quad_counts_match_groups() {
        let grouped = Conv2D::new("g", params((1, 1), 16, 8, 2)).unwrap();
        assert_eq!(grouped.per_group_channels(), (8, 4));
        assert_eq!(grouped.input_quads_per_group(), 2);
        assert_eq!(grouped.output_quads_per_group(), 1);
    }

    /// S1: `Cin=4, Cout=4, groups=1`, weights an identity Kronecker-delta
    /// (output channel `k` copies input channel `k`, all taps zero except
    /// the center). `weight_at` must be indexed with group-local channel
    /// indices, not global ones, or output channels 1-3 silently read the
    /// wrong (zero) weight and come out constant zero.
    #[test]
    fn weight_at_uses_group_local_indices_for_identity_kernel() {
        let mut conv = Conv2D::new("s1", params((1, 1), 4, 4, 1)).unwrap();
        // OIHW, 1x1 kernel: weights[(cout*4 + cin)*1*1] = delta(cout, cin)
        conv.weights = (0..16).map(|i| if i / 4 == i % 4 { 1.0 } else { 0.0 }).collect();
        for cout in 0..4u32 {
            for cin in 0..4u32 {
                let expected = if cout == cin { 1.0 } else { 0.0 };
                assert_eq!(conv.weight_at(0, cout, cin, 0, 0), expected, "cout={cout} cin={cin}");
            }
        }
    }

    #[test]
    fn weight_at_offsets_by_group_for_grouped_conv() {
        let mut conv = Conv2D::new("grp", params((1, 1), 8, 8, 2)).unwrap();
        // Two groups of (cin_g=4, cout_g=4); group 1's weights start after
        // group 0's 4*4 block.
        conv.weights = (0..32).map(|i| i as f32).collect();
        assert_eq!(conv.weight_at(0, 0, 0, 0, 0), 0.0);
        assert_eq!(conv.weight_at(1, 0, 0, 0, 0), 16.0);
        assert_eq!(conv.weight_at(1, 3, 3, 0, 0), 31.0);
    }

    /// GLSL's `mat4(16 floats)` constructor and `uniform_matrix_4_f32_slice`
    /// with `transpose = false` both read the flat array as four columns,
    /// so `mat * vec` computes `result[lane] = sum_c flat[c*4+lane] *
    /// vec[c]`. The general/grouped branch must lay weights out so that
    /// column-major product reproduces `result[lane] = sum_c weight(lane,
    /// c) * vec[c]`, not its transpose.
    #[test]
    fn general_branch_mat4_layout_matches_glsl_column_major_product() {
        let mut conv = Conv2D::new("g", params((1, 1), 4, 4, 1)).unwrap();
        // Asymmetric weights so a transposed product gives a different
        // (wrong) answer than the intended one.
        conv.weights = (0..16).map(|i| i as f32).collect();

        let mut flat = [0.0f32; 16];
        for lane in 0..4u32 {
            for c in 0..4u32 {
                flat[(c * 4 + lane) as usize] = conv.weight_at(0, lane, c, 0, 0);
            }
        }

        let input = [1.0f32, 2.0, 3.0, 4.0];
        let mut result = [0.0f32; 4];
        for lane in 0..4usize {
            for c in 0..4usize {
                result[lane] += flat[c * 4 + lane] * input[c];
            }
        }

        for lane in 0..4u32 {
            let expected: f32 = (0..4u32).map(|c| conv.weight_at(0, lane, c, 0, 0) * input[c as usize]).sum();
            assert_eq!(result[lane as usize], expected, "lane={lane}");
        }
    }
}
