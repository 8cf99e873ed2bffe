//! Shader Code Emitter (§4.3): assembles GLSL fragment/compute source given
//! operation-specific fragments, with spatial-filtering, activation and
//! padding mixins.

pub mod activation;
pub mod padding;
pub mod spatial;

pub use activation::Activation;
pub use padding::sample_rect;
pub use spatial::SpatialMixin;

use lattice_gpu::GlCapability;

/// Declares an input sampler at the given texture unit.
pub struct InputBinding {
    pub name: String,
    pub unit: u32,
}

/// A growable GLSL source builder, analogous to the teacher's shader
/// string-assembly helpers for its `naga`-free raw-source backends.
#[derive(Default)]
pub struct Emitter {
    capability: Option<GlCapability>,
    declarations: Vec<String>,
    uniforms: Vec<String>,
    body: Vec<String>,
}

impl Emitter {
    pub fn new(capability: GlCapability) -> Self {
        Self { capability: Some(capability), ..Default::default() }
    }

    pub fn declare(&mut self, text: impl Into<String>) -> &mut Self {
        self.declarations.push(text.into());
        self
    }

    pub fn uniform(&mut self, decl: impl Into<String>) -> &mut Self {
        self.uniforms.push(decl.into());
        self
    }

    pub fn statement(&mut self, text: impl Into<String>) -> &mut Self {
        self.body.push(text.into());
        self
    }

    pub fn input(&mut self, binding: &InputBinding) -> &mut Self {
        self.declare(format!("uniform sampler2D {};", binding.name))
    }

    /// Assembles the final fragment shader source: version header, sampler
    /// precision qualifiers (ES 2.0 requires them), declarations, uniforms,
    /// `main()` wrapping the accumulated statements.
    pub fn finish_fragment(&self, output_expr: &str) -> String {
        let capability = self.capability.expect("capability not set on emitter");
        let mut out = String::new();
        out.push_str(capability.version_header());
        out.push_str("precision mediump float;\n");
        for decl in &self.declarations {
            out.push_str(decl);
            out.push('\n');
        }
        for uniform in &self.uniforms {
            out.push_str("uniform ");
            out.push_str(uniform);
            out.push_str(";\n");
        }
        let out_var = match capability {
            GlCapability::Es20 => "gl_FragColor",
            GlCapability::Es31 => "fragColor",
        };
        if matches!(capability, GlCapability::Es31) {
            out.push_str("out vec4 fragColor;\n");
        }
        out.push_str("void main() {\n");
        for statement in &self.body {
            out.push_str("    ");
            out.push_str(statement);
            out.push('\n');
        }
        out.push_str(&format!("    {out_var} = {output_expr};\n"));
        out.push_str("}\n");
        out
    }

    /// Assembles a compute-shader source body (ES 3.1+ only, §4.4.3's
    /// optional fast path and `storage image` activation target).
    pub fn finish_compute(&self, local_size: (u32, u32, u32), output_expr: &str) -> String {
        let capability = self.capability.expect("capability not set on emitter");
        debug_assert!(capability.supports_compute(), "compute shaders require ES 3.1+");
        let mut out = String::new();
        out.push_str(capability.version_header());
        out.push_str(&format!(
            "layout(local_size_x = {}, local_size_y = {}, local_size_z = {}) in;\n",
            local_size.0, local_size.1, local_size.2
        ));
        for decl in &self.declarations {
            out.push_str(decl);
            out.push('\n');
        }
        for uniform in &self.uniforms {
            out.push_str("uniform ");
            out.push_str(uniform);
            out.push_str(";\n");
        }
        out.push_str("void main() {\n");
        for statement in &self.body {
            out.push_str("    ");
            out.push_str(statement);
            out.push('\n');
        }
        out.push_str(&format!("    imageStore(output_image, ivec2(gl_GlobalInvocationID.xy), {output_expr});\n"));
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_shader_picks_version_header_per_capability() {
        let es20 = Emitter::new(GlCapability::Es20).finish_fragment("vec4(1.0)");
        let es31 = Emitter::new(GlCapability::Es31).finish_fragment("vec4(1.0)");
        assert!(es20.starts_with("#version 100"));
        assert!(es20.contains("gl_FragColor"));
        assert!(es31.starts_with("#version 310 es"));
        assert!(es31.contains("fragColor"));
    }
}
