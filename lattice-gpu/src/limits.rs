//! Driver capability limits (§4.1).

/// Which capability `Context::get_limit` is being asked about.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum LimitKind {
    FragmentUniformVectors,
    TextureImageUnits,
    LocalGroupsX,
    LocalGroupsY,
    LocalGroupsZ,
    LocalGroupsTotal,
    SharedMem,
}

/// Detected GLSL ES capability tier, picked once at context creation and
/// used to choose the shader version header (§4.3).
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum GlCapability {
    Es20,
    Es31,
}

impl GlCapability {
    /// GLSL ES `#version` header text for this capability tier.
    pub fn version_header(self) -> &'static str {
        match self {
            GlCapability::Es20 => "#version 100\n",
            GlCapability::Es31 => "#version 310 es\n",
        }
    }

    pub fn supports_compute(self) -> bool {
        matches!(self, GlCapability::Es31)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Limits {
    pub fragment_uniform_vectors: u32,
    pub texture_image_units: u32,
    pub local_groups: [u32; 3],
    pub local_groups_total: u32,
    pub shared_mem: u32,
}

impl Limits {
    pub fn get(&self, kind: LimitKind) -> u32 {
        match kind {
            LimitKind::FragmentUniformVectors => self.fragment_uniform_vectors,
            LimitKind::TextureImageUnits => self.texture_image_units,
            LimitKind::LocalGroupsX => self.local_groups[0],
            LimitKind::LocalGroupsY => self.local_groups[1],
            LimitKind::LocalGroupsZ => self.local_groups[2],
            LimitKind::LocalGroupsTotal => self.local_groups_total,
            LimitKind::SharedMem => self.shared_mem,
        }
    }

    /// Conservative defaults for a GLES 2.0 driver; refined from the real
    /// `glow` context once one is bound (see `gl::platform::query_limits`).
    pub fn es20_defaults() -> Self {
        Self {
            fragment_uniform_vectors: 16,
            texture_image_units: 8,
            local_groups: [0, 0, 0],
            local_groups_total: 0,
            shared_mem: 0,
        }
    }

    pub fn es31_defaults() -> Self {
        Self {
            fragment_uniform_vectors: 224,
            texture_image_units: 16,
            local_groups: [128, 128, 64],
            local_groups_total: 128,
            shared_mem: 16384,
        }
    }
}
