//! Context creation for the GL ES backend.
//!
//! Native GL contexts are created by the host application (window/surface
//! management is explicitly out of scope, §1); this module only takes a
//! function loader and an already-current context and probes driver
//! capabilities through it, mirroring the teacher's
//! `platform::create_context` which turns a `wgpu::Adapter` into a
//! `blade_graphics::Context`.

use super::{Context, ContextDesc};
use crate::hub::Hub;
use crate::limits::{GlCapability, Limits};
use crate::program_bank::ProgramBank;
use crate::recycle_bin::RecycleBin;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug)]
pub struct PlatformError(pub String);

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PlatformError {}

/// # Safety
/// See `Context::init`.
pub(super) unsafe fn create_context(
    desc: &ContextDesc,
    loader: impl FnMut(&str) -> *const std::ffi::c_void,
) -> Result<Context, PlatformError> {
    let gl = glow::Context::from_loader_function(loader);

    let capability = desc.capability_hint.unwrap_or_else(|| detect_capability(&gl));
    let limits = query_limits(&gl, capability);

    if desc.validation {
        log::info!("lattice-gpu: GL ES context created, capability = {:?}", capability);
    }

    Ok(Context {
        gl,
        owner_thread: std::thread::current().id(),
        hub: Arc::new(RwLock::new(Hub::new())),
        recycle_bin: Arc::new(RecycleBin::new()),
        program_bank: Mutex::new(ProgramBank::new()),
        limits,
        capability,
    })
}

fn detect_capability(gl: &glow::Context) -> GlCapability {
    use glow::HasContext;
    let version = gl.version();
    if version.major > 3 || (version.major == 3 && version.minor >= 1) {
        GlCapability::Es31
    } else {
        GlCapability::Es20
    }
}

fn query_limits(gl: &glow::Context, capability: GlCapability) -> Limits {
    use glow::HasContext;
    let mut limits = match capability {
        GlCapability::Es20 => Limits::es20_defaults(),
        GlCapability::Es31 => Limits::es31_defaults(),
    };
    unsafe {
        limits.fragment_uniform_vectors =
            gl.get_parameter_i32(glow::MAX_FRAGMENT_UNIFORM_VECTORS).max(0) as u32;
        limits.texture_image_units =
            gl.get_parameter_i32(glow::MAX_TEXTURE_IMAGE_UNITS).max(0) as u32;
        if capability.supports_compute() {
            limits.local_groups_total =
                gl.get_parameter_i32(glow::MAX_COMPUTE_WORK_GROUP_INVOCATIONS).max(0) as u32;
        }
    }
    limits
}
