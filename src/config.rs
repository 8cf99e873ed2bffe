//! Descriptor structs for pool/program-cache knobs, following the
//! teacher's `ContextDesc`/`SurfaceConfig` "descriptor struct with
//! `Default`" idiom.

/// Configuration for a `lattice::scheduler::Pool` (§4.6).
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// CPU workers a pool's `CpuOnly`/`CpuOrGpu` jobs may fan out across.
    /// `None` defers to `num_cpus::get()`.
    pub cpu_workers: Option<usize>,
    /// Enable the optional compiled-program-binary cache (§9 "Inference
    /// experimental"). Off by default: the in-process `ProgramBank`
    /// already dedups by source hash within a run, and the binary cache
    /// is only a win across process restarts.
    pub program_binary_cache: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { cpu_workers: None, program_binary_cache: false }
    }
}

impl RunnerConfig {
    pub fn resolved_cpu_workers(&self) -> usize {
        self.cpu_workers.unwrap_or_else(num_cpus::get)
    }
}

/// Configuration for building a `Model` from a chunk store (§6).
#[derive(Clone, Debug, Default)]
pub struct ModelConfig {
    /// Reject a listing that references a chunk ID not present in the
    /// chunk store at `prepare` time rather than at the point the
    /// operation first needs it. Off by default, matching §7's policy of
    /// raising `InconsistentModelData` lazily, per operation.
    pub validate_chunks_eagerly: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cpu_workers_falls_back_to_num_cpus() {
        let config = RunnerConfig::default();
        assert_eq!(config.resolved_cpu_workers(), num_cpus::get());
    }

    #[test]
    fn explicit_cpu_workers_overrides_num_cpus() {
        let config = RunnerConfig { cpu_workers: Some(3), ..RunnerConfig::default() };
        assert_eq!(config.resolved_cpu_workers(), 3);
    }
}
