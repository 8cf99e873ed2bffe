//! `AbstractTask` (§4.6): the unit of work a `Pool` schedules.

use lattice_gpu::Context;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Which device class a task needs (§4.6).
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Device {
    CpuOnly,
    GpuOnly,
    CpuOrGpu,
}

/// Handed to a worker during `process`/`process_on_gpu`; lets cooperative
/// cancellation poll at a suspension point without the scheduler forcing
/// a thread interruption (§4.6, §5).
#[derive(Clone)]
pub struct ThreadContext {
    pub(crate) index: usize,
    pub(crate) aborted: Arc<AtomicBool>,
}

impl ThreadContext {
    pub fn thread_index(&self) -> usize {
        self.index
    }

    /// Polled at a suspension point to support early return (§5: "between
    /// operations during `execute`... polled to support early return").
    pub fn is_task_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

/// A unit of work submitted to a `Pool` (§4.6).
///
/// `before_processing`/`after_processing` run once, bracketing one or more
/// `process`/`process_on_gpu` calls spread across up to `max_threads()`
/// workers — a barrier separates each phase.
///
/// Methods take `&self`, not `&mut self`: several CPU workers call
/// `process` on the same task concurrently between the
/// `before_processing`/`after_processing` barriers, so implementors use
/// interior mutability for any per-run state (see `ops::Softmax`, whose
/// `before_execute`/`execute_slice`/`after_execute` this trait's default
/// CPU path is designed to drive).
pub trait AbstractTask: Send + Sync {
    fn used_devices(&self) -> Device;

    /// Upper bound on CPU workers this task can use; ignored for
    /// `Device::GpuOnly` tasks, which always run with exactly one (the
    /// GPU-affine) worker.
    fn max_threads(&self) -> usize {
        1
    }

    /// Runs once before any `process`/`process_on_gpu` call. `count` is
    /// the number of workers that will participate; `target` is a
    /// task-defined unit count (e.g. element count) workers may use to
    /// compute their own slice.
    fn before_processing(&self, count: usize, target: usize, gpu: Option<&Context>) {
        let _ = (count, target, gpu);
    }

    /// Runs on a CPU worker (`Device::CpuOnly` or `CpuOrGpu` tasks).
    fn process(&self, thread: &ThreadContext) {
        let _ = thread;
    }

    /// Runs on the pool's GPU-affine worker (`Device::GpuOnly` or
    /// `CpuOrGpu` tasks assigned the GPU slot).
    fn process_on_gpu(&self, gpu: &Context, thread: &ThreadContext) {
        let _ = (gpu, thread);
    }

    /// Runs once after every worker's `process*` call returns. `aborted`
    /// reflects whether the job was cancelled before completing normally.
    fn after_processing(&self, count: usize, gpu: Option<&Context>, aborted: bool) {
        let _ = (count, gpu, aborted);
    }
}
