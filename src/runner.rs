//! `InferenceRunner` (§4.7): a task holding a (model, chunk store) pair,
//! driven by a `Pool` through the `AbstractTask` phases.

use crate::chunk_store::ChunkStore;
use crate::error::{Error, InferenceTimeError, TaskListener};
use crate::external::{ExternalBitmap, ReadLockGuard};
use crate::scheduler::{AbstractTask, Device, ThreadContext};
use lattice_gpu::Context;
use lattice_nnets::error::{InconsistentModelData, RuntimeError};
use lattice_nnets::{Model, OpKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Identifies an operation by handle or by its name in the listing, as
/// `InferenceRunner::connect`'s `op_ref_or_name` (§4.7).
#[derive(Clone, Debug)]
pub enum OpRef {
    Key(OpKey),
    Name(String),
}

impl From<OpKey> for OpRef {
    fn from(key: OpKey) -> Self {
        OpRef::Key(key)
    }
}
impl From<&str> for OpRef {
    fn from(name: &str) -> Self {
        OpRef::Name(name.to_string())
    }
}
impl From<String> for OpRef {
    fn from(name: String) -> Self {
        OpRef::Name(name)
    }
}

struct BitmapBinding {
    bitmap: Arc<dyn ExternalBitmap>,
    op: OpRef,
    input: usize,
}

/// A task holding a (model, chunk store) pair (§4.7). Submit to a `Pool`
/// via `perform`/`submit`; read a user output back with `output` once the
/// job has completed without error.
pub struct InferenceRunner {
    label: String,
    model: Mutex<Model>,
    chunks: ChunkStore,
    bindings: Mutex<Vec<BitmapBinding>>,
    locks: Mutex<Vec<Box<dyn ReadLockGuard>>>,
    outputs: Mutex<HashMap<(OpKey, usize), Vec<f32>>>,
    failure: Mutex<Option<Error>>,
    listener: Option<Arc<dyn TaskListener>>,
}

impl InferenceRunner {
    pub fn new(label: impl Into<String>, model: Model, chunks: ChunkStore) -> Self {
        Self {
            label: label.into(),
            model: Mutex::new(model),
            chunks,
            bindings: Mutex::new(Vec::new()),
            locks: Mutex::new(Vec::new()),
            outputs: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn TaskListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Registers that `bitmap` must be read-locked and uploaded to
    /// `input` of `op` before inference (§4.7).
    pub fn connect(&self, bitmap: Arc<dyn ExternalBitmap>, op: impl Into<OpRef>, input: usize) {
        self.bindings.lock().unwrap().push(BitmapBinding { bitmap, op: op.into(), input });
    }

    /// The host vector bound to a user output by the last `execute`, if
    /// it completed without error.
    pub fn output(&self, op: OpKey, output: usize) -> Option<Vec<f32>> {
        self.outputs.lock().unwrap().get(&(op, output)).cloned()
    }

    /// Takes the error from the last run, if any (§7 `task_fail`).
    pub fn take_error(&self) -> Option<Error> {
        self.failure.lock().unwrap().take()
    }

    fn resolve(&self, model: &Model, op: &OpRef) -> Option<OpKey> {
        match op {
            OpRef::Key(key) => Some(*key),
            OpRef::Name(name) => model.op_key_by_name(name),
        }
    }

    fn fail(&self, error: Error) {
        if let Some(listener) = &self.listener {
            listener.task_fail(&self.label, &self.label, &error);
        }
        *self.failure.lock().unwrap() = Some(error);
    }
}

impl AbstractTask for InferenceRunner {
    fn used_devices(&self) -> Device {
        Device::GpuOnly
    }

    /// Acquires read locks on registered bitmaps, uploads each to its
    /// bound input, then calls `model.prepare` (idempotent once ready)
    /// (§4.7).
    fn before_processing(&self, _count: usize, _target: usize, gpu: Option<&Context>) {
        *self.failure.lock().unwrap() = None;
        self.outputs.lock().unwrap().clear();

        let bindings = self.bindings.lock().unwrap();
        let mut locks = self.locks.lock().unwrap();
        locks.clear();
        for binding in bindings.iter() {
            locks.push(binding.bitmap.read_lock());
        }
        drop(locks);

        let Some(gpu) = gpu else { return };
        let mut model = self.model.lock().unwrap();
        for binding in bindings.iter() {
            let Some(op_key) = self.resolve(&model, &binding.op) else {
                self.fail(
                    InferenceTimeError {
                        operation: self.label.clone(),
                        source: InconsistentModelData(
                            "connect() referenced an operation not in this model".into(),
                        )
                        .into(),
                    }
                    .into(),
                );
                return;
            };
            match binding.bitmap.bind(gpu, 0) {
                Ok(texture) => model.bind_external_input(op_key, binding.input, texture),
                Err(e) => {
                    self.fail(
                        InferenceTimeError {
                            operation: self.label.clone(),
                            source: RuntimeError::Backend(e).into(),
                        }
                        .into(),
                    );
                    return;
                }
            }
        }
        if let Err(e) = model.prepare(gpu, &self.chunks) {
            self.fail(InferenceTimeError { operation: self.label.clone(), source: e }.into());
        }
    }

    /// Executes the model, then fetches every user-requested output into
    /// a host vector (§4.7, §6).
    fn process_on_gpu(&self, gpu: &Context, _thread: &ThreadContext) {
        if self.failure.lock().unwrap().is_some() {
            return;
        }
        let mut model = self.model.lock().unwrap();
        if let Err(e) = model.execute(gpu) {
            self.fail(InferenceTimeError { operation: self.label.clone(), source: e }.into());
            return;
        }

        let mut outputs = self.outputs.lock().unwrap();
        for user_output in model.user_outputs() {
            let vector = if let Some(values) = model.softmax_output(user_output.op) {
                values.to_vec()
            } else if let Some(storage) = model.storage_for(user_output.op, user_output.output) {
                match storage.read_to_host(gpu) {
                    Ok(values) => values,
                    Err(e) => {
                        drop(outputs);
                        self.fail(
                            InferenceTimeError {
                                operation: self.label.clone(),
                                source: RuntimeError::Backend(e).into(),
                            }
                            .into(),
                        );
                        return;
                    }
                }
            } else {
                continue;
            };
            outputs.insert((user_output.op, user_output.output), vector);
        }
    }

    /// Flushes the GPU (a no-op if `execute` already did, e.g. when
    /// aborted before `process_on_gpu` ran) and releases bitmap locks
    /// (§4.7, §7 "cancellation always runs `after_processing`").
    fn after_processing(&self, _count: usize, gpu: Option<&Context>, aborted: bool) {
        if aborted {
            self.outputs.lock().unwrap().clear();
        }
        if let Some(gpu) = gpu {
            let _ = gpu.flush();
        }
        self.locks.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_nnets::ops::{Pooling2D, Pooling2DParams, PoolOp};
    use lattice_nnets::size::Padding;

    #[test]
    fn resolves_op_ref_by_name_and_by_key() {
        let mut model = Model::new();
        let pool = model.add_operation(Box::new(
            Pooling2D::new("pool", Pooling2DParams { op: PoolOp::Max, size: 2, stride: 2, padding: Padding::Valid })
                .unwrap(),
        ));
        let runner = InferenceRunner::new("t", model, ChunkStore::from_bytes(&[]).unwrap());
        let model_ref = runner.model.lock().unwrap();
        assert!(runner.resolve(&model_ref, &OpRef::Name("missing".into())).is_none());
        assert_eq!(runner.resolve(&model_ref, &OpRef::Name("pool".into())), Some(pool));
        assert_eq!(runner.resolve(&model_ref, &OpRef::Key(pool)), Some(pool));
    }
}
