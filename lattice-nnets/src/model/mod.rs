//! Model: operations + connections graph, storage allocator/recycler,
//! preparation and execution orchestration (§3, §4.2).

mod allocator;
mod connection;

pub use connection::{Connection, UserOutput};

use crate::error::{InconsistentModelData, InvalidArgument, NotReady, Result};
use crate::ops::{Binding, ChunkSource, Operation};
use crate::storage::{Storage, StorageKey, View};
use allocator::Allocator;
use lattice_gpu::Context;
use std::collections::HashMap;

slotmap::new_key_type! {
    /// Handle to an operation owned by a `Model`. `Copy`, stable across
    /// `prepare`/`execute` calls — the graph never hands out raw pointers
    /// or back-references (§5 design note).
    pub struct OpKey;
}

/// The operation graph: an ordered list of operations, a multimap of
/// connections, and the set of user-requested outputs (§3).
pub struct Model {
    pub(crate) ops: slotmap::SlotMap<OpKey, Box<dyn Operation>>,
    pub(crate) order: Vec<OpKey>,
    pub(crate) connections: Vec<Connection>,
    user_outputs: Vec<UserOutput>,
    pub(crate) storages: slotmap::SlotMap<StorageKey, Storage>,
    pub(crate) output_storage: HashMap<(OpKey, usize), StorageKey>,
    /// Last `execute`'s Softmax results, keyed by op (§4.4.5). Softmax has
    /// no bound output storage (`accepts_storage_output` is false), so its
    /// result lives here instead of in `storages`.
    softmax_outputs: HashMap<OpKey, Vec<f32>>,
    /// Inputs bound to an out-of-scope texture (bitmap/scene-graph
    /// collaborator) rather than to another operation's output (§6
    /// `ExternalTextureSource`). Set by `InferenceRunner::before_processing`
    /// ahead of each `execute`.
    external_inputs: HashMap<(OpKey, usize), lattice_gpu::Texture>,
    prepared: bool,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self {
            ops: slotmap::SlotMap::with_key(),
            order: Vec::new(),
            connections: Vec::new(),
            user_outputs: Vec::new(),
            storages: slotmap::SlotMap::with_key(),
            output_storage: HashMap::new(),
            softmax_outputs: HashMap::new(),
            external_inputs: HashMap::new(),
            prepared: false,
        }
    }

    pub fn add_operation(&mut self, op: Box<dyn Operation>) -> OpKey {
        let key = self.ops.insert(op);
        self.order.push(key);
        key
    }

    /// Adds a connection. Rejected if `dest` was not added after `source`
    /// (§5: "operations in a model execute strictly in addition order" —
    /// a connection against that order would be an unsatisfiable cycle).
    pub fn add_connection(&mut self, connection: Connection) -> std::result::Result<(), InvalidArgument> {
        let source_index = self.order.iter().position(|&k| k == connection.source);
        let dest_index = self.order.iter().position(|&k| k == connection.dest);
        match (source_index, dest_index) {
            (Some(s), Some(d)) if s < d => {
                self.connections.push(connection);
                self.prepared = false;
                Ok(())
            }
            (Some(_), Some(_)) => Err(InvalidArgument(
                "connection destination must have been added after its source".into(),
            )),
            _ => Err(InvalidArgument("connection references an operation not in this model".into())),
        }
    }

    pub fn add_user_output(&mut self, op: OpKey, output: usize) {
        self.user_outputs.push(UserOutput { op, output });
    }

    /// Binds `input` of `op` to an externally-uploaded texture for the next
    /// `execute` (§6). Overwrites any previous binding for the same slot —
    /// callers rebind every run, since the bitmap's content may have
    /// changed.
    pub fn bind_external_input(&mut self, op: OpKey, input: usize, texture: lattice_gpu::Texture) {
        self.external_inputs.insert((op, input), texture);
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// (1) Prepares each operation's shaders/weights; (2) runs the storage
    /// allocator/recycler to bind every connection's output (§2, §4.2).
    /// Idempotent once ready.
    pub fn prepare(&mut self, gpu: &Context, chunks: &dyn ChunkSource) -> Result<()> {
        if self.prepared {
            return Ok(());
        }
        for &op_key in &self.order.clone() {
            self.ops[op_key].prepare(gpu, chunks)?;
        }
        Allocator::new().run(self, gpu)?;
        self.prepared = true;
        Ok(())
    }

    /// Iterates operations in addition order, executing each against its
    /// bound inputs/output, then flushes (§4.4 "Execution", §5 "A
    /// `flush()` is inserted after the terminal operation").
    pub fn execute(&mut self, gpu: &Context) -> Result<()> {
        if !self.prepared {
            return Err(NotReady("Model::execute called before prepare".into()).into());
        }
        for &op_key in &self.order.clone() {
            if !self.output_storage.contains_key(&(op_key, 0)) {
                // Vector-output operations (Dense w/o further connections,
                // Softmax) are driven by the caller (InferenceRunner /
                // scheduler adapter), not through the generic GPU path.
                continue;
            }
            let bindings = self.gather_bindings(op_key)?;
            let output_key = self.output_storage[&(op_key, 0)];
            // Disjoint borrow: operate on `ops` and `storages` as
            // separate fields so the op's `&mut self` doesn't alias the
            // storage it reads/writes.
            let Model { ops, storages, .. } = self;
            ops[op_key].execute(gpu, &bindings, &storages[output_key])?;
        }
        gpu.flush()?;

        // Softmax has no bound storage (§4.4.5) and is driven by the
        // before_execute/execute_slice/after_execute protocol directly,
        // reading its input back from host memory once the GPU pipeline
        // above has been flushed.
        for &op_key in &self.order.clone() {
            let Some(softmax) = self.ops[op_key].as_softmax() else { continue };
            let input_storage = self.resolve_input_storage(op_key, 0)?;
            let input = input_storage.read_to_host(gpu)?;
            softmax.before_execute(&input);
            softmax.execute_slice(0, 1);
            let output = softmax.after_execute();
            self.softmax_outputs.insert(op_key, output);
        }
        Ok(())
    }

    fn resolve_input_storage(&self, op_key: OpKey, input: usize) -> Result<&Storage> {
        let connection = self
            .connections
            .iter()
            .find(|c| c.dest == op_key && c.dest_input == input)
            .ok_or_else(|| InconsistentModelData(format!("input {input} has no incoming connection")))?;
        let storage_key = *self.output_storage.get(&(connection.source, connection.source_output)).ok_or_else(|| {
            InconsistentModelData("softmax input's source operation has no bound storage".into())
        })?;
        Ok(&self.storages[storage_key])
    }

    /// A Softmax operation's most recent result (§4.4.5); `None` until
    /// `execute` has run at least once, or for any other operation.
    pub fn softmax_output(&self, op: OpKey) -> Option<&[f32]> {
        self.softmax_outputs.get(&op).map(Vec::as_slice)
    }

    fn gather_bindings(&self, op_key: OpKey) -> Result<Vec<Binding<'_>>> {
        let input_count = self.ops[op_key].input_count();
        let mut bindings = Vec::with_capacity(input_count);
        for input in 0..input_count {
            if let Some(&texture) = self.external_inputs.get(&(op_key, input)) {
                bindings.push(Binding::ExternalTexture(texture));
                continue;
            }
            let connection = self.connections.iter().find(|c| c.dest == op_key && c.dest_input == input);
            let binding = match connection {
                Some(c) => {
                    let storage_key = *self.output_storage.get(&(c.source, c.source_output)).ok_or_else(|| {
                        InconsistentModelData(format!("input {input} of an operation has no bound storage"))
                    })?;
                    let storage = &self.storages[storage_key];
                    if c.shuffle > 0 {
                        Binding::View(View::shuffle(storage, c.shuffle)?)
                    } else {
                        Binding::Storage(storage)
                    }
                }
                None => {
                    return Err(InconsistentModelData(format!("input {input} has no incoming connection")).into());
                }
            };
            bindings.push(binding);
        }
        Ok(bindings)
    }

    pub fn user_outputs(&self) -> &[UserOutput] {
        &self.user_outputs
    }

    /// Operations in addition order, for introspection (serialization,
    /// tooling) without exposing the `SlotMap` itself.
    pub fn operations(&self) -> impl Iterator<Item = (OpKey, &dyn Operation)> {
        self.order.iter().map(|&key| (key, self.ops[key].as_ref()))
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn op_key_by_name(&self, name: &str) -> Option<OpKey> {
        self.order.iter().copied().find(|&key| self.ops[key].name() == name)
    }

    pub fn storage_for(&self, op: OpKey, output: usize) -> Option<&Storage> {
        self.output_storage.get(&(op, output)).map(|&key| &self.storages[key])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{Pooling2D, Pooling2DParams, PoolOp};
    use crate::size::Padding;

    struct NoChunks;
    impl ChunkSource for NoChunks {
        fn chunk(&self, _id: &str) -> Option<&[u8]> {
            None
        }
    }

    #[test]
    fn rejects_connection_against_addition_order() {
        let mut model = Model::new();
        let a = model.add_operation(Box::new(
            Pooling2D::new("a", Pooling2DParams { op: PoolOp::Max, size: 2, stride: 2, padding: Padding::Valid }).unwrap(),
        ));
        let b = model.add_operation(Box::new(
            Pooling2D::new("b", Pooling2DParams { op: PoolOp::Max, size: 2, stride: 2, padding: Padding::Valid }).unwrap(),
        ));
        // b -> a is backwards relative to addition order.
        let result = model.add_connection(Connection { source: b, source_output: 0, dest: a, dest_input: 0, shuffle: 0 });
        assert!(result.is_err());
    }
}
