//! Storage allocator and recycler (§4.2) — the reuse policy the rest of
//! the engine exists to feed.
//!
//! `Model::prepare` traverses operations in addition order, threading a
//! `refs` multiset of `storage -> {dependent ops still to run}`. A
//! storage becomes a reuse candidate the moment its dependent set empties.
//!
//! Depth-capping (reserved channels for co-sampled multi-input reads) is
//! not implemented: every storage is allocated with `reserved_channels =
//! 0`. This is a known gap, not a verified no-op: packing a co-sampled
//! storage's channels in unreserved slots changes which texture a given
//! channel quad lands in, and grouped/general Conv2D now binds one
//! texture unit per input-channel quad in its group (§4.4.1) — a denser
//! packing here would need those bind sites to stay in sync. Tracked in
//! DESIGN.md rather than assumed safe.

use super::{Connection, Model, OpKey};
use crate::error::Result;
use crate::size::Size;
use crate::storage::{Storage, StorageKey};
use lattice_gpu::Context;
use std::collections::{HashMap, HashSet};

pub(crate) struct Allocator {
    refs: HashMap<StorageKey, HashSet<OpKey>>,
    /// Storages bound to a user output: never reuse candidates, since they
    /// must still hold their values after the run finishes (§4.7).
    pinned: HashSet<StorageKey>,
}

impl Allocator {
    pub(crate) fn new() -> Self {
        Self { refs: HashMap::new(), pinned: HashSet::new() }
    }

    /// Runs the reuse policy for the whole model, populating
    /// `model.output_storage` and `model.storages`.
    pub(crate) fn run(&mut self, model: &mut Model, gpu: &Context) -> Result<()> {
        let by_output = group_connections_by_source(&model.connections);
        let user_outputs: HashSet<(OpKey, usize)> =
            model.user_outputs().iter().map(|u| (u.op, u.output)).collect();
        let order = model.order.clone();

        for op_key in order {
            let output_count = model.ops[op_key].output_count();
            for output in 0..output_count {
                if !model.ops[op_key].accepts_storage_output(output) {
                    continue;
                }
                let no_conn: Vec<usize> = Vec::new();
                let conn_indices = by_output.get(&(op_key, output)).unwrap_or(&no_conn);
                // A terminal operation (no outgoing connection) still needs
                // a bound storage if its output is requested directly
                // (§4.7 "fetching user-requested outputs").
                if conn_indices.is_empty() && !user_outputs.contains(&(op_key, output)) {
                    continue;
                }
                if model.output_storage.contains_key(&(op_key, output)) {
                    continue;
                }

                let input_sizes = gather_bound_input_sizes(model, op_key);
                let desired = model.ops[op_key].get_output_size(output, &input_sizes);
                let max_padding = conn_indices
                    .iter()
                    .map(|&i| {
                        let c = model.connections[i];
                        model.ops[c.dest].get_input_padding(c.dest_input)
                    })
                    .max()
                    .unwrap_or(0);
                let reserved_channels = 0;

                let storage_key = self
                    .find_reusable(model, desired, max_padding, reserved_channels)
                    .map(Ok)
                    .unwrap_or_else(|| allocate_new(model, gpu, desired, max_padding, reserved_channels))?;

                model.output_storage.insert((op_key, output), storage_key);
                if user_outputs.contains(&(op_key, output)) {
                    self.pinned.insert(storage_key);
                }
                let deps = self.refs.entry(storage_key).or_default();
                for &i in conn_indices {
                    deps.insert(model.connections[i].dest);
                }
            }

            for deps in self.refs.values_mut() {
                deps.remove(&op_key);
            }
        }
        Ok(())
    }

    fn find_reusable(&self, model: &Model, desired: Size, padding: u32, reserved: u32) -> Option<StorageKey> {
        self.refs
            .iter()
            .filter(|(key, deps)| deps.is_empty() && !self.pinned.contains(key))
            .find_map(|(&key, _)| {
                let storage = &model.storages[key];
                let matches = storage.size() == desired
                    && storage.pad() >= padding
                    && storage.reserved_channels() == reserved;
                matches.then_some(key)
            })
    }
}

fn allocate_new(model: &mut Model, gpu: &Context, desired: Size, padding: u32, reserved: u32) -> Result<StorageKey> {
    let storage = if desired.width == 1 && desired.height == 1 {
        Storage::allocate_flat(gpu, desired.depth)?
    } else {
        Storage::allocate(gpu, desired, padding, reserved)?
    };
    Ok(model.storages.insert(storage))
}

fn group_connections_by_source(connections: &[Connection]) -> HashMap<(OpKey, usize), Vec<usize>> {
    let mut map: HashMap<(OpKey, usize), Vec<usize>> = HashMap::new();
    for (i, c) in connections.iter().enumerate() {
        map.entry((c.source, c.source_output)).or_default().push(i);
    }
    map
}

fn gather_bound_input_sizes(model: &Model, op_key: OpKey) -> Vec<Size> {
    let input_count = model.ops[op_key].input_count();
    (0..input_count)
        .map(|input| {
            model
                .connections
                .iter()
                .find(|c| c.dest == op_key && c.dest_input == input)
                .and_then(|c| model.output_storage.get(&(c.source, c.source_output)))
                .map(|&key| model.storages[key].size())
                .unwrap_or(Size::new(0, 0, 0))
        })
        .collect()
}
