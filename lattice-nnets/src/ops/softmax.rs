//! Softmax (§4.4.5): CPU-only, cooperative multi-threaded. Runs after
//! every GPU operation; pulls its input storage back to host memory.
//!
//! This operation never touches `AbstractTask` itself — the scheduler
//! wrapper living in the `lattice` crate drives `before_execute`/
//! `execute_slice`/`after_execute` across its worker pool.

use super::{Binding, ChunkSource, Operation, SampledChannels};
use crate::error::{InferenceError, RuntimeError};
use crate::size::Size;
use crate::storage::Storage;
use lattice_gpu::Context;
use std::sync::Mutex;

pub struct Softmax {
    name: String,
    depth: u32,
    working: Mutex<Vec<f32>>,
    partial_sums: Mutex<Vec<f64>>,
}

impl std::fmt::Debug for Softmax {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Softmax").field("name", &self.name).field("depth", &self.depth).finish()
    }
}

impl Softmax {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depth: 0,
            working: Mutex::new(Vec::new()),
            partial_sums: Mutex::new(Vec::new()),
        }
    }

    /// `before_execute`: pull the input vector from host-bound bytes into
    /// the working vector (§4.4.5).
    pub fn before_execute(&self, input: &[f32]) {
        *self.working.lock().unwrap() = input.to_vec();
    }

    /// `execute(slice)`: a worker exponentiates its slice in place and
    /// stores its partial sum (§4.4.5).
    pub fn execute_slice(&self, slice_index: usize, slice_count: usize) {
        let mut working = self.working.lock().unwrap();
        let len = working.len();
        let chunk = len.div_ceil(slice_count.max(1));
        let start = (slice_index * chunk).min(len);
        let end = (start + chunk).min(len);
        let mut sum = 0.0f64;
        for x in &mut working[start..end] {
            *x = x.exp();
            sum += *x as f64;
        }
        drop(working);
        let mut sums = self.partial_sums.lock().unwrap();
        if sums.len() <= slice_index {
            sums.resize(slice_index + 1, 0.0);
        }
        sums[slice_index] = sum;
    }

    /// `after_execute`: total = Σ partial sums; scale in place.
    pub fn after_execute(&self) -> Vec<f32> {
        let total: f64 = self.partial_sums.lock().unwrap().iter().sum();
        let mut working = self.working.lock().unwrap();
        if total > 0.0 {
            for x in working.iter_mut() {
                *x = (*x as f64 / total) as f32;
            }
        }
        self.partial_sums.lock().unwrap().clear();
        working.clone()
    }
}

impl Operation for Softmax {
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

    fn accepts_storage_output(&self, _output: usize) -> bool {
        false
    }

    fn accepts_vector_output(&self, output: usize) -> bool {
        output == 0
    }

    fn get_output_size(&self, _output: usize, input_sizes: &[Size]) -> Size {
        input_sizes[0]
    }

    fn get_sampled_channels(&self, _input: usize) -> SampledChannels {
        SampledChannels { min: self.depth, max: self.depth }
    }

    fn as_softmax(&self) -> Option<&Softmax> {
        Some(self)
    }

    fn prepare(&mut self, _gpu: &Context, _chunks: &dyn ChunkSource) -> Result<(), InferenceError> {
        Ok(())
    }

    /// Softmax runs entirely on the CPU (§2, §4.4.5); `Model::execute`
    /// routes it through `before_execute`/`execute_slice`/`after_execute`
    /// instead of calling this. Present only to satisfy the `Operation`
    /// contract uniformly.
    fn execute(&mut self, _gpu: &Context, _inputs: &[Binding<'_>], _output: &Storage) -> Result<(), InferenceError> {
        Err(RuntimeError::MissingInput { op: self.name.clone(), input: 0 }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_slice_sums_to_one() {
        let softmax = Softmax::new("sm");
        softmax.before_execute(&[1.0, 2.0, 3.0, 4.0]);
        softmax.execute_slice(0, 1);
        let out = softmax.after_execute();
        let sum: f32 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "sum was {sum}");
    }

    #[test]
    fn multi_slice_matches_single_slice() {
        let a = Softmax::new("a");
        a.before_execute(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        a.execute_slice(0, 1);
        let single = a.after_execute();

        let b = Softmax::new("b");
        b.before_execute(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        b.execute_slice(0, 3);
        b.execute_slice(1, 3);
        b.execute_slice(2, 3);
        let multi = b.after_execute();

        for (x, y) in single.iter().zip(multi.iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }
}
