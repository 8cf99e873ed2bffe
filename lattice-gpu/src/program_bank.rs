//! Program bank (§4.5): shares compiled fragment/compute programs across
//! operations. Generalizes the teacher's bind-group cache
//! (`BindGroupCacheKey` deduplicated by resource identity, evicted when
//! unreferenced) to whole compiled programs deduplicated by source text.

use crate::handles::Program;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

fn hash_source(source: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}

pub(crate) struct ProgramBank {
    by_hash: HashMap<u64, Program>,
}

impl ProgramBank {
    pub(crate) fn new() -> Self {
        Self {
            by_hash: HashMap::new(),
        }
    }

    /// Looks up a program previously banked under this source's hash.
    /// Returns `None` on first use; the caller compiles and calls `insert`.
    pub(crate) fn find(&self, source: &str) -> Option<Program> {
        self.by_hash.get(&hash_source(source)).copied()
    }

    pub(crate) fn insert(&mut self, source: &str, program: Program) {
        self.by_hash.insert(hash_source(source), program);
    }

    pub(crate) fn forget(&mut self, program: Program) {
        self.by_hash.retain(|_, p| *p != program);
    }
}

pub(crate) fn source_hash(source: &str) -> u64 {
    hash_source(source)
}
