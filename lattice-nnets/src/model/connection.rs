//! `Connection` and `UserOutput` (§3).

use super::OpKey;

/// A tuple (source op, source output index, dest op, dest input index,
/// shuffle step). `shuffle > 0` implies a `View` with that step is
/// interposed during connection materialization (§3, §4.2).
#[derive(Clone, Copy, Debug)]
pub struct Connection {
    pub source: OpKey,
    pub source_output: usize,
    pub dest: OpKey,
    pub dest_input: usize,
    pub shuffle: u32,
}

/// A (op, output index, host-side vector) triple; after each run the host
/// vector is filled by reading back the bound storage (§3).
#[derive(Clone, Copy, Debug)]
pub struct UserOutput {
    pub op: OpKey,
    pub output: usize,
}
