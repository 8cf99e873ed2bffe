//! Neural-network inference graph, activation storage and shader emitter
//! (§2–§4.4): the domain engine layered on top of `lattice-gpu`'s backend.

pub mod emitter;
pub mod error;
pub mod model;
pub mod ops;
pub mod size;
pub mod storage;

pub use model::{Connection, Model, OpKey, UserOutput};
pub use size::{Padding, Size};
pub use storage::Storage;
