//! Deferred GPU-thread resource recycling (§3, §4.6).
//!
//! Storages and programs may be dropped from any thread. Their GL objects
//! must only ever be deleted by the GPU-owning thread, so a `Drop` impl
//! enqueues a deleter here instead of calling into GL directly; the GPU
//! thread drains the bin at its own convenience (on `Context::flush`, and
//! at the top of every `before_processing`/`process_on_gpu` phase).

use crate::handles::{BufferKey, ProgramKey, TextureKey};
use std::sync::Mutex;

pub(crate) enum Deleter {
    Texture(TextureKey),
    Buffer(BufferKey),
    Program(ProgramKey),
}

/// Producer/consumer queue of pending GL object deletions.
pub(crate) struct RecycleBin {
    queue: Mutex<Vec<Deleter>>,
}

impl RecycleBin {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Called from any thread when a handle's owner is dropped.
    pub(crate) fn enqueue(&self, deleter: Deleter) {
        self.queue.lock().unwrap().push(deleter);
    }

    /// Called only from the GPU thread: drains and returns everything
    /// pending so the caller can delete the underlying GL objects.
    pub(crate) fn drain(&self) -> Vec<Deleter> {
        std::mem::take(&mut *self.queue.lock().unwrap())
    }
}
