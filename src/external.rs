//! Boundary traits for the out-of-scope bitmap/scene-graph collaborator
//! (§6, §1 Non-goals). `lattice` never implements a bitmap class itself —
//! these traits are what a host application's bitmap type implements so
//! `InferenceRunner::connect` can drive it.

use lattice_gpu::{Context, GpuError, Texture};
use lattice_nnets::Size;

/// An out-of-scope texture/bitmap handler an `ImageSampler` (or an
/// image-input `Conv2D`) samples as input (§4.4.1, §4.4.4).
///
/// The spec's `bind(&self, gpu: &mut GpuThreadHandle, unit: u32)` is
/// adapted here to return the `Texture` handle it bound: `lattice-gpu`
/// resources are addressed through `Context`'s `Hub`, not a separate
/// thread-handle type, so binding and handing back the handle the model
/// graph can reference are the same step. Must only be called from the
/// pool's GPU-affine thread (§4.1, §5).
pub trait ExternalTextureSource: Send + Sync {
    fn size(&self) -> Size;

    fn bind(&self, gpu: &Context, unit: u32) -> Result<Texture, GpuError>;
}

/// A guard releasing a bitmap's content lock on drop. Opaque to
/// `InferenceRunner`, which only needs to keep it alive for the duration
/// of a job (§4.7, §5).
pub trait ReadLockGuard {}

/// The out-of-scope bitmap class implements this so `InferenceRunner`
/// can hold a read lock across `before_processing`/`process_on_gpu`/
/// `after_processing`, serializing GPU uploads against concurrent CPU
/// writers (§5 "Bitmaps supplied as inputs").
pub trait BitmapContentLock: Send + Sync {
    fn read_lock(&self) -> Box<dyn ReadLockGuard>;
}

/// A registered bitmap implements both halves of the boundary: it can be
/// sampled as a texture and it can be read-locked for a job's duration.
pub trait ExternalBitmap: ExternalTextureSource + BitmapContentLock {}

impl<T: ExternalTextureSource + BitmapContentLock> ExternalBitmap for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingGuard(Arc<AtomicUsize>);
    impl ReadLockGuard for CountingGuard {}
    impl Drop for CountingGuard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct FakeBitmap {
        locks_held: Arc<AtomicUsize>,
    }

    impl BitmapContentLock for FakeBitmap {
        fn read_lock(&self) -> Box<dyn ReadLockGuard> {
            self.locks_held.fetch_add(1, Ordering::SeqCst);
            Box::new(CountingGuard(self.locks_held.clone()))
        }
    }

    #[test]
    fn guard_release_drops_the_lock_count() {
        let locks_held = Arc::new(AtomicUsize::new(0));
        let bitmap = FakeBitmap { locks_held: locks_held.clone() };
        {
            let _guard = bitmap.read_lock();
            assert_eq!(locks_held.load(Ordering::SeqCst), 1);
        }
        assert_eq!(locks_held.load(Ordering::SeqCst), 0);
    }
}
