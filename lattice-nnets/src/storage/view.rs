//! `Storage::View`: a slice-and-remap over a `Storage` (§3).
//!
//! A view is an ordered list of storage channel-quads plus the compact set
//! of texture indices it touches, constructed as an identity view, a
//! contiguous slice, or a shuffle permutation.

use super::Storage;
use crate::error::InvalidArgument;

/// A read-only reordering of a storage's channel-quads, bound as an
/// operation's input in place of the raw storage (§3, §4.3).
#[derive(Clone, Debug)]
pub struct View {
    storage_quads: Vec<u32>,
    textures: Vec<usize>,
}

impl View {
    /// The view covers every quad of `storage`, in order.
    pub fn identity(storage: &Storage) -> Self {
        let quads: Vec<u32> = (0..storage.channel_quads()).collect();
        Self::from_quads(storage, quads)
    }

    /// The view covers `[first, first + count)` of `storage`'s quads.
    pub fn slice(storage: &Storage, first: u32, count: u32) -> Result<Self, InvalidArgument> {
        let n = storage.channel_quads();
        if first.saturating_add(count) > n {
            return Err(InvalidArgument(format!(
                "slice [{first}, {}) out of range for storage with {n} channel quads",
                first + count
            )));
        }
        Ok(Self::from_quads(storage, (first..first + count).collect()))
    }

    /// The view permutes `storage`'s quads by `step` (§3: "for step `s`,
    /// quad `i` of the view maps to storage quad `(s·i) mod N + (s·i) div
    /// N`"). `step` must divide `N = D/4`.
    pub fn shuffle(storage: &Storage, step: u32) -> Result<Self, InvalidArgument> {
        let n = storage.channel_quads();
        if step == 0 || n % step != 0 {
            return Err(InvalidArgument(format!(
                "shuffle step {step} must divide storage channel-quad count {n}"
            )));
        }
        let quads = (0..n).map(|i| shuffle_quad(step, i, n)).collect();
        Ok(Self::from_quads(storage, quads))
    }

    fn from_quads(storage: &Storage, storage_quads: Vec<u32>) -> Self {
        let mut textures = Vec::new();
        for &quad in &storage_quads {
            let (texture_index, _) = storage.quad_location(quad);
            if !textures.contains(&texture_index) {
                textures.push(texture_index);
            }
        }
        Self { storage_quads, textures }
    }

    pub fn len(&self) -> usize {
        self.storage_quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage_quads.is_empty()
    }

    /// The storage-level quad index that view-quad `view_index` reads from.
    pub fn storage_quad(&self, view_index: usize) -> u32 {
        self.storage_quads[view_index]
    }

    /// Distinct texture indices this view touches, in first-use order —
    /// the set a shader must bind to sample the whole view.
    pub fn referenced_textures(&self) -> &[usize] {
        &self.textures
    }
}

fn shuffle_quad(step: u32, i: u32, n: u32) -> u32 {
    let si = step * i;
    (si % n) + (si / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::size::Size;

    fn quads_storage(n: u32) -> FakeStorage {
        FakeStorage { channel_quads: n }
    }

    // `View` only needs `channel_quads` and `quad_location` off its
    // storage; a minimal stand-in avoids allocating real GPU textures.
    struct FakeStorage {
        channel_quads: u32,
    }

    impl FakeStorage {
        fn channel_quads(&self) -> u32 {
            self.channel_quads
        }

        fn quad_location(&self, quad: u32) -> (usize, (u32, u32)) {
            (quad as usize, (0, 0))
        }
    }

    fn view_identity(storage: &FakeStorage) -> Vec<u32> {
        (0..storage.channel_quads()).collect()
    }

    fn view_shuffle(storage: &FakeStorage, step: u32) -> Result<Vec<u32>, InvalidArgument> {
        let n = storage.channel_quads();
        if step == 0 || n % step != 0 {
            return Err(InvalidArgument(format!("bad step {step}")));
        }
        Ok((0..n).map(|i| shuffle_quad(step, i, n)).collect())
    }

    #[test]
    fn identity_covers_every_quad_in_order() {
        let storage = quads_storage(4);
        assert_eq!(view_identity(&storage), vec![0, 1, 2, 3]);
    }

    #[test]
    fn shuffle_rejects_non_dividing_step() {
        let storage = quads_storage(4);
        assert!(view_shuffle(&storage, 3).is_err());
    }

    #[test]
    fn shuffle_matches_spec_example_s4() {
        // 16 output channels -> N = 4 quads, step = 2.
        // View channel 0 (quad 0) must read storage channel 0 (quad 0).
        // View channel 4 (quad 1) must read storage channel 8 (quad 2).
        let mapped = view_shuffle(&quads_storage(4), 2).unwrap();
        assert_eq!(mapped[0], 0);
        assert_eq!(mapped[1], 2);
    }

    #[test]
    fn size_invariant_holds_for_view_depth() {
        let size = Size::new(4, 4, 16);
        assert_eq!(size.channel_quads(), 4);
    }
}
