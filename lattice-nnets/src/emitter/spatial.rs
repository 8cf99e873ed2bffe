//! Spatial filtering mixin (§4.3): neighborhood sampling helpers shared by
//! Conv2D and Pooling2D.

/// Per-shader neighborhood description. Host side converts
/// `(texture_w, texture_h)` into per-pixel deltas (§4.3).
pub struct SpatialMixin {
    pub nb_x: u32,
    pub nb_y: u32,
}

impl SpatialMixin {
    pub fn new(nb_x: u32, nb_y: u32) -> Self {
        Self { nb_x, nb_y }
    }

    /// Number of 2D deltas needed: `⌈max(nbX,nbY)/2⌉` (§4.3).
    pub fn delta_count(&self) -> u32 {
        self.nb_x.max(self.nb_y).div_ceil(2)
    }

    /// GLSL declarations for the neighborhood: a uniform delta array and an
    /// optional runtime `shift` uniform selecting a channel quad.
    pub fn declarations(&self) -> Vec<String> {
        vec![format!("uniform vec2 u_delta[{}]", self.delta_count())]
    }

    /// Per-pixel deltas in texture-space for a texture sized
    /// `(texture_w, texture_h)`.
    pub fn deltas_for_texture(&self, texture_w: u32, texture_h: u32) -> Vec<(f32, f32)> {
        let dx = 1.0 / texture_w.max(1) as f32;
        let dy = 1.0 / texture_h.max(1) as f32;
        (0..self.delta_count()).map(|i| (dx * (i + 1) as f32, dy * (i + 1) as f32)).collect()
    }

    /// Emits an inline texture fetch at a fixed `(x, y)` neighborhood
    /// offset: `sample_inline(input, idx, (x, y), shift)`.
    pub fn sample_inline(&self, input: &str, idx: u32, xy: (i32, i32), shift: Option<&str>) -> String {
        let (x, y) = xy;
        match shift {
            Some(shift) => format!(
                "texture2D({input}, v_uv + vec2(float({x}), float({y})) * u_delta[{idx}] + {shift})"
            ),
            None => format!("texture2D({input}, v_uv + vec2(float({x}), float({y})) * u_delta[{idx}])"),
        }
    }

    /// Emits a single runtime-shifted fetch: `sample(input, idx, shift)`.
    pub fn sample(&self, input: &str, idx: u32, shift: &str) -> String {
        format!("texture2D({input}, v_uv + u_delta[{idx}] + {shift})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_count_rounds_up_from_max_neighborhood_axis() {
        assert_eq!(SpatialMixin::new(3, 3).delta_count(), 2);
        assert_eq!(SpatialMixin::new(4, 2).delta_count(), 2);
        assert_eq!(SpatialMixin::new(1, 1).delta_count(), 1);
    }

    #[test]
    fn inline_sample_embeds_index_and_offset() {
        let mixin = SpatialMixin::new(3, 3);
        let text = mixin.sample_inline("features0", 1, (-1, 0), None);
        assert!(text.contains("features0"));
        assert!(text.contains("u_delta[1]"));
    }
}
