//! Activation mixin (§4.3): maps a `vec4` pre-activation to the fragment's
//! output expression.

/// Non-linearity applied to an operation's output (§4.4.1 parameters,
/// GLOSSARY "Activation").
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Activation {
    /// Identity clamped to `[0, 1]`.
    Default,
    /// `clamp(0.167 * x, 0, 1)` — a cheap ReLU6-like nonlinearity.
    Brelu6,
    /// A piecewise-linear approximation of a sigmoid.
    SigmoidLike,
}

impl Activation {
    /// The GLSL expression computing the activated output from `x`, a
    /// `vec4` pre-activation sum.
    pub fn apply_expr(self, x: &str) -> String {
        match self {
            Activation::Default => format!("clamp({x}, 0.0, 1.0)"),
            Activation::Brelu6 => format!("clamp(0.167 * ({x}), 0.0, 1.0)"),
            Activation::SigmoidLike => format!(
                "clamp(0.5 + 0.25 * ({x}), 0.0, 1.0) * step(-2.0, ({x})) * (1.0 - step(2.0, ({x}))) \
                 + step(2.0, ({x}))"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_activation_clamps_to_unit_range() {
        assert_eq!(Activation::Default.apply_expr("sum"), "clamp(sum, 0.0, 1.0)");
    }

    #[test]
    fn brelu6_scales_before_clamping() {
        assert!(Activation::Brelu6.apply_expr("sum").contains("0.167"));
    }
}
