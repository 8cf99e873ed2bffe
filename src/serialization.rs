//! Textual model serialization (§6): a YAML listing with `ops:` and
//! `connections:` sections, round-tripped with `serde_yaml`.
//!
//! Reconstructing a `Model` needs each operation's concrete,
//! type-specific parameters back out of its `Box<dyn Operation>` — the
//! `as_conv2d`/`as_pooling2d`/`as_dense`/`as_image_sampler` downcast hooks
//! on `Operation` exist for exactly this (§9 "tagged-variant Operation
//! trait").

use crate::error::{IOError, Result};
use lattice_nnets::emitter::Activation;
use lattice_nnets::ops::{
    self, Conv2D, Conv2DParams, Dense, DenseParams, ImageSampler, ImageSamplerParams, PoolOp,
    Pooling2D, Pooling2DParams, Rotation, Softmax,
};
use lattice_nnets::size::Padding;
use lattice_nnets::{Connection, Model};
use serde::{Deserialize, Serialize};

fn default_stride() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_groups() -> u32 {
    1
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
enum PaddingField {
    #[default]
    Valid,
    Same,
}

impl From<PaddingField> for Padding {
    fn from(value: PaddingField) -> Self {
        match value {
            PaddingField::Valid => Padding::Valid,
            PaddingField::Same => Padding::Same,
        }
    }
}

impl From<Padding> for PaddingField {
    fn from(value: Padding) -> Self {
        match value {
            Padding::Valid => PaddingField::Valid,
            Padding::Same => PaddingField::Same,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
enum ActivationField {
    #[default]
    Default,
    Brelu6,
    SigmoidLike,
}

impl From<ActivationField> for Activation {
    fn from(value: ActivationField) -> Self {
        match value {
            ActivationField::Default => Activation::Default,
            ActivationField::Brelu6 => Activation::Brelu6,
            ActivationField::SigmoidLike => Activation::SigmoidLike,
        }
    }
}

impl From<Activation> for ActivationField {
    fn from(value: Activation) -> Self {
        match value {
            Activation::Default => ActivationField::Default,
            Activation::Brelu6 => ActivationField::Brelu6,
            Activation::SigmoidLike => ActivationField::SigmoidLike,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum PoolOperatorField {
    Max,
    Average,
}

impl From<PoolOperatorField> for PoolOp {
    fn from(value: PoolOperatorField) -> Self {
        match value {
            PoolOperatorField::Max => PoolOp::Max,
            PoolOperatorField::Average => PoolOp::Average,
        }
    }
}

impl From<PoolOp> for PoolOperatorField {
    fn from(value: PoolOp) -> Self {
        match value {
            PoolOp::Max => PoolOperatorField::Max,
            PoolOp::Average => PoolOperatorField::Average,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "_type", rename_all = "snake_case")]
enum OpListing {
    Conv2d {
        _name: String,
        kernel_size: u32,
        input_channels: u32,
        output_channels: u32,
        #[serde(default = "default_stride")]
        stride: u32,
        #[serde(default)]
        padding: PaddingField,
        #[serde(default = "default_true")]
        use_bias: bool,
        #[serde(default = "default_groups")]
        groups: u32,
        #[serde(default)]
        activation: ActivationField,
    },
    Pooling2d {
        _name: String,
        operator: PoolOperatorField,
        size: u32,
        #[serde(default = "default_stride")]
        stride: u32,
        #[serde(default)]
        padding: PaddingField,
    },
    Dense {
        _name: String,
        input_dims: u32,
        output_dims: u32,
        use_bias: bool,
    },
    ImageSampler {
        _name: String,
        output_width: u32,
        output_height: u32,
        #[serde(default = "default_true")]
        center_crop: bool,
        #[serde(default = "default_true")]
        linear_interp: bool,
    },
    Softmax {
        _name: String,
    },
}

impl OpListing {
    fn name(&self) -> &str {
        match self {
            OpListing::Conv2d { _name, .. }
            | OpListing::Pooling2d { _name, .. }
            | OpListing::Dense { _name, .. }
            | OpListing::ImageSampler { _name, .. }
            | OpListing::Softmax { _name } => _name,
        }
    }

    fn into_operation(self) -> Result<Box<dyn ops::Operation>> {
        let name = self.name().to_string();
        let wrap = |e: lattice_nnets::error::InvalidArgument| -> crate::error::Error {
            crate::error::InferenceTimeError {
                operation: name.clone(),
                source: lattice_nnets::error::InferenceError::InvalidArgument(e),
            }
            .into()
        };
        Ok(match self {
            OpListing::Conv2d {
                _name,
                kernel_size,
                input_channels,
                output_channels,
                stride,
                padding,
                use_bias,
                groups,
                activation,
            } => Box::new(
                Conv2D::new(
                    _name,
                    Conv2DParams {
                        kernel: (kernel_size, kernel_size),
                        input_channels,
                        output_channels,
                        stride,
                        padding: padding.into(),
                        use_bias,
                        groups,
                        activation: activation.into(),
                    },
                )
                .map_err(wrap)?,
            ),
            OpListing::Pooling2d { _name, operator, size, stride, padding } => Box::new(
                Pooling2D::new(
                    _name,
                    Pooling2DParams { op: operator.into(), size, stride, padding: padding.into() },
                )
                .map_err(wrap)?,
            ),
            OpListing::Dense { _name, input_dims, output_dims, use_bias } => Box::new(
                Dense::new(_name, DenseParams { input_channels: input_dims, output_channels: output_dims, use_bias })
                    .map_err(wrap)?,
            ),
            OpListing::ImageSampler { _name, output_width, output_height, center_crop, linear_interp } => {
                Box::new(ImageSampler::new(
                    _name,
                    ImageSamplerParams {
                        output_width,
                        output_height,
                        center_crop,
                        linear_interp,
                        rotation: Rotation::None,
                    },
                ))
            }
            OpListing::Softmax { _name } => Box::new(Softmax::new(_name)),
        })
    }

    fn from_operation(op: &dyn ops::Operation) -> Option<OpListing> {
        let name = op.name().to_string();
        if let Some(conv) = op.as_conv2d() {
            let p = conv.params();
            return Some(OpListing::Conv2d {
                _name: name,
                kernel_size: p.kernel.0,
                input_channels: p.input_channels,
                output_channels: p.output_channels,
                stride: p.stride,
                padding: p.padding.into(),
                use_bias: p.use_bias,
                groups: p.groups,
                activation: p.activation.into(),
            });
        }
        if let Some(pool) = op.as_pooling2d() {
            let p = pool.params();
            return Some(OpListing::Pooling2d {
                _name: name,
                operator: p.op.into(),
                size: p.size,
                stride: p.stride,
                padding: p.padding.into(),
            });
        }
        if let Some(dense) = op.as_dense() {
            let p = dense.params();
            return Some(OpListing::Dense {
                _name: name,
                input_dims: p.input_channels,
                output_dims: p.output_channels,
                use_bias: p.use_bias,
            });
        }
        if let Some(sampler) = op.as_image_sampler() {
            let p = sampler.params();
            return Some(OpListing::ImageSampler {
                _name: name,
                output_width: p.output_width,
                output_height: p.output_height,
                center_crop: p.center_crop,
                linear_interp: p.linear_interp,
            });
        }
        if op.as_softmax().is_some() {
            return Some(OpListing::Softmax { _name: name });
        }
        None
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct ConnectionListing {
    from: String,
    to: String,
    #[serde(default)]
    from_output: usize,
    #[serde(default)]
    to_input: usize,
    #[serde(default)]
    shuffle: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
struct ModelListing {
    #[serde(default)]
    ops: Vec<OpListing>,
    #[serde(default)]
    connections: Vec<ConnectionListing>,
}

/// Builds a `Model` from a textual listing (§6). Operations are added in
/// listing order, which becomes their addition order (§5 "operations
/// execute strictly in addition order"); connections are then added
/// against that order, so a listing whose connections run backwards is
/// rejected exactly as `Model::add_connection` rejects it when built by
/// hand.
pub fn deserialize_model(text: &str) -> Result<Model> {
    let listing: ModelListing = serde_yaml::from_str(text).map_err(|e| IOError(e.to_string()))?;
    let mut model = Model::new();
    for op_listing in listing.ops {
        let op = op_listing.into_operation()?;
        model.add_operation(op);
    }
    for conn in listing.connections {
        let source = model
            .op_key_by_name(&conn.from)
            .ok_or_else(|| IOError(format!("connection references unknown operation '{}'", conn.from)))?;
        let dest = model
            .op_key_by_name(&conn.to)
            .ok_or_else(|| IOError(format!("connection references unknown operation '{}'", conn.to)))?;
        model
            .add_connection(Connection {
                source,
                source_output: conn.from_output,
                dest,
                dest_input: conn.to_input,
                shuffle: conn.shuffle,
            })
            .map_err(|e| IOError(e.0))?;
    }
    Ok(model)
}

/// Renders a `Model` back to its textual listing (§6, §8 invariant 1
/// "round-trip... produces a model whose operation names, types,
/// parameters and connections exactly match").
pub fn serialize_model(model: &Model) -> Result<String> {
    let mut names = std::collections::HashMap::new();
    let mut ops = Vec::new();
    for (key, op) in model.operations() {
        names.insert(key, op.name().to_string());
        let listing = OpListing::from_operation(op).ok_or_else(|| {
            IOError(format!("operation '{}' has no serializable representation", op.name()))
        })?;
        ops.push(listing);
    }
    let connections = model
        .connections()
        .iter()
        .map(|c| ConnectionListing {
            from: names[&c.source].clone(),
            to: names[&c.dest].clone(),
            from_output: c.source_output,
            to_input: c.dest_input,
            shuffle: c.shuffle,
        })
        .collect();
    let listing = ModelListing { ops, connections };
    serde_yaml::to_string(&listing).map_err(|e| IOError(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_small_pooling_model() {
        let text = "\
ops:
  - _name: pool1
    _type: pooling2d
    operator: max
    size: 2
    stride: 2
    padding: valid
connections: []
";
        let model = deserialize_model(text).unwrap();
        assert_eq!(model.operations().count(), 1);
        let rendered = serialize_model(&model).unwrap();
        let reparsed = deserialize_model(&rendered).unwrap();
        assert_eq!(reparsed.operations().count(), 1);
        let (_, op) = reparsed.operations().next().unwrap();
        assert_eq!(op.name(), "pool1");
        assert!(op.as_pooling2d().is_some());
    }

    #[test]
    fn rejects_connection_to_unknown_operation() {
        let text = "\
ops:
  - _name: pool1
    _type: pooling2d
    operator: max
    size: 2
connections:
  - from: pool1
    to: nonexistent
";
        assert!(deserialize_model(text).is_err());
    }
}
