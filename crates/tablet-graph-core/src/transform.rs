//! Property transformers applied by the view's transformation layer.

use serde::{Deserialize, Serialize};

use crate::error::SerialisationError;
use crate::types::{Properties, PropertyValue};

/// A single-value transform function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransformFunction {
    Identity,
    /// Render any value as its display string.
    ToStr,
    /// Multiply an integer property.
    ScaleInt { factor: i64 },
    /// Append a suffix to a string property.
    AppendStr { suffix: String },
}

impl TransformFunction {
    pub fn apply(&self, value: &PropertyValue) -> Result<PropertyValue, SerialisationError> {
        match (self, value) {
            (TransformFunction::Identity, v) => Ok(v.clone()),
            (TransformFunction::ToStr, v) => Ok(PropertyValue::Str(render(v))),
            (TransformFunction::ScaleInt { factor }, PropertyValue::Int(v)) => {
                Ok(PropertyValue::Int(v.wrapping_mul(*factor)))
            }
            (TransformFunction::AppendStr { suffix }, PropertyValue::Str(s)) => {
                Ok(PropertyValue::Str(format!("{s}{suffix}")))
            }
            (f, v) => Err(SerialisationError::WrongType {
                serialiser: f.name(),
                actual: v.type_name(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            TransformFunction::Identity => "identity",
            TransformFunction::ToStr => "to-str",
            TransformFunction::ScaleInt { .. } => "scale-int",
            TransformFunction::AppendStr { .. } => "append-str",
        }
    }
}

fn render(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Bool(b) => b.to_string(),
        PropertyValue::Int(v) => v.to_string(),
        PropertyValue::Float(v) => v.to_string(),
        PropertyValue::Str(s) => s.clone(),
        PropertyValue::Bytes(b) => b.iter().map(|x| format!("{x:02x}")).collect(),
    }
}

/// Read `selection`, apply `function`, write the result to `projection`.
///
/// Selection and projection may name the same property for in-place updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformOp {
    pub selection: String,
    pub function: TransformFunction,
    pub projection: String,
}

/// An ordered list of transforms applied to an element's properties.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementTransformer {
    pub ops: Vec<TransformOp>,
}

impl ElementTransformer {
    pub fn new() -> Self {
        ElementTransformer::default()
    }

    pub fn project(
        mut self,
        selection: impl Into<String>,
        function: TransformFunction,
        projection: impl Into<String>,
    ) -> Self {
        self.ops.push(TransformOp {
            selection: selection.into(),
            function,
            projection: projection.into(),
        });
        self
    }

    /// Applies every op in order. A missing selected property is a no-op for
    /// that op; a type mismatch is an error the caller decides how to treat.
    pub fn apply(&self, properties: &mut Properties) -> Result<(), SerialisationError> {
        for op in &self.ops {
            if let Some(value) = properties.get(&op.selection) {
                let transformed = op.function.apply(value)?;
                properties.insert(op.projection.clone(), transformed);
            }
        }
        Ok(())
    }

    /// Property names read or written by this transformer.
    pub fn selections(&self) -> impl Iterator<Item = &str> {
        self.ops
            .iter()
            .flat_map(|op| [op.selection.as_str(), op.projection.as_str()])
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
