//! Shape — the drawing primitives a room is built from.
//!
//! DESIGN
//! ======
//! Clients send `shapeType` and `shapeData` as separate fields. The pair is
//! decoded into the [`Shape`] sum type at admission; unknown tags are
//! rejected instead of being stored as opaque blobs. Listing serializes the
//! tagged form (`{"type": "rect", "x": ..}`) so late joiners get one object
//! per shape.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rect,
    Circle,
    Pencil,
}

impl ShapeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rect => "rect",
            Self::Circle => "circle",
            Self::Pencil => "pencil",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "rect" => Some(Self::Rect),
            "circle" => Some(Self::Circle),
            "pencil" => Some(Self::Pencil),
            _ => None,
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Circle {
    pub center_x: f64,
    pub center_y: f64,
    pub radius_x: f64,
    pub radius_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Freehand stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pencil {
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Rect(Rect),
    Circle(Circle),
    Pencil(Pencil),
}

#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("unknown shape type: {0}")]
    UnknownType(String),
    #[error("invalid {kind} data: {source}")]
    InvalidData {
        kind: ShapeKind,
        #[source]
        source: serde_json::Error,
    },
}

impl Shape {
    /// Decode a shape from its wire tag and payload.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::UnknownType`] for an unrecognized tag and
    /// [`ShapeError::InvalidData`] when the payload does not match the tag.
    pub fn from_parts(shape_type: &str, data: &Value) -> Result<Self, ShapeError> {
        let Some(kind) = ShapeKind::parse(shape_type) else {
            return Err(ShapeError::UnknownType(shape_type.to_owned()));
        };
        let invalid = |source| ShapeError::InvalidData { kind, source };
        match kind {
            ShapeKind::Rect => Rect::deserialize(data).map(Self::Rect).map_err(invalid),
            ShapeKind::Circle => Circle::deserialize(data).map(Self::Circle).map_err(invalid),
            ShapeKind::Pencil => Pencil::deserialize(data).map(Self::Pencil).map_err(invalid),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Rect(_) => ShapeKind::Rect,
            Self::Circle(_) => ShapeKind::Circle,
            Self::Pencil(_) => ShapeKind::Pencil,
        }
    }

    /// The untagged payload, as stored and broadcast under `shapeData`.
    #[must_use]
    pub fn data(&self) -> Value {
        let encoded = match self {
            Self::Rect(rect) => serde_json::to_value(rect),
            Self::Circle(circle) => serde_json::to_value(circle),
            Self::Pencil(pencil) => serde_json::to_value(pencil),
        };
        encoded.unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "shape_test.rs"]
mod tests;
