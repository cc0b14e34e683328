// Diagram model values touched by editor commands

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Shape identifier
pub type ShapeId = Uuid;

/// Connector identifier
pub type ConnectorId = Uuid;

/// Generate a new unique shape ID
pub fn generate_shape_id() -> ShapeId {
    Uuid::new_v4()
}

/// Generate a new unique connector ID
pub fn generate_connector_id() -> ConnectorId {
    Uuid::new_v4()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Position and size of a shape on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub origin: Point,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            origin: Point::new(x, y),
            width,
            height,
        }
    }

    /// Same size, moved to `origin`
    pub fn moved_to(self, origin: Point) -> Self {
        Self { origin, ..self }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new(0.0, 0.0, 120.0, 60.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
    Actor,
    UseCase,
    Class,
    Enumeration,
    Note,
    Folder,
}

impl ShapeKind {
    /// Whether other shapes can be dropped into this one
    pub fn is_container(self) -> bool {
        matches!(self, ShapeKind::Folder)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    pub id: ShapeId,
    pub kind: ShapeKind,
    pub label: String,
    pub bounds: Bounds,
    /// Literals of an enumeration shape, in display order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub literals: Vec<String>,
    /// Folder the shape was dropped into (`None` = diagram root)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<ShapeId>,
}

impl Shape {
    pub fn new(kind: ShapeKind, label: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            id: generate_shape_id(),
            kind,
            label: label.into(),
            bounds,
            literals: Vec::new(),
            folder: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectorKind {
    Association,
    Dependency,
    Generalization,
    Include,
    Extend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    pub id: ConnectorId,
    pub kind: ConnectorKind,
    pub source: ShapeId,
    pub target: ShapeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Connector {
    pub fn new(kind: ConnectorKind, source: ShapeId, target: ShapeId) -> Self {
        Self {
            id: generate_connector_id(),
            kind,
            source,
            target,
            label: None,
        }
    }

    pub fn touches(&self, shape: ShapeId) -> bool {
        self.source == shape || self.target == shape
    }
}

/// All shapes and connectors of one diagram
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagram {
    pub shapes: BTreeMap<ShapeId, Shape>,
    pub connectors: BTreeMap<ConnectorId, Connector>,
}

/// A single change sent to the remote diagram store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum DiagramChange {
    ShapeUpserted(Shape),
    ShapeRemoved(ShapeId),
    ConnectorUpserted(Connector),
    ConnectorRemoved(ConnectorId),
}
