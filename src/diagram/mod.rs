// Diagram model used by the editor commands

pub mod types;

pub use types::{
    Bounds, Connector, ConnectorId, ConnectorKind, Diagram, DiagramChange, Point, Shape, ShapeId,
    ShapeKind,
};
