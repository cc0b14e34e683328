// Studio Commands - Undo/redo core of the diagram editor

pub mod command;
pub mod config;
pub mod diagram;

// Re-export commonly used types for convenience
pub use command::{
    Command, CommandError, CommandHistory, CommandManager, CommandResult, CompositeCommand,
    DiagramContext, DiagramStore, HistoryStatus, InMemoryDiagramStore, NoopSync, RemoteSync,
    GLOBAL_SCOPE,
};
pub use config::{CommandConfig, ConfigError};
pub use diagram::{Bounds, Connector, ConnectorKind, Diagram, DiagramChange, Point, Shape, ShapeKind};
