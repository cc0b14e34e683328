// Command Pattern for Undo/Redo functionality
//
// This module implements the Command Pattern to enable undo/redo for all
// diagram editor operations. Every reversible edit goes through a Command.
//
// Architecture:
// - Command trait: Defines execute(), undo(), description()
// - CompositeCommand: Bundles several commands into one undo step
// - CommandHistory: Bounded undo/redo stacks for one scope
// - CommandManager: Routes commands to per-scope histories (one per diagram, plus "global")
// - Concrete commands: AddShapeCommand, MoveShapeCommand, AddEnumerationLiteralCommand, etc.
//
// Integration with the editor:
// - Commands capture a DiagramContext (local store + remote sync) when built
// - They push changes to the remote first, then update the local store
// - Store previous state for undo capability

pub mod commands;
pub mod composite;
pub mod history;
pub mod manager;
pub mod state;
pub mod trait_def;

pub use composite::CompositeCommand;
pub use history::{CommandHistory, HistoryStatus};
pub use manager::{CommandManager, GLOBAL_SCOPE};
pub use state::{DiagramContext, DiagramStore, InMemoryDiagramStore, NoopSync, RemoteSync};
pub use trait_def::{Command, CommandError, CommandResult};
