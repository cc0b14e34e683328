// Command trait definition

use async_trait::async_trait;
use std::any::Any;

/// Result type for command operations
pub type CommandResult<T> = Result<T, CommandError>;

/// Errors that can occur during command execution
///
/// These are produced by concrete commands and travel unchanged through
/// `CompositeCommand`, `CommandHistory` and `CommandManager`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Command execution failed
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Undo operation failed
    #[error("Undo failed: {0}")]
    UndoFailed(String),

    /// Invalid state for this operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A diagram entity the command refers to does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Propagating the change to the remote store failed
    #[error("Sync failed: {0}")]
    Sync(String),
}

/// Description used when a command does not provide one
pub const DEFAULT_DESCRIPTION: &str = "Unnamed operation";

/// A reversible unit of work
///
/// A command instance is built for one user action and captures everything
/// it needs at construction time (identifiers, values, collaborators).
/// `undo()` reverses the most recent `execute()` on the same instance.
///
/// # Example
/// ```no_run
/// use async_trait::async_trait;
/// use studio_commands::command::trait_def::{Command, CommandError, CommandResult};
///
/// struct Counter {
///     value: i32,
///     applied: bool,
/// }
///
/// #[async_trait]
/// impl Command for Counter {
///     async fn execute(&mut self) -> CommandResult<()> {
///         self.value += 1;
///         self.applied = true;
///         Ok(())
///     }
///
///     async fn undo(&mut self) -> CommandResult<()> {
///         if !self.applied {
///             return Err(CommandError::UndoFailed("Not executed".into()));
///         }
///         self.value -= 1;
///         self.applied = false;
///         Ok(())
///     }
///
///     fn description(&self) -> String {
///         "Increment counter".into()
///     }
///
///     fn as_any(&self) -> &dyn std::any::Any {
///         self
///     }
/// }
/// ```
#[async_trait]
pub trait Command: Send + Sync {
    /// Perform the forward action
    async fn execute(&mut self) -> CommandResult<()>;

    /// Reverse the effect of the most recent `execute()`
    async fn undo(&mut self) -> CommandResult<()>;

    /// Human-readable description (e.g. "Undo: Move shape")
    fn description(&self) -> String {
        DEFAULT_DESCRIPTION.to_string()
    }

    /// Try to absorb `next`, an already executed command, into this one.
    ///
    /// Returns true if `next` was absorbed and can be dropped. Used to
    /// collapse runs of similar commands (dragging a shape) into one
    /// undo step.
    fn merge(&mut self, _next: &dyn Command) -> bool {
        false
    }

    /// Downcasting hook for `merge` implementations
    fn as_any(&self) -> &dyn Any;
}
