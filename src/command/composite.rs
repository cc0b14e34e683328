// CompositeCommand - several commands applied and reverted as one unit

use crate::command::trait_def::{Command, CommandResult, DEFAULT_DESCRIPTION};
use async_trait::async_trait;
use std::any::Any;

/// Description of a composite without children
pub const EMPTY_DESCRIPTION: &str = "Empty operation";

/// An ordered group of commands that undo/redo together
///
/// Children execute in order and undo in reverse order, one at a time:
/// a later child may depend on state written by an earlier one.
///
/// If a child fails during `execute()` the remaining children are skipped
/// and the error is returned unchanged. A plain composite is then left
/// partially applied; one built with [`CompositeCommand::atomic`] first
/// undoes the children that already ran.
pub struct CompositeCommand {
    commands: Vec<Box<dyn Command>>,
    description: Option<String>,
    rollback_on_failure: bool,
}

impl CompositeCommand {
    /// Create a composite from an ordered list of commands
    pub fn new(commands: Vec<Box<dyn Command>>) -> Self {
        Self {
            commands,
            description: None,
            rollback_on_failure: false,
        }
    }

    /// Create a composite with an explicit description
    pub fn with_description(commands: Vec<Box<dyn Command>>, description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::new(commands)
        }
    }

    /// Create a composite that undoes its executed prefix when a child fails
    pub fn atomic(commands: Vec<Box<dyn Command>>) -> Self {
        Self {
            rollback_on_failure: true,
            ..Self::new(commands)
        }
    }

    /// Override the generated description
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Read-only view of the children, in execution order
    pub fn commands(&self) -> &[Box<dyn Command>] {
        &self.commands
    }

    /// Owned snapshot of the children's descriptions, in execution order
    pub fn command_descriptions(&self) -> Vec<String> {
        self.commands.iter().map(|cmd| cmd.description()).collect()
    }

    /// Number of children
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn is_atomic(&self) -> bool {
        self.rollback_on_failure
    }

    /// Undo children `[0, executed)` in reverse after a failed execute.
    ///
    /// Compensation errors are logged; the caller still gets the error
    /// that triggered the rollback.
    async fn roll_back(&mut self, executed: usize) {
        for cmd in self.commands[..executed].iter_mut().rev() {
            if let Err(e) = cmd.undo().await {
                log::error!(
                    "Rollback of '{}' failed, composite left partially applied: {}",
                    cmd.description(),
                    e
                );
                return;
            }
        }
    }
}

#[async_trait]
impl Command for CompositeCommand {
    async fn execute(&mut self) -> CommandResult<()> {
        for index in 0..self.commands.len() {
            if let Err(e) = self.commands[index].execute().await {
                log::debug!(
                    "Composite child {}/{} failed: {}",
                    index + 1,
                    self.commands.len(),
                    e
                );
                if self.rollback_on_failure {
                    self.roll_back(index).await;
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn undo(&mut self) -> CommandResult<()> {
        for cmd in self.commands.iter_mut().rev() {
            cmd.undo().await?;
        }
        Ok(())
    }

    fn description(&self) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }
        match self.commands.as_slice() {
            [] => EMPTY_DESCRIPTION.to_string(),
            [only] => {
                let description = only.description();
                if description.trim().is_empty() {
                    DEFAULT_DESCRIPTION.to_string()
                } else {
                    description
                }
            }
            many => format!("{} operations", many.len()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::trait_def::test_support::*;
    use crate::command::trait_def::CommandError;

    fn three(log: &CallLog) -> Vec<Box<dyn Command>> {
        vec![
            RecordingCommand::new("c1", log).boxed(),
            RecordingCommand::new("c2", log).boxed(),
            RecordingCommand::new("c3", log).boxed(),
        ]
    }

    #[tokio::test]
    async fn test_execute_forward_undo_reverse() {
        let log = new_log();
        let mut composite = CompositeCommand::new(three(&log));

        composite.execute().await.unwrap();
        composite.undo().await.unwrap();

        assert_eq!(
            entries(&log),
            vec![
                "execute:c1",
                "execute:c2",
                "execute:c3",
                "undo:c3",
                "undo:c2",
                "undo:c1"
            ]
        );
    }

    #[test]
    fn test_description_rules() {
        let log = new_log();

        assert_eq!(CompositeCommand::new(vec![]).description(), "Empty operation");

        let single = CompositeCommand::new(vec![RecordingCommand::new("Foo", &log).boxed()]);
        assert_eq!(single.description(), "Foo");

        let unnamed =
            CompositeCommand::new(vec![RecordingCommand::new("x", &log).without_description().boxed()]);
        assert_eq!(unnamed.description(), DEFAULT_DESCRIPTION);

        assert_eq!(CompositeCommand::new(three(&log)).description(), "3 operations");
    }

    #[test]
    fn test_explicit_description_wins() {
        let log = new_log();
        let empty = CompositeCommand::with_description(vec![], "Align shapes");
        assert_eq!(empty.description(), "Align shapes");

        let many = CompositeCommand::new(three(&log)).described("Distribute shapes");
        assert_eq!(many.description(), "Distribute shapes");
    }

    #[test]
    fn test_children_snapshot() {
        let log = new_log();
        let composite = CompositeCommand::new(three(&log));

        let mut names = composite.command_descriptions();
        names.clear();

        assert_eq!(composite.command_count(), 3);
        assert_eq!(composite.commands().len(), 3);
        assert_eq!(composite.command_descriptions(), vec!["c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn test_failed_child_leaves_prefix_applied() {
        let log = new_log();
        let mut composite = CompositeCommand::new(vec![
            RecordingCommand::new("c1", &log).boxed(),
            RecordingCommand::new("c2", &log).failing_execute().boxed(),
            RecordingCommand::new("c3", &log).boxed(),
        ]);

        let err = composite.execute().await.unwrap_err();

        assert_eq!(err, CommandError::ExecutionFailed("c2 broke".into()));
        assert_eq!(entries(&log), vec!["execute:c1"]);
    }

    #[tokio::test]
    async fn test_atomic_rolls_back_prefix() {
        let log = new_log();
        let mut composite = CompositeCommand::atomic(vec![
            RecordingCommand::new("c1", &log).boxed(),
            RecordingCommand::new("c2", &log).boxed(),
            RecordingCommand::new("c3", &log).failing_execute().boxed(),
        ]);

        assert!(composite.is_atomic());
        let err = composite.execute().await.unwrap_err();

        assert!(matches!(err, CommandError::ExecutionFailed(_)));
        assert_eq!(
            entries(&log),
            vec!["execute:c1", "execute:c2", "undo:c2", "undo:c1"]
        );
    }

    #[tokio::test]
    async fn test_undo_failure_stops_in_reverse() {
        let log = new_log();
        let mut composite = CompositeCommand::new(vec![
            RecordingCommand::new("c1", &log).boxed(),
            RecordingCommand::new("c2", &log).failing_undo().boxed(),
            RecordingCommand::new("c3", &log).boxed(),
        ]);

        composite.execute().await.unwrap();
        let err = composite.undo().await.unwrap_err();

        assert_eq!(err, CommandError::UndoFailed("c2 broke".into()));
        assert_eq!(
            entries(&log),
            vec!["execute:c1", "execute:c2", "execute:c3", "undo:c3"]
        );
    }

    #[tokio::test]
    async fn test_empty_composite_is_noop() {
        let mut composite = CompositeCommand::new(vec![]);
        assert!(composite.is_empty());
        composite.execute().await.unwrap();
        composite.undo().await.unwrap();
    }
}
