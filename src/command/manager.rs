// CommandManager - Routes commands to per-scope undo/redo histories

use crate::command::composite::CompositeCommand;
use crate::command::history::{CommandHistory, HistoryStatus};
use crate::command::trait_def::{Command, CommandResult};
use crate::config::CommandConfig;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{watch, OwnedMutexGuard};

/// Scope for operations with no natural per-entity affinity
pub const GLOBAL_SCOPE: &str = "global";

static GLOBAL_MANAGER: Lazy<CommandManager> = Lazy::new(CommandManager::new);

/// One scope's history plus the channel its status is published on
struct ScopeHandle {
    history: Arc<tokio::sync::Mutex<CommandHistory>>,
    status: watch::Sender<HistoryStatus>,
}

impl ScopeHandle {
    fn new(config: &CommandConfig) -> Self {
        let (status, _) = watch::channel(HistoryStatus::default());
        Self {
            history: Arc::new(tokio::sync::Mutex::new(CommandHistory::from_config(config))),
            status,
        }
    }

    fn publish(&self, history: &CommandHistory) {
        self.status.send_replace(history.status());
    }
}

/// Manages command execution and undo/redo for independent scopes
///
/// Each scope key (a diagram id, or [`GLOBAL_SCOPE`]) owns its own
/// [`CommandHistory`], created on first use. Undoing in one scope never
/// touches another.
///
/// Operations on the same scope are serialized: the scope's history stays
/// locked while a command's `execute`/`undo` is awaited. This also holds
/// across [`CommandManager::clear_scope`], which waits for the running
/// operation before dropping the history. Different scopes run
/// independently.
///
/// The `can_undo`/`can_redo`/description queries are synchronous and read
/// the last status published by the scope, so they never wait for an
/// in-flight operation.
pub struct CommandManager {
    scopes: Mutex<HashMap<String, Arc<ScopeHandle>>>,
    config: CommandConfig,
}

impl CommandManager {
    /// Create a manager with default settings
    pub fn new() -> Self {
        Self::with_config(CommandConfig::default())
    }

    /// Create a manager whose histories use `config`
    pub fn with_config(config: CommandConfig) -> Self {
        Self {
            scopes: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Process-wide shared manager
    pub fn global() -> &'static CommandManager {
        &GLOBAL_MANAGER
    }

    pub fn config(&self) -> &CommandConfig {
        &self.config
    }

    /// Execute a command and record it in the scope's history
    ///
    /// # Errors
    /// Returns the command's own error if `execute()` fails; the history is
    /// left unchanged. A scope first used by the failed command is not kept.
    pub async fn execute(&self, scope: &str, mut command: Box<dyn Command>) -> CommandResult<()> {
        let (handle, created, mut history) = self.lock_or_insert(scope).await;

        let description = command.description();
        if let Err(e) = command.execute().await {
            log::debug!("[{}] '{}' failed: {}", scope, description, e);
            let unused = history.undo_count() == 0 && history.redo_count() == 0;
            if created && unused && handle.status.receiver_count() == 0 {
                self.lock_scopes().remove(scope);
            }
            return Err(e);
        }
        log::debug!("[{}] Executed '{}'", scope, description);

        history.push(command);
        handle.publish(&history);
        Ok(())
    }

    /// Execute several commands as one undo step
    pub async fn execute_batch(
        &self,
        scope: &str,
        description: impl Into<String>,
        commands: Vec<Box<dyn Command>>,
    ) -> CommandResult<()> {
        let composite = CompositeCommand::with_description(commands, description);
        self.execute(scope, Box::new(composite)).await
    }

    /// Undo the scope's most recent command
    ///
    /// Returns the undone command's description, or `None` when the scope has
    /// nothing to undo (including scopes never used).
    ///
    /// # Errors
    /// Returns the command's own error if `undo()` fails. That command is
    /// dropped from the history.
    pub async fn undo(&self, scope: &str) -> CommandResult<Option<String>> {
        let Some((handle, mut history)) = self.lock_existing(scope).await else {
            log::debug!("[{}] Nothing to undo (no history)", scope);
            return Ok(None);
        };
        let result = history.undo().await;
        handle.publish(&history);
        result
    }

    /// Redo the scope's most recently undone command
    ///
    /// Returns the redone command's description, or `None` when the scope has
    /// nothing to redo.
    ///
    /// # Errors
    /// Returns the command's own error if `execute()` fails. That command is
    /// dropped from the history.
    pub async fn redo(&self, scope: &str) -> CommandResult<Option<String>> {
        let Some((handle, mut history)) = self.lock_existing(scope).await else {
            log::debug!("[{}] Nothing to redo (no history)", scope);
            return Ok(None);
        };
        let result = history.redo().await;
        handle.publish(&history);
        result
    }

    /// Check if the scope has commands that can be undone
    pub fn can_undo(&self, scope: &str) -> bool {
        self.status(scope).can_undo
    }

    /// Check if the scope has commands that can be redone
    pub fn can_redo(&self, scope: &str) -> bool {
        self.status(scope).can_redo
    }

    /// Description of the command `undo(scope)` would revert
    pub fn undo_description(&self, scope: &str) -> Option<String> {
        self.status(scope).undo_description
    }

    /// Description of the command `redo(scope)` would re-apply
    pub fn redo_description(&self, scope: &str) -> Option<String> {
        self.status(scope).redo_description
    }

    /// Last published status of the scope (empty for unknown scopes)
    pub fn status(&self, scope: &str) -> HistoryStatus {
        self.scope(scope)
            .map(|handle| handle.status.borrow().clone())
            .unwrap_or_default()
    }

    /// Watch the scope's status; creates the scope if needed
    pub fn subscribe(&self, scope: &str) -> watch::Receiver<HistoryStatus> {
        self.scope_or_insert(scope).0.status.subscribe()
    }

    /// Descriptions of the scope's undo stack, most recent first
    pub async fn undo_descriptions(&self, scope: &str) -> Vec<String> {
        match self.lock_existing(scope).await {
            Some((_, history)) => history.undo_descriptions(),
            None => Vec::new(),
        }
    }

    /// Descriptions of the scope's redo stack, most recent first
    pub async fn redo_descriptions(&self, scope: &str) -> Vec<String> {
        match self.lock_existing(scope).await {
            Some((_, history)) => history.redo_descriptions(),
            None => Vec::new(),
        }
    }

    /// Empty the scope's stacks but keep its history
    pub async fn clear_history(&self, scope: &str) {
        if let Some((handle, mut history)) = self.lock_existing(scope).await {
            history.clear();
            handle.publish(&history);
        }
    }

    /// Drop the scope's history entirely (e.g. when a diagram closes)
    ///
    /// Returns false if the scope had no history. Subscribers see an empty
    /// status. Waits for an operation already running in the scope; later
    /// operations start on a fresh history.
    pub async fn clear_scope(&self, scope: &str) -> bool {
        let Some((handle, _history)) = self.lock_existing(scope).await else {
            return false;
        };
        self.lock_scopes().remove(scope);
        handle.status.send_replace(HistoryStatus::default());
        log::info!("Cleared command scope '{}'", scope);
        true
    }

    /// Keys of all scopes that currently have a history
    pub fn scopes(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock_scopes().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.lock_scopes().contains_key(scope)
    }

    fn scope(&self, scope: &str) -> Option<Arc<ScopeHandle>> {
        self.lock_scopes().get(scope).cloned()
    }

    /// Existing handle for `scope`, or a new one (second field true)
    fn scope_or_insert(&self, scope: &str) -> (Arc<ScopeHandle>, bool) {
        let mut scopes = self.lock_scopes();
        if let Some(handle) = scopes.get(scope) {
            return (handle.clone(), false);
        }
        log::trace!("Created command scope '{}'", scope);
        let handle = Arc::new(ScopeHandle::new(&self.config));
        scopes.insert(scope.to_string(), handle.clone());
        (handle, true)
    }

    /// Whether `handle` is still the one registered for `scope`
    fn is_current(&self, scope: &str, handle: &Arc<ScopeHandle>) -> bool {
        self.lock_scopes()
            .get(scope)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    /// Lock the scope's history, creating the scope if needed
    ///
    /// Retries when the handle was dropped from the map while we waited.
    async fn lock_or_insert(
        &self,
        scope: &str,
    ) -> (Arc<ScopeHandle>, bool, OwnedMutexGuard<CommandHistory>) {
        loop {
            let (handle, created) = self.scope_or_insert(scope);
            let history = handle.history.clone().lock_owned().await;
            if self.is_current(scope, &handle) {
                return (handle, created, history);
            }
        }
    }

    /// Lock the scope's history if the scope exists
    async fn lock_existing(
        &self,
        scope: &str,
    ) -> Option<(Arc<ScopeHandle>, OwnedMutexGuard<CommandHistory>)> {
        loop {
            let handle = self.scope(scope)?;
            let history = handle.history.clone().lock_owned().await;
            if self.is_current(scope, &handle) {
                return Some((handle, history));
            }
        }
    }

    fn lock_scopes(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<ScopeHandle>>> {
        self.scopes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CommandManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::trait_def::test_support::*;
    use crate::command::trait_def::CommandError;
    use async_trait::async_trait;
    use std::any::Any;
    use std::time::Duration;

    /// Command that yields while running, to expose interleaving
    struct SlowCommand {
        name: &'static str,
        log: CallLog,
    }

    #[async_trait]
    impl Command for SlowCommand {
        async fn execute(&mut self) -> CommandResult<()> {
            self.log.lock().unwrap().push(format!("start:{}", self.name));
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.log.lock().unwrap().push(format!("end:{}", self.name));
            Ok(())
        }

        async fn undo(&mut self) -> CommandResult<()> {
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[tokio::test]
    async fn test_execute_records_command() {
        let manager = CommandManager::new();
        let log = new_log();

        manager
            .execute("d1", RecordingCommand::new("Add shape", &log).boxed())
            .await
            .unwrap();

        assert!(manager.can_undo("d1"));
        assert!(!manager.can_redo("d1"));
        assert_eq!(manager.undo_description("d1"), Some("Add shape".to_string()));
        assert_eq!(entries(&log), vec!["execute:Add shape"]);
    }

    #[tokio::test]
    async fn test_round_trip() {
        let manager = CommandManager::new();
        let log = new_log();
        manager
            .execute(GLOBAL_SCOPE, RecordingCommand::new("a", &log).boxed())
            .await
            .unwrap();

        assert_eq!(manager.undo(GLOBAL_SCOPE).await.unwrap(), Some("a".into()));
        assert!(manager.can_redo(GLOBAL_SCOPE));
        assert_eq!(manager.redo_description(GLOBAL_SCOPE), Some("a".into()));

        assert_eq!(manager.redo(GLOBAL_SCOPE).await.unwrap(), Some("a".into()));
        assert!(manager.can_undo(GLOBAL_SCOPE));
        assert!(!manager.can_redo(GLOBAL_SCOPE));
        assert_eq!(entries(&log), vec!["execute:a", "undo:a", "execute:a"]);
    }

    #[tokio::test]
    async fn test_scope_isolation() {
        let manager = CommandManager::new();
        let log = new_log();
        manager
            .execute("A", RecordingCommand::new("a", &log).boxed())
            .await
            .unwrap();

        assert_eq!(manager.undo("B").await.unwrap(), None);
        assert_eq!(manager.redo("B").await.unwrap(), None);
        assert!(manager.can_undo("A"));
        assert!(!manager.can_undo("B"));
        assert!(!manager.has_scope("B"));
        assert_eq!(entries(&log), vec!["execute:a"]);
    }

    #[tokio::test]
    async fn test_failed_execute_not_recorded() {
        let manager = CommandManager::new();
        let log = new_log();

        let err = manager
            .execute("d1", RecordingCommand::new("bad", &log).failing_execute().boxed())
            .await
            .unwrap_err();

        assert_eq!(err, CommandError::ExecutionFailed("bad broke".into()));
        assert!(!manager.can_undo("d1"));
        assert!(!manager.has_scope("d1"));
        assert!(manager.scopes().is_empty());
    }

    #[tokio::test]
    async fn test_failed_execute_keeps_used_scope() {
        let manager = CommandManager::new();
        let log = new_log();
        manager
            .execute("d1", RecordingCommand::new("ok", &log).boxed())
            .await
            .unwrap();
        let _status = manager.subscribe("d2");

        for scope in ["d1", "d2"] {
            manager
                .execute(scope, RecordingCommand::new("bad", &log).failing_execute().boxed())
                .await
                .unwrap_err();
        }

        assert_eq!(manager.scopes(), vec!["d1".to_string(), "d2".to_string()]);
        assert_eq!(manager.undo_description("d1"), Some("ok".into()));
    }

    #[tokio::test]
    async fn test_failed_undo_surfaces_and_drops() {
        let manager = CommandManager::new();
        let log = new_log();
        manager
            .execute("d1", RecordingCommand::new("bad", &log).failing_undo().boxed())
            .await
            .unwrap();

        let err = manager.undo("d1").await.unwrap_err();

        assert!(matches!(err, CommandError::UndoFailed(_)));
        assert!(!manager.can_undo("d1"));
        assert!(!manager.can_redo("d1"));
    }

    #[tokio::test]
    async fn test_execute_after_undo_clears_redo() {
        let manager = CommandManager::new();
        let log = new_log();
        manager
            .execute("d1", RecordingCommand::new("c1", &log).boxed())
            .await
            .unwrap();
        manager.undo("d1").await.unwrap();
        manager
            .execute("d1", RecordingCommand::new("c2", &log).boxed())
            .await
            .unwrap();

        assert!(!manager.can_redo("d1"));
    }

    #[tokio::test]
    async fn test_config_limits_history() {
        let manager = CommandManager::with_config(CommandConfig {
            max_history_size: 2,
            merge_consecutive: false,
        });
        let log = new_log();
        for name in ["c1", "c2", "c3"] {
            manager
                .execute("d1", RecordingCommand::new(name, &log).boxed())
                .await
                .unwrap();
        }

        assert_eq!(manager.undo_descriptions("d1").await, vec!["c3", "c2"]);
        assert_eq!(manager.status("d1").undo_count, 2);
    }

    #[tokio::test]
    async fn test_execute_batch_is_one_step() {
        let manager = CommandManager::new();
        let log = new_log();
        manager
            .execute_batch(
                "d1",
                "Paste shapes",
                vec![
                    RecordingCommand::new("s1", &log).boxed(),
                    RecordingCommand::new("s2", &log).boxed(),
                ],
            )
            .await
            .unwrap();

        assert_eq!(manager.status("d1").undo_count, 1);
        assert_eq!(manager.undo("d1").await.unwrap(), Some("Paste shapes".into()));
        assert_eq!(
            entries(&log),
            vec!["execute:s1", "execute:s2", "undo:s2", "undo:s1"]
        );
    }

    #[tokio::test]
    async fn test_clear_scope_and_clear_history() {
        let manager = CommandManager::new();
        let log = new_log();
        for scope in ["A", "B"] {
            manager
                .execute(scope, RecordingCommand::new(scope, &log).boxed())
                .await
                .unwrap();
        }

        manager.clear_history("A").await;
        assert!(manager.has_scope("A"));
        assert!(!manager.can_undo("A"));

        assert!(manager.clear_scope("B").await);
        assert!(!manager.clear_scope("B").await);
        assert!(!manager.has_scope("B"));
        assert_eq!(manager.scopes(), vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_subscribe_sees_updates() {
        let manager = CommandManager::new();
        let log = new_log();
        let mut status = manager.subscribe("d1");
        assert!(!status.borrow().can_undo);

        manager
            .execute("d1", RecordingCommand::new("a", &log).boxed())
            .await
            .unwrap();
        assert!(status.has_changed().unwrap());
        assert!(status.borrow_and_update().can_undo);

        manager.clear_scope("d1").await;
        assert_eq!(*status.borrow(), HistoryStatus::default());
    }

    #[tokio::test]
    async fn test_same_scope_is_serialized() {
        let manager = Arc::new(CommandManager::new());
        let log = new_log();

        let first = {
            let manager = manager.clone();
            let log = log.clone();
            tokio::spawn(async move {
                manager
                    .execute("d1", Box::new(SlowCommand { name: "one", log }))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        manager
            .execute("d1", Box::new(SlowCommand { name: "two", log: log.clone() }))
            .await
            .unwrap();
        first.await.unwrap().unwrap();

        assert_eq!(
            entries(&log),
            vec!["start:one", "end:one", "start:two", "end:two"]
        );
        assert_eq!(manager.status("d1").undo_count, 2);
    }

    #[tokio::test]
    async fn test_clear_scope_waits_for_running_command() {
        let manager = Arc::new(CommandManager::new());
        let log = new_log();

        let first = {
            let manager = manager.clone();
            let log = log.clone();
            tokio::spawn(async move {
                manager
                    .execute("d1", Box::new(SlowCommand { name: "one", log }))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(manager.clear_scope("d1").await);
        manager
            .execute("d1", Box::new(SlowCommand { name: "two", log: log.clone() }))
            .await
            .unwrap();
        first.await.unwrap().unwrap();

        assert_eq!(
            entries(&log),
            vec!["start:one", "end:one", "start:two", "end:two"]
        );
        assert_eq!(manager.status("d1").undo_count, 1);
    }

    #[tokio::test]
    async fn test_queued_undo_skips_cleared_history() {
        let manager = Arc::new(CommandManager::new());
        let log = new_log();
        manager
            .execute("d1", RecordingCommand::new("a", &log).boxed())
            .await
            .unwrap();

        let slow = {
            let manager = manager.clone();
            let log = log.clone();
            tokio::spawn(async move {
                manager
                    .execute("d1", Box::new(SlowCommand { name: "one", log }))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let clear = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.clear_scope("d1").await })
        };
        tokio::time::sleep(Duration::from_millis(2)).await;
        let undone = manager.undo("d1").await.unwrap();
        slow.await.unwrap().unwrap();

        assert!(clear.await.unwrap());
        assert_eq!(undone, None);
        assert!(!manager.has_scope("d1"));
        assert_eq!(entries(&log), vec!["execute:a", "start:one", "end:one"]);
    }

    #[tokio::test]
    async fn test_global_is_shared() {
        let first = CommandManager::global() as *const CommandManager;
        let second = CommandManager::global() as *const CommandManager;
        assert_eq!(first, second);
    }
}
