// CommandHistory - bounded undo/redo stacks for one scope

use crate::command::trait_def::{Command, CommandResult};
use crate::config::CommandConfig;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Default maximum number of commands to keep in history
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// A command together with the time it last entered the undo stack
struct HistoryEntry {
    command: Box<dyn Command>,
    recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    fn new(command: Box<dyn Command>) -> Self {
        Self {
            command,
            recorded_at: Utc::now(),
        }
    }
}

/// Snapshot of a history for UI consumption ("Undo: Move shape")
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryStatus {
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_description: Option<String>,
    pub redo_description: Option<String>,
    pub undo_count: usize,
    pub redo_count: usize,
}

/// Undo/redo stacks for a single scope
///
/// The history maintains two stacks:
/// - Undo stack: Commands that have been executed and can be undone
/// - Redo stack: Commands that have been undone and can be redone
///
/// Commands are pushed *after* they executed successfully; the history never
/// executes a new command itself. Pushing clears the redo stack, since the
/// user is on a new timeline.
///
/// # Memory Management
/// The undo stack never holds more than `max_history_size` commands. When a
/// push goes over the limit the oldest command is dropped (not undone).
pub struct CommandHistory {
    /// Commands that can be undone (most recent at the back)
    undo_stack: VecDeque<HistoryEntry>,

    /// Commands that can be redone (most recent at the back)
    redo_stack: VecDeque<HistoryEntry>,

    /// Maximum number of commands in the undo stack
    max_history_size: usize,

    /// Offer each pushed command to the previous one for merging
    merge_consecutive: bool,
}

impl CommandHistory {
    /// Create a history with the settings of `CommandConfig::default()`
    pub fn new() -> Self {
        Self::from_config(&CommandConfig::default())
    }

    /// Create a history with a custom limit (at least one entry)
    ///
    /// Merging starts disabled; turn it on with `set_merge_consecutive`.
    pub fn with_capacity(max_history_size: usize) -> Self {
        let max_history_size = max_history_size.max(1);
        Self {
            undo_stack: VecDeque::with_capacity(max_history_size),
            redo_stack: VecDeque::new(),
            max_history_size,
            merge_consecutive: false,
        }
    }

    /// Create a history from a (validated) configuration
    pub fn from_config(config: &CommandConfig) -> Self {
        let mut history = Self::with_capacity(config.max_history_size);
        history.merge_consecutive = config.merge_consecutive;
        history
    }

    pub fn max_history_size(&self) -> usize {
        self.max_history_size
    }

    /// Change the limit, evicting the oldest commands if it shrank
    pub fn set_max_history_size(&mut self, max_history_size: usize) {
        self.max_history_size = max_history_size.max(1);
        self.trim();
    }

    pub fn set_merge_consecutive(&mut self, enabled: bool) {
        self.merge_consecutive = enabled;
    }

    /// Record a command that has already been executed
    ///
    /// Clears the redo stack. When merging is enabled, nothing was undone
    /// since the last push and the top of the undo stack absorbs `command`,
    /// no new entry is created.
    pub fn push(&mut self, command: Box<dyn Command>) {
        let branched = !self.redo_stack.is_empty();
        self.redo_stack.clear();

        if self.merge_consecutive && !branched {
            if let Some(top) = self.undo_stack.back_mut() {
                if top.command.merge(command.as_ref()) {
                    log::trace!("Merged '{}' into previous entry", command.description());
                    top.recorded_at = Utc::now();
                    return;
                }
            }
        }

        self.undo_stack.push_back(HistoryEntry::new(command));
        self.trim();
    }

    /// Undo the most recent command
    ///
    /// Returns the description of the undone command, or `None` if there was
    /// nothing to undo.
    ///
    /// # Errors
    /// If the command's `undo()` fails the error is returned unchanged and the
    /// command is dropped: it is neither back on the undo stack nor on the
    /// redo stack.
    pub async fn undo(&mut self) -> CommandResult<Option<String>> {
        let Some(mut entry) = self.undo_stack.pop_back() else {
            return Ok(None);
        };
        let description = entry.command.description();

        if let Err(e) = entry.command.undo().await {
            log::warn!("Undo of '{}' failed, dropping it from history: {}", description, e);
            return Err(e);
        }

        log::debug!("Undid '{}'", description);
        self.redo_stack.push_back(entry);
        Ok(Some(description))
    }

    /// Redo the most recently undone command
    ///
    /// Returns the description of the redone command, or `None` if there was
    /// nothing to redo.
    ///
    /// # Errors
    /// If the command's `execute()` fails the error is returned unchanged and
    /// the command is dropped from the history.
    pub async fn redo(&mut self) -> CommandResult<Option<String>> {
        let Some(mut entry) = self.redo_stack.pop_back() else {
            return Ok(None);
        };
        let description = entry.command.description();

        if let Err(e) = entry.command.execute().await {
            log::warn!("Redo of '{}' failed, dropping it from history: {}", description, e);
            return Err(e);
        }

        log::debug!("Redid '{}'", description);
        entry.recorded_at = Utc::now();
        self.undo_stack.push_back(entry);
        self.trim();
        Ok(Some(description))
    }

    /// Check if there are commands that can be undone
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if there are commands that can be redone
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Get a description of the command that would be undone
    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|entry| entry.command.description())
    }

    /// Get a description of the command that would be redone
    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.back().map(|entry| entry.command.description())
    }

    /// Descriptions of the undo stack, most recent first
    pub fn undo_descriptions(&self) -> Vec<String> {
        self.undo_stack
            .iter()
            .rev()
            .map(|entry| entry.command.description())
            .collect()
    }

    /// Descriptions of the redo stack, most recent first
    pub fn redo_descriptions(&self) -> Vec<String> {
        self.redo_stack
            .iter()
            .rev()
            .map(|entry| entry.command.description())
            .collect()
    }

    /// When the command that would be undone was recorded
    pub fn last_recorded_at(&self) -> Option<DateTime<Utc>> {
        self.undo_stack.back().map(|entry| entry.recorded_at)
    }

    /// Clear all command history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Get the number of commands in the undo stack
    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    /// Get the number of commands in the redo stack
    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn status(&self) -> HistoryStatus {
        HistoryStatus {
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            undo_description: self.undo_description(),
            redo_description: self.redo_description(),
            undo_count: self.undo_count(),
            redo_count: self.redo_count(),
        }
    }

    fn trim(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            if let Some(evicted) = self.undo_stack.pop_front() {
                log::trace!("Evicted '{}' from history", evicted.command.description());
            }
        }
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new()
    }
}
