use lode_batch::BatchRegistry;
use lode_runtime::{EntityManager, ResourceManager};
use lode_tasks::EventQueue;

/// Outcome of executing or undoing a command.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CommandStatus {
    /// Applied.
    Done,
    /// Could not be applied; no partial mutation happened.
    Failed,
    /// Nothing to do (empty undo/redo history).
    Skipped,
}

/// Everything a command may touch. Commands run on the main thread, so the
/// entity registry is reached directly.
pub struct EditContext<'a> {
    /// The entity registry.
    pub entities: &'a mut dyn EntityManager,
    /// The resource manager, for asset lookups and reference binding.
    pub resources: &'a ResourceManager,
    /// The batch registry, notified when an edit dirties a closure.
    pub batches: &'a BatchRegistry,
    /// Event sink for field-changed notifications.
    pub events: &'a EventQueue,
}

/// An undoable edit.
pub trait Command: Send {
    /// Applies the command.
    fn execute(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus;

    /// Reverts the command.
    fn undo(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus;

    /// Human-readable name for undo-history UIs.
    fn name(&self) -> String;
}

/// FIFO of executed commands with a single top-of-stack pointer.
///
/// `add` truncates any redo tail; a failed command leaves the queue
/// unchanged.
#[derive(Default)]
pub struct CommandQueue {
    commands: Vec<Box<dyn Command>>,
    top: usize,
}

impl CommandQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Executes a command and, on success, pushes it as the new top.
    pub fn add(&mut self, mut command: Box<dyn Command>, ctx: &mut EditContext<'_>) -> CommandStatus {
        let status = command.execute(ctx);
        if status == CommandStatus::Done {
            self.commands.truncate(self.top);
            self.commands.push(command);
            self.top += 1;
        } else {
            tracing::warn!("command '{}' failed to execute", command.name());
        }
        status
    }

    /// Undoes the command below the top pointer.
    pub fn undo(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        if self.top == 0 {
            return CommandStatus::Skipped;
        }
        let status = self.commands[self.top - 1].undo(ctx);
        if status == CommandStatus::Done {
            self.top -= 1;
        } else {
            tracing::warn!(
                "command '{}' failed to undo",
                self.commands[self.top - 1].name()
            );
        }
        status
    }

    /// Re-executes the command above the top pointer.
    pub fn redo(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        if self.top == self.commands.len() {
            return CommandStatus::Skipped;
        }
        let status = self.commands[self.top].execute(ctx);
        if status == CommandStatus::Done {
            self.top += 1;
        }
        status
    }

    /// Returns `true` if an undo step is available.
    pub fn can_undo(&self) -> bool {
        self.top > 0
    }

    /// Returns `true` if a redo step is available.
    pub fn can_redo(&self) -> bool {
        self.top < self.commands.len()
    }

    /// Number of commands held, executed and undone alike.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` when the queue holds no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Names of the commands in the queue, oldest first.
    pub fn names(&self) -> Vec<String> {
        self.commands.iter().map(|command| command.name()).collect()
    }
}
