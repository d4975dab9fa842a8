//! Developer-facing notifications.
//!
//! Task actions never talk to the developer directly. The runner forwards
//! their notices and failures to a [`Notifier`], which decides how to surface
//! them.

use std::sync::Mutex;

use console::style;

use crate::error::TaskError;

pub trait Notifier: Send + Sync {
    /// A task finished and has something to say.
    fn notice(&self, task: &str, message: &str);

    /// A task failed.
    fn failure(&self, task: &str, error: &TaskError);
}

/// Prints notifications to stderr and rings the terminal bell on failure.
#[derive(Debug, Clone)]
pub struct TerminalNotifier {
    pub bell: bool,
}

impl Default for TerminalNotifier {
    fn default() -> Self {
        Self { bell: true }
    }
}

impl Notifier for TerminalNotifier {
    fn notice(&self, task: &str, message: &str) {
        eprintln!("{} {}", style(format!("[{task}]")).green(), message);
    }

    fn failure(&self, task: &str, error: &TaskError) {
        let bell = if self.bell { "\x07" } else { "" };
        eprintln!(
            "{}{} {}\n{}",
            bell,
            style("Task failed").red().bold(),
            style(format!("[{task}]")).yellow(),
            error
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Notice { task: String, message: String },
    Failure { task: String, error: String },
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn notices(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Notification::Notice { task, message } => Some((task, message)),
                Notification::Failure { .. } => None,
            })
            .collect()
    }

    /// Names of the tasks that failed, in order.
    pub fn failures(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Notification::Failure { task, .. } => Some(task),
                Notification::Notice { .. } => None,
            })
            .collect()
    }

    fn push(&self, event: Notification) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Notifier for MemoryNotifier {
    fn notice(&self, task: &str, message: &str) {
        self.push(Notification::Notice {
            task: task.to_string(),
            message: message.to_string(),
        });
    }

    fn failure(&self, task: &str, error: &TaskError) {
        self.push(Notification::Failure {
            task: task.to_string(),
            error: error.to_string(),
        });
    }
}

impl<N: Notifier> Notifier for std::sync::Arc<N> {
    fn notice(&self, task: &str, message: &str) {
        (**self).notice(task, message)
    }

    fn failure(&self, task: &str, error: &TaskError) {
        (**self).failure(task, error)
    }
}
