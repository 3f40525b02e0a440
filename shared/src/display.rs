//! Local feedback sink for console users.

use std::sync::{Arc, Mutex};

/// Receives human-readable notices for the local user.
///
/// Calls are fire-and-forget: implementations must return promptly and never
/// fail back into the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, text: &str);
}

/// Prints notices to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, text: &str) {
        println!("> {}", text);
    }
}

/// Keeps every notice in memory, for embedding and tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// True if any notice so far contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, text: &str) {
        match self.lines.lock() {
            Ok(mut lines) => lines.push(text.to_string()),
            Err(poisoned) => poisoned.into_inner().push(text.to_string()),
        }
    }
}
