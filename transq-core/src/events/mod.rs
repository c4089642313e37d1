//! Notifications emitted by the transcoder.
//!
//! Handlers are invoked on the thread that drives the transcoder (the one
//! calling `start`, `process_events` or `cancel`), never on engine threads.

use std::path::PathBuf;
use std::sync::Arc;

pub mod json_handler;

pub use json_handler::JsonEventHandler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A job was admitted and its pipeline launched.
    JobStarted { input: PathBuf, output: PathBuf },

    /// A job reached its terminal state. Emitted exactly once per job.
    JobComplete {
        input: PathBuf,
        output: PathBuf,
        success: bool,
    },

    /// Human readable diagnostic, usually explaining a failure.
    LogLine { message: String },

    /// The queue and the running set are both empty after work was done.
    AllJobsComplete,
}

pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event);
}

pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn add_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn emit(&self, event: Event) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler that records every event, for tests and embedders that poll.
#[derive(Default)]
pub struct EventRecorder {
    events: std::sync::Mutex<Vec<Event>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// `(input, success)` for every `JobComplete` received so far.
    pub fn completions(&self) -> Vec<(PathBuf, bool)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::JobComplete { input, success, .. } => Some((input, success)),
                _ => None,
            })
            .collect()
    }

    pub fn count_all_complete(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Event::AllJobsComplete))
            .count()
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::LogLine { message } => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl EventHandler for EventRecorder {
    fn handle(&self, event: &Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
