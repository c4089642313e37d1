//! JSON event handler for structured output
//!
//! Writes one JSON object per line for every transcoder event, for
//! consumption by scripts and supervising tools.

use super::{Event, EventHandler};
use serde_json::json;
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Event handler that outputs events as JSON lines
pub struct JsonEventHandler {
    output: Mutex<Box<dyn Write + Send>>,
}

impl JsonEventHandler {
    /// Create a new JSON event handler that writes to stdout
    pub fn new() -> Self {
        Self {
            output: Mutex::new(Box::new(io::stdout())),
        }
    }

    /// Create a new JSON event handler with a custom writer
    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            output: Mutex::new(writer),
        }
    }

    fn get_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    fn write_json(&self, value: serde_json::Value) {
        if let Ok(mut output) = self.output.lock() {
            if let Ok(json_str) = serde_json::to_string(&value) {
                let _ = writeln!(output, "{}", json_str);
                let _ = output.flush();
            }
        }
    }
}

impl Default for JsonEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for JsonEventHandler {
    fn handle(&self, event: &Event) {
        let timestamp = Self::get_timestamp();

        let value = match event {
            Event::JobStarted { input, output } => json!({
                "type": "job_started",
                "input": input.display().to_string(),
                "output": output.display().to_string(),
                "timestamp": timestamp
            }),
            Event::JobComplete {
                input,
                output,
                success,
            } => json!({
                "type": "job_complete",
                "input": input.display().to_string(),
                "output": output.display().to_string(),
                "success": success,
                "timestamp": timestamp
            }),
            Event::LogLine { message } => json!({
                "type": "log",
                "message": message,
                "timestamp": timestamp
            }),
            Event::AllJobsComplete => json!({
                "type": "all_jobs_complete",
                "timestamp": timestamp
            }),
        };
        self.write_json(value);
    }
}
