// transq-cli/src/lib.rs
//
// Library portion of the transq CLI application.
// Contains argument definitions and command logic.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod output;

// Re-export items needed by the binary or integration tests
pub use cli::{Cli, Commands, TranscodeArgs};
pub use commands::encoders::run_encoders;
pub use commands::presets::run_presets;
pub use commands::transcode::{run_transcode, TranscodeSummary};
