//! Command implementations for the CLI.
//!
//! Each submodule contains the implementation of a specific command.

/// Lists the output formats known to the preset catalog.
pub mod presets;

/// Reports the encoder and muxer the resolver picks for each preset.
pub mod encoders;

/// Queues the given inputs and drives the transcoder until they are done.
pub mod transcode;
