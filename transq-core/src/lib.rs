//! Core library for scheduling concurrent audio transcodes.
//!
//! This crate queues transcode jobs, builds a processing pipeline per job by
//! picking the best available encoder and muxer for a preset, runs at most a
//! configured number of pipelines at a time and reports each job's outcome
//! exactly once.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use transq_core::config::TranscoderConfigBuilder;
//! use transq_core::engine::FfmpegEngine;
//! use transq_core::events::JsonEventHandler;
//! use transq_core::presets::{preset_for_file_type, FileType};
//! use transq_core::Transcoder;
//!
//! let config = TranscoderConfigBuilder::new().max_threads(2).build();
//! let mut transcoder = Transcoder::new(Arc::new(FfmpegEngine::new()), config).unwrap();
//! transcoder.add_handler(Arc::new(JsonEventHandler::new()));
//!
//! let preset = preset_for_file_type(FileType::OggVorbis);
//! transcoder.add_job("/music/track01.wav", &preset, None, false).unwrap();
//! transcoder.add_job("/music/track02.wav", &preset, None, false).unwrap();
//! transcoder.run_until_complete();
//! ```

pub mod caps;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod presets;
pub mod transcode;
pub mod utils;

// Re-exports for public API
pub use config::{TranscoderConfig, TranscoderConfigBuilder};
pub use error::{CoreError, CoreResult};
pub use events::{Event, EventHandler};
pub use presets::{FileType, TranscoderPreset};
pub use transcode::Transcoder;
pub use utils::{format_duration, parse_ffmpeg_time};
