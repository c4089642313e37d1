//! Job scheduling and pipeline construction.
//!
//! - `resolver`: picks the best ranked element for a caps string
//! - `builder`: assembles the per-job pipeline graph
//! - `runner`: supervises one launched pipeline
//! - `scheduler`: the `Transcoder` that queues, admits and retires jobs

pub mod builder;
pub mod job;
pub mod resolver;
pub mod runner;
pub mod scheduler;

pub use builder::{build_pipeline, TranscodePipeline};
pub use job::{derive_output_path, unique_output_path, unique_output_path_avoiding, Job, JobId};
pub use resolver::{create_element_for_mime_type, find_best_element_for_mime_type, SuitableElement};
pub use runner::{FailureKind, JobOutcome};
pub use scheduler::{ActiveJob, Transcoder};
