// ============================================================================
// transq-core/src/engine/mod.rs
// ============================================================================
//
// MEDIA ENGINE: Abstraction Over the Processing Backend
//
// The scheduler never decodes or encodes anything itself. It talks to a media
// engine that exposes a registry of ranked element factories, instantiates
// elements, and runs pipeline graphs on its own threads while reporting
// status through callbacks.
//
// KEY COMPONENTS:
// - MediaEngine: Trait for registry queries, element creation and launching
// - PipelineHandle: Trait for controlling and querying a running pipeline
// - PipelineCallbacks: Pad-added continuation and synchronous bus handler
// - FfmpegEngine: Concrete engine built on ffmpeg-sidecar and ffprobe
// - MockEngine: Scripted engine used by the test suite
//
// DESIGN PHILOSOPHY:
// Like the other external tool wrappers in this workspace, the engine is
// injected as a trait object so the scheduler can be exercised without any
// media tooling installed.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::caps::Caps;
use crate::error::CoreResult;

pub mod ffmpeg;
pub mod graph;
pub mod mocks;

pub use ffmpeg::FfmpegEngine;
pub use graph::{Element, Link, PipelineGraph};

// ============================================================================
// ELEMENT REGISTRY
// ============================================================================

/// Rank for elements that work but have known shortcomings.
pub const RANK_MARGINAL: u32 = 64;
/// Rank for good elements that have a preferred alternative.
pub const RANK_SECONDARY: u32 = 128;
/// Rank for the preferred element for a format.
pub const RANK_PRIMARY: u32 = 256;

/// Names of the element factories every engine must provide.
pub mod factory {
    pub const FILE_SRC: &str = "filesrc";
    pub const DECODE_BIN: &str = "decodebin";
    pub const AUDIO_CONVERT: &str = "audioconvert";
    pub const AUDIO_RESAMPLE: &str = "audioresample";
    pub const FILE_SINK: &str = "filesink";

    pub const BUILTIN: [&str; 5] = [FILE_SRC, DECODE_BIN, AUDIO_CONVERT, AUDIO_RESAMPLE, FILE_SINK];
}

/// The part an element plays in a transcode pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementRole {
    Encoder,
    Muxer,
}

impl fmt::Display for ElementRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementRole::Encoder => f.write_str("encoder"),
            ElementRole::Muxer => f.write_str("muxer"),
        }
    }
}

/// A registered element factory as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementFactory {
    pub name: String,
    pub role: ElementRole,
    /// Caps this element can produce on its output.
    pub caps: Vec<Caps>,
    pub rank: u32,
}

impl ElementFactory {
    pub fn new(name: &str, role: ElementRole, caps: &[&str], rank: u32) -> CoreResult<Self> {
        let caps = caps.iter().map(|c| Caps::parse(c)).collect::<CoreResult<Vec<_>>>()?;
        Ok(Self {
            name: name.to_string(),
            role,
            caps,
            rank,
        })
    }

    /// Whether any advertised output caps intersect `wanted`.
    pub fn produces(&self, wanted: &Caps) -> bool {
        self.caps.iter().any(|c| c.can_intersect(wanted))
    }
}

// ============================================================================
// PIPELINE STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Null,
    Ready,
    Paused,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Audio,
    Video,
    Subtitle,
    Other,
}

/// An output stream exposed by the decoder once it has inspected the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: StreamKind,
    pub codec: String,
    pub channels: Option<u32>,
    pub sample_rate: Option<u32>,
}

impl StreamInfo {
    pub fn audio(index: usize, codec: &str) -> Self {
        Self {
            index,
            kind: StreamKind::Audio,
            codec: codec.to_string(),
            channels: Some(2),
            sample_rate: Some(44_100),
        }
    }

    /// Pad name used when linking this stream.
    pub fn pad_name(&self) -> String {
        format!("src_{}", self.index)
    }
}

/// Asynchronous status message posted by a running pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    StateChanged {
        old: PipelineState,
        new: PipelineState,
    },
    DurationChanged(Duration),
    EndOfStream,
    Error {
        source: String,
        message: String,
        debug: Option<String>,
    },
}

/// Invoked on an engine thread whenever the decoder exposes a stream. Returns
/// the name of the element the stream should be linked into, or `None` to
/// leave it unlinked.
pub type PadAddedCallback = Box<dyn FnMut(&StreamInfo) -> Option<String> + Send>;

/// Invoked synchronously on an engine thread for every bus message.
pub type BusCallback = Box<dyn FnMut(BusMessage) + Send>;

pub struct PipelineCallbacks {
    pub pad_added: PadAddedCallback,
    pub bus: BusCallback,
}

// ============================================================================
// ENGINE TRAITS
// ============================================================================

/// Control and query surface of a launched pipeline.
///
/// Queries may be issued from any thread while the engine keeps updating the
/// pipeline on its own threads.
pub trait PipelineHandle: Send + Sync {
    /// Current playback position, if known.
    fn position(&self) -> Option<Duration>;

    /// Estimated total duration, if known.
    fn duration(&self) -> Option<Duration>;

    /// Stops the pipeline and releases its resources. Idempotent. No bus
    /// messages are delivered after this returns.
    fn stop(&self);

    /// Current structure of the pipeline, including dynamic links, as DOT.
    fn dump_graph(&self) -> String;
}

/// A media processing backend.
pub trait MediaEngine: Send + Sync {
    /// Human readable backend name for diagnostics.
    fn name(&self) -> &str;

    /// Registered factories offering `role`, in a stable enumeration order.
    fn factories(&self, role: ElementRole) -> Vec<ElementFactory>;

    /// Instantiates an element. Fails when the factory is unknown or lacks
    /// runtime support.
    fn make_element(&self, factory: &str, name: &str) -> CoreResult<Element>;

    /// Starts `graph` on the engine's own threads.
    fn launch(
        &self,
        graph: PipelineGraph,
        callbacks: PipelineCallbacks,
    ) -> CoreResult<Box<dyn PipelineHandle>>;
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

const UNKNOWN_TIME: u64 = u64::MAX;

/// Lock-free position/duration store written by engine threads and read by
/// progress queries.
#[derive(Debug)]
pub(crate) struct PlaybackClock {
    position_ms: AtomicU64,
    duration_ms: AtomicU64,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self {
            position_ms: AtomicU64::new(UNKNOWN_TIME),
            duration_ms: AtomicU64::new(UNKNOWN_TIME),
        }
    }
}

impl PlaybackClock {
    pub(crate) fn set_position(&self, position: Duration) {
        self.position_ms.store(to_millis(position), Ordering::Release);
    }

    pub(crate) fn set_duration(&self, duration: Duration) {
        self.duration_ms.store(to_millis(duration), Ordering::Release);
    }

    pub(crate) fn position(&self) -> Option<Duration> {
        from_millis(self.position_ms.load(Ordering::Acquire))
    }

    pub(crate) fn duration(&self) -> Option<Duration> {
        from_millis(self.duration_ms.load(Ordering::Acquire))
    }
}

fn to_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(UNKNOWN_TIME - 1)
}

fn from_millis(ms: u64) -> Option<Duration> {
    (ms != UNKNOWN_TIME).then(|| Duration::from_millis(ms))
}

/// Reads the `location` property of the first element built from `factory`.
pub(crate) fn location_of(graph: &PipelineGraph, factory: &str) -> CoreResult<String> {
    graph
        .element_by_factory(factory)
        .and_then(|e| e.property("location"))
        .map(str::to_string)
        .ok_or_else(|| {
            crate::error::CoreError::Graph(format!(
                "{} has no {} with a location",
                graph.name(),
                factory
            ))
        })
}
