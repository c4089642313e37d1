// ============================================================================
// transq-core/src/engine/ffmpeg.rs
// ============================================================================
//
// FFMPEG ENGINE: MediaEngine Implementation Backed by ffmpeg
//
// This module maps the element/pipeline model onto ffmpeg invocations:
//
// - The element registry is a catalogue of audio encoders and muxers with
//   ranks, filtered by what `ffmpeg -encoders` / `ffmpeg -muxers` report.
// - Launching a graph first probes the input with ffprobe. Every stream found
//   is offered to the pad-added continuation; the stream it links becomes the
//   `-map` of the ffmpeg command.
// - The command itself is spawned with ffmpeg-sidecar; progress and error
//   events are translated into clock updates and bus messages.
//
// All of this runs on a dedicated thread per pipeline.

use std::collections::HashSet;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel as FfmpegLogLevel};
use once_cell::sync::OnceCell;

use super::{
    factory, location_of, BusCallback, BusMessage, Element, ElementFactory, ElementRole,
    MediaEngine, PipelineCallbacks, PipelineGraph, PipelineHandle, PipelineState,
    PlaybackClock, StreamInfo, StreamKind, RANK_MARGINAL, RANK_PRIMARY, RANK_SECONDARY,
};
use crate::error::{
    command_failed_error, command_start_error, command_wait_error, CoreError, CoreResult,
};
use crate::utils::parse_ffmpeg_time;

/// Number of stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

// ============================================================================
// ELEMENT CATALOGUE
// ============================================================================

struct KnownElement {
    name: &'static str,
    role: ElementRole,
    caps: &'static [&'static str],
    rank: u32,
    /// Options required for the element to be usable at all.
    defaults: &'static [(&'static str, &'static str)],
}

const fn encoder(name: &'static str, caps: &'static [&'static str], rank: u32) -> KnownElement {
    KnownElement { name, role: ElementRole::Encoder, caps, rank, defaults: &[] }
}

const fn muxer(name: &'static str, caps: &'static [&'static str], rank: u32) -> KnownElement {
    KnownElement { name, role: ElementRole::Muxer, caps, rank, defaults: &[] }
}

const MP3_CAPS: &[&str] = &["audio/mpeg, mpegversion=(int)1, layer=(int)3"];
const AAC_CAPS: &[&str] = &["audio/mpeg, mpegversion=(int){2, 4}"];

static KNOWN_ELEMENTS: &[KnownElement] = &[
    encoder("flac", &["audio/x-flac"], RANK_PRIMARY),
    encoder("libfdk_aac", AAC_CAPS, RANK_PRIMARY),
    encoder("aac", AAC_CAPS, RANK_SECONDARY),
    encoder("libmp3lame", MP3_CAPS, RANK_PRIMARY),
    encoder("libshine", MP3_CAPS, RANK_MARGINAL),
    encoder("libvorbis", &["audio/x-vorbis"], RANK_PRIMARY),
    KnownElement {
        name: "vorbis",
        role: ElementRole::Encoder,
        caps: &["audio/x-vorbis"],
        rank: RANK_MARGINAL,
        defaults: &[("strict", "-2")],
    },
    encoder("libopus", &["audio/x-opus"], RANK_PRIMARY),
    KnownElement {
        name: "opus",
        role: ElementRole::Encoder,
        caps: &["audio/x-opus"],
        rank: RANK_MARGINAL,
        defaults: &[("strict", "-2")],
    },
    encoder("libspeex", &["audio/x-speex"], RANK_PRIMARY),
    encoder("wmav2", &["audio/x-wma, wmaversion=(int)2"], RANK_PRIMARY),
    encoder("wmav1", &["audio/x-wma, wmaversion=(int)1"], RANK_SECONDARY),
    muxer("ogg", &["application/ogg"], RANK_PRIMARY),
    muxer("ipod", &["audio/mp4"], RANK_PRIMARY),
    muxer("mp4", &["audio/mp4", "video/quicktime"], RANK_SECONDARY),
    muxer("asf", &["video/x-ms-asf"], RANK_PRIMARY),
    muxer("wav", &["audio/x-wav"], RANK_PRIMARY),
];

fn known_element(name: &str) -> Option<&'static KnownElement> {
    KNOWN_ELEMENTS.iter().find(|k| k.name == name)
}

/// Names ffmpeg reports as available, per role.
#[derive(Debug, Default)]
struct Registry {
    encoders: HashSet<String>,
    muxers: HashSet<String>,
}

impl Registry {
    fn contains(&self, role: ElementRole, name: &str) -> bool {
        match role {
            ElementRole::Encoder => self.encoders.contains(name),
            ElementRole::Muxer => self.muxers.contains(name),
        }
    }
}

/// Extracts the names from an `ffmpeg -encoders` or `ffmpeg -muxers` listing.
///
/// Both listings start with a legend terminated by a dashed line; every line
/// after it is `<flags> <name[,alias...]> <description>`.
fn parse_listing(stdout: &str) -> HashSet<String> {
    stdout
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("--"))
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .flat_map(|names| names.split(','))
        .map(str::to_string)
        .collect()
}

fn query_ffmpeg_listing(flag: &str) -> HashSet<String> {
    match run_ffmpeg_listing(flag) {
        Ok(stdout) => parse_listing(&stdout),
        Err(e) => {
            log::warn!("Could not list ffmpeg {}: {}", flag.trim_start_matches('-'), e);
            HashSet::new()
        }
    }
}

fn run_ffmpeg_listing(flag: &str) -> CoreResult<String> {
    let ffmpeg = ffmpeg_sidecar::paths::ffmpeg_path();
    let cmd_name = format!("{} {}", ffmpeg.display(), flag);
    let output = Command::new(&ffmpeg)
        .args(["-hide_banner", flag])
        .output()
        .map_err(|e| command_start_error(cmd_name.clone(), e))?;
    if !output.status.success() {
        return Err(command_failed_error(
            cmd_name,
            output.status,
            String::from_utf8_lossy(&output.stderr),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn probe(input: &str) -> CoreResult<ffprobe::FfProbe> {
    ffprobe::ffprobe(input).map_err(|e| CoreError::Probe(format!("{:?}", e)))
}

// ============================================================================
// ENGINE
// ============================================================================

/// Media engine that runs each pipeline as an ffmpeg process.
#[derive(Default)]
pub struct FfmpegEngine {
    registry: OnceCell<Registry>,
}

impl FfmpegEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an ffmpeg binary can be found.
    pub fn is_available() -> bool {
        ffmpeg_sidecar::command::ffmpeg_is_installed()
    }

    /// Fails with `DependencyNotFound` unless both ffmpeg and ffprobe run.
    pub fn ensure_available() -> CoreResult<()> {
        if !Self::is_available() {
            return Err(CoreError::DependencyNotFound("ffmpeg".to_string()));
        }
        let ffprobe_runs = Command::new("ffprobe")
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !ffprobe_runs {
            return Err(CoreError::DependencyNotFound("ffprobe".to_string()));
        }
        Ok(())
    }

    fn registry(&self) -> &Registry {
        self.registry.get_or_init(|| {
            let registry = Registry {
                encoders: query_ffmpeg_listing("-encoders"),
                muxers: query_ffmpeg_listing("-muxers"),
            };
            log::debug!(
                "ffmpeg registry: {} encoders, {} muxers",
                registry.encoders.len(),
                registry.muxers.len()
            );
            registry
        })
    }
}

impl MediaEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn factories(&self, role: ElementRole) -> Vec<ElementFactory> {
        let registry = self.registry();
        KNOWN_ELEMENTS
            .iter()
            .filter(|k| k.role == role && registry.contains(role, k.name))
            .filter_map(|k| match ElementFactory::new(k.name, k.role, k.caps, k.rank) {
                Ok(f) => Some(f),
                Err(e) => {
                    log::error!("Invalid catalogue entry {}: {}", k.name, e);
                    None
                }
            })
            .collect()
    }

    fn make_element(&self, factory_name: &str, name: &str) -> CoreResult<Element> {
        if factory::BUILTIN.contains(&factory_name) {
            return Ok(Element::new(factory_name, name));
        }

        let known = known_element(factory_name).ok_or_else(|| CoreError::ElementCreation {
            factory: factory_name.to_string(),
            name: name.to_string(),
            reason: "no such element factory".to_string(),
        })?;

        if !self.registry().contains(known.role, known.name) {
            return Err(CoreError::ElementCreation {
                factory: factory_name.to_string(),
                name: name.to_string(),
                reason: "not supported by the installed ffmpeg".to_string(),
            });
        }

        let mut element = Element::new(factory_name, name);
        for (key, value) in known.defaults {
            element.set_property(*key, *value);
        }
        Ok(element)
    }

    fn launch(
        &self,
        graph: PipelineGraph,
        callbacks: PipelineCallbacks,
    ) -> CoreResult<Box<dyn PipelineHandle>> {
        // Fail before spawning anything if the graph cannot be turned into a command.
        location_of(&graph, factory::FILE_SRC)?;
        location_of(&graph, factory::FILE_SINK)?;

        let thread_name = format!("transq-{}", graph.name());
        let shared = Arc::new(FfmpegPipeline {
            graph: Mutex::new(graph),
            clock: PlaybackClock::default(),
            child: Mutex::new(None),
            gate: Mutex::new(()),
            stopped: AtomicBool::new(false),
        });

        let worker = Arc::clone(&shared);
        thread::Builder::new()
            .name(thread_name)
            .spawn(move || worker.run(callbacks))?;

        Ok(Box::new(FfmpegPipelineHandle(shared)))
    }
}

// ============================================================================
// PIPELINE EXECUTION
// ============================================================================

struct FfmpegPipeline {
    graph: Mutex<PipelineGraph>,
    clock: PlaybackClock,
    child: Mutex<Option<FfmpegChild>>,
    /// Held while a bus message is delivered so `stop` cannot interleave.
    gate: Mutex<()>,
    stopped: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FfmpegPipeline {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn post(&self, bus: &mut BusCallback, message: BusMessage) {
        let _gate = lock(&self.gate);
        if !self.is_stopped() {
            bus(message);
        }
    }

    fn post_error(&self, bus: &mut BusCallback, source: &str, message: String, debug: Option<String>) {
        self.post(
            bus,
            BusMessage::Error {
                source: source.to_string(),
                message,
                debug,
            },
        );
    }

    fn post_state(&self, bus: &mut BusCallback, old: PipelineState, new: PipelineState) {
        self.post(bus, BusMessage::StateChanged { old, new });
    }

    fn run(&self, callbacks: PipelineCallbacks) {
        let PipelineCallbacks { mut pad_added, mut bus } = callbacks;

        let (input, decode) = {
            let graph = lock(&self.graph);
            let input = location_of(&graph, factory::FILE_SRC).unwrap_or_default();
            let decode = graph
                .element_by_factory(factory::DECODE_BIN)
                .map(|e| e.name.clone())
                .unwrap_or_default();
            (input, decode)
        };

        self.post_state(&mut bus, PipelineState::Null, PipelineState::Ready);

        // ---- Stream discovery ----
        let metadata = match probe(&input) {
            Ok(metadata) => metadata,
            Err(e) => {
                self.post_error(
                    &mut bus,
                    &decode,
                    format!("Could not determine type of stream in {}", input),
                    Some(e.to_string()),
                );
                return;
            }
        };

        if let Some(duration) = metadata
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
        {
            let duration = Duration::from_secs_f64(duration);
            self.clock.set_duration(duration);
            self.post(&mut bus, BusMessage::DurationChanged(duration));
        }

        let mut linked_stream = None;
        for stream in &metadata.streams {
            if self.is_stopped() {
                return;
            }
            let info = stream_info(stream);
            let Some(target) = pad_added(&info) else {
                continue;
            };
            let mut graph = lock(&self.graph);
            match graph.link_pad(&decode, &info.pad_name(), &target) {
                Ok(()) => {
                    log::debug!("{}: linked stream {} into {}", graph.name(), info.index, target);
                    linked_stream.get_or_insert(info.index);
                }
                Err(e) => log::debug!("{}: {}", graph.name(), e),
            }
        }

        let Some(stream_index) = linked_stream else {
            self.post_error(
                &mut bus,
                &decode,
                format!("No decodable audio stream found in {}", input),
                None,
            );
            return;
        };

        // ---- Encoding ----
        let built = build_command(&lock(&self.graph), stream_index);
        let mut cmd = match built {
            Ok(cmd) => cmd,
            Err(e) => {
                self.post_error(&mut bus, "pipeline", e.to_string(), None);
                return;
            }
        };
        log::debug!("Running ffmpeg command: {:?}", cmd.as_inner());

        self.post_state(&mut bus, PipelineState::Ready, PipelineState::Paused);

        let iterator = {
            let mut slot = lock(&self.child);
            if self.is_stopped() {
                return;
            }
            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(e) => {
                    drop(slot);
                    self.post_error(&mut bus, "ffmpeg", format!("Failed to start ffmpeg: {}", e), None);
                    return;
                }
            };
            let iterator = child.iter();
            *slot = Some(child);
            iterator
        };

        let iterator = match iterator {
            Ok(iterator) => iterator,
            Err(e) => {
                self.kill_child();
                self.post_error(
                    &mut bus,
                    "ffmpeg",
                    format!("Failed to read ffmpeg output: {}", e),
                    None,
                );
                return;
            }
        };

        self.post_state(&mut bus, PipelineState::Paused, PipelineState::Playing);

        let mut stderr_tail: Vec<String> = Vec::new();
        for event in iterator {
            if self.is_stopped() {
                break;
            }
            match event {
                FfmpegEvent::Progress(progress) => {
                    if let Some(secs) = parse_ffmpeg_time(&progress.time) {
                        self.clock.set_position(Duration::from_secs_f64(secs.max(0.0)));
                    }
                }
                FfmpegEvent::ParsedDuration(parsed) => {
                    if self.clock.duration().is_none() && parsed.duration.is_finite() && parsed.duration >= 0.0 {
                        let duration = Duration::from_secs_f64(parsed.duration);
                        self.clock.set_duration(duration);
                        self.post(&mut bus, BusMessage::DurationChanged(duration));
                    }
                }
                FfmpegEvent::Error(line) => {
                    log::debug!(target: "ffmpeg_log", "{}", line);
                    push_tail(&mut stderr_tail, line);
                }
                FfmpegEvent::Log(level, line) => match level {
                    FfmpegLogLevel::Error | FfmpegLogLevel::Fatal => {
                        log::debug!(target: "ffmpeg_log", "{}", line);
                        push_tail(&mut stderr_tail, line);
                    }
                    _ => log::trace!(target: "ffmpeg_log", "{}", line),
                },
                FfmpegEvent::Done => break,
                _ => {}
            }
        }

        let status = lock(&self.child).take().map(|mut child| child.wait());
        if self.is_stopped() {
            return;
        }

        match status {
            Some(Ok(status)) if status.success() => {
                if let Some(duration) = self.clock.duration() {
                    self.clock.set_position(duration);
                }
                self.post(&mut bus, BusMessage::EndOfStream);
            }
            Some(Ok(status)) => {
                let message = stderr_tail
                    .last()
                    .cloned()
                    .unwrap_or_else(|| format!("ffmpeg exited with {}", status));
                self.post_error(&mut bus, "ffmpeg", message, Some(stderr_tail.join("\n")));
            }
            Some(Err(e)) => {
                self.post_error(&mut bus, "ffmpeg", command_wait_error("ffmpeg", e).to_string(), None);
            }
            None => {
                self.post_error(&mut bus, "ffmpeg", "ffmpeg process disappeared".to_string(), None);
            }
        }
    }

    fn kill_child(&self) {
        if let Some(child) = lock(&self.child).as_mut() {
            if let Err(e) = child.kill() {
                log::debug!("Failed to kill ffmpeg: {}", e);
            }
        }
    }
}

fn push_tail(tail: &mut Vec<String>, line: String) {
    if tail.len() == STDERR_TAIL_LINES {
        tail.remove(0);
    }
    tail.push(line);
}

fn stream_info(stream: &ffprobe::Stream) -> StreamInfo {
    let kind = match stream.codec_type.as_deref() {
        Some("audio") => StreamKind::Audio,
        Some("video") => StreamKind::Video,
        Some("subtitle") => StreamKind::Subtitle,
        _ => StreamKind::Other,
    };
    StreamInfo {
        index: usize::try_from(stream.index).unwrap_or_default(),
        kind,
        codec: stream.codec_name.clone().unwrap_or_default(),
        channels: stream.channels.and_then(|c| u32::try_from(c).ok()),
        sample_rate: stream.sample_rate.as_deref().and_then(|r| r.parse().ok()),
    }
}

/// Properties set on a built-in element that `build_command` cannot express.
/// Encoder and muxer properties are always passed through as options.
fn ignored_properties(element: &Element) -> Vec<&str> {
    let handled: &[&str] = match element.factory.as_str() {
        factory::FILE_SRC => &["location"],
        factory::DECODE_BIN => &[],
        factory::AUDIO_CONVERT => &["channels"],
        factory::AUDIO_RESAMPLE => &["rate"],
        factory::FILE_SINK => &["location", "overwrite"],
        _ => return Vec::new(),
    };
    element
        .properties()
        .map(|(key, _)| key)
        .filter(|key| !handled.contains(key))
        .collect()
}

/// Translates a fully linked graph into an ffmpeg command.
fn build_command(graph: &PipelineGraph, stream_index: usize) -> CoreResult<FfmpegCommand> {
    let input = location_of(graph, factory::FILE_SRC)?;
    let output = location_of(graph, factory::FILE_SINK)?;

    let mut cmd = FfmpegCommand::new();
    cmd.input(input.as_str());
    cmd.args(["-map".to_string(), format!("0:{}", stream_index)]);
    cmd.args(["-vn", "-sn", "-dn"]);

    let mut overwrite = false;
    for element in graph.elements() {
        for key in ignored_properties(element) {
            log::warn!(
                "Property '{}' on {} ({}) has no ffmpeg equivalent and is ignored",
                key,
                element.name,
                element.factory
            );
        }
        match element.factory.as_str() {
            factory::AUDIO_CONVERT => {
                if let Some(channels) = element.property("channels") {
                    cmd.args(["-ac", channels]);
                }
            }
            factory::AUDIO_RESAMPLE => {
                if let Some(rate) = element.property("rate") {
                    cmd.args(["-ar", rate]);
                }
            }
            factory::FILE_SINK => {
                overwrite = element.property("overwrite") == Some("true");
            }
            factory::FILE_SRC | factory::DECODE_BIN => {}
            name => {
                let known = known_element(name).ok_or_else(|| {
                    CoreError::Graph(format!("ffmpeg cannot run element factory '{}'", name))
                })?;
                match known.role {
                    ElementRole::Encoder => cmd.args(["-c:a", name]),
                    ElementRole::Muxer => cmd.args(["-f", name]),
                };
                for (key, value) in element.properties() {
                    cmd.args([format!("-{}", key), value.to_string()]);
                }
            }
        }
    }

    cmd.arg(if overwrite { "-y" } else { "-n" });
    cmd.output(output.as_str());
    Ok(cmd)
}

// ============================================================================
// HANDLE
// ============================================================================

struct FfmpegPipelineHandle(Arc<FfmpegPipeline>);

impl PipelineHandle for FfmpegPipelineHandle {
    fn position(&self) -> Option<Duration> {
        self.0.clock.position()
    }

    fn duration(&self) -> Option<Duration> {
        self.0.clock.duration()
    }

    fn stop(&self) {
        let first = {
            let _gate = lock(&self.0.gate);
            !self.0.stopped.swap(true, Ordering::AcqRel)
        };
        if first {
            self.0.kill_child();
        }
    }

    fn dump_graph(&self) -> String {
        lock(&self.0.graph).to_dot()
    }
}

impl Drop for FfmpegPipelineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
