// transq-core/src/engine/mocks.rs

// --- Scripted Engine (for testing) ---

// Runs pipelines on real threads like the ffmpeg engine does, but every
// pipeline follows a script chosen per input path: which streams the decoder
// exposes, what position and duration it reports, and how it ends.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use super::{
    factory, location_of, BusCallback, BusMessage, Element, ElementFactory, ElementRole,
    MediaEngine, PipelineCallbacks, PipelineGraph, PipelineHandle, PipelineState,
    PlaybackClock, StreamInfo, RANK_PRIMARY,
};
use crate::error::{CoreError, CoreResult};

/// How a scripted pipeline ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Posts end-of-stream right after linking.
    Succeed,
    /// Posts an error with the given message right after linking.
    Fail(String),
    /// Waits for `MockEngine::finish`.
    Manual,
    /// Never exposes a stream; only a stop ends it.
    Hang,
}

#[derive(Debug, Clone)]
pub struct MockScript {
    pub streams: Vec<StreamInfo>,
    pub duration: Option<Duration>,
    pub position: Option<Duration>,
    pub outcome: MockOutcome,
}

impl MockScript {
    /// A single audio stream, ten seconds long, that encodes successfully.
    pub fn audio() -> Self {
        Self {
            streams: vec![StreamInfo::audio(0, "pcm_s16le")],
            duration: Some(Duration::from_secs(10)),
            position: Some(Duration::ZERO),
            outcome: MockOutcome::Succeed,
        }
    }

    pub fn with_outcome(mut self, outcome: MockOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_streams(mut self, streams: Vec<StreamInfo>) -> Self {
        self.streams = streams;
        self
    }

    pub fn with_timing(mut self, position: Option<Duration>, duration: Option<Duration>) -> Self {
        self.position = position;
        self.duration = duration;
        self
    }
}

impl Default for MockScript {
    fn default() -> Self {
        Self::audio()
    }
}

enum MockCommand {
    Finish(bool),
    Stop,
}

const STANDARD_ELEMENTS: &[(&str, ElementRole, &str)] = &[
    ("flacenc", ElementRole::Encoder, "audio/x-flac"),
    ("avenc_aac", ElementRole::Encoder, "audio/mpeg, mpegversion=(int)4"),
    ("lamemp3enc", ElementRole::Encoder, "audio/mpeg, mpegversion=(int)1, layer=(int)3"),
    ("vorbisenc", ElementRole::Encoder, "audio/x-vorbis"),
    ("speexenc", ElementRole::Encoder, "audio/x-speex"),
    ("opusenc", ElementRole::Encoder, "audio/x-opus"),
    ("avenc_wmav2", ElementRole::Encoder, "audio/x-wma, wmaversion=(int)2"),
    ("oggmux", ElementRole::Muxer, "application/ogg"),
    ("mp4mux", ElementRole::Muxer, "audio/mp4"),
    ("asfmux", ElementRole::Muxer, "video/x-ms-asf"),
    ("wavenc", ElementRole::Muxer, "audio/x-wav"),
];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Engine whose registry and pipeline behaviour are set up by the caller.
#[derive(Default)]
pub struct MockEngine {
    factories: Mutex<Vec<ElementFactory>>,
    broken: Mutex<HashSet<String>>,
    scripts: Mutex<HashMap<String, MockScript>>,
    default_script: Mutex<MockScript>,
    failing_launches: Mutex<HashSet<String>>,
    controls: Mutex<HashMap<String, Sender<MockCommand>>>,
    launched: Mutex<Vec<PipelineGraph>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockEngine {
    /// An engine with an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine with one primary-ranked element for every preset.
    pub fn with_standard_registry() -> Self {
        let engine = Self::new();
        for (name, role, caps) in STANDARD_ELEMENTS {
            if let Err(e) = engine.add_factory(name, *role, &[caps], RANK_PRIMARY) {
                log::error!("Invalid mock element {}: {}", name, e);
            }
        }
        engine
    }

    pub fn add_factory(&self, name: &str, role: ElementRole, caps: &[&str], rank: u32) -> CoreResult<()> {
        let factory = ElementFactory::new(name, role, caps, rank)?;
        lock(&self.factories).push(factory);
        Ok(())
    }

    /// Keeps `name` in the registry but makes every instantiation fail.
    pub fn break_factory(&self, name: &str) {
        lock(&self.broken).insert(name.to_string());
    }

    /// Sets the script for pipelines reading `input`.
    pub fn script(&self, input: impl AsRef<Path>, script: MockScript) {
        lock(&self.scripts).insert(path_key(input.as_ref()), script);
    }

    /// Sets the script for inputs without their own.
    pub fn set_default_script(&self, script: MockScript) {
        *lock(&self.default_script) = script;
    }

    /// Makes `launch` fail for pipelines reading `input`.
    pub fn fail_launch(&self, input: impl AsRef<Path>) {
        lock(&self.failing_launches).insert(path_key(input.as_ref()));
    }

    /// Ends a `Manual` pipeline reading `input`. Returns false if no such
    /// pipeline is waiting.
    pub fn finish(&self, input: impl AsRef<Path>, success: bool) -> bool {
        let key = path_key(input.as_ref());
        match lock(&self.controls).get(&key) {
            Some(tx) => tx.send(MockCommand::Finish(success)).is_ok(),
            None => false,
        }
    }

    /// Graphs as they were handed to `launch`, in launch order.
    pub fn launched_graphs(&self) -> Vec<PipelineGraph> {
        lock(&self.launched).clone()
    }

    /// Pipelines launched and not yet finished or stopped.
    pub fn running_count(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Highest `running_count` observed so far.
    pub fn peak_running(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl MediaEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn factories(&self, role: ElementRole) -> Vec<ElementFactory> {
        lock(&self.factories)
            .iter()
            .filter(|f| f.role == role)
            .cloned()
            .collect()
    }

    fn make_element(&self, factory_name: &str, name: &str) -> CoreResult<Element> {
        let creation_error = |reason: &str| CoreError::ElementCreation {
            factory: factory_name.to_string(),
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if lock(&self.broken).contains(factory_name) {
            return Err(creation_error("factory is broken"));
        }
        let registered = factory::BUILTIN.contains(&factory_name)
            || lock(&self.factories).iter().any(|f| f.name == factory_name);
        if !registered {
            return Err(creation_error("no such element factory"));
        }
        Ok(Element::new(factory_name, name))
    }

    fn launch(
        &self,
        graph: PipelineGraph,
        callbacks: PipelineCallbacks,
    ) -> CoreResult<Box<dyn PipelineHandle>> {
        let input = location_of(&graph, factory::FILE_SRC)?;
        if lock(&self.failing_launches).contains(&input) {
            return Err(CoreError::Graph(format!("mock refused to launch {}", graph.name())));
        }

        let script = lock(&self.scripts)
            .get(&input)
            .cloned()
            .unwrap_or_else(|| lock(&self.default_script).clone());

        let (tx, rx) = mpsc::channel();
        lock(&self.controls).insert(input, tx.clone());
        lock(&self.launched).push(graph.clone());

        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_running, Ordering::SeqCst);

        let pipeline = Arc::new(MockPipeline {
            graph: Mutex::new(graph),
            clock: PlaybackClock::default(),
            gate: Mutex::new(()),
            stopped: AtomicBool::new(false),
            released: AtomicBool::new(false),
            running: Arc::clone(&self.running),
        });

        let worker = Arc::clone(&pipeline);
        let thread_name = format!("mock-{}", lock(&pipeline.graph).name());
        let spawned = thread::Builder::new()
            .name(thread_name)
            .spawn(move || worker.run(script, callbacks, rx));
        if let Err(e) = spawned {
            pipeline.release();
            return Err(e.into());
        }

        Ok(Box::new(MockPipelineHandle { pipeline, control: tx }))
    }
}

struct MockPipeline {
    graph: Mutex<PipelineGraph>,
    clock: PlaybackClock,
    /// Held while a bus message is delivered so `stop` cannot interleave.
    gate: Mutex<()>,
    stopped: AtomicBool,
    released: AtomicBool,
    running: Arc<AtomicUsize>,
}

impl MockPipeline {
    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn post(&self, bus: &mut BusCallback, message: BusMessage) {
        let _gate = lock(&self.gate);
        if !self.stopped.load(Ordering::SeqCst) {
            bus(message);
        }
    }

    fn post_terminal(&self, bus: &mut BusCallback, success: bool, message: &str) {
        self.release();
        if success {
            if let Some(duration) = self.clock.duration() {
                self.clock.set_position(duration);
            }
            self.post(bus, BusMessage::EndOfStream);
        } else {
            self.post(
                bus,
                BusMessage::Error {
                    source: "mock".to_string(),
                    message: message.to_string(),
                    debug: None,
                },
            );
        }
    }

    fn run(&self, script: MockScript, callbacks: PipelineCallbacks, rx: Receiver<MockCommand>) {
        let PipelineCallbacks { mut pad_added, mut bus } = callbacks;
        self.post(&mut bus, BusMessage::StateChanged {
            old: PipelineState::Null,
            new: PipelineState::Ready,
        });

        if script.outcome == MockOutcome::Hang {
            // Any command, or the handle going away, ends the wait.
            let _ = rx.recv();
            self.release();
            return;
        }

        let decode = lock(&self.graph)
            .element_by_factory(factory::DECODE_BIN)
            .map(|e| e.name.clone())
            .unwrap_or_default();

        let mut linked = false;
        for stream in &script.streams {
            if let Some(target) = pad_added(stream) {
                let mut graph = lock(&self.graph);
                linked |= graph.link_pad(&decode, &stream.pad_name(), &target).is_ok();
            }
        }
        if !linked {
            self.post_terminal(&mut bus, false, "No decodable audio stream found");
            return;
        }

        if let Some(duration) = script.duration {
            self.clock.set_duration(duration);
            self.post(&mut bus, BusMessage::DurationChanged(duration));
        }
        if let Some(position) = script.position {
            self.clock.set_position(position);
        }
        self.post(&mut bus, BusMessage::StateChanged {
            old: PipelineState::Ready,
            new: PipelineState::Playing,
        });

        match script.outcome {
            MockOutcome::Succeed => self.post_terminal(&mut bus, true, ""),
            MockOutcome::Fail(message) => self.post_terminal(&mut bus, false, &message),
            MockOutcome::Manual => match rx.recv() {
                Ok(MockCommand::Finish(success)) => {
                    self.post_terminal(&mut bus, success, "Scripted failure")
                }
                Ok(MockCommand::Stop) | Err(_) => self.release(),
            },
            MockOutcome::Hang => self.release(),
        }
    }
}

struct MockPipelineHandle {
    pipeline: Arc<MockPipeline>,
    control: Sender<MockCommand>,
}

impl PipelineHandle for MockPipelineHandle {
    fn position(&self) -> Option<Duration> {
        self.pipeline.clock.position()
    }

    fn duration(&self) -> Option<Duration> {
        self.pipeline.clock.duration()
    }

    fn stop(&self) {
        {
            let _gate = lock(&self.pipeline.gate);
            self.pipeline.stopped.store(true, Ordering::SeqCst);
        }
        self.pipeline.release();
        let _ = self.control.send(MockCommand::Stop);
    }

    fn dump_graph(&self) -> String {
        lock(&self.pipeline.graph).to_dot()
    }
}

impl Drop for MockPipelineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
