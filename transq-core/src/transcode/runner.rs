// ============================================================================
// transq-core/src/transcode/runner.rs
// ============================================================================
//
// JOB RUNNER: Lifecycle of One Running Pipeline
//
// A `JobState` owns one launched pipeline. The engine calls back into the
// runner from its own threads (pad-added, bus messages); the only thing those
// callbacks do towards the scheduler is send small immutable messages over an
// mpsc channel. The scheduler thread only ever reads progress from the
// pipeline handle, stops it, or dumps its graph.
//
// KEY COMPONENTS:
// - ControlMessage: What engine threads send to the scheduler
// - RunnerShared: State shared with the engine callbacks, including the
//   exactly-once guard for the terminal event
// - JobState: Scheduler-side owner of a running job
//
// A job produces exactly one `ControlMessage::Finished`, whichever of
// end-of-stream, error, cancellation or the stall watchdog gets there first.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::{
    BusMessage, MediaEngine, PipelineCallbacks, PipelineHandle, StreamInfo, StreamKind,
};
use crate::error::CoreResult;
use crate::transcode::builder::TranscodePipeline;
use crate::transcode::job::{Job, JobId};
use crate::utils::get_filename_safe;

/// Why a job failed. Callers only see `success == false` plus log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The pipeline could not be assembled or launched.
    Construction,
    /// The engine reported an error, or the job stalled.
    Runtime,
    /// The job was stopped on request.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(FailureKind),
}

impl JobOutcome {
    pub fn is_success(self) -> bool {
        self == JobOutcome::Succeeded
    }
}

/// The terminal event of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobFinished {
    pub job_id: JobId,
    pub outcome: JobOutcome,
}

/// Messages delivered from engine threads to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Log(String),
    Finished(JobFinished),
}

/// Name used for a job in log lines.
pub(crate) fn display_name(path: &Path) -> String {
    get_filename_safe(path).unwrap_or_else(|_| path.display().to_string())
}

/// Runner state reachable from the engine callbacks.
pub(crate) struct RunnerShared {
    job_id: JobId,
    display_name: String,
    tx: Sender<ControlMessage>,
    finished: AtomicBool,
    linked: AtomicBool,
}

impl RunnerShared {
    fn new(job_id: JobId, display_name: String, tx: Sender<ControlMessage>) -> Self {
        Self {
            job_id,
            display_name,
            tx,
            finished: AtomicBool::new(false),
            linked: AtomicBool::new(false),
        }
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn post_log(&self, message: String) {
        if self.tx.send(ControlMessage::Log(message)).is_err() {
            log::debug!("Transcoder gone; dropping log line for job {}", self.job_id);
        }
    }

    /// Claims the exactly-once guard. Only the caller that gets `true` may
    /// post the terminal event.
    fn claim(&self) -> bool {
        !self.finished.swap(true, Ordering::AcqRel)
    }

    fn post_finished(&self, outcome: JobOutcome) {
        log::debug!("Job {} ({}) finished: {:?}", self.job_id, self.display_name, outcome);
        let message = ControlMessage::Finished(JobFinished {
            job_id: self.job_id,
            outcome,
        });
        if self.tx.send(message).is_err() {
            log::debug!("Transcoder gone; dropping terminal event for job {}", self.job_id);
        }
    }

    /// Posts the terminal event unless one was already posted. Returns
    /// whether this call posted it.
    fn finish(&self, outcome: JobOutcome) -> bool {
        if !self.claim() {
            return false;
        }
        self.post_finished(outcome);
        true
    }

    /// Runtime failure: forwards the diagnostic as a log line, then posts the
    /// terminal event. Nothing is posted if the job already finished.
    fn fail(&self, message: &str) {
        if !self.claim() {
            return;
        }
        self.post_log(format!("Error processing {}: {}", self.display_name, message));
        self.post_finished(JobOutcome::Failed(FailureKind::Runtime));
    }

    fn handle_message(&self, message: BusMessage) {
        if self.is_finished() {
            return;
        }
        match message {
            BusMessage::EndOfStream => {
                self.finish(JobOutcome::Succeeded);
            }
            BusMessage::Error {
                source,
                message,
                debug,
            } => {
                log::debug!(
                    "Job {}: error from {}: {} ({})",
                    self.job_id,
                    source,
                    message,
                    debug.as_deref().unwrap_or("no details")
                );
                self.fail(&message);
            }
            BusMessage::StateChanged { old, new } => {
                log::trace!("Job {}: {:?} -> {:?}", self.job_id, old, new);
            }
            BusMessage::DurationChanged(duration) => {
                log::trace!("Job {}: duration {:?}", self.job_id, duration);
            }
        }
    }

    /// Links the first audio stream the decoder exposes into `convert`.
    fn handle_pad_added(&self, stream: &StreamInfo, convert: &str) -> Option<String> {
        if self.is_finished() || stream.kind != StreamKind::Audio {
            return None;
        }
        if self.linked.swap(true, Ordering::AcqRel) {
            log::debug!("Job {}: ignoring extra audio stream {}", self.job_id, stream.index);
            return None;
        }
        log::debug!(
            "Job {}: linking {} stream {} ({:?} ch, {:?} Hz) into {}",
            self.job_id,
            stream.codec,
            stream.index,
            stream.channels,
            stream.sample_rate,
            convert
        );
        Some(convert.to_string())
    }
}

/// A running job, owned by the scheduler.
pub struct JobState {
    id: JobId,
    job: Job,
    encoder: Option<String>,
    muxer: Option<String>,
    handle: Box<dyn PipelineHandle>,
    shared: Arc<RunnerShared>,
    started_at: Instant,
}

impl JobState {
    /// Launches `pipeline` and wires its callbacks to `tx`.
    pub(crate) fn start(
        engine: &dyn MediaEngine,
        id: JobId,
        job: Job,
        pipeline: TranscodePipeline,
        tx: Sender<ControlMessage>,
    ) -> CoreResult<Self> {
        let shared = Arc::new(RunnerShared::new(id, display_name(&job.input), tx));

        let pad_shared = Arc::clone(&shared);
        let bus_shared = Arc::clone(&shared);
        let convert = pipeline.convert;
        let callbacks = PipelineCallbacks {
            pad_added: Box::new(move |stream| pad_shared.handle_pad_added(stream, &convert)),
            bus: Box::new(move |message| bus_shared.handle_message(message)),
        };

        let handle = engine.launch(pipeline.graph, callbacks)?;
        log::info!(
            "Started job {}: {} -> {}",
            id,
            job.input.display(),
            job.output.display()
        );

        Ok(Self {
            id,
            job,
            encoder: pipeline.encoder,
            muxer: pipeline.muxer,
            handle,
            shared,
            started_at: Instant::now(),
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Factory names chosen for the encoder and muxer.
    pub fn elements(&self) -> (Option<&str>, Option<&str>) {
        (self.encoder.as_deref(), self.muxer.as_deref())
    }

    /// Fraction complete in [0.0, 1.0]; 0.0 while the duration is unknown.
    pub fn progress(&self) -> f32 {
        let Some(duration) = self.handle.duration().filter(|d| !d.is_zero()) else {
            return 0.0;
        };
        let position = self.handle.position().unwrap_or_default();
        (position.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0) as f32
    }

    /// Stops the pipeline and posts a cancelled terminal event, unless the
    /// job already finished on its own.
    pub(crate) fn cancel(&self) {
        self.handle.stop();
        if self.shared.finish(JobOutcome::Failed(FailureKind::Cancelled)) {
            log::info!("Cancelled job {} ({})", self.id, self.job.input.display());
        }
    }

    /// Fails the job if its decoder has not exposed a usable stream within
    /// `timeout`. Returns whether the job was failed by this call.
    pub(crate) fn check_stalled(&self, timeout: Duration) -> bool {
        if self.shared.is_finished()
            || self.shared.linked.load(Ordering::Acquire)
            || self.started_at.elapsed() < timeout
        {
            return false;
        }
        log::warn!(
            "Job {} produced no decodable stream within {}s",
            self.id,
            timeout.as_secs()
        );
        self.handle.stop();
        self.shared
            .fail(&format!("no decodable stream found within {}s", timeout.as_secs()));
        true
    }

    /// Stops the pipeline after its terminal event was handled.
    pub(crate) fn release(&self) {
        self.handle.stop();
    }

    pub fn dump_graph(&self) -> String {
        self.handle.dump_graph()
    }
}
