// ============================================================================
// transq-core/src/transcode/scheduler.rs
// ============================================================================
//
// TRANSCODER: Queue, Admission and Retirement of Jobs
//
// The `Transcoder` owns the pending queue and the set of running jobs. It is
// driven from a single thread: every public method takes `&mut self` and all
// events are emitted from inside those calls. Engine threads never touch the
// queue or the running set; they send `ControlMessage`s, which the owner
// drains with `process_events`, `wait_for_events` or `run_until_complete`.
//
// JOB LIFECYCLE:
// Pending -> Starting -> Running -> Succeeded | Failed. Starting -> Failed
// happens when the pipeline cannot be built or launched; such jobs never
// count against max_threads.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::TranscoderConfig;
use crate::engine::{ElementRole, MediaEngine};
use crate::error::{CoreError, CoreResult};
use crate::events::{Event, EventDispatcher, EventHandler};
use crate::presets::TranscoderPreset;
use crate::transcode::builder::build_pipeline;
use crate::transcode::job::{derive_output_path, unique_output_path_avoiding, Job, JobId};
use crate::transcode::runner::{
    display_name, ControlMessage, FailureKind, JobFinished, JobOutcome, JobState,
};

/// How often the stall watchdog runs while waiting for events.
const WATCHDOG_TICK: Duration = Duration::from_millis(250);

/// Result of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartJobStatus {
    StartedSuccessfully,
    FailedToStart,
    NoMoreJobs,
    AllThreadsBusy,
}

/// Snapshot of a running job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveJob {
    pub id: JobId,
    pub input: PathBuf,
    pub output: PathBuf,
    pub encoder: Option<String>,
    pub muxer: Option<String>,
}

/// Bounded concurrent transcoding scheduler.
pub struct Transcoder {
    engine: Arc<dyn MediaEngine>,
    config: TranscoderConfig,
    queue: VecDeque<Job>,
    current: Vec<JobState>,
    next_id: JobId,
    tx: Sender<ControlMessage>,
    rx: Receiver<ControlMessage>,
    events: EventDispatcher,
    /// Set while there is work that has not yet been reported as complete.
    pending_all_complete: bool,
}

impl Transcoder {
    pub fn new(engine: Arc<dyn MediaEngine>, config: TranscoderConfig) -> CoreResult<Self> {
        config.validate()?;
        let (tx, rx) = mpsc::channel();
        log::debug!(
            "Transcoder using {} engine, max_threads={}",
            engine.name(),
            config.max_threads
        );
        Ok(Self {
            engine,
            config,
            queue: VecDeque::new(),
            current: Vec::new(),
            next_id: 1,
            tx,
            rx,
            events: EventDispatcher::new(),
            pending_all_complete: false,
        })
    }

    pub fn add_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.events.add_handler(handler);
    }

    pub fn config(&self) -> &TranscoderConfig {
        &self.config
    }

    pub fn max_threads(&self) -> usize {
        self.config.max_threads
    }

    /// Changes the concurrency bound for future admissions. Running jobs are
    /// left alone even if there are now more of them than the new bound.
    pub fn set_max_threads(&mut self, max_threads: usize) {
        if max_threads == 0 {
            log::warn!("max_threads must be at least 1; using 1");
        }
        self.config.max_threads = max_threads.max(1);
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Queues a job and returns its output path.
    ///
    /// Without an explicit `output`, the input's extension is replaced by the
    /// preset extension, and unless `overwrite` is set an existing file there
    /// is avoided by picking a numbered sibling. Whether the preset can be
    /// produced is only found out when the job is started.
    pub fn add_job(
        &mut self,
        input: impl AsRef<Path>,
        preset: &TranscoderPreset,
        output: Option<&Path>,
        overwrite: bool,
    ) -> CoreResult<PathBuf> {
        let input = input.as_ref();
        let output = match output {
            Some(output) => output.to_path_buf(),
            None => {
                let derived = derive_output_path(input, &preset.extension);
                if overwrite {
                    derived
                } else {
                    unique_output_path_avoiding(&derived, |p| self.is_output_reserved(p))
                }
            }
        };
        self.enqueue(input, output, preset, overwrite, false)
    }

    /// Queues a job writing to a fresh temporary file and returns that path.
    /// The caller owns the file once the job completes.
    pub fn add_temporary_job(
        &mut self,
        input: impl AsRef<Path>,
        preset: &TranscoderPreset,
    ) -> CoreResult<PathBuf> {
        if input.as_ref().as_os_str().is_empty() {
            return Err(CoreError::InvalidJob("input path is empty".to_string()));
        }
        let suffix = format!(".{}", preset.extension);
        let mut builder = tempfile::Builder::new();
        builder.prefix("transq-").suffix(&suffix);
        let file = match &self.config.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let output = file.into_temp_path().keep().map_err(|e| CoreError::Io(e.error))?;

        self.enqueue(input.as_ref(), output, preset, true, true)
    }

    fn enqueue(
        &mut self,
        input: &Path,
        output: PathBuf,
        preset: &TranscoderPreset,
        overwrite: bool,
        temporary: bool,
    ) -> CoreResult<PathBuf> {
        if input.as_os_str().is_empty() {
            return Err(CoreError::InvalidJob("input path is empty".to_string()));
        }
        if output.as_os_str().is_empty() {
            return Err(CoreError::InvalidJob("output path is empty".to_string()));
        }

        log::debug!(
            "Queued {} -> {} ({})",
            input.display(),
            output.display(),
            preset.name
        );
        self.queue.push_back(Job {
            input: input.to_path_buf(),
            output: output.clone(),
            preset: preset.clone(),
            overwrite,
            temporary,
        });
        self.pending_all_complete = true;
        Ok(output)
    }

    // ------------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------------

    /// Admits queued jobs until the queue is empty or `max_threads` jobs are
    /// running. Returns without waiting for any job to finish.
    pub fn start(&mut self) {
        self.admit();
        self.emit_all_complete_if_idle();
    }

    /// Stops every running job and discards the queue.
    ///
    /// Each running job still reports exactly one (failed) completion, which
    /// is delivered by the next `process_events`/`wait_for_events` call.
    pub fn cancel(&mut self) {
        let discarded = self.queue.len();
        self.queue.clear();
        log::info!(
            "Cancelling {} running job(s), discarding {} queued",
            self.current.len(),
            discarded
        );
        for state in &self.current {
            state.cancel();
        }
        self.emit_all_complete_if_idle();
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// Input path -> fraction complete for every running job.
    pub fn progress(&self) -> BTreeMap<PathBuf, f32> {
        self.current
            .iter()
            .map(|state| (state.job().input.clone(), state.progress()))
            .collect()
    }

    pub fn queued_jobs_count(&self) -> usize {
        self.queue.len()
    }

    pub fn running_jobs_count(&self) -> usize {
        self.current.len()
    }

    /// True when nothing is queued or running.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.current.is_empty()
    }

    pub fn active_jobs(&self) -> Vec<ActiveJob> {
        self.current
            .iter()
            .map(|state| {
                let (encoder, muxer) = state.elements();
                ActiveJob {
                    id: state.id(),
                    input: state.job().input.clone(),
                    output: state.job().output.clone(),
                    encoder: encoder.map(str::to_string),
                    muxer: muxer.map(str::to_string),
                }
            })
            .collect()
    }

    /// Graphviz rendering of a running job's pipeline, dynamic links included.
    pub fn dump_graph(&self, id: JobId) -> Option<String> {
        self.current
            .iter()
            .find(|state| state.id() == id)
            .map(JobState::dump_graph)
    }

    // ------------------------------------------------------------------------
    // Event pumping
    // ------------------------------------------------------------------------

    /// Handles every message already delivered by the engine, without
    /// blocking. Returns the number of messages handled.
    pub fn process_events(&mut self) -> usize {
        self.check_stalled();
        let mut handled = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.handle_message(message);
            handled += 1;
        }
        handled
    }

    /// Blocks until at least one message arrives or `timeout` passes, then
    /// handles everything pending. Returns the number of messages handled.
    ///
    /// A timeout too large to be represented as a deadline (such as
    /// `Duration::MAX`) waits until a message arrives.
    pub fn wait_for_events(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            self.check_stalled();
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::MAX,
            };
            match self.rx.recv_timeout(remaining.min(WATCHDOG_TICK)) {
                Ok(message) => {
                    self.handle_message(message);
                    return 1 + self.process_events();
                }
                Err(RecvTimeoutError::Timeout) if !remaining.is_zero() => continue,
                Err(RecvTimeoutError::Timeout) => return 0,
                // The transcoder holds a sender, so this cannot happen.
                Err(RecvTimeoutError::Disconnected) => return 0,
            }
        }
    }

    /// Starts admission and drives the transcoder until every job is done.
    pub fn run_until_complete(&mut self) {
        self.start();
        while !self.is_idle() {
            self.wait_for_events(WATCHDOG_TICK);
        }
        self.process_events();
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn admit(&mut self) {
        loop {
            match self.maybe_start_next_job() {
                StartJobStatus::StartedSuccessfully | StartJobStatus::FailedToStart => continue,
                StartJobStatus::NoMoreJobs | StartJobStatus::AllThreadsBusy => break,
            }
        }
    }

    fn maybe_start_next_job(&mut self) -> StartJobStatus {
        if self.current.len() >= self.config.max_threads {
            return StartJobStatus::AllThreadsBusy;
        }
        let Some(job) = self.queue.pop_front() else {
            return StartJobStatus::NoMoreJobs;
        };

        let id = self.next_id;
        self.next_id += 1;

        let started = build_pipeline(self.engine.as_ref(), &self.config, &job, id).and_then(
            |pipeline| JobState::start(self.engine.as_ref(), id, job.clone(), pipeline, self.tx.clone()),
        );

        match started {
            Ok(state) => {
                self.events.emit(Event::JobStarted {
                    input: job.input,
                    output: job.output,
                });
                self.current.push(state);
                StartJobStatus::StartedSuccessfully
            }
            Err(e) => {
                log::warn!("Could not start job {} ({}): {}", id, job.input.display(), e);
                self.events.emit(Event::LogLine {
                    message: construction_log_line(&job, &e),
                });
                self.complete(id, job, JobOutcome::Failed(FailureKind::Construction));
                StartJobStatus::FailedToStart
            }
        }
    }

    fn handle_message(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Log(message) => self.events.emit(Event::LogLine { message }),
            ControlMessage::Finished(finished) => self.retire(finished),
        }
    }

    fn retire(&mut self, finished: JobFinished) {
        let Some(index) = self.current.iter().position(|s| s.id() == finished.job_id) else {
            log::debug!("Ignoring terminal event for unknown job {}", finished.job_id);
            return;
        };
        let state = self.current.remove(index);
        state.release();
        let job = state.job().clone();
        drop(state);

        self.complete(finished.job_id, job, finished.outcome);
        self.admit();
        self.emit_all_complete_if_idle();
    }

    /// Emits the single completion notification for a job.
    fn complete(&self, id: JobId, job: Job, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Succeeded => log::info!("Job {} succeeded: {}", id, job.input.display()),
            JobOutcome::Failed(kind) => {
                log::info!("Job {} failed ({:?}): {}", id, kind, job.input.display())
            }
        }
        self.events.emit(Event::JobComplete {
            input: job.input,
            output: job.output,
            success: outcome.is_success(),
        });
    }

    /// Whether a queued or running job already writes to `path`.
    fn is_output_reserved(&self, path: &Path) -> bool {
        self.queue.iter().any(|job| job.output == path)
            || self.current.iter().any(|state| state.job().output == path)
    }

    fn check_stalled(&mut self) {
        if let Some(timeout) = self.config.stream_timeout() {
            for state in &self.current {
                state.check_stalled(timeout);
            }
        }
    }

    fn emit_all_complete_if_idle(&mut self) {
        if self.pending_all_complete && self.is_idle() {
            self.pending_all_complete = false;
            log::debug!("All jobs complete");
            self.events.emit(Event::AllJobsComplete);
        }
    }
}

impl Drop for Transcoder {
    fn drop(&mut self) {
        for state in &self.current {
            state.release();
        }
    }
}

/// The diagnostic reported when a job fails before it could run.
fn construction_log_line(job: &Job, error: &CoreError) -> String {
    match error {
        CoreError::NoSuitableElement { role, mime_type } => {
            let article = match role {
                ElementRole::Encoder => "an",
                ElementRole::Muxer => "a",
            };
            format!(
                "Couldn't find {} {} for {}, check you have the correct plugins installed",
                article, role, mime_type
            )
        }
        other => format!("Error processing {}: {}", display_name(&job.input), other),
    }
}
