// ============================================================================
// transq-cli/src/commands/transcode.rs
// ============================================================================
//
// TRANSCODE COMMAND: Queue Inputs and Drive the Scheduler
//
// Flow:
// 1. Load the configuration file (if any) and apply command-line overrides
// 2. Validate the inputs and work out each output path
// 3. Build a Transcoder on the ffmpeg engine and attach a handler: JSON lines
//    or interactive progress bars
// 4. Pump the transcoder until AllJobsComplete, refreshing the bars from
//    GetProgress on every tick
// 5. Print a summary; the caller maps failures to the exit code

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use indicatif::{MultiProgress, ProgressBar};
use transq_core::config::TranscoderConfig;
use transq_core::engine::FfmpegEngine;
use transq_core::events::{Event, EventHandler, JsonEventHandler};
use transq_core::presets::preset_for_file_type;
use transq_core::transcode::{derive_output_path, unique_output_path_avoiding};
use transq_core::utils::get_filename_safe;
use transq_core::{format_duration, Transcoder};

use crate::cli::TranscodeArgs;
use crate::output::{create_job_bar, print_error, print_heading, print_info, print_success, println_above};

const TICK: Duration = Duration::from_millis(200);

/// Totals for the summary line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeSummary {
    pub succeeded: usize,
    pub failed: usize,
}

// ============================================================================
// EVENT HANDLING
// ============================================================================

/// Counts completions and, unless quiet, mirrors them onto progress bars.
struct ConsoleReporter {
    multi: Option<MultiProgress>,
    bars: Mutex<HashMap<PathBuf, ProgressBar>>,
    summary: Mutex<TranscodeSummary>,
}

impl ConsoleReporter {
    fn new(multi: Option<MultiProgress>) -> Self {
        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            summary: Mutex::new(TranscodeSummary::default()),
        }
    }

    fn summary(&self) -> TranscodeSummary {
        self.summary.lock().map(|s| *s).unwrap_or_default()
    }

    fn update(&self, progress: &std::collections::BTreeMap<PathBuf, f32>) {
        if let Ok(bars) = self.bars.lock() {
            for (input, fraction) in progress {
                if let Some(bar) = bars.get(input) {
                    bar.set_position((fraction * 100.0).round() as u64);
                }
            }
        }
    }
}

impl EventHandler for ConsoleReporter {
    fn handle(&self, event: &Event) {
        match event {
            Event::JobStarted { input, output } => {
                log::info!("Transcoding {} -> {}", input.display(), output.display());
                if let Some(multi) = &self.multi {
                    let name = input
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| input.display().to_string());
                    let bar = create_job_bar(multi, &name);
                    if let Ok(mut bars) = self.bars.lock() {
                        bars.insert(input.clone(), bar);
                    }
                }
            }
            Event::JobComplete { input, output, success } => {
                if let Ok(mut summary) = self.summary.lock() {
                    if *success {
                        summary.succeeded += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                let bar = self.bars.lock().ok().and_then(|mut bars| bars.remove(input));
                let line = if *success {
                    format!("✓ {} -> {}", input.display(), output.display())
                } else {
                    format!("✗ {} failed", input.display())
                };
                if let Some(bar) = bar {
                    if *success {
                        bar.set_position(100);
                    }
                    bar.finish_and_clear();
                }
                match &self.multi {
                    Some(multi) => println_above(multi, line),
                    None => log::info!("{}", line),
                }
            }
            Event::LogLine { message } => match &self.multi {
                Some(multi) => println_above(multi, message),
                None => log::warn!("{}", message),
            },
            Event::AllJobsComplete => log::debug!("All jobs complete"),
        }
    }
}

// ============================================================================
// COMMAND
// ============================================================================

/// Runs the transcode command and returns the completion totals.
pub fn run_transcode(args: TranscodeArgs) -> anyhow::Result<TranscodeSummary> {
    let mut config = match &args.config {
        Some(path) => TranscoderConfig::load(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => TranscoderConfig::default(),
    };
    if let Some(jobs) = args.jobs {
        config.max_threads = jobs as usize;
    }
    if let Some(timeout) = args.timeout {
        config.stream_timeout_secs = timeout;
    }

    for input in &args.inputs {
        if !input.is_file() {
            bail!("Invalid input path: {}", input.display());
        }
    }
    let outputs = plan_outputs(&args)?;

    FfmpegEngine::ensure_available()?;

    let preset = preset_for_file_type(args.format);
    let mut transcoder = Transcoder::new(Arc::new(FfmpegEngine::new()), config)?;

    let reporter = Arc::new(ConsoleReporter::new(if args.json {
        None
    } else {
        Some(MultiProgress::new())
    }));
    if args.json {
        transcoder.add_handler(Arc::new(JsonEventHandler::new()));
    } else {
        print_heading(&format!("Transcoding to {}", preset.name));
        print_info("Files", args.inputs.len());
        print_info("Concurrent jobs", transcoder.max_threads());
    }
    transcoder.add_handler(reporter.clone());

    for (input, output) in args.inputs.iter().zip(&outputs) {
        let output = transcoder.add_job(input, &preset, output.as_deref(), args.overwrite)?;
        log::debug!("Queued {} -> {}", input.display(), output.display());
    }

    let started = Instant::now();
    transcoder.start();
    while !transcoder.is_idle() {
        transcoder.wait_for_events(TICK);
        reporter.update(&transcoder.progress());
    }
    transcoder.process_events();

    let summary = reporter.summary();
    if !args.json {
        let elapsed = format_duration(started.elapsed().as_secs_f64());
        if summary.failed == 0 {
            print_success(&format!("{} file(s) transcoded in {}", summary.succeeded, elapsed));
        } else {
            print_error(&format!(
                "{} succeeded, {} failed in {}",
                summary.succeeded, summary.failed, elapsed
            ));
        }
    }
    Ok(summary)
}

/// Explicit output per input, or `None` to let the transcoder derive one.
///
/// `--output` names the file itself for a single input, or a directory for
/// several inputs (or when it already is a directory).
fn plan_outputs(args: &TranscodeArgs) -> anyhow::Result<Vec<Option<PathBuf>>> {
    let Some(target) = &args.output else {
        return Ok(vec![None; args.inputs.len()]);
    };

    if args.inputs.len() == 1 && !target.is_dir() {
        return Ok(vec![Some(target.clone())]);
    }

    std::fs::create_dir_all(target)
        .with_context(|| format!("Failed to create output directory {}", target.display()))?;
    let extension = preset_for_file_type(args.format).extension;
    let mut planned: Vec<PathBuf> = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        let path = output_in_dir(target, input, &extension)?;
        // Inputs sharing a stem must not land on the same file.
        let path = if args.overwrite && !planned.contains(&path) {
            path
        } else {
            unique_output_path_avoiding(&path, |p| planned.iter().any(|q| q == p))
        };
        planned.push(path);
    }
    Ok(planned.into_iter().map(Some).collect())
}

fn output_in_dir(dir: &Path, input: &Path, extension: &str) -> anyhow::Result<PathBuf> {
    let name = get_filename_safe(input)?;
    Ok(derive_output_path(&dir.join(name), extension))
}
