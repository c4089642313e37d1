// Scheduling properties of the Transcoder, exercised against the scripted
// mock engine.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::tempdir;
use transq_core::config::TranscoderConfigBuilder;
use transq_core::engine::mocks::{MockEngine, MockOutcome, MockScript};
use transq_core::events::{Event, EventRecorder};
use transq_core::presets::{preset_for_file_type, FileType};
use transq_core::Transcoder;

// --- Test Helper Functions ---

fn transcoder(engine: &Arc<MockEngine>, max_threads: usize) -> Result<(Transcoder, Arc<EventRecorder>), Box<dyn Error>> {
    let config = TranscoderConfigBuilder::new()
        .max_threads(max_threads)
        .stream_timeout_secs(0)
        .build();
    let mut transcoder = Transcoder::new(engine.clone(), config)?;
    let recorder = Arc::new(EventRecorder::new());
    transcoder.add_handler(recorder.clone());
    Ok((transcoder, recorder))
}

fn manual_engine() -> Arc<MockEngine> {
    let engine = MockEngine::with_standard_registry();
    engine.set_default_script(MockScript::audio().with_outcome(MockOutcome::Manual));
    Arc::new(engine)
}

fn pump_until(transcoder: &mut Transcoder, mut done: impl FnMut(&Transcoder) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done(transcoder) {
        assert!(Instant::now() < deadline, "timed out waiting for the transcoder");
        transcoder.wait_for_events(Duration::from_millis(50));
    }
}

fn add_jobs(transcoder: &mut Transcoder, dir: &std::path::Path, count: usize) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let preset = preset_for_file_type(FileType::Flac);
    let mut inputs = Vec::new();
    for i in 0..count {
        let input = dir.join(format!("track{:02}.wav", i));
        transcoder.add_job(&input, &preset, None, false)?;
        inputs.push(input);
    }
    Ok(inputs)
}

fn started_count(recorder: &EventRecorder) -> usize {
    recorder
        .events()
        .iter()
        .filter(|e| matches!(e, Event::JobStarted { .. }))
        .count()
}

// --- Tests ---

#[test]
fn running_jobs_never_exceed_max_threads() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let engine = manual_engine();
    let (mut transcoder, recorder) = transcoder(&engine, 2)?;
    add_jobs(&mut transcoder, dir.path(), 5)?;

    transcoder.start();
    assert_eq!(transcoder.running_jobs_count(), 2);
    assert_eq!(transcoder.queued_jobs_count(), 3);

    while !transcoder.is_idle() {
        assert!(transcoder.running_jobs_count() <= 2);
        let done = recorder.completions().len();
        let first = transcoder.active_jobs()[0].input.clone();
        assert!(engine.finish(&first, true));
        pump_until(&mut transcoder, |_| recorder.completions().len() > done);
    }

    assert_eq!(engine.peak_running(), 2);
    assert_eq!(recorder.completions().len(), 5);
    assert!(recorder.completions().iter().all(|(_, success)| *success));
    assert_eq!(recorder.count_all_complete(), 1);
    Ok(())
}

#[test]
fn queued_count_drops_by_one_per_admission() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let engine = manual_engine();
    let (mut transcoder, recorder) = transcoder(&engine, 1)?;
    let inputs = add_jobs(&mut transcoder, dir.path(), 3)?;

    assert_eq!(transcoder.queued_jobs_count(), 3);
    transcoder.start();
    assert_eq!(transcoder.queued_jobs_count(), 2);

    for (finished, input) in inputs.iter().enumerate() {
        let queued_before = transcoder.queued_jobs_count();
        assert!(engine.finish(input, true));
        pump_until(&mut transcoder, |_| recorder.completions().len() == finished + 1);
        assert_eq!(transcoder.queued_jobs_count(), queued_before.saturating_sub(1));
    }

    assert!(transcoder.is_idle());
    Ok(())
}

#[test]
fn cancel_fails_running_jobs_and_drops_queue() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let engine = manual_engine();
    let (mut transcoder, recorder) = transcoder(&engine, 2)?;
    add_jobs(&mut transcoder, dir.path(), 5)?;

    transcoder.start();
    assert_eq!(transcoder.running_jobs_count(), 2);

    transcoder.cancel();
    assert_eq!(transcoder.queued_jobs_count(), 0);
    pump_until(&mut transcoder, |t| t.is_idle());
    transcoder.process_events();

    let completions = recorder.completions();
    assert_eq!(completions.len(), 2);
    assert!(completions.iter().all(|(_, success)| !success));
    assert_eq!(started_count(&recorder), 2);
    assert_eq!(recorder.count_all_complete(), 1);
    assert_eq!(engine.running_count(), 0);
    Ok(())
}

#[test]
fn cancel_before_start_reports_all_complete() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let engine = manual_engine();
    let (mut transcoder, recorder) = transcoder(&engine, 2)?;
    add_jobs(&mut transcoder, dir.path(), 2)?;

    transcoder.cancel();
    assert!(recorder.completions().is_empty());
    assert_eq!(recorder.count_all_complete(), 1);
    assert!(engine.launched_graphs().is_empty());
    Ok(())
}

#[test]
fn progress_is_stable_between_state_changes() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let engine = manual_engine();
    let half = MockScript::audio()
        .with_outcome(MockOutcome::Manual)
        .with_timing(Some(Duration::from_secs(5)), Some(Duration::from_secs(10)));
    let unknown = MockScript::audio()
        .with_outcome(MockOutcome::Manual)
        .with_timing(None, None);
    let inputs = [dir.path().join("half.wav"), dir.path().join("unknown.wav")];
    engine.script(&inputs[0], half);
    engine.script(&inputs[1], unknown);

    let (mut transcoder, _recorder) = transcoder(&engine, 2)?;
    let preset = preset_for_file_type(FileType::Mpeg);
    for input in &inputs {
        transcoder.add_job(input, &preset, None, false)?;
    }
    transcoder.start();
    pump_until(&mut transcoder, |t| t.progress().get(&inputs[0]) == Some(&0.5));

    let first = transcoder.progress();
    let second = transcoder.progress();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(first[&inputs[1]], 0.0);

    transcoder.cancel();
    pump_until(&mut transcoder, |t| t.is_idle());
    assert!(transcoder.progress().is_empty());
    Ok(())
}

#[test]
fn reducing_max_threads_leaves_running_jobs_alone() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let engine = manual_engine();
    let (mut transcoder, recorder) = transcoder(&engine, 2)?;
    let inputs = add_jobs(&mut transcoder, dir.path(), 4)?;

    transcoder.start();
    transcoder.set_max_threads(1);
    assert_eq!(transcoder.running_jobs_count(), 2);

    assert!(engine.finish(&inputs[0], true));
    pump_until(&mut transcoder, |_| recorder.completions().len() == 1);
    assert_eq!(transcoder.running_jobs_count(), 1);
    assert_eq!(transcoder.queued_jobs_count(), 2);

    assert!(engine.finish(&inputs[1], true));
    pump_until(&mut transcoder, |_| recorder.completions().len() == 2);
    assert_eq!(transcoder.running_jobs_count(), 1);
    assert_eq!(transcoder.queued_jobs_count(), 1);

    transcoder.cancel();
    pump_until(&mut transcoder, |t| t.is_idle());
    Ok(())
}

#[test]
fn zero_max_threads_is_raised_to_one() -> Result<(), Box<dyn Error>> {
    let engine = manual_engine();
    let (mut transcoder, _recorder) = transcoder(&engine, 3)?;
    transcoder.set_max_threads(0);
    assert_eq!(transcoder.max_threads(), 1);
    Ok(())
}

#[test]
fn every_job_completes_exactly_once() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let engine = MockEngine::with_standard_registry();
    let inputs: Vec<PathBuf> = (0..6).map(|i| dir.path().join(format!("mix{}.wav", i))).collect();
    engine.script(&inputs[1], MockScript::audio().with_outcome(MockOutcome::Fail("bad frame".to_string())));
    engine.script(&inputs[3], MockScript::audio().with_streams(Vec::new()));
    engine.fail_launch(&inputs[4]);
    engine.break_factory("lamemp3enc");
    let engine = Arc::new(engine);

    let (mut transcoder, recorder) = transcoder(&engine, 3)?;
    for (i, input) in inputs.iter().enumerate() {
        let file_type = if i == 5 { FileType::Mpeg } else { FileType::OggOpus };
        transcoder.add_job(input, &preset_for_file_type(file_type), None, false)?;
    }
    transcoder.run_until_complete();

    let completions = recorder.completions();
    assert_eq!(completions.len(), inputs.len());
    for (i, input) in inputs.iter().enumerate() {
        let matching: Vec<_> = completions.iter().filter(|(p, _)| p == input).collect();
        assert_eq!(matching.len(), 1, "{} completed {} times", input.display(), matching.len());
        let expect_success = matches!(i, 0 | 2);
        assert_eq!(matching[0].1, expect_success, "{}", input.display());
    }
    assert_eq!(recorder.count_all_complete(), 1);
    assert!(engine.peak_running() <= 3);
    Ok(())
}

#[test]
fn empty_input_is_rejected() -> Result<(), Box<dyn Error>> {
    let engine = manual_engine();
    let (mut transcoder, _recorder) = transcoder(&engine, 1)?;
    let preset = preset_for_file_type(FileType::Flac);
    assert!(transcoder.add_job("", &preset, None, false).is_err());
    assert!(transcoder.add_temporary_job("", &preset).is_err());
    assert_eq!(transcoder.queued_jobs_count(), 0);
    Ok(())
}
