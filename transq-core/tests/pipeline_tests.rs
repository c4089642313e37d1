// End-to-end job scenarios: single and sequential jobs, construction and
// runtime failures, temporary outputs and graph dumps.

use std::error::Error;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::tempdir;
use transq_core::config::{TranscoderConfig, TranscoderConfigBuilder};
use transq_core::engine::mocks::{MockEngine, MockOutcome, MockScript};
use transq_core::engine::{StreamInfo, StreamKind};
use transq_core::events::{Event, EventRecorder};
use transq_core::presets::{preset_for_file_type, FileType};
use transq_core::Transcoder;

fn transcoder_with(engine: &Arc<MockEngine>, config: TranscoderConfig) -> Result<(Transcoder, Arc<EventRecorder>), Box<dyn Error>> {
    // RUST_LOG=debug shows the scheduler's log output for a failing test.
    let _ = env_logger::builder().is_test(true).try_init();
    let mut transcoder = Transcoder::new(engine.clone(), config)?;
    let recorder = Arc::new(EventRecorder::new());
    transcoder.add_handler(recorder.clone());
    Ok((transcoder, recorder))
}

fn single_threaded() -> TranscoderConfig {
    TranscoderConfigBuilder::new().max_threads(1).build()
}

fn pump_until(transcoder: &mut Transcoder, mut done: impl FnMut(&Transcoder) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done(transcoder) {
        assert!(Instant::now() < deadline, "timed out waiting for the transcoder");
        transcoder.wait_for_events(Duration::from_millis(50));
    }
}

/// Events other than log lines, in emission order.
fn lifecycle(recorder: &EventRecorder) -> Vec<Event> {
    recorder
        .events()
        .into_iter()
        .filter(|e| !matches!(e, Event::LogLine { .. }))
        .collect()
}

#[test]
fn single_flac_job_succeeds_then_all_complete() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("a.wav");
    let engine = Arc::new(MockEngine::with_standard_registry());
    let (mut transcoder, recorder) = transcoder_with(&engine, single_threaded())?;

    let output = transcoder.add_job(&input, &preset_for_file_type(FileType::Flac), None, false)?;
    assert_eq!(output, dir.path().join("a.flac"));

    transcoder.run_until_complete();

    assert_eq!(
        lifecycle(&recorder),
        vec![
            Event::JobStarted {
                input: input.clone(),
                output: output.clone()
            },
            Event::JobComplete {
                input: input.clone(),
                output,
                success: true
            },
            Event::AllJobsComplete,
        ]
    );

    let graphs = engine.launched_graphs();
    assert_eq!(graphs.len(), 1);
    assert!(graphs[0].element_by_factory("flacenc").is_some());
    Ok(())
}

#[test]
fn second_job_waits_for_the_first() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let first = dir.path().join("first.wav");
    let second = dir.path().join("second.wav");
    let engine = MockEngine::with_standard_registry();
    engine.script(&first, MockScript::audio().with_outcome(MockOutcome::Manual));
    let engine = Arc::new(engine);
    let (mut transcoder, recorder) = transcoder_with(&engine, single_threaded())?;

    let preset = preset_for_file_type(FileType::Flac);
    transcoder.add_job(&first, &preset, None, false)?;
    transcoder.add_job(&second, &preset, None, false)?;
    transcoder.start();

    assert_eq!(transcoder.queued_jobs_count(), 1);
    transcoder.wait_for_events(Duration::from_millis(100));
    assert_eq!(transcoder.queued_jobs_count(), 1);
    assert_eq!(engine.launched_graphs().len(), 1);

    assert!(engine.finish(&first, true));
    pump_until(&mut transcoder, |t| t.is_idle());

    assert_eq!(recorder.completions(), vec![(first, true), (second, true)]);
    assert_eq!(recorder.count_all_complete(), 1);
    assert_eq!(engine.peak_running(), 1);
    Ok(())
}

#[test]
fn unresolvable_encoder_fails_without_running() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("a.wav");
    let engine = Arc::new(MockEngine::new());
    let (mut transcoder, recorder) = transcoder_with(&engine, single_threaded())?;

    transcoder.add_job(&input, &preset_for_file_type(FileType::Flac), None, false)?;
    transcoder.start();

    // Reported synchronously by start(); nothing was launched.
    assert_eq!(recorder.completions(), vec![(input, false)]);
    assert!(!recorder.events().iter().any(|e| matches!(e, Event::JobStarted { .. })));
    assert_eq!(
        recorder.log_lines(),
        vec!["Couldn't find an encoder for audio/x-flac, check you have the correct plugins installed".to_string()]
    );
    assert_eq!(recorder.count_all_complete(), 1);
    assert!(engine.launched_graphs().is_empty());
    assert!(transcoder.is_idle());
    Ok(())
}

#[test]
fn construction_failure_does_not_use_a_slot() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let broken = dir.path().join("broken.wav");
    let good = dir.path().join("good.wav");
    let engine = MockEngine::with_standard_registry();
    engine.break_factory("flacenc");
    engine.set_default_script(MockScript::audio().with_outcome(MockOutcome::Manual));
    let engine = Arc::new(engine);
    let (mut transcoder, recorder) = transcoder_with(&engine, single_threaded())?;

    transcoder.add_job(&broken, &preset_for_file_type(FileType::Flac), None, false)?;
    transcoder.add_job(&good, &preset_for_file_type(FileType::OggVorbis), None, false)?;
    transcoder.start();

    assert_eq!(recorder.completions(), vec![(broken, false)]);
    assert_eq!(transcoder.running_jobs_count(), 1);
    assert_eq!(transcoder.active_jobs()[0].input, good);

    transcoder.cancel();
    pump_until(&mut transcoder, |t| t.is_idle());
    Ok(())
}

#[test]
fn runtime_error_is_forwarded_as_log_line() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("corrupt.wav");
    let engine = MockEngine::with_standard_registry();
    engine.script(
        &input,
        MockScript::audio().with_outcome(MockOutcome::Fail("Internal data stream error.".to_string())),
    );
    let engine = Arc::new(engine);
    let (mut transcoder, recorder) = transcoder_with(&engine, single_threaded())?;

    transcoder.add_job(&input, &preset_for_file_type(FileType::Mpeg), None, false)?;
    transcoder.run_until_complete();

    assert_eq!(recorder.completions(), vec![(input, false)]);
    assert_eq!(
        recorder.log_lines(),
        vec!["Error processing corrupt.wav: Internal data stream error.".to_string()]
    );
    Ok(())
}

#[test]
fn input_without_audio_fails() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("video.mkv");
    let engine = MockEngine::with_standard_registry();
    let video_only = vec![StreamInfo {
        kind: StreamKind::Video,
        ..StreamInfo::audio(0, "h264")
    }];
    engine.script(&input, MockScript::audio().with_streams(video_only));
    let engine = Arc::new(engine);
    let (mut transcoder, recorder) = transcoder_with(&engine, single_threaded())?;

    transcoder.add_job(&input, &preset_for_file_type(FileType::Flac), None, false)?;
    transcoder.run_until_complete();

    assert_eq!(recorder.completions(), vec![(input, false)]);
    assert_eq!(recorder.log_lines().len(), 1);
    Ok(())
}

#[test]
fn stalled_job_is_failed_by_watchdog() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("stuck.wav");
    let engine = MockEngine::with_standard_registry();
    engine.script(&input, MockScript::audio().with_outcome(MockOutcome::Hang));
    let engine = Arc::new(engine);
    let config = TranscoderConfigBuilder::new()
        .max_threads(1)
        .stream_timeout_secs(1)
        .build();
    let (mut transcoder, recorder) = transcoder_with(&engine, config)?;

    transcoder.add_job(&input, &preset_for_file_type(FileType::Flac), None, false)?;
    let started = Instant::now();
    transcoder.run_until_complete();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(recorder.completions(), vec![(input, false)]);
    let lines = recorder.log_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("no decodable stream"), "{}", lines[0]);
    assert_eq!(engine.running_count(), 0);
    Ok(())
}

#[test]
fn temporary_job_writes_into_temp_dir() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let temp = tempdir()?;
    let input = dir.path().join("a.wav");
    let engine = Arc::new(MockEngine::with_standard_registry());
    let config = TranscoderConfigBuilder::new()
        .max_threads(1)
        .temp_dir(temp.path())
        .build();
    let (mut transcoder, recorder) = transcoder_with(&engine, config)?;

    let output = transcoder.add_temporary_job(&input, &preset_for_file_type(FileType::OggOpus))?;
    assert!(output.exists());
    assert_eq!(output.parent(), Some(temp.path()));
    assert_eq!(output.extension().and_then(|e| e.to_str()), Some("opus"));

    transcoder.run_until_complete();
    assert_eq!(recorder.completions(), vec![(input, true)]);

    let graphs = engine.launched_graphs();
    let sink = graphs[0].element("sink").ok_or("no sink")?;
    assert_eq!(sink.property("overwrite"), Some("true"));
    assert_eq!(sink.property("location").map(PathBuf::from), Some(output));
    Ok(())
}

#[test]
fn derived_output_avoids_existing_files() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("song.wav");
    File::create(dir.path().join("song.mp3"))?;
    let engine = Arc::new(MockEngine::with_standard_registry());
    let (mut transcoder, _recorder) = transcoder_with(&engine, single_threaded())?;
    let preset = preset_for_file_type(FileType::Mpeg);

    let kept = transcoder.add_job(&input, &preset, None, false)?;
    assert_eq!(kept, dir.path().join("song.1.mp3"));

    let replaced = transcoder.add_job(&input, &preset, None, true)?;
    assert_eq!(replaced, dir.path().join("song.mp3"));

    let explicit = dir.path().join("out/custom.mp3");
    assert_eq!(transcoder.add_job(&input, &preset, Some(&explicit), false)?, explicit);
    assert_eq!(transcoder.queued_jobs_count(), 3);
    Ok(())
}

#[test]
fn running_job_graph_shows_dynamic_link() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("a.wav");
    let engine = MockEngine::with_standard_registry();
    engine.set_default_script(MockScript::audio().with_outcome(MockOutcome::Manual));
    let engine = Arc::new(engine);
    let (mut transcoder, _recorder) = transcoder_with(&engine, single_threaded())?;

    transcoder.add_job(&input, &preset_for_file_type(FileType::OggVorbis), None, false)?;
    transcoder.start();

    let active = transcoder.active_jobs();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].encoder.as_deref(), Some("vorbisenc"));
    assert_eq!(active[0].muxer.as_deref(), Some("oggmux"));

    let id = active[0].id;
    pump_until(&mut transcoder, |t| {
        t.dump_graph(id).is_some_and(|dot| dot.contains("\"decode\" -> \"convert\" [label=\"src_0\"]"))
    });
    assert_eq!(transcoder.dump_graph(id + 100), None);

    assert!(engine.finish(Path::new(&input), true));
    pump_until(&mut transcoder, |t| t.is_idle());
    Ok(())
}

#[test]
fn unbounded_wait_returns_when_job_finishes() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("a.wav");
    let engine = Arc::new(MockEngine::with_standard_registry());
    let (mut transcoder, recorder) = transcoder_with(&engine, single_threaded())?;

    transcoder.add_job(&input, &preset_for_file_type(FileType::Flac), None, false)?;
    transcoder.start();
    while !transcoder.is_idle() {
        assert!(transcoder.wait_for_events(Duration::MAX) > 0);
    }

    assert_eq!(recorder.completions(), vec![(input, true)]);
    assert_eq!(recorder.count_all_complete(), 1);
    Ok(())
}

#[test]
fn derived_outputs_do_not_collide_between_jobs() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let engine = MockEngine::with_standard_registry();
    engine.set_default_script(MockScript::audio().with_outcome(MockOutcome::Manual));
    let engine = Arc::new(engine);
    let (mut transcoder, _recorder) = transcoder_with(&engine, single_threaded())?;
    let preset = preset_for_file_type(FileType::Flac);

    let running = transcoder.add_job(dir.path().join("a.wav"), &preset, None, false)?;
    transcoder.start();
    assert_eq!(transcoder.active_jobs()[0].output, running);

    let queued = transcoder.add_job(dir.path().join("a.mp3"), &preset, None, false)?;
    let third = transcoder.add_job(dir.path().join("a.ogg"), &preset, None, false)?;
    assert_eq!(running, dir.path().join("a.flac"));
    assert_eq!(queued, dir.path().join("a.1.flac"));
    assert_eq!(third, dir.path().join("a.2.flac"));

    transcoder.cancel();
    pump_until(&mut transcoder, |t| t.is_idle());
    Ok(())
}
