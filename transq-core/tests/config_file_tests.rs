use std::error::Error;
use std::fs;
use std::sync::Arc;

use tempfile::tempdir;
use transq_core::config::TranscoderConfig;
use transq_core::engine::mocks::MockEngine;
use transq_core::presets::{preset_for_file_type, FileType};
use transq_core::{CoreError, Transcoder};

#[test]
fn test_config_file_applies_element_properties() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("transq.toml");
    fs::write(
        &path,
        r#"
max_threads = 3
stream_timeout_secs = 5

[element_properties.lamemp3enc]
"b:a" = "256k"
"#,
    )?;

    let config = TranscoderConfig::load(&path)?;
    assert_eq!(config.max_threads, 3);
    assert_eq!(config.stream_timeout_secs, 5);

    let engine = Arc::new(MockEngine::with_standard_registry());
    let mut transcoder = Transcoder::new(engine.clone(), config)?;
    assert_eq!(transcoder.max_threads(), 3);

    transcoder.add_job(dir.path().join("a.wav"), &preset_for_file_type(FileType::Mpeg), None, false)?;
    transcoder.run_until_complete();

    let graphs = engine.launched_graphs();
    let encoder = graphs[0].element("encoder").ok_or("no encoder")?;
    assert_eq!(encoder.factory, "lamemp3enc");
    assert_eq!(encoder.property("b:a"), Some("256k"));
    Ok(())
}

#[test]
fn test_invalid_config_file_is_rejected() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("bad.toml");
    fs::write(&path, "max_threads = \"four\"")?;

    let err = TranscoderConfig::load(&path).unwrap_err();
    assert!(matches!(err, CoreError::ConfigParse(_)));
    Ok(())
}

#[test]
fn test_transcoder_rejects_invalid_config() {
    let config = TranscoderConfig {
        max_threads: 0,
        ..TranscoderConfig::default()
    };
    let engine = Arc::new(MockEngine::new());
    assert!(Transcoder::new(engine, config).is_err());
}
