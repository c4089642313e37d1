// transq-cli/src/commands/encoders.rs
//
// `transq encoders`: asks the resolver which ffmpeg encoder and muxer it
// would use for every preset, without running anything.

use transq_core::engine::{ElementRole, FfmpegEngine, MediaEngine};
use transq_core::presets::all_presets;
use transq_core::transcode::find_best_element_for_mime_type;

use crate::output::{print_heading, print_info, print_warning};

/// Returns `Ok(true)` when every preset can be produced.
pub fn run_encoders() -> anyhow::Result<bool> {
    FfmpegEngine::ensure_available()?;
    let engine = FfmpegEngine::new();
    print_heading(&format!("Elements chosen by the {} engine", engine.name()));

    let mut all_usable = true;
    for preset in all_presets() {
        let encoder = describe(&engine, ElementRole::Encoder, &preset.codec_mimetype);
        let muxer = describe(&engine, ElementRole::Muxer, &preset.muxer_mimetype);
        let usable = encoder.is_some() && muxer.is_some();
        all_usable &= usable;

        let summary = format!(
            "encoder={} muxer={}",
            encoder.flatten().unwrap_or_else(|| "-".to_string()),
            muxer.flatten().unwrap_or_else(|| "-".to_string())
        );
        if usable {
            print_info(preset.file_type.id(), summary);
        } else {
            print_warning(&format!("{}: {} (unavailable)", preset.file_type.id(), summary));
        }
    }
    Ok(all_usable)
}

/// `None` when a required element is missing, `Some(None)` when the role is
/// not needed by the preset.
fn describe(engine: &dyn MediaEngine, role: ElementRole, mime_type: &str) -> Option<Option<String>> {
    if mime_type.is_empty() {
        return Some(None);
    }
    match find_best_element_for_mime_type(engine, role, mime_type) {
        Ok(found) => Some(Some(format!("{} (rank {})", found.name, found.rank))),
        Err(e) => {
            log::debug!("{}", e);
            None
        }
    }
}
