// transq-cli/src/commands/presets.rs
//
// `transq presets`: prints the fixed output format catalog.

use transq_core::presets::all_presets;

use crate::output::print_heading;

pub fn run_presets() -> anyhow::Result<()> {
    print_heading("Output formats");
    println!("{:<12} {:<22} {:<6} {}", "FORMAT", "NAME", "EXT", "CODEC / CONTAINER");
    for preset in all_presets() {
        let target = match (preset.codec_mimetype.is_empty(), preset.muxer_mimetype.is_empty()) {
            (false, false) => format!("{} in {}", preset.codec_mimetype, preset.muxer_mimetype),
            (false, true) => preset.codec_mimetype.clone(),
            (true, _) => preset.muxer_mimetype.clone(),
        };
        println!(
            "{:<12} {:<22} {:<6} {}",
            preset.file_type.id(),
            preset.name,
            preset.extension,
            target
        );
    }
    Ok(())
}
