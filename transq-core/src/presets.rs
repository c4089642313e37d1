// ============================================================================
// transq-core/src/presets.rs
// ============================================================================
//
// PRESETS: Fixed Catalog of Output Formats
//
// This module describes *what* a job should produce: the target file type, the
// caps of the encoder output and, when the codec stream needs a container, the
// caps of the muxer output. How those are produced is decided later by the
// capability resolver.
//
// All lookups here are pure functions over a fixed table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Output file types known to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FileType {
    #[default]
    Unknown,
    Flac,
    Mp4,
    Mpeg,
    OggVorbis,
    OggFlac,
    OggSpeex,
    OggOpus,
    Asf,
    Wav,
}

impl FileType {
    /// Every file type that has a preset, in catalog order.
    pub const ALL: [FileType; 9] = [
        FileType::Flac,
        FileType::Mp4,
        FileType::Mpeg,
        FileType::OggVorbis,
        FileType::OggFlac,
        FileType::OggSpeex,
        FileType::OggOpus,
        FileType::Asf,
        FileType::Wav,
    ];

    /// Short identifier used on the command line and in config files.
    pub fn id(self) -> &'static str {
        match self {
            FileType::Unknown => "unknown",
            FileType::Flac => "flac",
            FileType::Mp4 => "m4a",
            FileType::Mpeg => "mp3",
            FileType::OggVorbis => "ogg-vorbis",
            FileType::OggFlac => "ogg-flac",
            FileType::OggSpeex => "ogg-speex",
            FileType::OggOpus => "ogg-opus",
            FileType::Asf => "wma",
            FileType::Wav => "wav",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for FileType {
    type Err = CoreError;

    /// Accepts the identifier, the preset extension where it is unambiguous, or
    /// a few common aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        let found = match key.as_str() {
            "flac" => FileType::Flac,
            "m4a" | "mp4" | "aac" => FileType::Mp4,
            "mp3" | "mpeg" => FileType::Mpeg,
            "ogg-vorbis" | "ogg" | "vorbis" => FileType::OggVorbis,
            "ogg-flac" => FileType::OggFlac,
            "ogg-speex" | "spx" | "speex" => FileType::OggSpeex,
            "ogg-opus" | "opus" => FileType::OggOpus,
            "wma" | "asf" => FileType::Asf,
            "wav" => FileType::Wav,
            _ => return Err(CoreError::UnknownFormat(s.to_string())),
        };
        Ok(found)
    }
}

/// Codec identifiers with a canonical caps string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    None,
    Flac,
    Mp4,
    Mp3,
    Vorbis,
    Speex,
    Opus,
    Wma,
}

/// Immutable description of a transcode target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TranscoderPreset {
    pub file_type: FileType,
    pub name: String,
    pub extension: String,
    /// Caps the encoder must produce; empty when the muxer takes raw audio.
    pub codec_mimetype: String,
    /// Caps the muxer must produce; empty when the codec stream is written as is.
    pub muxer_mimetype: String,
}

impl TranscoderPreset {
    pub fn new(
        file_type: FileType,
        name: &str,
        extension: &str,
        codec_mimetype: &str,
        muxer_mimetype: &str,
    ) -> Self {
        Self {
            file_type,
            name: name.to_string(),
            extension: extension.to_string(),
            codec_mimetype: codec_mimetype.to_string(),
            muxer_mimetype: muxer_mimetype.to_string(),
        }
    }

    /// The empty preset returned for unknown file types.
    pub fn is_unknown(&self) -> bool {
        self.file_type == FileType::Unknown
    }
}

/// Returns the canonical caps string for a codec.
pub fn mime_type(codec: CodecType) -> &'static str {
    match codec {
        CodecType::Flac => "audio/x-flac",
        CodecType::Mp4 => "audio/mpeg, mpegversion=(int)4",
        CodecType::Mp3 => "audio/mpeg, mpegversion=(int)1, layer=(int)3",
        CodecType::Vorbis => "audio/x-vorbis",
        CodecType::Speex => "audio/x-speex",
        CodecType::Opus => "audio/x-opus",
        CodecType::Wma => "audio/x-wma",
        CodecType::None => "",
    }
}

/// Returns the default preset for a file type.
pub fn preset_for_file_type(file_type: FileType) -> TranscoderPreset {
    use FileType::*;
    let ogg = "application/ogg";
    match file_type {
        Flac => TranscoderPreset::new(Flac, "FLAC", "flac", mime_type(CodecType::Flac), ""),
        Mp4 => TranscoderPreset::new(Mp4, "M4A AAC", "mp4", mime_type(CodecType::Mp4), "audio/mp4"),
        Mpeg => TranscoderPreset::new(Mpeg, "MP3", "mp3", mime_type(CodecType::Mp3), ""),
        OggVorbis => {
            TranscoderPreset::new(OggVorbis, "Ogg Vorbis", "ogg", mime_type(CodecType::Vorbis), ogg)
        }
        OggFlac => TranscoderPreset::new(OggFlac, "Ogg Flac", "ogg", mime_type(CodecType::Flac), ogg),
        OggSpeex => {
            TranscoderPreset::new(OggSpeex, "Ogg Speex", "spx", mime_type(CodecType::Speex), ogg)
        }
        OggOpus => TranscoderPreset::new(OggOpus, "Ogg Opus", "opus", mime_type(CodecType::Opus), ogg),
        Asf => TranscoderPreset::new(
            Asf,
            "Windows Media audio",
            "wma",
            mime_type(CodecType::Wma),
            "video/x-ms-asf",
        ),
        Wav => TranscoderPreset::new(Wav, "Wav", "wav", "", "audio/x-wav"),
        Unknown => TranscoderPreset::default(),
    }
}

/// Returns every preset in catalog order.
pub fn all_presets() -> Vec<TranscoderPreset> {
    FileType::ALL.iter().copied().map(preset_for_file_type).collect()
}

/// Chooses the output type to use for a device or library that supports
/// `supported`.
///
/// Lossy, widely playable formats are preferred; otherwise the first supported
/// type that has a preset wins.
pub fn pick_best_format(supported: &[FileType]) -> FileType {
    const PREFERRED: [FileType; 3] = [FileType::Mpeg, FileType::OggVorbis, FileType::Asf];

    if supported.is_empty() {
        return FileType::Unknown;
    }

    if let Some(best) = PREFERRED.iter().find(|t| supported.contains(*t)) {
        return *best;
    }

    supported
        .iter()
        .copied()
        .find(|t| !preset_for_file_type(*t).is_unknown())
        .unwrap_or(FileType::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::Caps;

    #[test]
    fn every_catalog_entry_has_parseable_caps() {
        for preset in all_presets() {
            assert!(!preset.is_unknown());
            assert!(!preset.extension.is_empty());
            assert!(
                !preset.codec_mimetype.is_empty() || !preset.muxer_mimetype.is_empty(),
                "{} produces nothing",
                preset.name
            );
            if !preset.codec_mimetype.is_empty() {
                Caps::parse(&preset.codec_mimetype).unwrap();
            }
            if !preset.muxer_mimetype.is_empty() {
                Caps::parse(&preset.muxer_mimetype).unwrap();
            }
        }
    }

    #[test]
    fn unknown_file_type_has_empty_preset() {
        let preset = preset_for_file_type(FileType::Unknown);
        assert!(preset.is_unknown());
        assert!(preset.codec_mimetype.is_empty());
    }

    #[test]
    fn flac_preset_has_no_container() {
        let preset = preset_for_file_type(FileType::Flac);
        assert_eq!(preset.name, "FLAC");
        assert_eq!(preset.codec_mimetype, "audio/x-flac");
        assert!(preset.muxer_mimetype.is_empty());
    }

    #[test]
    fn mime_type_for_none_is_empty() {
        assert_eq!(mime_type(CodecType::None), "");
        assert_eq!(mime_type(CodecType::Opus), "audio/x-opus");
    }

    #[test]
    fn pick_best_format_prefers_mp3_then_vorbis_then_wma() {
        assert_eq!(pick_best_format(&[]), FileType::Unknown);
        assert_eq!(
            pick_best_format(&[FileType::Flac, FileType::Asf, FileType::OggVorbis]),
            FileType::OggVorbis
        );
        assert_eq!(
            pick_best_format(&[FileType::Wav, FileType::Mpeg]),
            FileType::Mpeg
        );
        assert_eq!(
            pick_best_format(&[FileType::Unknown, FileType::Wav, FileType::Flac]),
            FileType::Wav
        );
        assert_eq!(pick_best_format(&[FileType::Unknown]), FileType::Unknown);
    }

    #[test]
    fn file_type_parses_ids_and_aliases() {
        for file_type in FileType::ALL {
            assert_eq!(file_type.id().parse::<FileType>().unwrap(), file_type);
        }
        assert_eq!("MP3".parse::<FileType>().unwrap(), FileType::Mpeg);
        assert!("mkv".parse::<FileType>().is_err());
    }
}
