//! Queued transcode requests and output path derivation.

use std::path::{Path, PathBuf};

use crate::presets::TranscoderPreset;

/// Identifier assigned to a job when it is admitted.
pub type JobId = u64;

/// An immutable request to transcode one input into one output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
    pub preset: TranscoderPreset,
    pub overwrite: bool,
    /// The caller does not keep the output past the completion notification.
    pub temporary: bool,
}

/// Replaces the extension of `input` with the preset extension.
pub fn derive_output_path(input: &Path, extension: &str) -> PathBuf {
    input.with_extension(extension)
}

/// Returns `path` if nothing exists there yet, otherwise the first free
/// sibling named `<stem>.<n>.<ext>` counting from 1.
pub fn unique_output_path(path: &Path) -> PathBuf {
    unique_output_path_avoiding(path, |_| false)
}

/// Like [`unique_output_path`], but a candidate is also skipped when
/// `reserved` claims it (an output some other job will write).
pub fn unique_output_path_avoiding(path: &Path, reserved: impl Fn(&Path) -> bool) -> PathBuf {
    let is_free = |candidate: &Path| !candidate.exists() && !reserved(candidate);
    if is_free(path) {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    (1u32..)
        .map(|n| {
            let name = match &extension {
                Some(ext) => format!("{}.{}.{}", stem, n, ext),
                None => format!("{}.{}", stem, n),
            };
            path.with_file_name(name)
        })
        .find(|candidate| is_free(candidate))
        .unwrap_or_else(|| path.to_path_buf())
}
