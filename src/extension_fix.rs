use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ExtensionFixing;

/// Extensions we're willing to rewrite in `conservative` mode: common,
/// unambiguous media container mismatches Google Takeout is known to
/// produce (e.g. a HEIC saved with a `.jpg` extension).
const CONSERVATIVE_SAFE: &[&str] = &["jpg", "jpeg", "png", "heic", "mp4", "mov"];

/// Result of inspecting a single file's extension against its sniffed type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionMismatch {
    pub path: PathBuf,
    pub corrected_path: PathBuf,
}

/// Returns `Some` if `path`'s extension doesn't match its content-sniffed
/// type and the active mode considers the mismatch safe to fix.
pub fn detect_mismatch(path: &Path, mode: ExtensionFixing) -> Option<ExtensionMismatch> {
    if mode == ExtensionFixing::None {
        return None;
    }

    let kind = infer::get_from_path(path).ok().flatten()?;
    let sniffed_ext = kind.extension();
    let current_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    if current_ext == sniffed_ext || is_equivalent(&current_ext, sniffed_ext) {
        return None;
    }

    if mode == ExtensionFixing::Conservative && !CONSERVATIVE_SAFE.contains(&sniffed_ext) {
        return None;
    }

    Some(ExtensionMismatch {
        path: path.to_path_buf(),
        corrected_path: path.with_extension(sniffed_ext),
    })
}

/// A handful of extensions are interchangeable in practice; don't flag them.
fn is_equivalent(current: &str, sniffed: &str) -> bool {
    matches!(
        (current, sniffed),
        ("jpeg", "jpg") | ("jpg", "jpeg") | ("tif", "tiff") | ("tiff", "tif")
    )
}

/// Renames `mismatch.path` to `mismatch.corrected_path`, resolving a
/// collision by appending `(1)`, `(2)`, … before the extension.
pub fn apply_fix(mismatch: &ExtensionMismatch) -> anyhow::Result<PathBuf> {
    let target = crate::fsops::unique_path(&mismatch.corrected_path);
    fs::rename(&mismatch.path, &target)?;
    Ok(target)
}

/// Renames Pixel motion-photo containers (`.MP`, `.MV`) to `.mp4`.
pub fn is_pixel_motion_photo(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()),
        Some(ext) if ext == "mp" || ext == "mv"
    )
}

pub fn transform_pixel_motion_photo(path: &Path) -> anyhow::Result<PathBuf> {
    let target = crate::fsops::unique_path(&path.with_extension("mp4"));
    fs::rename(path, &target)?;
    Ok(target)
}
