use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Result;
use regex::Regex;

use crate::config::ExtensionFixing;
use crate::extras;
use crate::metadata;
use crate::model::{AlbumInfo, FileEntity, MediaEntity};
use crate::sidecar;

const PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "heic", "heif", "tif", "tiff", "raw", "cr2",
    "nef", "arw", "dng", "orf", "rw2",
];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "m4v", "3gp", "mpg", "mpeg", "webm", "mp", "mv",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FolderKind {
    Year(u16),
    Album,
    Other,
}

/// Walks `input_directory`, classifying top-level entries and recursing
/// into year/album folders to build one single-file `MediaEntity` per
/// discovered media file. Returns the discovered entities plus a count of
/// edited-suffix "extra" files dropped when `skip_extras` is set.
pub fn discover(
    input_directory: &Path,
    extension_fixing: ExtensionFixing,
    skip_extras: bool,
) -> Result<(Vec<MediaEntity>, u64)> {
    let year_re = Regex::new(r"^Photos from (18|19|20)\d{2}$")?;
    let mut entities = Vec::new();

    let top_level: Vec<PathBuf> = fs::read_dir(input_directory)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();

    for dir in top_level {
        let basename = dir.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let kind = classify_folder(&dir, basename, &year_re, extension_fixing)?;
        match kind {
            FolderKind::Other => continue,
            FolderKind::Year(_) | FolderKind::Album => {
                let is_album = matches!(kind, FolderKind::Album);
                let album_name = basename.to_string();
                collect_directory(&dir, is_album, &album_name, extension_fixing, &mut entities)?;
            }
        }
    }

    let mut extras_skipped = 0u64;
    if skip_extras {
        let before = entities.len();
        entities.retain(|e| {
            let basename = e
                .primary_file
                .source_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("");
            !extras::is_extra(basename)
        });
        extras_skipped = (before - entities.len()) as u64;
    }

    Ok((entities, extras_skipped))
}

fn classify_folder(
    dir: &Path,
    basename: &str,
    year_re: &Regex,
    extension_fixing: ExtensionFixing,
) -> Result<FolderKind> {
    if let Some(caps) = year_re.captures(basename) {
        let _ = caps;
        if let Some(year_str) = basename.strip_prefix("Photos from ") {
            if let Ok(year) = year_str.parse::<u16>() {
                return Ok(FolderKind::Year(year));
            }
        }
    }
    if directory_has_media(dir, extension_fixing)? {
        return Ok(FolderKind::Album);
    }
    Ok(FolderKind::Other)
}

fn directory_has_media(dir: &Path, extension_fixing: ExtensionFixing) -> Result<bool> {
    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() && is_media_file(entry.path(), extension_fixing) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn is_media_file(path: &Path, extension_fixing: ExtensionFixing) -> bool {
    if extension_fixing == ExtensionFixing::None {
        return sniff_is_media(path) || sidecar_exists(path);
    }
    classify_extension(path)
}

fn classify_extension(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    PHOTO_EXTENSIONS.contains(&ext.as_str()) || VIDEO_EXTENSIONS.contains(&ext.as_str())
}

fn sniff_is_media(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut buf = [0u8; 512];
    let Ok(n) = file.read(&mut buf) else {
        return false;
    };
    match infer::get(&buf[..n]) {
        Some(kind) => kind.mime_type().starts_with("image/") || kind.mime_type().starts_with("video/"),
        None => false,
    }
}

fn sidecar_exists(path: &Path) -> bool {
    path.with_file_name(format!(
        "{}.json",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("")
    ))
    .exists()
}

/// Recursively lists every subdirectory of `root`, grouping files per
/// directory so the JSON sidecar matcher only compares siblings.
fn collect_directory(
    root: &Path,
    is_album: bool,
    album_name: &str,
    extension_fixing: ExtensionFixing,
    entities: &mut Vec<MediaEntity>,
) -> Result<()> {
    let mut by_dir: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            by_dir
                .entry(entry.path().parent().unwrap_or(root).to_path_buf())
                .or_default()
                .push(entry.path().to_path_buf());
        }
    }

    for (dir, files) in by_dir {
        let json_candidates = sidecar::collect_json_candidates(&files);
        for file in &files {
            if file.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("json")) {
                continue;
            }
            if !is_media_file(file, extension_fixing) {
                continue;
            }

            let size = fs::metadata(file).map(|m| m.len()).unwrap_or(0);
            let mut file_entity = FileEntity::new(file.clone(), !is_album, size);

            let facts = sidecar::find_sidecar(file, &json_candidates)
                .and_then(|p| fs::read(p).ok())
                .and_then(|bytes| metadata::parse_sidecar(&bytes).ok())
                .map(|json| json.to_facts());

            let mut entity = MediaEntity::new(file_entity.clone());
            if let Some(facts) = &facts {
                entity.partner_shared = facts.partner_shared;
                entity.json_date_taken = facts.date_taken;
                entity.latitude = facts.latitude;
                entity.longitude = facts.longitude;
                entity.altitude = facts.altitude;
            }

            if is_album {
                entity
                    .albums
                    .insert(album_name.to_string(), AlbumInfo::new(album_name, dir.clone()));
            }

            file_entity.is_canonical = !is_album;
            entity.primary_file = file_entity;
            entities.push(entity);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn write_jpeg(path: &Path) {
        let mut f = File::create(path).unwrap();
        f.write_all(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0]).unwrap();
    }

    #[test]
    fn test_year_folder_classified_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let year_dir = dir.path().join("Photos from 2019");
        fs::create_dir_all(&year_dir).unwrap();
        write_jpeg(&year_dir.join("a.jpg"));

        let (entities, extras_skipped) = discover(dir.path(), ExtensionFixing::Standard, false).unwrap();
        let _ = extras_skipped;
        assert_eq!(entities.len(), 1);
        assert!(entities[0].primary_file.is_canonical);
    }

    #[test]
    fn test_album_folder_classified_non_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let album_dir = dir.path().join("Vacation");
        fs::create_dir_all(&album_dir).unwrap();
        write_jpeg(&album_dir.join("a.jpg"));

        let (entities, extras_skipped) = discover(dir.path(), ExtensionFixing::Standard, false).unwrap();
        let _ = extras_skipped;
        assert_eq!(entities.len(), 1);
        assert!(!entities[0].primary_file.is_canonical);
        assert!(entities[0].albums.contains_key("Vacation"));
    }

    #[test]
    fn test_non_media_folder_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let other_dir = dir.path().join("Trash");
        fs::create_dir_all(&other_dir).unwrap();
        fs::write(other_dir.join("readme.txt"), b"hello").unwrap();

        let (entities, extras_skipped) = discover(dir.path(), ExtensionFixing::Standard, false).unwrap();
        let _ = extras_skipped;
        assert_eq!(entities.len(), 0);
    }

    #[test]
    fn test_skip_extras_removes_edited_copies() {
        let dir = tempfile::tempdir().unwrap();
        let year_dir = dir.path().join("Photos from 2020");
        fs::create_dir_all(&year_dir).unwrap();
        write_jpeg(&year_dir.join("pic.jpg"));
        write_jpeg(&year_dir.join("pic-edited.jpg"));

        let (entities, extras_skipped) = discover(dir.path(), ExtensionFixing::Standard, true).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(extras_skipped, 1);
        assert_eq!(
            entities[0].primary_file.source_path.file_name().unwrap(),
            "pic.jpg"
        );
    }

    #[test]
    fn test_sidecar_date_extracted_into_entity() {
        let dir = tempfile::tempdir().unwrap();
        let year_dir = dir.path().join("Photos from 2019");
        fs::create_dir_all(&year_dir).unwrap();
        write_jpeg(&year_dir.join("a.jpg"));
        fs::write(
            year_dir.join("a.jpg.json"),
            r#"{"photoTakenTime": {"timestamp": "1550259301"}}"#,
        )
        .unwrap();

        let (entities, extras_skipped) = discover(dir.path(), ExtensionFixing::Standard, false).unwrap();
        let _ = extras_skipped;
        assert_eq!(entities.len(), 1);
    }
}
