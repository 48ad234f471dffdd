//! Stage 6: places every entity's physical files into the output tree
//! according to the configured album behavior.
//!
//! Grounded in `jl1nie-gpth-rs`'s album-strategy dispatch (one function per
//! `AlbumBehavior` variant, all driving the same `fsops` primitives) and in
//! `fsops.rs`'s move/copy helpers. Duplicate source files that a strategy
//! doesn't select for relocation are left untouched at their original
//! location; nothing in this module ever deletes from the input tree.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Datelike, Utc};
use rayon::prelude::*;

use crate::albums_info::{AlbumEntry, AlbumManifest};
use crate::concurrency::{self, Operation};
use crate::config::{AlbumBehavior, Configuration, DateDivision};
use crate::fsops;
use crate::model::{AlbumInfo, FileEntity, MediaEntity, StepResult};
use std::collections::HashMap;

const BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct OperationResult {
    pub operation: &'static str,
    pub success: bool,
    pub result_file: Option<PathBuf>,
    pub duration: Duration,
    pub error: Option<String>,
}

impl OperationResult {
    fn ok(operation: &'static str, path: PathBuf, duration: Duration) -> Self {
        OperationResult {
            operation,
            success: true,
            result_file: Some(path),
            duration,
            error: None,
        }
    }

    fn err(operation: &'static str, duration: Duration, error: String) -> Self {
        OperationResult {
            operation,
            success: false,
            result_file: None,
            duration,
            error: Some(error),
        }
    }
}

/// Places every entity according to `config.album_behavior`, processing
/// entities under a bounded pool since moves/copies/symlinks are I/O-bound,
/// not CPU-bound (`concurrency::Operation::MoveCopy`). `manifest` is only
/// consulted for `AlbumBehavior::Json`.
pub fn place(
    entities: &mut [MediaEntity],
    config: &Configuration,
    output_dir: &Path,
    manifest: Option<&AlbumManifest>,
) -> Result<StepResult> {
    let pool = concurrency::pool_for(Operation::MoveCopy)?;
    let moved = AtomicU64::new(0);
    let copied = AtomicU64::new(0);
    let shortcut = AtomicU64::new(0);
    let failed = AtomicU64::new(0);

    for chunk in entities.chunks_mut(BATCH_SIZE) {
        pool.install(|| {
            chunk.par_iter_mut().for_each(|entity| {
                let results = match config.album_behavior {
                    AlbumBehavior::Nothing => nothing(entity, config, output_dir),
                    AlbumBehavior::Shortcut => shortcut_strategy(entity, config, output_dir),
                    AlbumBehavior::DuplicateCopy => duplicate_copy(entity, config, output_dir),
                    AlbumBehavior::ReverseShortcut => reverse_shortcut(entity, config, output_dir),
                    AlbumBehavior::Json => json_strategy(entity, config, output_dir, manifest),
                };
                for r in &results {
                    if r.success {
                        match r.operation {
                            "move" => {
                                moved.fetch_add(1, Ordering::Relaxed);
                            }
                            "copy" => {
                                copied.fetch_add(1, Ordering::Relaxed);
                            }
                            "shortcut" => {
                                shortcut.fetch_add(1, Ordering::Relaxed);
                            }
                            _ => {}
                        }
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        });
    }

    let failed_count = failed.load(Ordering::Relaxed);
    let mut step = StepResult::ok("placed files per album strategy")
        .with_stat("files_moved", moved.load(Ordering::Relaxed))
        .with_stat("files_copied", copied.load(Ordering::Relaxed))
        .with_stat("files_shortcut", shortcut.load(Ordering::Relaxed));
    if failed_count > 0 {
        step.message = format!("placed files per album strategy ({failed_count} file operations failed)");
    }
    Ok(step)
}

fn all_photos_dir(
    output_dir: &Path,
    partner_shared: bool,
    date_division: DateDivision,
    date: Option<DateTime<Utc>>,
) -> PathBuf {
    let base = if partner_shared { "PARTNER_SHARED" } else { "ALL_PHOTOS" };
    output_dir.join(base).join(date_subdir(date_division, date))
}

fn date_subdir(date_division: DateDivision, date: Option<DateTime<Utc>>) -> PathBuf {
    if date_division == DateDivision::None {
        return PathBuf::new();
    }
    let Some(date) = date else {
        return PathBuf::from("date-unknown");
    };
    match date_division {
        DateDivision::None => unreachable!(),
        DateDivision::Year => PathBuf::from(format!("{:04}", date.year())),
        DateDivision::YearMonth => PathBuf::from(format!("{:04}/{:02}", date.year(), date.month())),
        DateDivision::YearMonthDay => {
            PathBuf::from(format!("{:04}/{:02}/{:02}", date.year(), date.month(), date.day()))
        }
    }
}

fn album_dir(output_dir: &Path, album_name: &str) -> PathBuf {
    output_dir.join(album_name)
}

/// Finds which album (if any) owns `file`, by checking whether its parent
/// directory is one of the directories an album was collected from.
fn album_for_file<'a>(albums: &'a HashMap<String, AlbumInfo>, file: &Path) -> Option<&'a AlbumInfo> {
    let parent = file.parent()?;
    albums.values().find(|info| info.source_directories.contains(parent))
}

/// No album handling at all: every physical file (primary and every
/// secondary, canonical or not) is moved into ALL_PHOTOS/PARTNER_SHARED.
/// Simplest and safest strategy; costs the most disk space on entities with
/// several physical duplicates.
fn nothing(entity: &mut MediaEntity, config: &Configuration, output_dir: &Path) -> Vec<OperationResult> {
    let date_taken = entity.date_taken;
    let partner_shared = entity.partner_shared;
    let target_dir = all_photos_dir(output_dir, partner_shared, config.date_division, date_taken);
    let mut results = Vec::new();
    for file in entity.all_files_mut() {
        results.push(move_one(file, &target_dir, date_taken));
    }
    results
}

/// Moves the primary into ALL_PHOTOS, then represents every album
/// membership with a relative symlink back to it: one named after the
/// primary, plus one per non-canonical secondary that physically lived in
/// that album, preserving its original basename. Canonical secondaries
/// (duplicates from a year folder) and secondaries with no recognized
/// album are left untouched.
fn shortcut_strategy(entity: &mut MediaEntity, config: &Configuration, output_dir: &Path) -> Vec<OperationResult> {
    let date_taken = entity.date_taken;
    let partner_shared = entity.partner_shared;
    let target_dir = all_photos_dir(output_dir, partner_shared, config.date_division, date_taken);

    let mut results = Vec::new();
    let primary_target = match move_one(&mut entity.primary_file, &target_dir, date_taken) {
        r @ OperationResult { success: false, .. } => {
            results.push(r);
            return results;
        }
        r => {
            let target = r.result_file.clone().unwrap();
            results.push(r);
            target
        }
    };

    let mut album_links: HashMap<String, PathBuf> = HashMap::new();
    for album in entity.albums.values() {
        let start = Instant::now();
        let dest = album_dir(output_dir, &album.name);
        match fsops::create_shortcut(&dest, &primary_target) {
            Ok(link) => {
                album_links.insert(album.name.clone(), link.clone());
                results.push(OperationResult::ok("shortcut", link, start.elapsed()));
            }
            Err(e) => results.push(OperationResult::err("shortcut", start.elapsed(), e.to_string())),
        }
    }

    for secondary in entity.secondary_files.iter_mut() {
        if secondary.is_canonical {
            continue;
        }
        let Some(album) = album_for_file(&entity.albums, &secondary.source_path) else {
            continue;
        };

        // Same basename as the primary: the per-album loop above already
        // created an equivalent link in this album, so reuse it instead of
        // shortcutting again under a collision-deduped name.
        if secondary.source_path.file_name() == primary_target.file_name() {
            if let Some(link) = album_links.get(&album.name) {
                secondary.target_path = Some(link.clone());
                secondary.is_shortcut = true;
                continue;
            }
        }

        let start = Instant::now();
        let dest = album_dir(output_dir, &album.name);
        match fsops::create_shortcut_named(&dest, &primary_target, &secondary.source_path) {
            Ok(link) => {
                secondary.target_path = Some(link.clone());
                secondary.is_shortcut = true;
                results.push(OperationResult::ok("shortcut", link, start.elapsed()));
            }
            Err(e) => results.push(OperationResult::err("shortcut", start.elapsed(), e.to_string())),
        }
    }

    results
}

/// Moves the primary and every canonical secondary into ALL_PHOTOS (they
/// have no album significance), then copies the physical bytes into every
/// album directory a file belonged to, under that file's own basename.
fn duplicate_copy(entity: &mut MediaEntity, config: &Configuration, output_dir: &Path) -> Vec<OperationResult> {
    let date_taken = entity.date_taken;
    let partner_shared = entity.partner_shared;
    let target_dir = all_photos_dir(output_dir, partner_shared, config.date_division, date_taken);

    let mut results = Vec::new();
    let primary_target = match move_one(&mut entity.primary_file, &target_dir, date_taken) {
        r @ OperationResult { success: false, .. } => {
            results.push(r);
            return results;
        }
        r => {
            let target = r.result_file.clone().unwrap();
            results.push(r);
            target
        }
    };

    for album in entity.albums.values() {
        let start = Instant::now();
        let dest = album_dir(output_dir, &album.name);
        match fsops::copy_file(&primary_target, &dest, date_taken) {
            Ok(copy) => results.push(OperationResult::ok("copy", copy, start.elapsed())),
            Err(e) => results.push(OperationResult::err("copy", start.elapsed(), e.to_string())),
        }
    }

    for secondary in entity.secondary_files.iter_mut() {
        if secondary.is_canonical {
            let start = Instant::now();
            match fsops::move_file(&secondary.source_path, &target_dir, date_taken) {
                Ok(target) => {
                    secondary.target_path = Some(target.clone());
                    results.push(OperationResult::ok("move", target, start.elapsed()));
                }
                Err(e) => results.push(OperationResult::err("move", start.elapsed(), e.to_string())),
            }
            continue;
        }
        let Some(album) = album_for_file(&entity.albums, &secondary.source_path) else {
            continue;
        };
        let start = Instant::now();
        let dest = album_dir(output_dir, &album.name);
        match fsops::copy_file_named(&primary_target, &dest, &secondary.source_path, date_taken) {
            Ok(copy) => {
                secondary.target_path = Some(copy.clone());
                results.push(OperationResult::ok("copy", copy, start.elapsed()));
            }
            Err(e) => results.push(OperationResult::err("copy", start.elapsed(), e.to_string())),
        }
    }

    results
}

/// Moves every file that physically lived in an album directly into that
/// album, then shortcuts the best-ranked one back into ALL_PHOTOS. Entities
/// with no album-resident file (pure year-folder duplicates) fall back to
/// a plain move of the primary into ALL_PHOTOS.
fn reverse_shortcut(entity: &mut MediaEntity, config: &Configuration, output_dir: &Path) -> Vec<OperationResult> {
    let date_taken = entity.date_taken;
    let partner_shared = entity.partner_shared;
    let all_photos = all_photos_dir(output_dir, partner_shared, config.date_division, date_taken);

    let albums = entity.albums.clone();
    let mut results = Vec::new();
    let mut moved_album_files: Vec<(u64, PathBuf)> = Vec::new();

    for file in entity.all_files_mut() {
        if file.is_canonical {
            continue;
        }
        let Some(album) = album_for_file(&albums, &file.source_path) else {
            continue;
        };
        let dest = album_dir(output_dir, &album.name);
        let r = move_one(file, &dest, date_taken);
        if let Some(target) = r.result_file.clone() {
            moved_album_files.push((file.ranking, target));
        }
        results.push(r);
    }

    if moved_album_files.is_empty() {
        let r = move_one(&mut entity.primary_file, &all_photos, date_taken);
        results.push(r);
        return results;
    }

    moved_album_files.sort_by_key(|(ranking, _)| *ranking);
    let (_, best) = &moved_album_files[0];
    let start = Instant::now();
    match fsops::create_shortcut(&all_photos, best) {
        Ok(link) => results.push(OperationResult::ok("shortcut", link, start.elapsed())),
        Err(e) => results.push(OperationResult::err("shortcut", start.elapsed(), e.to_string())),
    }

    results
}

/// Moves only the primary into ALL_PHOTOS; album placement is never
/// materialized on disk, only recorded into `manifest` for
/// `albums-info.json` to describe where each file would sit under an
/// `Albums/` tree a downstream reader can build.
fn json_strategy(
    entity: &mut MediaEntity,
    config: &Configuration,
    output_dir: &Path,
    manifest: Option<&AlbumManifest>,
) -> Vec<OperationResult> {
    let date_taken = entity.date_taken;
    let partner_shared = entity.partner_shared;
    let target_dir = all_photos_dir(output_dir, partner_shared, config.date_division, date_taken);

    let mut results = Vec::new();
    let primary_target = match move_one(&mut entity.primary_file, &target_dir, date_taken) {
        r @ OperationResult { success: false, .. } => {
            results.push(r);
            return results;
        }
        r => {
            let target = r.result_file.clone().unwrap();
            results.push(r);
            target
        }
    };

    let Some(manifest) = manifest else {
        return results;
    };
    manifest.note_entity();

    let primary_relative = primary_target
        .strip_prefix(output_dir)
        .unwrap_or(&primary_target)
        .to_string_lossy()
        .into_owned();
    let primary_name = entity
        .primary_file
        .source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let primary_parent = entity.primary_file.source_path.parent().map(Path::to_path_buf);

    // One entry per album membership, attributed to whichever physical file
    // actually resided there: the primary if its own source directory is the
    // album's, otherwise the non-canonical secondary that lived there.
    for album in entity.albums.values() {
        let resided_primary = primary_parent
            .as_deref()
            .is_some_and(|p| album.source_directories.contains(p));

        let (name, relative) = if resided_primary {
            (primary_name.clone(), primary_relative.clone())
        } else if let Some(secondary) = entity.secondary_files.iter().find(|s| {
            !s.is_canonical
                && s.source_path
                    .parent()
                    .is_some_and(|p| album.source_directories.contains(p))
        }) {
            let secondary_name = secondary
                .source_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            (secondary_name, primary_relative.clone())
        } else {
            continue;
        };

        manifest.record(
            &album.name,
            AlbumEntry {
                original_filename: name.clone(),
                primary_relative_path_in_output: relative,
                album_relative_path_under_albums: format!("{}/{}", album.name, name),
            },
        );
    }

    results
}

fn move_one(file: &mut FileEntity, target_dir: &Path, date_taken: Option<DateTime<Utc>>) -> OperationResult {
    let start = Instant::now();
    match fsops::move_file(&file.source_path, target_dir, date_taken) {
        Ok(target) => {
            file.target_path = Some(target.clone());
            file.is_shortcut = false;
            OperationResult::ok("move", target, start.elapsed())
        }
        Err(e) => OperationResult::err("move", start.elapsed(), e.to_string()),
    }
}
