//! Album consolidation (stage 5): idempotent re-walk that guarantees every
//! entity's `albums` map has one entry per album folder any of its files
//! physically sits under, even when a file only joined the entity via
//! dedup merging in stage 3. Grounded in `jl1nie-gpth-rs`'s "stage
//! 2.5/2.6 album-merge" description, generalized to re-derive album
//! membership straight from each file's path rather than trusting
//! whatever discovery attributed before the merge.

use std::path::Path;

use crate::model::{AlbumInfo, MediaEntity};

/// Re-derives album membership for every file in every entity and merges
/// it into `entity.albums`. Safe to run more than once.
pub fn consolidate(entities: &mut [MediaEntity], input_directory: &Path) {
    for entity in entities.iter_mut() {
        let files: Vec<_> = entity.all_files().map(|f| f.source_path.clone()).collect();
        for path in files {
            let Some((album_name, source_dir)) = album_membership(&path, input_directory) else {
                continue;
            };
            entity
                .albums
                .entry(album_name.clone())
                .and_modify(|info| {
                    info.source_directories.insert(source_dir.clone());
                })
                .or_insert_with(|| AlbumInfo::new(album_name, source_dir));
        }
    }
}

/// Returns `(album_name, immediate_parent_dir)` if `path` lives under a
/// non-year top-level folder of `input_directory`; `None` for files inside
/// a `Photos from YYYY` year folder (those aren't album membership).
fn album_membership(path: &Path, input_directory: &Path) -> Option<(String, std::path::PathBuf)> {
    let relative = path.strip_prefix(input_directory).ok()?;
    let top_level = relative.components().next()?.as_os_str().to_str()?;
    if is_year_folder(top_level) {
        return None;
    }
    let parent = path.parent()?.to_path_buf();
    Some((top_level.to_string(), parent))
}

fn is_year_folder(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("Photos from ") else {
        return false;
    };
    rest.len() == 4 && rest.chars().all(|c| c.is_ascii_digit())
}
