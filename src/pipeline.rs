//! Eight-stage orchestrator: fix extensions, discover, dedup, extract
//! dates, consolidate albums, place files, write EXIF, update timestamps.
//! Grounded in `main.rs`'s original top-level stage sequencing, generalized
//! into a function other than `main` so `tests/end_to_end.rs` can drive it
//! directly through the library crate.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::album_consolidation;
use crate::album_strategies;
use crate::albums_info::AlbumManifest;
use crate::concurrency::{self, Operation};
use crate::config::{AlbumBehavior, Configuration, ExtensionFixing};
use crate::date_extractor::DateExtractor;
use crate::dedup::{self, HashCache};
use crate::discovery;
use crate::exif_writer;
use crate::exiftool::ExifTool;
use crate::extension_fix;
use crate::model::{ProcessingResult, StepResult};
use crate::timestamp;

/// Runs the full pipeline against `input_dir`, writing into `output_dir`.
/// `generated_at` stamps the JSON album manifest, if the configured
/// strategy produces one; core modules never call `Utc::now()` directly so
/// the timestamp is the caller's responsibility.
pub fn run(input_dir: &Path, output_dir: &Path, config: &Configuration, generated_at: &str) -> Result<ProcessingResult> {
    let mut result = ProcessingResult::default();

    let extension_step = timed(|| fix_extensions(input_dir, config))?;
    result.record_stage("extension_fix", &extension_step);
    if config.extension_fixing == ExtensionFixing::Solo {
        return Ok(result);
    }

    let mut entities = match discovery::discover(input_dir, config.extension_fixing, config.skip_extras) {
        Ok((entities, extras_skipped)) => {
            result.record_stage(
                "discovery",
                &StepResult::ok(format!("discovered {} entities", entities.len()))
                    .with_stat("extras_skipped", extras_skipped),
            );
            entities
        }
        Err(e) => {
            result.record_stage("discovery", &StepResult::failed(e.to_string()));
            return Err(e.context("discovery stage failed, aborting pipeline"));
        }
    };

    let cache = HashCache::new();
    let start = Instant::now();
    let (merged, duplicates_removed) = dedup::merge_duplicates(std::mem::take(&mut entities), config, &cache)?;
    entities = merged;
    let mut dedup_step = StepResult::ok(format!("merged {duplicates_removed} duplicates"))
        .with_stat("duplicates_removed", duplicates_removed);
    dedup_step.duration_ms = start.elapsed().as_millis();
    result.record_stage("dedup", &dedup_step);

    let exiftool = ExifTool::discover();
    let extractor = DateExtractor::new(config, exiftool.as_ref());
    let start = Instant::now();
    let pool = concurrency::pool_for(Operation::Exif)?;
    pool.install(|| {
        entities.par_iter_mut().for_each(|entity| extractor.extract(entity));
    });
    let mut date_step = StepResult::ok("extracted dates");
    for entity in &entities {
        *date_step
            .stats
            .entry(entity.date_extraction_method.as_str().to_string())
            .or_insert(0) += 1;
    }
    date_step.duration_ms = start.elapsed().as_millis();
    result.record_stage("date_extraction", &date_step);

    let start = Instant::now();
    album_consolidation::consolidate(&mut entities, input_dir);
    let mut consolidation_step = StepResult::ok("consolidated album membership");
    consolidation_step.duration_ms = start.elapsed().as_millis();
    result.record_stage("album_consolidation", &consolidation_step);

    let manifest = (config.album_behavior == AlbumBehavior::Json).then(AlbumManifest::new);

    if config.dry_run {
        result.record_stage("album_placement", &StepResult::skipped());
        result.record_stage("exif_write", &StepResult::skipped());
        result.record_stage("timestamp_update", &StepResult::skipped());
        return Ok(result);
    }

    let placement_step = timed(|| album_strategies::place(&mut entities, config, output_dir, manifest.as_ref()))?;
    let placement_succeeded = placement_step.success;
    result.record_stage("album_placement", &placement_step);
    if !placement_succeeded {
        anyhow::bail!("album placement stage failed: {}", placement_step.message);
    }
    if let Some(manifest) = &manifest {
        manifest
            .finalize(output_dir, generated_at)
            .context("writing albums-info.json")?;
    }

    let exif_step = timed(|| exif_writer::write_all(&mut entities, config, exiftool.as_ref()))?;
    result.record_stage("exif_write", &exif_step);

    let timestamp_step = timed(|| timestamp::update_creation_times(&entities, config))?;
    result.record_stage("timestamp_update", &timestamp_step);

    Ok(result)
}

fn timed<F>(f: F) -> Result<StepResult>
where
    F: FnOnce() -> Result<StepResult>,
{
    let start = Instant::now();
    let mut step = f()?;
    step.duration_ms = start.elapsed().as_millis();
    Ok(step)
}

/// Stage 1: corrects mismatched extensions and (optionally) renames Pixel
/// motion-photo containers, walking `input_dir` once before discovery sees
/// any file. Per-file rename failures are swallowed rather than aborting
/// the whole stage, since a handful of unwritable files shouldn't stop the
/// rest of the tree from being fixed.
fn fix_extensions(input_dir: &Path, config: &Configuration) -> Result<StepResult> {
    if config.dry_run || config.extension_fixing == ExtensionFixing::None {
        return Ok(StepResult::skipped());
    }

    let mut fixed = 0u64;
    for entry in walkdir::WalkDir::new(input_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();

        if config.transform_pixel_motion_photos && extension_fix::is_pixel_motion_photo(path) {
            if extension_fix::transform_pixel_motion_photo(path).is_ok() {
                fixed += 1;
            }
            continue;
        }

        if let Some(mismatch) = extension_fix::detect_mismatch(path, config.extension_fixing)
            && extension_fix::apply_fix(&mismatch).is_ok()
        {
            fixed += 1;
        }
    }

    Ok(StepResult::ok(format!("fixed {fixed} extensions")).with_stat("extensions_fixed", fixed))
}
