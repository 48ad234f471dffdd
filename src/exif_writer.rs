//! Stage 7: writes the resolved date and GPS coordinates back into every
//! placed, non-shortcut file of an entity (primary and any physically
//! placed secondaries), at each file's `target_path` in the output tree.
//! JPEGs go through `little_exif` in-process (no subprocess per file);
//! everything else is queued for a batched external ExifTool invocation.
//! Grounded in `Twister915-galerie`'s `little_exif` tag-read/write usage
//! and `36e2faad_pens-catalog`'s batching shape, via `crate::exiftool`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use little_exif::exif_tag::ExifTag;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use little_exif::rational::uR64;

use crate::config::Configuration;
use crate::exiftool::{ExifTool, IMAGE_BATCH_THRESHOLD_OTHER, IMAGE_BATCH_THRESHOLD_WINDOWS, VIDEO_BATCH_THRESHOLD};
use crate::model::{DateExtractionMethod, MediaEntity, StepResult};

const NATIVE_WRITE_EXTENSIONS: &[&str] = &["jpg", "jpeg"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "m4v", "3gp", "webm"];

pub fn write_all(entities: &mut [MediaEntity], config: &Configuration, exiftool: Option<&ExifTool>) -> Result<StepResult> {
    if !config.write_exif {
        return Ok(StepResult::skipped());
    }

    let mut datetimes_written = 0u64;
    let mut coordinates_written = 0u64;
    let mut native_failures = 0u64;

    let mut batch: Vec<(PathBuf, Vec<(String, String)>)> = Vec::new();
    // Which counter(s) each queued path's write should credit on success —
    // a batch entry can carry date tags, GPS tags, or both.
    let mut batch_categories: HashMap<PathBuf, (bool, bool)> = HashMap::new();

    for entity in entities.iter() {
        let needs_date = entity.date_taken.is_some() && entity.date_extraction_method != DateExtractionMethod::Exif;
        let needs_geo = entity.latitude.is_some() && entity.longitude.is_some();
        if !needs_date && !needs_geo {
            continue;
        }

        for file in entity.all_files() {
            if file.is_shortcut {
                continue;
            }
            let Some(path) = &file.target_path else { continue };

            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .unwrap_or_default();

            if NATIVE_WRITE_EXTENSIONS.contains(&ext.as_str()) {
                match write_native(path, entity, needs_date, needs_geo) {
                    Ok(()) => {
                        if needs_date {
                            datetimes_written += 1;
                        }
                        if needs_geo {
                            coordinates_written += 1;
                        }
                    }
                    Err(_) => native_failures += 1,
                }
                continue;
            }

            if exiftool.is_none() {
                continue;
            }
            let mut tags = Vec::new();
            let mut has_date_tags = false;
            let mut has_geo_tags = false;
            if needs_date {
                if let Some(date) = entity.date_taken {
                    let formatted = date.format("%Y:%m:%d %H:%M:%S").to_string();
                    tags.push(("DateTimeOriginal".to_string(), formatted.clone()));
                    tags.push(("CreateDate".to_string(), formatted));
                    has_date_tags = true;
                }
            }
            if needs_geo {
                if let (Some(lat), Some(lon)) = (entity.latitude, entity.longitude) {
                    tags.push(("GPSLatitude".to_string(), lat.to_string()));
                    tags.push(("GPSLatitudeRef".to_string(), if lat >= 0.0 { "N".to_string() } else { "S".to_string() }));
                    tags.push(("GPSLongitude".to_string(), lon.to_string()));
                    tags.push(("GPSLongitudeRef".to_string(), if lon >= 0.0 { "E".to_string() } else { "W".to_string() }));
                    if let Some(alt) = entity.altitude {
                        tags.push(("GPSAltitude".to_string(), alt.to_string()));
                    }
                    has_geo_tags = true;
                }
            }
            if !tags.is_empty() {
                batch_categories.insert(path.clone(), (has_date_tags, has_geo_tags));
                batch.push((path.clone(), tags));
            }
        }
    }

    if let Some(tool) = exiftool {
        let threshold = if cfg!(windows) { IMAGE_BATCH_THRESHOLD_WINDOWS } else { IMAGE_BATCH_THRESHOLD_OTHER };
        let (videos, images): (Vec<_>, Vec<_>) = batch.into_iter().partition(|(path, _)| is_video(path));
        for chunk in images.chunks(threshold) {
            for (path, result) in tool.write_batch(chunk) {
                match result {
                    Ok(()) => {
                        let (has_date, has_geo) = batch_categories.get(&path).copied().unwrap_or((true, false));
                        if has_date {
                            datetimes_written += 1;
                        }
                        if has_geo {
                            coordinates_written += 1;
                        }
                    }
                    Err(_) => native_failures += 1,
                }
            }
        }
        for chunk in videos.chunks(VIDEO_BATCH_THRESHOLD) {
            for (path, result) in tool.write_batch(chunk) {
                match result {
                    Ok(()) => {
                        let (has_date, has_geo) = batch_categories.get(&path).copied().unwrap_or((true, false));
                        if has_date {
                            datetimes_written += 1;
                        }
                        if has_geo {
                            coordinates_written += 1;
                        }
                    }
                    Err(_) => native_failures += 1,
                }
            }
        }
    }

    let mut step = StepResult::ok("wrote EXIF date/GPS tags")
        .with_stat("datetimes_written", datetimes_written)
        .with_stat("coordinates_written", coordinates_written);
    if native_failures > 0 {
        step.message = format!("wrote EXIF date/GPS tags ({native_failures} writes failed)");
    }
    Ok(step)
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn write_native(path: &Path, entity: &MediaEntity, needs_date: bool, needs_geo: bool) -> Result<()> {
    let mut metadata = Metadata::new_from_path(path)?;

    if needs_date {
        if let Some(date) = entity.date_taken {
            let formatted = date.format("%Y:%m:%d %H:%M:%S").to_string();
            metadata.set_tag(ExifTag::DateTimeOriginal(formatted.clone()));
            metadata.set_tag(ExifTag::CreateDate(formatted));
        }
    }

    if needs_geo {
        if let (Some(lat), Some(lon)) = (entity.latitude, entity.longitude) {
            let (lat_dms, lat_ref) = decimal_to_dms(lat, true);
            let (lon_dms, lon_ref) = decimal_to_dms(lon, false);
            metadata.set_tag(ExifTag::GPSLatitude(lat_dms));
            metadata.set_tag(ExifTag::GPSLatitudeRef(lat_ref));
            metadata.set_tag(ExifTag::GPSLongitude(lon_dms));
            metadata.set_tag(ExifTag::GPSLongitudeRef(lon_ref));
            if let Some(alt) = entity.altitude {
                metadata.set_tag(ExifTag::GPSAltitude(vec![uR64 {
                    nominator: (alt.abs() * 100.0).round() as u32,
                    denominator: 100,
                }]));
                metadata.set_tag(ExifTag::GPSAltitudeRef(vec![if alt >= 0.0 { 0u8 } else { 1u8 }]));
            }
        }
    }

    metadata.write_to_filepath(path, FileExtension::JPEG)?;
    Ok(())
}

/// Converts a decimal-degree coordinate into the degrees/minutes/seconds
/// rational triplet EXIF expects, plus the hemisphere reference letter.
fn decimal_to_dms(decimal: f64, is_latitude: bool) -> (Vec<uR64>, String) {
    let abs = decimal.abs();
    let degrees = abs.trunc();
    let minutes_full = (abs - degrees) * 60.0;
    let minutes = minutes_full.trunc();
    let seconds = (minutes_full - minutes) * 60.0;

    let triplet = vec![
        uR64 { nominator: degrees as u32, denominator: 1 },
        uR64 { nominator: minutes as u32, denominator: 1 },
        uR64 { nominator: (seconds * 1000.0).round() as u32, denominator: 1000 },
    ];

    let reference = if is_latitude {
        if decimal >= 0.0 { "N" } else { "S" }
    } else if decimal >= 0.0 {
        "E"
    } else {
        "W"
    };
    (triplet, reference.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_to_dms_positive_latitude() {
        let (dms, reference) = decimal_to_dms(22.3193, true);
        assert_eq!(reference, "N");
        assert_eq!(dms[0].nominator, 22);
    }

    #[test]
    fn test_decimal_to_dms_negative_longitude() {
        let (_, reference) = decimal_to_dms(-114.1694, false);
        assert_eq!(reference, "W");
    }

    #[test]
    fn test_is_video_by_extension() {
        assert!(is_video(Path::new("clip.MP4")));
        assert!(!is_video(Path::new("photo.jpg")));
    }

    #[test]
    fn test_write_all_skips_files_without_target_path() {
        use crate::model::FileEntity;
        use std::path::PathBuf;

        let mut file = FileEntity::new(PathBuf::from("/input/a.jpg"), true, 1);
        file.target_path = None;
        let mut entity = MediaEntity::new(file);
        entity.set_date(chrono::Utc::now(), DateExtractionMethod::Filename);

        let result = write_all(std::slice::from_mut(&mut entity), &Configuration::default(), None).unwrap();
        assert_eq!(*result.stats.get("datetimes_written").unwrap_or(&0), 0);
    }

    #[test]
    fn test_write_all_skips_shortcut_files() {
        use crate::model::FileEntity;
        use std::path::PathBuf;

        let mut file = FileEntity::new(PathBuf::from("/input/a.jpg"), true, 1);
        file.target_path = Some(PathBuf::from("/output/Album/a.jpg"));
        file.is_shortcut = true;
        let mut entity = MediaEntity::new(file);
        entity.set_date(chrono::Utc::now(), DateExtractionMethod::Filename);

        let result = write_all(std::slice::from_mut(&mut entity), &Configuration::default(), None).unwrap();
        assert_eq!(*result.stats.get("datetimes_written").unwrap_or(&0), 0);
    }
}
