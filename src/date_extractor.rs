//! Date extractor chain (stage 4): JSON → EXIF → filename → folder, stopping
//! at the first extractor that yields a date. Grounded in
//! `awalland-gtakeout`'s `has_exif_date`/`update_exif_date` pattern (native
//! `kamadak-exif` read for images, external-tool fallback for everything
//! else) and `jl1nie-gpth-rs`'s `date` module.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::config::Configuration;
use crate::exiftool::ExifTool;
use crate::model::{DateExtractionMethod, MediaEntity};

/// A known ffmpeg bug stamps this exact sentinel on videos with no real
/// creation date; reject it outright rather than trust it.
const SENTINEL_DATE: &str = "2036-01-01T23:59:59Z";

const NATIVE_EXIF_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "tif", "tiff", "heic", "heif", "png", "webp", "cr2", "nef", "arw", "dng", "orf",
    "rw2",
];

pub struct DateExtractor<'a> {
    pub config: &'a Configuration,
    pub exiftool: Option<&'a ExifTool>,
}

impl<'a> DateExtractor<'a> {
    pub fn new(config: &'a Configuration, exiftool: Option<&'a ExifTool>) -> Self {
        DateExtractor { config, exiftool }
    }

    /// Runs the chain against `entity`'s primary file and sets
    /// `date_taken`/`date_accuracy`/`date_extraction_method` on success.
    pub fn extract(&self, entity: &mut MediaEntity) {
        if let Some(date) = entity.json_date_taken {
            entity.set_date(date, DateExtractionMethod::Json);
            return;
        }

        let path = entity.primary_file.source_path.clone();
        let size_ok = !self.config.enforce_max_file_size
            || entity.primary_file.size <= self.config.max_file_size;

        if size_ok && let Some(date) = self.extract_exif(&path) {
            entity.set_date(date, DateExtractionMethod::Exif);
            return;
        }

        if let Some(date) = extract_from_filename(&path) {
            entity.set_date(date, DateExtractionMethod::Filename);
            return;
        }

        if let Some(date) = extract_folder_year(&path) {
            entity.set_date(date, DateExtractionMethod::Folder);
            return;
        }
    }

    fn extract_exif(&self, path: &Path) -> Option<DateTime<Utc>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let raw = if NATIVE_EXIF_EXTENSIONS.contains(&ext.as_str()) {
            native_exif_date(path)
        } else if let Some(tool) = self.exiftool {
            external_exif_date(tool, path)
        } else {
            None
        }?;

        parse_exif_datetime(&raw)
    }
}

/// Reads `DateTimeOriginal`/`DateTimeDigitized`/`DateTime` via kamadak-exif.
fn native_exif_date(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif_reader = exif::Reader::new();
    let exif_data = exif_reader.read_from_container(&mut reader).ok()?;

    for tag in [exif::Tag::DateTimeOriginal, exif::Tag::DateTime, exif::Tag::DateTimeDigitized] {
        if let Some(field) = exif_data.get_field(tag, exif::In::PRIMARY) {
            let value = field.display_value().to_string();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

fn external_exif_date(tool: &ExifTool, path: &Path) -> Option<String> {
    let output = tool
        .read_tags(
            path,
            &["-DateTimeOriginal", "-MediaCreateDate", "-CreationDate", "-TrackCreateDate"],
        )
        .ok()?;
    crate::exiftool::first_nonempty_date_line(&output)
}

/// Normalizes separators (`-/.\` → `:`), truncates to 19 chars, parses as
/// `YYYY:MM:DD HH:MM:SS`, and rejects the known ffmpeg sentinel.
fn parse_exif_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let normalized: String = raw
        .chars()
        .map(|c| if c == '-' || c == '/' || c == '.' || c == '\\' { ':' } else { c })
        .collect();
    let truncated: String = normalized.chars().take(19).collect();
    let naive = NaiveDateTime::parse_from_str(&truncated, "%Y:%m:%d %H:%M:%S").ok()?;
    let dt = Utc.from_utc_datetime(&naive);
    if dt.to_rfc3339() == SENTINEL_DATE || is_sentinel(&dt) {
        return None;
    }
    Some(dt)
}

fn is_sentinel(dt: &DateTime<Utc>) -> bool {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string() == SENTINEL_DATE
}

struct FilenamePattern {
    regex: &'static str,
    format: &'static str,
}

/// Filename date patterns, tried in order. Years outside 1800..2099 are
/// rejected by `chrono` parse failing on an out-of-range value or by the
/// explicit bounds check in `extract_from_filename`.
const FILENAME_PATTERNS: &[FilenamePattern] = &[
    FilenamePattern { regex: r"Screenshot_(\d{8})-(\d{6})", format: "screenshot" },
    FilenamePattern { regex: r"IMG_(\d{8})_(\d{6})", format: "img" },
    FilenamePattern { regex: r"signal-(\d{4})-(\d{2})-(\d{2})-(\d{6})", format: "signal" },
    FilenamePattern { regex: r"(\d{4})_(\d{2})_(\d{2})_(\d{2})_(\d{2})_(\d{2})", format: "underscored" },
    FilenamePattern { regex: r"BURST(\d{8})(\d{6})", format: "burst" },
    FilenamePattern { regex: r"(\d{8})(\d{6})(\d{3})", format: "compact_ms" },
];

fn pattern_regexes() -> &'static [(Regex, &'static str)] {
    static CACHE: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    CACHE.get_or_init(|| {
        FILENAME_PATTERNS
            .iter()
            .map(|p| (Regex::new(p.regex).expect("valid filename date regex"), p.format))
            .collect()
    })
}

fn extract_from_filename(path: &Path) -> Option<DateTime<Utc>> {
    let name = path.file_name()?.to_str()?;
    for (regex, kind) in pattern_regexes() {
        if let Some(caps) = regex.captures(name)
            && let Some(dt) = build_date_from_captures(kind, &caps)
            && year_in_range(&dt)
        {
            return Some(dt);
        }
    }
    None
}

fn year_in_range(dt: &DateTime<Utc>) -> bool {
    (1800..=2099).contains(&dt.year())
}

fn build_date_from_captures(kind: &str, caps: &regex::Captures) -> Option<DateTime<Utc>> {
    let g = |i: usize| caps.get(i).map(|m| m.as_str());
    let num = |i: usize| -> Option<u32> { g(i)?.parse().ok() };

    let naive = match kind {
        "screenshot" => {
            let ymd = g(1)?;
            let hms = g(2)?;
            parse_ymd_hms(ymd, hms)
        }
        "img" => {
            let ymd = g(1)?;
            let hms = g(2)?;
            parse_ymd_hms(ymd, hms)
        }
        "signal" => {
            let (y, m, d, hms) = (num(1)?, num(2)?, num(3)?, g(4)?);
            let (h, mi, s) = split_hms(hms)?;
            chrono::NaiveDate::from_ymd_opt(y as i32, m, d)?.and_hms_opt(h, mi, s)
        }
        "underscored" => {
            let (y, m, d, h, mi, s) = (num(1)?, num(2)?, num(3)?, num(4)?, num(5)?, num(6)?);
            chrono::NaiveDate::from_ymd_opt(y as i32, m, d)?.and_hms_opt(h, mi, s)
        }
        "burst" => {
            let ymd = g(1)?;
            let hms = g(2)?;
            parse_ymd_hms(ymd, hms)
        }
        "compact_ms" => {
            let ymd = g(1)?;
            let hms = g(2)?;
            parse_ymd_hms(ymd, hms)
        }
        _ => None,
    }?;
    Some(Utc.from_utc_datetime(&naive))
}

fn parse_ymd_hms(ymd: &str, hms: &str) -> Option<NaiveDateTime> {
    if ymd.len() != 8 || hms.len() != 6 {
        return None;
    }
    let y: i32 = ymd[0..4].parse().ok()?;
    let mo: u32 = ymd[4..6].parse().ok()?;
    let d: u32 = ymd[6..8].parse().ok()?;
    let (h, mi, s) = split_hms(hms)?;
    chrono::NaiveDate::from_ymd_opt(y, mo, d)?.and_hms_opt(h, mi, s)
}

fn split_hms(hms: &str) -> Option<(u32, u32, u32)> {
    if hms.len() != 6 {
        return None;
    }
    Some((hms[0..2].parse().ok()?, hms[2..4].parse().ok()?, hms[4..6].parse().ok()?))
}

fn year_folder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Photos from ((?:18|19|20)\d{2})$").unwrap())
}

/// Falls back to Jan 1 of the year named by the nearest ancestor
/// `Photos from YYYY` folder, if any.
fn extract_folder_year(path: &Path) -> Option<DateTime<Utc>> {
    for ancestor in path.ancestors() {
        let name = ancestor.file_name()?.to_str().unwrap_or("");
        if let Some(caps) = year_folder_regex().captures(name) {
            let year: i32 = caps.get(1)?.as_str().parse().ok()?;
            let naive = chrono::NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileEntity;
    use std::path::PathBuf;

    #[test]
    fn test_json_candidate_wins_first() {
        let mut entity = MediaEntity::new(FileEntity::new(PathBuf::from("/x/a.jpg"), true, 1));
        entity.json_date_taken = DateTime::from_timestamp(1550259301, 0);
        let config = Configuration::default();
        let extractor = DateExtractor::new(&config, None);
        extractor.extract(&mut entity);
        assert_eq!(entity.date_extraction_method, DateExtractionMethod::Json);
        assert_eq!(entity.date_accuracy, Some(1));
    }

    #[test]
    fn test_screenshot_filename_pattern() {
        let path = PathBuf::from("Screenshot_20190215-193501.png");
        let dt = extract_from_filename(&path).unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2019-02-15 19:35:01");
    }

    #[test]
    fn test_img_filename_pattern() {
        let path = PathBuf::from("IMG_20190215_193501.jpg");
        let dt = extract_from_filename(&path).unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2019-02-15 19:35:01");
    }

    #[test]
    fn test_signal_filename_pattern() {
        let path = PathBuf::from("signal-2021-05-06-101112.jpg");
        let dt = extract_from_filename(&path).unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2021-05-06 10:11:12");
    }

    #[test]
    fn test_burst_filename_pattern() {
        let path = PathBuf::from("BURST20190215193501.jpg");
        let dt = extract_from_filename(&path).unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2019-02-15 19:35:01");
    }

    #[test]
    fn test_folder_year_fallback() {
        let path = PathBuf::from("/takeout/Photos from 2019/unnamed.jpg");
        let dt = extract_folder_year(&path).unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2019-01-01");
    }

    #[test]
    fn test_sentinel_rejected() {
        assert!(parse_exif_datetime("2036:01:01 23:59:59").is_none());
    }

    #[test]
    fn test_pre_1970_filename_date_parses() {
        // Pre-epoch dates must still parse via the filename pattern.
        let path = PathBuf::from("1869_12_30_16_59_57.jpg");
        let dt = extract_from_filename(&path).unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "1869-12-30 16:59:57");
    }

    #[test]
    fn test_normal_exif_datetime_parses() {
        let dt = parse_exif_datetime("2019:02:15 19:35:01").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2019-02-15 19:35:01");
    }

    #[test]
    fn test_exif_separator_normalization() {
        let dt = parse_exif_datetime("2019-02-15 19:35:01").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2019-02-15 19:35:01");
    }
}
