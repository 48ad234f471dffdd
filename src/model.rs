use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Configuration;

/// A single physical input file under consideration.
#[derive(Debug, Clone)]
pub struct FileEntity {
    pub source_path: PathBuf,
    pub target_path: Option<PathBuf>,
    pub is_shortcut: bool,
    pub is_canonical: bool,
    pub ranking: u64,
    pub size: u64,
}

impl FileEntity {
    pub fn new(source_path: PathBuf, is_canonical: bool, size: u64) -> Self {
        let ranking = ranking_for(&source_path, is_canonical);
        FileEntity {
            source_path,
            target_path: None,
            is_shortcut: false,
            is_canonical,
            ranking,
            size,
        }
    }
}

/// `10*int(not is_canonical) + basename_length/256 + path_length/65536`, smaller is better.
pub fn ranking_for(path: &std::path::Path, is_canonical: bool) -> u64 {
    let basename_len = path
        .file_name()
        .map(|n| n.to_string_lossy().chars().count())
        .unwrap_or(0) as u64;
    let path_len = path.to_string_lossy().chars().count() as u64;
    10 * (!is_canonical as u64) + basename_len / 256 + path_len / 65536
}

/// Membership in a single album.
#[derive(Debug, Clone, Default)]
pub struct AlbumInfo {
    pub name: String,
    pub source_directories: HashSet<PathBuf>,
}

impl AlbumInfo {
    pub fn new(name: impl Into<String>, source_directory: PathBuf) -> Self {
        let mut source_directories = HashSet::new();
        source_directories.insert(source_directory);
        AlbumInfo {
            name: name.into(),
            source_directories,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum DateExtractionMethod {
    Json,
    Exif,
    Filename,
    Folder,
    None,
}

impl DateExtractionMethod {
    /// Lower is better; 1=json .. 5=none.
    pub fn accuracy(self) -> u8 {
        match self {
            DateExtractionMethod::Json => 1,
            DateExtractionMethod::Exif => 2,
            DateExtractionMethod::Filename => 3,
            DateExtractionMethod::Folder => 4,
            DateExtractionMethod::None => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DateExtractionMethod::Json => "json",
            DateExtractionMethod::Exif => "exif",
            DateExtractionMethod::Filename => "filename",
            DateExtractionMethod::Folder => "folder",
            DateExtractionMethod::None => "none",
        }
    }
}

/// One logical photo/video, possibly with multiple on-disk copies.
#[derive(Debug, Clone)]
pub struct MediaEntity {
    pub primary_file: FileEntity,
    pub secondary_files: Vec<FileEntity>,
    pub albums: HashMap<String, AlbumInfo>,
    pub date_taken: Option<DateTime<Utc>>,
    pub date_accuracy: Option<u8>,
    pub date_extraction_method: DateExtractionMethod,
    pub partner_shared: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    /// Candidate date pulled from the sidecar JSON at discovery time, fed
    /// into the date extractor chain as the accuracy-1 candidate.
    pub json_date_taken: Option<DateTime<Utc>>,
}

impl MediaEntity {
    pub fn new(primary_file: FileEntity) -> Self {
        MediaEntity {
            primary_file,
            secondary_files: Vec::new(),
            albums: HashMap::new(),
            date_taken: None,
            date_accuracy: None,
            date_extraction_method: DateExtractionMethod::None,
            partner_shared: false,
            latitude: None,
            longitude: None,
            altitude: None,
            json_date_taken: None,
        }
    }

    pub fn set_date(&mut self, date: DateTime<Utc>, method: DateExtractionMethod) {
        self.date_taken = Some(date);
        self.date_accuracy = Some(method.accuracy());
        self.date_extraction_method = method;
    }

    pub fn all_files(&self) -> impl Iterator<Item = &FileEntity> {
        std::iter::once(&self.primary_file).chain(self.secondary_files.iter())
    }

    pub fn all_files_mut(&mut self) -> impl Iterator<Item = &mut FileEntity> {
        std::iter::once(&mut self.primary_file).chain(self.secondary_files.iter_mut())
    }

    pub fn non_canonical_secondaries(&self) -> impl Iterator<Item = &FileEntity> {
        self.secondary_files.iter().filter(|f| !f.is_canonical)
    }

    /// Merges `other` into `self`: the lower-ranking primary wins, and
    /// everything else (secondaries, albums, date, geo) is folded in.
    pub fn merge(&mut self, other: MediaEntity) {
        if other.primary_file.ranking < self.primary_file.ranking {
            let old_primary = std::mem::replace(&mut self.primary_file, other.primary_file);
            self.secondary_files.push(old_primary);
        } else {
            self.secondary_files.push(other.primary_file);
        }
        self.secondary_files.extend(other.secondary_files);
        self.secondary_files.sort_by_key(|f| f.ranking);

        for (name, info) in other.albums {
            self.albums
                .entry(name)
                .and_modify(|existing| {
                    existing
                        .source_directories
                        .extend(info.source_directories.iter().cloned());
                })
                .or_insert(info);
        }

        self.partner_shared = self.partner_shared || other.partner_shared;

        if let Some(other_date) = other.date_taken {
            let keep_other = match self.date_accuracy {
                None => true,
                Some(existing) => other.date_extraction_method.accuracy() < existing,
            };
            if keep_other {
                self.date_taken = Some(other_date);
                self.date_accuracy = Some(other.date_extraction_method.accuracy());
                self.date_extraction_method = other.date_extraction_method;
            }
        }
        if self.latitude.is_none() {
            self.latitude = other.latitude;
            self.longitude = other.longitude;
            self.altitude = other.altitude;
        }
        if self.json_date_taken.is_none() {
            self.json_date_taken = other.json_date_taken;
        }
    }
}

/// Ordered sequence of MediaEntity; supports append, clear, replace-in-place, iteration.
#[derive(Debug, Default)]
pub struct MediaCollection {
    entities: Vec<MediaEntity>,
}

impl MediaCollection {
    pub fn new() -> Self {
        MediaCollection::default()
    }

    pub fn add(&mut self, entity: MediaEntity) {
        self.entities.push(entity);
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }

    pub fn replace_all(&mut self, entities: Vec<MediaEntity>) {
        self.entities = entities;
    }

    pub fn iter(&self) -> impl Iterator<Item = &MediaEntity> {
        self.entities.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MediaEntity> {
        self.entities.iter_mut()
    }

    pub fn into_vec(self) -> Vec<MediaEntity> {
        self.entities
    }

    pub fn as_slice(&self) -> &[MediaEntity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Immutable per-run context plus a mutable handle to the collection.
pub struct ProcessingContext {
    pub input_directory: PathBuf,
    pub output_directory: PathBuf,
    pub config: Configuration,
    pub collection: MediaCollection,
}

impl ProcessingContext {
    pub fn new(input_directory: PathBuf, output_directory: PathBuf, config: Configuration) -> Self {
        ProcessingContext {
            input_directory,
            output_directory,
            config,
            collection: MediaCollection::new(),
        }
    }
}

/// Outcome of a single pipeline stage.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    pub success: bool,
    pub duration_ms: u128,
    pub message: String,
    pub skipped: bool,
    pub stats: HashMap<String, u64>,
}

impl StepResult {
    pub fn ok(message: impl Into<String>) -> Self {
        StepResult {
            success: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn skipped() -> Self {
        StepResult {
            success: true,
            skipped: true,
            message: "skipped".to_string(),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        StepResult {
            success: false,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_stat(mut self, key: &str, value: u64) -> Self {
        self.stats.insert(key.to_string(), value);
        self
    }
}

/// Aggregate run statistics surfaced to the CLI / a machine-readable summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingResult {
    pub duplicates_removed: u64,
    pub extras_skipped: u64,
    pub extensions_fixed: u64,
    pub coordinates_written: u64,
    pub datetimes_written: u64,
    pub creation_times_updated: u64,
    pub files_moved: u64,
    pub files_copied: u64,
    pub files_shortcut: u64,
    pub extraction_histogram: HashMap<String, u64>,
    pub stage_summaries: Vec<StageSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub name: String,
    pub success: bool,
    pub skipped: bool,
    pub duration_ms: u128,
    pub message: String,
}

impl ProcessingResult {
    pub fn record_stage(&mut self, name: &str, result: &StepResult) {
        self.stage_summaries.push(StageSummary {
            name: name.to_string(),
            success: result.success,
            skipped: result.skipped,
            duration_ms: result.duration_ms,
            message: result.message.clone(),
        });
        for (k, v) in &result.stats {
            *self.numeric_field(k) += v;
        }
    }

    fn numeric_field(&mut self, key: &str) -> &mut u64 {
        match key {
            "duplicates_removed" => &mut self.duplicates_removed,
            "extras_skipped" => &mut self.extras_skipped,
            "extensions_fixed" => &mut self.extensions_fixed,
            "coordinates_written" => &mut self.coordinates_written,
            "datetimes_written" => &mut self.datetimes_written,
            "creation_times_updated" => &mut self.creation_times_updated,
            "files_moved" => &mut self.files_moved,
            "files_copied" => &mut self.files_copied,
            "files_shortcut" => &mut self.files_shortcut,
            other => self.extraction_histogram.entry(other.to_string()).or_insert(0),
        }
    }
}
