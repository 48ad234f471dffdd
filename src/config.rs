use clap::ValueEnum;
use serde::Serialize;

/// How album memberships are expressed in the output tree (stage 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumBehavior {
    Shortcut,
    DuplicateCopy,
    ReverseShortcut,
    Json,
    Nothing,
}

/// Date-based subdirectory nesting under ALL_PHOTOS / PARTNER_SHARED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateDivision {
    None,
    Year,
    YearMonth,
    YearMonthDay,
}

/// How aggressively stage 1 corrects mismatched file extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionFixing {
    None,
    Standard,
    Conservative,
    Solo,
}

/// Run-wide configuration, mirrored 1:1 onto CLI flags in `main.rs`.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub album_behavior: AlbumBehavior,
    pub date_division: DateDivision,
    pub extension_fixing: ExtensionFixing,
    pub write_exif: bool,
    pub update_creation_time: bool,
    pub skip_extras: bool,
    pub verbose: bool,
    pub enforce_max_file_size: bool,
    pub max_file_size: u64,
    pub limit_file_size: bool,
    pub transform_pixel_motion_photos: bool,
    pub enable_exiftool_batch: bool,
    pub force_process_unsupported_formats: bool,
    pub fast_hash: bool,
    pub dry_run: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            album_behavior: AlbumBehavior::Shortcut,
            date_division: DateDivision::Year,
            extension_fixing: ExtensionFixing::Standard,
            write_exif: true,
            update_creation_time: false,
            skip_extras: false,
            verbose: false,
            enforce_max_file_size: false,
            max_file_size: 64 * 1024 * 1024 * 1024,
            limit_file_size: false,
            transform_pixel_motion_photos: false,
            enable_exiftool_batch: true,
            force_process_unsupported_formats: false,
            fast_hash: false,
            dry_run: false,
        }
    }
}
