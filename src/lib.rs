pub mod album_consolidation;
pub mod album_strategies;
pub mod albums_info;
pub mod concurrency;
pub mod config;
pub mod date_extractor;
pub mod dedup;
pub mod discovery;
pub mod display;
pub mod exif_writer;
pub mod exiftool;
pub mod extension_fix;
pub mod extras;
pub mod fsops;
pub mod metadata;
pub mod model;
pub mod pipeline;
pub mod sidecar;
pub mod timestamp;
