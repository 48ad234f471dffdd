//! Minimal input-tree → output-tree scenarios driven through the library
//! crate's `pipeline::run`, one per documented end-to-end case.

use std::fs;
use std::path::Path;

use takeout_organizer::config::{AlbumBehavior, Configuration, DateDivision};
use takeout_organizer::pipeline;

fn write_photo(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn write_sidecar(media_path: &Path, timestamp: &str) {
    let sidecar = media_path.with_file_name(format!(
        "{}.json",
        media_path.file_name().unwrap().to_string_lossy()
    ));
    fs::write(
        sidecar,
        format!(r#"{{"photoTakenTime": {{"timestamp": "{timestamp}"}}}}"#),
    )
    .unwrap();
}

#[test]
fn single_photo_with_json_sidecar_lands_under_all_photos_by_year() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let photo = input.path().join("Photos from 2019/IMG_20190215_193501.jpg");
    write_photo(&photo, b"photo bytes");
    write_sidecar(&photo, "1550259301");

    let config = Configuration {
        album_behavior: AlbumBehavior::Nothing,
        date_division: DateDivision::Year,
        ..Configuration::default()
    };
    let result = pipeline::run(input.path(), output.path(), &config, "2026-07-28T00:00:00Z").unwrap();

    assert!(output.path().join("ALL_PHOTOS/2019/IMG_20190215_193501.jpg").exists());
    assert_eq!(result.extraction_histogram.get("json"), Some(&1));
    assert_eq!(result.files_moved, 1);
}

#[test]
fn identical_photo_in_year_and_album_dedups_to_one_physical_file() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let year_copy = input.path().join("Photos from 2022/a.jpg");
    let album_copy = input.path().join("Vacation/a.jpg");
    write_photo(&year_copy, b"identical bytes");
    write_photo(&album_copy, b"identical bytes");
    write_sidecar(&year_copy, "1550259301");

    let config = Configuration {
        album_behavior: AlbumBehavior::Shortcut,
        date_division: DateDivision::None,
        ..Configuration::default()
    };
    let result = pipeline::run(input.path(), output.path(), &config, "2026-07-28T00:00:00Z").unwrap();

    assert_eq!(result.duplicates_removed, 1);
    assert!(output.path().join("ALL_PHOTOS/a.jpg").exists());
    let link = output.path().join("Vacation/a.jpg");
    assert!(fs::symlink_metadata(&link).is_ok());
}

#[test]
fn edited_copy_is_skipped_when_skip_extras_is_set() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_photo(&input.path().join("Photos from 2020/pic.jpg"), b"original");
    write_photo(&input.path().join("Photos from 2020/pic-edited.jpg"), b"edited");

    let config = Configuration {
        album_behavior: AlbumBehavior::Nothing,
        date_division: DateDivision::None,
        skip_extras: true,
        ..Configuration::default()
    };
    let result = pipeline::run(input.path(), output.path(), &config, "2026-07-28T00:00:00Z").unwrap();

    assert_eq!(result.extras_skipped, 1);
    assert!(output.path().join("ALL_PHOTOS/pic.jpg").exists());
    assert!(!output.path().join("ALL_PHOTOS/pic-edited.jpg").exists());
}

#[test]
fn json_strategy_records_both_albums_without_materializing_them() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    for name in ["photo1.jpg", "photo2.jpg"] {
        write_photo(&input.path().join("AlbumA").join(name), name.as_bytes());
        write_photo(&input.path().join("AlbumB").join(name), name.as_bytes());
    }

    let config = Configuration {
        album_behavior: AlbumBehavior::Json,
        date_division: DateDivision::None,
        ..Configuration::default()
    };
    let result = pipeline::run(input.path(), output.path(), &config, "2026-07-28T00:00:00Z").unwrap();

    assert_eq!(result.duplicates_removed, 2);
    assert!(!output.path().join("AlbumA").exists());
    assert!(!output.path().join("AlbumB").exists());

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output.path().join("albums-info.json")).unwrap()).unwrap();
    let albums = manifest["albums"].as_object().unwrap();
    assert_eq!(albums["AlbumA"].as_array().unwrap().len(), 2);
    assert_eq!(albums["AlbumB"].as_array().unwrap().len(), 2);
    for entry in albums["AlbumA"].as_array().unwrap() {
        assert!(entry["primaryRelativePathInOutput"].as_str().unwrap().starts_with("ALL_PHOTOS/"));
    }
}

#[test]
fn reverse_shortcut_moves_every_album_copy_and_links_one_back() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_photo(&input.path().join("Photos from 2021/x.jpg"), b"identical");
    write_photo(&input.path().join("Trip/x.jpg"), b"identical");
    write_photo(&input.path().join("Favorites/x.jpg"), b"identical");

    let config = Configuration {
        album_behavior: AlbumBehavior::ReverseShortcut,
        date_division: DateDivision::None,
        ..Configuration::default()
    };
    let result = pipeline::run(input.path(), output.path(), &config, "2026-07-28T00:00:00Z").unwrap();

    assert_eq!(result.duplicates_removed, 2);
    assert!(output.path().join("Trip/x.jpg").exists());
    assert!(output.path().join("Favorites/x.jpg").exists());

    let all_photos = output.path().join("ALL_PHOTOS");
    let shortcuts: Vec<_> = fs::read_dir(&all_photos)
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(shortcuts.len(), 1);
    assert!(fs::symlink_metadata(shortcuts[0].path()).is_ok());
}
