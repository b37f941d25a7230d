//! CLI integration tests
//!
//! Exercises the binary's subcommands and exit codes.

use assert_cmd::Command;
use image::{Rgb, RgbImage};
use predicates::prelude::*;
use std::path::Path;

fn bin() -> Command {
    Command::cargo_bin("manuscript-prep").unwrap()
}

fn write_page(root: &Path, rel: &str, bands: &[u32]) {
    let mut img = RgbImage::from_pixel(800, 1200, Rgb([230, 230, 230]));
    for &top in bands {
        for y in top..top + 40 {
            for x in (0..800).filter(|x| x % 8 < 3) {
                img.put_pixel(x, y, Rgb([35, 35, 35]));
            }
        }
    }
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    manuscript_prep::raster::save_jpeg(&img, &path, 95).unwrap();
}

#[test]
fn test_help() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("normalize"))
        .stdout(predicate::str::contains("segment"));
}

#[test]
fn test_version() {
    bin()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_info() {
    bin()
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("CPUs:"))
        .stdout(predicate::str::contains("Tesseract"));
}

#[test]
fn test_normalize_without_targets() {
    let dir = tempfile::tempdir().unwrap();
    bin()
        .args(["normalize", "--root"])
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No targets"));
}

#[test]
fn test_segment_all_on_empty_repo() {
    let dir = tempfile::tempdir().unwrap();
    bin()
        .args(["segment", "--all", "-q", "--root"])
        .arg(dir.path())
        .assert()
        .code(1);
}

#[test]
fn test_invalid_source_is_usage_error() {
    bin()
        .args(["segment", "1839-04-05", "--source", "processed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("processed_full"));
}

#[test]
fn test_missing_config_is_general_error() {
    let dir = tempfile::tempdir().unwrap();
    write_page(dir.path(), "images/1839-04-05.jpg", &[200]);
    bin()
        .args(["normalize", "1839-04-05", "--config", "/nonexistent/config.toml", "--root"])
        .arg(dir.path())
        .assert()
        .code(3)
        .stderr(predicate::str::contains("config"));
}

#[test]
fn test_normalize_and_segment_all() {
    let dir = tempfile::tempdir().unwrap();
    write_page(dir.path(), "images/1839-04-05.jpg", &[200, 600]);
    write_page(dir.path(), "images/1839-04-06.jpg", &[320]);

    bin()
        .args(["normalize", "--all", "--deskew", "--root"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Processed 2/2"));

    assert!(dir.path().join("images/processed_full/1839-04-05.jpg").is_file());
    assert!(dir.path().join("images/processed_full/1839-04-06.jpg").is_file());

    bin()
        .args(["segment", "--all", "--preview", "--clean", "--root"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1839-04-05: Saved 2 line crops"))
        .stdout(predicate::str::contains("1839-04-06: Saved 1 line crops"));

    let lines = dir.path().join("images/lines/1839-04-05");
    assert!(lines.join("line_002.jpg").is_file());
    assert!(lines.join("_preview.jpg").is_file());
    assert!(lines.join("_regions.json").is_file());
}

#[test]
fn test_partial_failure_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    write_page(dir.path(), "images/1839-04-05.jpg", &[200]);

    bin()
        .args(["segment", "1839-04-05", "1839-04-30", "--source", "original", "--root"])
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("1839-04-30"));
}

#[test]
fn test_config_file_enables_preview() {
    let dir = tempfile::tempdir().unwrap();
    write_page(dir.path(), "images/1839-04-05.jpg", &[200]);
    let config = dir.path().join("settings.toml");
    std::fs::write(&config, "[segment]\npreview = true\n").unwrap();

    bin()
        .args(["segment", "1839-04-05", "-q", "--source", "original", "--config"])
        .arg(&config)
        .arg("--root")
        .arg(dir.path())
        .assert()
        .success();

    assert!(dir
        .path()
        .join("images/lines/1839-04-05/_preview.jpg")
        .is_file());
}
