use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use image::{ImageFormat, Rgb, RgbImage};
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn help_lists_the_core_flags() {
    let mut cmd = cargo_bin_cmd!("gamutmask");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--once"))
        .stdout(predicate::str::contains("--recursive"))
        .stdout(predicate::str::contains("--padding-x"));
}

#[test]
fn once_generates_wheels_and_a_manifest() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("_input");
    let output = tmp.path().join("_output");
    fs::create_dir_all(&input).unwrap();
    fs::create_dir_all(&output).unwrap();
    RgbImage::from_pixel(6, 6, Rgb([220, 40, 40]))
        .save_with_format(input.join("brick.png"), ImageFormat::Png)
        .unwrap();
    fs::write(input.join("notes.txt"), b"ignored").unwrap();
    fs::write(output.join("stale.png.png"), b"left over").unwrap();

    let mut cmd = cargo_bin_cmd!("gamutmask");
    cmd.current_dir(tmp.path())
        .env("RUST_LOG", "info")
        .env_remove("GAMUTMASK_CONFIG")
        .env_remove("GAMUTMASK_INPUT")
        .env_remove("GAMUTMASK_OUTPUT")
        .args(["--once", "--width", "40", "--height", "40"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Generating:"))
        .stdout(predicate::str::contains("Deleting:"));

    let wheel = image::open(output.join("brick.png.png")).unwrap();
    assert_eq!((wheel.width(), wheel.height()), (40, 40));
    assert!(!output.join("stale.png.png").exists());
    assert!(!output.join("notes.txt.png").exists());

    let manifest = fs::read_to_string(input.join("_list.json")).unwrap();
    assert!(manifest.contains("\"InputName\": \"brick.png\""));
}

#[test]
fn missing_input_folder_exits_non_zero() {
    let tmp = tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("out")).unwrap();

    let mut cmd = cargo_bin_cmd!("gamutmask");
    cmd.env_remove("GAMUTMASK_CONFIG")
        .arg("--once")
        .arg("--input")
        .arg(tmp.path().join("nowhere"))
        .arg("--output")
        .arg(tmp.path().join("out"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn explicit_config_file_must_exist() {
    let tmp = tempdir().unwrap();

    let mut cmd = cargo_bin_cmd!("gamutmask");
    cmd.current_dir(tmp.path())
        .arg("--once")
        .arg("--config")
        .arg(tmp.path().join("missing.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}
