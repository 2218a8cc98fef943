use assert_cmd::Command;
use predicates::str::contains;
use std::error::Error;
use tempfile::tempdir;

fn cropshot_cmd() -> Command {
    Command::cargo_bin("cropshot").expect("Failed to find cropshot binary")
}

#[test]
fn test_help_lists_both_commands() {
    cropshot_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("run"))
        .stdout(contains("detect"));
}

#[test]
fn test_run_requires_input_and_output() {
    cropshot_cmd()
        .arg("run")
        .assert()
        .failure()
        .stderr(contains("--input"));
}

#[test]
fn test_run_rejects_non_numeric_workers() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    cropshot_cmd()
        .args(["run", "-i"])
        .arg(dir.path())
        .arg("-o")
        .arg(dir.path().join("out"))
        .args(["--workers", "several"])
        .assert()
        .failure()
        .stderr(contains("invalid value"));
    Ok(())
}

#[test]
fn test_run_non_existent_input() -> Result<(), Box<dyn Error>> {
    let output_dir = tempdir()?;

    cropshot_cmd()
        .args(["run", "-i", "surely/this/does/not/exist", "-o"])
        .arg(output_dir.path())
        .assert()
        .failure()
        .stderr(contains("is not a directory"));

    // Nothing is created for a run that never started.
    assert!(!output_dir.path().join("logs").exists());
    Ok(())
}

#[test]
fn test_run_rejects_invalid_config_file() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let config = dir.path().join("cropshot.json");
    std::fs::write(&config, "{ \"crop_probes\": \"three\" }")?;

    cropshot_cmd()
        .args(["run", "-i"])
        .arg(dir.path())
        .arg("-o")
        .arg(dir.path().join("out"))
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(contains("Invalid configuration"));
    Ok(())
}

#[test]
fn test_detect_missing_file() {
    cropshot_cmd()
        .args(["detect", "surely/this/does/not/exist.mp4"])
        .assert()
        .failure()
        .stderr(contains("is not a file"));
}
