//! Runs the `trainer` binary with `sh` stand-ins for the four stages.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Stage<'a> {
    name: &'a str,
    script: &'a str,
}

fn write_pipeline(dir: &TempDir, stages: &[Stage<'_>]) -> PathBuf {
    let mut toml = String::new();
    for stage in stages {
        toml.push_str(&format!(
            "[[stage]]\nname = \"{}\"\nprogram = \"sh\"\nargs = [\"-c\", {:?}]\n\n",
            stage.name, stage.script
        ));
    }
    let path = dir.path().join("pipeline.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn trainer() -> Command {
    let mut cmd = Command::cargo_bin("trainer").unwrap();
    cmd.env("TRAINER_LOG", "warn").timeout(Duration::from_secs(30));
    cmd
}

fn child_lines(stderr: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stderr)
        .lines()
        .filter(|l| l.starts_with("trainer: child "))
        .map(str::to_string)
        .collect()
}

fn abc_stages() -> Vec<Stage<'static>> {
    vec![
        Stage { name: "producer", script: "printf A" },
        Stage { name: "transformer1", script: "cat; printf B" },
        Stage { name: "transformer2", script: "cat; printf C" },
        Stage { name: "consumer", script: "cat" },
    ]
}

#[test]
fn chain_appends_each_stage_output() {
    let dir = TempDir::new().unwrap();
    let config = write_pipeline(&dir, &abc_stages());

    let output = trainer()
        .arg("--config")
        .arg(&config)
        .arg("data.csv")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "ABC");

    let lines = child_lines(&output.stderr);
    assert_eq!(lines.len(), 4, "stderr lines: {lines:?}");
    assert!(lines.iter().all(|l| l.ends_with("exited with status 0")));
    for name in ["producer", "transformer1", "transformer2", "consumer"] {
        assert_eq!(
            lines.iter().filter(|l| l.contains(&format!("({name})"))).count(),
            1,
            "missing line for {name}"
        );
    }
}

#[test]
fn failing_middle_stage_is_reported_but_not_fatal() {
    let dir = TempDir::new().unwrap();
    let config = write_pipeline(
        &dir,
        &[
            Stage { name: "producer", script: "printf A" },
            Stage { name: "transformer1", script: "cat; printf B" },
            Stage { name: "transformer2", script: "exit 7" },
            Stage { name: "consumer", script: "cat" },
        ],
    );

    let output = trainer()
        .arg("--config")
        .arg(&config)
        .arg("data.csv")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "");

    let lines = child_lines(&output.stderr);
    assert_eq!(lines.len(), 4, "stderr lines: {lines:?}");
    assert!(
        lines
            .iter()
            .any(|l| l.contains("(transformer2) exited with status 7"))
    );
}

#[test]
fn strict_mode_turns_stage_failure_into_exit_status() {
    let dir = TempDir::new().unwrap();
    let config = write_pipeline(
        &dir,
        &[
            Stage { name: "producer", script: "printf A" },
            Stage { name: "transformer1", script: "cat" },
            Stage { name: "transformer2", script: "cat >/dev/null; exit 7" },
            Stage { name: "consumer", script: "cat" },
        ],
    );

    trainer()
        .arg("--strict")
        .arg("--config")
        .arg(&config)
        .arg("data.csv")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("(transformer2) exited with status 7"));
}

#[test]
fn killed_stage_is_reported_with_its_signal() {
    let dir = TempDir::new().unwrap();
    let config = write_pipeline(
        &dir,
        &[
            Stage { name: "producer", script: "printf A" },
            Stage { name: "transformer1", script: "kill -9 $$" },
            Stage { name: "transformer2", script: "cat" },
            Stage { name: "consumer", script: "cat" },
        ],
    );

    let output = trainer()
        .arg("--config")
        .arg(&config)
        .arg("data.csv")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let lines = child_lines(&output.stderr);
    assert_eq!(lines.len(), 4, "stderr lines: {lines:?}");
    assert!(
        lines
            .iter()
            .any(|l| l.contains("(transformer1) terminated by signal 9 (SIGKILL)"))
    );
}

#[test]
fn producer_receives_the_input_argument() {
    let dir = TempDir::new().unwrap();
    // With `sh -c script arg`, the forwarded argument lands in `$0`.
    let config = write_pipeline(
        &dir,
        &[
            Stage { name: "producer", script: "printf '%s|' \"$0\"" },
            Stage { name: "transformer1", script: "cat" },
            Stage { name: "transformer2", script: "cat" },
            Stage { name: "consumer", script: "cat" },
        ],
    );

    trainer()
        .arg("--config")
        .arg(&config)
        .arg("some/path/data.csv")
        .assert()
        .success()
        .stdout("some/path/data.csv|");
}

#[test]
fn large_streams_reach_end_of_stream() {
    let dir = TempDir::new().unwrap();
    let config = write_pipeline(
        &dir,
        &[
            Stage { name: "producer", script: "head -c 1000000 /dev/zero" },
            Stage { name: "transformer1", script: "cat" },
            Stage { name: "transformer2", script: "cat" },
            Stage { name: "consumer", script: "wc -c" },
        ],
    );

    let output = trainer()
        .arg("--config")
        .arg(&config)
        .arg("data.csv")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "1000000");
}

#[test]
fn missing_stage_programs_fail_inside_their_children() {
    // Run from an empty directory so the built-in `bin/...` programs are absent.
    let dir = TempDir::new().unwrap();

    let output = trainer()
        .current_dir(dir.path())
        .arg("data.csv")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let lines = child_lines(&output.stderr);
    assert_eq!(lines.len(), 4, "stderr lines: {lines:?}");
    assert!(lines.iter().all(|l| l.ends_with("exited with status 127")));
    assert!(String::from_utf8_lossy(&output.stderr).contains("execvp"));
}

#[test]
fn two_arguments_print_usage_and_spawn_nothing() {
    let output = trainer().arg("a.csv").arg("b.csv").output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "stderr: {stderr}");
    assert!(child_lines(&output.stderr).is_empty());
    assert!(output.stdout.is_empty());
}

#[test]
fn no_arguments_print_usage() {
    trainer()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn invalid_pipeline_description_is_a_setup_failure() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipeline.toml");
    fs::write(&path, "[[stage]]\nname = \"a\"\nprogram = \"\"\n").unwrap();

    trainer()
        .arg("--config")
        .arg(&path)
        .arg("data.csv")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("empty program"));
}

#[test]
fn dry_run_prints_wiring_without_spawning() {
    let dir = TempDir::new().unwrap();
    let config = write_pipeline(&dir, &abc_stages());

    let output = trainer()
        .arg("--dry-run")
        .arg("--config")
        .arg(&config)
        .arg("data.csv")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("trainer dry-run"));
    assert!(stdout.contains("stdin: pipe 0 (producer->transformer1)"));
    assert!(child_lines(&output.stderr).is_empty());
}
