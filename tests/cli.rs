//! Command line behaviour around the capture file

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const EARLIER_CAPTURE: &str = "7.000000 1.500000\n7.100000 1.200000\n";

fn analyser(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_analyser"))
        .arg("--config")
        .arg(dir.join("absent.toml"))
        .args(args)
        .env_remove("ANALYSER_PORT")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[cfg(unix)]
#[test]
fn port_open_failure_keeps_existing_capture() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("capture.txt");
    fs::write(&capture, EARLIER_CAPTURE).unwrap();

    let output = analyser(
        dir.path(),
        &[
            "--port",
            "/dev/no-such-analyser",
            "--output",
            capture.to_str().unwrap(),
            "scan",
            "-a",
            "7000000",
            "-b",
            "7100000",
        ],
    );

    assert_eq!(output.status.code(), Some(255));
    assert_eq!(fs::read_to_string(&capture).unwrap(), EARLIER_CAPTURE);
}

#[test]
fn rejected_range_keeps_existing_capture() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("capture.txt");
    fs::write(&capture, EARLIER_CAPTURE).unwrap();

    let output = analyser(
        dir.path(),
        &[
            "--simulate",
            "--output",
            capture.to_str().unwrap(),
            "scan",
            "-a",
            "7200000",
            "-b",
            "7000000",
        ],
    );

    assert_eq!(output.status.code(), Some(255));
    assert_eq!(fs::read_to_string(&capture).unwrap(), EARLIER_CAPTURE);
}

#[test]
fn simulated_scan_replaces_capture() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("capture.txt");
    fs::write(&capture, EARLIER_CAPTURE).unwrap();

    let output = analyser(
        dir.path(),
        &[
            "--simulate",
            "--output",
            capture.to_str().unwrap(),
            "scan",
            "-a",
            "7000000",
            "-b",
            "7200000",
            "-n",
            "4",
        ],
    );

    assert_eq!(output.status.code(), Some(0));
    let written = fs::read_to_string(&capture).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "7.000000 3.000000");
    assert_eq!(lines[2], "7.100000 1.000000");
}
