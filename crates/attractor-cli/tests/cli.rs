use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn attractor(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_attractor"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

fn write_scenarios(path: &Path, json: &str) {
    fs::write(path, json).unwrap();
}

const SMALL_BASIN: &str = r#"[
  {
    "name": "cli-basin",
    "kind": "basin",
    "transition": {"kind": "sine_map"},
    "extractor": {"kind": "variance_ratio", "observed": 3},
    "initial": {"type": "ensemble", "particles": 1000, "dims": 4},
    "kernel": {"max_iterations": 120, "tail_window": 40},
    "seed_count": 2,
    "target": 0.75,
    "tolerance": 0.05
  }
]"#;

#[test]
fn list_prints_every_suite() {
    let out = attractor(&["list"]);
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    for name in ["fortress", "goldilocks", "spectral", "mirror", "all"] {
        assert!(stdout.contains(name), "{stdout}");
    }
}

#[test]
fn run_with_config_writes_structured_report() {
    let dir = tempdir().unwrap();
    let scenarios = dir.path().join("scenarios.json");
    let report = dir.path().join("report.json");
    write_scenarios(&scenarios, SMALL_BASIN);

    let out = attractor(&[
        "run",
        "--config",
        scenarios.to_str().unwrap(),
        "--threads",
        "2",
        "--json",
        "--out",
        report.to_str().unwrap(),
    ]);
    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    let basin = &written["scenarios"]["cli-basin"];
    assert_eq!(basin["kind"], "basin");
    assert_eq!(basin["runs"], 2);
    assert_eq!(basin["passed"], true);

    let printed: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(printed["scenarios"]["cli-basin"]["runs"], 2);
}

#[test]
fn overrides_apply_to_config_scenarios() {
    let dir = tempdir().unwrap();
    let scenarios = dir.path().join("scenarios.json");
    write_scenarios(&scenarios, SMALL_BASIN);

    let out = attractor(&[
        "run",
        "--config",
        scenarios.to_str().unwrap(),
        "--seeds",
        "3",
        "--iterations",
        "60",
        "--json",
    ]);
    assert!(out.status.success());
    let printed: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(printed["scenarios"]["cli-basin"]["runs"], 3);
}

#[test]
fn invalid_scenario_exits_with_config_status() {
    let dir = tempdir().unwrap();
    let scenarios = dir.path().join("scenarios.json");
    write_scenarios(&scenarios, &SMALL_BASIN.replace("\"seed_count\": 2", "\"seed_count\": 0"));

    let out = attractor(&["run", "--config", scenarios.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2));
    let table = String::from_utf8(out.stdout).unwrap();
    assert!(table.contains("rejected"), "{table}");
}

#[test]
fn unknown_suite_exits_with_config_status() {
    let out = attractor(&["run", "--suite", "nonexistent"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn collapse_exits_with_status_one() {
    let dir = tempdir().unwrap();
    let scenarios = dir.path().join("scenarios.json");
    let vanishing = SMALL_BASIN
        .replace("\"kind\": \"basin\"", "\"kind\": \"stability\"")
        .replace("{\"kind\": \"sine_map\"}", "{\"kind\": \"sine_map\", \"gain\": 1e-6}");
    write_scenarios(&scenarios, &vanishing);

    let out = attractor(&["run", "--config", scenarios.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
}
