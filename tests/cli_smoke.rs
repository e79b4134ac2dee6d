use std::fs;
use std::process::{Command, Output};

fn bin() -> String {
    // Cargo sets this for bin targets in integration tests
    env!("CARGO_BIN_EXE_qsim").to_string()
}

fn assert_ok(output: &Output) {
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Point the config at a file that does not exist so the user's ~/.qsim is ignored.
fn qsim(dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(bin());
    cmd.arg("--config").arg(dir.join("absent.toml"));
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn simulate_writes_result_json() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bell.json");
    let out = dir.path().join("out/result.json");
    fs::write(
        &input,
        r#"{"numQubits":2,"gates":[{"name":"H","qubits":[0]},{"name":"CNOT","qubits":[0,1]}]}"#,
    )
    .unwrap();

    let output = qsim(dir.path())
        .arg("simulate")
        .arg(&input)
        .arg("--shots")
        .arg("100")
        .arg("--seed")
        .arg("3")
        .arg("--out")
        .arg(&out)
        .output()
        .expect("run");
    assert_ok(&output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("|00>  0.500000"));
    assert!(stdout.contains("|11>  0.500000"));
    assert!(!stdout.contains("|01>"));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["numQubits"], 2);
    assert_eq!(json["probabilities"].as_array().unwrap().len(), 4);
    assert_eq!(json["reducedStates"].as_array().unwrap().len(), 2);
    assert!(json.get("error").is_none());
}

#[test]
fn unknown_gate_is_a_warning_not_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("c.json");
    fs::write(&input, r#"{"numQubits":1,"gates":[{"name":"BOGUS","qubits":[0]}]}"#).unwrap();
    let output = qsim(dir.path()).arg("simulate").arg(&input).output().expect("run");
    assert_ok(&output);
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown gate 'BOGUS'"));
}

#[test]
fn malformed_circuit_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("c.json");
    fs::write(&input, r#"{"numQubits":0,"gates":[]}"#).unwrap();
    let output = qsim(dir.path()).arg("simulate").arg(&input).output().expect("run");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("simulation failed"));
}

#[test]
fn gates_verify_and_demo() {
    let dir = tempfile::tempdir().unwrap();
    let output = qsim(dir.path()).args(["gates", "--verify"]).output().expect("run");
    assert_ok(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("CNOT"));
    assert!(stdout.contains("gate checks unitary"));

    let output = qsim(dir.path()).args(["demo", "ghz"]).output().expect("run");
    assert_ok(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("|000>  0.500000"));
    assert!(stdout.contains("|111>  0.500000"));
}

#[test]
fn config_limits_apply() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = dir.path().join("config.toml");
    fs::write(&cfg, "[numerics]\nmax_qubits = 2\n").unwrap();
    let output = Command::new(bin())
        .arg("--config")
        .arg(&cfg)
        .args(["demo", "ghz"])
        .output()
        .expect("run");
    assert!(!output.status.success());
}

#[test]
fn simulate_has_no_cache_toggle() {
    // each invocation builds its own caches, so there is nothing to opt out of
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("c.json");
    fs::write(&input, r#"{"numQubits":1,"gates":[{"name":"H","qubits":[0]}]}"#).unwrap();
    let output = qsim(dir.path())
        .arg("simulate")
        .arg(&input)
        .arg("--no-cache")
        .output()
        .expect("run");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--no-cache"));
}
