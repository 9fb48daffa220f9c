use std::fs;
use std::process::Command;

fn sqprogress() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sqprogress"));
    // keep the developer's real env file out of the picture
    cmd.env("HOME", std::env::temp_dir().join("sqprogress-no-home"));
    cmd
}

#[test]
fn test_unknown_graph_is_fatal_with_no_report() {
    let output = sqprogress()
        .args(["--jobset", "j", "--graph", "clebsch", "--rank", "3", "--stride", "4"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown graph: clebsch (provide --n)"), "stderr: {}", stderr);
}

#[test]
fn test_missing_stride_is_fatal() {
    let output = sqprogress()
        .args(["--jobset", "j", "--graph", "rook", "--rank", "3"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Missing --stride"), "stderr: {}", stderr);
}

#[test]
fn test_report_from_env_file() {
    let dir = tempfile::tempdir().unwrap();
    let nb = dir.path().join("Jupyter");
    let var = dir.path().join("var");
    fs::create_dir_all(&nb).unwrap();
    fs::create_dir_all(var.join("shri_r3/log")).unwrap();
    fs::create_dir_all(var.join("shri_r3/queue/pending")).unwrap();
    fs::write(var.join("shri_r3/queue/pending/off1.env"), "OFFSET=1\n").unwrap();
    fs::write(nb.join("state_shrikhande_r3_stride4_off0.txt"), "452\n").unwrap();
    fs::write(
        var.join("shri_r3/log/shri_r3_off0.log"),
        "[worker 3] start offset=0\n[2024-05-01T10:00:00] DONE gidx=452 dt=12.0s\n",
    )
    .unwrap();

    let env_file = dir.path().join("sagequeue.env");
    fs::write(
        &env_file,
        format!(
            "JOBSET=shri_r3\nSTRIDE=4\nPROJECT_ROOT={}\nSTOP_FILE_HOST={}\nSAGE_BASE_ARGS=\"--graph shrikhande --rank 3\"\n",
            dir.path().display(),
            nb.join("STOP").display()
        ),
    )
    .unwrap();

    let output = sqprogress()
        .arg("--env-file")
        .arg(&env_file)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Jobset: shri_r3"));
    assert!(stdout.contains("Queue: pending=1 running=0 done=0 failed=0"));
    assert!(stdout.contains("Overall: 114/455 (25.1%) | remaining: 341"));
    assert!(stdout.contains("completed"));
    assert!(stdout.contains("worker 3"));
    assert!(stdout.contains("Log-derived unique cases: 1/455"));
}

#[test]
fn test_json_output_without_breakdown() {
    let dir = tempfile::tempdir().unwrap();
    let output = sqprogress()
        .args(["--jobset", "pet_r2", "--graph", "petersen", "--rank", "2", "--stride", "3"])
        .arg("--notebook-dir")
        .arg(dir.path())
        .arg("--var-dir")
        .arg(dir.path())
        .arg("--no-worker-breakdown")
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["job"]["total_cases"], 36);
    assert_eq!(value["offsets"].as_array().unwrap().len(), 3);
    assert_eq!(value["offsets"][0]["status"], "not_started");
    assert!(value["eta"].is_null());
    assert!(value["log_breakdown"].is_null());
}
