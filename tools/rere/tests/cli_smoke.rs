use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use std::path::{Path, PathBuf};

fn rere() -> Command {
    cargo_bin_cmd!("rere")
}

fn write_list(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write list");
    path
}

fn stderr_of(out: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(out.get_output().stderr.clone()).expect("utf8")
}

fn stdout_of(out: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(out.get_output().stdout.clone()).expect("utf8")
}

#[test]
fn help_lists_subcommands() {
    let out = rere().arg("--help").assert().success();
    let stdout = stdout_of(&out);
    assert!(stdout.contains("record"));
    assert!(stdout.contains("replay"));
    assert!(stdout.contains("-j <N>"));
}

#[test]
fn missing_subcommand_exits_one() {
    let out = rere().assert().code(1);
    assert!(stderr_of(&out).starts_with("ERROR: "));
}

#[test]
fn unknown_subcommand_exits_one() {
    let out = rere().arg("rewind").arg("x.list").assert().code(1);
    let stderr = stderr_of(&out);
    assert_eq!(stderr.lines().count(), 1, "stderr: {stderr:?}");
    assert!(stderr.starts_with("ERROR: "));
    assert!(stderr.contains("rewind"));
}

#[test]
fn missing_list_path_exits_one() {
    rere().arg("replay").assert().code(1);
}

#[test]
fn malformed_jobs_exits_one() {
    rere()
        .args(["-j", "lots", "record", "x.list"])
        .assert()
        .code(1);
}

#[test]
fn missing_list_file_is_reported() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = rere()
        .arg("record")
        .arg(temp.path().join("absent.list"))
        .assert()
        .code(1);
    assert!(stderr_of(&out).starts_with("ERROR: io error"));
}

#[cfg(unix)]
#[test]
fn record_then_replay_is_ok() {
    let temp = tempfile::tempdir().expect("tempdir");
    let list = write_list(
        temp.path(),
        "cmds.list",
        "echo hello\nprintf a\\nb\nfalse\nls rere-missing-entry\n",
    );

    let out = rere().arg("record").arg(&list).assert().success();
    assert!(stdout_of(&out).contains("CAPTURING: echo"));
    assert!(temp.path().join("cmds.list.bi").exists());

    let out = rere().arg("replay").arg(&list).assert().success();
    let stdout = stdout_of(&out);
    assert!(stdout.contains("REPLAYING: echo hello"));
    assert!(stdout.trim_end().ends_with("OK"));

    let out = rere()
        .args(["-j", "3", "replay"])
        .arg(&list)
        .assert()
        .success();
    assert!(stdout_of(&out).trim_end().ends_with("OK"));
}

#[cfg(unix)]
#[test]
fn edited_command_is_reported_as_drift() {
    let temp = tempfile::tempdir().expect("tempdir");
    let list = write_list(temp.path(), "cmds.list", "echo hello\n");
    rere().arg("record").arg(&list).assert().success();

    write_list(temp.path(), "cmds.list", "echo goodbye\n");
    let out = rere().arg("replay").arg(&list).assert().code(1);
    let stderr = stderr_of(&out);
    assert!(stderr.contains("UNEXPECTED: stdout in echo goodbye"));
    assert!(stderr.contains("    EXPECTED: hello"));
    assert!(stderr.contains("    ACTUAL: goodbye"));
    assert!(!stdout_of(&out).contains("OK"));
}

#[cfg(unix)]
#[test]
fn changed_list_length_is_fatal() {
    let temp = tempfile::tempdir().expect("tempdir");
    let list = write_list(temp.path(), "cmds.list", "echo a\necho b\n");
    rere().arg("record").arg(&list).assert().success();

    write_list(temp.path(), "cmds.list", "echo a\necho b\necho c\n");
    let out = rere().arg("replay").arg(&list).assert().code(1);
    let stderr = stderr_of(&out);
    assert!(stderr.starts_with("ERROR: "));
    assert!(stderr.contains("holds 2 results"));
    assert!(stderr.contains("lists 3 commands"));
    assert!(!stdout_of(&out).contains("REPLAYING"));
}

#[cfg(unix)]
#[test]
fn truncated_snapshot_is_fatal() {
    let temp = tempfile::tempdir().expect("tempdir");
    let list = write_list(temp.path(), "cmds.list", "echo hello\n");
    rere().arg("record").arg(&list).assert().success();

    let snapshot = temp.path().join("cmds.list.bi");
    let bytes = std::fs::read(&snapshot).expect("read snapshot");
    std::fs::write(&snapshot, &bytes[..bytes.len() - 20]).expect("truncate");

    let out = rere().arg("replay").arg(&list).assert().code(1);
    assert!(stderr_of(&out).contains("ERROR: snapshot truncated"));
}

#[cfg(unix)]
#[test]
fn config_file_sets_suffix_and_run_log() {
    let temp = tempfile::tempdir().expect("tempdir");
    let list = write_list(temp.path(), "cmds.list", "echo hello\n");
    let log = temp.path().join("logs/run.jsonl");
    let config = temp.path().join("rere.toml");
    std::fs::write(
        &config,
        format!(
            "[snapshot]\nsuffix = \".snap\"\n\n[logging]\npath = \"{}\"\n",
            log.display()
        ),
    )
    .expect("write config");

    rere()
        .arg("--config")
        .arg(&config)
        .arg("record")
        .arg(&list)
        .assert()
        .success();
    assert!(temp.path().join("cmds.list.snap").exists());
    assert!(!temp.path().join("cmds.list.bi").exists());

    rere()
        .arg("--config")
        .arg(&config)
        .arg("replay")
        .arg(&list)
        .assert()
        .success();

    let text = std::fs::read_to_string(&log).expect("run log");
    assert!(text.contains("\"event_type\":\"snapshot.written\""));
    assert!(text.contains("\"event_type\":\"replay.completed\""));
}
