use assert_cmd::Command;

#[test]
fn help_lists_the_three_subcommands() {
    let mut cmd = Command::cargo_bin("context").unwrap();
    cmd.arg("--help");
    let output = cmd.assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("serve"));
    assert!(stdout.contains("index"));
    assert!(stdout.contains("settings"));
}

#[test]
fn settings_get_prints_defaults_for_a_missing_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("context").unwrap();
    cmd.arg("--config").arg(dir.path().join("does-not-exist.toml")).arg("settings").arg("get");
    let output = cmd.assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("search_result_limit"));
}

#[test]
fn settings_set_rejects_an_unknown_key() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("context").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("missing.toml"))
        .arg("settings")
        .arg("set")
        .arg("not_a_real_key")
        .arg("1");
    cmd.assert().failure().code(1);
}

#[test]
fn index_rejects_a_nonexistent_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("context").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("missing.toml"))
        .arg("index")
        .arg(dir.path().join("nowhere"));
    cmd.assert().failure().code(1);
}
