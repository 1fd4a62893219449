use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn prints_version() {
    Command::new(env!("CARGO_BIN_EXE_martisor-tui"))
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help_with_config_location() {
    let config_home = tempfile::tempdir().unwrap();
    Command::new(env!("CARGO_BIN_EXE_martisor-tui"))
        .arg("--help")
        .env("XDG_CONFIG_HOME", config_home.path())
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Mărțișor")
                .and(predicate::str::contains("--version"))
                .and(predicate::str::contains("martisor-tui/config.yaml")),
        );
}
