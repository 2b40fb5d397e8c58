//! Shared helpers for `pvlink` e2e tests.

use assert_cmd::Command;

/// A `pvlink` command with a quiet default environment.
pub fn pvlink_cmd() -> Command {
    let mut cmd = Command::cargo_bin("pvlink").expect("pvlink binary should build");
    cmd.env_remove("RUST_LOG");
    cmd
}
