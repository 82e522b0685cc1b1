//! Tests for the 'up' command
//!
//! Sessions run against the in-memory backend via `--dry-run`, with the
//! shell fed from stdin.

use assert_cmd::Command;
use predicates::prelude::*;

/// Helper function to create a command instance for the topolab binary
fn cli_command() -> Command {
    Command::cargo_bin("topolab").expect("Failed to find topolab binary")
}

#[test]
fn test_up_help() {
    cli_command()
        .args(["up", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--plain"))
        .stdout(predicate::str::contains("--no-static-arp"))
        .stdout(predicate::str::contains("--ip-base"));
}

#[test]
fn test_up_dry_run_shell() {
    cli_command()
        .args(["up", "sample", "--dry-run"])
        .write_stdin("nodes\npingall\nexit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("topolab> "))
        .stdout(predicate::str::contains("available nodes are:"))
        .stdout(predicate::str::contains("*** Results: 0% dropped (12/12 received)"));
}

#[test]
fn test_up_dry_run_ends_on_eof() {
    cli_command()
        .args(["up", "hub_and_spoke", "--dry-run", "--plain"])
        .write_stdin("links\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("h1-eth0<->s1-eth1 (unshaped)"));
}

#[test]
fn test_up_dry_run_node_command() {
    cli_command()
        .args(["up", "sample", "--dry-run", "--no-auto-macs"])
        .write_stdin("h1 ping -c1 h4\ndump\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("PING 10.0.0.4"))
        .stdout(predicate::str::contains("<Host h1: h1-eth0:10.0.0.1>"));
}

#[test]
fn test_up_unknown_topology_fails() {
    cli_command()
        .args(["up", "nowhere", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown topology"));
}

#[test]
#[cfg(feature = "sudo-tests")]
fn test_up_real_namespaces() {
    cli_command()
        .args(["up", "sample", "--prefix", "tlcli-"])
        .write_stdin("pingall\nexit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("0% dropped"));
}
