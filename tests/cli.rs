//! Integration tests for the blastpool CLI.
//!
//! Workers are stand-in `sh -c` scripts passed after `--`.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const ECHO_WORKER: &str = r##"awk '/^>/ { q = substr($1, 2); printf "# BLASTN 2.15.0+\n# Query: %s\n# Database: test\n# 1 hits found\nhit_%s\t%d\n", substr($0, 2), q, NR; fflush() }'"##;

const QUERIES: &str = ">a first\nACGT\n>b\nGGCC\n";

const NO_ARGS: [&str; 0] = [];

/// Get a command for the blastpool binary with a clean environment.
fn blastpool() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("blastpool").unwrap();
    for var in [
        "BLASTPOOL_WORKERS",
        "BLASTPOOL_FIELDS",
        "BLASTPOOL_LOG",
        "BLASTPOOL_LOG_LEVEL",
        "BLASTPOOL_LOG_FORMAT",
        "BLASTPOOL_LOG_FILE",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// A one-worker run of `script` with two-column hits.
///
/// `args` go before the `--` that starts the worker's own arguments.
fn scripted<I, S>(script: &str, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut cmd = blastpool();
    cmd.args(["sh", "-j", "1", "--fields", "sseqid,line"]);
    cmd.args(args);
    cmd.args(["--", "-c", script, "worker"]);
    cmd
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays() {
    blastpool()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("worker processes"))
        .stdout(predicate::str::contains("--workers"))
        .stdout(predicate::str::contains("--fields"))
        .stdout(predicate::str::contains("--opt"))
        .stdout(predicate::str::contains("--format"));
}

#[test]
fn test_version_displays() {
    blastpool()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("blastpool"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_program_is_required() {
    blastpool()
        .assert()
        .failure()
        .stderr(predicate::str::contains("<PROGRAM>"));
}

// ============================================================================
// Output Format Tests
// ============================================================================

#[test]
fn test_json_output() {
    scripted(ECHO_WORKER, NO_ARGS)
        .write_stdin(QUERIES)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"{"id":"a","description":"first","hits":[{"sseqid":"hit_a","line":1}]}"#,
        ))
        .stdout(predicate::str::contains(
            r#"{"id":"b","description":null,"hits":[{"sseqid":"hit_b","line":3}]}"#,
        ));
}

#[test]
fn test_tsv_output() {
    scripted(ECHO_WORKER, ["--format", "tsv"])
        .write_stdin(QUERIES)
        .assert()
        .success()
        .stdout("a\thit_a\t1\nb\thit_b\t3\n");
}

#[test]
fn test_summary_output() {
    scripted(ECHO_WORKER, ["-f", "summary"])
        .write_stdin(QUERIES)
        .assert()
        .success()
        .stdout("a\tfirst\t1\nb\t\t1\n");
}

#[test]
fn test_query_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queries.fa");
    std::fs::write(&path, QUERIES).unwrap();

    let path = path.to_str().unwrap();
    scripted(ECHO_WORKER, ["--format", "tsv", "--query", path])
        .assert()
        .success()
        .stdout("a\thit_a\t1\nb\thit_b\t3\n");
}

#[test]
fn test_empty_input_produces_no_output() {
    scripted(ECHO_WORKER, NO_ARGS)
        .write_stdin("")
        .assert()
        .success()
        .stdout("");
}

// ============================================================================
// Error Tests
// ============================================================================

#[test]
fn test_missing_query_file() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.fa");
    scripted(ECHO_WORKER, ["--query", missing.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open query file"));
}

#[test]
fn test_outfmt_option_rejected() {
    blastpool()
        .args(["blastn", "-o", "outfmt=6"])
        .write_stdin(QUERIES)
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Use of the -outfmt option is not supported",
        ));
}

#[test]
fn test_missing_program() {
    blastpool()
        .args(["blastpool-no-such-worker", "-j", "1"])
        .write_stdin(QUERIES)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("blastpool-no-such-worker"));
}

#[test]
fn test_zero_workers_rejected() {
    blastpool()
        .args(["blastn", "-j", "0"])
        .write_stdin(QUERIES)
        .assert()
        .failure()
        .stderr(predicate::str::contains("worker count"));
}

#[test]
fn test_malformed_query_input() {
    scripted(ECHO_WORKER, NO_ARGS)
        .write_stdin("ACGT\n>a\nACGT\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Malformed query input"));
}

#[test]
fn test_worker_failure_exits_nonzero() {
    let script = format!("{}; exit 2", ECHO_WORKER);
    scripted(&script, ["--format", "tsv"])
        .write_stdin(QUERIES)
        .assert()
        .failure()
        .stdout("a\thit_a\t1\nb\thit_b\t3\n")
        .stderr(predicate::str::contains("exited with code 2"));
}

#[test]
fn test_bad_option_syntax() {
    blastpool()
        .args(["blastn", "--opt", "evalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NAME=VALUE"));
}
