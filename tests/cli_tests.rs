//! Black-box checks of the `mudra` binary: run, expand, and piped input.
//! Requires assert_cmd and predicates in [dev-dependencies].

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

fn fixture_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mudra-cli-{}-{}", tag, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn mudra() -> Command {
    Command::cargo_bin("mudra").unwrap()
}

#[test]
fn run_executes_a_program_with_macros() {
    let dir = fixture_dir("run");
    fs::write(dir.join("util.mudra"), "macro twice(x): x + x\n").unwrap();
    fs::write(
        dir.join("prog.mudra"),
        "from util import macros, twice\nprint(twice(4))\n",
    )
    .unwrap();

    mudra()
        .arg("run")
        .arg(dir.join("prog.mudra"))
        .assert()
        .success()
        .stdout(contains("8"));
}

#[test]
fn run_failures_exit_nonzero_with_a_diagnostic() {
    let dir = fixture_dir("run-fail");
    fs::write(dir.join("prog.mudra"), "print(1)\nmissing\n").unwrap();

    mudra()
        .arg("run")
        .arg(dir.join("prog.mudra"))
        .assert()
        .failure()
        .stderr(contains("mudra::"));
}

#[test]
fn expand_prints_the_rewritten_program_without_running_it() {
    let dir = fixture_dir("expand");
    fs::write(dir.join("util.mudra"), "macro twice(x): x + x\n").unwrap();
    fs::write(
        dir.join("prog.mudra"),
        "from util import macros, twice\nprint(twice(4))\n",
    )
    .unwrap();

    mudra()
        .arg("expand")
        .arg(dir.join("prog.mudra"))
        .assert()
        .success()
        .stdout(
            contains("print(4 + 4)")
                .and(contains("from util").not())
                .and(contains("8").not()),
        );
}

#[test]
fn expand_trace_shows_each_rewrite_step() {
    let dir = fixture_dir("trace");
    fs::write(dir.join("util.mudra"), "macro twice(x): x + x\n").unwrap();
    fs::write(
        dir.join("prog.mudra"),
        "from util import macros, twice\ntwice(21)\n",
    )
    .unwrap();

    mudra()
        .arg("expand")
        .arg(dir.join("prog.mudra"))
        .arg("--trace")
        .assert()
        .success()
        .stdout(contains("--- step 1: twice ---").and(contains("21 + 21")));
}

#[test]
fn piped_input_runs_without_prompts_or_banner() {
    mudra()
        .write_stdin("x = 20\nx + 1\n")
        .assert()
        .success()
        .stdout(contains("21").and(contains("mudra>").not()).and(contains("Mudra").not()));
}

#[test]
fn unreadable_program_files_are_reported() {
    mudra()
        .arg("run")
        .arg("/nonexistent/prog.mudra")
        .assert()
        .failure()
        .stderr(contains("prog.mudra"));
}
