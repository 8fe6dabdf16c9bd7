//! Rebuild-yourself protocol tests. The "compiler" is a shell script and
//! the "binary" an ordinary file, so the recompile/rollback mechanics can
//! be exercised without ever replacing the test process itself.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use mason::{Bootstrap, Error};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

/// Invoked as `<script> [flags...] -o <binary> <source>`; "compiles" by
/// copying the source over the binary and logs its arguments.
fn fake_compiler(dir: &Path) -> String {
    write_script(
        dir,
        "fakecc",
        concat!(
            "log=\"$(dirname \"$0\")/compiler.log\"\n",
            "echo \"$@\" >> \"$log\"\n",
            "while [ \"$1\" != \"-o\" ]; do shift; done\n",
            "cp \"$3\" \"$2\"\n",
        ),
    )
    .display()
    .to_string()
}

fn tick() {
    thread::sleep(Duration::from_millis(25));
}

/// A stale binary/source pair: the source was modified after the binary
/// was produced.
fn stale_pair(dir: &Path) -> (PathBuf, PathBuf) {
    let binary = dir.join("program");
    let source = dir.join("program.src");
    fs::write(&binary, "old binary\n").unwrap();
    tick();
    fs::write(&source, "new source\n").unwrap();
    (binary, source)
}

#[test]
fn recompiles_a_stale_binary_and_keeps_a_backup() {
    let dir = tempfile::tempdir().unwrap();
    let cc = fake_compiler(dir.path());
    let (binary, source) = stale_pair(dir.path());

    Bootstrap::new(&source)
        .binary(&binary)
        .compiler([cc])
        .recompile()
        .unwrap();

    assert_eq!(fs::read_to_string(&binary).unwrap(), "new source\n");
    assert_eq!(
        fs::read_to_string(dir.path().join("program.old")).unwrap(),
        "old binary\n"
    );
}

#[test]
fn failed_recompile_restores_the_previous_binary() {
    let dir = tempfile::tempdir().unwrap();
    let bad_cc = write_script(dir.path(), "badcc", "exit 4\n")
        .display()
        .to_string();
    let (binary, source) = stale_pair(dir.path());

    let err = Bootstrap::new(&source)
        .binary(&binary)
        .compiler([bad_cc])
        .recompile()
        .unwrap_err();

    match err {
        Error::Recompile { status } => assert_eq!(status.code(), Some(4)),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fs::read_to_string(&binary).unwrap(), "old binary\n");
    assert!(!dir.path().join("program.old").exists());
}

#[test]
fn fresh_binary_skips_the_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let cc = fake_compiler(dir.path());
    let source = dir.path().join("program.src");
    let binary = dir.path().join("program");
    fs::write(&source, "source\n").unwrap();
    tick();
    fs::write(&binary, "binary\n").unwrap();

    // The guard returns instead of re-executing: the binary is untouched
    // and no backup appears.
    Bootstrap::new(&source)
        .binary(&binary)
        .compiler([cc])
        .rebuild_yourself()
        .unwrap();
    assert_eq!(fs::read_to_string(&binary).unwrap(), "binary\n");
    assert!(!dir.path().join("program.old").exists());
    assert!(!dir.path().join("compiler.log").exists());
}

#[test]
fn watched_inputs_also_trigger_recompilation() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("program.src");
    let binary = dir.path().join("program");
    fs::write(&source, "source\n").unwrap();
    tick();
    fs::write(&binary, "binary\n").unwrap();
    tick();
    let module = dir.path().join("helpers.src");
    fs::write(&module, "helper module\n").unwrap();

    // Fresh relative to its own source, stale through the watched module.
    // The freshness decision is probed directly since the stale path of
    // `rebuild_yourself` replaces the running process.
    let fresh = Bootstrap::new(&source).binary(&binary);
    assert!(!fresh.needs_rebuild().unwrap());
    let watched = Bootstrap::new(&source).binary(&binary).watch(&module);
    assert!(watched.needs_rebuild().unwrap());
}

#[test]
fn stage_flags_join_the_recompile_command_once_the_marker_exists() {
    let dir = tempfile::tempdir().unwrap();
    let cc = fake_compiler(dir.path());
    let (binary, source) = stale_pair(dir.path());

    let bootstrap = Bootstrap::new(&source)
        .binary(&binary)
        .compiler([cc.clone()])
        .stage(dir.path().join("args.def"), ["--cfg", "with_cli"]);
    bootstrap.recompile().unwrap();

    fs::write(dir.path().join("args.def"), "clean\njobs\n").unwrap();
    tick();
    fs::write(&source, "newer source\n").unwrap();
    bootstrap.recompile().unwrap();

    let log = fs::read_to_string(dir.path().join("compiler.log")).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(!lines[0].contains("--cfg with_cli"));
    assert!(lines[1].contains("--cfg with_cli"));
}
