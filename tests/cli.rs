use assert_cmd::Command;
use deltachain::digest;
use deltachain_test_utils::*;
use predicates::prelude::*;
use std::fs;
use std::path;

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        Workspace {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn file(&self, name: &str, bytes: &[u8]) -> path::PathBuf {
        let p = self.dir.path().join(name);
        fs::write(p.as_path(), bytes).unwrap();
        p
    }

    fn path(&self, name: &str) -> path::PathBuf {
        self.dir.path().join(name)
    }
}

fn deltapatch() -> Command {
    let mut cmd = Command::cargo_bin("deltapatch").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd.args(&["--engine", "bsdiff"]);
    cmd
}

#[test]
fn writes_patched_file() {
    let ws = Workspace::new();
    let v0 = random_bytes(4096);
    let v1 = distort(&v0[..], 0.05, 100);
    let v2 = distort(&v1[..], 0.05, 100);
    let input = ws.file("base.bin", &v0[..]);
    let p1 = ws.file("1.delta", &bsdiff_container(&v0[..], &v1[..]).unwrap()[..]);
    let p2 = ws.file(
        "2.delta",
        &with_crc(&bsdiff_container(&v1[..], &v2[..]).unwrap()[..])[..],
    );
    let output = ws.path("patched.bin");

    deltapatch()
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg(&p1)
        .arg(&p2)
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied 2 patches successfully"))
        .stdout(predicate::str::contains(format!(
            "Final hash: {}",
            digest(&v2[..])
        )));

    assert_eq!(fs::read(&output).unwrap(), v2);
}

#[test]
fn dry_run_writes_nothing() {
    let ws = Workspace::new();
    let v0 = random_bytes(100);
    let v1 = distort(&v0[..], 0.2, 10);
    let input = ws.file("base.bin", &v0[..]);
    let p1 = ws.file("1.delta", &bsdiff_container(&v0[..], &v1[..]).unwrap()[..]);
    let output = ws.path("patched.bin");

    deltapatch()
        .args(&["-d", "-l", "-i"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg(&p1)
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied 1 patch successfully"))
        .stdout(predicate::str::contains(digest(&v1[..])));

    assert!(!output.exists());
}

#[test]
fn needs_output_or_dry_run() {
    let ws = Workspace::new();
    let input = ws.file("base.bin", b"base");
    let p1 = ws.file("1.delta", b"PA");

    deltapatch()
        .arg("-i")
        .arg(&input)
        .arg(&p1)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Either specify -d or -o"));
}

#[test]
fn corrupt_patch_exits_nonzero() {
    let ws = Workspace::new();
    let v0 = random_bytes(64);
    let v1 = distort(&v0[..], 0.5, 8);
    let input = ws.file("base.bin", &v0[..]);
    let mut container = with_crc(&bsdiff_container(&v0[..], &v1[..]).unwrap()[..]);
    let last = container.len() - 1;
    container[last] ^= 0xff;
    let p1 = ws.file("1.delta", &container[..]);
    let output = ws.path("patched.bin");

    deltapatch()
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg(&p1)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error: patch 0 is invalid"))
        .stderr(predicate::function(|err: &str| {
            err.matches("patch 0").count() == 1
        }));

    assert!(!output.exists());
}

#[test]
fn missing_input_exits_nonzero() {
    let ws = Workspace::new();
    let p1 = ws.file("1.delta", b"PA");

    deltapatch()
        .arg("-d")
        .arg("-i")
        .arg(ws.path("absent.bin"))
        .arg(&p1)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error: I/O error"));
}

#[test]
fn verbose_enables_debug_logging() {
    let ws = Workspace::new();
    let v0 = random_bytes(32);
    let v1 = distort(&v0[..], 0.2, 4);
    let input = ws.file("base.bin", &v0[..]);
    let p1 = ws.file("1.delta", &bsdiff_container(&v0[..], &v1[..]).unwrap()[..]);

    deltapatch()
        .args(&["-vv", "-d", "-i"])
        .arg(&input)
        .arg(&p1)
        .assert()
        .success()
        .stderr(predicate::str::contains("DEBUG"));

    deltapatch()
        .args(&["-d", "-i"])
        .arg(&input)
        .arg(&p1)
        .assert()
        .success()
        .stderr(predicate::str::contains("DEBUG").not());
}
