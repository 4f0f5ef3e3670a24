use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use rstest::rstest;
use tempfile::TempDir;

fn write_config(dir: &Path, yaml: &str) -> String {
    let path = dir.join("rustwasm.yaml");
    std::fs::write(&path, yaml).unwrap();
    path.to_str().unwrap().to_string()
}

fn staging_config(dir: &Path, extra: &str) -> String {
    let stage = dir.join("stage");
    write_config(
        dir,
        &format!("staging_dir: {}\n{}", stage.display(), extra),
    )
}

#[rstest]
#[case("notes.txt")]
#[case("Cargo.lock")]
#[case("lib.rs.bak")]
fn test_unsupported_input_is_rejected(#[case] source: &str) {
    let dir = TempDir::new().unwrap();
    let config = staging_config(dir.path(), "");

    cargo_bin_cmd!("rustwasm")
        .args(["--config", &config, "build", source])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported input"));

    assert!(!dir.path().join("stage").exists());
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "toolchain:\n  timeout_secs: 0\n");

    cargo_bin_cmd!("rustwasm")
        .args(["--config", &config, "clean"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("timeout_secs"));
}

#[test]
fn test_missing_compiler_fails_the_build() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("add.rs");
    std::fs::write(&source, "pub fn add(a: i32, b: i32) -> i32 { a + b }\n").unwrap();
    let config = staging_config(
        dir.path(),
        "toolchain:\n  rustc: rustwasm-no-such-compiler\n",
    );

    cargo_bin_cmd!("rustwasm")
        .args(["--config", &config, "build", source.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rustwasm-no-such-compiler"));

    assert!(!dir.path().join("stage/add.wasm").exists());
}

#[test]
fn test_clean_removes_only_staged_binaries() {
    let dir = TempDir::new().unwrap();
    let stage = dir.path().join("stage");
    std::fs::create_dir_all(&stage).unwrap();
    std::fs::write(stage.join("add.wasm"), b"\0asm").unwrap();
    std::fs::write(stage.join("add_crate.wasm"), b"\0asm").unwrap();
    std::fs::write(stage.join("notes.txt"), "keep").unwrap();
    let config = staging_config(dir.path(), "");

    cargo_bin_cmd!("rustwasm")
        .args(["--config", &config, "clean"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed 2 staged binaries"));

    assert!(!stage.join("add.wasm").exists());
    assert!(!stage.join("add_crate.wasm").exists());
    assert!(stage.join("notes.txt").exists());
}

#[test]
fn test_clean_without_staging_dir() {
    let dir = TempDir::new().unwrap();
    let config = staging_config(dir.path(), "");

    cargo_bin_cmd!("rustwasm")
        .args(["--config", &config, "clean"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed 0 staged binaries"));
}

#[cfg(unix)]
mod with_fake_compiler {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// A compiler that writes a wasm header to its last argument
    fn fake_rustc(dir: &Path) -> String {
        let path = dir.join("fake-rustc");
        std::fs::write(
            &path,
            "#!/bin/sh\nfor last; do :; done\nprintf '\\000asm\\001\\000\\000\\000' > \"$last\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn setup() -> (TempDir, String, String) {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("add.rs");
        std::fs::write(&source, "pub fn add(a: i32, b: i32) -> i32 { a + b }\n").unwrap();
        let rustc = fake_rustc(dir.path());
        let config = staging_config(
            dir.path(),
            &format!("toolchain:\n  rustc: {}\nsize_reducer:\n  program: \"true\"\n", rustc),
        );
        (dir, config, source.to_str().unwrap().to_string())
    }

    #[test]
    fn test_build_prints_stub() {
        let (dir, config, source) = setup();
        let binary = dir.path().join("stage/add.wasm");

        cargo_bin_cmd!("rustwasm")
            .args(["--config", &config, "build", &source])
            .assert()
            .success()
            .stdout(predicate::str::contains("WebAssembly.instantiate"))
            .stdout(predicate::str::contains(binary.to_str().unwrap()));

        assert!(binary.exists());
    }

    #[test]
    fn test_build_writes_stub_to_file() {
        let (dir, config, source) = setup();
        let out = dir.path().join("add.js");

        cargo_bin_cmd!("rustwasm")
            .args(["--config", &config, "build", &source, "--out", out.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());

        let stub = std::fs::read_to_string(out).unwrap();
        assert!(stub.contains("fetch("));
    }

    #[test]
    fn test_bytes_payload() {
        let (dir, _, source) = setup();
        let rustc = dir.path().join("fake-rustc");
        let config = staging_config(
            dir.path(),
            &format!(
                "toolchain:\n  rustc: {}\nsize_reducer:\n  program: \"true\"\nstub:\n  payload: bytes\n",
                rustc.display()
            ),
        );

        cargo_bin_cmd!("rustwasm")
            .args(["--config", &config, "build", &source])
            .assert()
            .success()
            .stdout(predicate::str::contains("arrayBuffer()"))
            .stdout(predicate::str::contains("WebAssembly.instantiate").not());
    }
}
