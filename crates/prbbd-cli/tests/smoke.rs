#![cfg(not(target_arch = "wasm32"))]

use std::process::{Command, Output};

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_prbbd"))
        .args(args)
        .env_remove("PRBBD_DEVICES")
        .env_remove("PRBBD_MODE")
        .env_remove("PRBBD_RAM_IMAGE")
        .env_remove("PRBBD_RAM_BASE")
        .env_remove("PRBBD_RAM_SIZE")
        .env_remove("PRBBD_LOG_LEVEL")
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run prbbd")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn publishes_and_verifies_in_both_modes() {
    for mode in ["bio", "request"] {
        let output = run(&[
            "--ram-base",
            "0x1000000",
            "--ram-size",
            "2M",
            "--device",
            "test,0x1000000,0x100000",
            "--device",
            "tail,0x1100000,4k",
            "--mode",
            mode,
            "--verify",
        ]);
        assert!(
            output.status.success(),
            "prbbd failed in {mode} mode:\n{}",
            stderr(&output)
        );

        let out = stdout(&output);
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("test\t"), "{out}");
        assert!(lines[0].contains("2048 sectors"), "{out}");
        assert!(lines[0].contains("chs 32/4/16"), "{out}");
        assert!(lines[1].starts_with("tail\t"), "{out}");
        assert!(lines[1].contains(":16\t"), "{out}");
        assert!(out.contains("test: ok"), "{out}");
        assert!(out.contains("tail: ok"), "{out}");
    }
}

#[test]
fn malformed_descriptor_fails_startup() {
    let output = run(&[
        "--ram-base",
        "0x1000000",
        "--ram-size",
        "1M",
        "--device",
        "a,0x1000000,4k",
        "--device",
        "b,0x1001000",
    ]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("not enough arguments"), "{err}");
    assert!(stdout(&output).is_empty());
}

#[test]
fn mapping_outside_the_window_fails_startup() {
    let output = run(&[
        "--ram-base",
        "0x1000000",
        "--ram-size",
        "1M",
        "--device",
        "far,0x8000000,4k",
    ]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("mapping failed"));
}

#[test]
fn ram_image_survives_a_verified_run() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let image = tmp.path().join("ram.img");
    let contents: Vec<u8> = (0..0x10000u32).map(|i| (i * 7) as u8).collect();
    std::fs::write(&image, &contents).unwrap();

    let output = run(&[
        "--ram-base",
        "0x1000000",
        "--ram-size",
        "0x20000",
        "--ram-image",
        image.to_str().expect("temp path should be UTF-8"),
        "--device",
        "keep,0x1000000,0x10000",
        "--verify",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));

    let saved = std::fs::read(&image).unwrap();
    assert_eq!(saved.len(), 0x20000);
    assert_eq!(&saved[..0x10000], &contents[..]);
    assert!(saved[0x10000..].iter().all(|&b| b == 0));
}
