//! End-to-end tests of the elfrun binary.

mod common;

use common::*;
use elfrun_elf::{FileHeader, ImageBuilder};

#[test]
fn test_no_arguments() {
    let output = elfrun::<_, &str>([]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Usage"));
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_too_many_arguments() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let first = dir.path().join("a.elf");
    let second = dir.path().join("b.elf");

    let output = elfrun([&first, &second]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("Usage"));
    assert!(!err.contains("failed to open"));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let output = elfrun([dir.path().join("missing.elf")]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("failed to open"));
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_short_file_is_format_error() {
    let file = write_image(&[0x7F, b'E', b'L', b'F']);
    let output = elfrun([file.path()]);

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("invalid executable image: file header truncated"));
    assert!(!err.contains("failed to open"));
}

#[test]
fn test_table_past_end_of_file() {
    let mut bytes = ImageBuilder::new(LOAD_ADDR)
        .load(LOAD_ADDR, &return_stub(1), 0x1000)
        .build();
    let mut header = FileHeader::decode(bytes[..52].try_into().unwrap());
    header.program_header_offset = 0x40_0000;
    bytes[..52].copy_from_slice(&header.encode());
    let file = write_image(&bytes);

    let output = elfrun([file.path()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("program header table truncated"));
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_strict_rejects_non_elf() {
    let file = write_image(&[0u8; 64]);
    let output = elfrun(with_flags(&["--strict"], file.path()));

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("invalid ELF magic number"));
}

#[cfg(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64")))]
mod dispatch {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn test_reports_return_value() {
        let file = write_image(
            &ImageBuilder::new(LOAD_ADDR)
                .load(LOAD_ADDR, &return_stub(42), 0x1000)
                .build(),
        );

        let output = elfrun([file.path()]);
        assert!(output.status.success(), "stderr: {}", stderr(&output));
        assert_eq!(stdout(&output), "Entry point returned value = 42\n");
    }

    #[test]
    fn test_repeated_runs_agree() {
        // nop padding, then the stub at the entry address
        let mut code = vec![0x90; 0x10];
        code.extend(return_stub(-1234));
        let file = write_image(
            &ImageBuilder::new(LOAD_ADDR + 0x10)
                .load(LOAD_ADDR, &code, 0x4000)
                .build(),
        );

        let first = elfrun(with_flags(&["--format", "raw"], file.path()));
        let second = elfrun(with_flags(&["--format", "raw"], file.path()));
        assert_eq!(stdout(&first), "-1234\n");
        assert_eq!(stdout(&first), stdout(&second));
    }

    #[test]
    fn test_json_output() {
        let file = write_image(
            &ImageBuilder::new(LOAD_ADDR)
                .load(LOAD_ADDR, &return_stub(7), 0x1000)
                .build(),
        );

        let output = elfrun(with_flags(&["--format", "json"], file.path()));
        assert!(output.status.success(), "stderr: {}", stderr(&output));
        assert_eq!(stdout(&output), "{\"entry\":\"0x10000000\",\"value\":7}\n");
    }

    #[test]
    fn test_no_segments_still_dispatches() {
        // Nothing is mapped, so the call faults instead of returning.
        let file = write_image(&ImageBuilder::new(0x1000).build());

        let output = elfrun([file.path()]);
        assert!(!output.status.success());
        assert!(output.status.signal().is_some());
        assert!(stdout(&output).is_empty());
        assert!(!stderr(&output).contains("invalid executable image"));
    }
}
