#![allow(dead_code)]

use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::NamedTempFile;

/// Address the test images load their code at.
pub const LOAD_ADDR: u32 = 0x1000_0000;

/// `mov eax, imm32; ret`
pub fn return_stub(value: i32) -> Vec<u8> {
    let mut code = vec![0xB8];
    code.extend_from_slice(&value.to_le_bytes());
    code.push(0xC3);
    code
}

pub fn write_image(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(bytes).expect("write image");
    file.flush().expect("flush image");
    file
}

pub fn elfrun<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_elfrun"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to spawn elfrun")
}

/// `flags` followed by the image path.
pub fn with_flags(flags: &[&str], path: &Path) -> Vec<OsString> {
    flags
        .iter()
        .map(OsString::from)
        .chain(std::iter::once(path.as_os_str().to_owned()))
        .collect()
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
