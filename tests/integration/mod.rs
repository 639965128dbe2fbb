//! End-to-end patching of HEX images on disk.

mod extended;
mod replace;

use std::fs;
use std::path::{Path, PathBuf};

/// Write `lines` joined by `ending` (with a trailing terminator) into `dir`.
pub fn write_image(dir: &Path, name: &str, lines: &[&str], ending: &str) -> PathBuf {
    let path = dir.join(name);
    let mut content = lines.join(ending);
    content.push_str(ending);
    fs::write(&path, content).unwrap();
    path
}

pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}
