//! In-memory snapshot of a HEX file and the atomic write that replaces it.
//!
//! Lines keep their own terminators so that a rewrite reproduces every
//! untouched line byte-for-byte, whatever mix of `\n` and `\r\n` it uses.

use crate::address::Address;
use crate::locator::{self, LocateError, Located};
use crate::record::{FormatError, Record};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed record on line {line}: {source}")]
    Format {
        line: usize,
        #[source]
        source: FormatError,
    },
}

/// A record whose stored checksum does not satisfy the checksum law.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumMismatch {
    pub line: usize,
    pub expected: u8,
    pub found: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    text: String,
    ending: String,
}

/// The full contents of one HEX file, split into lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexFile {
    path: Option<PathBuf>,
    lines: Vec<Line>,
}

impl HexFile {
    /// Read the whole file at `path`.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, FileError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| FileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut file = Self::parse(&content);
        file.path = Some(path.to_path_buf());
        Ok(file)
    }

    /// Build from text that did not come from disk.
    pub fn parse(content: &str) -> Self {
        let lines = content
            .split_inclusive('\n')
            .map(|raw| {
                let text = raw.trim_end_matches(['\r', '\n']);
                Line {
                    text: text.to_string(),
                    ending: raw[text.len()..].to_string(),
                }
            })
            .collect();
        Self { path: None, lines }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of lines (= number of records in a well-formed file).
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line text without its terminator. `number` is 1-based.
    pub fn line(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|idx| self.lines.get(idx))
            .map(|line| line.text.as_str())
    }

    /// All line texts in file order, terminators stripped.
    pub fn lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.lines.iter().map(|line| line.text.as_str())
    }

    /// Parse every line, yielding `(line_number, record)`.
    pub fn records(&self) -> impl Iterator<Item = Result<(usize, Record), FileError>> + '_ {
        self.lines().enumerate().map(|(idx, text)| {
            let line = idx + 1;
            Record::parse(text)
                .map(|record| (line, record))
                .map_err(|source| FileError::Format { line, source })
        })
    }

    /// Parse lines `start..=end` (1-based).
    pub fn records_between(&self, start: usize, end: usize) -> Result<Vec<Record>, FileError> {
        (start..=end)
            .map(|line| {
                let text = self.line(line).unwrap_or_default();
                Record::parse(text).map_err(|source| FileError::Format { line, source })
            })
            .collect()
    }

    /// Resolve `target` to the line holding it.
    pub fn locate(&self, target: Address) -> Result<Located, LocateError> {
        locator::locate(self.lines(), target)
    }

    /// Every line whose checksum is wrong.
    pub fn verify(&self) -> Result<Vec<ChecksumMismatch>, FileError> {
        let mut mismatches = Vec::new();
        for entry in self.records() {
            let (line, record) = entry?;
            if !record.checksum_ok() {
                mismatches.push(ChecksumMismatch {
                    line,
                    expected: record.expected_checksum(),
                    found: record.checksum,
                });
            }
        }
        Ok(mismatches)
    }

    /// New file content with lines `start..=end` replaced by `new_lines`.
    ///
    /// Replacement lines reuse the terminators of the lines they replace, in
    /// order. `new_lines` must hold exactly `end - start + 1` entries.
    pub fn replace_lines(&self, start: usize, end: usize, new_lines: &[String]) -> String {
        let mut out = String::with_capacity(self.content_len());
        let mut replacements = new_lines.iter();

        for (idx, line) in self.lines.iter().enumerate() {
            let number = idx + 1;
            let text = if (start..=end).contains(&number) {
                replacements.next().map(String::as_str).unwrap_or(&line.text)
            } else {
                &line.text
            };
            out.push_str(text);
            out.push_str(&line.ending);
        }
        out
    }

    /// The file content exactly as read.
    pub fn content(&self) -> String {
        self.replace_lines(1, 0, &[])
    }

    fn content_len(&self) -> usize {
        self.lines
            .iter()
            .map(|line| line.text.len() + line.ending.len())
            .sum()
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full new content lands at `path` or the old file is left as it was.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    // Tempfile must live on the same filesystem for rename to be atomic
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path has no parent directory",
            ))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    // Keep the original file's permissions
    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = ":10000000000102030405060708090A0B0C0D0E0F78\r\n\
                          :10001000101112131415161718191A1B1C1D1E1F68\n\
                          :00000001FF";

    #[test]
    fn test_parse_preserves_content() {
        let file = HexFile::parse(SAMPLE);
        assert_eq!(file.len(), 3);
        assert_eq!(file.content(), SAMPLE);
        assert_eq!(file.line(3), Some(":00000001FF"));
        assert_eq!(file.line(0), None);
        assert_eq!(file.line(4), None);
    }

    #[test]
    fn test_trailing_newline_is_not_a_line() {
        let file = HexFile::parse(":00000001FF\n");
        assert_eq!(file.len(), 1);
        assert_eq!(file.content(), ":00000001FF\n");
    }

    #[test]
    fn test_replace_lines_keeps_terminators() {
        let file = HexFile::parse(SAMPLE);
        let out = file.replace_lines(1, 1, &[":NEW".to_string()]);
        assert_eq!(
            out,
            ":NEW\r\n:10001000101112131415161718191A1B1C1D1E1F68\n:00000001FF"
        );
    }

    #[test]
    fn test_records_reports_bad_line() {
        let file = HexFile::parse(":00000001FF\nnonsense\n");
        let results: Vec<_> = file.records().collect();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(FileError::Format { line: 2, .. })));
    }

    #[test]
    fn test_verify_finds_bad_checksums() {
        let file = HexFile::parse(
            ":10000000000102030405060708090A0B0C0D0E0F00\n:00000001FF\n",
        );
        let mismatches = file.verify().unwrap();
        assert_eq!(
            mismatches,
            vec![ChecksumMismatch {
                line: 1,
                expected: 0x78,
                found: 0x00
            }]
        );
    }

    #[test]
    fn test_read_and_atomic_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("image.hex");
        fs::write(&path, SAMPLE).unwrap();

        let file = HexFile::read(&path).unwrap();
        assert_eq!(file.path(), Some(path.as_path()));

        atomic_write(&path, b":00000001FF\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), ":00000001FF\n");
    }

    #[test]
    fn test_read_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = HexFile::read(temp_dir.path().join("missing.hex")).unwrap_err();
        assert!(matches!(err, FileError::Io { .. }));
    }
}
