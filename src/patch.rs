//! Byte-range replacement across HEX records.
//!
//! A [`HexPatch`] overwrites `data.len()` bytes starting at a target address.
//! The affected records are resolved with the locator, their payloads are
//! concatenated, the new bytes are spliced in, and the buffer is cut back
//! into the original record sizes. Record count, order, addresses, types and
//! lengths never change; only payload bytes and checksums do. Every line
//! outside the patch range is written back untouched.
//!
//! Nothing is written until the whole replacement has been computed, and the
//! write itself is a single atomic rename.

use crate::address::Address;
use crate::file::{atomic_write, FileError, HexFile};
use crate::locator::LocateError;
use crate::record::{encode_hex_bytes, FormatError, Record};
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("no record contains address {address}")]
    AddressNotFound { address: Address },

    #[error("malformed record on line {line}: {source}")]
    Format {
        line: usize,
        #[source]
        source: FormatError,
    },

    #[error("patch of {len} bytes at {address} leaves the records of its page: {reason}")]
    RangeCrossesPage {
        address: Address,
        len: usize,
        reason: &'static str,
    },

    #[error("record on line {line} does not start where the previous record ends")]
    RangeNotContiguous { line: usize },

    #[error("bytes at {address} do not match the expected original (found {found})")]
    BeforeBytesMismatch { address: Address, found: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<LocateError> for PatchError {
    fn from(e: LocateError) -> Self {
        match e {
            LocateError::AddressNotFound { address } => PatchError::AddressNotFound { address },
            LocateError::Format { line, source } => PatchError::Format { line, source },
        }
    }
}

impl From<FileError> for PatchError {
    fn from(e: FileError) -> Self {
        match e {
            FileError::Io { path, source } => PatchError::Io { path, source },
            FileError::Format { line, source } => PatchError::Format { line, source },
        }
    }
}

/// What the bytes under the patch must look like before it is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchVerification {
    /// Exact byte match required
    ExactMatch(Vec<u8>),
    /// xxh3 hash of the expected bytes
    Hash(u64),
}

impl PatchVerification {
    pub fn matches(&self, bytes: &[u8]) -> bool {
        match self {
            PatchVerification::ExactMatch(expected) => bytes == expected.as_slice(),
            PatchVerification::Hash(expected) => xxh3_64(bytes) == *expected,
        }
    }

    /// Create verification from bytes, hashing anything over 1KB.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.len() > 1024 {
            PatchVerification::Hash(xxh3_64(bytes))
        } else {
            PatchVerification::ExactMatch(bytes.to_vec())
        }
    }
}

/// Result of applying a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchOutcome should be checked for applied/already-applied"]
pub enum PatchOutcome {
    /// Lines `start_line..=end_line` were rewritten
    Applied {
        file: PathBuf,
        start_line: usize,
        end_line: usize,
        original_lines: Vec<String>,
        new_lines: Vec<String>,
    },
    /// The target bytes already held the new data; nothing was written
    AlreadyApplied { file: PathBuf },
}

/// A fully computed replacement, not yet written anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchPlan {
    pub start_line: usize,
    pub end_line: usize,
    /// The range already holds the new data
    pub already_applied: bool,
    /// Bytes currently stored where the new data goes
    pub original: Vec<u8>,
    /// Lines `start_line..=end_line` as they are now
    pub original_lines: Vec<String>,
    /// Their re-encoded replacements
    pub new_lines: Vec<String>,
    content: String,
}

impl PatchPlan {
    /// Complete new file content.
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Overwrite bytes of a HEX file starting at `address`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "HexPatch does nothing until apply() is called"]
pub struct HexPatch {
    pub file: PathBuf,
    pub address: Address,
    pub data: Vec<u8>,
    /// Optional check of the bytes being replaced
    pub expected_before: Option<PatchVerification>,
}

impl HexPatch {
    pub fn new(file: impl Into<PathBuf>, address: Address, data: impl Into<Vec<u8>>) -> Self {
        Self {
            file: file.into(),
            address,
            data: data.into(),
            expected_before: None,
        }
    }

    pub fn with_verification(mut self, verification: PatchVerification) -> Self {
        self.expected_before = Some(verification);
        self
    }

    /// Compute the replacement against `hex` without touching the disk.
    pub fn plan(&self, hex: &HexFile) -> Result<PatchPlan, PatchError> {
        let len = self.data.len();
        let start = hex.locate(self.address)?;

        let end_address = self.end_lookup_address()?;
        let end = hex.locate(end_address).map_err(|e| match e {
            LocateError::AddressNotFound { .. } => self.crosses_page("end address has no record"),
            other => other.into(),
        })?;

        if end.line < start.line {
            return Err(self.crosses_page("end record precedes start record"));
        }

        let records = hex.records_between(start.line, end.line)?;
        check_contiguous(&records, start.line).map_err(|e| match e {
            RangeIssue::NotData => self.crosses_page("range contains a non-data record"),
            RangeIssue::Gap { line } => PatchError::RangeNotContiguous { line },
        })?;

        let mut buffer: Vec<u8> = records.iter().flat_map(|r| r.data().iter().copied()).collect();
        let insertion = usize::from(self.address.offset() - records[0].address);
        if insertion + len > buffer.len() {
            return Err(self.crosses_page("patch runs past the last record"));
        }

        let original = buffer[insertion..insertion + len].to_vec();
        buffer[insertion..insertion + len].copy_from_slice(&self.data);

        let mut new_lines = Vec::with_capacity(records.len());
        let mut rest = buffer.as_slice();
        for (idx, record) in records.iter().enumerate() {
            let (segment, tail) = rest.split_at(record.len());
            rest = tail;
            let encoded = Record::new(record.address, record.kind, segment.to_vec()).map_err(
                |source| PatchError::Format {
                    line: start.line + idx,
                    source,
                },
            )?;
            new_lines.push(encoded.to_line());
        }

        let original_lines = (start.line..=end.line)
            .filter_map(|line| hex.line(line))
            .map(str::to_string)
            .collect();
        let content = hex.replace_lines(start.line, end.line, &new_lines);

        Ok(PatchPlan {
            start_line: start.line,
            end_line: end.line,
            already_applied: original == self.data,
            original,
            original_lines,
            new_lines,
            content,
        })
    }

    /// Plan against the file on disk, including the before-bytes check,
    /// without writing anything.
    pub fn check(&self) -> Result<PatchPlan, PatchError> {
        let hex = HexFile::read(&self.file)?;
        let plan = self.plan(&hex)?;
        if !plan.already_applied {
            self.verify_before(&plan.original)?;
        }
        Ok(plan)
    }

    /// Apply this patch to the file system atomically.
    pub fn apply(&self) -> Result<PatchOutcome, PatchError> {
        let plan = self.check()?;
        if plan.already_applied {
            return Ok(PatchOutcome::AlreadyApplied {
                file: self.file.clone(),
            });
        }

        atomic_write(&self.file, plan.content().as_bytes()).map_err(|source| PatchError::Io {
            path: self.file.clone(),
            source,
        })?;

        Ok(PatchOutcome::Applied {
            file: self.file.clone(),
            start_line: plan.start_line,
            end_line: plan.end_line,
            original_lines: plan.original_lines,
            new_lines: plan.new_lines,
        })
    }

    fn verify_before(&self, original: &[u8]) -> Result<(), PatchError> {
        match &self.expected_before {
            Some(verification) if !verification.matches(original) => {
                Err(PatchError::BeforeBytesMismatch {
                    address: self.address,
                    found: encode_hex_bytes(original),
                })
            }
            _ => Ok(()),
        }
    }

    /// Address just past the patched bytes, in the start address's page.
    ///
    /// A patch ending exactly at the top of the page looks up its last byte
    /// instead, since the next offset is not representable.
    fn end_lookup_address(&self) -> Result<Address, PatchError> {
        let end = u32::from(self.address.offset()) + self.data.len() as u32;
        match end {
            0..=0xFFFF => Ok(self.address.with_offset(end as u16)),
            0x10000 => Ok(self.address.with_offset(0xFFFF)),
            _ => Err(self.crosses_page("end address overflows the 16-bit offset")),
        }
    }

    fn crosses_page(&self, reason: &'static str) -> PatchError {
        PatchError::RangeCrossesPage {
            address: self.address,
            len: self.data.len(),
            reason,
        }
    }
}

/// Replace bytes starting at `address` in the HEX file at `path`.
pub fn replace(
    path: impl AsRef<Path>,
    address: Address,
    data: &[u8],
) -> Result<PatchOutcome, PatchError> {
    HexPatch::new(path.as_ref(), address, data).apply()
}

enum RangeIssue {
    NotData,
    Gap { line: usize },
}

/// The records must all be Data and each must start where the previous ends.
fn check_contiguous(records: &[Record], first_line: usize) -> Result<(), RangeIssue> {
    if records.iter().any(|r| !r.is_data()) {
        return Err(RangeIssue::NotData);
    }
    for (idx, pair) in records.windows(2).enumerate() {
        let expected = u32::from(pair[0].address) + pair[0].len() as u32;
        if u32::from(pair[1].address) != expected {
            return Err(RangeIssue::Gap {
                line: first_line + idx + 1,
            });
        }
    }
    Ok(())
}
