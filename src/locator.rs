//! Address-to-record resolution.
//!
//! Given the lines of a HEX file and a target [`Address`], find the 1-based
//! line number of the record whose payload interval contains the target.
//!
//! - Flat addresses scan the whole file.
//! - Linear addresses first find the Extended Linear Address record for the
//!   page, then scan only the Data records that follow it, stopping at the
//!   first record that is neither Data nor that same page marker.
//!
//! In both modes only Data records are candidates, so a page or segment
//! record sitting at address `0000` never captures an offset. A candidate must
//! also share its high address byte with the target, at either end of its
//! interval; this is a coarse pre-filter and never rejects a record that holds
//! the target. Intervals include their upper bound (see [`Record::contains`]).
//! The first match in file order wins.

use crate::address::Address;
use crate::record::{FormatError, Record};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocateError {
    #[error("no record contains address {address}")]
    AddressNotFound { address: Address },

    #[error("malformed record on line {line}: {source}")]
    Format {
        line: usize,
        #[source]
        source: FormatError,
    },
}

/// A resolved record and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    /// 1-based line number
    pub line: usize,
    pub record: Record,
}

/// Resolve `target` to the record containing it.
pub fn locate<'a, I>(lines: I, target: Address) -> Result<Located, LocateError>
where
    I: IntoIterator<Item = &'a str>,
{
    let found = match target {
        Address::Flat(offset) => locate_flat(lines, offset)?,
        Address::Linear { page, offset } => locate_linear(lines, page, offset)?,
    };
    found.ok_or(LocateError::AddressNotFound { address: target })
}

fn locate_flat<'a, I>(lines: I, offset: u16) -> Result<Option<Located>, LocateError>
where
    I: IntoIterator<Item = &'a str>,
{
    for (idx, text) in lines.into_iter().enumerate() {
        let line = idx + 1;
        let record = parse_line(text, line)?;
        if record.is_data() && is_match(&record, offset) {
            return Ok(Some(Located { line, record }));
        }
    }
    Ok(None)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PageScope {
    /// Page marker not seen yet
    Searching,
    /// Inside the records following the page marker
    Inside,
}

fn locate_linear<'a, I>(lines: I, page: u16, offset: u16) -> Result<Option<Located>, LocateError>
where
    I: IntoIterator<Item = &'a str>,
{
    let marker = Record::extended_linear_address(page).to_line();
    let mut scope = PageScope::Searching;

    for (idx, text) in lines.into_iter().enumerate() {
        let line = idx + 1;
        let is_marker = text.trim().eq_ignore_ascii_case(&marker);

        match scope {
            PageScope::Searching => {
                if is_marker {
                    scope = PageScope::Inside;
                }
            }
            PageScope::Inside => {
                if is_marker {
                    continue;
                }
                let record = parse_line(text, line)?;
                if !record.is_data() {
                    break;
                }
                if is_match(&record, offset) {
                    return Ok(Some(Located { line, record }));
                }
            }
        }
    }

    Ok(None)
}

/// Coarse high-byte filter, then the inclusive interval test.
///
/// The filter looks at both the first address and the inclusive end, so a
/// record straddling a 0x100 boundary still matches targets past it.
fn is_match(record: &Record, offset: u16) -> bool {
    let start = u32::from(record.address);
    let end = start + record.len() as u32;
    let target_high = u32::from(offset) >> 8;
    (target_high == start >> 8 || target_high == end >> 8) && record.contains(offset)
}

fn parse_line(text: &str, line: usize) -> Result<Record, LocateError> {
    Record::parse(text).map_err(|source| LocateError::Format { line, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAT: &[&str] = &[
        ":10000000000102030405060708090A0B0C0D0E0F78",
        ":10001000101112131415161718191A1B1C1D1E1F68",
        ":00000001FF",
    ];

    const PAGED: &[&str] = &[
        ":020000040000FA",
        ":10002000000102030405060708090A0B0C0D0E0F58",
        ":020000041000EA",
        ":10002000202122232425262728292A2B2C2D2E2F58",
        ":10003000303132333435363738393A3B3C3D3E3F48",
        ":020000042000DA",
        ":10004000404142434445464748494A4B4C4D4E4F38",
        ":00000001FF",
    ];

    fn line_of(lines: &[&str], addr: &str) -> Result<usize, LocateError> {
        locate(lines.iter().copied(), addr.parse().unwrap()).map(|found| found.line)
    }

    #[test]
    fn test_flat_exact_start() {
        assert_eq!(line_of(FLAT, "0000").unwrap(), 1);
        assert_eq!(line_of(FLAT, "0011").unwrap(), 2);
    }

    #[test]
    fn test_flat_inclusive_upper_bound() {
        // 0x0010 is one past record 1 and also the start of record 2; file order wins
        assert_eq!(line_of(FLAT, "0010").unwrap(), 1);
        assert_eq!(line_of(FLAT, "0020").unwrap(), 2);
    }

    #[test]
    fn test_flat_not_found() {
        let err = line_of(FLAT, "0021").unwrap_err();
        assert_eq!(
            err,
            LocateError::AddressNotFound {
                address: Address::Flat(0x0021)
            }
        );
        assert!(line_of(FLAT, "1000").is_err());
    }

    #[test]
    fn test_flat_skips_non_data_records_at_offset_zero() {
        assert_eq!(line_of(PAGED, "0020").unwrap(), 2);
    }

    #[test]
    fn test_flat_record_straddling_high_byte() {
        // 0x00F8..=0x0108 crosses into the 0x01xx block
        let lines = [":1000F800000102030405060708090A0B0C0D0E0F80"];
        assert_eq!(line_of(&lines, "00FC").unwrap(), 1);
        assert_eq!(line_of(&lines, "0104").unwrap(), 1);
        assert_eq!(line_of(&lines, "0108").unwrap(), 1);
        assert!(line_of(&lines, "0109").is_err());
    }

    #[test]
    fn test_end_of_record_on_block_boundary() {
        let lines = [":1000F000000102030405060708090A0B0C0D0E0F88", ":00000001FF"];
        assert_eq!(line_of(&lines, "0100").unwrap(), 1);
        assert!(line_of(&lines, "0101").is_err());
    }

    #[test]
    fn test_linear_record_straddling_high_byte() {
        let lines = [":020000041000EA", ":1000F800000102030405060708090A0B0C0D0E0F80"];
        assert_eq!(line_of(&lines, "10000104").unwrap(), 2);
    }

    #[test]
    fn test_linear_only_matches_inside_page() {
        assert_eq!(line_of(PAGED, "10000020").unwrap(), 4);
        assert_eq!(line_of(PAGED, "10000035").unwrap(), 5);
        assert_eq!(line_of(PAGED, "00000020").unwrap(), 2);
        assert_eq!(line_of(PAGED, "20000040").unwrap(), 7);
    }

    #[test]
    fn test_linear_scope_stops_at_next_page() {
        // 0x0045 exists only under page 0x2000
        assert!(matches!(
            line_of(PAGED, "10000045"),
            Err(LocateError::AddressNotFound { .. })
        ));
    }

    #[test]
    fn test_linear_missing_page() {
        assert_eq!(
            line_of(PAGED, "30000020").unwrap_err(),
            LocateError::AddressNotFound {
                address: Address::linear(0x3000_0020)
            }
        );
    }

    #[test]
    fn test_linear_marker_match_is_case_insensitive() {
        let lines = [":020000041a00e0", ":10000000000102030405060708090A0B0C0D0E0F78"];
        assert_eq!(line_of(&lines, "1A000004").unwrap(), 2);
    }

    #[test]
    fn test_format_error_reports_line() {
        let lines = [":10000000000102030405060708090A0B0C0D0E0F78", "garbage"];
        let err = line_of(&lines, "0030").unwrap_err();
        assert!(matches!(err, LocateError::Format { line: 2, .. }));
    }

    #[test]
    fn test_lines_before_page_marker_are_not_parsed() {
        let lines = ["not a record", ":020000041000EA", ":10000000000102030405060708090A0B0C0D0E0F78"];
        assert_eq!(line_of(&lines, "10000008").unwrap(), 3);
    }
}
