//! Extended linear (32-bit) patching.

use super::{read_lines, write_image};
use hexpatch::{replace, Address, HexFile, PatchError};
use std::fs;
use tempfile::TempDir;

const IMAGE: &[&str] = &[
    ":020000041000EA",
    ":10000000000102030405060708090A0B0C0D0E0F78",
    ":10001000101112131415161718191A1B1C1D1E1F68",
    ":0400000500000100F6",
    ":00000001FF",
];

fn addr(text: &str) -> Address {
    text.parse().unwrap()
}

#[test]
fn test_replace_inside_page() {
    let dir = TempDir::new().unwrap();
    let path = write_image(dir.path(), "fw.hex", IMAGE, "\n");

    replace(&path, addr("10000004"), &[0xFF, 0xFF]).unwrap();

    let lines = read_lines(&path);
    assert_eq!(lines[0], IMAGE[0]);
    assert_eq!(lines[1], ":1000000000010203FFFF060708090A0B0C0D0E0F83");
    assert_eq!(&lines[2..], &IMAGE[2..]);
}

#[test]
fn test_replace_spanning_records_in_page() {
    let dir = TempDir::new().unwrap();
    let path = write_image(dir.path(), "fw.hex", IMAGE, "\n");

    replace(&path, addr("1000000E"), &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();

    let lines = read_lines(&path);
    assert_eq!(lines[0], IMAGE[0]);
    assert_eq!(lines[1], ":10000000000102030405060708090A0B0C0DDEAD0A");
    assert_eq!(lines[2], ":10001000BEEF12131415161718191A1B1C1D1E1FDC");
    assert_eq!(&lines[3..], &IMAGE[3..]);
    assert!(HexFile::read(&path).unwrap().verify().unwrap().is_empty());
}

#[test]
fn test_missing_page_is_not_found() {
    let dir = TempDir::new().unwrap();
    let path = write_image(dir.path(), "fw.hex", IMAGE, "\n");
    let before = fs::read(&path).unwrap();

    let err = replace(&path, addr("20000004"), &[0xFF, 0xFF]).unwrap_err();
    assert!(matches!(err, PatchError::AddressNotFound { .. }));
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_range_leaving_page_records_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_image(dir.path(), "fw.hex", IMAGE, "\n");
    let before = fs::read(&path).unwrap();

    let err = replace(&path, addr("1000001E"), &[0; 4]).unwrap_err();
    assert!(matches!(err, PatchError::RangeCrossesPage { .. }));
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_locate_stops_at_non_data_record() {
    let hex = HexFile::parse(&IMAGE.join("\n"));
    assert_eq!(hex.locate(addr("10000015")).unwrap().line, 3);

    // Data after the start linear address record is out of the page's scope
    let mut lines = IMAGE.to_vec();
    lines.insert(4, ":10004000404142434445464748494A4B4C4D4E4F38");
    let hex = HexFile::parse(&lines.join("\n"));
    assert!(hex.locate(addr("10000045")).is_err());
}

#[test]
fn test_flat_lookup_skips_page_marker() {
    let hex = HexFile::parse(&IMAGE.join("\n"));
    let found = hex.locate(addr("0000")).unwrap();
    assert_eq!(found.line, 2);
}

#[test]
fn test_lowercase_page_marker_matches() {
    let dir = TempDir::new().unwrap();
    let mut lines = IMAGE.to_vec();
    lines[0] = ":020000041000ea";
    let path = write_image(dir.path(), "fw.hex", &lines, "\n");

    replace(&path, addr("10000004"), &[0xFF, 0xFF]).unwrap();
    let out = read_lines(&path);
    assert_eq!(out[0], ":020000041000ea");
    assert_eq!(out[1], ":1000000000010203FFFF060708090A0B0C0D0E0F83");
}
