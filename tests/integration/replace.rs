//! Flat (16-bit) patching.

use super::{read_lines, write_image};
use hexpatch::{replace, Address, HexFile, HexPatch, PatchError, PatchOutcome, PatchVerification};
use std::fs;
use tempfile::TempDir;

const IMAGE: &[&str] = &[
    ":10000000000102030405060708090A0B0C0D0E0F78",
    ":10001000101112131415161718191A1B1C1D1E1F68",
    ":00000001FF",
];

fn addr(text: &str) -> Address {
    text.parse().unwrap()
}

#[test]
fn test_replace_two_bytes_in_first_record() {
    let dir = TempDir::new().unwrap();
    let path = write_image(dir.path(), "fw.hex", IMAGE, "\n");

    let outcome = replace(&path, addr("0004"), &[0xFF, 0xFF]).unwrap();
    assert_eq!(
        outcome,
        PatchOutcome::Applied {
            file: path.clone(),
            start_line: 1,
            end_line: 1,
            original_lines: vec![IMAGE[0].to_string()],
            new_lines: vec![":1000000000010203FFFF060708090A0B0C0D0E0F83".to_string()],
        }
    );

    let lines = read_lines(&path);
    assert_eq!(lines[0], ":1000000000010203FFFF060708090A0B0C0D0E0F83");
    assert_eq!(lines[1], IMAGE[1]);
    assert_eq!(lines[2], IMAGE[2]);
    assert!(HexFile::read(&path).unwrap().verify().unwrap().is_empty());
}

#[test]
fn test_replace_across_record_boundary() {
    let dir = TempDir::new().unwrap();
    let path = write_image(dir.path(), "fw.hex", IMAGE, "\n");

    replace(&path, addr("000E"), &[0xDE, 0xAD, 0xAA, 0xBB]).unwrap();

    let lines = read_lines(&path);
    assert_eq!(lines[0], ":10000000000102030405060708090A0B0C0DDEAD0A");
    assert_eq!(lines[1], ":10001000AABB12131415161718191A1B1C1D1E1F24");
    assert_eq!(lines[2], IMAGE[2]);
}

#[test]
fn test_replace_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = write_image(dir.path(), "fw.hex", IMAGE, "\n");

    replace(&path, addr("0004"), &[0xFF, 0xFF]).unwrap();
    let after_first = fs::read(&path).unwrap();

    let outcome = replace(&path, addr("0004"), &[0xFF, 0xFF]).unwrap();
    assert!(matches!(outcome, PatchOutcome::AlreadyApplied { .. }));
    assert_eq!(fs::read(&path).unwrap(), after_first);
}

#[test]
fn test_crlf_and_untouched_lines_preserved() {
    let dir = TempDir::new().unwrap();
    // Lowercase hex in an untouched record must survive as written
    let lines = [
        ":10000000000102030405060708090A0B0C0D0E0F78",
        ":10001000101112131415161718191a1b1c1d1e1f68",
        ":00000001FF",
    ];
    let path = write_image(dir.path(), "fw.hex", &lines, "\r\n");

    replace(&path, addr("0004"), &[0xFF, 0xFF]).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(
        content,
        ":1000000000010203FFFF060708090A0B0C0D0E0F83\r\n\
         :10001000101112131415161718191a1b1c1d1e1f68\r\n\
         :00000001FF\r\n"
    );
}

#[test]
fn test_patch_ending_at_top_of_address_space() {
    let dir = TempDir::new().unwrap();
    let path = write_image(
        dir.path(),
        "top.hex",
        &[":10FFF000000102030405060708090A0B0C0D0E0F89", ":00000001FF"],
        "\n",
    );

    replace(&path, addr("FFFF"), &[0x55]).unwrap();
    assert_eq!(
        read_lines(&path)[0],
        ":10FFF000000102030405060708090A0B0C0D0E5543"
    );
}

#[test]
fn test_failures_leave_file_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = write_image(dir.path(), "fw.hex", IMAGE, "\n");
    let before = fs::read(&path).unwrap();

    let err = replace(&path, addr("0400"), &[0x00]).unwrap_err();
    assert!(matches!(err, PatchError::AddressNotFound { .. }));

    let err = replace(&path, addr("001E"), &[0; 8]).unwrap_err();
    assert!(matches!(err, PatchError::RangeCrossesPage { .. }));

    let err = HexPatch::new(&path, addr("0004"), vec![0xFF])
        .with_verification(PatchVerification::ExactMatch(vec![0x00]))
        .apply()
        .unwrap_err();
    assert!(matches!(err, PatchError::BeforeBytesMismatch { .. }));

    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_verified_patch_applies() {
    let dir = TempDir::new().unwrap();
    let path = write_image(dir.path(), "fw.hex", IMAGE, "\n");

    let patch = HexPatch::new(&path, addr("0004"), vec![0xFF, 0xFF])
        .with_verification(PatchVerification::from_bytes(&[0x04, 0x05]));
    assert!(matches!(
        patch.apply().unwrap(),
        PatchOutcome::Applied { .. }
    ));
}

#[test]
fn test_malformed_line_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = write_image(
        dir.path(),
        "bad.hex",
        &["garbage", ":10000000000102030405060708090A0B0C0D0E0F78"],
        "\n",
    );

    let err = replace(&path, addr("0004"), &[0xFF]).unwrap_err();
    assert!(matches!(err, PatchError::Format { line: 1, .. }));
}

#[test]
fn test_check_does_not_write() {
    let dir = TempDir::new().unwrap();
    let path = write_image(dir.path(), "fw.hex", IMAGE, "\n");
    let before = fs::read(&path).unwrap();

    let plan = HexPatch::new(&path, addr("0004"), vec![0xFF, 0xFF])
        .check()
        .unwrap();
    assert!(!plan.already_applied);
    assert_eq!(plan.original_lines, vec![IMAGE[0].to_string()]);
    assert_eq!(
        plan.new_lines,
        vec![":1000000000010203FFFF060708090A0B0C0D0E0F83".to_string()]
    );
    assert_eq!(fs::read(&path).unwrap(), before);
}
