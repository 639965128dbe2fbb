//! Hexpatch: in-place patching of Intel HEX firmware images
//!
//! Reads Intel HEX files, resolves byte addresses to the records holding
//! them, and overwrites byte ranges while keeping every other record
//! exactly as it was.
//!
//! # Architecture
//!
//! - [`record`] parses and serializes single record lines, using the
//!   checksum arithmetic in [`checksum`].
//! - [`locator`] resolves an [`Address`] to the line of the record that
//!   contains it, either flat (16-bit) or inside an Extended Linear Address
//!   page (32-bit).
//! - [`patch`] splices replacement bytes across one or more records and
//!   re-encodes only those lines.
//! - [`config`] applies whole patch sets described in TOML.
//!
//! # Safety
//!
//! - Record count, order, addresses, types and lengths never change
//! - Every failure is detected before anything is written
//! - Atomic file writes (tempfile + fsync + rename)
//! - Optional verification of the bytes being replaced
//! - Idempotent operations
//!
//! # Example
//!
//! ```no_run
//! use hexpatch::{Address, HexPatch};
//!
//! let address: Address = "08000010".parse().unwrap();
//! let patch = HexPatch::new("firmware.hex", address, vec![0xDE, 0xAD, 0xBE, 0xEF]);
//!
//! match patch.apply() {
//!     Ok(outcome) => println!("Patch applied: {:?}", outcome),
//!     Err(e) => eprintln!("Patch failed: {}", e),
//! }
//! ```

pub mod address;
pub mod checksum;
pub mod config;
pub mod file;
pub mod locator;
pub mod patch;
pub mod record;

// Re-exports
pub use address::{Address, AddressError};
pub use config::{
    apply_patches, check_patches, load_from_path, load_from_str, ApplicationError, ConfigError,
    PatchConfig, PatchResult,
};
pub use file::{atomic_write, ChecksumMismatch, FileError, HexFile};
pub use locator::{locate, LocateError, Located};
pub use patch::{replace, HexPatch, PatchError, PatchOutcome, PatchPlan, PatchVerification};
pub use record::{serialize, FormatError, Record, RecordType};
