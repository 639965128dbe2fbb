//! Intel HEX record codec.
//!
//! A record is one line of the form `:LLAAAATTDD...DDCC`. [`Record::parse`]
//! turns a line into a [`Record`], [`Record::to_line`] produces the canonical
//! uppercase text back.

use crate::checksum;
use std::fmt;
use thiserror::Error;

/// Every record line starts with this marker.
pub const START_CODE: char = ':';

/// Characters before the payload: `:` + length (2) + address (4) + type (2).
pub const HEADER_LEN: usize = 9;

/// Largest payload a single record can declare.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("record does not start with ':'")]
    MissingStartCode,

    #[error("invalid {field} field '{text}'")]
    InvalidField { field: &'static str, text: String },

    #[error("record too short: declares {declared} payload bytes, needs {expected} characters, found {found}")]
    TooShort {
        declared: usize,
        expected: usize,
        found: usize,
    },

    #[error("unknown record type code {code:02X}")]
    UnknownRecordType { code: u8 },

    #[error("payload of {len} bytes exceeds the 255-byte record limit")]
    PayloadTooLong { len: usize },

    #[error("hex data has odd length {len}")]
    OddHexLength { len: usize },

    #[error("invalid hex digit in '{text}'")]
    InvalidHex { text: String },
}

/// Record type, the `TT` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Data,
    EndOfFile,
    ExtendedSegmentAddress,
    StartSegmentAddress,
    ExtendedLinearAddress,
    StartLinearAddress,
}

/// Type <-> wire code, read in both directions.
const RECORD_TYPES: [(RecordType, u8); 6] = [
    (RecordType::Data, 0x00),
    (RecordType::EndOfFile, 0x01),
    (RecordType::ExtendedSegmentAddress, 0x02),
    (RecordType::StartSegmentAddress, 0x03),
    (RecordType::ExtendedLinearAddress, 0x04),
    (RecordType::StartLinearAddress, 0x05),
];

impl RecordType {
    pub fn code(self) -> u8 {
        RECORD_TYPES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, code)| *code)
            .unwrap_or_default()
    }

    pub fn from_code(code: u8) -> Option<Self> {
        RECORD_TYPES
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(kind, _)| *kind)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordType::Data => "Data",
            RecordType::EndOfFile => "EndOfFile",
            RecordType::ExtendedSegmentAddress => "ExtendedSegmentAddress",
            RecordType::StartSegmentAddress => "StartSegmentAddress",
            RecordType::ExtendedLinearAddress => "ExtendedLinearAddress",
            RecordType::StartLinearAddress => "StartLinearAddress",
        };
        write!(f, "{name} ({:02X})", self.code())
    }
}

/// One parsed record.
///
/// The payload length is always `data.len()`; it cannot exceed 255.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 16-bit offset within the current page
    pub address: u16,
    pub kind: RecordType,
    data: Vec<u8>,
    /// Checksum byte as read from the line (or computed by [`Record::new`])
    pub checksum: u8,
}

impl Record {
    /// Build a record and compute its checksum.
    pub fn new(address: u16, kind: RecordType, data: Vec<u8>) -> Result<Self, FormatError> {
        if data.len() > MAX_PAYLOAD {
            return Err(FormatError::PayloadTooLong { len: data.len() });
        }
        let mut record = Self {
            address,
            kind,
            data,
            checksum: 0,
        };
        record.checksum = checksum::checksum(&record.body_bytes());
        Ok(record)
    }

    /// The `ExtendedLinearAddress` record selecting `page`.
    pub fn extended_linear_address(page: u16) -> Self {
        let data = page.to_be_bytes().to_vec();
        let mut record = Self {
            address: 0,
            kind: RecordType::ExtendedLinearAddress,
            data,
            checksum: 0,
        };
        record.checksum = checksum::checksum(&record.body_bytes());
        record
    }

    /// Parse one line. Surrounding whitespace (including a trailing CR) is ignored,
    /// as is anything after the checksum field.
    pub fn parse(line: &str) -> Result<Self, FormatError> {
        let line = line.trim();
        let body = line
            .strip_prefix(START_CODE)
            .ok_or(FormatError::MissingStartCode)?;

        let length = parse_field(body, 0, 2, "length")? as usize;
        let expected = HEADER_LEN + 2 * length + 2;
        if line.len() < expected {
            return Err(FormatError::TooShort {
                declared: length,
                expected,
                found: line.len(),
            });
        }

        let address = parse_field(body, 2, 4, "address")? as u16;
        let code = parse_field(body, 6, 2, "type")? as u8;
        let kind = RecordType::from_code(code).ok_or(FormatError::UnknownRecordType { code })?;

        let payload_end = HEADER_LEN - 1 + 2 * length;
        let payload = body
            .get(HEADER_LEN - 1..payload_end)
            .ok_or_else(|| FormatError::InvalidHex {
                text: body.to_string(),
            })?;
        let data = decode_hex_bytes(payload)?;
        let checksum = parse_field(body, payload_end, 2, "checksum")? as u8;

        Ok(Self {
            address,
            kind,
            data,
            checksum,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_data(&self) -> bool {
        self.kind == RecordType::Data
    }

    /// Checksum the record should carry given its other fields.
    pub fn expected_checksum(&self) -> u8 {
        checksum::checksum(&self.body_bytes())
    }

    pub fn checksum_ok(&self) -> bool {
        self.checksum == self.expected_checksum()
    }

    /// Whether `offset` falls in `[address, address + len]`.
    ///
    /// The upper bound is inclusive: the address one past the last payload
    /// byte still belongs to this record.
    pub fn contains(&self, offset: u16) -> bool {
        let start = u32::from(self.address);
        let end = start + self.len() as u32;
        (start..=end).contains(&u32::from(offset))
    }

    /// Canonical uppercase line text, with the checksum recomputed.
    pub fn to_line(&self) -> String {
        let mut bytes = self.body_bytes();
        bytes.push(self.expected_checksum());

        format!("{START_CODE}{}", hex::encode_upper(&bytes))
    }

    /// Length, address, type, and payload bytes, without the checksum.
    fn body_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.data.len());
        bytes.push(self.data.len() as u8);
        bytes.extend_from_slice(&self.address.to_be_bytes());
        bytes.push(self.kind.code());
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Encode a record from its parts into canonical line text.
pub fn serialize(address: u16, kind: RecordType, data: &[u8]) -> Result<String, FormatError> {
    Ok(Record::new(address, kind, data.to_vec())?.to_line())
}

/// Decode a string of hex digit pairs into bytes. Case-insensitive.
pub fn decode_hex_bytes(text: &str) -> Result<Vec<u8>, FormatError> {
    hex::decode(text).map_err(|e| match e {
        hex::FromHexError::OddLength => FormatError::OddHexLength { len: text.len() },
        _ => FormatError::InvalidHex {
            text: text.to_string(),
        },
    })
}

/// Encode bytes as uppercase hex digit pairs.
pub fn encode_hex_bytes(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

fn parse_field(
    body: &str,
    start: usize,
    width: usize,
    field: &'static str,
) -> Result<u32, FormatError> {
    let text = body
        .get(start..start + width)
        .ok_or_else(|| FormatError::InvalidField {
            field,
            text: body.chars().skip(start).take(width).collect(),
        })?;

    if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FormatError::InvalidField {
            field,
            text: text.to_string(),
        });
    }

    u32::from_str_radix(text, 16).map_err(|_| FormatError::InvalidField {
        field,
        text: text.to_string(),
    })
}
