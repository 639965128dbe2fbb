use crate::address::Address;
use crate::patch::PatchVerification;
use crate::record::decode_hex_bytes;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

impl PatchConfig {
    /// Every problem in the patch set at once, not just the first.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        let mut ids = HashSet::new();
        for patch in &self.patches {
            if !patch.id.trim().is_empty() && !ids.insert(patch.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId {
                    patch_id: patch.id.clone(),
                });
            }
            issues.extend(patch.issues());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Resolve each patch's `file` against the root directory
    #[serde(default)]
    pub root_relative: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    pub file: String,
    /// 4 hex digits (flat) or 8 hex digits (extended linear)
    pub address: String,
    /// Replacement bytes as hex digit pairs
    pub data: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub verify: Option<Verify>,
}

impl PatchDefinition {
    fn issues(&self) -> Vec<ValidationIssue> {
        let id = || (!self.id.trim().is_empty()).then(|| self.id.clone());
        let invalid = |field: &'static str, message: String| ValidationIssue::InvalidValue {
            patch_id: id(),
            field,
            message,
        };

        let mut issues = Vec::new();
        for (field, value) in [
            ("id", &self.id),
            ("file", &self.file),
            ("address", &self.address),
        ] {
            if value.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: id(),
                    field,
                });
            }
        }

        if !self.address.trim().is_empty() {
            if let Err(e) = self.address() {
                issues.push(invalid("address", e.to_string()));
            }
        }
        if let Err(e) = self.data() {
            issues.push(invalid("data", e.to_string()));
        }
        if let Err(message) = self.verification() {
            issues.push(invalid("verify.expected", message));
        }
        issues
    }

    pub fn address(&self) -> Result<Address, crate::address::AddressError> {
        self.address.parse()
    }

    pub fn data(&self) -> Result<Vec<u8>, crate::record::FormatError> {
        decode_hex_bytes(self.data.trim())
    }

    pub fn verification(&self) -> Result<Option<PatchVerification>, String> {
        match &self.verify {
            None => Ok(None),
            Some(Verify::ExactMatch { expected }) => decode_hex_bytes(expected.trim())
                .map(|bytes| Some(PatchVerification::ExactMatch(bytes)))
                .map_err(|e| e.to_string()),
            Some(Verify::Hash {
                algorithm: _,
                expected,
            }) => {
                let digits = expected
                    .trim()
                    .trim_start_matches("0x")
                    .trim_start_matches("0X");
                u64::from_str_radix(digits, 16)
                    .map(|hash| Some(PatchVerification::Hash(hash)))
                    .map_err(|e| format!("invalid xxh3 hash '{expected}': {e}"))
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Verify {
    /// Original bytes as hex digit pairs
    ExactMatch { expected: String },
    Hash {
        algorithm: Option<HashAlgorithm>,
        /// Hash of the original bytes, hex
        expected: String,
    },
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    Xxh3,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.issues.iter().map(ToString::to_string).collect();
        f.write_str(&lines.join("\n"))
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    InvalidValue {
        patch_id: Option<String>,
        field: &'static str,
        message: String,
    },
    DuplicateId {
        patch_id: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subject = |patch_id: &Option<String>| match patch_id {
            Some(id) => format!("patch '{id}'"),
            None => "unnamed patch".to_string(),
        };

        match self {
            ValidationIssue::EmptyPatchList => f.write_str("patch set contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => {
                write!(f, "{}: '{field}' is required", subject(patch_id))
            }
            ValidationIssue::InvalidValue {
                patch_id,
                field,
                message,
            } => write!(f, "{}: bad '{field}': {message}", subject(patch_id)),
            ValidationIssue::DuplicateId { patch_id } => {
                write!(f, "patch id '{patch_id}' appears more than once")
            }
        }
    }
}
