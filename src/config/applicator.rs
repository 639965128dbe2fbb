//! Running a patch set against files on disk.
//!
//! Each definition is resolved to a [`HexPatch`] on a concrete path and run
//! on its own. One patch failing never stops the ones after it.

use crate::config::schema::{PatchConfig, PatchDefinition};
use crate::file::HexFile;
use crate::patch::{HexPatch, PatchError, PatchOutcome};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Result of applying a single patch
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a Failed result means the file was not patched"]
pub enum PatchResult {
    /// Patch was applied (or, for `check_patches`, would be)
    Applied {
        file: PathBuf,
        start_line: usize,
        end_line: usize,
        /// Lines `start_line..=end_line` before the patch
        original_lines: Vec<String>,
        /// The same lines after it
        new_lines: Vec<String>,
    },
    /// Target bytes already hold the patch data
    AlreadyApplied { file: PathBuf },
    /// Patch could not be applied; the file was left untouched
    Failed { file: PathBuf, reason: String },
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Applied {
                file,
                start_line,
                end_line,
                ..
            } => write!(
                f,
                "Applied patch to {} (lines {}-{})",
                file.display(),
                start_line,
                end_line
            ),
            PatchResult::AlreadyApplied { file } => {
                write!(f, "Already applied to {}", file.display())
            }
            PatchResult::Failed { file, reason } => {
                write!(f, "Failed on {}: {}", file.display(), reason)
            }
        }
    }
}

/// Errors during patch application
#[derive(Debug)]
pub enum ApplicationError {
    /// Patch definition could not be turned into a patch
    Invalid { id: String, reason: String },
    /// Patch engine error
    Patch(PatchError),
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Invalid { id, reason } => {
                write!(f, "invalid patch '{}': {}", id, reason)
            }
            ApplicationError::Patch(e) => write!(f, "patch error: {}", e),
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Patch(e) => Some(e),
            ApplicationError::Invalid { .. } => None,
        }
    }
}

impl From<PatchError> for ApplicationError {
    fn from(e: PatchError) -> Self {
        ApplicationError::Patch(e)
    }
}

/// Apply a patch set, in definition order.
///
/// Each patch is its own atomic write; a failed patch leaves its file as it
/// was and does not stop the patches after it.
pub fn apply_patches(
    config: &PatchConfig,
    root: &Path,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    config
        .patches
        .iter()
        .map(|patch| (patch.id.clone(), apply_patch(config, patch, root)))
        .collect()
}

fn apply_patch(
    config: &PatchConfig,
    definition: &PatchDefinition,
    root: &Path,
) -> Result<PatchResult, ApplicationError> {
    let patch = build_patch(config, definition, root)?;
    match patch.apply() {
        Ok(PatchOutcome::Applied {
            file,
            start_line,
            end_line,
            original_lines,
            new_lines,
        }) => Ok(PatchResult::Applied {
            file,
            start_line,
            end_line,
            original_lines,
            new_lines,
        }),
        Ok(PatchOutcome::AlreadyApplied { file }) => Ok(PatchResult::AlreadyApplied { file }),
        Err(e) => failed_or_error(patch.file, e),
    }
}

/// Check patch status without writing anything.
///
/// Mirrors `apply_patches` result semantics (`Applied` means "would apply").
/// Patches to the same file are evaluated against an in-memory copy that
/// accumulates the earlier patches, as `apply_patches` would leave it.
pub fn check_patches(
    config: &PatchConfig,
    root: &Path,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    let mut snapshots: HashMap<PathBuf, HexFile> = HashMap::new();

    config
        .patches
        .iter()
        .map(|definition| {
            let result = check_patch(config, definition, root, &mut snapshots);
            (definition.id.clone(), result)
        })
        .collect()
}

fn check_patch(
    config: &PatchConfig,
    definition: &PatchDefinition,
    root: &Path,
    snapshots: &mut HashMap<PathBuf, HexFile>,
) -> Result<PatchResult, ApplicationError> {
    let patch = build_patch(config, definition, root)?;

    let hex = match snapshots.entry(patch.file.clone()) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => match HexFile::read(&patch.file) {
            Ok(hex) => entry.insert(hex),
            Err(e) => return failed_or_error(patch.file, e.into()),
        },
    };

    let plan = match patch.plan(hex) {
        Ok(plan) => plan,
        Err(e) => return failed_or_error(patch.file, e),
    };

    if plan.already_applied {
        return Ok(PatchResult::AlreadyApplied { file: patch.file });
    }

    if let Some(verification) = &patch.expected_before {
        if !verification.matches(&plan.original) {
            return Ok(PatchResult::Failed {
                file: patch.file,
                reason: "original bytes do not match verify.expected".to_string(),
            });
        }
    }

    *hex = HexFile::parse(plan.content());
    Ok(PatchResult::Applied {
        file: patch.file,
        start_line: plan.start_line,
        end_line: plan.end_line,
        original_lines: plan.original_lines,
        new_lines: plan.new_lines,
    })
}

/// Resolve a patch definition into a [`HexPatch`] on a concrete path.
fn build_patch(
    config: &PatchConfig,
    definition: &PatchDefinition,
    root: &Path,
) -> Result<HexPatch, ApplicationError> {
    let invalid = |reason: String| ApplicationError::Invalid {
        id: definition.id.clone(),
        reason,
    };

    let address = definition.address().map_err(|e| invalid(e.to_string()))?;
    let data = definition.data().map_err(|e| invalid(e.to_string()))?;
    let verification = definition.verification().map_err(invalid)?;

    let file = if config.meta.root_relative {
        root.join(&definition.file)
    } else {
        PathBuf::from(&definition.file)
    };

    let mut patch = HexPatch::new(file, address, data);
    patch.expected_before = verification;
    Ok(patch)
}

/// Range and verification problems are reported as failed patches;
/// anything else (I/O, malformed files) is an error.
fn failed_or_error(file: PathBuf, e: PatchError) -> Result<PatchResult, ApplicationError> {
    match e {
        PatchError::AddressNotFound { .. }
        | PatchError::RangeCrossesPage { .. }
        | PatchError::RangeNotContiguous { .. }
        | PatchError::BeforeBytesMismatch { .. } => Ok(PatchResult::Failed {
            file,
            reason: e.to_string(),
        }),
        other => Err(ApplicationError::Patch(other)),
    }
}
