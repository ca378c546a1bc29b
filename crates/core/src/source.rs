//! Restore source identifier classification
//!
//! Git commit hashes and restic snapshot IDs are both hex strings, so the
//! restore surfaces decide which system to ask from the identifier shape:
//! - 40 hex chars: full git commit hash
//! - 7-39 hex chars, except exactly 8: abbreviated git commit hash
//! - exactly 8 hex chars: ambiguous (restic short ID or short commit hash)
//! - anything else (e.g. `latest`, full 64-char snapshot IDs): restic snapshot
//!
//! An 8-char restic short ID that also resolves as a truncated commit hash is
//! sent to git. Callers try git first and fall back to restic only on "not found".

/// Which backup system an identifier refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Definitely a version-control commit
    VersionControl,
    /// Definitely a snapshot-store identifier
    Snapshot,
    /// Could be either; try version control first
    Ambiguous,
}

const FULL_COMMIT_LEN: usize = 40;
const MIN_COMMIT_LEN: usize = 7;
const SNAPSHOT_SHORT_ID_LEN: usize = 8;

/// Classify a restore source identifier by its shape
pub fn classify_source(source: &str) -> SourceKind {
    let is_hex = !source.is_empty()
        && source
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

    if !is_hex {
        return SourceKind::Snapshot;
    }

    match source.len() {
        SNAPSHOT_SHORT_ID_LEN => SourceKind::Ambiguous,
        len if (MIN_COMMIT_LEN..=FULL_COMMIT_LEN).contains(&len) => SourceKind::VersionControl,
        _ => SourceKind::Snapshot,
    }
}
