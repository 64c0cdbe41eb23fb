//! Library error taxonomy
//!
//! One enum carries every error kind the engine distinguishes. The store
//! raises; the sync engine catches and classifies. [`LibraryError::is_fatal`]
//! marks the kinds that imply invariant loss and must halt a run; everything
//! else is an operation-local failure the run survives.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the library engine
#[derive(Debug, Error)]
pub enum LibraryError {
    // --- configuration / shared resources ---
    /// Shared resources were accessed before `setup` ran
    #[error("shared resources not initiated; call setup first")]
    NotInitiated,

    /// `setup` was called a second time
    #[error("shared resources already initiated")]
    AlreadyInitiated,

    /// The resource file exists but cannot be parsed
    #[error("invalid resource file {path}: {reason}")]
    InvalidResourceFile { path: PathBuf, reason: String },

    // --- filesystem / tree structure ---
    /// A dual-path entry for the album already exists
    #[error("album path already exists: {0}")]
    AlreadyExists(PathBuf),

    /// An album scheduled for deletion contains real files or directories
    #[error("album directory not empty: {0}")]
    NotEmpty(PathBuf),

    /// The parent UUID directory could not be located anywhere in the tree
    #[error("parent album .{0} not found in library tree")]
    ParentNotFound(String),

    /// The same UUID directory exists at more than one path
    #[error("UUID .{0} found at multiple paths; library tree is ambiguous")]
    AmbiguousTree(String),

    /// A path tuple move found its source missing
    #[error("move source missing: {0}")]
    MoveSourceMissing(PathBuf),

    /// A path tuple move found its destination occupied
    #[error("move destination exists: {0}")]
    MoveDestinationExists(PathBuf),

    // --- asset i/o ---
    /// The remote transfer failed
    #[error("download failed for asset {uuid}: {reason}")]
    DownloadFailed { uuid: String, reason: String },

    /// A written or existing asset file does not match its descriptor
    #[error("verification failed for asset {uuid}")]
    VerificationFailed { uuid: String },

    // --- resource file write ---
    /// The resource file could not be rewritten; the update is best-effort
    #[error("unable to write resource file {path}: {reason}")]
    UnableToWriteFile { path: PathBuf, reason: String },

    // --- zones ---
    /// The account exposes no primary photos zone
    #[error("no primary photos zone available")]
    NoPrimaryZone,

    /// The account exposes no shared photos zone
    #[error("no shared photos zone available")]
    NoSharedZone,

    /// Underlying filesystem error outside the structured kinds above
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LibraryError {
    /// True for errors that imply invariant loss and must halt the run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LibraryError::AmbiguousTree(_)
                | LibraryError::NotInitiated
                | LibraryError::AlreadyInitiated
                | LibraryError::InvalidResourceFile { .. }
                | LibraryError::NoPrimaryZone
        )
    }

    /// True for per-asset errors worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LibraryError::DownloadFailed { .. } | LibraryError::VerificationFailed { .. }
        )
    }

    /// Stable error code carried in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            LibraryError::NotInitiated => "not-initiated",
            LibraryError::AlreadyInitiated => "already-initiated",
            LibraryError::InvalidResourceFile { .. } => "invalid-resource-file",
            LibraryError::AlreadyExists(_) => "already-exists",
            LibraryError::NotEmpty(_) => "not-empty",
            LibraryError::ParentNotFound(_) => "parent-not-found",
            LibraryError::AmbiguousTree(_) => "ambiguous-tree",
            LibraryError::MoveSourceMissing(_) => "move-source-missing",
            LibraryError::MoveDestinationExists(_) => "move-destination-exists",
            LibraryError::DownloadFailed { .. } => "download-failed",
            LibraryError::VerificationFailed { .. } => "verification-failed",
            LibraryError::UnableToWriteFile { .. } => "unable-to-write-file",
            LibraryError::NoPrimaryZone => "no-primary-zone",
            LibraryError::NoSharedZone => "no-shared-zone",
            LibraryError::Io(_) => "io",
        }
    }
}
