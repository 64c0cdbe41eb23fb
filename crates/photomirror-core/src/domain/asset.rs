//! Asset domain entity
//!
//! An [`Asset`] is the immutable descriptor of a single remote media file.
//! On disk every asset lives in the flat asset directory as
//! `<uuid>.<extension>`; albums only ever reference it through relative
//! symlinks, so the file itself is written once and never renamed.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// AssetKind
// ============================================================================

/// The remote-side rendition an asset descriptor refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// The unmodified upload
    Original,
    /// A user-edited rendition of the original
    Edited,
    /// The video half of a live photo
    LivePhotoVideo,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AssetKind::Original => "original",
            AssetKind::Edited => "edited",
            AssetKind::LivePhotoVideo => "live_photo_video",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Asset
// ============================================================================

/// Immutable descriptor of a remote asset
///
/// Identity is the remote `uuid` alone: two descriptors with the same UUID
/// compare equal even if the remote has since changed size or hash. The
/// differ relies on this when matching remote listings against on-disk
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Opaque identifier assigned by the remote service, unique per asset
    pub uuid: String,
    /// Display name without extension, as shown in albums
    pub filename_stem: String,
    /// File extension without the leading dot (e.g. `jpg`, `mov`)
    pub extension: String,
    /// Expected size of the downloaded file in bytes
    pub size_bytes: u64,
    /// Remote-provided content checksum, opaque to the engine
    pub content_hash: String,
    /// Remote modification time; stamped onto the file after download
    pub modified: DateTime<Utc>,
    /// Which rendition this descriptor refers to
    pub kind: AssetKind,
}

impl Asset {
    pub fn new(
        uuid: impl Into<String>,
        filename_stem: impl Into<String>,
        extension: impl Into<String>,
        size_bytes: u64,
        content_hash: impl Into<String>,
        modified: DateTime<Utc>,
        kind: AssetKind,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            filename_stem: filename_stem.into(),
            extension: extension.into(),
            size_bytes,
            content_hash: content_hash.into(),
            modified,
            kind,
        }
    }

    /// Filename inside the asset directory: `<uuid>.<extension>`
    ///
    /// The library never renames asset files; this is the only name an
    /// asset ever has on disk.
    pub fn disk_filename(&self) -> String {
        format!("{}.{}", self.uuid, self.extension)
    }

    /// User-facing filename used when an album links this asset
    ///
    /// Edited renditions get a `-edited` stem suffix so they never collide
    /// with their original inside the same album directory.
    pub fn link_filename(&self) -> String {
        match self.kind {
            AssetKind::Edited => format!("{}-edited.{}", self.filename_stem, self.extension),
            _ => format!("{}.{}", self.filename_stem, self.extension),
        }
    }

    /// True when the observed byte count and second-precision mtime match
    /// this descriptor
    ///
    /// An interrupted download never carries the remote mtime (the store
    /// stamps it only after a successful verify), so truncated or partial
    /// files always fail this check on the next run.
    pub fn matches_stat(&self, observed_len: u64, observed_mtime: Option<DateTime<Utc>>) -> bool {
        if observed_len != self.size_bytes {
            return false;
        }
        match observed_mtime {
            Some(mtime) => mtime.timestamp() == self.modified.timestamp(),
            None => false,
        }
    }

    /// True when the digest of `bytes` equals the remote-provided
    /// `content_hash`
    ///
    /// Catches corruption that stat alone cannot: a file with the right
    /// size and mtime but the wrong bytes fails here.
    pub fn matches_content(&self, bytes: &[u8]) -> bool {
        super::content_hash::digest(bytes) == self.content_hash
    }
}

impl PartialEq for Asset {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for Asset {}

impl Hash for Asset {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uuid.hash(state);
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.disk_filename(), self.kind)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn asset(uuid: &str, kind: AssetKind) -> Asset {
        Asset::new(
            uuid,
            "IMG_0001",
            "jpg",
            1024,
            "hash-abc",
            Utc.with_ymd_and_hms(2023, 5, 17, 12, 30, 0).unwrap(),
            kind,
        )
    }

    #[test]
    fn disk_filename_is_uuid_dot_ext() {
        let a = asset("p1", AssetKind::Original);
        assert_eq!(a.disk_filename(), "p1.jpg");
    }

    #[test]
    fn link_filename_uses_stem() {
        let a = asset("p1", AssetKind::Original);
        assert_eq!(a.link_filename(), "IMG_0001.jpg");
    }

    #[test]
    fn link_filename_marks_edited_rendition() {
        let a = asset("p1", AssetKind::Edited);
        assert_eq!(a.link_filename(), "IMG_0001-edited.jpg");
    }

    #[test]
    fn equality_is_by_uuid_only() {
        let a = asset("p1", AssetKind::Original);
        let mut b = asset("p1", AssetKind::Original);
        b.size_bytes = 999;
        b.content_hash = "other".into();
        assert_eq!(a, b);

        let c = asset("p2", AssetKind::Original);
        assert_ne!(a, c);
    }

    #[test]
    fn matches_stat_rejects_size_mismatch() {
        let a = asset("p1", AssetKind::Original);
        assert!(!a.matches_stat(1023, Some(a.modified)));
        assert!(!a.matches_stat(0, Some(a.modified)));
    }

    #[test]
    fn matches_stat_rejects_wrong_or_missing_mtime() {
        let a = asset("p1", AssetKind::Original);
        let later = a.modified + chrono::Duration::seconds(5);
        assert!(!a.matches_stat(1024, Some(later)));
        assert!(!a.matches_stat(1024, None));
    }

    #[test]
    fn matches_stat_accepts_subsecond_drift() {
        let a = asset("p1", AssetKind::Original);
        let drifted = a.modified + chrono::Duration::milliseconds(400);
        assert!(a.matches_stat(1024, Some(drifted)));
    }

    #[test]
    fn matches_content_compares_the_digest() {
        let mut a = asset("p1", AssetKind::Original);
        a.content_hash = crate::domain::content_hash::digest(b"the real payload");

        assert!(a.matches_content(b"the real payload"));
        // same length, different bytes
        assert!(!a.matches_content(b"the fake payload"));
        assert!(!a.matches_content(b""));
    }

    #[test]
    fn matches_content_rejects_foreign_hash_formats() {
        // a descriptor whose hash is not our digest never matches
        let a = asset("p1", AssetKind::Original);
        assert!(!a.matches_content(b"anything"));
    }
}
