//! Album domain entity
//!
//! An [`Album`] describes one node of the remote album tree: a folder
//! (contains only other albums), an album proper (contains only asset
//! links), or an archived directory the user has taken ownership of.
//!
//! On disk every non-root album is a *dual-path* pair inside its parent:
//! a hidden `.<uuid>` directory carrying the structure and a
//! `<display-name>` relative symlink carrying the human name. The domain
//! type only records the logical fields; all path arithmetic lives in the
//! store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// AlbumKind
// ============================================================================

/// Classification of an album tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumKind {
    /// Synthetic tree root; never written to disk, never listed
    Root,
    /// Contains only other albums, no asset links
    Folder,
    /// Contains only asset symlinks, no child directories
    Album,
    /// Contains real files placed there by the user; the engine never
    /// modifies its contents
    Archived,
}

impl std::fmt::Display for AlbumKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlbumKind::Root => "root",
            AlbumKind::Folder => "folder",
            AlbumKind::Album => "album",
            AlbumKind::Archived => "archived",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Album
// ============================================================================

/// Descriptor of a folder or album in the library tree
///
/// `assets` maps asset UUID to the linked filename inside the album
/// directory. A `BTreeMap` keeps membership iteration deterministic, which
/// the differ relies on for reproducible plans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    /// Opaque identifier assigned by the remote service, unique per album
    pub uuid: String,
    pub kind: AlbumKind,
    /// Human-readable name; sanitized before it becomes a symlink name
    pub display_name: String,
    /// UUID of the parent album; empty string for top-level albums
    pub parent_uuid: String,
    /// Asset membership: asset UUID → linked filename
    pub assets: BTreeMap<String, String>,
}

impl Album {
    pub fn new(
        uuid: impl Into<String>,
        kind: AlbumKind,
        display_name: impl Into<String>,
        parent_uuid: impl Into<String>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            kind,
            display_name: display_name.into(),
            parent_uuid: parent_uuid.into(),
            assets: BTreeMap::new(),
        }
    }

    /// Builder-style helper for tests and provider adapters
    pub fn with_asset(
        mut self,
        asset_uuid: impl Into<String>,
        linked_filename: impl Into<String>,
    ) -> Self {
        self.assets.insert(asset_uuid.into(), linked_filename.into());
        self
    }

    /// True for top-level albums (direct children of the synthetic root)
    pub fn is_top_level(&self) -> bool {
        self.parent_uuid.is_empty()
    }

    /// Display name made safe for use as a directory entry
    ///
    /// Path separators are replaced and leading dots stripped, so a remote
    /// name can never escape its parent directory or masquerade as a
    /// hidden UUID directory. An empty result falls back to the UUID.
    pub fn sanitized_name(&self) -> String {
        let cleaned: String = self
            .display_name
            .chars()
            .map(|c| if c == '/' || c == '\0' { '_' } else { c })
            .collect();
        let cleaned = cleaned.trim_start_matches('.').trim();
        if cleaned.is_empty() {
            self.uuid.clone()
        } else {
            cleaned.to_string()
        }
    }

    /// True when `other` is the same album under a different display name
    ///
    /// Same UUID, same parent, same membership. The engine turns a
    /// remove/add pair that satisfies this into a plain symlink swap
    /// instead of a directory rebuild.
    pub fn is_rename_of(&self, other: &Album) -> bool {
        self.uuid == other.uuid
            && self.parent_uuid == other.parent_uuid
            && self.kind == other.kind
            && self.assets == other.assets
            && self.display_name != other.display_name
    }
}

impl std::fmt::Display for Album {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} \"{}\" ({})", self.uuid, self.display_name, self.kind)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_name_replaces_separators() {
        let a = Album::new("u1", AlbumKind::Album, "Trips/2023", "");
        assert_eq!(a.sanitized_name(), "Trips_2023");
    }

    #[test]
    fn sanitized_name_strips_leading_dots() {
        let a = Album::new("u1", AlbumKind::Album, ".hidden", "");
        assert_eq!(a.sanitized_name(), "hidden");
    }

    #[test]
    fn sanitized_name_falls_back_to_uuid() {
        let a = Album::new("u1", AlbumKind::Album, "...", "");
        assert_eq!(a.sanitized_name(), "u1");
    }

    #[test]
    fn top_level_albums_have_empty_parent() {
        let top = Album::new("u1", AlbumKind::Album, "Top", "");
        let nested = Album::new("u2", AlbumKind::Album, "Nested", "u1");
        assert!(top.is_top_level());
        assert!(!nested.is_top_level());
    }

    #[test]
    fn rename_detection_requires_same_structure() {
        let old = Album::new("u1", AlbumKind::Album, "Vacation", "").with_asset("p1", "a1.jpg");
        let renamed = Album::new("u1", AlbumKind::Album, "Holiday", "").with_asset("p1", "a1.jpg");
        assert!(renamed.is_rename_of(&old));

        // changed membership is not a rename
        let regrouped = Album::new("u1", AlbumKind::Album, "Holiday", "").with_asset("p2", "b.jpg");
        assert!(!regrouped.is_rename_of(&old));

        // moved to another parent is not a rename
        let moved = Album::new("u1", AlbumKind::Album, "Holiday", "uF").with_asset("p1", "a1.jpg");
        assert!(!moved.is_rename_of(&old));

        // identical album is not a rename either
        assert!(!old.clone().is_rename_of(&old));
    }

    #[test]
    fn membership_iteration_is_sorted_by_uuid() {
        let a = Album::new("u1", AlbumKind::Album, "A", "")
            .with_asset("zz", "z.jpg")
            .with_asset("aa", "a.jpg")
            .with_asset("mm", "m.jpg");
        let keys: Vec<&str> = a.assets.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["aa", "mm", "zz"]);
    }
}
