//! On-disk layout and path arithmetic
//!
//! Every path the store touches is derived here. All internal symlinks are
//! *relative* so the whole data directory stays portable: name→UUID links
//! target `.<uuid>` in the same directory, album→asset links target the
//! asset directory via `../..`-style traversal computed by
//! [`relative_path`].

use std::path::{Component, Path, PathBuf};

use photomirror_core::resources::RESOURCE_FILE_NAME;

/// Flat, content-addressed asset directory
pub const ASSET_DIR_NAME: &str = "_All-Photos";

/// Permanent home of archived albums whose remote counterpart is gone
pub const ARCHIVE_DIR_NAME: &str = "_Archive";

/// Transient staging area inside the archive directory
pub const STASH_DIR_NAME: &str = "_Stash";

/// Filenames ignored during kind detection and emptiness checks
///
/// Platform metadata the user's file manager drops into directories; their
/// presence never makes an album "archived" and never blocks deletion.
pub const SAFE_FILENAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini", ".localized"];

/// True for filenames in the fixed ignore set (resource file included).
pub fn is_safe_filename(name: &str) -> bool {
    name == RESOURCE_FILE_NAME || SAFE_FILENAMES.contains(&name)
}

/// Directory entry name for an album's UUID directory: `.<uuid>`.
pub fn uuid_dirname(uuid: &str) -> String {
    format!(".{uuid}")
}

/// Inverse of [`uuid_dirname`]: `.<uuid>` → `<uuid>`.
pub fn uuid_from_dirname(name: &str) -> Option<&str> {
    name.strip_prefix('.').filter(|rest| !rest.is_empty())
}

// ============================================================================
// LibraryLayout
// ============================================================================

/// Resolved top-level paths of one library
#[derive(Debug, Clone)]
pub struct LibraryLayout {
    data_dir: PathBuf,
}

impl LibraryLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn asset_dir(&self) -> PathBuf {
        self.data_dir.join(ASSET_DIR_NAME)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.data_dir.join(ARCHIVE_DIR_NAME)
    }

    pub fn stash_dir(&self) -> PathBuf {
        self.archive_dir().join(STASH_DIR_NAME)
    }

    /// Path of one asset file inside the asset directory.
    pub fn asset_path(&self, disk_filename: &str) -> PathBuf {
        self.asset_dir().join(disk_filename)
    }
}

// ============================================================================
// Relative path computation
// ============================================================================

/// Compute the relative path from `from_dir` to `to`.
///
/// Both inputs must be absolute or share the same root; the result walks up
/// out of `from_dir` with `..` components and back down into `to`. Used for
/// album→asset symlink targets so they survive a data-directory move.
pub fn relative_path(from_dir: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from_dir.components().collect();
    let to_parts: Vec<Component> = to.components().collect();

    let common = from
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for part in &to_parts[common..] {
        rel.push(part.as_os_str());
    }

    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    rel
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_dirname_round_trip() {
        assert_eq!(uuid_dirname("abc-123"), ".abc-123");
        assert_eq!(uuid_from_dirname(".abc-123"), Some("abc-123"));
        assert_eq!(uuid_from_dirname("abc-123"), None);
        assert_eq!(uuid_from_dirname("."), None);
    }

    #[test]
    fn safe_filenames_include_resource_file() {
        assert!(is_safe_filename(".DS_Store"));
        assert!(is_safe_filename(".photos-library.db"));
        assert!(!is_safe_filename("IMG_0001.jpg"));
    }

    #[test]
    fn layout_paths() {
        let layout = LibraryLayout::new("/library");
        assert_eq!(layout.asset_dir(), PathBuf::from("/library/_All-Photos"));
        assert_eq!(layout.archive_dir(), PathBuf::from("/library/_Archive"));
        assert_eq!(
            layout.stash_dir(),
            PathBuf::from("/library/_Archive/_Stash")
        );
        assert_eq!(
            layout.asset_path("p1.jpg"),
            PathBuf::from("/library/_All-Photos/p1.jpg")
        );
    }

    #[test]
    fn relative_path_to_sibling_tree() {
        // album at /library/.aaa linking into /library/_All-Photos
        let rel = relative_path(
            Path::new("/library/.aaa"),
            Path::new("/library/_All-Photos/p1.jpg"),
        );
        assert_eq!(rel, PathBuf::from("../_All-Photos/p1.jpg"));
    }

    #[test]
    fn relative_path_from_nested_album() {
        let rel = relative_path(
            Path::new("/library/.folder/.album"),
            Path::new("/library/_All-Photos/p1.jpg"),
        );
        assert_eq!(rel, PathBuf::from("../../_All-Photos/p1.jpg"));
    }

    #[test]
    fn relative_path_to_same_dir() {
        let rel = relative_path(Path::new("/library"), Path::new("/library"));
        assert_eq!(rel, PathBuf::from("."));
    }
}
