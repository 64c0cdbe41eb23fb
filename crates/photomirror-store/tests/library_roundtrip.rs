//! Whole-tree round-trip and invariant checks
//!
//! Builds a multi-level library through the store's write primitives, then
//! re-loads it and walks the tree verifying the structural invariants:
//! every asset link resolves, every album is a proper dual-path pair, and
//! no UUID occurs twice.

use std::collections::HashSet;
use std::path::Path;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use photomirror_core::domain::{content_hash, Album, AlbumKind, Asset, AssetKind};
use photomirror_store::LibraryStore;

/// Descriptor matching the 6-byte `b"123456"` payload the tests write.
fn asset(uuid: &str, stem: &str) -> Asset {
    Asset::new(
        uuid,
        stem,
        "jpg",
        6,
        content_hash::digest(b"123456"),
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        AssetKind::Original,
    )
}

/// Walk a directory tree, collecting every symlink and UUID directory.
fn walk(dir: &Path, links: &mut Vec<std::path::PathBuf>, uuid_dirs: &mut Vec<String>) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let meta = std::fs::symlink_metadata(entry.path()).unwrap();
        let name = entry.file_name().to_string_lossy().into_owned();
        if meta.is_symlink() {
            links.push(entry.path());
        } else if meta.is_dir() {
            if name.starts_with('.') {
                uuid_dirs.push(name);
            }
            walk(&entry.path(), links, uuid_dirs);
        }
    }
}

#[tokio::test]
async fn deep_tree_round_trips_and_holds_invariants() {
    let dir = TempDir::new().unwrap();
    let store = LibraryStore::new(dir.path());
    store.ensure_layout().await.unwrap();

    for (uuid, stem) in [("p1", "IMG_1"), ("p2", "IMG_2"), ("p3", "IMG_3")] {
        store.write_asset(&asset(uuid, stem), b"123456").await.unwrap();
    }

    let top_folder = Album::new("f-trips", AlbumKind::Folder, "Trips", "");
    let nested_folder = Album::new("f-2024", AlbumKind::Folder, "2024", "f-trips");
    let rome = Album::new("a-rome", AlbumKind::Album, "Rome", "f-2024")
        .with_asset("p1", "IMG_1.jpg")
        .with_asset("p2", "IMG_2.jpg");
    let favorites = Album::new("a-favs", AlbumKind::Album, "Favorites", "")
        .with_asset("p1", "IMG_1.jpg")
        .with_asset("p3", "IMG_3.jpg");

    for album in [&top_folder, &nested_folder, &rome, &favorites] {
        store.write_album(album).await.unwrap();
    }

    // round-trip equality
    let loaded = store.load_albums().await.unwrap();
    assert_eq!(loaded.len(), 4);
    assert_eq!(loaded["f-trips"], top_folder);
    assert_eq!(loaded["f-2024"], nested_folder);
    assert_eq!(loaded["a-rome"], rome);
    assert_eq!(loaded["a-favs"], favorites);

    // every symlink in the tree resolves
    let mut links = Vec::new();
    let mut uuid_dirs = Vec::new();
    walk(dir.path(), &mut links, &mut uuid_dirs);
    assert_eq!(links.len(), 4 + 4); // 4 name links, 4 asset links
    for link in &links {
        assert!(
            std::fs::metadata(link).is_ok(),
            "dangling symlink: {}",
            link.display()
        );
        // and every target is relative
        let target = std::fs::read_link(link).unwrap();
        assert!(target.is_relative(), "absolute target: {}", target.display());
    }

    // no UUID directory occurs twice
    let unique: HashSet<&String> = uuid_dirs.iter().collect();
    assert_eq!(unique.len(), uuid_dirs.len(), "duplicate UUID directories");

    // the same asset can be linked from two albums without copies
    let assets = store.load_assets().await.unwrap();
    assert_eq!(assets.len(), 3);
}

#[tokio::test]
async fn reparenting_moves_the_pair_between_folders() {
    let dir = TempDir::new().unwrap();
    let store = LibraryStore::new(dir.path());
    store.ensure_layout().await.unwrap();

    let folder_a = Album::new("f-a", AlbumKind::Folder, "A", "");
    let folder_b = Album::new("f-b", AlbumKind::Folder, "B", "");
    let child = Album::new("a-x", AlbumKind::Album, "X", "f-a");
    for album in [&folder_a, &folder_b, &child] {
        store.write_album(album).await.unwrap();
    }

    // the differ models re-parenting as remove + add; with no user files
    // inside, the pair is rebuilt under the new parent
    store.delete_album(&child).await.unwrap();
    let moved = Album::new("a-x", AlbumKind::Album, "X", "f-b");
    store.write_album(&moved).await.unwrap();

    let loaded = store.load_albums().await.unwrap();
    assert_eq!(loaded["a-x"].parent_uuid, "f-b");
    assert!(dir.path().join(".f-b/.a-x").is_dir());
    assert!(!dir.path().join(".f-a/.a-x").exists());
}
