//! Local library store (filesystem adapter)
//!
//! [`LibraryStore`] is the only component that mutates the on-disk tree.
//! It enforces the structural invariants of the library:
//!
//! - every asset symlink resolves into the asset directory
//! - every non-archived album is a paired `.<uuid>` directory plus a
//!   `<display-name>` relative symlink
//! - no UUID directory appears twice anywhere in the tree
//! - asset files are named `<uuid>.<ext>` and never renamed
//!
//! ## Design Decisions
//!
//! - **Direct asset writes**: asset files are written straight to their
//!   final path, not via temp + rename. A partial file from an interrupted
//!   write never carries the remote mtime (the store stamps it only after
//!   verification), so the next run's verify rejects it and re-downloads.
//! - **Fail-soft enumeration**: a single unreadable entry is logged and
//!   skipped; it never aborts a listing.
//! - **Relative symlinks only**: targets are computed with
//!   [`crate::layout::relative_path`], never embedded absolute paths.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use filetime::FileTime;
use tracing::{debug, info, instrument, warn};

use photomirror_core::domain::{Album, AlbumKind, Asset, LibraryError};

use crate::layout::{
    is_safe_filename, relative_path, uuid_dirname, uuid_from_dirname, LibraryLayout,
};

// ============================================================================
// AssetRecord
// ============================================================================

/// What the store knows about an asset file from disk alone
///
/// Enumeration cannot recover the display stem, hash or kind; those live
/// only in remote metadata. UUID and extension come from the filename,
/// size and mtime from stat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub uuid: String,
    pub extension: String,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl AssetRecord {
    /// Filename inside the asset directory: `<uuid>.<extension>`.
    pub fn disk_filename(&self) -> String {
        format!("{}.{}", self.uuid, self.extension)
    }
}

// ============================================================================
// LibraryStore
// ============================================================================

/// Filesystem-backed implementation of the library tree
#[derive(Debug, Clone)]
pub struct LibraryStore {
    layout: LibraryLayout,
}

impl LibraryStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            layout: LibraryLayout::new(data_dir),
        }
    }

    pub fn layout(&self) -> &LibraryLayout {
        &self.layout
    }

    /// Create the fixed top-level directories on first run.
    pub async fn ensure_layout(&self) -> Result<(), LibraryError> {
        tokio::fs::create_dir_all(self.layout.asset_dir()).await?;
        tokio::fs::create_dir_all(self.layout.stash_dir()).await?;
        Ok(())
    }

    // ========================================================================
    // Asset reads
    // ========================================================================

    /// Enumerate the asset directory.
    ///
    /// Authoritative for "what is on disk". Individual unparseable or
    /// unreadable entries are logged and skipped.
    #[instrument(skip(self))]
    pub async fn load_assets(&self) -> Result<HashMap<String, AssetRecord>, LibraryError> {
        let mut assets = HashMap::new();
        let mut entries = tokio::fs::read_dir(self.layout.asset_dir()).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();

            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    warn!(file = %name, error = %e, "skipping unreadable asset entry");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            if is_safe_filename(&name) {
                continue;
            }

            let Some((uuid, extension)) = name.rsplit_once('.') else {
                warn!(file = %name, "skipping asset file without extension");
                continue;
            };
            if uuid.is_empty() {
                warn!(file = %name, "skipping asset file without uuid");
                continue;
            }

            assets.insert(
                uuid.to_string(),
                AssetRecord {
                    uuid: uuid.to_string(),
                    extension: extension.to_string(),
                    size_bytes: metadata.len(),
                    modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                },
            );
        }

        debug!(count = assets.len(), "assets enumerated");
        Ok(assets)
    }

    // ========================================================================
    // Album reads
    // ========================================================================

    /// Walk the dual-path tree and return every album keyed by UUID.
    ///
    /// Only name symlinks represent albums; plain directories (the asset
    /// directory, the archive, the UUID directories themselves) are
    /// reached through them or skipped. Recursion stops at archived
    /// albums, and neither the stash nor the synthetic root is emitted.
    #[instrument(skip(self))]
    pub async fn load_albums(&self) -> Result<HashMap<String, Album>, LibraryError> {
        let mut albums = HashMap::new();
        self.walk_albums(self.layout.data_dir().to_path_buf(), String::new(), &mut albums)
            .await?;
        debug!(count = albums.len(), "albums enumerated");
        Ok(albums)
    }

    fn walk_albums<'a>(
        &'a self,
        dir: PathBuf,
        parent_uuid: String,
        albums: &'a mut HashMap<String, Album>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), LibraryError>> + Send + 'a>>
    {
        Box::pin(async move {
            let mut entries = tokio::fs::read_dir(&dir).await?;

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let path = entry.path();

                let metadata = match tokio::fs::symlink_metadata(&path).await {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                        continue;
                    }
                };
                if !metadata.is_symlink() {
                    continue;
                }

                let target = match tokio::fs::read_link(&path).await {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unreadable symlink");
                        continue;
                    }
                };
                let Some(target_name) = target.file_name().map(|n| n.to_string_lossy().into_owned())
                else {
                    continue;
                };
                let Some(uuid) = uuid_from_dirname(&target_name) else {
                    debug!(path = %path.display(), "symlink does not name an album, skipping");
                    continue;
                };
                let uuid = uuid.to_string();
                let uuid_path = dir.join(&target_name);
                if !tokio::fs::symlink_metadata(&uuid_path)
                    .await
                    .map(|m| m.is_dir())
                    .unwrap_or(false)
                {
                    warn!(path = %path.display(), "dangling album name symlink, skipping");
                    continue;
                }

                let kind = self.read_album_kind(&uuid_path).await?;
                let mut album = Album::new(uuid.as_str(), kind, name.as_str(), parent_uuid.as_str());

                match kind {
                    AlbumKind::Album => {
                        album.assets = self.read_album_links(&uuid_path).await?;
                    }
                    AlbumKind::Folder => {
                        self.walk_albums(uuid_path.clone(), uuid.clone(), albums)
                            .await?;
                    }
                    // archived directories are opaque; root never occurs here
                    AlbumKind::Archived | AlbumKind::Root => {}
                }

                if albums.insert(uuid.clone(), album).is_some() {
                    return Err(LibraryError::AmbiguousTree(uuid));
                }
            }

            Ok(())
        })
    }

    /// Membership of one album directory: asset UUID → linked filename.
    async fn read_album_links(
        &self,
        uuid_path: &Path,
    ) -> Result<std::collections::BTreeMap<String, String>, LibraryError> {
        let mut links = std::collections::BTreeMap::new();
        let mut entries = tokio::fs::read_dir(uuid_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let metadata = match tokio::fs::symlink_metadata(entry.path()).await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if !metadata.is_symlink() {
                continue;
            }
            let linked_filename = entry.file_name().to_string_lossy().into_owned();
            let Ok(target) = tokio::fs::read_link(entry.path()).await else {
                continue;
            };
            let Some(asset_uuid) = target
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
            else {
                continue;
            };
            links.insert(asset_uuid, linked_filename);
        }

        Ok(links)
    }

    /// Classify an album UUID directory by its contents.
    ///
    /// At least one subdirectory makes it a folder (with a warning if real
    /// files sit next to the children); otherwise any non-safe regular
    /// file makes it archived; otherwise it is a plain album.
    pub async fn read_album_kind(&self, uuid_path: &Path) -> Result<AlbumKind, LibraryError> {
        let mut has_subdir = false;
        let mut has_real_file = false;

        let mut entries = tokio::fs::read_dir(uuid_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match tokio::fs::symlink_metadata(entry.path()).await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if metadata.is_symlink() {
                continue;
            }
            if metadata.is_dir() {
                has_subdir = true;
            } else if !is_safe_filename(&entry.file_name().to_string_lossy()) {
                has_real_file = true;
            }
        }

        if has_subdir {
            if has_real_file {
                warn!(
                    path = %uuid_path.display(),
                    "folder contains stray regular files; classifying as folder anyway"
                );
            }
            Ok(AlbumKind::Folder)
        } else if has_real_file {
            Ok(AlbumKind::Archived)
        } else {
            Ok(AlbumKind::Album)
        }
    }

    /// Albums currently sitting in the stash, keyed by UUID.
    ///
    /// The differ needs these to decide between `AlbumAdd` and
    /// `AlbumArchiveRetrieve` for a remote UUID.
    #[instrument(skip(self))]
    pub async fn load_stashed_albums(&self) -> Result<HashMap<String, Album>, LibraryError> {
        let mut stashed = HashMap::new();
        let stash = self.layout.stash_dir();
        let mut entries = match tokio::fs::read_dir(&stash).await {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(stashed),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let metadata = match tokio::fs::symlink_metadata(entry.path()).await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if !metadata.is_symlink() {
                continue;
            }
            let Ok(target) = tokio::fs::read_link(entry.path()).await else {
                continue;
            };
            let Some(uuid) = target
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(uuid_from_dirname)
            else {
                continue;
            };
            stashed.insert(
                uuid.to_string(),
                Album::new(uuid, AlbumKind::Archived, name.as_str(), ""),
            );
        }

        Ok(stashed)
    }

    // ========================================================================
    // Asset writes
    // ========================================================================

    /// Write a downloaded asset to its final path and verify it.
    ///
    /// The remote mtime is stamped onto the file only after the content
    /// check passes; a rejected write leaves the partial file in place for
    /// the next attempt to overwrite.
    ///
    /// # Errors
    /// `VerificationFailed` when the written bytes do not match the
    /// descriptor; the caller decides whether to retry.
    #[instrument(skip(self, bytes), fields(uuid = %asset.uuid, bytes = bytes.len()))]
    pub async fn write_asset(&self, asset: &Asset, bytes: &[u8]) -> Result<(), LibraryError> {
        let path = self.layout.asset_path(&asset.disk_filename());
        tokio::fs::write(&path, bytes).await?;

        if !self.verify_content(asset, &path).await {
            return Err(LibraryError::VerificationFailed {
                uuid: asset.uuid.clone(),
            });
        }

        let mtime = FileTime::from_unix_time(
            asset.modified.timestamp(),
            asset.modified.timestamp_subsec_nanos(),
        );
        filetime::set_file_times(&path, mtime, mtime)?;

        debug!(path = %path.display(), "asset written");
        Ok(())
    }

    /// Full verification of an asset already on disk.
    ///
    /// True iff the file exists, its stat size and read-back length equal
    /// the descriptor, the digest of the read bytes equals the remote
    /// content hash, and its second-precision mtime matches. Partial
    /// files from interrupted downloads fail the mtime check because the
    /// store stamps the remote mtime only after a successful write; a file
    /// with the right size and mtime but the wrong bytes fails the hash
    /// check.
    #[instrument(skip(self), fields(uuid = %asset.uuid))]
    pub async fn verify_asset(&self, asset: &Asset) -> bool {
        let path = self.layout.asset_path(&asset.disk_filename());

        let Ok(metadata) = tokio::fs::metadata(&path).await else {
            return false;
        };
        let mtime = metadata.modified().ok().map(DateTime::<Utc>::from);
        if !asset.matches_stat(metadata.len(), mtime) {
            return false;
        }
        self.verify_content(asset, &path).await
    }

    /// Content half of verification: stat size, read-back length and the
    /// content digest.
    async fn verify_content(&self, asset: &Asset, path: &Path) -> bool {
        let Ok(metadata) = tokio::fs::metadata(path).await else {
            return false;
        };
        if metadata.len() != asset.size_bytes {
            return false;
        }
        match tokio::fs::read(path).await {
            Ok(bytes) => bytes.len() as u64 == asset.size_bytes && asset.matches_content(&bytes),
            Err(_) => false,
        }
    }

    /// Remove an asset file. Idempotent; never touches symlinks to it.
    #[instrument(skip(self), fields(uuid = %record.uuid))]
    pub async fn delete_asset(&self, record: &AssetRecord) -> Result<(), LibraryError> {
        let path = self.layout.asset_path(&record.disk_filename());
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "asset removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // Album paths
    // ========================================================================

    /// Resolve the dual-path pair for an album from its parent UUID.
    ///
    /// # Errors
    /// - `ParentNotFound` when no `.<parent_uuid>` directory exists
    /// - `AmbiguousTree` when more than one does
    pub async fn find_album_paths(
        &self,
        album: &Album,
    ) -> Result<(PathBuf, PathBuf), LibraryError> {
        let parent = self.find_uuid_dir(&album.parent_uuid).await?;
        let name_path = parent.join(album.sanitized_name());
        let uuid_path = parent.join(uuid_dirname(&album.uuid));
        Ok((name_path, uuid_path))
    }

    /// Locate the single directory named `.<uuid>` anywhere in the tree.
    ///
    /// The asset directory is skipped (it contains only files); everything
    /// else, archive and stash included, participates so duplicate UUIDs
    /// are caught wherever they hide.
    async fn find_uuid_dir(&self, uuid: &str) -> Result<PathBuf, LibraryError> {
        if uuid.is_empty() {
            return Ok(self.layout.data_dir().to_path_buf());
        }

        let wanted = uuid_dirname(uuid);
        let asset_dir = self.layout.asset_dir();
        let mut matches = Vec::new();
        let mut stack = vec![self.layout.data_dir().to_path_buf()];

        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "skipping unreadable directory");
                    continue;
                }
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path == asset_dir {
                    continue;
                }
                let Ok(metadata) = tokio::fs::symlink_metadata(&path).await else {
                    continue;
                };
                if !metadata.is_dir() {
                    continue;
                }
                if entry.file_name().to_string_lossy() == wanted.as_str() {
                    matches.push(path.clone());
                }
                stack.push(path);
            }
        }

        match matches.len() {
            0 => Err(LibraryError::ParentNotFound(uuid.to_string())),
            1 => Ok(matches.remove(0)),
            _ => Err(LibraryError::AmbiguousTree(uuid.to_string())),
        }
    }

    // ========================================================================
    // Album writes
    // ========================================================================

    /// Create the dual-path pair for a new album and link its assets.
    ///
    /// # Errors
    /// `AlreadyExists` when either half of the pair is already present.
    #[instrument(skip(self), fields(uuid = %album.uuid, name = %album.display_name))]
    pub async fn write_album(&self, album: &Album) -> Result<(), LibraryError> {
        let (name_path, uuid_path) = self.find_album_paths(album).await?;

        if path_exists(&name_path).await {
            return Err(LibraryError::AlreadyExists(name_path));
        }
        if path_exists(&uuid_path).await {
            return Err(LibraryError::AlreadyExists(uuid_path));
        }

        tokio::fs::create_dir(&uuid_path).await?;
        tokio::fs::symlink(uuid_dirname(&album.uuid), &name_path).await?;

        if album.kind == AlbumKind::Album {
            self.link_album_assets(album, &uuid_path).await;
        }

        info!(path = %name_path.display(), "album written");
        Ok(())
    }

    /// Create the relative asset symlinks for one album.
    ///
    /// Per-link failures are logged and skipped so a re-run over a
    /// partially linked album completes the remainder.
    async fn link_album_assets(&self, album: &Album, uuid_path: &Path) {
        for (asset_uuid, linked_filename) in &album.assets {
            let extension = Path::new(linked_filename)
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            let target_abs = self
                .layout
                .asset_path(&format!("{asset_uuid}.{extension}"));
            let target_rel = relative_path(uuid_path, &target_abs);
            let link = uuid_path.join(linked_filename);

            if let Err(e) = tokio::fs::symlink(&target_rel, &link).await {
                warn!(
                    link = %link.display(),
                    error = %e,
                    "asset link not created, skipping"
                );
                continue;
            }

            // mirror the asset's mtime onto the link itself
            match tokio::fs::metadata(&target_abs).await {
                Ok(metadata) => {
                    let mtime = FileTime::from_last_modification_time(&metadata);
                    if let Err(e) = filetime::set_symlink_file_times(&link, mtime, mtime) {
                        warn!(link = %link.display(), error = %e, "asset link mtime not set");
                    }
                }
                Err(e) => {
                    warn!(
                        link = %link.display(),
                        error = %e,
                        "asset link target missing, mtime not set"
                    );
                }
            }
        }
    }

    /// Swap the name symlink of an album whose UUID and structure are
    /// unchanged. The UUID directory and its asset links are untouched, so
    /// no asset is re-downloaded.
    #[instrument(skip(self), fields(uuid = %old.uuid))]
    pub async fn rename_album(&self, old: &Album, new: &Album) -> Result<(), LibraryError> {
        debug_assert_eq!(old.uuid, new.uuid, "rename must keep the UUID");

        let (old_name_path, uuid_path) = self.find_album_paths(old).await?;
        if !path_exists(&uuid_path).await {
            return Err(LibraryError::MoveSourceMissing(uuid_path));
        }
        let new_name_path = uuid_path
            .parent()
            .unwrap_or(self.layout.data_dir())
            .join(new.sanitized_name());
        if path_exists(&new_name_path).await {
            return Err(LibraryError::AlreadyExists(new_name_path));
        }

        match tokio::fs::remove_file(&old_name_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %old_name_path.display(), "old name symlink already gone");
            }
            Err(e) => return Err(e.into()),
        }
        tokio::fs::symlink(uuid_dirname(&new.uuid), &new_name_path).await?;

        info!(
            from = %old_name_path.display(),
            to = %new_name_path.display(),
            "album renamed"
        );
        Ok(())
    }

    /// Remove an album's dual-path pair.
    ///
    /// Aborts with `NotEmpty` if the UUID directory holds anything but
    /// symlinks and safe files: the user has put content there and the
    /// caller should archive instead.
    #[instrument(skip(self), fields(uuid = %album.uuid))]
    pub async fn delete_album(&self, album: &Album) -> Result<(), LibraryError> {
        let (name_path, uuid_path) = self.find_album_paths(album).await?;

        if !path_exists(&uuid_path).await {
            return Err(LibraryError::MoveSourceMissing(uuid_path));
        }
        if !path_exists(&name_path).await {
            return Err(LibraryError::MoveSourceMissing(name_path));
        }

        let mut entries = tokio::fs::read_dir(&uuid_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = tokio::fs::symlink_metadata(entry.path()).await?;
            if metadata.is_symlink() {
                continue;
            }
            if metadata.is_file() && is_safe_filename(&entry.file_name().to_string_lossy()) {
                continue;
            }
            return Err(LibraryError::NotEmpty(uuid_path));
        }

        tokio::fs::remove_dir_all(&uuid_path).await?;
        tokio::fs::remove_file(&name_path).await?;

        info!(path = %name_path.display(), "album removed");
        Ok(())
    }

    // ========================================================================
    // Archive / stash
    // ========================================================================

    /// Move an archived album's pair into the stash.
    #[instrument(skip(self), fields(uuid = %album.uuid))]
    pub async fn stash_archived_album(&self, album: &Album) -> Result<(), LibraryError> {
        let src = self.find_album_paths(album).await?;
        let stash = self.layout.stash_dir();
        let dst = (
            stash.join(album.sanitized_name()),
            stash.join(uuid_dirname(&album.uuid)),
        );
        self.move_path_tuple(&src, &dst).await?;
        info!(uuid = %album.uuid, "archived album stashed");
        Ok(())
    }

    /// Move a stashed album back under its (possibly new) parent.
    ///
    /// The stash-side name symlink is looked up by target because the
    /// album may have been renamed remotely while stashed.
    #[instrument(skip(self), fields(uuid = %album.uuid))]
    pub async fn retrieve_stashed_album(&self, album: &Album) -> Result<(), LibraryError> {
        let stash = self.layout.stash_dir();
        let src_uuid_path = stash.join(uuid_dirname(&album.uuid));
        let src_name_path = self
            .stash_name_symlink(&album.uuid)
            .await?
            .ok_or_else(|| LibraryError::MoveSourceMissing(src_uuid_path.clone()))?;

        let dst = self.find_album_paths(album).await?;
        self.move_path_tuple(&(src_name_path, src_uuid_path), &dst)
            .await?;
        info!(uuid = %album.uuid, "stashed album retrieved");
        Ok(())
    }

    /// Find the stash name symlink pointing at `.<uuid>`, if any.
    async fn stash_name_symlink(&self, uuid: &str) -> Result<Option<PathBuf>, LibraryError> {
        let wanted = uuid_dirname(uuid);
        let mut entries = tokio::fs::read_dir(self.layout.stash_dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = tokio::fs::symlink_metadata(entry.path()).await?;
            if !metadata.is_symlink() {
                continue;
            }
            if let Ok(target) = tokio::fs::read_link(entry.path()).await {
                if target.as_os_str() == wanted.as_str() {
                    return Ok(Some(entry.path()));
                }
            }
        }
        Ok(None)
    }

    /// Move a dual-path pair between parents.
    ///
    /// The UUID directory is renamed first, then the source name symlink
    /// is unlinked, then a fresh relative symlink is created at the
    /// destination. The link must be recreated rather than moved because
    /// its relative target changes with the parent.
    async fn move_path_tuple(
        &self,
        src: &(PathBuf, PathBuf),
        dst: &(PathBuf, PathBuf),
    ) -> Result<(), LibraryError> {
        let (src_name, src_uuid) = src;
        let (dst_name, dst_uuid) = dst;

        if !path_exists(src_uuid).await {
            return Err(LibraryError::MoveSourceMissing(src_uuid.clone()));
        }
        if !path_exists(src_name).await {
            return Err(LibraryError::MoveSourceMissing(src_name.clone()));
        }
        if path_exists(dst_uuid).await {
            return Err(LibraryError::MoveDestinationExists(dst_uuid.clone()));
        }
        if path_exists(dst_name).await {
            return Err(LibraryError::MoveDestinationExists(dst_name.clone()));
        }

        tokio::fs::rename(src_uuid, dst_uuid).await?;
        tokio::fs::remove_file(src_name).await?;

        let target = dst_uuid
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tokio::fs::symlink(&target, dst_name).await?;

        debug!(
            from = %src_uuid.display(),
            to = %dst_uuid.display(),
            "path tuple moved"
        );
        Ok(())
    }

    /// Promote every album still in the stash into the archive directory.
    ///
    /// Stash entries were never retrieved this run, so their remote
    /// counterpart is gone for good. Each UUID directory is renamed into
    /// the archive root under its human name (collision-suffixed) and the
    /// stash name symlink is dropped; promoted orphans are plain named
    /// directories, no longer dual-path pairs.
    #[instrument(skip(self))]
    pub async fn clean_archived_orphans(&self) -> Result<(), LibraryError> {
        let stash = self.layout.stash_dir();
        let archive = self.layout.archive_dir();

        // first pass: name symlinks by target, so each UUID dir can be
        // promoted under its display name
        let mut names: HashMap<String, (String, PathBuf)> = HashMap::new();
        let mut uuid_dirs: Vec<(String, PathBuf)> = Vec::new();

        let mut entries = tokio::fs::read_dir(&stash).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let metadata = tokio::fs::symlink_metadata(entry.path()).await?;
            if metadata.is_symlink() {
                if let Ok(target) = tokio::fs::read_link(entry.path()).await {
                    names.insert(
                        target.to_string_lossy().into_owned(),
                        (name, entry.path()),
                    );
                }
            } else if metadata.is_dir() {
                if let Some(uuid) = uuid_from_dirname(&name) {
                    uuid_dirs.push((uuid.to_string(), entry.path()));
                }
            }
        }

        for (uuid, dir_path) in uuid_dirs {
            let dirname = uuid_dirname(&uuid);
            let (base, symlink_path) = match names.remove(&dirname) {
                Some((name, link)) => (name, Some(link)),
                None => (uuid.clone(), None),
            };

            let mut candidate = archive.join(&base);
            let mut suffix: u32 = 1;
            while path_exists(&candidate).await {
                candidate = archive.join(format!("{base}-{suffix}"));
                suffix += 1;
            }

            tokio::fs::rename(&dir_path, &candidate).await?;
            if let Some(link) = symlink_path {
                if let Err(e) = tokio::fs::remove_file(&link).await {
                    warn!(path = %link.display(), error = %e, "stash symlink not removed");
                }
            }
            info!(
                uuid = %uuid,
                to = %candidate.display(),
                "orphaned archived album promoted"
            );
        }

        Ok(())
    }
}

/// lstat-based existence check: a dangling symlink still counts.
async fn path_exists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

// ============================================================================
// Tests
// ============================================================================
