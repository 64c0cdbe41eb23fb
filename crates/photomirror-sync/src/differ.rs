//! Plan computation
//!
//! [`diff`] is a pure function from `(remote state, local state)` to the
//! ordered list of write operations that transforms one into the other.
//! It never touches the filesystem or the network; the engine gathers the
//! inputs and executes the output.
//!
//! ## Ordering
//!
//! The plan is ranked so that every operation's preconditions are
//! established by the operations before it:
//!
//! 1. `AssetAdd`: an album link's target must exist before the album
//! 2. `AlbumArchiveStash`: user data leaves the tree before any remove
//! 3. `AlbumRemove`, children before parents
//! 4. `AssetRemove`: only after no symlink references the file
//! 5. `AlbumArchiveRetrieve` and `AlbumAdd`, parents before children
//!
//! Within a rank, operations are ordered by UUID ascending, so a fixed
//! input always yields an identical plan.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use photomirror_core::domain::{Album, AlbumKind, Asset};
use photomirror_store::AssetRecord;

// ============================================================================
// Inputs
// ============================================================================

/// Remote listings, keyed by UUID
#[derive(Debug, Clone, Default)]
pub struct RemoteState {
    pub albums: HashMap<String, Album>,
    pub assets: HashMap<String, Asset>,
}

/// Local on-disk state as loaded by the store
#[derive(Debug, Clone, Default)]
pub struct LocalState {
    pub albums: HashMap<String, Album>,
    pub assets: HashMap<String, AssetRecord>,
    /// Albums currently sitting in the stash
    pub stashed: HashMap<String, Album>,
    /// Remote asset UUIDs whose on-disk file failed verification
    pub invalid_assets: HashSet<String>,
}

// ============================================================================
// Operations
// ============================================================================

/// One step of a sync plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOperation {
    AssetAdd(Asset),
    AssetRemove(AssetRecord),
    AlbumAdd(Album),
    AlbumRemove(Album),
    AlbumArchiveStash(Album),
    AlbumArchiveRetrieve(Album),
}

impl SyncOperation {
    /// UUID the operation acts on, for tie-breaking and logging.
    pub fn uuid(&self) -> &str {
        match self {
            SyncOperation::AssetAdd(a) => &a.uuid,
            SyncOperation::AssetRemove(r) => &r.uuid,
            SyncOperation::AlbumAdd(a)
            | SyncOperation::AlbumRemove(a)
            | SyncOperation::AlbumArchiveStash(a)
            | SyncOperation::AlbumArchiveRetrieve(a) => &a.uuid,
        }
    }
}

// ============================================================================
// diff
// ============================================================================

/// Compute the ordered operation plan transforming `local` into `remote`.
pub fn diff(remote: &RemoteState, local: &LocalState) -> Vec<SyncOperation> {
    let mut asset_adds: Vec<&Asset> = Vec::new();
    let mut asset_removes: Vec<&AssetRecord> = Vec::new();

    // --- assets ---
    for (uuid, asset) in &remote.assets {
        match local.assets.get(uuid) {
            None => asset_adds.push(asset),
            Some(record) => {
                if record.extension != asset.extension {
                    // the on-disk filename changes, so the old file must go
                    asset_removes.push(record);
                    asset_adds.push(asset);
                } else if local.invalid_assets.contains(uuid) {
                    asset_adds.push(asset);
                }
            }
        }
    }
    for (uuid, record) in &local.assets {
        if !remote.assets.contains_key(uuid) {
            asset_removes.push(record);
        }
    }

    // --- albums ---
    let mut album_adds: Vec<&Album> = Vec::new();
    let mut album_removes: Vec<&Album> = Vec::new();
    let mut stashes: Vec<&Album> = Vec::new();
    let mut retrieves: Vec<&Album> = Vec::new();

    for (uuid, remote_album) in &remote.albums {
        if remote_album.kind == AlbumKind::Root {
            continue;
        }
        if local.stashed.contains_key(uuid) {
            retrieves.push(remote_album);
            continue;
        }
        match local.albums.get(uuid) {
            None => album_adds.push(remote_album),
            // a locally archived album whose UUID remote still lists is
            // retained untouched, whatever the remote says about it
            Some(l) if l.kind == AlbumKind::Archived => {}
            Some(l) if album_changed(remote_album, l) => {
                album_removes.push(l);
                album_adds.push(remote_album);
            }
            Some(_) => {}
        }
    }
    for (uuid, local_album) in &local.albums {
        if remote.albums.contains_key(uuid) {
            continue;
        }
        if local_album.kind == AlbumKind::Archived {
            stashes.push(local_album);
        } else {
            album_removes.push(local_album);
        }
    }

    // --- ordering ---
    let remote_depths = depths(&remote.albums);
    let local_depths = depths(&local.albums);

    asset_adds.sort_by(|a, b| a.uuid.cmp(&b.uuid));
    asset_removes.sort_by(|a, b| a.uuid.cmp(&b.uuid));
    stashes.sort_by(|a, b| a.uuid.cmp(&b.uuid));
    album_removes.sort_by(|a, b| {
        let da = local_depths.get(&a.uuid).copied().unwrap_or(0);
        let db = local_depths.get(&b.uuid).copied().unwrap_or(0);
        db.cmp(&da).then_with(|| a.uuid.cmp(&b.uuid))
    });
    // retrieves and adds share a rank: both need their parent in place first
    let mut structure_adds: Vec<(&Album, bool)> = retrieves
        .into_iter()
        .map(|a| (a, true))
        .chain(album_adds.into_iter().map(|a| (a, false)))
        .collect();
    structure_adds.sort_by(|(a, _), (b, _)| {
        let da = remote_depths.get(&a.uuid).copied().unwrap_or(0);
        let db = remote_depths.get(&b.uuid).copied().unwrap_or(0);
        da.cmp(&db).then_with(|| a.uuid.cmp(&b.uuid))
    });

    let mut plan = Vec::new();
    plan.extend(asset_adds.into_iter().cloned().map(SyncOperation::AssetAdd));
    plan.extend(
        stashes
            .into_iter()
            .cloned()
            .map(SyncOperation::AlbumArchiveStash),
    );
    plan.extend(
        album_removes
            .into_iter()
            .cloned()
            .map(SyncOperation::AlbumRemove),
    );
    plan.extend(
        asset_removes
            .into_iter()
            .cloned()
            .map(SyncOperation::AssetRemove),
    );
    plan.extend(structure_adds.into_iter().map(|(album, retrieve)| {
        if retrieve {
            SyncOperation::AlbumArchiveRetrieve(album.clone())
        } else {
            SyncOperation::AlbumAdd(album.clone())
        }
    }));

    debug!(operations = plan.len(), "plan computed");
    plan
}

/// True when the on-disk album no longer matches the remote one.
///
/// The store writes the *sanitized* display name, so the loaded local
/// name is compared against the remote name after sanitization;
/// otherwise an album whose remote name needs sanitizing would be
/// rebuilt on every run.
fn album_changed(remote: &Album, local: &Album) -> bool {
    local.display_name != remote.sanitized_name()
        || local.parent_uuid != remote.parent_uuid
        || local.kind != remote.kind
        || local.assets != remote.assets
}

/// Tree depth per album UUID (top-level = 0), cycle-safe.
fn depths(albums: &HashMap<String, Album>) -> HashMap<String, usize> {
    let mut out = HashMap::new();
    for uuid in albums.keys() {
        let mut depth = 0;
        let mut seen = HashSet::new();
        let mut current = uuid.as_str();
        while let Some(album) = albums.get(current) {
            if album.parent_uuid.is_empty() || !seen.insert(current) {
                break;
            }
            depth += 1;
            current = album.parent_uuid.as_str();
        }
        out.insert(uuid.clone(), depth);
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use photomirror_core::domain::AssetKind;

    use super::*;

    fn asset(uuid: &str) -> Asset {
        Asset::new(
            uuid,
            format!("IMG_{uuid}"),
            "jpg",
            9,
            "hash",
            Utc.with_ymd_and_hms(2023, 5, 17, 12, 30, 0).unwrap(),
            AssetKind::Original,
        )
    }

    fn record(uuid: &str) -> AssetRecord {
        AssetRecord {
            uuid: uuid.into(),
            extension: "jpg".into(),
            size_bytes: 9,
            modified: None,
        }
    }

    fn remote_with(albums: Vec<Album>, assets: Vec<Asset>) -> RemoteState {
        RemoteState {
            albums: albums.into_iter().map(|a| (a.uuid.clone(), a)).collect(),
            assets: assets.into_iter().map(|a| (a.uuid.clone(), a)).collect(),
        }
    }

    fn local_with(albums: Vec<Album>, assets: Vec<AssetRecord>) -> LocalState {
        LocalState {
            albums: albums.into_iter().map(|a| (a.uuid.clone(), a)).collect(),
            assets: assets.into_iter().map(|a| (a.uuid.clone(), a)).collect(),
            stashed: HashMap::new(),
            invalid_assets: HashSet::new(),
        }
    }

    // ------------------------------------------------------------------
    // scenario 1: fresh sync
    // ------------------------------------------------------------------

    #[test]
    fn fresh_sync_orders_assets_before_albums() {
        let album = Album::new("aaa", AlbumKind::Album, "Vacation", "")
            .with_asset("p1", "a1.jpg")
            .with_asset("p2", "a2.jpg");
        let remote = remote_with(vec![album.clone()], vec![asset("p1"), asset("p2")]);
        let local = LocalState::default();

        let plan = diff(&remote, &local);
        assert_eq!(
            plan,
            vec![
                SyncOperation::AssetAdd(asset("p1")),
                SyncOperation::AssetAdd(asset("p2")),
                SyncOperation::AlbumAdd(album),
            ]
        );
    }

    // ------------------------------------------------------------------
    // P2: idempotence
    // ------------------------------------------------------------------

    #[test]
    fn unchanged_state_yields_empty_plan() {
        let album = Album::new("aaa", AlbumKind::Album, "Vacation", "").with_asset("p1", "a1.jpg");
        let remote = remote_with(vec![album.clone()], vec![asset("p1")]);
        let local = local_with(vec![album], vec![record("p1")]);

        assert!(diff(&remote, &local).is_empty());
    }

    // ------------------------------------------------------------------
    // P5: determinism
    // ------------------------------------------------------------------

    #[test]
    fn plan_is_deterministic_for_fixed_inputs() {
        let remote = remote_with(
            vec![
                Album::new("b", AlbumKind::Album, "B", ""),
                Album::new("a", AlbumKind::Album, "A", ""),
                Album::new("c", AlbumKind::Folder, "C", ""),
                Album::new("d", AlbumKind::Album, "D", "c"),
            ],
            vec![asset("p3"), asset("p1"), asset("p2")],
        );
        let local = LocalState::default();

        let first = diff(&remote, &local);
        for _ in 0..10 {
            assert_eq!(diff(&remote, &local), first);
        }

        // assets first, UUID ascending; then albums parent-first
        let uuids: Vec<&str> = first.iter().map(|op| op.uuid()).collect();
        assert_eq!(uuids, vec!["p1", "p2", "p3", "a", "b", "c", "d"]);
    }

    #[test]
    fn sanitized_disk_name_does_not_churn() {
        // remote name needs sanitizing; the store wrote the safe form
        let remote_album = Album::new("aaa", AlbumKind::Album, "Trips/2023", "");
        let on_disk = Album::new("aaa", AlbumKind::Album, "Trips_2023", "");
        let remote = remote_with(vec![remote_album], vec![]);
        let local = local_with(vec![on_disk], vec![]);

        assert!(diff(&remote, &local).is_empty());
    }

    // ------------------------------------------------------------------
    // removals
    // ------------------------------------------------------------------

    #[test]
    fn album_absent_remotely_is_removed() {
        let album = Album::new("aaa", AlbumKind::Album, "Vacation", "");
        let remote = RemoteState::default();
        let local = local_with(vec![album.clone()], vec![]);

        assert_eq!(diff(&remote, &local), vec![SyncOperation::AlbumRemove(album)]);
    }

    #[test]
    fn album_removes_precede_asset_removes() {
        let album = Album::new("aaa", AlbumKind::Album, "Vacation", "").with_asset("p1", "a1.jpg");
        let remote = RemoteState::default();
        let local = local_with(vec![album.clone()], vec![record("p1")]);

        let plan = diff(&remote, &local);
        assert_eq!(
            plan,
            vec![
                SyncOperation::AlbumRemove(album),
                SyncOperation::AssetRemove(record("p1")),
            ]
        );
    }

    #[test]
    fn nested_removes_run_children_first() {
        let folder = Album::new("fff", AlbumKind::Folder, "Trips", "");
        let child = Album::new("aaa", AlbumKind::Album, "Rome", "fff");
        let remote = RemoteState::default();
        let local = local_with(vec![folder.clone(), child.clone()], vec![]);

        let plan = diff(&remote, &local);
        assert_eq!(
            plan,
            vec![
                SyncOperation::AlbumRemove(child),
                SyncOperation::AlbumRemove(folder),
            ]
        );
    }

    #[test]
    fn nested_adds_run_parents_first() {
        let folder = Album::new("zzz", AlbumKind::Folder, "Trips", "");
        let child = Album::new("aaa", AlbumKind::Album, "Rome", "zzz");
        let remote = remote_with(vec![child.clone(), folder.clone()], vec![]);
        let local = LocalState::default();

        let plan = diff(&remote, &local);
        assert_eq!(
            plan,
            vec![
                SyncOperation::AlbumAdd(folder),
                SyncOperation::AlbumAdd(child),
            ]
        );
    }

    // ------------------------------------------------------------------
    // scenario 2: rename is remove + add with the same UUID
    // ------------------------------------------------------------------

    #[test]
    fn rename_emits_same_uuid_remove_then_add() {
        let old = Album::new("aaa", AlbumKind::Album, "Vacation", "").with_asset("p1", "a1.jpg");
        let new = Album::new("aaa", AlbumKind::Album, "Holiday", "").with_asset("p1", "a1.jpg");
        let remote = remote_with(vec![new.clone()], vec![asset("p1")]);
        let local = local_with(vec![old.clone()], vec![record("p1")]);

        let plan = diff(&remote, &local);
        assert_eq!(
            plan,
            vec![
                SyncOperation::AlbumRemove(old.clone()),
                SyncOperation::AlbumAdd(new.clone()),
            ]
        );
        // no asset churn
        assert!(new.is_rename_of(&old));
    }

    // ------------------------------------------------------------------
    // scenario 3: archive stash
    // ------------------------------------------------------------------

    #[test]
    fn archived_album_dropped_remotely_is_stashed_not_removed() {
        let archived = Album::new("bbb", AlbumKind::Archived, "Scans", "");
        let remote = RemoteState::default();
        let local = local_with(vec![archived.clone()], vec![]);

        assert_eq!(
            diff(&remote, &local),
            vec![SyncOperation::AlbumArchiveStash(archived)]
        );
    }

    #[test]
    fn archived_album_still_listed_remotely_is_retained() {
        let archived = Album::new("bbb", AlbumKind::Archived, "Scans", "");
        let remote_view = Album::new("bbb", AlbumKind::Album, "Scans", "").with_asset("p1", "a.jpg");
        let remote = remote_with(vec![remote_view], vec![asset("p1")]);
        let local = LocalState {
            invalid_assets: HashSet::new(),
            ..local_with(vec![archived], vec![record("p1")])
        };

        assert!(diff(&remote, &local).is_empty());
    }

    #[test]
    fn stash_precedes_sibling_removes() {
        let archived = Album::new("zzz", AlbumKind::Archived, "Scans", "");
        let plain = Album::new("aaa", AlbumKind::Album, "Vacation", "");
        let remote = RemoteState::default();
        let local = local_with(vec![archived.clone(), plain.clone()], vec![]);

        let plan = diff(&remote, &local);
        assert_eq!(
            plan,
            vec![
                SyncOperation::AlbumArchiveStash(archived),
                SyncOperation::AlbumRemove(plain),
            ]
        );
    }

    // ------------------------------------------------------------------
    // scenario 6: stash round-trip
    // ------------------------------------------------------------------

    #[test]
    fn stashed_uuid_listed_remotely_is_retrieved() {
        let stashed = Album::new("eee", AlbumKind::Archived, "Scans", "");
        let remote_album = Album::new("eee", AlbumKind::Album, "Scans", "");
        let remote = remote_with(vec![remote_album.clone()], vec![]);
        let local = LocalState {
            stashed: [("eee".to_string(), stashed)].into_iter().collect(),
            ..LocalState::default()
        };

        assert_eq!(
            diff(&remote, &local),
            vec![SyncOperation::AlbumArchiveRetrieve(remote_album)]
        );
    }

    // ------------------------------------------------------------------
    // scenario 4: dangling link / failed verification
    // ------------------------------------------------------------------

    #[test]
    fn missing_asset_is_re_added() {
        let album = Album::new("ccc", AlbumKind::Album, "C", "").with_asset("missing", "foo.jpg");
        let remote = remote_with(vec![album.clone()], vec![asset("missing")]);
        let local = local_with(vec![album], vec![]);

        assert_eq!(
            diff(&remote, &local),
            vec![SyncOperation::AssetAdd(asset("missing"))]
        );
    }

    #[test]
    fn invalid_asset_is_re_added() {
        let remote = remote_with(vec![], vec![asset("p1")]);
        let mut local = local_with(vec![], vec![record("p1")]);
        local.invalid_assets.insert("p1".to_string());

        assert_eq!(
            diff(&remote, &local),
            vec![SyncOperation::AssetAdd(asset("p1"))]
        );
    }

    #[test]
    fn extension_change_replaces_the_file() {
        let mut remote_asset = asset("p1");
        remote_asset.extension = "heic".into();
        let remote = remote_with(vec![], vec![remote_asset.clone()]);
        let local = local_with(vec![], vec![record("p1")]);

        let plan = diff(&remote, &local);
        assert_eq!(
            plan,
            vec![
                SyncOperation::AssetAdd(remote_asset),
                SyncOperation::AssetRemove(record("p1")),
            ]
        );
    }
}
