//! Process-wide shared resources
//!
//! A single [`SharedResources`] value is constructed once at startup via
//! [`SharedResources::setup`] and handed explicitly to each component.
//! The one-shot contract is enforced by a process-wide flag: a second
//! `setup` fails with `AlreadyInitiated`, and [`SharedResources::current`]
//! before any `setup` fails with `NotInitiated`. Tests construct detached
//! instances that never touch the process-wide slot.
//!
//! The resource file `.photos-library.db` persists the library version and
//! the trust token across runs. Trust token mutation rewrites it atomically
//! (temp file + rename); a failed rewrite is reported as a warning and the
//! run continues, since the token can be re-established on the next
//! authentication.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::LibraryError;
use crate::ports::event_sink::EventBus;
use crate::ports::remote_library::PhotosZone;

/// Name of the resource file inside the data directory
pub const RESOURCE_FILE_NAME: &str = ".photos-library.db";

/// Library layout version written to fresh resource files
pub const LIBRARY_VERSION: u32 = 1;

static SETUP_DONE: AtomicBool = AtomicBool::new(false);
static CURRENT: OnceLock<Arc<SharedResources>> = OnceLock::new();

// ============================================================================
// Resource file
// ============================================================================

/// On-disk shape of `.photos-library.db`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ResourceFile {
    #[serde(rename = "libraryVersion")]
    library_version: u32,
    #[serde(rename = "trustToken", skip_serializing_if = "Option::is_none")]
    trust_token: Option<String>,
}

impl ResourceFile {
    fn fresh() -> Self {
        Self {
            library_version: LIBRARY_VERSION,
            trust_token: None,
        }
    }

    /// Read the resource file, creating a fresh one when absent.
    ///
    /// An unparseable file is a hard error: silently replacing it would
    /// discard a trust token the user may still need.
    fn load_or_create(path: &Path) -> Result<Self, LibraryError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| LibraryError::InvalidResourceFile {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "resource file absent, creating");
                let fresh = Self::fresh();
                fresh.store(path)?;
                Ok(fresh)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically rewrite the resource file via temp file + rename.
    fn store(&self, path: &Path) -> Result<(), LibraryError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            LibraryError::UnableToWriteFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        let tmp_path = {
            let mut p = path.as_os_str().to_owned();
            p.push(".tmp");
            PathBuf::from(p)
        };

        std::fs::write(&tmp_path, &json)
            .and_then(|_| std::fs::rename(&tmp_path, path))
            .map_err(|e| LibraryError::UnableToWriteFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

// ============================================================================
// SharedResources
// ============================================================================

/// Process-wide state shared by all components
///
/// Not default-constructible; the only public constructors are
/// [`setup`](Self::setup) (registers the process-wide instance) and
/// [`detached`](Self::detached) (independent instance for tests and
/// embedders).
#[derive(Debug)]
pub struct SharedResources {
    config: Config,
    events: EventBus,
    resource_path: PathBuf,
    trust_token: RwLock<Option<String>>,
    primary_zone: RwLock<Option<PhotosZone>>,
    shared_zone: RwLock<Option<PhotosZone>>,
}

impl SharedResources {
    /// One-shot initialization of the process-wide instance.
    ///
    /// Reads (or creates) the resource file under `config.data_dir`,
    /// applies the `trust_token` override and `refresh_token` flag, and
    /// registers the instance for [`current`](Self::current).
    ///
    /// # Errors
    /// - `AlreadyInitiated` when called a second time
    /// - `InvalidResourceFile` when the resource file cannot be parsed
    pub fn setup(config: Config) -> Result<Arc<Self>, LibraryError> {
        if SETUP_DONE.swap(true, Ordering::SeqCst) {
            return Err(LibraryError::AlreadyInitiated);
        }

        let resources = Arc::new(Self::build(config)?);
        // swap above guarantees single entry, so this set never races
        let _ = CURRENT.set(Arc::clone(&resources));
        info!("shared resources initiated");
        Ok(resources)
    }

    /// The process-wide instance registered by [`setup`](Self::setup).
    pub fn current() -> Result<Arc<Self>, LibraryError> {
        CURRENT.get().cloned().ok_or(LibraryError::NotInitiated)
    }

    /// Construct an independent instance without touching the process-wide
    /// slot. Tests and embedders hosting several libraries use this.
    pub fn detached(config: Config) -> Result<Self, LibraryError> {
        Self::build(config)
    }

    fn build(config: Config) -> Result<Self, LibraryError> {
        let resource_path = config.data_dir.join(RESOURCE_FILE_NAME);
        let mut file = ResourceFile::load_or_create(&resource_path)?;

        if config.refresh_token && file.trust_token.take().is_some() {
            debug!("refresh_token set, clearing stored trust token");
            file.store(&resource_path)?;
        }

        // an explicit option wins over the stored value but is not
        // persisted until the auth collaborator confirms it
        let token = config.trust_token.clone().or(file.trust_token);

        Ok(Self {
            config,
            events: EventBus::new(),
            resource_path,
            trust_token: RwLock::new(token),
            primary_zone: RwLock::new(None),
            shared_zone: RwLock::new(None),
        })
    }

    // ------------------------------------------------------------------
    // accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn trust_token(&self) -> Option<String> {
        self.trust_token.read().expect("trust token lock").clone()
    }

    /// Replace the trust token and persist it.
    ///
    /// The rewrite is best-effort: on failure a warning is logged and the
    /// in-memory token is kept, so the current run keeps working.
    pub fn set_trust_token(&self, token: impl Into<String>) {
        let token = token.into();
        *self.trust_token.write().expect("trust token lock") = Some(token.clone());

        let file = ResourceFile {
            library_version: LIBRARY_VERSION,
            trust_token: Some(token),
        };
        if let Err(e) = file.store(&self.resource_path) {
            warn!(error = %e, "trust token update not persisted");
        }
    }

    // ------------------------------------------------------------------
    // zones (in-memory only, populated after authentication)
    // ------------------------------------------------------------------

    pub fn set_zones(&self, primary: Option<PhotosZone>, shared: Option<PhotosZone>) {
        *self.primary_zone.write().expect("zone lock") = primary;
        *self.shared_zone.write().expect("zone lock") = shared;
    }

    /// The primary photos zone; absence is fatal for any remote call.
    pub fn primary_zone(&self) -> Result<PhotosZone, LibraryError> {
        self.primary_zone
            .read()
            .expect("zone lock")
            .clone()
            .ok_or(LibraryError::NoPrimaryZone)
    }

    pub fn shared_zone(&self) -> Result<PhotosZone, LibraryError> {
        self.shared_zone
            .read()
            .expect("zone lock")
            .clone()
            .ok_or(LibraryError::NoSharedZone)
    }

    /// Whether the account exposes a shared library zone.
    ///
    /// Reads the shared descriptor itself, never the primary one.
    pub fn shared_zone_available(&self) -> bool {
        self.shared_zone.read().expect("zone lock").is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::config::ConfigBuilder;
    use crate::ports::remote_library::ZoneType;

    fn config_in(dir: &TempDir) -> Config {
        ConfigBuilder::new()
            .data_dir(dir.path().to_path_buf())
            .username("user@example.com")
            .build()
    }

    #[test]
    fn detached_creates_resource_file_when_absent() {
        let dir = TempDir::new().unwrap();
        let res = SharedResources::detached(config_in(&dir)).unwrap();

        let content = std::fs::read_to_string(dir.path().join(RESOURCE_FILE_NAME)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["libraryVersion"], LIBRARY_VERSION);
        assert!(res.trust_token().is_none());
    }

    #[test]
    fn detached_reads_existing_trust_token() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(RESOURCE_FILE_NAME),
            r#"{"libraryVersion": 1, "trustToken": "stored-token"}"#,
        )
        .unwrap();

        let res = SharedResources::detached(config_in(&dir)).unwrap();
        assert_eq!(res.trust_token().as_deref(), Some("stored-token"));
    }

    #[test]
    fn config_trust_token_overrides_stored_value() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(RESOURCE_FILE_NAME),
            r#"{"libraryVersion": 1, "trustToken": "stored-token"}"#,
        )
        .unwrap();

        let cfg = ConfigBuilder::new()
            .data_dir(dir.path().to_path_buf())
            .username("user@example.com")
            .trust_token("override-token")
            .build();
        let res = SharedResources::detached(cfg).unwrap();
        assert_eq!(res.trust_token().as_deref(), Some("override-token"));
    }

    #[test]
    fn refresh_token_clears_stored_value() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(RESOURCE_FILE_NAME),
            r#"{"libraryVersion": 1, "trustToken": "stale-token"}"#,
        )
        .unwrap();

        let cfg = ConfigBuilder::new()
            .data_dir(dir.path().to_path_buf())
            .username("user@example.com")
            .refresh_token(true)
            .build();
        let res = SharedResources::detached(cfg).unwrap();
        assert!(res.trust_token().is_none());

        // the cleared state is persisted
        let content = std::fs::read_to_string(dir.path().join(RESOURCE_FILE_NAME)).unwrap();
        assert!(!content.contains("stale-token"));
    }

    #[test]
    fn invalid_resource_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(RESOURCE_FILE_NAME), "not json {{{").unwrap();

        let err = SharedResources::detached(config_in(&dir)).unwrap_err();
        assert!(matches!(err, LibraryError::InvalidResourceFile { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn set_trust_token_persists_atomically() {
        let dir = TempDir::new().unwrap();
        let res = SharedResources::detached(config_in(&dir)).unwrap();

        res.set_trust_token("fresh-token");
        assert_eq!(res.trust_token().as_deref(), Some("fresh-token"));

        let content = std::fs::read_to_string(dir.path().join(RESOURCE_FILE_NAME)).unwrap();
        assert!(content.contains("fresh-token"));
        // no leftover temp file
        assert!(!dir
            .path()
            .join(format!("{RESOURCE_FILE_NAME}.tmp"))
            .exists());
    }

    #[test]
    fn zones_default_absent_and_shared_reads_its_own_field() {
        let dir = TempDir::new().unwrap();
        let res = SharedResources::detached(config_in(&dir)).unwrap();

        assert!(matches!(
            res.primary_zone().unwrap_err(),
            LibraryError::NoPrimaryZone
        ));
        assert!(!res.shared_zone_available());

        // primary alone does not make the shared zone available
        res.set_zones(
            Some(PhotosZone::new("PrimarySync", ZoneType::Primary, "_owner")),
            None,
        );
        assert!(res.primary_zone().is_ok());
        assert!(!res.shared_zone_available());
        assert!(matches!(
            res.shared_zone().unwrap_err(),
            LibraryError::NoSharedZone
        ));

        res.set_zones(
            Some(PhotosZone::new("PrimarySync", ZoneType::Primary, "_owner")),
            Some(PhotosZone::new("SharedSync", ZoneType::Shared, "_owner")),
        );
        assert!(res.shared_zone_available());
        assert_eq!(res.shared_zone().unwrap().zone_name, "SharedSync");
    }

    // The process-wide slot can only be exercised once per process, so the
    // whole contract lives in a single test.
    #[test]
    fn one_shot_setup_contract() {
        let dir = TempDir::new().unwrap();

        assert!(matches!(
            SharedResources::current().unwrap_err(),
            LibraryError::NotInitiated
        ));

        let first = SharedResources::setup(config_in(&dir)).unwrap();
        assert!(Arc::ptr_eq(&first, &SharedResources::current().unwrap()));

        let second = SharedResources::setup(config_in(&dir));
        assert!(matches!(
            second.unwrap_err(),
            LibraryError::AlreadyInitiated
        ));
    }
}
