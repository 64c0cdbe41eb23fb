//! Remote photo library port (driven/secondary port)
//!
//! This module defines the interface to the remote photo service. The
//! engine only ever sees listings and byte payloads; authentication, MFA
//! capture and HTTP transport are the adapter's business.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are
//!   adapter-specific and don't need domain-level classification.
//! - Uses `#[async_trait]` for async trait methods.
//! - Listings are keyed by UUID so the differ can match remote against
//!   local state without re-sorting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Album, Asset};

// ============================================================================
// Photos zones
// ============================================================================

/// Which logical partition of the account a zone descriptor refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    Primary,
    Shared,
}

/// Descriptor of a photos zone, populated after authentication
///
/// The engine treats zones as opaque metadata handed back to the network
/// collaborator on every listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotosZone {
    pub zone_name: String,
    pub zone_type: ZoneType,
    pub owner_record_name: String,
}

impl PhotosZone {
    pub fn new(
        zone_name: impl Into<String>,
        zone_type: ZoneType,
        owner_record_name: impl Into<String>,
    ) -> Self {
        Self {
            zone_name: zone_name.into(),
            zone_type,
            owner_record_name: owner_record_name.into(),
        }
    }
}

// ============================================================================
// RemoteLibrary trait
// ============================================================================

/// Port trait for the remote photo service
///
/// The production implementation wraps the service's HTTP API; tests use an
/// in-memory fake. All calls may suspend and carry the adapter's own
/// per-request timeouts.
#[async_trait::async_trait]
pub trait RemoteLibrary: Send + Sync {
    /// Fetch the full album tree, keyed by album UUID.
    ///
    /// The synthetic root is never part of the listing.
    async fn fetch_albums(&self) -> anyhow::Result<HashMap<String, Album>>;

    /// Fetch all asset descriptors, keyed by asset UUID.
    async fn fetch_assets(&self) -> anyhow::Result<HashMap<String, Asset>>;

    /// Download the full content of one asset.
    ///
    /// # Errors
    /// Returns an error on any transport failure; the engine retries per
    /// its own policy.
    async fn download_asset(&self, asset: &Asset) -> anyhow::Result<Vec<u8>>;

    /// Signal the service to delete the given assets remotely.
    ///
    /// Only invoked when the `remote_delete` option is enabled; adapters
    /// for read-only deployments implement this as a no-op.
    async fn delete_assets(&self, uuids: &[String]) -> anyhow::Result<()>;
}
