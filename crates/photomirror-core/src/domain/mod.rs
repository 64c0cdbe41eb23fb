//! Domain entities for the local photo library
//!
//! The domain layer has no filesystem or network dependencies. Remote
//! identifiers are opaque strings assigned by the photo service; they are
//! not RFC 4122 UUIDs and are never parsed, only compared.

pub mod album;
pub mod asset;
pub mod content_hash;
pub mod errors;

pub use album::{Album, AlbumKind};
pub use asset::{Asset, AssetKind};
pub use errors::LibraryError;
