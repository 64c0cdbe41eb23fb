//! Photomirror Store - filesystem-backed local library
//!
//! The sole mutator of the on-disk tree. Owns all path arithmetic for the
//! dual-path album scheme, the flat asset directory, and the archive/stash
//! area.

pub mod layout;
pub mod store;

pub use layout::LibraryLayout;
pub use store::{AssetRecord, LibraryStore};
