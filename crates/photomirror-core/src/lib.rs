//! Photomirror Core - domain model and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - Domain entities (Asset, Album) and the library error taxonomy
//! - Port definitions (traits for adapters)
//! - The flat configuration record with builder and validation
//! - Process-wide shared resources with the one-shot setup contract

pub mod config;
pub mod domain;
pub mod ports;
pub mod resources;

pub use domain::{Album, AlbumKind, Asset, AssetKind, LibraryError};
