//! Port definitions (traits for adapters)
//!
//! The remote photo service and the progress consumers live outside the
//! engine; these modules define the seams they plug into.

pub mod event_sink;
pub mod remote_library;

pub use event_sink::{EventBus, SyncEvent};
pub use remote_library::{PhotosZone, RemoteLibrary, ZoneType};
