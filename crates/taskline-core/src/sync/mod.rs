//! Synchronization with the remote task service.
//!
//! [`SyncEngine`] drives rounds; the translator, reconciler and wire
//! protocol are pure and usable on their own.

mod engine;
mod http;
pub mod protocol;
pub mod reconciler;
pub mod translator;
mod transport;

pub use engine::{SyncEngine, SyncOutcome, SyncReport, SyncStatus};
pub use http::HttpSyncClient;
pub use protocol::{CommandAck, ConflictEntry, SyncBatch, SyncResponse, WireCommand};
pub use reconciler::{ConflictReport, FailedCommand, IdRemap, Reconciler, Reconciliation};
pub use transport::{FolderDirectory, SyncTransport};
