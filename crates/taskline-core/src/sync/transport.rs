//! Seams between the sync engine and the remote service.

use super::protocol::{SyncBatch, SyncResponse};
use crate::error::Result;
use crate::models::{Folder, UserId};

/// Carries one batch to the server and returns its reply.
///
/// Transport failures (connect, timeout, non-2xx) are `Error::Network`;
/// a body that cannot be decoded is `Error::Protocol`.
#[allow(async_fn_in_trait)]
pub trait SyncTransport {
    async fn send_batch(&self, batch: &SyncBatch) -> Result<SyncResponse>;
}

/// Lists the user's folders for display-name resolution
#[allow(async_fn_in_trait)]
pub trait FolderDirectory {
    async fn list_folders(&self, user_id: &UserId) -> Result<Vec<Folder>>;
}
