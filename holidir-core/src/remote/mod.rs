//! The calendar service as seen by the batch engine.
//!
//! Every call runs as one mailbox owner, named by a [`Session`]. A session
//! comes from [`CalendarClient::impersonate`], is owned by exactly one
//! mailbox attempt, and ends impersonation when dropped, so no exit path
//! can leave a stale identity behind.

pub mod protocol;
pub mod provider;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::holiday::AppointmentDraft;
use crate::mailbox::Mailbox;

/// Identifier the calendar service assigns to an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Impersonation scope for one mailbox.
///
/// Deliberately not `Clone`: concurrent attempts each hold their own.
#[derive(Debug)]
pub struct Session {
    mailbox: Mailbox,
}

impl Session {
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        tracing::trace!(mailbox = %self.mailbox, "impersonation released");
    }
}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Act as `mailbox` until the returned session is dropped.
    fn impersonate(&self, mailbox: &Mailbox) -> Session {
        tracing::trace!(%mailbox, "impersonating");
        Session {
            mailbox: mailbox.clone(),
        }
    }

    /// Save all drafts to the mailbox calendar in one write, sending no
    /// invitations. Any reported error fails the whole batch.
    async fn create_events(
        &self,
        session: &Session,
        drafts: &[AppointmentDraft],
    ) -> Result<(), ApiError>;

    /// Ids of calendar items tagged with `category`, at most `max_results`.
    async fn find_events_by_category(
        &self,
        session: &Session,
        category: &str,
        max_results: usize,
    ) -> Result<Vec<EventId>, ApiError>;

    /// Move items to deleted items (recoverable).
    async fn delete_events(&self, session: &Session, ids: &[EventId]) -> Result<(), ApiError>;
}
