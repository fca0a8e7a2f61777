//! FIFO of mailboxes deferred for one more attempt.

use std::collections::{HashSet, VecDeque};

use crate::batch::Operation;
use crate::mailbox::Mailbox;

/// A mailbox whose first attempt failed, and what it failed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEntry {
    pub mailbox: Mailbox,
    pub operation: Operation,
    /// Position of the mailbox in the batch, so the retry result lands on
    /// the right report row even when an address is listed twice.
    pub(crate) slot: usize,
}

/// Retry queue for one batch.
///
/// A mailbox can be enqueued at most once over the queue's lifetime, so a
/// failure while draining can never schedule a third attempt.
#[derive(Debug, Default)]
pub struct RetryQueue {
    entries: VecDeque<RetryEntry>,
    admitted: HashSet<Mailbox>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue at the tail. Returns false if the mailbox was already
    /// admitted once.
    pub fn push(&mut self, entry: RetryEntry) -> bool {
        if !self.admitted.insert(entry.mailbox.clone()) {
            return false;
        }
        self.entries.push_back(entry);
        true
    }

    pub fn pop_front(&mut self) -> Option<RetryEntry> {
        self.entries.pop_front()
    }

    pub fn contains(&self, mailbox: &Mailbox) -> bool {
        self.entries.iter().any(|e| &e.mailbox == mailbox)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
