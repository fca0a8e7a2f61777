//! Runs one operation across all 36 shards.

use futures::stream::{self, StreamExt};

use crate::batch::{BatchProcessor, BatchReport, BatchSettings, Operation};
use crate::holiday::HolidayCatalog;
use crate::mailbox::{Mailbox, MailboxSource, ShardKey};
use crate::remote::CalendarClient;
use crate::run_log::{LogEntry, RunLog};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardStatus {
    Empty,
    Processed(BatchReport),
    /// The shard's mailbox list could not be produced. Other shards still run.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardReport {
    pub key: ShardKey,
    pub status: ShardStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Ordered by shard key.
    pub shards: Vec<ShardReport>,
}

impl RunReport {
    pub fn batches(&self) -> impl Iterator<Item = &BatchReport> {
        self.shards.iter().filter_map(|s| match &s.status {
            ShardStatus::Processed(report) => Some(report),
            _ => None,
        })
    }

    pub fn failed_shards(&self) -> impl Iterator<Item = &ShardReport> {
        self.shards
            .iter()
            .filter(|s| matches!(s.status, ShardStatus::Failed(_)))
    }

    /// Everything that needs manual follow-up, in shard order.
    pub fn fatal_mailboxes(&self) -> Vec<&Mailbox> {
        self.batches().flat_map(|b| b.fatal()).collect()
    }
}

/// Shard-level driver. Each shard gets its own [`BatchProcessor`] (and so
/// its own retry queue); up to `concurrency` shards are in flight at once.
pub struct RunCoordinator<'a, C: CalendarClient, S: MailboxSource> {
    client: &'a C,
    source: &'a S,
    log: &'a RunLog,
    settings: &'a BatchSettings,
    concurrency: usize,
}

impl<'a, C: CalendarClient, S: MailboxSource> RunCoordinator<'a, C, S> {
    pub fn new(client: &'a C, source: &'a S, log: &'a RunLog, settings: &'a BatchSettings) -> Self {
        RunCoordinator {
            client,
            source,
            log,
            settings,
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn insert_all(&self, catalog: &HolidayCatalog) -> RunReport {
        self.run(Operation::Insert, Some(catalog)).await
    }

    pub async fn remove_all(&self) -> RunReport {
        self.run(Operation::Remove, None).await
    }

    async fn run(&self, operation: Operation, catalog: Option<&HolidayCatalog>) -> RunReport {
        let shards = stream::iter(ShardKey::all())
            .map(|key| self.run_shard(key, operation, catalog))
            .buffered(self.concurrency)
            .collect()
            .await;

        RunReport { shards }
    }

    async fn run_shard(
        &self,
        key: ShardKey,
        operation: Operation,
        catalog: Option<&HolidayCatalog>,
    ) -> ShardReport {
        let mailboxes = match self.source.shard(key) {
            Ok(mailboxes) => mailboxes,
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(shard = %key, error = %reason, "could not load shard");
                self.log.record(LogEntry::ShardFailed {
                    shard: key,
                    reason: &reason,
                });
                return ShardReport {
                    key,
                    status: ShardStatus::Failed(reason),
                };
            }
        };

        if mailboxes.is_empty() {
            tracing::info!(shard = %key, "no mailboxes for shard");
            return ShardReport {
                key,
                status: ShardStatus::Empty,
            };
        }

        tracing::info!(shard = %key, count = mailboxes.len(), %operation, "processing shard");

        let processor = match (operation, catalog) {
            (Operation::Insert, Some(catalog)) => {
                BatchProcessor::insert(self.client, catalog, self.log, self.settings)
            }
            _ => BatchProcessor::remove(self.client, self.log, self.settings),
        };
        let report = processor.run(&mailboxes).await;

        tracing::info!(
            shard = %key,
            succeeded = report.succeeded_first_time(),
            recovered = report.recovered(),
            fatal = report.fatal().count(),
            "finished shard"
        );

        ShardReport {
            key,
            status: ShardStatus::Processed(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::error::{HolidirError, HolidirResult};
    use crate::holiday::Holiday;
    use crate::remote::fake::FakeCalendar;

    #[derive(Default)]
    struct StaticSource {
        shards: HashMap<char, Vec<Mailbox>>,
        broken: Vec<char>,
    }

    impl StaticSource {
        fn with(mut self, key: char, addresses: &[&str]) -> Self {
            self.shards
                .insert(key, addresses.iter().map(|a| Mailbox::new(*a)).collect());
            self
        }
    }

    impl MailboxSource for StaticSource {
        fn shard(&self, key: ShardKey) -> HolidirResult<Vec<Mailbox>> {
            if self.broken.contains(&key.as_char()) {
                return Err(HolidirError::Io(std::io::Error::other("permission denied")));
            }
            Ok(self.shards.get(&key.as_char()).cloned().unwrap_or_default())
        }
    }

    fn catalog() -> HolidayCatalog {
        HolidayCatalog::new(vec![Holiday::new(
            "New Year",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )])
    }

    fn letters_source() -> StaticSource {
        ('a'..='z').fold(StaticSource::default(), |source, c| {
            let first = format!("{c}1@x.com");
            let second = format!("{c}2@x.com");
            source.with(c, &[first.as_str(), second.as_str()])
        })
    }

    #[tokio::test]
    async fn test_failing_shard_does_not_stop_later_shards() {
        let client = FakeCalendar::new();
        client.fail_prefix("g");
        let source = letters_source();
        let log = RunLog::in_memory();
        let settings = BatchSettings::default();

        let report = RunCoordinator::new(&client, &source, &log, &settings)
            .insert_all(&catalog())
            .await;

        for c in 'h'..='z' {
            assert!(
                !client.calls_for(&format!("{c}1@x.com")).is_empty(),
                "shard {c} was never attempted"
            );
        }
        let fatal: Vec<_> = report.fatal_mailboxes().iter().map(|m| m.to_string()).collect();
        assert_eq!(fatal, vec!["g1@x.com", "g2@x.com"]);
    }

    #[tokio::test]
    async fn test_shards_run_in_key_order_and_empty_shards_are_skipped() {
        let client = FakeCalendar::new();
        let source = StaticSource::default()
            .with('b', &["bob@x.com"])
            .with('3', &["3po@x.com"]);
        let log = RunLog::in_memory();
        let settings = BatchSettings::default();

        let report = RunCoordinator::new(&client, &source, &log, &settings)
            .insert_all(&catalog())
            .await;

        let order: Vec<_> = client.calls().iter().map(|c| c.mailbox().to_string()).collect();
        assert_eq!(order, vec!["3po@x.com", "bob@x.com"]);

        assert_eq!(report.shards.len(), 36);
        assert_eq!(report.batches().count(), 2);
        assert_eq!(report.shards[0].status, ShardStatus::Empty);
    }

    #[tokio::test]
    async fn test_unreadable_shard_is_isolated() {
        let client = FakeCalendar::new();
        let mut source = letters_source();
        source.broken.push('g');
        let log = RunLog::in_memory();
        let settings = BatchSettings::default();

        let report = RunCoordinator::new(&client, &source, &log, &settings)
            .remove_all()
            .await;

        let failed: Vec<_> = report.failed_shards().map(|s| s.key.as_char()).collect();
        assert_eq!(failed, vec!['g']);
        assert!(!client.calls_for("z2@x.com").is_empty());
        assert!(log.lines().iter().any(|l| l.contains("Shard g could not be processed")));
    }

    #[tokio::test]
    async fn test_concurrent_shards_report_in_key_order() {
        let client = FakeCalendar::new();
        client.fail_next("m1@x.com", 1);
        let source = letters_source();
        let log = RunLog::in_memory();
        let settings = BatchSettings::default();

        let report = RunCoordinator::new(&client, &source, &log, &settings)
            .with_concurrency(8)
            .insert_all(&catalog())
            .await;

        let keys: String = report.shards.iter().map(|s| s.key.as_char()).collect();
        assert_eq!(keys, "0123456789abcdefghijklmnopqrstuvwxyz");
        assert_eq!(report.batches().count(), 26);
        assert!(report.fatal_mailboxes().is_empty());
        assert_eq!(client.events("m1@x.com").len(), 1);
    }
}
