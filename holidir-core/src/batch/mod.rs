//! Batch engine: one operation over one list of mailboxes.
//!
//! A batch runs in two tiers. The primary pass visits every mailbox in
//! order; a mailbox whose attempt fails is logged and deferred to the
//! [`RetryQueue`] while the pass carries on. The drain then pops the queue
//! head until empty and re-runs the same operation once per mailbox. A
//! second failure is fatal for that mailbox in this run and is never
//! requeued, which caps a batch at two attempts per mailbox.

mod retry_queue;

use std::fmt;

pub use retry_queue::{RetryEntry, RetryQueue};

use crate::error::ApiError;
use crate::holiday::{AppointmentDraft, DEFAULT_CATEGORY, HolidayCatalog};
use crate::mailbox::Mailbox;
use crate::remote::CalendarClient;
use crate::run_log::{LogEntry, RunLog};

/// Primary-pass search bound when removing.
pub const DEFAULT_SEARCH_LIMIT: usize = 500;
/// Retry-pass search bound when removing.
pub const DEFAULT_RETRY_SEARCH_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    Remove,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert => write!(f, "insert"),
            Operation::Remove => write!(f, "remove"),
        }
    }
}

/// Knobs shared by every batch of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSettings {
    pub category: String,
    pub search_limit: usize,
    pub retry_search_limit: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        BatchSettings {
            category: DEFAULT_CATEGORY.to_string(),
            search_limit: DEFAULT_SEARCH_LIMIT,
            retry_search_limit: DEFAULT_RETRY_SEARCH_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryResult {
    Success,
    FatalFailure,
}

/// Final state of one mailbox after a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Not attempted yet, or waiting in the retry queue.
    Pending,
    Success,
    FailedThenRetried(RetryResult),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            RunOutcome::Success | RunOutcome::FailedThenRetried(RetryResult::Success)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RunOutcome::FailedThenRetried(RetryResult::FatalFailure))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxReport {
    pub mailbox: Mailbox,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// One row per mailbox, in encounter order.
    pub mailboxes: Vec<MailboxReport>,
    /// Second attempts actually made.
    pub retried: usize,
    pub events_created: usize,
    pub events_removed: usize,
}

impl BatchReport {
    pub fn outcome(&self, mailbox: &str) -> Option<RunOutcome> {
        self.mailboxes
            .iter()
            .find(|r| r.mailbox.as_str() == mailbox)
            .map(|r| r.outcome)
    }

    pub fn succeeded_first_time(&self) -> usize {
        self.count(|o| *o == RunOutcome::Success)
    }

    pub fn recovered(&self) -> usize {
        self.count(|o| *o == RunOutcome::FailedThenRetried(RetryResult::Success))
    }

    pub fn fatal(&self) -> impl Iterator<Item = &Mailbox> {
        self.mailboxes
            .iter()
            .filter(|r| r.outcome.is_fatal())
            .map(|r| &r.mailbox)
    }

    fn count(&self, pred: impl Fn(&RunOutcome) -> bool) -> usize {
        self.mailboxes.iter().filter(|r| pred(&r.outcome)).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Primary,
    Retry,
}

/// What a successful attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Done {
    Created(usize),
    Removed(usize),
    NothingToRemove,
}

enum Job {
    Insert { drafts: Vec<AppointmentDraft> },
    Remove,
}

/// Runs one operation over one batch of mailboxes, owning its retry queue.
pub struct BatchProcessor<'a, C: CalendarClient> {
    client: &'a C,
    log: &'a RunLog,
    settings: &'a BatchSettings,
    job: Job,
    queue: RetryQueue,
    report: BatchReport,
}

impl<'a, C: CalendarClient> BatchProcessor<'a, C> {
    /// Insert every holiday of `catalog` into each mailbox.
    pub fn insert(
        client: &'a C,
        catalog: &HolidayCatalog,
        log: &'a RunLog,
        settings: &'a BatchSettings,
    ) -> Self {
        let drafts = catalog.drafts(&settings.category);
        Self::with_job(client, log, settings, Job::Insert { drafts })
    }

    /// Remove every item carrying the category tag from each mailbox.
    pub fn remove(client: &'a C, log: &'a RunLog, settings: &'a BatchSettings) -> Self {
        Self::with_job(client, log, settings, Job::Remove)
    }

    fn with_job(client: &'a C, log: &'a RunLog, settings: &'a BatchSettings, job: Job) -> Self {
        BatchProcessor {
            client,
            log,
            settings,
            job,
            queue: RetryQueue::new(),
            report: BatchReport::default(),
        }
    }

    pub fn operation(&self) -> Operation {
        match self.job {
            Job::Insert { .. } => Operation::Insert,
            Job::Remove => Operation::Remove,
        }
    }

    pub fn retry_queue(&self) -> &RetryQueue {
        &self.queue
    }

    pub fn report(&self) -> &BatchReport {
        &self.report
    }

    /// Primary pass then drain.
    pub async fn run(mut self, mailboxes: &[Mailbox]) -> BatchReport {
        self.primary_pass(mailboxes).await;
        self.drain_retries().await;
        self.report
    }

    /// Attempt every mailbox once, deferring failures to the retry queue.
    pub async fn primary_pass(&mut self, mailboxes: &[Mailbox]) {
        let operation = self.operation();

        for mailbox in mailboxes {
            let slot = self.report.mailboxes.len();
            self.report.mailboxes.push(MailboxReport {
                mailbox: mailbox.clone(),
                outcome: RunOutcome::Pending,
            });

            tracing::info!(%mailbox, %operation, "processing mailbox");

            match self.attempt(mailbox, Attempt::Primary).await {
                Ok(done) => {
                    self.record_done(mailbox, done);
                    self.report.mailboxes[slot].outcome = RunOutcome::Success;
                }
                Err(error) => {
                    tracing::warn!(%mailbox, %error, "attempt failed, deferring to retry pass");
                    self.log.record(LogEntry::FirstAttemptFailed {
                        mailbox,
                        operation,
                        error: &error,
                    });

                    let admitted = self.queue.push(RetryEntry {
                        mailbox: mailbox.clone(),
                        operation,
                        slot,
                    });
                    if !admitted {
                        // Listed twice and already spent its retry.
                        self.mark_fatal(mailbox, slot, &error);
                    }
                }
            }
        }
    }

    /// Retry each deferred mailbox once, head first, until the queue is empty.
    pub async fn drain_retries(&mut self) {
        if !self.queue.is_empty() {
            tracing::info!(pending = self.queue.len(), "retrying failed mailboxes");
        }

        while let Some(entry) = self.queue.pop_front() {
            let mailbox = &entry.mailbox;
            debug_assert_eq!(entry.operation, self.operation());
            tracing::debug!(
                %mailbox,
                operation = %entry.operation,
                remaining = self.queue.len(),
                "dequeued for retry"
            );
            self.report.retried += 1;

            match self.attempt(mailbox, Attempt::Retry).await {
                Ok(done) => {
                    self.record_done(mailbox, done);
                    self.report.mailboxes[entry.slot].outcome =
                        RunOutcome::FailedThenRetried(RetryResult::Success);
                }
                Err(error) => self.mark_fatal(mailbox, entry.slot, &error),
            }
        }
    }

    async fn attempt(&self, mailbox: &Mailbox, attempt: Attempt) -> Result<Done, ApiError> {
        let session = self.client.impersonate(mailbox);

        match &self.job {
            Job::Insert { drafts } => {
                self.client.create_events(&session, drafts).await?;
                Ok(Done::Created(drafts.len()))
            }
            Job::Remove => {
                let limit = match attempt {
                    Attempt::Primary => self.settings.search_limit,
                    Attempt::Retry => self.settings.retry_search_limit,
                };

                let ids = self
                    .client
                    .find_events_by_category(&session, &self.settings.category, limit)
                    .await?;

                if ids.is_empty() {
                    return Ok(Done::NothingToRemove);
                }
                if ids.len() >= limit {
                    tracing::warn!(
                        %mailbox,
                        limit,
                        "search hit its result bound; tagged items beyond it are left in place"
                    );
                }

                self.client.delete_events(&session, &ids).await?;
                Ok(Done::Removed(ids.len()))
            }
        }
    }

    fn record_done(&mut self, mailbox: &Mailbox, done: Done) {
        match done {
            Done::Created(count) => {
                tracing::info!(%mailbox, count, "added holidays");
                self.report.events_created += count;
                self.log.record(LogEntry::Added { mailbox, count });
            }
            Done::Removed(count) => {
                tracing::info!(%mailbox, count, "removed holidays");
                self.report.events_removed += count;
                self.log.record(LogEntry::Removed { mailbox, count });
            }
            Done::NothingToRemove => {
                tracing::info!(%mailbox, "nothing to remove");
                self.log.record(LogEntry::NothingToRemove { mailbox });
            }
        }
    }

    fn mark_fatal(&mut self, mailbox: &Mailbox, slot: usize, error: &ApiError) {
        tracing::error!(%mailbox, %error, "mailbox failed twice; will not retry");
        self.log.record(LogEntry::Fatal { mailbox, error });
        self.report.mailboxes[slot].outcome = RunOutcome::FailedThenRetried(RetryResult::FatalFailure);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::*;
    use crate::holiday::Holiday;
    use crate::remote::fake::{Call, FakeCalendar};

    fn catalog() -> HolidayCatalog {
        HolidayCatalog::new(vec![
            Holiday::new("New Year", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            Holiday::new("Independence Day", NaiveDate::from_ymd_opt(2024, 7, 4).unwrap()),
        ])
    }

    fn mailboxes(addresses: &[&str]) -> Vec<Mailbox> {
        addresses.iter().map(|a| Mailbox::new(*a)).collect()
    }

    fn lines_for(log: &RunLog, mailbox: &str) -> Vec<String> {
        log.lines()
            .into_iter()
            .filter(|l| l.contains(mailbox))
            .collect()
    }

    #[tokio::test]
    async fn test_insert_creates_one_all_day_item_per_holiday() {
        let client = FakeCalendar::new();
        let log = RunLog::in_memory();
        let settings = BatchSettings::default();

        let report = BatchProcessor::insert(&client, &catalog(), &log, &settings)
            .run(&mailboxes(&["a@x.com"]))
            .await;

        let events = client.events("a@x.com");
        assert_eq!(events.len(), 2);
        for event in &events {
            assert!(event.draft.all_day);
            assert!(!event.draft.reminder);
            assert_eq!(event.draft.category, "Holiday");
            assert_eq!(event.draft.end - event.draft.start, Duration::days(1));
        }

        assert_eq!(report.outcome("a@x.com"), Some(RunOutcome::Success));
        assert_eq!(report.events_created, 2);
        assert_eq!(lines_for(&log, "a@x.com").len(), 1);
        assert!(lines_for(&log, "a@x.com")[0].contains("Added 2 holidays"));
    }

    #[tokio::test]
    async fn test_insert_sends_identical_drafts_to_every_mailbox() {
        let client = FakeCalendar::new();
        let log = RunLog::in_memory();
        let settings = BatchSettings::default();

        BatchProcessor::insert(&client, &catalog(), &log, &settings)
            .run(&mailboxes(&["a@x.com", "b@x.com"]))
            .await;

        let drafts = |m: &str| -> Vec<AppointmentDraft> { client.events(m).into_iter().map(|e| e.draft).collect() };
        assert_eq!(drafts("a@x.com"), drafts("b@x.com"));
    }

    #[tokio::test]
    async fn test_insert_failure_is_queued_then_recovered() {
        let client = FakeCalendar::new();
        client.fail_next("b@x.com", 1);
        let log = RunLog::in_memory();
        let settings = BatchSettings::default();
        let batch = mailboxes(&["b@x.com"]);

        let mut processor = BatchProcessor::insert(&client, &catalog(), &log, &settings);
        processor.primary_pass(&batch).await;

        assert!(processor.retry_queue().contains(&Mailbox::new("b@x.com")));
        assert_eq!(processor.report().outcome("b@x.com"), Some(RunOutcome::Pending));

        processor.drain_retries().await;

        assert!(processor.retry_queue().is_empty());
        let outcome = processor.report().outcome("b@x.com").unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome, RunOutcome::FailedThenRetried(RetryResult::Success));

        let lines = lines_for(&log, "b@x.com");
        assert_eq!(lines.len(), 2, "log: {lines:?}");
        assert!(lines[0].contains("Error during initial add"));
        assert!(lines[1].contains("Added 2 holidays"));
        assert_eq!(client.events("b@x.com").len(), 2);
    }

    #[tokio::test]
    async fn test_second_failure_is_fatal_and_run_continues() {
        let client = FakeCalendar::new();
        client.fail_next("b@x.com", 5);
        let log = RunLog::in_memory();
        let settings = BatchSettings::default();

        let report = BatchProcessor::insert(&client, &catalog(), &log, &settings)
            .run(&mailboxes(&["b@x.com", "c@x.com"]))
            .await;

        assert_eq!(
            report.outcome("b@x.com"),
            Some(RunOutcome::FailedThenRetried(RetryResult::FatalFailure))
        );
        assert_eq!(client.calls_for("b@x.com").len(), 2);
        assert_eq!(report.outcome("c@x.com"), Some(RunOutcome::Success));
        assert_eq!(report.fatal().collect::<Vec<_>>(), vec![&Mailbox::new("b@x.com")]);
    }

    #[tokio::test]
    async fn test_retry_runs_after_whole_primary_pass_in_order() {
        let client = FakeCalendar::new();
        client.fail_next("b@x.com", 1);
        client.fail_next("d@x.com", 1);
        let log = RunLog::in_memory();
        let settings = BatchSettings::default();

        BatchProcessor::insert(&client, &catalog(), &log, &settings)
            .run(&mailboxes(&["b@x.com", "c@x.com", "d@x.com"]))
            .await;

        let order: Vec<_> = client
            .calls()
            .iter()
            .map(|c| c.mailbox().to_string())
            .collect();
        assert_eq!(order, vec!["b@x.com", "c@x.com", "d@x.com", "b@x.com", "d@x.com"]);
    }

    #[tokio::test]
    async fn test_duplicate_listing_never_gets_third_attempt() {
        let client = FakeCalendar::new();
        client.fail_next("b@x.com", 10);
        let log = RunLog::in_memory();
        let settings = BatchSettings::default();

        let report = BatchProcessor::insert(&client, &catalog(), &log, &settings)
            .run(&mailboxes(&["b@x.com", "b@x.com"]))
            .await;

        assert_eq!(client.calls_for("b@x.com").len(), 3);
        assert!(report.mailboxes.iter().all(|r| r.outcome.is_fatal()));
        assert_eq!(report.retried, 1);
    }

    #[tokio::test]
    async fn test_remove_deletes_all_matches_in_one_call() {
        let client = FakeCalendar::new();
        client.seed("c@x.com", "Holiday", 3);
        client.seed("c@x.com", "Birthday", 1);
        let log = RunLog::in_memory();
        let settings = BatchSettings::default();

        let report = BatchProcessor::remove(&client, &log, &settings)
            .run(&mailboxes(&["c@x.com"]))
            .await;

        assert_eq!(
            client.calls_for("c@x.com"),
            vec![
                Call::Find {
                    mailbox: Mailbox::new("c@x.com"),
                    max_results: DEFAULT_SEARCH_LIMIT,
                },
                Call::Delete {
                    mailbox: Mailbox::new("c@x.com"),
                    count: 3,
                },
            ]
        );
        assert_eq!(client.events("c@x.com").len(), 1);
        assert_eq!(report.events_removed, 3);
        assert!(lines_for(&log, "c@x.com")[0].contains("Removed 3 holidays"));
    }

    #[tokio::test]
    async fn test_remove_twice_with_nothing_left_never_deletes() {
        let client = FakeCalendar::new();
        let log = RunLog::in_memory();
        let settings = BatchSettings::default();
        let batch = mailboxes(&["c@x.com"]);

        for _ in 0..2 {
            let report = BatchProcessor::remove(&client, &log, &settings).run(&batch).await;
            assert_eq!(report.outcome("c@x.com"), Some(RunOutcome::Success));
        }

        assert!(
            client
                .calls()
                .iter()
                .all(|c| !matches!(c, Call::Delete { .. }))
        );
        let lines = lines_for(&log, "c@x.com");
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.contains("Nothing to remove")));
    }

    #[tokio::test]
    async fn test_remove_retry_uses_retry_search_bound() {
        let client = FakeCalendar::new();
        client.seed("c@x.com", "Holiday", 2);
        client.fail_next("c@x.com", 1);
        let log = RunLog::in_memory();
        let settings = BatchSettings::default();

        let report = BatchProcessor::remove(&client, &log, &settings)
            .run(&mailboxes(&["c@x.com"]))
            .await;

        let bounds: Vec<_> = client
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Find { max_results, .. } => Some(max_results),
                _ => None,
            })
            .collect();
        assert_eq!(bounds, vec![DEFAULT_SEARCH_LIMIT, DEFAULT_RETRY_SEARCH_LIMIT]);
        assert_eq!(
            report.outcome("c@x.com"),
            Some(RunOutcome::FailedThenRetried(RetryResult::Success))
        );
        assert!(client.events("c@x.com").is_empty());
    }

    #[tokio::test]
    async fn test_remove_leaves_items_beyond_search_bound() {
        let client = FakeCalendar::new();
        client.seed("c@x.com", "Holiday", 7);
        let log = RunLog::in_memory();
        let settings = BatchSettings {
            search_limit: 5,
            ..BatchSettings::default()
        };

        let report = BatchProcessor::remove(&client, &log, &settings)
            .run(&mailboxes(&["c@x.com"]))
            .await;

        assert_eq!(report.events_removed, 5);
        assert_eq!(client.events("c@x.com").len(), 2);
    }

    #[tokio::test]
    async fn test_remove_matches_items_created_by_other_tools() {
        let client = FakeCalendar::new();
        client.seed("c@x.com", "Holiday", 1);
        let log = RunLog::in_memory();
        let settings = BatchSettings::default();

        BatchProcessor::insert(&client, &catalog(), &log, &settings)
            .run(&mailboxes(&["c@x.com"]))
            .await;
        BatchProcessor::remove(&client, &log, &settings)
            .run(&mailboxes(&["c@x.com"]))
            .await;

        assert!(client.events("c@x.com").is_empty());
    }
}
