//! Terminal rendering of run reports using owo_colors.

use holidir_core::batch::{BatchReport, Operation};
use holidir_core::coordinator::{RunReport, ShardStatus};
use holidir_core::mailbox::Mailbox;
use owo_colors::OwoColorize;

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self, operation: Operation) -> String;
}

impl Render for BatchReport {
    fn render(&self, operation: Operation) -> String {
        let mut lines = vec![
            format!("   {} mailboxes", self.mailboxes.len()),
            format!("   {} {}", "✓".green(), format!("{} succeeded", self.succeeded_first_time()).green()),
        ];

        if self.recovered() > 0 {
            lines.push(format!(
                "   {} {}",
                "↻".yellow(),
                format!("{} succeeded on retry", self.recovered()).yellow()
            ));
        }

        let fatal: Vec<_> = self.fatal().collect();
        if !fatal.is_empty() {
            lines.push(render_fatal(&fatal));
        }

        lines.push(
            match operation {
                Operation::Insert => format!("   {} events created", self.events_created),
                Operation::Remove => format!("   {} events removed", self.events_removed),
            }
            .dimmed()
            .to_string(),
        );

        lines.join("\n")
    }
}

impl Render for RunReport {
    fn render(&self, operation: Operation) -> String {
        let mut lines = Vec::new();

        for shard in &self.shards {
            match &shard.status {
                ShardStatus::Empty => {}
                ShardStatus::Processed(report) => {
                    let fatal = report.fatal().count();
                    let marker = if fatal == 0 {
                        "✓".green().to_string()
                    } else {
                        "✗".red().to_string()
                    };
                    lines.push(format!(
                        "   {} shard {}: {} mailboxes, {} retried, {} fatal",
                        marker,
                        shard.key,
                        report.mailboxes.len(),
                        report.retried,
                        fatal
                    ));
                }
                ShardStatus::Failed(reason) => {
                    lines.push(format!("   {} shard {}: {}", "✗".red(), shard.key, reason.red()));
                }
            }
        }

        if lines.is_empty() {
            return "   No mailboxes found in any shard".dimmed().to_string();
        }

        let (mailboxes, count) = self.batches().fold((0, 0), |(m, c), b| {
            let count = match operation {
                Operation::Insert => b.events_created,
                Operation::Remove => b.events_removed,
            };
            (m + b.mailboxes.len(), c + count)
        });
        let verb = match operation {
            Operation::Insert => "created",
            Operation::Remove => "removed",
        };
        lines.push(String::new());
        lines.push(format!("Total: {mailboxes} mailboxes, {count} events {verb}"));

        let fatal = self.fatal_mailboxes();
        if !fatal.is_empty() {
            lines.push(render_fatal(&fatal));
        }

        lines.join("\n")
    }
}

fn render_fatal(mailboxes: &[&Mailbox]) -> String {
    let mut lines = vec![format!(
        "   {} {}",
        "✗".red(),
        format!("{} failed twice and need manual follow-up:", mailboxes.len()).red()
    )];
    lines.extend(mailboxes.iter().map(|m| format!("      {}", m.red())));
    lines.join("\n")
}
