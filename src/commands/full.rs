use anyhow::Result;
use dialoguer::Confirm;
use holidir_core::batch::Operation;
use holidir_core::coordinator::RunCoordinator;
use holidir_core::mailbox::{ShardFileSource, export_mailboxes};

use super::RunContext;
use crate::render::Render;

/// Ask before touching every calendar in the organization.
pub fn confirm(operation: Operation) -> Result<bool> {
    let prompt = match operation {
        Operation::Insert => "Insert holidays into ALL calendars?",
        Operation::Remove => "Remove holidays from ALL calendars?",
    };

    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

pub async fn run(ctx: &RunContext, operation: Operation) -> Result<()> {
    let batch_settings = ctx.settings.batch_settings();
    let source = ShardFileSource::new(ctx.settings.mailbox_path());
    let coordinator = RunCoordinator::new(&ctx.client, &source, &ctx.log, &batch_settings)
        .with_concurrency(ctx.settings.concurrency);

    let report = match operation {
        Operation::Insert => {
            let catalog = ctx.load_catalog()?;

            if let Some(command) = &ctx.settings.mailbox_export_command {
                export_mailboxes(command, &ctx.credentials.username, &ctx.credentials.password)
                    .await?;
            }

            coordinator.insert_all(&catalog).await
        }
        Operation::Remove => coordinator.remove_all().await,
    };

    println!("\n{}", report.render(operation));
    Ok(())
}
