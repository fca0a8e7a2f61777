use anyhow::Result;
use holidir_core::batch::{BatchProcessor, Operation};
use holidir_core::mailbox::Mailbox;

use super::RunContext;
use crate::render::Render;

pub async fn run(ctx: &RunContext, operation: Operation, mailboxes: &[Mailbox]) -> Result<()> {
    tracing::info!(count = mailboxes.len(), %operation, "processing mailbox list");

    let batch_settings = ctx.settings.batch_settings();
    let report = match operation {
        Operation::Insert => {
            let catalog = ctx.load_catalog()?;
            BatchProcessor::insert(&ctx.client, &catalog, &ctx.log, &batch_settings)
                .run(mailboxes)
                .await
        }
        Operation::Remove => {
            BatchProcessor::remove(&ctx.client, &ctx.log, &batch_settings)
                .run(mailboxes)
                .await
        }
    };

    println!("\n{}", report.render(operation));
    Ok(())
}
