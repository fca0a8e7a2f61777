pub mod full;
pub mod list;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use holidir_core::batch::Operation;
use holidir_core::holiday::HolidayCatalog;
use holidir_core::remote::protocol::Credentials;
use holidir_core::remote::provider::{Provider, ProviderClient};
use holidir_core::run_log::RunLog;
use holidir_core::settings::Settings;

use crate::invocation::{Invocation, Scope};

/// Everything a run needs once setup has succeeded.
pub struct RunContext {
    pub settings: Settings,
    pub client: ProviderClient,
    pub log: RunLog,
    pub log_path: PathBuf,
    pub credentials: Credentials,
}

impl RunContext {
    /// Connect and open the run log. Any failure here ends the run before
    /// a single mailbox is touched.
    async fn setup(
        settings: Settings,
        operation: Operation,
        credentials: Credentials,
    ) -> Result<Self> {
        let provider = Provider::new(&settings.provider, settings.provider_timeout()?);
        let client = ProviderClient::connect(provider, credentials.clone(), &settings.trusted_endpoint)
            .await
            .context("Could not connect to the calendar service")?;

        let today = Local::now().date_naive();
        let log_dir = settings.log_path();
        let log = RunLog::open(&log_dir, operation, today)
            .with_context(|| format!("Could not open run log in {}", log_dir.display()))?;
        let log_path = RunLog::path_for(&log_dir, operation, today);
        tracing::info!(run_id = %log.run_id(), log = %log_path.display(), "run log opened");

        Ok(RunContext {
            settings,
            client,
            log,
            log_path,
            credentials,
        })
    }

    fn load_catalog(&self) -> Result<HolidayCatalog> {
        let path = self.settings.holidays_path();
        let catalog = HolidayCatalog::load(&path)?;
        if catalog.is_empty() {
            anyhow::bail!("Holiday catalog {} has no holidays", path.display());
        }
        tracing::info!(count = catalog.len(), "loaded holiday catalog");
        Ok(catalog)
    }
}

pub async fn run(invocation: Invocation, config_path: Option<&Path>, assume_yes: bool) -> Result<()> {
    let settings = match config_path {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    let Invocation {
        operation,
        scope,
        credentials,
    } = invocation;

    match scope {
        Scope::Full => {
            if !assume_yes && !full::confirm(operation)? {
                return Ok(());
            }
            let ctx = RunContext::setup(settings, operation, credentials).await?;
            full::run(&ctx, operation).await?;
            println!("\nAll done. Review the run log at {}", ctx.log_path.display());
        }
        Scope::List(mailboxes) => {
            let ctx = RunContext::setup(settings, operation, credentials).await?;
            list::run(&ctx, operation, &mailboxes).await?;
            println!("\nAll done. Review the run log at {}", ctx.log_path.display());
        }
    }

    Ok(())
}
