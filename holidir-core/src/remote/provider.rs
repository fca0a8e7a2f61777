//! Provider subprocess client.
//!
//! Calendar services are reached through external provider binaries
//! (e.g., `holidir-provider-ews`) speaking JSON over stdin/stdout, one
//! request per process. Any executable that speaks the protocol can be a
//! provider.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use crate::error::{ApiError, HolidirError, HolidirResult};
use crate::holiday::AppointmentDraft;
use crate::remote::protocol::{
    Command, Connect, CreateEvents, Credentials, DeleteEvents, FindEvents, Impersonation,
    ProviderCommand, Request, Response,
};
use crate::remote::{CalendarClient, EventId, Session};

#[derive(Clone, Debug)]
pub struct Provider {
    name: String,
    timeout: Duration,
}

impl Provider {
    pub fn new(name: &str, timeout: Duration) -> Self {
        Provider {
            name: name.to_string(),
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn binary_path(&self) -> HolidirResult<PathBuf> {
        let binary_name = format!("holidir-provider-{}", self.name);
        which::which(&binary_name).map_err(|_| HolidirError::ProviderNotInstalled(binary_name))
    }

    /// Call a typed provider command and return the result.
    pub async fn call<C: ProviderCommand>(&self, cmd: C) -> HolidirResult<C::Response> {
        timeout(self.timeout, self.call_raw(C::command(), cmd))
            .await
            .map_err(|_| self.timeout_error())?
    }

    fn timeout_error(&self) -> HolidirError {
        HolidirError::ProviderTimeout(humantime::format_duration(self.timeout).to_string())
    }

    async fn call_raw<P: Serialize, R: serde::de::DeserializeOwned>(
        &self,
        command: Command,
        params: P,
    ) -> HolidirResult<R> {
        let params = serde_json::to_value(params)
            .map_err(|e| HolidirError::Serialization(e.to_string()))?;
        let request = Request { command, params };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| HolidirError::Serialization(e.to_string()))?;

        let binary_path = self.binary_path()?;

        let mut child = TokioCommand::new(&binary_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HolidirError::ProviderProcess(format!(
                    "Failed to spawn {}: {}",
                    binary_path.display(),
                    e
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| HolidirError::ProviderProcess("Provider stdin unavailable".into()))?;
        stdin
            .write_all(format!("{request_json}\n").as_bytes())
            .await?;
        drop(stdin);

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            return Err(HolidirError::ProviderProcess(format!(
                "Provider exited with status: {}",
                output.status.code().unwrap_or(-1)
            )));
        }

        let response_str = String::from_utf8_lossy(&output.stdout);
        if response_str.trim().is_empty() {
            return Err(HolidirError::ProviderProcess(
                "Provider returned no response".into(),
            ));
        }

        let response: Response<R> = serde_json::from_str(&response_str).map_err(|e| {
            HolidirError::ProviderProcess(format!("Failed to parse response: {}", e))
        })?;

        match response {
            Response::Success { data } => Ok(data),
            Response::Error { error } => Err(HolidirError::Provider(error)),
        }
    }
}

/// Authenticated connection to the calendar service through a provider.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    provider: Provider,
    credentials: Credentials,
    endpoint_url: String,
}

impl ProviderClient {
    /// Authenticate and run endpoint discovery. The discovered endpoint
    /// must equal `trusted_endpoint`.
    pub async fn connect(
        provider: Provider,
        credentials: Credentials,
        trusted_endpoint: &str,
    ) -> HolidirResult<Self> {
        let response = provider
            .call(Connect {
                credentials: credentials.clone(),
            })
            .await?;

        verify_endpoint(&response.endpoint_url, trusted_endpoint)?;

        tracing::info!(
            provider = provider.name(),
            endpoint = %response.endpoint_url,
            "connected to calendar service"
        );

        Ok(ProviderClient {
            provider,
            credentials,
            endpoint_url: response.endpoint_url,
        })
    }

    fn target(&self, session: &Session) -> Impersonation {
        Impersonation {
            credentials: self.credentials.clone(),
            endpoint_url: self.endpoint_url.clone(),
            impersonate: session.mailbox().as_str().to_string(),
        }
    }
}

fn verify_endpoint(found: &str, trusted: &str) -> HolidirResult<()> {
    if found != trusted {
        return Err(HolidirError::UntrustedEndpoint {
            found: found.to_string(),
            expected: trusted.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl CalendarClient for ProviderClient {
    async fn create_events(
        &self,
        session: &Session,
        drafts: &[AppointmentDraft],
    ) -> Result<(), ApiError> {
        self.provider
            .call(CreateEvents {
                target: self.target(session),
                events: drafts.to_vec(),
            })
            .await
            .map_err(ApiError::from)
    }

    async fn find_events_by_category(
        &self,
        session: &Session,
        category: &str,
        max_results: usize,
    ) -> Result<Vec<EventId>, ApiError> {
        self.provider
            .call(FindEvents {
                target: self.target(session),
                category: category.to_string(),
                max_results,
            })
            .await
            .map_err(ApiError::from)
    }

    async fn delete_events(&self, session: &Session, ids: &[EventId]) -> Result<(), ApiError> {
        self.provider
            .call(DeleteEvents {
                target: self.target(session),
                event_ids: ids.to_vec(),
            })
            .await
            .map_err(ApiError::from)
    }
}
