//! Defines the JSON protocol used between holidir and calendar provider
//! binaries over stdin/stdout.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::holiday::AppointmentDraft;
use crate::remote::EventId;

pub trait ProviderCommand: Serialize {
    type Response: DeserializeOwned;
    fn command() -> Command;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Connect,
    CreateEvents,
    FindEvents,
    DeleteEvents,
}

/// Request sent from holidir to provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub command: Command,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Response sent from provider to holidir.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response<T> {
    Success { data: T },
    Error { error: String },
}

/// Service account credentials, sent with every request since each call
/// is a fresh provider process.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authenticate and discover the service endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct Connect {
    #[serde(flatten)]
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub endpoint_url: String,
}

impl ProviderCommand for Connect {
    type Response = ConnectResponse;
    fn command() -> Command {
        Command::Connect
    }
}

/// Fields shared by every impersonated call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Impersonation {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub endpoint_url: String,
    /// SMTP address of the mailbox owner to act as.
    pub impersonate: String,
}

/// Save a batch of events, sending no invitations.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateEvents {
    #[serde(flatten)]
    pub target: Impersonation,
    pub events: Vec<AppointmentDraft>,
}

impl ProviderCommand for CreateEvents {
    type Response = ();
    fn command() -> Command {
        Command::CreateEvents
    }
}

/// Find calendar items carrying a category.
#[derive(Debug, Serialize, Deserialize)]
pub struct FindEvents {
    #[serde(flatten)]
    pub target: Impersonation,
    pub category: String,
    pub max_results: usize,
}

impl ProviderCommand for FindEvents {
    type Response = Vec<EventId>;
    fn command() -> Command {
        Command::FindEvents
    }
}

/// Move items to deleted items, sending no cancellations.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteEvents {
    #[serde(flatten)]
    pub target: Impersonation,
    pub event_ids: Vec<EventId>,
}

impl ProviderCommand for DeleteEvents {
    type Response = ();
    fn command() -> Command {
        Command::DeleteEvents
    }
}
