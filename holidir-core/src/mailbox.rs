//! Mailboxes, shard keys, and where mailbox lists come from.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{HolidirError, HolidirResult};

/// An addressable mailbox, usually an SMTP address.
///
/// Only ever used as an impersonation target and as a retry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mailbox(String);

impl Mailbox {
    pub fn new(address: impl Into<String>) -> Self {
        Mailbox(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const SHARD_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// One of the 36 mailbox partitions: `0`-`9`, then `a`-`z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardKey(u8);

impl ShardKey {
    /// Every shard key, in processing order.
    pub fn all() -> impl Iterator<Item = ShardKey> {
        SHARD_ALPHABET.iter().map(|&b| ShardKey(b))
    }

    /// Parse a key, case-insensitively.
    pub fn parse(c: char) -> Option<ShardKey> {
        let c = c.to_ascii_lowercase();
        c.is_ascii_alphanumeric().then(|| ShardKey(c as u8))
    }

    pub fn as_char(&self) -> char {
        self.0 as char
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Yields the mailboxes assigned to a shard.
///
/// Partitioning happens elsewhere; implementations report membership as given.
pub trait MailboxSource: Send + Sync {
    fn shard(&self, key: ShardKey) -> HolidirResult<Vec<Mailbox>>;
}

/// Shard files exported to a directory as `{key}_mailboxes.csv`, each
/// starting with a header line.
#[derive(Debug, Clone)]
pub struct ShardFileSource {
    dir: PathBuf,
}

impl ShardFileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ShardFileSource { dir: dir.into() }
    }

    pub fn shard_path(&self, key: ShardKey) -> PathBuf {
        self.dir.join(format!("{key}_mailboxes.csv"))
    }
}

impl MailboxSource for ShardFileSource {
    fn shard(&self, key: ShardKey) -> HolidirResult<Vec<Mailbox>> {
        let path = self.shard_path(key);

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(shard = %key, path = %path.display(), "no shard file");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(parse_mailboxes(contents.lines().skip(1)))
    }
}

/// Load an operator-supplied mailbox list. Unlike shard files, the first
/// line is a mailbox, not a header.
pub fn load_mailbox_list(path: &Path) -> HolidirResult<Vec<Mailbox>> {
    if !path.is_file() {
        return Err(HolidirError::MailboxListNotFound(path.to_path_buf()));
    }

    let contents =
        std::fs::read_to_string(path).map_err(|source| HolidirError::MailboxListUnreadable {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(parse_mailboxes(contents.lines()))
}

fn parse_mailboxes<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<Mailbox> {
    lines
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Mailbox::new)
        .collect()
}

/// Run the configured export command that regenerates the shard files.
///
/// Credentials are passed through the environment rather than argv.
pub async fn export_mailboxes(command: &str, username: &str, password: &str) -> HolidirResult<()> {
    tracing::info!(command, "exporting mailbox shards");

    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .env("HOLIDIR_USERNAME", username)
        .env("HOLIDIR_PASSWORD", password)
        .status()
        .await
        .map_err(|e| HolidirError::MailboxExport(format!("could not start '{command}': {e}")))?;

    if !status.success() {
        return Err(HolidirError::MailboxExport(format!(
            "'{command}' exited with status {}",
            status.code().unwrap_or(-1)
        )));
    }

    Ok(())
}
