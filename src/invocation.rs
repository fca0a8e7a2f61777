//! Turns positional arguments into a validated invocation.
//!
//! Each way of getting the arguments wrong has its own exit code, and all
//! of them are caught before any connection is made.

use std::fmt;
use std::path::PathBuf;

use holidir_core::HolidirError;
use holidir_core::batch::Operation;
use holidir_core::mailbox::{Mailbox, load_mailbox_list};
use holidir_core::remote::protocol::Credentials;

pub const USAGE: &str = "\
Expected usage:  holidir <mode> <username> <password> [<mailbox-list>]
   where <mode> is 'full_insert', 'full_remove', 'list_insert' or 'list_remove'
         <mailbox-list> is a file with one mailbox address per line (no header);
         it is required by the list_* modes";

/// Which mailboxes a run covers.
#[derive(Debug, PartialEq, Eq)]
pub enum Scope {
    /// Every shard file.
    Full,
    /// Exactly the mailboxes of an operator-supplied list.
    List(Vec<Mailbox>),
}

#[derive(Debug)]
pub struct Invocation {
    pub operation: Operation,
    pub scope: Scope,
    pub credentials: Credentials,
}

#[derive(Debug, PartialEq, Eq)]
pub enum InvocationError {
    MissingArguments,
    UnknownFullMode(String),
    MailboxListNotFound(PathBuf),
    MailboxListUnreadable(PathBuf, String),
    UnknownListMode(String),
}

impl InvocationError {
    pub fn exit_code(&self) -> u8 {
        match self {
            InvocationError::MissingArguments => 0,
            InvocationError::UnknownFullMode(_) => 1,
            InvocationError::MailboxListNotFound(_) => 2,
            InvocationError::MailboxListUnreadable(..) => 3,
            InvocationError::UnknownListMode(_) => 4,
        }
    }
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationError::MissingArguments => write!(f, "Please provide the expected arguments."),
            InvocationError::UnknownFullMode(mode) => write!(
                f,
                "'{mode}' is not a mode for three arguments; expected 'full_insert' or 'full_remove'. Check case and spelling."
            ),
            InvocationError::MailboxListNotFound(path) => {
                write!(f, "Mailbox list {} does not exist.", path.display())
            }
            InvocationError::MailboxListUnreadable(path, reason) => {
                write!(f, "Could not read mailbox list {}: {reason}", path.display())
            }
            InvocationError::UnknownListMode(mode) => write!(
                f,
                "'{mode}' is not a mode for four arguments; expected 'list_insert' or 'list_remove'."
            ),
        }
    }
}

pub fn classify(args: &[String]) -> Result<Invocation, InvocationError> {
    match args {
        [mode, username, password] => {
            let operation = match mode.as_str() {
                "full_insert" => Operation::Insert,
                "full_remove" => Operation::Remove,
                _ => return Err(InvocationError::UnknownFullMode(mode.clone())),
            };

            Ok(Invocation {
                operation,
                scope: Scope::Full,
                credentials: credentials(username, password),
            })
        }
        [mode, username, password, list] => {
            // The list is checked before the mode, so a bad path wins over a bad mode.
            let path = PathBuf::from(list);
            let mailboxes = load_mailbox_list(&path).map_err(|e| match e {
                HolidirError::MailboxListNotFound(path) => InvocationError::MailboxListNotFound(path),
                HolidirError::MailboxListUnreadable { path, source } => {
                    InvocationError::MailboxListUnreadable(path, source.to_string())
                }
                other => InvocationError::MailboxListUnreadable(path.clone(), other.to_string()),
            })?;

            let operation = match mode.as_str() {
                "list_insert" => Operation::Insert,
                "list_remove" => Operation::Remove,
                _ => return Err(InvocationError::UnknownListMode(mode.clone())),
            };

            Ok(Invocation {
                operation,
                scope: Scope::List(mailboxes),
                credentials: credentials(username, password),
            })
        }
        _ => Err(InvocationError::MissingArguments),
    }
}

fn credentials(username: &str, password: &str) -> Credentials {
    Credentials {
        username: username.to_string(),
        password: password.to_string(),
    }
}
