//! Error taxonomy shared by the port registry, worker lifecycle, and
//! queue assignment engine.
//!
//! Validation failures (`ENODEV`, `ERANGE`, `EBUSY`, `EINVAL`) carry no
//! driver message; resource-exhaustion/driver failures (`ENOMEM`, `EIO`)
//! may carry one, surfaced verbatim from the underlying `Driver` call.

use std::fmt;

pub use nix::errno::Errno;

/// An API/control-plane error: an `Errno` plus an optional driver-supplied
/// message.
#[derive(Debug, Clone)]
pub struct Error {
    pub errno: Errno,
    pub message: Option<String>,
}

impl Error {
    pub fn new(errno: Errno) -> Self {
        Self {
            errno,
            message: None,
        }
    }

    pub fn with_message(errno: Errno, message: impl Into<String>) -> Self {
        Self {
            errno,
            message: Some(message.into()),
        }
    }

    /// Whether this error requires the assignment engine to roll back
    /// partial state (§7: resource exhaustion / driver failure).
    pub fn requires_rollback(&self) -> bool {
        matches!(self.errno, Errno::ENOMEM | Errno::EIO)
    }
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Error::new(errno)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{} ({msg})", self.errno),
            None => write!(f, "{}", self.errno),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
