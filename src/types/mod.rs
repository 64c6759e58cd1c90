use std::fmt;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;

use aws_sdk_s3::primitives::DateTime;
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

pub mod async_callback;
pub mod error;
pub mod key_tree;
pub mod notification;
pub mod stats;
pub mod token;

/// One object as seen by a listing or a HEAD request.
///
/// The `e_tag` is stored without surrounding quotes so that values coming from
/// different providers (or from listing and HEAD on the same provider) compare equal.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDescriptor {
    pub key: String,
    pub size: u64,
    pub e_tag: Option<String>,
    pub last_modified: DateTime,
}

impl ObjectDescriptor {
    pub fn new(key: &str, size: u64, e_tag: Option<&str>, last_modified: DateTime) -> Self {
        Self {
            key: key.to_string(),
            size,
            e_tag: e_tag.map(normalize_e_tag),
            last_modified,
        }
    }
}

pub fn normalize_e_tag(e_tag: &str) -> String {
    e_tag.replace('"', "")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyIdentical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateReason {
    SizeMismatch,
    ChecksumMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDecision {
    Skip(SkipReason),
    Copy,
    Update(UpdateReason),
}

impl MigrationDecision {
    pub fn is_skip(&self) -> bool {
        matches!(self, MigrationDecision::Skip(_))
    }
}

impl fmt::Display for MigrationDecision {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDecision::Skip(SkipReason::AlreadyIdentical) => {
                write!(f, "skip (already identical)")
            }
            MigrationDecision::Copy => write!(f, "copy"),
            MigrationDecision::Update(UpdateReason::SizeMismatch) => {
                write!(f, "update (size mismatch)")
            }
            MigrationDecision::Update(UpdateReason::ChecksumMismatch) => {
                write!(f, "update (checksum mismatch)")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferErrorKind {
    Timeout,
    Network,
    NotFound,
    AccessDenied,
    Service,
    Stream,
    Cancelled,
    Other,
}

impl fmt::Display for TransferErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferErrorKind::Timeout => "timeout",
            TransferErrorKind::Network => "network",
            TransferErrorKind::NotFound => "not found",
            TransferErrorKind::AccessDenied => "access denied",
            TransferErrorKind::Service => "service",
            TransferErrorKind::Stream => "stream",
            TransferErrorKind::Cancelled => "cancelled",
            TransferErrorKind::Other => "other",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferError {
    pub kind: TransferErrorKind,
    pub message: String,
}

impl TransferError {
    pub fn new(kind: TransferErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// The result of processing exactly one listed object.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    pub key: String,
    pub decision: MigrationDecision,
    pub success: bool,
    pub bytes_transferred: u64,
    pub attempts: u32,
    pub error: Option<TransferError>,
}

impl TransferOutcome {
    pub fn skipped(key: &str) -> Self {
        Self {
            key: key.to_string(),
            decision: MigrationDecision::Skip(SkipReason::AlreadyIdentical),
            success: true,
            bytes_transferred: 0,
            attempts: 0,
            error: None,
        }
    }

    pub fn succeeded(
        key: &str,
        decision: MigrationDecision,
        bytes_transferred: u64,
        attempts: u32,
    ) -> Self {
        Self {
            key: key.to_string(),
            decision,
            success: true,
            bytes_transferred,
            attempts,
            error: None,
        }
    }

    pub fn failed(
        key: &str,
        decision: MigrationDecision,
        attempts: u32,
        error: TransferError,
    ) -> Self {
        Self {
            key: key.to_string(),
            decision,
            success: false,
            bytes_transferred: 0,
            attempts,
            error: Some(error),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.decision.is_skip()
    }
}

/// Live events for the progress indicator. Distinct from the folded
/// `MigrationStats`: these may be dropped without affecting the final report.
#[derive(Debug, PartialEq)]
pub enum MigrationStatistics {
    TransferBytes(u64),
    TransferComplete { key: String },
    TransferSkip { key: String },
    TransferError { key: String },
    TransferRetry { key: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoragePath {
    pub bucket: String,
    pub prefix: String,
}

#[derive(Debug, Clone)]
pub struct ClientConfigLocation {
    pub aws_config_file: Option<PathBuf>,
    pub aws_shared_credentials_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum S3Credentials {
    Profile(String),
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}
