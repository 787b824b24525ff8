//! Export error kinds and reference-integrity issues.
//!
//! Two families of problems surface during an export:
//!
//! - [`ExportError`]: something stopped a unit of work. Its [`ErrorScope`] decides how far
//!   the damage spreads: a record is dropped, a realm is failed, or the whole run aborts.
//! - [`Issue`]: a non-fatal finding recorded in the per-realm report (dangling references,
//!   orphan groups, dropped records, failed batches). The realm keeps going.

use serde::Serialize;
use std::fmt;

/// How far an [`ExportError`] propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorScope {
    /// Only the offending record is dropped.
    Record,
    /// The current realm ends in `Failed`; other realms continue.
    Realm,
    /// The whole run stops immediately.
    Run,
}

/// Errors raised by the export pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExportError {
    /// The source rejected the credential. No realm can be fetched.
    #[error("authentication against the source failed: {reason}")]
    AuthFailure { reason: String },

    /// Non-retryable 4xx from a specific collection.
    #[error("source rejected {collection} in realm '{realm}' with HTTP {status}")]
    SourceRejected {
        realm: String,
        collection: String,
        status: u16,
    },

    /// Pagination did not terminate (page limit hit or cursor did not advance).
    #[error(
        "pagination of {collection} in realm '{realm}' exhausted after {pages} pages (last cursor {last_cursor})"
    )]
    PaginationExhausted {
        realm: String,
        collection: String,
        pages: usize,
        last_cursor: usize,
    },

    /// Transient failures outlasted the retry policy.
    #[error("transport failure fetching {collection} in realm '{realm}': {message}")]
    Transport {
        realm: String,
        collection: String,
        message: String,
    },

    /// A record is missing its unique-key field.
    #[error("malformed {label} record: missing '{field}'")]
    MalformedRecord { label: String, field: String },

    /// A realm named in the allow-list does not exist at the source.
    #[error("realm '{realm}' does not exist at the source")]
    UnknownRealm { realm: String },

    /// Every batch of a realm failed to load.
    #[error("loading realm '{realm}' failed: {reason}")]
    LoadFailed { realm: String, reason: String },

    /// The destructive pre-pass failed; nothing is loaded on top of an inconsistent store.
    #[error("clean pre-pass failed: {reason}")]
    CleanFailed { reason: String },

    /// The global timeout expired before the realm finished.
    #[error("export deadline exceeded")]
    DeadlineExceeded,

    /// A run-scoped error elsewhere stopped this realm.
    #[error("run aborted: {reason}")]
    Aborted { reason: String },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Graph store failure outside of batch application.
    #[error("graph store error: {0}")]
    Store(String),
}

impl ExportError {
    /// Propagation scope of this error.
    pub fn scope(&self) -> ErrorScope {
        match self {
            ExportError::AuthFailure { .. }
            | ExportError::CleanFailed { .. }
            | ExportError::Config(_) => ErrorScope::Run,
            ExportError::MalformedRecord { .. } => ErrorScope::Record,
            ExportError::SourceRejected { .. }
            | ExportError::PaginationExhausted { .. }
            | ExportError::Transport { .. }
            | ExportError::UnknownRealm { .. }
            | ExportError::LoadFailed { .. }
            | ExportError::DeadlineExceeded
            | ExportError::Aborted { .. }
            | ExportError::Store(_) => ErrorScope::Realm,
        }
    }

    /// Short machine-readable kind name used in summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ExportError::AuthFailure { .. } => "AuthFailure",
            ExportError::SourceRejected { .. } => "SourceRejected",
            ExportError::PaginationExhausted { .. } => "PaginationExhausted",
            ExportError::Transport { .. } => "Transport",
            ExportError::MalformedRecord { .. } => "MalformedRecord",
            ExportError::UnknownRealm { .. } => "UnknownRealm",
            ExportError::LoadFailed { .. } => "LoadFailed",
            ExportError::CleanFailed { .. } => "CleanFailed",
            ExportError::DeadlineExceeded => "DeadlineExceeded",
            ExportError::Aborted { .. } => "Aborted",
            ExportError::Config(_) => "Config",
            ExportError::Store(_) => "Store",
        }
    }
}

/// Kinds of non-fatal findings accumulated in a realm report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum IssueKind {
    MalformedRecord,
    UnresolvedComposite,
    OrphanGroup,
    DuplicateGroupPath,
    DanglingReference,
    LoadFailed,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssueKind::MalformedRecord => "MalformedRecord",
            IssueKind::UnresolvedComposite => "UnresolvedComposite",
            IssueKind::OrphanGroup => "OrphanGroup",
            IssueKind::DuplicateGroupPath => "DuplicateGroupPath",
            IssueKind::DanglingReference => "DanglingReference",
            IssueKind::LoadFailed => "LoadFailed",
        };
        f.write_str(name)
    }
}

/// A recorded warning: the kind plus a human-readable detail line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub detail: String,
}

impl Issue {
    pub fn new(kind: IssueKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl From<&ExportError> for Issue {
    /// Record-scoped errors degrade to issues once the record has been dropped.
    fn from(err: &ExportError) -> Self {
        let kind = match err {
            ExportError::LoadFailed { .. } => IssueKind::LoadFailed,
            _ => IssueKind::MalformedRecord,
        };
        Issue::new(kind, err.to_string())
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}
