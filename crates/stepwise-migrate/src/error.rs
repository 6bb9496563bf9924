use std::fmt;
use std::io;

use crate::ledger::StoreError;

/// Why a migration definition was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// The name does not follow `YYYYMMDDHHMMSS-label[.sql]`.
    InvalidName,
    /// The up/down separator marker is missing.
    MissingSeparator,
    /// Splitting on the separator produced this many parts instead of two.
    SeparatorCount(usize),
    /// Nothing but comments and whitespace above the separator.
    EmptyForward,
    /// Nothing but comments and whitespace below the separator.
    EmptyBackward,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName => write!(f, "name does not match YYYYMMDDHHMMSS-label"),
            Self::MissingSeparator => write!(f, "separator marker not found"),
            Self::SeparatorCount(n) => {
                write!(f, "splitting on the separator gave {n} parts instead of 2")
            }
            Self::EmptyForward => write!(f, "forward (up) migration is empty"),
            Self::EmptyBackward => write!(f, "backward (down) migration is empty"),
        }
    }
}

/// Error raised by the reconciler, the applier or the migration source.
///
/// Every variant is fatal for the running operation. Variants carry the
/// offending definition or ledger name, and a position where one applies.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("malformed migration {name}: {reason}")]
    MalformedDefinition { name: String, reason: MalformedReason },

    #[error("no migration definitions found in {location}")]
    NoDefinitionsFound { location: String },

    #[error("cannot read migration definitions from {location}: {source}")]
    SourceUnavailable {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error(
        "ledger records {applied} applied migrations but only {available} definitions exist"
    )]
    LedgerAheadOfSource { applied: usize, available: usize },

    #[error(
        "ledger entry #{index} ({applied}) does not match migration definition {expected}"
    )]
    LedgerDivergesFromSource {
        index: usize,
        applied: String,
        expected: String,
    },

    #[error("duplicate migration name {name}")]
    DuplicateName { name: String },

    #[error("ledger is empty, nothing to revert")]
    EmptyLedger,

    #[error("cannot read the migration ledger: {source}")]
    LedgerReadFailed {
        #[source]
        source: StoreError,
    },

    #[error("cannot begin a transaction for {name}: {source}")]
    TransactionBeginFailed {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("migration {name} failed: {source}")]
    EffectExecutionFailed {
        name: String,
        effect: String,
        #[source]
        source: StoreError,
    },

    #[error("cannot update the ledger for {name}: {source}")]
    LedgerWriteFailed {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("most recent ledger entry is {found}, expected to revert {expected}")]
    RevertTargetMismatch { expected: String, found: String },

    #[error("cannot commit migration {name}: {source}")]
    CommitFailed {
        name: String,
        #[source]
        source: StoreError,
    },
}

/// Fieldless discriminant of [`MigrationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedDefinition,
    NoDefinitionsFound,
    SourceUnavailable,
    LedgerAheadOfSource,
    LedgerDivergesFromSource,
    DuplicateName,
    EmptyLedger,
    LedgerReadFailed,
    TransactionBeginFailed,
    EffectExecutionFailed,
    LedgerWriteFailed,
    RevertTargetMismatch,
    CommitFailed,
}

impl MigrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedDefinition { .. } => ErrorKind::MalformedDefinition,
            Self::NoDefinitionsFound { .. } => ErrorKind::NoDefinitionsFound,
            Self::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            Self::LedgerAheadOfSource { .. } => ErrorKind::LedgerAheadOfSource,
            Self::LedgerDivergesFromSource { .. } => ErrorKind::LedgerDivergesFromSource,
            Self::DuplicateName { .. } => ErrorKind::DuplicateName,
            Self::EmptyLedger => ErrorKind::EmptyLedger,
            Self::LedgerReadFailed { .. } => ErrorKind::LedgerReadFailed,
            Self::TransactionBeginFailed { .. } => ErrorKind::TransactionBeginFailed,
            Self::EffectExecutionFailed { .. } => ErrorKind::EffectExecutionFailed,
            Self::LedgerWriteFailed { .. } => ErrorKind::LedgerWriteFailed,
            Self::RevertTargetMismatch { .. } => ErrorKind::RevertTargetMismatch,
            Self::CommitFailed { .. } => ErrorKind::CommitFailed,
        }
    }

    /// The definition or ledger entry the error is about, if any.
    ///
    /// For a divergence this is the name found in the ledger; for a revert
    /// mismatch it is the name that was expected.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::MalformedDefinition { name, .. }
            | Self::DuplicateName { name }
            | Self::TransactionBeginFailed { name, .. }
            | Self::EffectExecutionFailed { name, .. }
            | Self::LedgerWriteFailed { name, .. }
            | Self::CommitFailed { name, .. } => Some(name),
            Self::LedgerDivergesFromSource { applied, .. } => Some(applied),
            Self::RevertTargetMismatch { expected, .. } => Some(expected),
            _ => None,
        }
    }

    /// Zero-based ledger position, for divergence errors.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::LedgerDivergesFromSource { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// True for errors that mean the ledger no longer describes the source.
    pub fn is_inconsistency(&self) -> bool {
        matches!(
            self,
            Self::LedgerAheadOfSource { .. } | Self::LedgerDivergesFromSource { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;
