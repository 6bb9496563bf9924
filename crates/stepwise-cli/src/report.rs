//! Exit codes and hints for failed commands.

use stepwise_migrate::{MalformedReason, MigrationError, SEPARATOR};

use crate::config::ConfigError;

fn migration_error(err: &anyhow::Error) -> Option<&MigrationError> {
    err.chain().find_map(|e| e.downcast_ref::<MigrationError>())
}

fn config_error(err: &anyhow::Error) -> Option<&ConfigError> {
    err.chain().find_map(|e| e.downcast_ref::<ConfigError>())
}

/// Process exit code for a failed command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match migration_error(err) {
        Some(MigrationError::MalformedDefinition { reason, .. }) => match reason {
            MalformedReason::SeparatorCount(_) => 2,
            MalformedReason::EmptyForward | MalformedReason::EmptyBackward => 3,
            MalformedReason::InvalidName | MalformedReason::MissingSeparator => 1,
        },
        Some(MigrationError::LedgerDivergesFromSource { .. }) => 2,
        _ => 1,
    }
}

/// The SQL that failed, when an effect was rejected by the database.
pub fn failed_effect(err: &anyhow::Error) -> Option<&str> {
    match migration_error(err)? {
        MigrationError::EffectExecutionFailed { effect, .. } => Some(effect.as_str()),
        _ => None,
    }
}

/// Something the user can do about `err`, if there is an obvious next step.
pub fn hint(err: &anyhow::Error) -> Option<String> {
    if let Some(ConfigError::NotConfigured { .. }) = config_error(err) {
        return Some("run 'stepwise init' first, or pass --database-url".to_string());
    }
    match migration_error(err)? {
        MigrationError::NoDefinitionsFound { .. } => {
            Some("create one with 'stepwise create <name>'".to_string())
        }
        MigrationError::MalformedDefinition {
            reason: MalformedReason::MissingSeparator,
            ..
        } => Some(format!(
            "every migration needs this block between its up and down parts:\n{}",
            SEPARATOR.trim_matches('\n')
        )),
        MigrationError::LedgerDivergesFromSource { .. }
        | MigrationError::LedgerAheadOfSource { .. } => Some(
            "the ledger no longer matches the migrations folder; restore the missing or \
             reordered files before migrating"
                .to_string(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn malformed(reason: MalformedReason) -> anyhow::Error {
        MigrationError::MalformedDefinition {
            name: "20240101000000-x.sql".into(),
            reason,
        }
        .into()
    }

    #[test]
    fn exit_codes() {
        assert_eq!(exit_code(&malformed(MalformedReason::SeparatorCount(3))), 2);
        assert_eq!(exit_code(&malformed(MalformedReason::EmptyForward)), 3);
        assert_eq!(exit_code(&malformed(MalformedReason::EmptyBackward)), 3);
        assert_eq!(exit_code(&malformed(MalformedReason::MissingSeparator)), 1);

        let diverged: anyhow::Error = MigrationError::LedgerDivergesFromSource {
            index: 1,
            applied: "b".into(),
            expected: "c".into(),
        }
        .into();
        assert_eq!(exit_code(&diverged), 2);

        let ahead: anyhow::Error = MigrationError::LedgerAheadOfSource {
            applied: 3,
            available: 2,
        }
        .into();
        assert_eq!(exit_code(&ahead), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }

    #[test]
    fn exit_code_sees_through_context() {
        let err = malformed(MalformedReason::EmptyForward).context("while running up");
        assert_eq!(exit_code(&err), 3);
    }

    #[test]
    fn failed_effect_is_reported() {
        let err: anyhow::Error = MigrationError::EffectExecutionFailed {
            name: "20240101000000-init.sql".into(),
            effect: "CREATE TABLE t (id INTEGER);".into(),
            source: stepwise_migrate::StoreError::backend("syntax error"),
        }
        .into();
        assert_eq!(failed_effect(&err), Some("CREATE TABLE t (id INTEGER);"));
        assert_eq!(exit_code(&err), 1);
        assert!(failed_effect(&malformed(MalformedReason::EmptyForward)).is_none());
    }

    #[test]
    fn hints() {
        let missing: anyhow::Error = ConfigError::NotConfigured {
            path: PathBuf::from("migrations/connection-string.txt"),
        }
        .into();
        assert!(hint(&missing).unwrap().contains("init"));

        let none: anyhow::Error = MigrationError::NoDefinitionsFound {
            location: "migrations".into(),
        }
        .into();
        assert!(hint(&none).unwrap().contains("create"));

        let marker = hint(&malformed(MalformedReason::MissingSeparator)).unwrap();
        assert!(marker.contains("-- UNDO (DOWN) migration is below this line:"));

        assert!(hint(&anyhow::anyhow!("boom")).is_none());
    }
}
