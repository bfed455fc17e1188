use std::fmt;

/// Machine-readable error codes surfaced to UI collaborators and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ValidationFailed,
    ConfigParseError,
    ItemNotFound,
    ParentNotFound,
    CycleDetected,
    SnapshotInvalid,
    ConsistencyViolation,
    MigrationInProgress,
    MigrationAlreadyCompleted,
    InvalidMigrationTransition,
    ManualReviewRequired,
    RemoteUnavailable,
    CapacityExceeded,
    StorageBackend,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ValidationFailed => "E1001",
            Self::ConfigParseError => "E1002",
            Self::ItemNotFound => "E2001",
            Self::ParentNotFound => "E2002",
            Self::CycleDetected => "E2003",
            Self::SnapshotInvalid => "E3001",
            Self::ConsistencyViolation => "E3002",
            Self::MigrationInProgress => "E4001",
            Self::MigrationAlreadyCompleted => "E4002",
            Self::InvalidMigrationTransition => "E4003",
            Self::ManualReviewRequired => "E4004",
            Self::RemoteUnavailable => "E4005",
            Self::CapacityExceeded => "E5001",
            Self::StorageBackend => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ValidationFailed => "Input failed validation",
            Self::ConfigParseError => "Config file parse error",
            Self::ItemNotFound => "Item not found",
            Self::ParentNotFound => "Parent item not found",
            Self::CycleDetected => "Move would create a cycle",
            Self::SnapshotInvalid => "Migration snapshot is inconsistent",
            Self::ConsistencyViolation => "Migration consistency check failed",
            Self::MigrationInProgress => "A migration is already in progress",
            Self::MigrationAlreadyCompleted => "Migration already completed",
            Self::InvalidMigrationTransition => "Invalid migration state transition",
            Self::ManualReviewRequired => "Conflicts require manual review",
            Self::RemoteUnavailable => "Remote store unavailable",
            Self::CapacityExceeded => "Storage full",
            Self::StorageBackend => "Storage backend error",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to users.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ValidationFailed => Some("Fix the listed fields and retry."),
            Self::ConfigParseError => Some("Fix syntax in .waypoints/config.toml and retry."),
            Self::ItemNotFound | Self::InternalUnexpected => None,
            Self::ParentNotFound => Some("Pick an existing, non-deleted parent item."),
            Self::CycleDetected => Some("An item cannot be moved beneath its own descendant."),
            Self::SnapshotInvalid => Some("Re-export the local data and retry the migration."),
            Self::ConsistencyViolation => {
                Some("Local data was left untouched; report a bug with the migration log.")
            }
            Self::MigrationInProgress => {
                Some("Wait for the running migration to finish, or mark it failed and reset.")
            }
            Self::MigrationAlreadyCompleted => Some("This account has already been migrated."),
            Self::InvalidMigrationTransition => {
                Some("Follow pending -> in_progress -> completed|failed.")
            }
            Self::ManualReviewRequired => {
                Some("Reset the migration and rerun it with a concrete strategy.")
            }
            Self::RemoteUnavailable => Some("Check the remote store and retry."),
            Self::CapacityExceeded => Some("Purge deleted items or raise storage.capacity_bytes."),
            Self::StorageBackend => Some("Check disk space and write permissions."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    const ALL: [ErrorCode; 15] = [
        ErrorCode::ValidationFailed,
        ErrorCode::ConfigParseError,
        ErrorCode::ItemNotFound,
        ErrorCode::ParentNotFound,
        ErrorCode::CycleDetected,
        ErrorCode::SnapshotInvalid,
        ErrorCode::ConsistencyViolation,
        ErrorCode::MigrationInProgress,
        ErrorCode::MigrationAlreadyCompleted,
        ErrorCode::InvalidMigrationTransition,
        ErrorCode::ManualReviewRequired,
        ErrorCode::RemoteUnavailable,
        ErrorCode::CapacityExceeded,
        ErrorCode::StorageBackend,
        ErrorCode::InternalUnexpected,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let raw = code.code();
            assert_eq!(raw.len(), 5);
            assert!(raw.starts_with('E'));
            assert!(raw.chars().skip(1).all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn capacity_has_storage_full_message() {
        assert_eq!(ErrorCode::CapacityExceeded.message(), "Storage full");
        assert!(ErrorCode::CapacityExceeded.hint().is_some());
    }
}
