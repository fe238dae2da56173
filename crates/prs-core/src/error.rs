use crate::validation::ValidationErrors;

/// Action names used in [`PatientError::Persistence`] messages.
pub(crate) const UPDATING: &str = "updating";
pub(crate) const DELETING: &str = "deleting";

#[derive(Debug, thiserror::Error)]
pub enum PatientError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input rejected before any mutation. Includes CPF/CNS uniqueness conflicts.
    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("patient not found: {0}")]
    NotFound(i64),

    #[error("failed to store photo: {0}")]
    Storage(#[from] prs_files::FilesError),

    /// A transactional write failed and was rolled back.
    #[error("an error occurred while {action} the patient: {source}")]
    Persistence {
        action: &'static str,
        #[source]
        source: Box<PatientError>,
    },

    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to apply migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl PatientError {
    pub(crate) fn persistence(action: &'static str, source: PatientError) -> Self {
        PatientError::Persistence {
            action,
            source: Box::new(source),
        }
    }

    /// Column named by a unique-constraint violation, if this is one.
    pub(crate) fn unique_violation_column(&self) -> Option<&'static str> {
        let PatientError::Database(sqlx::Error::Database(db_err)) = self else {
            return None;
        };
        if !db_err.is_unique_violation() {
            return None;
        }
        let message = db_err.message();
        ["national_id_cpf", "national_health_card_cns"]
            .into_iter()
            .find(|column| message.contains(column))
    }
}

pub type PatientResult<T> = std::result::Result<T, PatientError>;
