use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No enrollments at all; a data-quality signal rather than a crash.
    #[error("insufficient data: student {0} has no enrollments")]
    InsufficientData(Uuid),
    #[error("enrollment for student {found} passed while building student {expected}")]
    ForeignEnrollment { expected: Uuid, found: Uuid },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unable to encode {what}: {source}")]
    Encode {
        what: &'static str,
        source: serde_json::Error,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
