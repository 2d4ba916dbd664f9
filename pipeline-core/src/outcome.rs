use thiserror::Error;

/// Uniform result of one pipeline stage.
///
/// Stages never signal through a mix of `Option`, booleans and panics:
/// a stage either produced its payload, was deliberately not run, or failed
/// with a typed error callers can branch on.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Success(T),
    /// The stage was a no-op, e.g. object storage is not configured.
    Skipped(String),
    Failed(StageError),
}

impl<T> StageOutcome<T> {
    pub fn skipped(reason: impl Into<String>) -> Self {
        StageOutcome::Skipped(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, StageOutcome::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed(_))
    }

    /// The payload, if the stage succeeded.
    pub fn success(self) -> Option<T> {
        match self {
            StageOutcome::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// Typed failure of a pipeline stage.
///
/// Variants follow the pipeline's error taxonomy: transport, upstream status
/// and payload problems are transient fetch failures; `Storage` is a
/// recoverable staging failure (the local artifact remains the record of
/// truth); `Warehouse` covers setup and load errors.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("network transport failure: {0}")]
    Transport(String),

    #[error("upstream returned status {status}: {detail}")]
    UpstreamStatus { status: u16, detail: String },

    #[error("malformed upstream payload: {0}")]
    MalformedPayload(String),

    #[error("object storage failure: {0}")]
    Storage(String),

    #[error(
        "warehouse failure: {0}\n\
         Hint: run `weather-pipeline setup` to create the dataset and table first."
    )]
    Warehouse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_extracts_payload() {
        let outcome = StageOutcome::Success(42);
        assert!(outcome.is_success());
        assert_eq!(outcome.success(), Some(42));
    }

    #[test]
    fn skipped_and_failed_have_no_payload() {
        let skipped: StageOutcome<u32> = StageOutcome::skipped("not configured");
        assert!(skipped.is_skipped());
        assert_eq!(skipped.success(), None);

        let failed: StageOutcome<u32> =
            StageOutcome::Failed(StageError::Transport("connection refused".into()));
        assert!(failed.is_failed());
        assert_eq!(failed.success(), None);
    }

    #[test]
    fn warehouse_error_carries_remediation_hint() {
        let err = StageError::Warehouse("table not found".into());
        assert!(err.to_string().contains("weather-pipeline setup"));
    }
}
