use crate::claims::ClaimError;
use crate::engine::SaveReport;
use crate::provider::ProviderError;

/// Errors returned at the boundary of every workflow
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("No changes")]
    NoChanges,
    #[error("No such user found.")]
    NoUsers,
    #[error("Refresh is possible only on List page!")]
    CantRefresh,
    #[error("You have to save or cancel the current changes!")]
    PendingActions,
    #[error("search prefix must be at least {min} characters long")]
    SearchTooShort { min: usize },
    #[error("remote access timed out, nothing was committed")]
    Timeout,
    #[error("operation cancelled, nothing was committed")]
    Cancelled,
    /// The index transaction failed to begin or commit
    #[error("index transaction failed, nothing was durably saved, retry: {0}")]
    Transaction(#[source] ProviderError),
    #[error("writing claims of {uid} failed: {source}")]
    WriteThrough {
        uid: String,
        #[source]
        source: ProviderError,
    },
    /// Some users could not be written; their edits were kept
    #[error("{0}")]
    PartialSave(Box<SaveReport>),
    #[error(transparent)]
    Provider(ProviderError),
    #[error(transparent)]
    Claim(#[from] ClaimError),
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("unknown permission: {0}")]
    UnknownPermission(String),
}

impl From<ProviderError> for EngineError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Timeout => EngineError::Timeout,
            ProviderError::Cancelled => EngineError::Cancelled,
            other => EngineError::Provider(other),
        }
    }
}

impl EngineError {
    /// Map a failure of the index transaction itself
    pub(crate) fn transaction(error: ProviderError) -> Self {
        match error {
            ProviderError::Timeout => EngineError::Timeout,
            ProviderError::Cancelled => EngineError::Cancelled,
            other => EngineError::Transaction(other),
        }
    }

    /// Map a failed claim write for `uid`
    pub(crate) fn write_through(uid: &str, error: ProviderError) -> Self {
        match error {
            ProviderError::Timeout => EngineError::Timeout,
            ProviderError::Cancelled => EngineError::Cancelled,
            source => EngineError::WriteThrough {
                uid: uid.to_string(),
                source,
            },
        }
    }
}
