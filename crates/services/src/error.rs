use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Failure reported by (or on the way to) the savings canister.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CanisterError {
    /// The canister answered `{"Err": message}`.
    #[error("{0}")]
    Rejected(String),

    #[error("Canister call failed: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Inline form validation message.
    #[error("{0}")]
    Validation(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Saving plan not found: {0}")]
    PlanNotFound(u64),

    #[error("Backend error: {0}")]
    Backend(#[from] CanisterError),

    #[error("Price unavailable: {0}")]
    Price(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation cancelled")]
    Cancelled,
}
