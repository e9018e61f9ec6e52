pub mod ledger;
pub mod packages;
pub mod store;
pub mod tasks;
pub mod users;
pub mod withdrawals;

/// Failure taxonomy shared by all repositories. Nothing here is retried;
/// every failure is terminal for the request and reported synchronously.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
}
