//! Remote finance API abstraction and its error taxonomy

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use super::movement::{BalanceSnapshot, Movement, NewMovement, RecordId};
use super::session::User;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered 401. Local state is left to the auth owner.
    #[error("Session expired, please sign in again")]
    SessionExpired,

    #[error("Request failed with status {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Status {
        status: u16,
        message: Option<String>,
    },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Message the server put in its error payload, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Status {
                message: Some(m), ..
            } => Some(m),
            _ => None,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[async_trait]
pub trait FinanceApi: Send + Sync {
    async fn fetch_balance(&self, date: NaiveDate) -> ApiResult<BalanceSnapshot>;

    /// Movements for the date, in the order the server returns them.
    async fn fetch_movements(&self, date: NaiveDate) -> ApiResult<Vec<Movement>>;

    /// Creates a movement and returns the server record merged with the
    /// submitted fields.
    async fn create_movement(&self, movement: &NewMovement) -> ApiResult<Movement>;

    async fn delete_movement(&self, id: &RecordId) -> ApiResult<()>;

    async fn fetch_profile(&self) -> ApiResult<User>;
}
