//! Finance state and the abstractions it depends on

pub mod api;
pub mod config;
pub mod date;
pub mod log;
pub mod movement;
pub mod session;
pub mod state;

// Re-export main types for cleaner imports
pub use api::{ApiError, FinanceApi};
pub use movement::{BalanceSnapshot, Movement, MovementType, NewMovement, RecordId};
pub use session::{SessionProvider, StaticSession, StaticToken, TokenProvider, User};
pub use state::{FetchOutcome, FinanceError, FinanceSnapshot, FinanceState, Phase};
