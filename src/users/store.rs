use axum::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::model::{NewUser, User, UserPatch};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found")]
    NotFound,
    #[error("email already registered")]
    EmailTaken,
    #[error("insufficient credits (balance {balance})")]
    InsufficientCredits { balance: f64 },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a debit. `charged` is the amount actually taken, which the
/// ledger uses for an exact compensating refund.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebitReceipt {
    pub charged: f64,
    pub balance_after: f64,
}

/// Repository seam for user records. Implementations must apply
/// `debit`/`credit` atomically so concurrent charges against the same balance
/// cannot interleave a stale read-modify-write.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Case-insensitive email lookup.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn create(&self, new: NewUser) -> StoreResult<User>;

    /// Apply an admin patch (status and/or credits).
    async fn update(&self, id: Uuid, patch: UserPatch) -> StoreResult<User>;

    /// Take `amount` from the balance. With `allow_partial` the debit is
    /// clamped to the available balance (requires balance > 0); without it
    /// the full amount must be covered.
    async fn debit(&self, id: Uuid, amount: f64, allow_partial: bool) -> StoreResult<DebitReceipt>;

    /// Give `amount` back. Refunds are a relative re-add, never an overwrite.
    async fn credit(&self, id: Uuid, amount: f64) -> StoreResult<f64>;

    /// All users in insertion order.
    async fn list_all(&self) -> StoreResult<Vec<User>>;
}
