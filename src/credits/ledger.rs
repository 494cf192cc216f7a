use std::future::Future;

use tracing::{error, info};

use crate::error::{AppError, AppResult};
use crate::users::store::{DebitReceipt, UserStore};
use crate::users::{User, UserStatus};

pub const VIDEO_GENERATION_COST: f64 = 5.0;
pub const IMAGE_EDIT_COST: f64 = 1.0;
pub const AD_COMPOSITION_COST: f64 = 1.0;
pub const PROMPT_OPTIMIZE_COST: f64 = 0.1;

/// How a paid operation debits the balance.
///
/// `exact` requires the full cost up front. `up_to` (prompt optimization)
/// only requires a positive balance and clamps the debit so the balance
/// cannot go negative.
#[derive(Debug, Clone, Copy)]
pub struct Charge {
    pub amount: f64,
    allow_partial: bool,
}

impl Charge {
    pub fn exact(amount: f64) -> Self {
        Self {
            amount,
            allow_partial: false,
        }
    }

    pub fn up_to(amount: f64) -> Self {
        Self {
            amount,
            allow_partial: true,
        }
    }
}

/// Debit-then-act-then-compensate wrapper around a unit of paid work.
///
/// The caller must be approved and able to cover the charge, both checked
/// before any external call. The debit is applied atomically in the store,
/// then `op` runs; if it fails for any reason the exact charged amount is
/// credited back before the error propagates. On success the debit is final
/// and the receipt is returned alongside the result.
pub async fn execute_paid<T, F, Fut>(
    store: &dyn UserStore,
    user: &User,
    charge: Charge,
    op: F,
) -> AppResult<(T, DebitReceipt)>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    if user.status != UserStatus::Approved {
        return Err(AppError::access_denied(format!(
            "Your account status is: {}. Access denied.",
            user.status.as_str()
        )));
    }

    let receipt = store
        .debit(user.id, charge.amount, charge.allow_partial)
        .await?;
    info!(
        user_id = %user.id,
        charged = receipt.charged,
        balance = receipt.balance_after,
        "credits debited"
    );

    match op().await {
        Ok(result) => Ok((result, receipt)),
        Err(err) => {
            refund(store, user, receipt.charged).await;
            Err(err)
        }
    }
}

/// Compensating refund: a relative re-add of the charged amount, never an
/// overwrite with a stale balance. A failed refund is logged and swallowed
/// so the original error still reaches the caller.
pub async fn refund(store: &dyn UserStore, user: &User, amount: f64) {
    match store.credit(user.id, amount).await {
        Ok(balance) => {
            info!(user_id = %user.id, refunded = amount, balance, "credits refunded");
        }
        Err(e) => {
            error!(user_id = %user.id, amount, error = %e, "credit refund failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use uuid::Uuid;

    use super::*;
    use crate::users::{MemoryUserStore, UserRole};

    fn make_user(status: UserStatus, credits: f64) -> User {
        User {
            id: Uuid::new_v4(),
            email: "a@x.com".into(),
            password_hash: "h".into(),
            status,
            role: UserRole::User,
            credits,
        }
    }

    fn store_for(user: &User) -> MemoryUserStore {
        MemoryUserStore::with_users(vec![user.clone()])
    }

    async fn balance(store: &MemoryUserStore, id: Uuid) -> f64 {
        crate::users::UserStore::find_by_id(store, id)
            .await
            .unwrap()
            .unwrap()
            .credits
    }

    #[tokio::test]
    async fn successful_operation_keeps_the_debit() {
        let user = make_user(UserStatus::Approved, 10.0);
        let store = store_for(&user);
        let (out, receipt) = execute_paid(&store, &user, Charge::exact(5.0), || async {
            Ok::<_, AppError>("done")
        })
        .await
        .unwrap();
        assert_eq!(out, "done");
        assert_eq!(receipt.charged, 5.0);
        assert_eq!(balance(&store, user.id).await, 5.0);
    }

    #[tokio::test]
    async fn failed_operation_restores_the_balance() {
        let user = make_user(UserStatus::Approved, 10.0);
        let store = store_for(&user);
        let err = execute_paid(&store, &user, Charge::exact(5.0), || async {
            Err::<(), _>(AppError::upstream("remote exploded"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
        assert_eq!(balance(&store, user.id).await, 10.0);
    }

    #[tokio::test]
    async fn insufficient_balance_rejects_before_the_operation_runs() {
        let user = make_user(UserStatus::Approved, 4.0);
        let store = store_for(&user);
        let called = AtomicBool::new(false);
        let err = execute_paid(&store, &user, Charge::exact(5.0), || {
            called.store(true, Ordering::SeqCst);
            async { Ok::<_, AppError>(()) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InsufficientCredits(_)));
        assert!(!called.load(Ordering::SeqCst));
        assert_eq!(balance(&store, user.id).await, 4.0);
    }

    #[tokio::test]
    async fn unapproved_caller_is_denied_without_debit() {
        for status in [UserStatus::Pending, UserStatus::Rejected] {
            let user = make_user(status, 10.0);
            let store = store_for(&user);
            let err = execute_paid(&store, &user, Charge::exact(1.0), || async {
                Ok::<_, AppError>(())
            })
            .await
            .unwrap_err();
            assert!(matches!(err, AppError::AccessDenied(_)));
            assert_eq!(balance(&store, user.id).await, 10.0);
        }
    }

    #[tokio::test]
    async fn partial_charge_never_goes_negative() {
        let user = make_user(UserStatus::Approved, 0.05);
        let store = store_for(&user);
        let (_, receipt) = execute_paid(&store, &user, Charge::up_to(0.1), || async {
            Ok::<_, AppError>(())
        })
        .await
        .unwrap();
        assert_eq!(receipt.charged, 0.05);
        assert_eq!(balance(&store, user.id).await, 0.0);
    }

    #[tokio::test]
    async fn partial_charge_refunds_the_exact_partial_amount() {
        let user = make_user(UserStatus::Approved, 0.05);
        let store = store_for(&user);
        let _ = execute_paid(&store, &user, Charge::up_to(0.1), || async {
            Err::<(), _>(AppError::upstream("boom"))
        })
        .await
        .unwrap_err();
        assert_eq!(balance(&store, user.id).await, 0.05);
    }

    #[tokio::test]
    async fn optimize_style_charge_matches_expected_balance() {
        let user = make_user(UserStatus::Approved, 10.0);
        let store = store_for(&user);
        execute_paid(&store, &user, Charge::up_to(PROMPT_OPTIMIZE_COST), || async {
            Ok::<_, AppError>(())
        })
        .await
        .unwrap();
        let remaining = balance(&store, user.id).await;
        assert!((remaining - 9.9).abs() < 1e-9);
    }
}
