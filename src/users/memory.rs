use axum::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{NewUser, User, UserPatch};
use super::store::{DebitReceipt, StoreError, StoreResult, UserStore};

/// In-memory store. The single lock serializes every balance mutation, so a
/// debit's check-and-apply is atomic with respect to concurrent charges.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store, used by startup seeding and tests.
    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            users: RwLock::new(users),
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn create(&self, new: NewUser) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email.eq_ignore_ascii_case(&new.email)) {
            return Err(StoreError::EmailTaken);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            status: new.status,
            role: new.role,
            credits: new.credits,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> StoreResult<User> {
        let mut users = self.users.write().await;
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound)?;
        if let Some(status) = patch.status {
            user.status = status;
        }
        if let Some(credits) = patch.credits {
            user.credits = credits;
        }
        Ok(user.clone())
    }

    async fn debit(&self, id: Uuid, amount: f64, allow_partial: bool) -> StoreResult<DebitReceipt> {
        let mut users = self.users.write().await;
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound)?;
        let charged = if allow_partial {
            if user.credits <= 0.0 {
                return Err(StoreError::InsufficientCredits {
                    balance: user.credits,
                });
            }
            amount.min(user.credits)
        } else {
            if user.credits < amount {
                return Err(StoreError::InsufficientCredits {
                    balance: user.credits,
                });
            }
            amount
        };
        user.credits -= charged;
        Ok(DebitReceipt {
            charged,
            balance_after: user.credits,
        })
    }

    async fn credit(&self, id: Uuid, amount: f64) -> StoreResult<f64> {
        let mut users = self.users.write().await;
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound)?;
        user.credits += amount;
        Ok(user.credits)
    }

    async fn list_all(&self) -> StoreResult<Vec<User>> {
        let users = self.users.read().await;
        Ok(users.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::model::{UserRole, UserStatus};

    fn store_with(credits: f64) -> (MemoryUserStore, Uuid) {
        let id = Uuid::new_v4();
        let store = MemoryUserStore::with_users(vec![User {
            id,
            email: "a@x.com".into(),
            password_hash: "h".into(),
            status: UserStatus::Approved,
            role: UserRole::User,
            credits,
        }]);
        (store, id)
    }

    #[tokio::test]
    async fn email_lookup_is_case_insensitive() {
        let (store, id) = store_with(0.0);
        let found = store.find_by_email("A@X.COM").await.unwrap().unwrap();
        assert_eq!(found.id, id);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email_case_insensitively() {
        let (store, _) = store_with(0.0);
        let err = store
            .create(NewUser::signup("A@x.Com", "h"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EmailTaken));
    }

    #[tokio::test]
    async fn full_debit_requires_covering_balance() {
        let (store, id) = store_with(4.0);
        let err = store.debit(id, 5.0, false).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientCredits { .. }));
        // Balance untouched after a rejected debit.
        let user = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.credits, 4.0);
    }

    #[tokio::test]
    async fn full_debit_takes_exact_amount() {
        let (store, id) = store_with(10.0);
        let receipt = store.debit(id, 5.0, false).await.unwrap();
        assert_eq!(receipt.charged, 5.0);
        assert_eq!(receipt.balance_after, 5.0);
    }

    #[tokio::test]
    async fn partial_debit_clamps_to_balance() {
        let (store, id) = store_with(0.05);
        let receipt = store.debit(id, 0.1, true).await.unwrap();
        assert_eq!(receipt.charged, 0.05);
        assert_eq!(receipt.balance_after, 0.0);
    }

    #[tokio::test]
    async fn partial_debit_still_requires_positive_balance() {
        let (store, id) = store_with(0.0);
        let err = store.debit(id, 0.1, true).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientCredits { .. }));
    }

    #[tokio::test]
    async fn credit_is_a_relative_add() {
        let (store, id) = store_with(2.0);
        let balance = store.credit(id, 5.0).await.unwrap();
        assert_eq!(balance, 7.0);
    }

    #[tokio::test]
    async fn update_applies_partial_patch() {
        let (store, id) = store_with(0.0);
        let user = store
            .update(
                id,
                UserPatch {
                    status: Some(UserStatus::Rejected),
                    credits: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(user.status, UserStatus::Rejected);
        assert_eq!(user.credits, 0.0);
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let (store, _) = store_with(0.0);
        let err = store
            .update(Uuid::new_v4(), UserPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn list_all_preserves_insertion_order() {
        let store = MemoryUserStore::new();
        store.create(NewUser::signup("first@x.com", "h")).await.unwrap();
        store.create(NewUser::signup("second@x.com", "h")).await.unwrap();
        store.create(NewUser::signup("third@x.com", "h")).await.unwrap();
        let emails: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.email)
            .collect();
        assert_eq!(emails, ["first@x.com", "second@x.com", "third@x.com"]);
    }

    #[tokio::test]
    async fn concurrent_debits_never_overspend() {
        let (store, id) = store_with(5.0);
        let store = std::sync::Arc::new(store);
        let mut tasks = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            tasks.push(tokio::spawn(
                async move { store.debit(id, 1.0, false).await },
            ));
        }
        let mut ok = 0;
        for t in tasks {
            if t.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 5);
        let user = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.credits, 0.0);
    }
}
