use anyhow::Context;
use axum::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::model::{NewUser, User, UserPatch, UserRole, UserStatus};
use super::store::{DebitReceipt, StoreError, StoreResult, UserStore};

/// Postgres-backed store. Debits are a single conditional UPDATE, so the
/// balance check and the deduction are atomic on the database side.
pub struct PgUserStore {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    status: String,
    role: String,
    credits: f64,
}

impl UserRow {
    fn into_user(self) -> StoreResult<User> {
        let status = UserStatus::parse(&self.status)
            .with_context(|| format!("unknown status {:?} in users table", self.status))?;
        let role = UserRole::parse(&self.role)
            .with_context(|| format!("unknown role {:?} in users table", self.role))?;
        Ok(User {
            id: self.id,
            email: self.email,
            password_hash: self.password_hash,
            status,
            role,
            credits: self.credits,
        })
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, status, role, credits";

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;
        Ok(Self { db })
    }

    async fn balance_of(&self, id: Uuid) -> StoreResult<Option<f64>> {
        let row: Option<(f64,)> = sqlx::query_as("SELECT credits FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("select balance")?;
        Ok(row.map(|(c,)| c))
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password_hash, status, role, credits
            FROM users
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find_by_email")?;
        row.map(UserRow::into_user).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password_hash, status, role, credits
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find_by_id")?;
        row.map(UserRow::into_user).transpose()
    }

    async fn create(&self, new: NewUser) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, email, password_hash, status, role, credits)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, email, password_hash, status, role, credits
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.status.as_str())
        .bind(new.role.as_str())
        .bind(new.credits)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::EmailTaken,
            _ => StoreError::Backend(anyhow::Error::new(e).context("insert user")),
        })?;
        row.into_user()
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
            SET status = COALESCE($2, status),
                credits = COALESCE($3, credits)
            WHERE id = $1
            RETURNING id, email, password_hash, status, role, credits
            "#,
        )
        .bind(id)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.credits)
        .fetch_optional(&self.db)
        .await
        .context("update user")?
        .ok_or(StoreError::NotFound)?;
        row.into_user()
    }

    async fn debit(&self, id: Uuid, amount: f64, allow_partial: bool) -> StoreResult<DebitReceipt> {
        let updated: Option<(f64, f64)> = if allow_partial {
            sqlx::query_as(
                r#"
                WITH prev AS (
                    SELECT credits FROM users WHERE id = $1 FOR UPDATE
                )
                UPDATE users u
                SET credits = GREATEST(u.credits - $2, 0)
                FROM prev
                WHERE u.id = $1 AND prev.credits > 0
                RETURNING prev.credits, u.credits
                "#,
            )
            .bind(id)
            .bind(amount)
            .fetch_optional(&self.db)
            .await
            .context("partial debit")?
        } else {
            sqlx::query_as(
                r#"
                WITH prev AS (
                    SELECT credits FROM users WHERE id = $1 FOR UPDATE
                )
                UPDATE users u
                SET credits = u.credits - $2
                FROM prev
                WHERE u.id = $1 AND prev.credits >= $2
                RETURNING prev.credits, u.credits
                "#,
            )
            .bind(id)
            .bind(amount)
            .fetch_optional(&self.db)
            .await
            .context("debit")?
        };

        match updated {
            Some((before, after)) => Ok(DebitReceipt {
                charged: before - after,
                balance_after: after,
            }),
            // Condition failed: either the row is gone or the balance does
            // not cover the charge.
            None => match self.balance_of(id).await? {
                Some(balance) => Err(StoreError::InsufficientCredits { balance }),
                None => Err(StoreError::NotFound),
            },
        }
    }

    async fn credit(&self, id: Uuid, amount: f64) -> StoreResult<f64> {
        let row: Option<(f64,)> = sqlx::query_as(
            "UPDATE users SET credits = credits + $2 WHERE id = $1 RETURNING credits",
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&self.db)
        .await
        .context("credit")?;
        row.map(|(c,)| c).ok_or(StoreError::NotFound)
    }

    async fn list_all(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at, id"
        ))
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        rows.into_iter().map(UserRow::into_user).collect()
    }
}
