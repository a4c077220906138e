use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, Row, SqlitePool};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::UserStore;
use crate::types::{UserProfile, UserRecord};

const QUERY_CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    external_auth_id TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    photo_url TEXT,
    email_verified INTEGER NOT NULL DEFAULT 0,
    account_enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
"#;

const QUERY_CREATE_EMAIL_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_users_email ON users (email COLLATE NOCASE);";

const USER_COLUMNS: &str = "id, external_auth_id, email, first_name, last_name, photo_url, \
     email_verified, account_enabled, created_at, updated_at, deleted_at";

// `users.<col>` in the DO UPDATE clause is the row before the update.
const QUERY_UPSERT_USER: &str = r#"
INSERT INTO users (
    id, external_auth_id, email, first_name, last_name, photo_url,
    email_verified, account_enabled, created_at, updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8, $9)
ON CONFLICT(external_auth_id) DO UPDATE SET
    email = excluded.email,
    first_name = excluded.first_name,
    last_name = excluded.last_name,
    photo_url = excluded.photo_url,
    email_verified = excluded.email_verified,
    updated_at = CASE
        WHEN users.email IS excluded.email
         AND users.first_name IS excluded.first_name
         AND users.last_name IS excluded.last_name
         AND users.photo_url IS excluded.photo_url
         AND users.email_verified IS excluded.email_verified
        THEN users.updated_at
        ELSE excluded.updated_at
    END
RETURNING id, external_auth_id, email, first_name, last_name, photo_url,
    email_verified, account_enabled, created_at, updated_at, deleted_at;
"#;

const QUERY_SOFT_DELETE_USER: &str = r#"
UPDATE users
SET account_enabled = 0, deleted_at = COALESCE(deleted_at, $1)
WHERE external_auth_id = $2;
"#;

/// SQLite-backed [`UserStore`]. Upserts are a single
/// `INSERT .. ON CONFLICT(external_auth_id) DO UPDATE` statement, so the
/// unique key serialises concurrent writers for the same identity.
#[derive(Clone)]
pub struct SqliteUserStore {
    pub db_pool: SqlitePool,
}

impl FromRow<'_, SqliteRow> for UserRecord {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let id: uuid::fmt::Hyphenated = row.try_get("id")?;

        Ok(Self {
            id: id.into_uuid(),
            external_auth_id: row.try_get("external_auth_id")?,
            email: row.try_get("email")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            photo_url: row.try_get("photo_url")?,
            email_verified: row.try_get("email_verified")?,
            account_enabled: row.try_get("account_enabled")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl SqliteUserStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    /// Open a pool. In-memory databases are pinned to one long-lived
    /// connection, since every SQLite connection gets its own memory database.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let db_pool = pool_options.connect_with(options).await?;
        Ok(Self { db_pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(QUERY_CREATE_USERS)
            .execute(&self.db_pool)
            .await?;
        sqlx::query(QUERY_CREATE_EMAIL_INDEX)
            .execute(&self.db_pool)
            .await?;
        tracing::debug!("users table ready");
        Ok(())
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn find_by_external_id(
        &self,
        external_auth_id: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE external_auth_id = $1;");
        Ok(sqlx::query_as::<_, UserRecord>(&query)
            .bind(external_auth_id)
            .fetch_optional(&self.db_pool)
            .await?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1;");
        Ok(sqlx::query_as::<_, UserRecord>(&query)
            .bind(id.hyphenated())
            .fetch_optional(&self.db_pool)
            .await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 COLLATE NOCASE \
             ORDER BY created_at LIMIT 1;"
        );
        Ok(sqlx::query_as::<_, UserRecord>(&query)
            .bind(email)
            .fetch_optional(&self.db_pool)
            .await?)
    }

    async fn upsert(
        &self,
        profile: UserProfile,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, StoreError> {
        Ok(sqlx::query_as::<_, UserRecord>(QUERY_UPSERT_USER)
            .bind(Uuid::new_v4().hyphenated())
            .bind(&profile.external_auth_id)
            .bind(&profile.email)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(&profile.photo_url)
            .bind(profile.email_verified)
            .bind(now)
            .bind(now)
            .fetch_one(&self.db_pool)
            .await?)
    }

    async fn soft_delete(
        &self,
        external_auth_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(QUERY_SOFT_DELETE_USER)
            .bind(now)
            .bind(external_auth_id)
            .execute(&self.db_pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1;").execute(&self.db_pool).await?;
        Ok(())
    }
}
