//! PostgreSQL account store for Tessera authentication schemes.
//!
//! Persists accounts, auth bindings and contact credentials. The
//! `(scheme, uname)` uniqueness of bindings is a table constraint, so
//! concurrent first sign-ins across any number of server processes resolve
//! to a single account: the losing insert fails with a unique violation,
//! which is reported as [`StoreError::Conflict`].
//!
//! [`AccountStore::provision`] runs in one transaction.
//!
//! # Example
//!
//! ```ignore
//! use tessera_auth_postgres::PostgresAccountStore;
//!
//! let store = PostgresAccountStore::connect("postgres://localhost/tessera").await?;
//! store.migrate().await?;
//! ```

pub mod migrations;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::{PgConnection, Postgres};
use tessera_auth::{
    Account, AccountId, AccountState, AccountStore, AuthBinding, AuthLevel, Credential,
    StoreError, StoreResult,
};
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL connection pool type alias.
pub type PgPool = sqlx_core::pool::Pool<Postgres>;

/// PostgreSQL error code for unique violations.
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL error code for foreign key violations.
pub const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during account storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Requested row was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row already exists (conflict).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be decoded.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A schema migration failed.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl StorageError {
    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Maps constraint violations of a write to `Conflict` / `NotFound`.
    fn from_write(err: sqlx_core::Error, what: &str) -> Self {
        if has_pg_error_code(&err, PG_UNIQUE_VIOLATION) {
            return Self::Conflict(format!("{what} already exists"));
        }
        if has_pg_error_code(&err, PG_FOREIGN_KEY_VIOLATION) {
            return Self::NotFound(format!("account referenced by {what}"));
        }
        Self::Database(err)
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(message) => StoreError::Conflict(message),
            StorageError::NotFound(message) => StoreError::NotFound(message),
            other => StoreError::backend(other.to_string()),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &sqlx_core::Error, code: &str) -> bool {
    if let sqlx_core::Error::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

// =============================================================================
// PostgreSQL Account Store
// =============================================================================

type AccountRow = (Uuid, String, Value, Value, Vec<String>, Vec<String>, OffsetDateTime);
type BindingRow = (String, String, Uuid, String, String, OffsetDateTime);

/// Account store on PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresAccountStore {
    pool: Arc<PgPool>,
}

impl PostgresAccountStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create a store by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new().connect(database_url).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        migrations::run(&self.pool).await
    }

    /// Loads an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn account(&self, id: AccountId) -> StorageResult<Option<Account>> {
        let row: Option<AccountRow> = query_as(
            r#"
            SELECT id, state, public, trusted, tags, private, created_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(account_from_row).transpose()
    }

    /// Loads the credentials of an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn credentials(&self, id: AccountId) -> StorageResult<Vec<Credential>> {
        let rows: Vec<(String, String, bool)> = query_as(
            "SELECT method, value, done FROM credentials WHERE account_id = $1 ORDER BY method, value",
        )
        .bind(id.as_uuid())
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(method, value, done)| Credential {
                account_id: id,
                method,
                value,
                done,
            })
            .collect())
    }

    /// Number of accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn account_count(&self) -> StorageResult<i64> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(count)
    }

    async fn fetch_binding(&self, scheme: &str, username: &str) -> StorageResult<Option<AuthBinding>> {
        let row: Option<BindingRow> = query_as(
            r#"
            SELECT scheme, uname, account_id, auth_level, secret, expires_at
            FROM auth_bindings
            WHERE scheme = $1 AND uname = $2
            "#,
        )
        .bind(scheme)
        .bind(username)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(binding_from_row).transpose()
    }
}

async fn insert_account(conn: &mut PgConnection, account: &Account) -> StorageResult<()> {
    query(
        r#"
        INSERT INTO accounts (id, state, public, trusted, tags, private, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(account.id.as_uuid())
    .bind(account.state.as_str())
    .bind(serde_json::to_value(&account.public)?)
    .bind(serde_json::to_value(&account.trusted)?)
    .bind(&account.tags)
    .bind(&account.private)
    .bind(account.created_at)
    .execute(conn)
    .await
    .map_err(|e| StorageError::from_write(e, &format!("account {}", account.id)))?;

    Ok(())
}

async fn insert_binding(conn: &mut PgConnection, binding: &AuthBinding) -> StorageResult<()> {
    query(
        r#"
        INSERT INTO auth_bindings (scheme, uname, account_id, auth_level, secret, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&binding.scheme)
    .bind(&binding.username)
    .bind(binding.account_id.as_uuid())
    .bind(binding.auth_level.as_str())
    .bind(&binding.secret_hash)
    .bind(binding.expires_at)
    .execute(conn)
    .await
    .map_err(|e| StorageError::from_write(e, &format!("binding {}", binding.tag())))?;

    Ok(())
}

async fn upsert_credential_row(conn: &mut PgConnection, credential: &Credential) -> StorageResult<()> {
    query(
        r#"
        INSERT INTO credentials (account_id, method, value, done)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (account_id, method, value)
        DO UPDATE SET done = EXCLUDED.done, updated_at = NOW()
        "#,
    )
    .bind(credential.account_id.as_uuid())
    .bind(&credential.method)
    .bind(&credential.value)
    .bind(credential.done)
    .execute(conn)
    .await
    .map_err(|e| StorageError::from_write(e, &format!("{} credential", credential.method)))?;

    Ok(())
}

fn account_from_row(row: AccountRow) -> StorageResult<Account> {
    let (id, state, public, trusted, tags, private, created_at) = row;
    Ok(Account {
        id: AccountId::from_uuid(id),
        state: state.parse::<AccountState>().map_err(StorageError::InvalidData)?,
        public: serde_json::from_value(public)?,
        trusted: serde_json::from_value(trusted)?,
        tags,
        private,
        created_at,
    })
}

fn binding_from_row(row: BindingRow) -> StorageResult<AuthBinding> {
    let (scheme, username, account_id, auth_level, secret_hash, expires_at) = row;
    Ok(AuthBinding {
        scheme,
        username,
        account_id: AccountId::from_uuid(account_id),
        auth_level: auth_level.parse::<AuthLevel>().map_err(StorageError::InvalidData)?,
        secret_hash,
        expires_at,
    })
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn find_binding(
        &self,
        scheme: &str,
        username: &str,
    ) -> StoreResult<Option<AuthBinding>> {
        Ok(self.fetch_binding(scheme, username).await?)
    }

    async fn create_account(&self, account: &Account) -> StoreResult<AccountId> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        insert_account(&mut conn, account).await?;
        Ok(account.id)
    }

    async fn delete_account(&self, id: AccountId) -> StoreResult<()> {
        query("DELETE FROM accounts WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool.as_ref())
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn create_binding(&self, binding: &AuthBinding) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        insert_binding(&mut conn, binding).await?;
        Ok(())
    }

    async fn update_binding(&self, binding: &AuthBinding) -> StoreResult<()> {
        let result = query(
            r#"
            UPDATE auth_bindings
            SET secret = $3, expires_at = $4, updated_at = NOW()
            WHERE scheme = $1 AND uname = $2
            "#,
        )
        .bind(&binding.scheme)
        .bind(&binding.username)
        .bind(&binding.secret_hash)
        .bind(binding.expires_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(StorageError::from)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("binding {}", binding.tag())));
        }
        Ok(())
    }

    async fn delete_bindings(&self, scheme: &str, account: AccountId) -> StoreResult<u64> {
        let result = query("DELETE FROM auth_bindings WHERE scheme = $1 AND account_id = $2")
            .bind(scheme)
            .bind(account.as_uuid())
            .execute(self.pool.as_ref())
            .await
            .map_err(StorageError::from)?;
        Ok(result.rows_affected())
    }

    async fn upsert_credential(&self, credential: &Credential) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        upsert_credential_row(&mut conn, credential).await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(account = %account.id, scheme = %binding.scheme))]
    async fn provision(
        &self,
        account: &Account,
        binding: &AuthBinding,
        credential: Option<&Credential>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        // Dropping `tx` on an early return rolls back.
        insert_account(&mut tx, account).await?;
        insert_binding(&mut tx, binding).await?;
        if let Some(credential) = credential {
            upsert_credential_row(&mut tx, credential).await?;
        }

        tx.commit().await.map_err(StorageError::from)?;
        tracing::debug!("Provisioned account");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
