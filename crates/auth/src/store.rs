use std::{str::FromStr, time::Duration};

use {
    async_trait::async_trait,
    sqlx::{
        SqliteConnection, SqlitePool,
        sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    },
    tokio::sync::Mutex,
    tracing::debug,
};

use crate::{
    error::{AuthError, ConflictField, Result},
    model::{NewUser, User},
};

const USER_COLUMNS: &str = "id, email, username, password_hash, phone_number, first_name, \
     last_name, tenant_id, role, strftime('%Y-%m-%dT%H:%M:%SZ', created_at) AS created_at, \
     strftime('%Y-%m-%dT%H:%M:%SZ', updated_at) AS updated_at";

// ── Store contract ───────────────────────────────────────────────────────────

/// Persistence for user records.
///
/// `create_user` must be atomic with respect to the uniqueness of email and
/// username: of two concurrent creates sharing either value, at most one
/// succeeds and the other gets [`AuthError::Conflict`].
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn get_by_id(&self, id: &str) -> Result<Option<User>>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn email_exists(&self, email: &str) -> Result<bool> {
        Ok(self.get_by_email(email).await?.is_some())
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        Ok(self.get_by_username(username).await?.is_some())
    }
}

// ── SQLite store ─────────────────────────────────────────────────────────────

/// User store backed by SQLite.
pub struct SqliteUserStore {
    pool: SqlitePool,
    /// SQLite admits one writer at a time. Serializing signups here keeps
    /// deferred transactions from failing on lock upgrade under contention.
    write_lock: Mutex<()>,
}

/// Open a pool for `url`, creating the database file if needed.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;
    Ok(pool)
}

impl SqliteUserStore {
    /// Create a new store and initialize tables.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let store = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                phone_number TEXT NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_one_by(&self, column: &'static str, value: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        if let Some(field) = taken_field(&mut tx, &user.email, &user.username).await? {
            return Err(AuthError::Conflict { field });
        }

        let id = uuid::Uuid::new_v4().to_string();
        let inserted = sqlx::query(
            "INSERT INTO users (id, email, username, password_hash, phone_number, first_name, last_name, tenant_id, role)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.profile.phone_number)
        .bind(&user.profile.first_name)
        .bind(&user.profile.last_name)
        .bind(&user.tenant_id)
        .bind(&user.role)
        .execute(&mut *tx)
        .await;
        if let Err(err) = inserted {
            return Err(classify_insert_error(&mut tx, &user, err).await);
        }

        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(&id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(user_id = %created.id, "user row inserted");
        Ok(created)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<User>> {
        self.fetch_one_by("id", id).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_one_by("email", email).await
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.fetch_one_by("username", username).await
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

/// Which of `email` or `username` already belongs to a stored user. Email
/// is checked first.
async fn taken_field(
    conn: &mut SqliteConnection,
    email: &str,
    username: &str,
) -> Result<Option<ConflictField>> {
    let taken: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;
    if taken.is_some() {
        return Ok(Some(ConflictField::Email));
    }

    let taken: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(taken.map(|_| ConflictField::Username))
}

/// A UNIQUE violation on insert means another writer won the race. The
/// colliding field is found by looking the values up again; a violation on
/// neither (e.g. the primary key) is a store failure.
async fn classify_insert_error(
    conn: &mut SqliteConnection,
    user: &NewUser,
    err: sqlx::Error,
) -> AuthError {
    let unique = matches!(err, sqlx::Error::Database(ref db) if db.is_unique_violation());
    if unique {
        match taken_field(conn, &user.email, &user.username).await {
            Ok(Some(field)) => return AuthError::Conflict { field },
            Ok(None) => {},
            Err(recheck) => debug!(error = %recheck, "conflict re-check failed"),
        }
    }
    AuthError::store(err)
}
