//! SQLite-backed credential and token store.
//!
//! Tables:
//! - `users`: username, password_hash, session_active, created_at
//! - `tokens`: key, user_id (unique), created_at
//!
//! Every multi-statement mutation runs in a `BEGIN IMMEDIATE` transaction, so
//! the one-token-per-user rule holds even when several processes share the
//! database file.

use anyhow::{bail, Result};
use parking_lot::Mutex;
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;

/// Token byte length before hex encoding (20 bytes = 40 hex chars).
const TOKEN_BYTES: usize = 20;

/// Longest accepted username.
pub const MAX_USERNAME_LEN: usize = 150;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    /// Set on login, cleared on logout.
    pub session_active: bool,
    pub created_at: i64,
}

/// An issued bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub key: String,
    pub user_id: i64,
    pub created_at: i64,
}

const USER_COLUMNS: &str = "id, username, password_hash, session_active, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        session_active: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        key: row.get(0)?,
        user_id: row.get(1)?,
        created_at: row.get(2)?,
    })
}

/// SQLite-backed authentication store.
pub struct AuthStore {
    conn: Mutex<Connection>,
}

impl AuthStore {
    /// Open (or create) the auth tables in the database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                session_active INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tokens (
                key TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ── Users ───────────────────────────────────────────────────────

    /// Insert a new user with an already-hashed password.
    pub fn register(&self, username: &str, password_hash: &str) -> Result<User> {
        let trimmed = username.trim();
        if trimmed.is_empty() {
            bail!("Username cannot be empty");
        }
        if trimmed.chars().count() > MAX_USERNAME_LEN {
            bail!("Username too long (max {MAX_USERNAME_LEN} characters)");
        }

        let now = epoch_secs();
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO users (username, password_hash, session_active, created_at)
             VALUES (?1, ?2, 0, ?3)",
            params![trimmed, password_hash, now],
        );

        match result {
            Ok(_) => Ok(User {
                id: conn.last_insert_rowid(),
                username: trimmed.to_string(),
                password_hash: password_hash.to_string(),
                session_active: false,
                created_at: now,
            }),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                bail!("Username '{}' is already taken", trimmed)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user by exact username.
    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Look up a user by ID.
    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![user_id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    // ── Tokens ──────────────────────────────────────────────────────

    /// Look up a token by its key.
    pub fn find_token(&self, key: &str) -> Result<Option<Token>> {
        let conn = self.conn.lock();
        let token = conn
            .query_row(
                "SELECT key, user_id, created_at FROM tokens WHERE key = ?1",
                params![key],
                token_from_row,
            )
            .optional()?;
        Ok(token)
    }

    /// The user's current token, if any.
    pub fn token_for_user(&self, user_id: i64) -> Result<Option<Token>> {
        let conn = self.conn.lock();
        let token = conn
            .query_row(
                "SELECT key, user_id, created_at FROM tokens WHERE user_id = ?1",
                params![user_id],
                token_from_row,
            )
            .optional()?;
        Ok(token)
    }

    // ── Session transitions ─────────────────────────────────────────

    /// Get-or-create the user's token and mark the session active.
    ///
    /// Repeated calls return the same token until it is deleted.
    pub fn open_session(&self, user_id: i64) -> Result<Token> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT OR IGNORE INTO tokens (key, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![generate_key(), user_id, epoch_secs()],
        )?;
        let updated = tx.execute(
            "UPDATE users SET session_active = 1 WHERE id = ?1",
            params![user_id],
        )?;
        if updated == 0 {
            bail!("User {user_id} does not exist");
        }
        let token = tx.query_row(
            "SELECT key, user_id, created_at FROM tokens WHERE user_id = ?1",
            params![user_id],
            token_from_row,
        )?;

        tx.commit()?;
        Ok(token)
    }

    /// Delete the token and mark the owner's session inactive.
    /// Returns `false` if the token was already gone.
    pub fn close_session(&self, token: &Token) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let deleted = tx.execute(
            "DELETE FROM tokens WHERE key = ?1 AND user_id = ?2",
            params![token.key, token.user_id],
        )?;
        if deleted == 0 {
            tx.rollback()?;
            return Ok(false);
        }
        tx.execute(
            "UPDATE users SET session_active = 0 WHERE id = ?1",
            params![token.user_id],
        )?;

        tx.commit()?;
        Ok(true)
    }

    /// Persist a new password hash and rotate the user's token.
    ///
    /// The hash update, the deletion of `old` and the insertion of the new
    /// token commit together or not at all. Returns `None` (and changes
    /// nothing) if `old` no longer exists.
    pub fn change_password(&self, old: &Token, new_password_hash: &str) -> Result<Option<Token>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let updated = tx.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![new_password_hash, old.user_id],
        )?;
        let deleted = tx.execute(
            "DELETE FROM tokens WHERE key = ?1 AND user_id = ?2",
            params![old.key, old.user_id],
        )?;
        if updated == 0 || deleted == 0 {
            tx.rollback()?;
            return Ok(None);
        }

        let token = Token {
            key: generate_key(),
            user_id: old.user_id,
            created_at: epoch_secs(),
        };
        tx.execute(
            "INSERT INTO tokens (key, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token.key, token.user_id, token.created_at],
        )?;

        tx.commit()?;
        tracing::debug!(user_id = old.user_id, "Token rotated");
        Ok(Some(token))
    }
}

/// Generate a random token key (hex-encoded).
fn generate_key() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
