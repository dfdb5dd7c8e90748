//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for profiles, polls and game snapshots.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            region TEXT,
            business_category TEXT,
            avatar_url TEXT,
            points INTEGER NOT NULL DEFAULT 0 CHECK (points >= 0),
            lifetime_points INTEGER NOT NULL DEFAULT 0,
            badges TEXT NOT NULL DEFAULT '[]',
            verified INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS decision_polls (
            id TEXT PRIMARY KEY,
            author_id TEXT NOT NULL,
            question TEXT NOT NULL,
            option_a_label TEXT NOT NULL,
            option_b_label TEXT NOT NULL,
            option_a_votes INTEGER NOT NULL DEFAULT 0 CHECK (option_a_votes >= 0),
            option_b_votes INTEGER NOT NULL DEFAULT 0 CHECK (option_b_votes >= 0),
            deadline TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS decision_poll_votes (
            poll_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            choice TEXT NOT NULL CHECK (choice IN ('A', 'B')),
            voted_at TEXT NOT NULL,
            PRIMARY KEY (poll_id, user_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_games (
            user_id TEXT PRIMARY KEY,
            box_state TEXT NOT NULL DEFAULT '{}',
            store_state TEXT NOT NULL DEFAULT '{}',
            puzzle_state TEXT NOT NULL DEFAULT '{}',
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_polls_created_at ON decision_polls(created_at);
        CREATE INDEX IF NOT EXISTS idx_polls_author ON decision_polls(author_id);
        CREATE INDEX IF NOT EXISTS idx_poll_votes_user ON decision_poll_votes(user_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
