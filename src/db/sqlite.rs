use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Database manager for the portfolio and trade log
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database and make sure the schema exists
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL {}", database_url))?
            .create_if_missing(true);

        // Every connection to an in-memory database is a separate database
        let pool_options = if is_memory_url(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", database_url))?;

        let db = Self { pool };
        db.init_schema().await?;
        info!("Database ready at {}", database_url);

        Ok(db)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS positions (
                wallet TEXT NOT NULL,
                mint TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                cost_lamports INTEGER NOT NULL,
                source TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (wallet, mint)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                wallet TEXT NOT NULL,
                mint TEXT NOT NULL,
                side TEXT NOT NULL,
                sol_lamports INTEGER NOT NULL,
                token_units INTEGER NOT NULL,
                signature TEXT,
                status TEXT NOT NULL,
                source TEXT NOT NULL,
                realized_pnl_lamports INTEGER,
                error TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_mint ON trades (mint)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Timestamps are stored as fixed-width RFC 3339 text so they sort correctly
pub(crate) fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_time(text: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)
        .with_context(|| format!("Invalid timestamp in database: {}", text))?
        .with_timezone(&Utc))
}

/// Initialize an in-memory database for testing
#[cfg(test)]
pub async fn init_test_db() -> Result<Database> {
    Database::new("sqlite::memory:").await
}
