use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use log::{info, warn};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};

use crate::db::sqlite::{decode_time, encode_time, Database};
use crate::models::Position;
use crate::utils::LAMPORTS_PER_SOL;

const POSITION_COLUMNS: &str = "wallet, mint, quantity, cost_lamports, source, opened_at, updated_at";

fn position_from_row(row: &SqliteRow) -> Result<Position> {
    Ok(Position {
        wallet: row.try_get("wallet")?,
        mint: row.try_get("mint")?,
        quantity: row.try_get("quantity")?,
        cost_lamports: row.try_get("cost_lamports")?,
        source: row.try_get("source")?,
        opened_at: decode_time(&row.try_get::<String, _>("opened_at")?)?,
        updated_at: decode_time(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn to_i64(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("{} {} is out of range", what, value))
}

async fn load_position(tx: &mut Transaction<'_, Sqlite>, wallet: &str, mint: &str) -> Result<Option<Position>> {
    let sql = format!("SELECT {} FROM positions WHERE wallet = ? AND mint = ?", POSITION_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(wallet)
        .bind(mint)
        .fetch_optional(&mut **tx)
        .await?;
    row.as_ref().map(position_from_row).transpose()
}

async fn upsert_position(tx: &mut Transaction<'_, Sqlite>, position: &Position) -> Result<()> {
    sqlx::query(
        "INSERT INTO positions (wallet, mint, quantity, cost_lamports, source, opened_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (wallet, mint) DO UPDATE SET
            quantity = excluded.quantity,
            cost_lamports = excluded.cost_lamports,
            source = excluded.source,
            updated_at = excluded.updated_at",
    )
    .bind(&position.wallet)
    .bind(&position.mint)
    .bind(position.quantity)
    .bind(position.cost_lamports)
    .bind(&position.source)
    .bind(encode_time(&position.opened_at))
    .bind(encode_time(&position.updated_at))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Merge a buy into an existing position (or open a new one)
fn merged(existing: Option<Position>, wallet: &str, mint: &str, units: i64, cost: i64, source: &str) -> Result<Position> {
    let now = Utc::now();
    match existing {
        Some(mut position) => {
            position.quantity = position
                .quantity
                .checked_add(units)
                .ok_or_else(|| anyhow!("Position quantity overflow for {}", mint))?;
            position.cost_lamports = position
                .cost_lamports
                .checked_add(cost)
                .ok_or_else(|| anyhow!("Position cost overflow for {}", mint))?;
            position.source = source.to_string();
            position.updated_at = now;
            Ok(position)
        }
        None => Ok(Position {
            wallet: wallet.to_string(),
            mint: mint.to_string(),
            quantity: units,
            cost_lamports: cost,
            source: source.to_string(),
            opened_at: now,
            updated_at: now,
        }),
    }
}

impl Database {
    /// Record a buy of `units` for `cost_lamports`, keeping a weighted average entry price
    pub async fn apply_buy(&self, wallet: &str, mint: &str, units: u64, cost_lamports: u64, source: &str) -> Result<Position> {
        if units == 0 {
            bail!("Cannot add a position of zero units for {}", mint);
        }
        let units = to_i64(units, "units")?;
        let cost = to_i64(cost_lamports, "cost")?;

        let mut tx = self.pool.begin().await?;
        let existing = load_position(&mut tx, wallet, mint).await?;
        let position = merged(existing, wallet, mint, units, cost, source)?;
        upsert_position(&mut tx, &position).await?;
        tx.commit().await?;

        info!(
            "Position {} / {}: {} units, avg {:.4} lamports/unit",
            wallet,
            mint,
            position.quantity,
            position.avg_price()
        );
        Ok(position)
    }

    /// Record a sell and return the realised PnL in lamports.
    ///
    /// The sold units carry their share of the cost basis; the position is
    /// deleted once nothing is left.
    pub async fn apply_sell(&self, wallet: &str, mint: &str, units: u64, proceeds_lamports: u64) -> Result<i64> {
        if units == 0 {
            bail!("Cannot sell zero units of {}", mint);
        }
        let units = to_i64(units, "units")?;
        let proceeds = to_i64(proceeds_lamports, "proceeds")?;

        let mut tx = self.pool.begin().await?;
        let mut position = load_position(&mut tx, wallet, mint)
            .await?
            .ok_or_else(|| anyhow!("No position in {} for wallet {}", mint, wallet))?;

        if units > position.quantity {
            bail!(
                "Cannot sell {} units of {}: wallet {} holds {}",
                units,
                mint,
                wallet,
                position.quantity
            );
        }

        let sold_cost = if units == position.quantity {
            position.cost_lamports
        } else {
            (position.cost_lamports as i128 * units as i128 / position.quantity as i128) as i64
        };
        let realized = proceeds - sold_cost;

        position.quantity -= units;
        position.cost_lamports -= sold_cost;
        position.updated_at = Utc::now();

        if position.quantity == 0 {
            sqlx::query("DELETE FROM positions WHERE wallet = ? AND mint = ?")
                .bind(wallet)
                .bind(mint)
                .execute(&mut *tx)
                .await?;
        } else {
            upsert_position(&mut tx, &position).await?;
        }
        tx.commit().await?;

        info!("Sold {} units of {} from {}, realised {} lamports", units, mint, wallet, realized);
        Ok(realized)
    }

    pub async fn get_position(&self, wallet: &str, mint: &str) -> Result<Option<Position>> {
        let sql = format!("SELECT {} FROM positions WHERE wallet = ? AND mint = ?", POSITION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(wallet)
            .bind(mint)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(position_from_row).transpose()
    }

    /// Open positions, optionally for a single wallet
    pub async fn positions(&self, wallet: Option<&str>) -> Result<Vec<Position>> {
        let rows = match wallet {
            Some(wallet) => {
                let sql = format!("SELECT {} FROM positions WHERE wallet = ? ORDER BY wallet, mint", POSITION_COLUMNS);
                sqlx::query(&sql).bind(wallet).fetch_all(&self.pool).await?
            }
            None => {
                let sql = format!("SELECT {} FROM positions ORDER BY wallet, mint", POSITION_COLUMNS);
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };
        rows.iter().map(position_from_row).collect()
    }

    /// Drop a position from one wallet, or from every wallet. Returns rows removed.
    pub async fn remove_position(&self, mint: &str, wallet: Option<&str>) -> Result<u64> {
        let result = match wallet {
            Some(wallet) => {
                sqlx::query("DELETE FROM positions WHERE mint = ? AND wallet = ?")
                    .bind(mint)
                    .bind(wallet)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM positions WHERE mint = ?")
                    .bind(mint)
                    .execute(&self.pool)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            warn!("No position found for {}", mint);
        }
        Ok(result.rows_affected())
    }

    /// Total lamports invested in open positions
    pub async fn portfolio_cost_basis(&self, wallet: Option<&str>) -> Result<i64> {
        let total: i64 = match wallet {
            Some(wallet) => {
                sqlx::query_scalar("SELECT COALESCE(SUM(cost_lamports), 0) FROM positions WHERE wallet = ?")
                    .bind(wallet)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COALESCE(SUM(cost_lamports), 0) FROM positions")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(total)
    }

    /// Import a legacy `portfolio.json` document: wallet -> mint -> {quantity, price}.
    ///
    /// `price` (or `avg_price`) is SOL per unit. Entries merge into existing
    /// positions as buys. Returns the number of positions imported.
    pub async fn import_legacy_portfolio(&self, json: &str) -> Result<usize> {
        let document: Value = serde_json::from_str(json).context("Legacy portfolio is not valid JSON")?;
        let wallets = document
            .as_object()
            .ok_or_else(|| anyhow!("Legacy portfolio must be an object of wallets"))?;

        let mut tx = self.pool.begin().await?;
        let mut imported = 0;

        for (wallet, tokens) in wallets {
            let Some(tokens) = tokens.as_object() else {
                warn!("Skipping wallet {}: not an object", wallet);
                continue;
            };

            for (mint, entry) in tokens {
                let quantity = entry.get("quantity").and_then(Value::as_f64).unwrap_or(0.0);
                let price = entry
                    .get("price")
                    .or_else(|| entry.get("avg_price"))
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                let source = entry.get("source").and_then(Value::as_str).unwrap_or("legacy");

                let units = quantity.round() as i64;
                if units <= 0 {
                    warn!("Skipping {} / {}: quantity {}", wallet, mint, quantity);
                    continue;
                }
                let cost = (quantity * price * LAMPORTS_PER_SOL as f64).round().max(0.0) as i64;

                let existing = load_position(&mut tx, wallet, mint).await?;
                let position = merged(existing, wallet, mint, units, cost, source)?;
                upsert_position(&mut tx, &position).await?;
                imported += 1;
            }
        }

        tx.commit().await?;
        info!("Imported {} legacy positions", imported);
        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::sqlite::init_test_db;

    const MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    #[tokio::test]
    async fn buys_average_the_entry_price() {
        let db = init_test_db().await.unwrap();

        db.apply_buy("main", MINT, 100, 1_000, "dca").await.unwrap();
        let position = db.apply_buy("main", MINT, 300, 6_000, "dca").await.unwrap();

        assert_eq!(position.quantity, 400);
        assert_eq!(position.cost_lamports, 7_000);
        assert!((position.avg_price() - 17.5).abs() < 1e-9);

        let stored = db.get_position("main", MINT).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 400);
        assert_eq!(stored.opened_at, position.opened_at);
    }

    #[tokio::test]
    async fn sells_realise_pnl_and_close_positions() {
        let db = init_test_db().await.unwrap();
        db.apply_buy("main", MINT, 400, 8_000, "manual").await.unwrap();

        let pnl = db.apply_sell("main", MINT, 100, 2_500).await.unwrap();
        assert_eq!(pnl, 500);
        let remaining = db.get_position("main", MINT).await.unwrap().unwrap();
        assert_eq!(remaining.quantity, 300);
        assert_eq!(remaining.cost_lamports, 6_000);

        let pnl = db.apply_sell("main", MINT, 300, 5_000).await.unwrap();
        assert_eq!(pnl, -1_000);
        assert!(db.get_position("main", MINT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overselling_is_rejected_and_leaves_position_intact() {
        let db = init_test_db().await.unwrap();
        db.apply_buy("main", MINT, 10, 100, "manual").await.unwrap();

        assert!(db.apply_sell("main", MINT, 11, 1_000).await.is_err());
        assert!(db.apply_sell("other", MINT, 1, 1).await.is_err());
        assert_eq!(db.get_position("main", MINT).await.unwrap().unwrap().quantity, 10);
    }

    #[tokio::test]
    async fn positions_filter_and_cost_basis() {
        let db = init_test_db().await.unwrap();
        db.apply_buy("a", MINT, 10, 100, "x").await.unwrap();
        db.apply_buy("b", MINT, 10, 250, "x").await.unwrap();
        db.apply_buy("b", "OtherMint", 5, 50, "x").await.unwrap();

        assert_eq!(db.positions(None).await.unwrap().len(), 3);
        assert_eq!(db.positions(Some("b")).await.unwrap().len(), 2);
        assert_eq!(db.portfolio_cost_basis(None).await.unwrap(), 400);
        assert_eq!(db.portfolio_cost_basis(Some("a")).await.unwrap(), 100);

        assert_eq!(db.remove_position(MINT, Some("a")).await.unwrap(), 1);
        assert_eq!(db.remove_position(MINT, None).await.unwrap(), 1);
        assert_eq!(db.remove_position(MINT, None).await.unwrap(), 0);
        assert_eq!(db.positions(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn imports_legacy_portfolio_json() {
        let db = init_test_db().await.unwrap();
        let legacy = r#"{
            "default": {
                "TokenA": {"quantity": 1000, "price": 0.000001, "source": "dex"},
                "TokenB": {"quantity": 0, "price": 1.0}
            },
            "second": {
                "TokenC": {"quantity": 50.4, "avg_price": 0.01}
            }
        }"#;

        assert_eq!(db.import_legacy_portfolio(legacy).await.unwrap(), 2);

        let a = db.get_position("default", "TokenA").await.unwrap().unwrap();
        assert_eq!(a.quantity, 1_000);
        assert_eq!(a.cost_lamports, 1_000_000);
        assert_eq!(a.source, "dex");

        let c = db.get_position("second", "TokenC").await.unwrap().unwrap();
        assert_eq!(c.quantity, 50);
        assert_eq!(c.cost_lamports, 504_000_000);

        assert!(db.import_legacy_portfolio("[1, 2]").await.is_err());
    }
}
