use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::path::Path;

use crate::db::sqlite::{decode_time, encode_time, Database};
use crate::models::TradeRecord;

const TRADE_COLUMNS: &str = "id, timestamp, wallet, mint, side, sol_lamports, token_units, signature, \
                             status, source, realized_pnl_lamports, error";

const CSV_HEADER: [&str; 12] = [
    "id",
    "timestamp",
    "wallet",
    "mint",
    "side",
    "sol_lamports",
    "token_units",
    "signature",
    "status",
    "source",
    "realized_pnl_lamports",
    "error",
];

/// One exported trade, in `CSV_HEADER` order
#[derive(Serialize)]
struct CsvTrade<'a> {
    id: Option<i64>,
    timestamp: String,
    wallet: &'a str,
    mint: &'a str,
    side: &'static str,
    sol_lamports: i64,
    token_units: i64,
    signature: Option<&'a str>,
    status: &'static str,
    source: &'a str,
    realized_pnl_lamports: Option<i64>,
    error: Option<&'a str>,
}

impl<'a> From<&'a TradeRecord> for CsvTrade<'a> {
    fn from(trade: &'a TradeRecord) -> Self {
        Self {
            id: trade.id,
            timestamp: encode_time(&trade.timestamp),
            wallet: &trade.wallet,
            mint: &trade.mint,
            side: trade.side.as_str(),
            sol_lamports: trade.sol_lamports,
            token_units: trade.token_units,
            signature: trade.signature.as_deref(),
            status: trade.status.as_str(),
            source: &trade.source,
            realized_pnl_lamports: trade.realized_pnl_lamports,
            error: trade.error.as_deref(),
        }
    }
}

fn trade_from_row(row: &SqliteRow) -> Result<TradeRecord> {
    let side: String = row.try_get("side")?;
    let status: String = row.try_get("status")?;

    Ok(TradeRecord {
        id: row.try_get("id")?,
        timestamp: decode_time(&row.try_get::<String, _>("timestamp")?)?,
        wallet: row.try_get("wallet")?,
        mint: row.try_get("mint")?,
        side: side.parse().map_err(|e: String| anyhow!(e))?,
        sol_lamports: row.try_get("sol_lamports")?,
        token_units: row.try_get("token_units")?,
        signature: row.try_get("signature")?,
        status: status.parse().map_err(|e: String| anyhow!(e))?,
        source: row.try_get("source")?,
        realized_pnl_lamports: row.try_get("realized_pnl_lamports")?,
        error: row.try_get("error")?,
    })
}

impl Database {
    /// Append a trade to the log and return its id
    pub async fn record_trade(&self, trade: &TradeRecord) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO trades (timestamp, wallet, mint, side, sol_lamports, token_units, signature,
                                 status, source, realized_pnl_lamports, error)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(encode_time(&trade.timestamp))
        .bind(&trade.wallet)
        .bind(&trade.mint)
        .bind(trade.side.as_str())
        .bind(trade.sol_lamports)
        .bind(trade.token_units)
        .bind(&trade.signature)
        .bind(trade.status.as_str())
        .bind(&trade.source)
        .bind(trade.realized_pnl_lamports)
        .bind(&trade.error)
        .execute(&self.pool)
        .await
        .context("Failed to record trade")?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent trades first
    pub async fn recent_trades(&self, limit: u32) -> Result<Vec<TradeRecord>> {
        let sql = format!("SELECT {} FROM trades ORDER BY id DESC LIMIT ?", TRADE_COLUMNS);
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(trade_from_row).collect()
    }

    /// Write the whole trade log, oldest first, as CSV. Returns the number of rows written.
    pub async fn export_trades_csv(&self, path: &Path) -> Result<usize> {
        let sql = format!("SELECT {} FROM trades ORDER BY id ASC", TRADE_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        writer.write_record(CSV_HEADER)?;

        for row in &rows {
            let trade = trade_from_row(row)?;
            writer.serialize(CsvTrade::from(&trade))?;
        }
        writer.flush()?;

        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::init_test_db;
    use crate::models::{TradeSide, TradeStatus};

    fn trade(mint: &str, side: TradeSide) -> TradeRecord {
        let mut trade = TradeRecord::new("main", mint, side, "dca");
        trade.sol_lamports = 10_000_000;
        trade.token_units = 1_523_400;
        trade.status = TradeStatus::Confirmed;
        trade.signature = Some("5sig".into());
        trade
    }

    #[tokio::test]
    async fn trades_come_back_newest_first() {
        let db = init_test_db().await.unwrap();
        let first = db.record_trade(&trade("A", TradeSide::Buy)).await.unwrap();
        let second = db.record_trade(&trade("B", TradeSide::Sell)).await.unwrap();
        assert!(second > first);

        let trades = db.recent_trades(10).await.unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].mint, "B");
        assert_eq!(trades[0].side, TradeSide::Sell);
        assert_eq!(trades[0].id, Some(second));
        assert_eq!(trades[1].status, TradeStatus::Confirmed);

        assert_eq!(db.recent_trades(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn csv_export_escapes_fields() {
        let db = init_test_db().await.unwrap();
        db.record_trade(&trade("A", TradeSide::Buy)).await.unwrap();

        let mut failed = trade("B", TradeSide::Buy);
        failed.status = TradeStatus::Failed;
        failed.signature = None;
        failed.error = Some("slippage, \"0x1771\"".into());
        db.record_trade(&failed).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        assert_eq!(db.export_trades_csv(&path).await.unwrap(), 2);

        let csv = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "id,timestamp,wallet,mint,side,sol_lamports,token_units,signature,status,source,realized_pnl_lamports,error"
        );
        assert!(lines[1].starts_with("1,"));
        assert!(lines[1].contains(",buy,10000000,1523400,5sig,confirmed,dca,,"));
        assert!(lines[2].ends_with(",failed,dca,,\"slippage, \"\"0x1771\"\"\""));
    }

    #[tokio::test]
    async fn empty_log_exports_only_the_header() {
        let db = init_test_db().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");

        assert_eq!(db.export_trades_csv(&path).await.unwrap(), 0);
        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.headers().unwrap().len(), CSV_HEADER.len());
        assert_eq!(reader.records().count(), 0);
    }
}
