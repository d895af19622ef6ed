use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::utils::{lamports_to_sol, signed_lamports_to_sol};

struct Counters {
    strategies: BTreeMap<String, bool>,
    trades_executed: u64,
    trades_failed: u64,
    realized_pnl_lamports: i64,
    session_spent_lamports: u64,
    last_activity: Instant,
    last_activity_at: DateTime<Utc>,
    last_error: Option<String>,
    restarts: u32,
}

/// Process-wide bot state shared by the engine, the controller and the supervisor
pub struct BotState {
    started_at: DateTime<Utc>,
    started: Instant,
    live_mode: bool,
    paused: AtomicBool,
    counters: Mutex<Counters>,
}

/// Serializable view of [`BotState`], also written to the status file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub live_mode: bool,
    pub paused: bool,
    pub strategies: BTreeMap<String, bool>,
    pub trades_executed: u64,
    pub trades_failed: u64,
    pub realized_pnl_sol: f64,
    pub session_spent_sol: f64,
    pub last_activity: DateTime<Utc>,
    pub last_error: Option<String>,
    pub restarts: u32,
}

impl BotState {
    pub fn new<I, S>(strategies: I, live_mode: bool) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let now = Utc::now();
        Self {
            started_at: now,
            started: Instant::now(),
            live_mode,
            paused: AtomicBool::new(false),
            counters: Mutex::new(Counters {
                strategies: strategies.into_iter().map(|(name, on)| (name.into(), on)).collect(),
                trades_executed: 0,
                trades_failed: 0,
                realized_pnl_lamports: 0,
                session_spent_lamports: 0,
                last_activity: Instant::now(),
                last_activity_at: now,
                last_error: None,
                restarts: 0,
            }),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Returns the previous value
    pub fn set_paused(&self, paused: bool) -> bool {
        self.paused.swap(paused, Ordering::SeqCst)
    }

    pub fn is_strategy_enabled(&self, name: &str) -> bool {
        self.counters.lock().strategies.get(name).copied().unwrap_or(false)
    }

    /// Toggle a known strategy. Returns false if no such strategy exists.
    pub fn set_strategy_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.counters.lock().strategies.get_mut(name) {
            Some(flag) => {
                *flag = enabled;
                true
            }
            None => false,
        }
    }

    pub fn strategies(&self) -> BTreeMap<String, bool> {
        self.counters.lock().strategies.clone()
    }

    /// Mark the bot as alive
    pub fn touch(&self) {
        let mut counters = self.counters.lock();
        counters.last_activity = Instant::now();
        counters.last_activity_at = Utc::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.counters.lock().last_activity.elapsed()
    }

    pub fn record_trade(&self, spent_lamports: u64, realized_pnl_lamports: Option<i64>) {
        let mut counters = self.counters.lock();
        counters.trades_executed += 1;
        counters.session_spent_lamports = counters.session_spent_lamports.saturating_add(spent_lamports);
        if let Some(pnl) = realized_pnl_lamports {
            counters.realized_pnl_lamports = counters.realized_pnl_lamports.saturating_add(pnl);
        }
    }

    pub fn record_failure(&self, error: impl Into<String>) {
        let mut counters = self.counters.lock();
        counters.trades_failed += 1;
        counters.last_error = Some(error.into());
    }

    pub fn record_restart(&self) {
        self.counters.lock().restarts += 1;
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let counters = self.counters.lock();
        StatusSnapshot {
            pid: std::process::id(),
            started_at: self.started_at,
            uptime_secs: self.uptime().as_secs(),
            live_mode: self.live_mode,
            paused: self.is_paused(),
            strategies: counters.strategies.clone(),
            trades_executed: counters.trades_executed,
            trades_failed: counters.trades_failed,
            realized_pnl_sol: signed_lamports_to_sol(counters.realized_pnl_lamports),
            session_spent_sol: lamports_to_sol(counters.session_spent_lamports),
            last_activity: counters.last_activity_at,
            last_error: counters.last_error.clone(),
            restarts: counters.restarts,
        }
    }

    /// Write the snapshot as pretty JSON, replacing the file atomically
    pub fn write_status_file(&self, path: &Path) -> Result<StatusSnapshot> {
        let snapshot = self.snapshot();
        let json = serde_json::to_string_pretty(&snapshot)?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(snapshot)
    }
}
