use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthConfig;
use crate::control::{BotState, SupervisorCommand};
use crate::monitoring::Notifier;
use crate::strategy::StrategyEngine;

const ENGINE_STOP_GRACE: Duration = Duration::from_secs(10);

/// Resident memory of this process in bytes
pub fn rss_bytes() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = System::new();
    system.refresh_process(pid);
    system.process(pid).map(|process| process.memory())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthVerdict {
    Healthy,
    MemoryExceeded,
    Stalled,
}

/// Memory and liveness checks for the running bot
pub struct HealthMonitor {
    state: Arc<BotState>,
    memory_limit_bytes: u64,
    stale_after: Duration,
    heartbeat_file: PathBuf,
}

impl HealthMonitor {
    pub fn new(state: Arc<BotState>, config: &HealthConfig) -> Self {
        Self {
            state,
            memory_limit_bytes: config.memory_limit_mb.saturating_mul(1024 * 1024),
            stale_after: Duration::from_secs(config.stale_after_secs),
            heartbeat_file: PathBuf::from(&config.heartbeat_file),
        }
    }

    pub fn verdict(&self, rss: Option<u64>, idle: Duration) -> HealthVerdict {
        if matches!(rss, Some(bytes) if bytes > self.memory_limit_bytes) {
            HealthVerdict::MemoryExceeded
        } else if idle > self.stale_after {
            HealthVerdict::Stalled
        } else {
            HealthVerdict::Healthy
        }
    }

    /// Run the checks and write the heartbeat file
    pub fn check(&self) -> HealthVerdict {
        let rss = rss_bytes();
        let idle = self.state.idle_for();
        let verdict = self.verdict(rss, idle);

        let heartbeat = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "pid": std::process::id(),
            "rss_mb": rss.map(|b| b / (1024 * 1024)),
            "idle_secs": idle.as_secs(),
            "status": verdict,
        });
        if let Err(e) = fs::write(&self.heartbeat_file, heartbeat.to_string()) {
            warn!("Failed to write heartbeat {}: {}", self.heartbeat_file.display(), e);
        }

        verdict
    }
}

/// Why [`Supervisor::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Stopped,
    MemoryExceeded,
}

struct RunningEngine {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<Result<()>>,
}

/// Owns the engine task and restarts or stops it on request
pub struct Supervisor {
    engine: Arc<StrategyEngine>,
    state: Arc<BotState>,
    health: HealthMonitor,
    notifier: Arc<dyn Notifier>,
    status_file: PathBuf,
    check_interval: Duration,
    commands_tx: mpsc::UnboundedSender<SupervisorCommand>,
    commands: mpsc::UnboundedReceiver<SupervisorCommand>,
}

impl Supervisor {
    pub fn new(
        engine: Arc<StrategyEngine>,
        state: Arc<BotState>,
        notifier: Arc<dyn Notifier>,
        config: &HealthConfig,
    ) -> Self {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        Self {
            engine,
            health: HealthMonitor::new(state.clone(), config),
            state,
            notifier,
            status_file: PathBuf::from(&config.status_file),
            check_interval: Duration::from_secs(config.check_interval_secs.max(1)),
            commands_tx,
            commands,
        }
    }

    /// Sender for [`SupervisorCommand`]s, handed to the controller
    pub fn handle(&self) -> mpsc::UnboundedSender<SupervisorCommand> {
        self.commands_tx.clone()
    }

    fn spawn_engine(&self) -> RunningEngine {
        let (shutdown, rx) = watch::channel(false);
        let engine = Arc::clone(&self.engine);
        RunningEngine {
            shutdown,
            handle: tokio::spawn(engine.run(rx)),
        }
    }

    async fn stop_engine(running: RunningEngine) {
        let _ = running.shutdown.send(true);
        let mut handle = running.handle;

        match time::timeout(ENGINE_STOP_GRACE, &mut handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!("Engine stopped with error: {:#}", e),
            Ok(Err(e)) => error!("Engine task failed: {}", e),
            Err(_) => {
                warn!("Engine did not stop within {:?}, aborting", ENGINE_STOP_GRACE);
                handle.abort();
            }
        }
    }

    async fn restart(&self, running: RunningEngine, reason: &str) -> RunningEngine {
        warn!("Restarting engine: {}", reason);
        Self::stop_engine(running).await;
        self.state.record_restart();
        self.state.touch();
        self.notifier.notify(&format!("🔄 Restarted: {}", reason)).await;
        self.spawn_engine()
    }

    fn write_status(&self) {
        if let Err(e) = self.state.write_status_file(&self.status_file) {
            warn!("{:#}", e);
        }
    }

    pub async fn run(mut self) -> Result<ExitReason> {
        info!("Supervisor starting, health check every {:?}", self.check_interval);
        let mut running = self.spawn_engine();
        self.write_status();

        let mut health_tick = time::interval(self.check_interval);
        health_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        health_tick.tick().await;

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let reason = loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SupervisorCommand::Restart) => {
                        running = self.restart(running, "requested").await;
                    }
                    Some(SupervisorCommand::Stop) | None => {
                        info!("Stop requested");
                        break ExitReason::Stopped;
                    }
                },
                _ = health_tick.tick() => {
                    self.write_status();
                    match self.health.check() {
                        HealthVerdict::Healthy => {}
                        HealthVerdict::Stalled => {
                            running = self.restart(running, "no activity").await;
                        }
                        HealthVerdict::MemoryExceeded => {
                            error!("Memory limit exceeded, exiting for a clean restart");
                            self.notifier.notify("⚠️ Memory limit exceeded, restarting process").await;
                            break ExitReason::MemoryExceeded;
                        }
                    }
                }
                signal = &mut ctrl_c => {
                    signal.context("Failed to listen for Ctrl-C")?;
                    info!("Ctrl-C received");
                    break ExitReason::Stopped;
                }
            }
        };

        Self::stop_engine(running).await;
        self.write_status();
        if reason == ExitReason::Stopped {
            self.notifier.notify("🛑 Bot stopped").await;
        }
        info!("Supervisor exiting: {:?}", reason);
        Ok(reason)
    }
}
