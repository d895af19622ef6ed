use log::{info, warn};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::control::supervisor::rss_bytes;
use crate::control::BotState;
use crate::db::Database;
use crate::solana::{parse_pubkey, ConnectionPool, WalletManager};
use crate::utils::{format_duration, format_pubkey, format_sol, lamports_to_sol, short_address};

const HELP: &str = "\
/status - uptime, mode and trade counters
/balance - SOL balance of every wallet
/positions - open positions
/remove <mint> [wallet] - forget a position without trading
/wallets - configured wallets
/pause - stop opening trades
/resume - continue trading
/strategies - list strategies
/strategy <name> <on|off> - toggle a strategy
/restart - restart the trading loops
/stop - shut the bot down
/debug - internal state";

/// A chat command understood by the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Help,
    Status,
    Balance,
    Positions,
    Remove { mint: String, wallet: Option<String> },
    Wallets,
    Pause,
    Resume,
    Stop,
    Restart,
    Debug,
    Strategies,
    Strategy { name: String, enabled: bool },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("not a command")]
    NotACommand,

    #[error("unknown command /{0}, try /help")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

impl ControlCommand {
    /// Parse `/cmd args`, also accepting the `/cmd@botname` form
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let text = text.trim();
        let body = text.strip_prefix('/').ok_or(CommandError::NotACommand)?;

        let mut parts = body.split_whitespace();
        let head = parts.next().ok_or(CommandError::NotACommand)?;
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        let args: Vec<&str> = parts.collect();

        let command = match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "status" => Self::Status,
            "balance" => Self::Balance,
            "positions" => Self::Positions,
            "remove" => {
                const USAGE: &str = "/remove <mint> [wallet]";
                let (mint, wallet) = match args.as_slice() {
                    [mint] => (mint, None),
                    [mint, wallet] => (mint, Some(wallet.to_string())),
                    _ => return Err(CommandError::Usage(USAGE)),
                };
                let mint = parse_pubkey(mint).map_err(|_| CommandError::Usage(USAGE))?;
                Self::Remove {
                    mint: mint.to_string(),
                    wallet,
                }
            }
            "wallets" => Self::Wallets,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "stop" => Self::Stop,
            "restart" => Self::Restart,
            "debug" => Self::Debug,
            "strategies" => Self::Strategies,
            "strategy" => {
                const USAGE: &str = "/strategy <name> <on|off>";
                let (name, toggle) = match args.as_slice() {
                    [name, toggle] => (name, toggle),
                    _ => return Err(CommandError::Usage(USAGE)),
                };
                let enabled = match toggle.to_ascii_lowercase().as_str() {
                    "on" | "enable" | "true" => true,
                    "off" | "disable" | "false" => false,
                    _ => return Err(CommandError::Usage(USAGE)),
                };
                Self::Strategy {
                    name: name.to_ascii_lowercase(),
                    enabled,
                }
            }
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// Lifecycle requests forwarded to the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorCommand {
    Restart,
    Stop,
}

/// Cached balances younger than this are shown by `/wallets` as is
const WALLET_BALANCE_MAX_AGE: Duration = Duration::from_secs(60);

/// Applies control commands to the running bot
pub struct Controller {
    state: Arc<BotState>,
    db: Database,
    wallets: Arc<WalletManager>,
    supervisor: mpsc::UnboundedSender<SupervisorCommand>,
    endpoints: Option<Arc<ConnectionPool>>,
}

impl Controller {
    pub fn new(
        state: Arc<BotState>,
        db: Database,
        wallets: Arc<WalletManager>,
        supervisor: mpsc::UnboundedSender<SupervisorCommand>,
    ) -> Self {
        Self {
            state,
            db,
            wallets,
            supervisor,
            endpoints: None,
        }
    }

    /// Report RPC endpoint health in `/debug`
    pub fn with_endpoints(mut self, pool: Arc<ConnectionPool>) -> Self {
        self.endpoints = Some(pool);
        self
    }

    /// Apply `command` and render a plain-text reply
    pub async fn handle(&self, command: ControlCommand) -> String {
        info!("Control command: {:?}", command);

        match command {
            ControlCommand::Start => format!("Solana swap bot is running.\n\n{}", HELP),
            ControlCommand::Help => HELP.to_string(),
            ControlCommand::Status => self.status(),
            ControlCommand::Balance => self.balance().await,
            ControlCommand::Positions => self.positions().await,
            ControlCommand::Remove { mint, wallet } => self.remove(&mint, wallet.as_deref()).await,
            ControlCommand::Wallets => self.wallets().await,
            ControlCommand::Pause => {
                if self.state.set_paused(true) {
                    "Already paused".to_string()
                } else {
                    "⏸ Trading paused".to_string()
                }
            }
            ControlCommand::Resume => {
                if self.state.set_paused(false) {
                    "▶️ Trading resumed".to_string()
                } else {
                    "Not paused".to_string()
                }
            }
            ControlCommand::Stop => self.forward(SupervisorCommand::Stop, "🛑 Shutting down"),
            ControlCommand::Restart => self.forward(SupervisorCommand::Restart, "🔄 Restarting trading loops"),
            ControlCommand::Debug => self.debug(),
            ControlCommand::Strategies => self.strategies(),
            ControlCommand::Strategy { name, enabled } => {
                if self.state.set_strategy_enabled(&name, enabled) {
                    format!("Strategy {} {}", name, if enabled { "enabled" } else { "disabled" })
                } else {
                    format!("Unknown strategy {}, try /strategies", name)
                }
            }
        }
    }

    fn forward(&self, command: SupervisorCommand, reply: &str) -> String {
        match self.supervisor.send(command) {
            Ok(()) => reply.to_string(),
            Err(_) => {
                warn!("Supervisor is gone, dropping {:?}", command);
                "Supervisor is not running".to_string()
            }
        }
    }

    fn status(&self) -> String {
        let s = self.state.snapshot();
        let mut out = String::new();
        let _ = writeln!(out, "📊 Status");
        let _ = writeln!(out, "Mode: {}", if s.live_mode { "LIVE" } else { "dry-run" });
        let _ = writeln!(out, "State: {}", if s.paused { "paused" } else { "running" });
        let _ = writeln!(out, "Uptime: {}", format_duration(self.state.uptime()));
        let _ = writeln!(out, "Trades: {} ok / {} failed", s.trades_executed, s.trades_failed);
        let _ = writeln!(out, "Realised PnL: {:+.4} SOL", s.realized_pnl_sol);
        let _ = writeln!(out, "Session spend: {}", format_sol(s.session_spent_sol));
        let _ = write!(out, "Last activity: {}", s.last_activity.format("%Y-%m-%d %H:%M:%S UTC"));
        if let Some(error) = s.last_error {
            let _ = write!(out, "\nLast error: {}", error);
        }
        out
    }

    async fn balance(&self) -> String {
        let balances = self.wallets.balances().await;
        if balances.is_empty() {
            return "No wallets configured".to_string();
        }

        let mut out = String::from("💰 Balances");
        for (name, pubkey, balance) in balances {
            let shown = match balance {
                Ok(lamports) => format_sol(lamports_to_sol(lamports)),
                Err(e) => format!("error: {}", e),
            };
            let _ = write!(out, "\n{} ({}): {}", name, format_pubkey(&pubkey), shown);
        }
        out
    }

    async fn positions(&self) -> String {
        let positions = match self.db.positions(None).await {
            Ok(positions) => positions,
            Err(e) => return format!("Could not load positions: {}", e),
        };
        if positions.is_empty() {
            return "No open positions".to_string();
        }

        let mut out = String::from("📈 Positions");
        for p in positions {
            let _ = write!(
                out,
                "\n{} {}: {} units, cost {}",
                p.wallet,
                short_address(&p.mint),
                p.quantity,
                format_sol(lamports_to_sol(p.cost_lamports.max(0) as u64))
            );
        }
        out
    }

    async fn remove(&self, mint: &str, wallet: Option<&str>) -> String {
        match self.db.remove_position(mint, wallet).await {
            Ok(0) => format!("No position in {}", short_address(mint)),
            Ok(removed) => format!("🗑 Removed {} position(s) in {}", removed, short_address(mint)),
            Err(e) => format!("Could not remove position: {}", e),
        }
    }

    async fn wallets(&self) -> String {
        let names = self.wallets.names();
        if names.is_empty() {
            return "No wallets configured".to_string();
        }

        let mut out = String::from("👛 Wallets");
        for name in names {
            let pubkey = match self.wallets.pubkey(&name) {
                Ok(pubkey) => pubkey,
                Err(e) => {
                    let _ = write!(out, "\n{}: {}", name, e);
                    continue;
                }
            };
            match self.wallets.refresh_balance_if_stale(&name, WALLET_BALANCE_MAX_AGE).await {
                Ok(lamports) => {
                    let _ = write!(out, "\n{}: {} ({})", name, pubkey, format_sol(lamports_to_sol(lamports)));
                }
                Err(_) => {
                    let _ = write!(out, "\n{}: {}", name, pubkey);
                }
            }
        }
        out
    }

    fn strategies(&self) -> String {
        let mut out = String::from("Strategies");
        for (name, enabled) in self.state.strategies() {
            let _ = write!(out, "\n{}: {}", name, if enabled { "on" } else { "off" });
        }
        out
    }

    fn debug(&self) -> String {
        let snapshot = self.state.snapshot();
        let mut out = serde_json::to_string_pretty(&snapshot).unwrap_or_else(|e| e.to_string());
        if let Some(rss) = rss_bytes() {
            let _ = write!(out, "\nRSS: {:.1} MB", rss as f64 / (1024.0 * 1024.0));
        }
        let _ = write!(out, "\nIdle: {}s", self.state.idle_for().as_secs());
        if let Some(pool) = &self.endpoints {
            for (url, status) in pool.statuses() {
                let _ = write!(out, "\nRPC {}: {:?}", url, status);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::engine::testing::context;

    #[test]
    fn parses_commands_and_bot_mentions() {
        assert_eq!(ControlCommand::parse("/status"), Ok(ControlCommand::Status));
        assert_eq!(ControlCommand::parse("  /Pause@swap_bot "), Ok(ControlCommand::Pause));
        assert_eq!(
            ControlCommand::parse("/strategy DCA off"),
            Ok(ControlCommand::Strategy {
                name: "dca".into(),
                enabled: false
            })
        );
        assert_eq!(ControlCommand::parse("hello"), Err(CommandError::NotACommand));
        assert_eq!(ControlCommand::parse("/"), Err(CommandError::NotACommand));
        assert_eq!(ControlCommand::parse("/moon"), Err(CommandError::Unknown("moon".into())));
        assert!(matches!(ControlCommand::parse("/strategy dca"), Err(CommandError::Usage(_))));
        assert!(matches!(ControlCommand::parse("/strategy dca maybe"), Err(CommandError::Usage(_))));

        assert_eq!(
            ControlCommand::parse("/remove EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v main"),
            Ok(ControlCommand::Remove {
                mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".into(),
                wallet: Some("main".into())
            })
        );
        assert!(matches!(ControlCommand::parse("/remove"), Err(CommandError::Usage(_))));
        assert!(matches!(ControlCommand::parse("/remove €€€€€"), Err(CommandError::Usage(_))));
    }

    async fn controller() -> (Controller, Arc<BotState>, mpsc::UnboundedReceiver<SupervisorCommand>) {
        let (ctx, _) = context().await;
        let state = Arc::new(BotState::new([("dca", true), ("sniper", true)], false));
        let (tx, rx) = mpsc::unbounded_channel();
        (Controller::new(state.clone(), ctx.db, ctx.wallets, tx), state, rx)
    }

    #[tokio::test]
    async fn pause_resume_and_strategy_toggles() {
        let (controller, state, _rx) = controller().await;

        assert_eq!(controller.handle(ControlCommand::Pause).await, "⏸ Trading paused");
        assert!(state.is_paused());
        assert_eq!(controller.handle(ControlCommand::Pause).await, "Already paused");
        controller.handle(ControlCommand::Resume).await;
        assert!(!state.is_paused());

        let reply = controller
            .handle(ControlCommand::Strategy {
                name: "sniper".into(),
                enabled: false,
            })
            .await;
        assert_eq!(reply, "Strategy sniper disabled");
        assert!(!state.is_strategy_enabled("sniper"));

        let reply = controller
            .handle(ControlCommand::Strategy {
                name: "nope".into(),
                enabled: true,
            })
            .await;
        assert!(reply.starts_with("Unknown strategy"));
    }

    #[tokio::test]
    async fn lifecycle_commands_reach_the_supervisor() {
        let (controller, _, mut rx) = controller().await;

        controller.handle(ControlCommand::Restart).await;
        controller.handle(ControlCommand::Stop).await;
        assert_eq!(rx.recv().await, Some(SupervisorCommand::Restart));
        assert_eq!(rx.recv().await, Some(SupervisorCommand::Stop));

        drop(rx);
        assert_eq!(controller.handle(ControlCommand::Stop).await, "Supervisor is not running");
    }

    #[tokio::test]
    async fn renders_status_wallets_and_positions() {
        let (controller, _, _rx) = controller().await;
        controller
            .db
            .apply_buy("main", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", 5, 50_000_000, "dca")
            .await
            .unwrap();

        assert!(controller.handle(ControlCommand::Status).await.contains("dry-run"));
        assert!(controller.handle(ControlCommand::Wallets).await.contains("(10.0000 SOL)"));
        assert!(controller.handle(ControlCommand::Balance).await.contains("10.0000 SOL"));

        let positions = controller.handle(ControlCommand::Positions).await;
        assert!(positions.contains("EPjF...Dt1v: 5 units, cost 0.0500 SOL"));
    }

    #[tokio::test]
    async fn remove_drops_positions() {
        let (controller, _, _rx) = controller().await;
        let mint = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
        controller.db.apply_buy("main", mint, 5, 50_000_000, "dca").await.unwrap();

        let remove = ControlCommand::Remove {
            mint: mint.into(),
            wallet: Some("main".into()),
        };
        assert_eq!(controller.handle(remove.clone()).await, "🗑 Removed 1 position(s) in EPjF...Dt1v");
        assert_eq!(controller.handle(remove).await, "No position in EPjF...Dt1v");
        assert!(controller.db.positions(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn debug_lists_rpc_endpoints() {
        use crate::solana::{ConnectionPoolConfig, SolanaClient};

        let (controller, _, _rx) = controller().await;
        let pool = Arc::new(ConnectionPool::new(
            ConnectionPoolConfig {
                health_check_interval_secs: 60,
                rpc_urls: vec!["http://primary:8899".into(), "http://backup:8899".into()],
            },
            vec![SolanaClient::new("http://primary:8899"), SolanaClient::new("http://backup:8899")],
        ));
        pool.mark_unhealthy("http://primary:8899");
        let controller = controller.with_endpoints(pool);

        let debug = controller.handle(ControlCommand::Debug).await;
        assert!(debug.contains("RPC http://primary:8899: Reconnecting"), "{}", debug);
        assert!(debug.contains("RPC http://backup:8899: Healthy"), "{}", debug);
    }
}
