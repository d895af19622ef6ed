use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use solana_swap_bot::config::{self, Config};
#[cfg(feature = "telegram")]
use solana_swap_bot::control::Controller;
use solana_swap_bot::control::{BotState, ExitReason, InstanceLock, Supervisor};
use solana_swap_bot::db::Database;
use solana_swap_bot::execution::{ExecutorConfig, SwapExecutor, SwapOrder, SOL_MINT};
use solana_swap_bot::jupiter::{JupiterClient, QuoteRequest, SwapRouter};
use solana_swap_bot::monitoring::{FanoutNotifier, LogNotifier, Notifier};
use solana_swap_bot::solana::{self as sol, RpcApi, WalletManager};
use solana_swap_bot::strategy::{self, StrategyContext, StrategyEngine, TradeGuards, TradeIntent};
use solana_swap_bot::utils::{format_sol, lamports_to_sol};

#[derive(Parser)]
#[command(name = "swap-bot", version, about = "Solana swap bot on Jupiter")]
struct Cli {
    /// Config file (plain or encrypted JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the strategies under the supervisor (default)
    Run,
    /// Show SOL balance of every configured wallet
    Balance,
    /// Ask Jupiter for a quote. `amount` is in raw units of the input mint
    Quote {
        input: String,
        output: String,
        amount: u64,
        #[arg(long)]
        slippage_bps: Option<u16>,
    },
    /// Swap once, SOL on one side. Dry-run unless live mode is enabled
    Swap {
        input: String,
        output: String,
        amount: u64,
        #[arg(long)]
        wallet: Option<String>,
        #[arg(long)]
        slippage_bps: Option<u16>,
    },
    /// List open positions
    Positions {
        #[arg(long)]
        wallet: Option<String>,
    },
    /// Show recent trades or export the whole log
    Trades {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Import a legacy portfolio.json into the database
    ImportPortfolio { path: PathBuf },
    /// Drop a position without trading, e.g. after tokens were moved by hand
    RemovePosition {
        mint: String,
        /// Only this wallet's position; every wallet when omitted
        #[arg(long)]
        wallet: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_logger();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;
    debug!("Configuration: {:?}", config.redacted());

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Balance => balance(&config).await,
        Command::Quote {
            input,
            output,
            amount,
            slippage_bps,
        } => quote(&config, &input, &output, amount, slippage_bps).await,
        Command::Swap {
            input,
            output,
            amount,
            wallet,
            slippage_bps,
        } => swap(&config, &input, &output, amount, wallet, slippage_bps).await,
        Command::Positions { wallet } => positions(&config, wallet.as_deref()).await,
        Command::Trades { limit, export } => trades(&config, limit, export.as_deref()).await,
        Command::ImportPortfolio { path } => import_portfolio(&config, &path).await,
        Command::RemovePosition { mint, wallet } => remove_position(&config, &mint, wallet.as_deref()).await,
    }
}

fn init_logger() {
    env_logger::init_from_env(env_logger::Env::default().filter_or("RUST_LOG", "info"));
}

/// A mint address; `SOL` is accepted as shorthand for the wrapped SOL mint
fn mint_arg(value: &str) -> Result<String> {
    if value.trim().eq_ignore_ascii_case("sol") {
        return Ok(SOL_MINT.to_string());
    }
    Ok(sol::parse_pubkey(value)?.to_string())
}

struct Services {
    rpc: Arc<dyn RpcApi>,
    pool: Arc<sol::ConnectionPool>,
    wallets: Arc<WalletManager>,
    executor: Arc<SwapExecutor>,
    db: Database,
}

async fn services(config: &Config) -> Result<Services> {
    let pool = sol::create_pool_from_config(config);
    let rpc: Arc<dyn RpcApi> = pool.clone();

    let wallets = Arc::new(WalletManager::from_config(config, Arc::clone(&rpc))?);
    let router: Arc<dyn SwapRouter> = Arc::new(JupiterClient::new(&config.jupiter)?);
    let executor = Arc::new(SwapExecutor::new(
        router,
        Arc::clone(&rpc),
        ExecutorConfig::from_trading(&config.trading),
    ));
    let db = Database::new(&config.storage.database_url).await?;

    Ok(Services {
        rpc,
        pool,
        wallets,
        executor,
        db,
    })
}

async fn run(config: Config) -> Result<()> {
    info!("Starting Solana swap bot...");
    config::confirm_live_mode(&config)?;
    let lock = InstanceLock::acquire(&config.health.pid_file)?;
    info!("Holding instance lock {}", lock.path().display());

    let services = services(&config).await?;
    if services.wallets.is_empty() {
        bail!("No wallets configured, add at least one under \"wallets\"");
    }

    services.rpc.get_health().await.context("Solana RPC is not reachable")?;
    let _health_task = services.pool.start_health_check_task();
    let _balance_task = services.wallets.start_balance_monitoring(60);

    for (name, pubkey, balance) in services.wallets.balances().await {
        match balance {
            Ok(lamports) => info!("Wallet '{}' ({}): {}", name, pubkey, format_sol(lamports_to_sol(lamports))),
            Err(e) => warn!("Wallet '{}' ({}): balance unavailable: {:#}", name, pubkey, e),
        }
    }

    let built = strategy::build_strategies(&config)?;
    let state = Arc::new(BotState::new(
        built.iter().map(|(s, enabled)| (s.name().to_string(), *enabled)),
        config.trading.live_mode,
    ));

    let mut targets: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
    #[cfg(feature = "telegram")]
    let telegram = telegram_bot(&config);
    #[cfg(feature = "telegram")]
    {
        if let Some((bot, admin)) = &telegram {
            targets.push(Arc::new(solana_swap_bot::monitoring::TelegramNotifier::new(bot.clone(), *admin)));
        }
    }
    let notifier: Arc<dyn Notifier> = Arc::new(FanoutNotifier::new(targets));

    let ctx = StrategyContext {
        db: services.db.clone(),
        wallets: Arc::clone(&services.wallets),
        executor: Arc::clone(&services.executor),
    };
    let engine = Arc::new(StrategyEngine::new(
        ctx,
        Arc::clone(&state),
        Arc::clone(&notifier),
        Arc::new(TradeGuards::from_config(&config.trading)),
        built.into_iter().map(|(s, _)| s).collect(),
    ));

    let supervisor = Supervisor::new(engine, Arc::clone(&state), Arc::clone(&notifier), &config.health);

    #[cfg(feature = "telegram")]
    let (shutdown_tx, telegram_task) = {
        let controller = Arc::new(
            Controller::new(
                Arc::clone(&state),
                services.db.clone(),
                Arc::clone(&services.wallets),
                supervisor.handle(),
            )
            .with_endpoints(Arc::clone(&services.pool)),
        );
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let task = telegram.map(|(bot, admin)| {
            tokio::spawn(solana_swap_bot::monitoring::telegram::run_control_bot(
                bot,
                admin,
                controller,
                shutdown_rx,
            ))
        });
        (shutdown_tx, task)
    };

    let mode = if config.trading.live_mode { "LIVE" } else { "dry-run" };
    notifier
        .notify(&format!("🚀 Swap bot started ({}), strategies: {}", mode, strategy_list(&state)))
        .await;

    let reason = supervisor.run().await?;

    #[cfg(feature = "telegram")]
    {
        let _ = shutdown_tx.send(true);
        if let Some(task) = telegram_task {
            if let Err(e) = task.await {
                log::error!("Telegram task failed: {}", e);
            }
        }
    }
    services.db.close().await;

    match reason {
        ExitReason::Stopped => {
            info!("Shutdown complete");
            Ok(())
        }
        ExitReason::MemoryExceeded => {
            drop(lock);
            std::process::exit(2);
        }
    }
}

fn strategy_list(state: &BotState) -> String {
    state
        .strategies()
        .into_iter()
        .map(|(name, on)| format!("{}={}", name, if on { "on" } else { "off" }))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(feature = "telegram")]
fn telegram_bot(config: &Config) -> Option<(teloxide::Bot, solana_swap_bot::monitoring::AdminChat)> {
    if !config.telegram.is_configured() {
        info!("Telegram disabled (no bot token)");
        return None;
    }
    let Some(chat_id) = config.telegram.chat_id else {
        warn!("Telegram bot token set without chat_id, control bot disabled");
        return None;
    };
    Some((
        teloxide::Bot::new(config.telegram.bot_token.trim()),
        solana_swap_bot::monitoring::AdminChat(teloxide::types::ChatId(chat_id)),
    ))
}

async fn balance(config: &Config) -> Result<()> {
    let services = services(config).await?;
    if services.wallets.is_empty() {
        println!("No wallets configured");
    }
    for (name, pubkey, balance) in services.wallets.balances().await {
        match balance {
            Ok(lamports) => println!("{:<12} {}  {}", name, pubkey, format_sol(lamports_to_sol(lamports))),
            Err(e) => println!("{:<12} {}  error: {:#}", name, pubkey, e),
        }
    }
    Ok(())
}

async fn quote(config: &Config, input: &str, output: &str, amount: u64, slippage_bps: Option<u16>) -> Result<()> {
    let client = JupiterClient::new(&config.jupiter)?;
    let request = QuoteRequest {
        input_mint: mint_arg(input)?,
        output_mint: mint_arg(output)?,
        amount,
        slippage_bps: slippage_bps.unwrap_or(config.trading.slippage_bps),
    };

    let quote = client.quote(&request).await?;
    println!("In:            {} {}", quote.in_amount, quote.input_mint);
    println!("Out:           {} {}", quote.out_amount, quote.output_mint);
    println!("Minimum out:   {}", quote.other_amount_threshold);
    println!("Price impact:  {:.4}%", quote.price_impact_pct);
    println!("Route:         {}", quote.route_labels.join(" -> "));
    Ok(())
}

async fn swap(
    config: &Config,
    input: &str,
    output: &str,
    amount: u64,
    wallet: Option<String>,
    slippage_bps: Option<u16>,
) -> Result<()> {
    config::confirm_live_mode(config)?;
    let (input, output) = (mint_arg(input)?, mint_arg(output)?);
    let slippage = slippage_bps.unwrap_or(config.trading.slippage_bps);

    let order = if input == SOL_MINT {
        SwapOrder::buy(output, amount, slippage)
    } else if output == SOL_MINT {
        SwapOrder::sell(input, amount, slippage)
    } else {
        bail!("One side of the swap must be SOL");
    };

    let wallet = match wallet.or_else(|| config.default_wallet_name()) {
        Some(wallet) => wallet,
        None => bail!("No wallet configured"),
    };

    let services = services(config).await?;
    let state = Arc::new(BotState::new([("manual", true)], config.trading.live_mode));
    let engine = StrategyEngine::new(
        StrategyContext {
            db: services.db.clone(),
            wallets: Arc::clone(&services.wallets),
            executor: Arc::clone(&services.executor),
        },
        state,
        Arc::new(LogNotifier),
        Arc::new(TradeGuards::from_config(&config.trading)),
        Vec::new(),
    );

    let intent = TradeIntent {
        strategy: "manual".to_string(),
        wallet,
        reason: format!("Manual {} of {}", order.side, order.mint),
        order,
    };

    let record = engine.execute_intent(intent).await?;
    services.db.close().await;

    match record {
        Some(record) => {
            println!("Status:    {}", record.status.as_str());
            println!("SOL:       {}", format_sol(lamports_to_sol(record.sol_lamports.max(0) as u64)));
            println!("Tokens:    {}", record.token_units);
            if let Some(signature) = &record.signature {
                println!("Signature: {}", signature);
            }
            if let Some(error) = &record.error {
                bail!("Swap failed: {}", error);
            }
            Ok(())
        }
        None => bail!("Swap was blocked by the trading limits"),
    }
}

async fn positions(config: &Config, wallet: Option<&str>) -> Result<()> {
    let db = Database::new(&config.storage.database_url).await?;
    let positions = db.positions(wallet).await?;

    if positions.is_empty() {
        println!("No open positions");
    }
    for p in &positions {
        println!(
            "{:<12} {:<44} {:>16} units  cost {}  avg {:.6} lamports/unit",
            p.wallet,
            p.mint,
            p.quantity,
            format_sol(lamports_to_sol(p.cost_lamports.max(0) as u64)),
            p.avg_price()
        );
    }
    let basis = db.portfolio_cost_basis(wallet).await?;
    println!("Total cost basis: {}", format_sol(lamports_to_sol(basis.max(0) as u64)));

    db.close().await;
    Ok(())
}

async fn trades(config: &Config, limit: u32, export: Option<&Path>) -> Result<()> {
    let db = Database::new(&config.storage.database_url).await?;

    if let Some(path) = export {
        let count = db.export_trades_csv(path).await?;
        println!("Exported {} trades to {}", count, path.display());
    } else {
        for t in db.recent_trades(limit).await? {
            println!(
                "{}  {:<4} {:<8} {:<10} {:<44} {:>14} lamports {:>16} units  {}",
                t.timestamp.format("%Y-%m-%d %H:%M:%S"),
                t.side,
                t.status.as_str(),
                t.source,
                t.mint,
                t.sol_lamports,
                t.token_units,
                t.signature.as_deref().or(t.error.as_deref()).unwrap_or("")
            );
        }
    }

    db.close().await;
    Ok(())
}

async fn import_portfolio(config: &Config, path: &Path) -> Result<()> {
    let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let db = Database::new(&config.storage.database_url).await?;
    let imported = db.import_legacy_portfolio(&json).await?;
    println!("Imported {} positions from {}", imported, path.display());
    db.close().await;
    Ok(())
}

async fn remove_position(config: &Config, mint: &str, wallet: Option<&str>) -> Result<()> {
    let mint = mint_arg(mint)?;
    let db = Database::new(&config.storage.database_url).await?;
    let removed = db.remove_position(&mint, wallet).await?;
    println!("Removed {} position(s) of {}", removed, mint);
    db.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_arguments_are_validated() {
        assert_eq!(mint_arg("sol").unwrap(), SOL_MINT);
        assert_eq!(
            mint_arg(" EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v ").unwrap(),
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"
        );
        assert!(mint_arg("€€€€€").is_err());
        assert!(mint_arg("EPjF").is_err());
    }

    #[test]
    fn remove_position_takes_an_optional_wallet() {
        let cli = Cli::parse_from(["swap-bot", "remove-position", "SOL", "--wallet", "main"]);
        match cli.command {
            Some(Command::RemovePosition { mint, wallet }) => {
                assert_eq!(mint, "SOL");
                assert_eq!(wallet.as_deref(), Some("main"));
            }
            _ => panic!("expected remove-position"),
        }
    }
}
