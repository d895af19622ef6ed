use anyhow::Result;
use futures::future::join_all;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::config::TradingConfig;
use crate::control::BotState;
use crate::models::{TradeRecord, TradeSide, TradeStatus};
use crate::monitoring::Notifier;
use crate::strategy::{Strategy, StrategyContext, TradeIntent};
use crate::utils::{format_sol, lamports_to_sol, short_address, signed_lamports_to_sol, sol_to_lamports};

/// Limits applied to every intent before it reaches the executor.
///
/// Sells are only subject to the block list so exits are never stuck.
/// Budget and cooldown are taken atomically by [`TradeGuards::reserve`], so
/// concurrent strategies cannot both pass against the same headroom.
pub struct TradeGuards {
    allowed_tokens: HashSet<String>,
    blocked_tokens: HashSet<String>,
    cooldown: Duration,
    session_budget_lamports: u64,
    ledger: Mutex<GuardLedger>,
}

#[derive(Default)]
struct GuardLedger {
    spent_lamports: u64,
    reserved_lamports: u64,
    last_buy: HashMap<String, Instant>,
}

impl TradeGuards {
    pub fn from_config(trading: &TradingConfig) -> Self {
        Self {
            allowed_tokens: trading.allowed_tokens.iter().cloned().collect(),
            blocked_tokens: trading.blocked_tokens.iter().cloned().collect(),
            cooldown: Duration::from_secs(trading.trade_cooldown_secs),
            session_budget_lamports: sol_to_lamports(trading.max_session_budget_sol),
            ledger: Mutex::new(GuardLedger::default()),
        }
    }

    /// Check `intent` and hold its budget and cooldown until the returned
    /// reservation is committed or dropped. `Err` carries the skip reason.
    pub fn reserve(&self, intent: &TradeIntent) -> Result<Reservation<'_>, String> {
        let mint = &intent.order.mint;

        if self.blocked_tokens.contains(mint) {
            return Err(format!("{} is blocked", mint));
        }
        if intent.order.side == TradeSide::Sell {
            return Ok(Reservation {
                guards: self,
                mint: mint.clone(),
                lamports: 0,
                cooldown: None,
                settled: false,
            });
        }

        if !self.allowed_tokens.is_empty() && !self.allowed_tokens.contains(mint) {
            return Err(format!("{} is not in the allowed tokens", mint));
        }

        let mut ledger = self.ledger.lock();

        if let Some(last) = ledger.last_buy.get(mint) {
            let elapsed = last.elapsed();
            if elapsed < self.cooldown {
                return Err(format!(
                    "{} bought {}s ago, cooldown is {}s",
                    mint,
                    elapsed.as_secs(),
                    self.cooldown.as_secs()
                ));
            }
        }

        let committed = ledger.spent_lamports.saturating_add(ledger.reserved_lamports);
        if committed.saturating_add(intent.order.amount) > self.session_budget_lamports {
            return Err(format!(
                "session budget of {} would be exceeded ({} spent or in flight)",
                format_sol(lamports_to_sol(self.session_budget_lamports)),
                format_sol(lamports_to_sol(committed))
            ));
        }

        ledger.reserved_lamports = ledger.reserved_lamports.saturating_add(intent.order.amount);
        let previous = ledger.last_buy.insert(mint.clone(), Instant::now());

        Ok(Reservation {
            guards: self,
            mint: mint.clone(),
            lamports: intent.order.amount,
            cooldown: Some(previous),
            settled: false,
        })
    }

    /// Lamports committed by settled buys this session
    pub fn session_spent_lamports(&self) -> u64 {
        self.ledger.lock().spent_lamports
    }
}

/// Budget and cooldown held for one intent while it executes.
///
/// Dropping it without [`Reservation::commit`] gives both back.
pub struct Reservation<'a> {
    guards: &'a TradeGuards,
    mint: String,
    lamports: u64,
    /// Cooldown entry replaced by this buy; `None` for sells
    cooldown: Option<Option<Instant>>,
    settled: bool,
}

impl std::fmt::Debug for Reservation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("mint", &self.mint)
            .field("lamports", &self.lamports)
            .field("cooldown", &self.cooldown)
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}

impl Reservation<'_> {
    /// Book `spent_lamports` against the budget and keep the cooldown
    pub fn commit(mut self, spent_lamports: u64) {
        let mut ledger = self.guards.ledger.lock();
        ledger.reserved_lamports = ledger.reserved_lamports.saturating_sub(self.lamports);
        ledger.spent_lamports = ledger.spent_lamports.saturating_add(spent_lamports);
        self.settled = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut ledger = self.guards.ledger.lock();
        ledger.reserved_lamports = ledger.reserved_lamports.saturating_sub(self.lamports);
        match self.cooldown.take() {
            Some(Some(previous)) => {
                ledger.last_buy.insert(self.mint.clone(), previous);
            }
            Some(None) => {
                ledger.last_buy.remove(&self.mint);
            }
            None => {}
        }
    }
}

/// Runs every strategy on its own interval and turns intents into trades
pub struct StrategyEngine {
    ctx: StrategyContext,
    state: Arc<BotState>,
    notifier: Arc<dyn Notifier>,
    guards: Arc<TradeGuards>,
    strategies: Vec<Arc<dyn Strategy>>,
}

impl StrategyEngine {
    pub fn new(
        ctx: StrategyContext,
        state: Arc<BotState>,
        notifier: Arc<dyn Notifier>,
        guards: Arc<TradeGuards>,
        strategies: Vec<Arc<dyn Strategy>>,
    ) -> Self {
        Self {
            ctx,
            state,
            notifier,
            guards,
            strategies,
        }
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name().to_string()).collect()
    }

    /// Run until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("Strategy engine starting: {}", self.strategy_names().join(", "));

        let tasks = self.strategies.iter().map(|strategy| {
            let engine = Arc::clone(&self);
            let strategy = Arc::clone(strategy);
            let mut shutdown = shutdown.clone();

            tokio::spawn(async move {
                let mut interval = time::interval(strategy.interval());
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            engine.tick(strategy.as_ref()).await;
                        }
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
                info!("Strategy {} stopped", strategy.name());
            })
        });

        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!("Strategy task panicked: {}", e);
            }
        }

        info!("Strategy engine stopped");
        Ok(())
    }

    /// One evaluation of one strategy. Returns the trades attempted.
    pub async fn tick(&self, strategy: &dyn Strategy) -> Vec<TradeRecord> {
        self.state.touch();

        if self.state.is_paused() || !self.state.is_strategy_enabled(strategy.name()) {
            return Vec::new();
        }

        let intents = match strategy.evaluate(&self.ctx).await {
            Ok(intents) => intents,
            Err(e) => {
                warn!("Strategy {} failed to evaluate: {:#}", strategy.name(), e);
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        for intent in intents {
            if self.state.is_paused() {
                break;
            }
            match self.execute_intent(intent).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => error!("Trade bookkeeping failed: {:#}", e),
            }
        }
        records
    }

    /// Guard, execute, and book one intent. `None` when a guard skipped it.
    pub async fn execute_intent(&self, intent: TradeIntent) -> Result<Option<TradeRecord>> {
        let reservation = match self.guards.reserve(&intent) {
            Ok(reservation) => reservation,
            Err(reason) => {
                info!("Skipping {} {}: {}", intent.order.side, intent.order.mint, reason);
                return Ok(None);
            }
        };

        let wallet = self.ctx.wallets.wallet(&intent.wallet)?;
        let order = &intent.order;
        let mut record = TradeRecord::new(&intent.wallet, &order.mint, order.side, &intent.strategy);
        let live_buy = order.side == TradeSide::Buy && self.ctx.executor.is_live();

        if live_buy && !self.ctx.wallets.has_sufficient_balance(&intent.wallet, order.amount).await? {
            let message = format!(
                "Insufficient balance in wallet {} for {}",
                intent.wallet,
                format_sol(lamports_to_sol(order.amount))
            );
            warn!("{}", message);
            drop(reservation);
            record.sol_lamports = order.amount as i64;
            record.error = Some(message.clone());
            self.state.record_failure(message.clone());
            self.notifier.notify(&format!("⚠️ {}", message)).await;
            self.ctx.db.record_trade(&record).await?;
            return Ok(Some(record));
        }

        let held_before = if live_buy {
            self.token_balance(&intent.wallet, &order.mint).await
        } else {
            None
        };

        info!("{}", intent.reason);
        match self.ctx.executor.execute(&wallet, order).await {
            Ok(outcome) => {
                record.sol_lamports = outcome.sol_lamports() as i64;
                record.token_units = outcome.token_units() as i64;
                record.signature = outcome.signature.map(|s| s.to_string());

                if outcome.dry_run {
                    record.status = TradeStatus::DryRun;
                } else {
                    record.status = TradeStatus::Confirmed;
                    if live_buy {
                        let held_after = self.token_balance(&intent.wallet, &order.mint).await;
                        if let Some(received) = received_units(held_before, held_after) {
                            record.token_units = received as i64;
                        }
                    }
                    record.realized_pnl_lamports = self.book(&record).await;
                }

                let spent = match order.side {
                    TradeSide::Buy => outcome.sol_lamports(),
                    TradeSide::Sell => 0,
                };
                reservation.commit(spent);
                self.state.record_trade(spent, record.realized_pnl_lamports);
                self.notifier.notify(&trade_message(&intent, &record)).await;
            }
            Err(e) => {
                drop(reservation);
                error!("{} {} failed: {}", order.side, order.mint, e);
                record.status = TradeStatus::Failed;
                record.error = Some(format!("{}: {}", e.kind(), e));
                self.state.record_failure(e.to_string());
                self.notifier
                    .notify(&format!(
                        "❌ {} {} failed: {}",
                        order.side,
                        short_address(&order.mint),
                        e
                    ))
                    .await;
            }
        }

        self.ctx.db.record_trade(&record).await?;
        Ok(Some(record))
    }

    async fn token_balance(&self, wallet: &str, mint: &str) -> Option<u64> {
        match self.ctx.wallets.token_balance(wallet, mint).await {
            Ok(units) => Some(units),
            Err(e) => {
                warn!("Could not read {} balance of wallet {}: {:#}", short_address(mint), wallet, e);
                None
            }
        }
    }

    /// Apply a confirmed trade to the portfolio; returns realised PnL for sells
    async fn book(&self, record: &TradeRecord) -> Option<i64> {
        let units = record.token_units.max(0) as u64;
        let lamports = record.sol_lamports.max(0) as u64;

        let result = match record.side {
            TradeSide::Buy => self
                .ctx
                .db
                .apply_buy(&record.wallet, &record.mint, units, lamports, &record.source)
                .await
                .map(|_| None),
            TradeSide::Sell => self
                .ctx
                .db
                .apply_sell(&record.wallet, &record.mint, units, lamports)
                .await
                .map(Some),
        };

        match result {
            Ok(pnl) => pnl,
            Err(e) => {
                error!("Trade {:?} landed but the portfolio update failed: {:#}", record.signature, e);
                None
            }
        }
    }
}

/// Units a buy actually delivered, from the token balance around it
fn received_units(before: Option<u64>, after: Option<u64>) -> Option<u64> {
    match (before, after) {
        (Some(before), Some(after)) if after > before => Some(after - before),
        _ => None,
    }
}

fn trade_message(intent: &TradeIntent, record: &TradeRecord) -> String {
    let prefix = match record.status {
        TradeStatus::DryRun => "🧪 [dry-run]",
        _ => "✅",
    };
    let mut message = format!(
        "{} {} {} units of {} for {} ({})",
        prefix,
        record.side,
        record.token_units,
        short_address(&record.mint),
        format_sol(lamports_to_sol(record.sol_lamports.max(0) as u64)),
        intent.reason
    );
    if let Some(pnl) = record.realized_pnl_lamports {
        message.push_str(&format!(", PnL {:+.6} SOL", signed_lamports_to_sol(pnl)));
    }
    if let Some(signature) = &record.signature {
        message.push_str(&format!("\nhttps://solscan.io/tx/{}", signature));
    }
    message
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::db::init_test_db;
    use crate::error::SwapError;
    use crate::execution::{ExecutorConfig, SwapExecutor};
    use crate::jupiter::{QuoteRequest, QuoteResponse, SwapResponse, SwapRouter};
    use crate::solana::{RpcApi, SignatureState, Wallet, WalletManager};
    use async_trait::async_trait;
    use serde_json::json;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Signature;
    use solana_sdk::transaction::VersionedTransaction;

    /// Quotes `amount * rate` out, with a configurable price impact and latency
    pub struct StubRouter {
        rate: Mutex<f64>,
        impact_fraction: Mutex<f64>,
        delay: Mutex<Duration>,
    }

    impl StubRouter {
        pub fn set_rate(&self, rate: f64) {
            *self.rate.lock() = rate;
        }

        pub fn set_impact(&self, fraction: f64) {
            *self.impact_fraction.lock() = fraction;
        }

        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock() = delay;
        }
    }

    #[async_trait]
    impl SwapRouter for StubRouter {
        async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, SwapError> {
            let delay = *self.delay.lock();
            if !delay.is_zero() {
                time::sleep(delay).await;
            }
            let out = (request.amount as f64 * *self.rate.lock()) as u64;
            QuoteResponse::from_value(json!({
                "inputMint": request.input_mint,
                "outputMint": request.output_mint,
                "inAmount": request.amount.to_string(),
                "outAmount": out.to_string(),
                "priceImpactPct": self.impact_fraction.lock().to_string(),
                "routePlan": []
            }))
        }

        async fn swap_transaction(&self, _quote: &QuoteResponse, _user: &Pubkey) -> Result<SwapResponse, SwapError> {
            Err(SwapError::SwapBuild("stub router only quotes".into()))
        }
    }

    pub struct StubRpc;

    #[async_trait]
    impl RpcApi for StubRpc {
        async fn get_balance(&self, _pubkey: &Pubkey) -> Result<u64> {
            Ok(10_000_000_000)
        }
        async fn get_health(&self) -> Result<()> {
            Ok(())
        }
        async fn get_block_height(&self) -> Result<u64> {
            Ok(0)
        }
        async fn send_transaction(&self, _tx: &VersionedTransaction) -> Result<Signature, SwapError> {
            Err(SwapError::Rpc("stub".into()))
        }
        async fn get_signature_status(&self, _sig: &Signature) -> Result<SignatureState> {
            Ok(SignatureState::Pending)
        }
        async fn get_token_balance(&self, _owner: &Pubkey, _mint: &Pubkey) -> Result<u64> {
            Ok(0)
        }
    }

    /// Dry-run context with one wallet named "main"
    pub async fn context() -> (StrategyContext, Arc<StubRouter>) {
        let router = Arc::new(StubRouter {
            rate: Mutex::new(1.0),
            impact_fraction: Mutex::new(0.0),
            delay: Mutex::new(Duration::ZERO),
        });
        let rpc: Arc<dyn RpcApi> = Arc::new(StubRpc);
        let executor = SwapExecutor::new(
            router.clone(),
            Arc::clone(&rpc),
            ExecutorConfig {
                live: false,
                max_price_impact_pct: 5.0,
                max_attempts: 1,
                confirm_poll: Duration::from_millis(1),
                confirm_timeout: Duration::from_millis(10),
                retry_backoff: Duration::from_millis(1),
            },
        );

        let ctx = StrategyContext {
            db: init_test_db().await.unwrap(),
            wallets: Arc::new(WalletManager::new(vec![Wallet::new("main")], rpc)),
            executor: Arc::new(executor),
        };
        (ctx, router)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::context;
    use super::*;
    use crate::execution::SwapOrder;
    use crate::monitoring::notifier::testing::RecordingNotifier;
    use async_trait::async_trait;

    const MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    const OTHER: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";

    struct FixedIntents {
        name: &'static str,
        intents: Vec<TradeIntent>,
    }

    #[async_trait]
    impl Strategy for FixedIntents {
        fn name(&self) -> &str {
            self.name
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(5)
        }

        async fn evaluate(&self, _ctx: &StrategyContext) -> Result<Vec<TradeIntent>> {
            Ok(self.intents.clone())
        }
    }

    fn buy(mint: &str, lamports: u64) -> TradeIntent {
        TradeIntent {
            strategy: "test".into(),
            wallet: "main".into(),
            order: SwapOrder::buy(mint, lamports, 100),
            reason: format!("test buy of {}", mint),
        }
    }

    fn trading() -> TradingConfig {
        TradingConfig {
            trade_cooldown_secs: 60,
            max_session_budget_sol: 0.05,
            blocked_tokens: vec!["Blocked".into()],
            ..TradingConfig::default()
        }
    }

    async fn engine(trading: &TradingConfig) -> (StrategyEngine, Arc<BotState>, Arc<RecordingNotifier>) {
        let (ctx, _) = context().await;
        let state = Arc::new(BotState::new([("test", true), ("off", false)], false));
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = StrategyEngine::new(
            ctx,
            state.clone(),
            notifier.clone(),
            Arc::new(TradeGuards::from_config(trading)),
            Vec::new(),
        );
        (engine, state, notifier)
    }

    #[test]
    fn guards_enforce_lists_cooldown_and_budget() {
        let guards = TradeGuards::from_config(&trading());

        let first = guards.reserve(&buy(MINT, 10_000_000)).unwrap();
        assert!(guards.reserve(&buy("Blocked", 1)).is_err());
        // 10M in flight + 45M is over the 50M budget
        assert!(guards.reserve(&buy(OTHER, 45_000_000)).unwrap_err().contains("budget"));
        assert!(guards.reserve(&buy(MINT, 1)).unwrap_err().contains("cooldown"));

        first.commit(10_000_000);
        assert_eq!(guards.session_spent_lamports(), 10_000_000);
        assert!(guards.reserve(&buy(MINT, 1)).unwrap_err().contains("cooldown"));

        let mut sell = buy(MINT, 1);
        sell.order = SwapOrder::sell(MINT, 10_000_000_000, 100);
        assert!(guards.reserve(&sell).is_ok());

        let allow_list = TradeGuards::from_config(&TradingConfig {
            allowed_tokens: vec!["Only".into()],
            ..TradingConfig::default()
        });
        assert!(allow_list.reserve(&buy("Only", 1)).is_ok());
        assert!(allow_list.reserve(&buy(MINT, 1)).is_err());
    }

    #[test]
    fn dropped_reservations_give_back_budget_and_cooldown() {
        let guards = TradeGuards::from_config(&trading());

        let held = guards.reserve(&buy(MINT, 40_000_000)).unwrap();
        assert!(guards.reserve(&buy(OTHER, 20_000_000)).is_err());
        drop(held);

        assert!(guards.reserve(&buy(OTHER, 20_000_000)).is_ok());
        assert!(guards.reserve(&buy(MINT, 40_000_000)).is_ok());
        assert_eq!(guards.session_spent_lamports(), 0);
    }

    #[test]
    fn received_units_come_from_the_balance_change() {
        assert_eq!(received_units(Some(100), Some(1_600)), Some(1_500));
        assert_eq!(received_units(Some(100), Some(100)), None);
        assert_eq!(received_units(None, Some(1_600)), None);
        assert_eq!(received_units(Some(100), None), None);
    }

    #[tokio::test]
    async fn concurrent_buys_share_one_budget() {
        let (ctx, router) = context().await;
        router.set_delay(Duration::from_millis(30));
        let state = Arc::new(BotState::new([("test", true)], false));
        let engine = StrategyEngine::new(
            ctx,
            state.clone(),
            Arc::new(RecordingNotifier::default()),
            Arc::new(TradeGuards::from_config(&trading())),
            Vec::new(),
        );

        let (a, b) = tokio::join!(
            engine.execute_intent(buy(MINT, 30_000_000)),
            engine.execute_intent(buy(OTHER, 30_000_000))
        );
        let traded: Vec<TradeRecord> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();
        assert_eq!(traded.len(), 1);
        assert_eq!(engine.guards.session_spent_lamports(), 30_000_000);
        assert!((state.snapshot().session_spent_sol - 0.03).abs() < 1e-12);

        // Same mint twice at once: the second hits the cooldown
        let (a, b) = tokio::join!(
            engine.execute_intent(buy("Third", 1_000_000)),
            engine.execute_intent(buy("Third", 1_000_000))
        );
        assert_eq!([a.unwrap(), b.unwrap()].iter().flatten().count(), 1);
    }

    #[tokio::test]
    async fn dry_run_trades_are_logged_but_not_booked() {
        let (engine, state, notifier) = engine(&trading()).await;
        let strategy = FixedIntents {
            name: "test",
            intents: vec![buy(MINT, 10_000_000), buy("Blocked", 10_000_000)],
        };

        let records = engine.tick(&strategy).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, TradeStatus::DryRun);
        assert_eq!(records[0].sol_lamports, 10_000_000);

        assert!(engine.ctx.db.positions(None).await.unwrap().is_empty());
        assert_eq!(engine.ctx.db.recent_trades(10).await.unwrap().len(), 1);
        assert_eq!(state.snapshot().trades_executed, 1);
        assert_eq!(engine.guards.session_spent_lamports(), 10_000_000);
        assert!((state.snapshot().session_spent_sol - 0.01).abs() < 1e-12);
        assert!(notifier.messages.lock()[0].contains("[dry-run]"));

        // Same mint again is inside the cooldown
        assert!(engine.tick(&strategy).await.is_empty());
    }

    #[tokio::test]
    async fn paused_or_disabled_strategies_do_nothing() {
        let (engine, state, _) = engine(&trading()).await;

        let disabled = FixedIntents {
            name: "off",
            intents: vec![buy(MINT, 1)],
        };
        assert!(engine.tick(&disabled).await.is_empty());

        state.set_paused(true);
        let enabled = FixedIntents {
            name: "test",
            intents: vec![buy(MINT, 1)],
        };
        assert!(engine.tick(&enabled).await.is_empty());
        assert!(engine.ctx.db.recent_trades(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_swaps_are_recorded_with_their_kind() {
        let (ctx, router) = context().await;
        router.set_impact(0.5);
        let state = Arc::new(BotState::new([("test", true)], false));
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = StrategyEngine::new(
            ctx,
            state.clone(),
            notifier.clone(),
            Arc::new(TradeGuards::from_config(&trading())),
            Vec::new(),
        );

        let record = engine.execute_intent(buy(MINT, 1_000)).await.unwrap().unwrap();
        assert_eq!(record.status, TradeStatus::Failed);
        assert!(record.error.unwrap().starts_with("price_impact"));
        assert_eq!(state.snapshot().trades_failed, 1);
        assert!(notifier.messages.lock()[0].starts_with("❌"));

        // The failure gave back its budget and cooldown
        assert_eq!(engine.guards.session_spent_lamports(), 0);
        router.set_impact(0.0);
        let retry = engine.execute_intent(buy(MINT, 1_000)).await.unwrap().unwrap();
        assert_eq!(retry.status, TradeStatus::DryRun);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (ctx, _) = context().await;
        let state = Arc::new(BotState::new([("test", true)], false));
        let strategy: Arc<dyn Strategy> = Arc::new(FixedIntents {
            name: "test",
            intents: Vec::new(),
        });
        let engine = Arc::new(StrategyEngine::new(
            ctx,
            state,
            Arc::new(RecordingNotifier::default()),
            Arc::new(TradeGuards::from_config(&trading())),
            vec![strategy],
        ));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(engine.run(rx));
        time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let result = time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
