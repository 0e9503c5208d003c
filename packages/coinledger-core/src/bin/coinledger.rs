//! Coinledger CLI - Command line interface for the paper-trading ledger.
//!
//! Every command prints a JSON `ApiResponse` on stdout. Logs go to stderr.

use clap::{Parser, Subcommand};
use coinledger_core::{
    ledger::{ExitPlan, Ledger, Position, Settlement},
    market::MarketSnapshot,
    store::LedgerStore,
    ApiResponse, Error, PositionId, Result,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coinledger")]
#[command(about = "Paper-trading wallet: open, close and track simulated crypto positions")]
#[command(version)]
struct Cli {
    /// Wallet to operate on
    #[arg(short, long, global = true, default_value = "default")]
    wallet: String,
    /// Data directory (defaults to $COINLEDGER_HOME or ~/.coinledger)
    #[arg(long, global = true)]
    home: Option<PathBuf>,
    /// Market snapshot file (defaults to $COINLEDGER_MARKET_FILE or <home>/market.json)
    #[arg(long, global = true)]
    market: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh prices and show wallet figures
    Status,
    /// Run a refresh cycle and report exits and feed failures
    Refresh,
    /// Add funds
    Deposit {
        /// Amount in USD
        amount: Decimal,
    },
    /// Withdraw funds (refused above the available balance)
    Withdraw {
        /// Amount in USD
        amount: Decimal,
    },
    /// Open a position at the last market price
    Open {
        /// Coin symbol or name
        #[arg(short, long)]
        coin: String,
        /// Volume to buy
        #[arg(short, long)]
        volume: Decimal,
        /// Stop-loss price
        #[arg(long)]
        stop_loss: Option<Decimal>,
        /// Take-profit price
        #[arg(long)]
        take_profit: Option<Decimal>,
    },
    /// Close all or part of a position at the current price
    Close {
        /// Position id
        #[arg(short, long)]
        id: u64,
        /// Volume to close (defaults to the whole position)
        #[arg(short, long)]
        volume: Option<Decimal>,
    },
    /// Set or clear a position's stop-loss
    StopLoss {
        /// Position id
        #[arg(short, long)]
        id: u64,
        /// Trigger price; omit to disable
        #[arg(short, long)]
        price: Option<Decimal>,
    },
    /// Set or clear a position's take-profit
    TakeProfit {
        /// Position id
        #[arg(short, long)]
        id: u64,
        /// Trigger price; omit to disable
        #[arg(short, long)]
        price: Option<Decimal>,
    },
    /// List open positions
    Positions,
    /// List settlements
    History,
    /// List stored wallets
    Wallets,
    /// Market snapshot commands
    Market {
        #[command(subcommand)]
        action: MarketAction,
    },
}

#[derive(Subcommand)]
enum MarketAction {
    /// List all coins in the snapshot
    List,
    /// Search coins by symbol or name
    Search {
        query: String,
    },
    /// Record a new last price for a coin
    SetPrice {
        /// Pair symbol, e.g. BTCUSDT
        #[arg(short, long)]
        symbol: String,
        /// Last traded price
        #[arg(short, long)]
        price: Decimal,
    },
}

struct Context {
    wallet: String,
    store: LedgerStore,
    market_path: PathBuf,
}

impl Context {
    fn market(&self) -> Result<MarketSnapshot> {
        MarketSnapshot::load(&self.market_path)
    }

    /// Load the wallet, run `op` on a ledger priced by the market snapshot, save.
    fn with_ledger<T>(
        &self,
        op: impl FnOnce(&mut Ledger<&MarketSnapshot>) -> Result<T>,
    ) -> Result<T> {
        let market = self.market()?;
        let state = self.store.load(&self.wallet)?;
        let mut ledger = Ledger::new(state, &market);

        let result = op(&mut ledger);

        let mut state = ledger.into_state();
        self.store.save(&mut state)?;
        result
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let response = ApiResponse::from(run(cli));
    println!("{}", render(&response));
}

fn render<T: Serialize>(response: &ApiResponse<T>) -> String {
    serde_json::to_string_pretty(response)
        .unwrap_or_else(|e| format!(r#"{{"ok":false,"error":"serialization failed: {e}"}}"#))
}

fn run(cli: Cli) -> Result<Value> {
    let store = cli
        .home
        .map(LedgerStore::with_root)
        .unwrap_or_default();
    let market_path = cli
        .market
        .unwrap_or_else(|| MarketSnapshot::default_path(store.root()));
    let ctx = Context {
        wallet: cli.wallet,
        store,
        market_path,
    };

    match cli.command {
        Commands::Status => ctx.with_ledger(|ledger| {
            let cycle = ledger.refresh_cycle();
            Ok(json!({
                "summary": ledger.summary(),
                "failures": cycle.failures,
            }))
        }),
        Commands::Refresh => ctx.with_ledger(|ledger| {
            let cycle = ledger.refresh_cycle();
            Ok(json!({
                "cycle": cycle,
                "summary": ledger.summary(),
            }))
        }),
        Commands::Deposit { amount } => ctx.with_ledger(|ledger| {
            let transfer = ledger.deposit(amount);
            Ok(json!({
                "transfer": transfer,
                "summary": ledger.summary(),
            }))
        }),
        Commands::Withdraw { amount } => ctx.with_ledger(|ledger| {
            let transfer = ledger.withdraw(amount);
            Ok(json!({
                "transfer": transfer,
                "summary": ledger.summary(),
            }))
        }),
        Commands::Open {
            coin,
            volume,
            stop_loss,
            take_profit,
        } => {
            let market = ctx.market()?;
            let coin = market.resolve(&coin)?.clone();
            let plan = ExitPlan {
                stop_loss,
                take_profit,
            };
            ctx.with_ledger(|ledger| {
                ledger.refresh_cycle();
                let id = ledger.open_with(&coin, volume, plan)?;
                Ok(json!({
                    "position": position_view(ledger.position(id).ok_or(Error::PositionNotFound(id))?),
                    "summary": ledger.summary(),
                }))
            })
        }
        Commands::Close { id, volume } => ctx.with_ledger(|ledger| {
            let id = PositionId(id);
            ledger.refresh_cycle();
            let position = ledger.position(id).ok_or(Error::PositionNotFound(id))?;
            let volume = volume.unwrap_or(position.volume());
            let outcome = ledger.close(id, volume)?;
            Ok(json!({
                "settlement": settlement_view(&outcome.settlement),
                "residual": outcome.residual.and_then(|rid| ledger.position(rid)).map(position_view),
                "summary": ledger.summary(),
            }))
        }),
        Commands::StopLoss { id, price } => ctx.with_ledger(|ledger| {
            let id = PositionId(id);
            ledger.set_stop_loss(id, price)?;
            Ok(json!({
                "position": position_view(ledger.position(id).ok_or(Error::PositionNotFound(id))?),
            }))
        }),
        Commands::TakeProfit { id, price } => ctx.with_ledger(|ledger| {
            let id = PositionId(id);
            ledger.set_take_profit(id, price)?;
            Ok(json!({
                "position": position_view(ledger.position(id).ok_or(Error::PositionNotFound(id))?),
            }))
        }),
        Commands::Positions => {
            let state = ctx.store.load(&ctx.wallet)?;
            let positions: Vec<Value> = state.positions().map(position_view).collect();
            Ok(json!({ "positions": positions }))
        }
        Commands::History => {
            let state = ctx.store.load(&ctx.wallet)?;
            let history: Vec<Value> = state.history().map(settlement_view).collect();
            Ok(json!({
                "history": history,
                "historical_profit_loss": state.historical_profit_loss(),
            }))
        }
        Commands::Wallets => Ok(json!({ "wallets": ctx.store.wallets()? })),
        Commands::Market { action } => handle_market(&ctx, action),
    }
}

fn handle_market(ctx: &Context, action: MarketAction) -> Result<Value> {
    match action {
        MarketAction::List => {
            let market = ctx.market()?;
            let coins: Vec<_> = market.coins().collect();
            Ok(json!({
                "coins": coins,
                "count": market.len(),
            }))
        }
        MarketAction::Search { query } => {
            let market = ctx.market()?;
            let coins = market.search(&query);
            if coins.is_empty() {
                return Err(Error::CoinNotFound(query));
            }
            Ok(json!({ "coins": coins }))
        }
        MarketAction::SetPrice { symbol, price } => {
            let mut market = ctx.market()?;
            let coin = market.set_price(&symbol, price)?.clone();
            market.save(&ctx.market_path)?;
            Ok(json!({ "coin": coin }))
        }
    }
}

fn position_view(position: &Position) -> Value {
    json!({
        "id": position.id(),
        "symbol": position.symbol(),
        "name": position.name(),
        "volume": position.volume(),
        "entry_price": position.entry_price(),
        "current_price": position.current_price(),
        "cost": position.cost(),
        "market_value": position.market_value(),
        "unrealized_profit": position.unrealized_profit(),
        "stop_loss": position.stop_loss(),
        "take_profit": position.take_profit(),
        "opened_at": position.opened_at(),
        "continues_from": position.continues_from(),
    })
}

fn settlement_view(settlement: &Settlement) -> Value {
    json!({
        "position_id": settlement.position_id(),
        "symbol": settlement.symbol(),
        "entry_price": settlement.entry_price(),
        "closed_volume": settlement.closed_volume(),
        "close_price": settlement.close_price(),
        "realized_profit": settlement.realized_profit(),
        "reason": settlement.reason(),
        "closed_at": settlement.closed_at(),
        "residual_id": settlement.residual_id(),
    })
}
