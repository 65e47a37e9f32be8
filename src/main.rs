use perpbot::api::exchange::resolution_secs;
use perpbot::api::{prepare_account, Exchange, ExchangeClient, RetryPolicy};
use perpbot::config::BotConfig;
use perpbot::execution::{EngineSettings, FillPolicy, TickState, TradingEngine};
use perpbot::journal::CsvJournal;
use perpbot::risk::SizeLimits;
use perpbot::strategy::{ActionZone, ActionZoneConfig};
use perpbot::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant};

const ONTRADE_PATH: &str = "log_ontrade.csv";
const HISTORY_PATH: &str = "log_history.csv";

/// Instant of the next bar boundary for the timeframe, plus an offset that
/// gives the exchange time to close the candle before we fetch it.
fn next_bar_boundary(timeframe_secs: u64, offset_secs: u64) -> Instant {
    let since_boundary = Utc::now().timestamp().rem_euclid(timeframe_secs as i64) as u64;
    Instant::now() + Duration::from_secs(timeframe_secs - since_boundary + offset_secs)
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "perpbot=info".into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let config = BotConfig::load()?;
    let api_key = std::env::var("FTX_API_KEY")?;
    let api_secret = std::env::var("FTX_API_SECRET")?;
    let subaccount = std::env::var("FTX_SUBACCOUNT").ok();

    let timeframe_secs = resolution_secs(&config.timeframe)?;
    let retry = RetryPolicy::new(
        config.retry_attempts,
        Duration::from_secs(config.retry_delay_secs),
    );

    let exchange: Arc<dyn Exchange> = Arc::new(ExchangeClient::new(
        &config.exchange_url,
        api_key,
        api_secret,
        subaccount,
    ));

    // One-time account setup, before the first tick
    let market = prepare_account(
        exchange.as_ref(),
        &retry,
        &config.symbol,
        config.leverage,
    )
    .await?;
    let limits = SizeLimits::from_market(&market, config.max_position_size);

    tracing::info!("PerpBot starting");
    tracing::info!("  Symbol: {} (last price {})", config.symbol, market.last_price);
    tracing::info!("  Timeframe: {} ({}s)", config.timeframe, timeframe_secs);
    tracing::info!("  Risk fraction: {}", config.risk_fraction);
    tracing::info!("  Leverage: {}x", config.leverage);
    tracing::info!(
        "  Size limits: min {} max {} step {}",
        limits.min_size,
        limits.max_size,
        limits.step
    );

    let generator = Arc::new(ActionZone::new(ActionZoneConfig {
        stop_multiplier: config.stop_multiplier,
        ..ActionZoneConfig::default()
    }));
    let journal = CsvJournal::new(ONTRADE_PATH, HISTORY_PATH);
    let settings = EngineSettings {
        symbol: config.symbol.clone(),
        timeframe: config.timeframe.clone(),
        candle_limit: config.candle_limit,
        risk_fraction: config.risk_fraction,
        take_profit_ratio: config.take_profit_ratio,
        limits,
    };
    let engine = TradingEngine::new(
        exchange,
        generator,
        journal,
        retry,
        FillPolicy::default(),
        settings,
    );

    let start = next_bar_boundary(timeframe_secs, config.tick_offset_secs);
    tracing::info!("First tick in {:?}", start - Instant::now());

    let tick_loop = async {
        let mut ticker = interval_at(start, Duration::from_secs(timeframe_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut state = TickState::new();
        loop {
            ticker.tick().await;
            tracing::info!("Tick at {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
            state = engine.run_tick(state).await;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = tick_loop => {}
    }

    tracing::info!("PerpBot stopped");
    Ok(())
}
