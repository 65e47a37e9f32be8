// Exchange connectivity: the REST client, the trait seam the engine talks
// through, and the retry gateway every remote call goes through.
pub mod exchange;
pub mod retry;

use crate::models::{Candle, OrderSide, Position};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

pub use exchange::ExchangeClient;
pub use retry::{with_retry, RetryPolicy};

/// Price/size increments and last traded price for a market
#[derive(Debug, Clone)]
pub struct MarketInfo {
    pub symbol: String,
    pub price_increment: f64,
    pub size_increment: f64,
    pub last_price: f64,
}

/// Acknowledgement of a submitted order. The fill is resolved separately by
/// polling trade history from `created_at` onward.
#[derive(Debug, Clone)]
pub struct OrderAck {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// One executed trade belonging to this account
#[derive(Debug, Clone, Deserialize)]
pub struct TradeExecution {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
}

impl TradeExecution {
    pub fn cost(&self) -> f64 {
        self.price * self.size
    }
}

/// Remote exchange capability. The engine only ever sees this trait, so
/// tests can script a double and the binary wires in the REST client.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    /// Authoritative position for the symbol; `None` means flat
    async fn fetch_position(&self, symbol: &str) -> Result<Option<Position>>;

    async fn fetch_market(&self, symbol: &str) -> Result<MarketInfo>;

    /// Available quote-currency cash
    async fn fetch_balance(&self) -> Result<f64>;

    async fn submit_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        size: f64,
    ) -> Result<OrderAck>;

    /// Own trades for the symbol at or after `since`
    async fn fetch_trades_since(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TradeExecution>>;

    async fn set_leverage(&self, leverage: u32) -> Result<()>;
}

/// One-time account setup before the first tick: apply the configured
/// leverage and read the market's increments, both through the retry
/// gateway. A persistently unreachable exchange aborts startup instead of
/// entering the loop with an unknown account state.
pub async fn prepare_account(
    exchange: &dyn Exchange,
    retry: &RetryPolicy,
    symbol: &str,
    leverage: u32,
) -> Result<MarketInfo> {
    with_retry(retry, "set_leverage", || exchange.set_leverage(leverage))
        .await
        .ok_or("could not set leverage, aborting startup")?;

    with_retry(retry, "fetch_market", || exchange.fetch_market(symbol))
        .await
        .ok_or_else(|| format!("could not fetch market metadata for {}, aborting startup", symbol).into())
}
