use crate::api::{with_retry, Exchange, OrderAck, RetryPolicy, TradeExecution};
use crate::models::{OrderFill, OrderSide, Side};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Polling policy for resolving a submitted order's fill from trade
/// history. This is a consistency read after a write: the exchange needs a
/// moment before the trades show up.
#[derive(Debug, Clone)]
pub struct FillPolicy {
    pub max_polls: u32,
    pub poll_delay: Duration,
}

impl Default for FillPolicy {
    fn default() -> Self {
        Self {
            max_polls: 20,
            poll_delay: Duration::from_secs(1),
        }
    }
}

/// Places market orders and resolves their realized fills
pub struct OrderExecutor {
    exchange: Arc<dyn Exchange>,
    retry: RetryPolicy,
    fill_policy: FillPolicy,
    symbol: String,
}

impl OrderExecutor {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        retry: RetryPolicy,
        fill_policy: FillPolicy,
        symbol: String,
    ) -> Self {
        Self {
            exchange,
            retry,
            fill_policy,
            symbol,
        }
    }

    /// Open a position on `side` with a market order and resolve its fill
    pub async fn open(&self, side: Side, size: f64) -> anyhow::Result<OrderFill> {
        self.submit_and_resolve(side.entry_order(), size).await
    }

    /// Close whatever position is currently open by submitting the
    /// opposing-side order for its full absolute size.
    ///
    /// Returns `Ok(None)` without touching the exchange order endpoint when
    /// already flat.
    pub async fn close(&self) -> anyhow::Result<Option<OrderFill>> {
        let position = with_retry(&self.retry, "fetch_position", || {
            self.exchange.fetch_position(&self.symbol)
        })
        .await
        .ok_or_else(|| anyhow::anyhow!("position unavailable, cannot close"))?;

        let position = match position {
            Some(p) => p,
            None => {
                tracing::info!("{}: no position to close", self.symbol);
                return Ok(None);
            }
        };

        let fill = self
            .submit_and_resolve(position.side.exit_order(), position.size)
            .await?;
        Ok(Some(fill))
    }

    async fn submit_and_resolve(&self, side: OrderSide, size: f64) -> anyhow::Result<OrderFill> {
        let ack = with_retry(&self.retry, "submit_market_order", || {
            self.exchange.submit_market_order(&self.symbol, side, size)
        })
        .await
        .ok_or_else(|| anyhow::anyhow!("order submission unavailable"))?;

        tracing::info!(
            "{}: submitted {:?} market order for {} (id {})",
            self.symbol,
            side,
            size,
            ack.id
        );

        self.resolve_fill(&ack).await
    }

    /// Poll own trades at or after the order's creation time until at least
    /// one shows up, then aggregate them into a single fill.
    ///
    /// Exhausting the polls is an error, not a silent skip: the caller must
    /// not pretend the journal can be updated with certainty.
    async fn resolve_fill(&self, ack: &OrderAck) -> anyhow::Result<OrderFill> {
        for poll in 1..=self.fill_policy.max_polls {
            let trades = with_retry(&self.retry, "fetch_trades_since", || {
                self.exchange.fetch_trades_since(&self.symbol, ack.created_at)
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("trade history unavailable while resolving fill"))?;

            if !trades.is_empty() {
                return Ok(aggregate_fill(&self.symbol, &trades));
            }

            tracing::debug!(
                "no trades yet for order {} (poll {}/{})",
                ack.id,
                poll,
                self.fill_policy.max_polls
            );
            sleep(self.fill_policy.poll_delay).await;
        }

        anyhow::bail!(
            "order {} submitted but no matching trades after {} polls",
            ack.id,
            self.fill_policy.max_polls
        )
    }
}

/// Sum size and cost across the order's trades; the fill price is the
/// size-weighted average and the timestamp is the last execution.
fn aggregate_fill(symbol: &str, trades: &[TradeExecution]) -> OrderFill {
    let amount: f64 = trades.iter().map(|t| t.size).sum();
    let cost: f64 = trades.iter().map(|t| t.cost()).sum();
    let timestamp = trades
        .iter()
        .map(|t| t.timestamp)
        .max()
        .expect("trades is non-empty");
    let side = trades.last().expect("trades is non-empty").side;

    OrderFill {
        symbol: symbol.to_string(),
        timestamp,
        side,
        price: if amount > 0.0 { cost / amount } else { 0.0 },
        amount,
        cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn trade(minutes: i64, side: OrderSide, price: f64, size: f64) -> TradeExecution {
        TradeExecution {
            symbol: "BTC-PERP".to_string(),
            timestamp: Utc.with_ymd_and_hms(2022, 3, 31, 10, 0, 0).unwrap()
                + ChronoDuration::minutes(minutes),
            side,
            price,
            size,
        }
    }

    #[test]
    fn test_aggregate_single_trade() {
        let fill = aggregate_fill("BTC-PERP", &[trade(0, OrderSide::Buy, 45000.0, 0.02)]);

        assert_eq!(fill.amount, 0.02);
        assert_eq!(fill.price, 45000.0);
        assert_eq!(fill.cost, 900.0);
        assert_eq!(fill.side, OrderSide::Buy);
    }

    #[test]
    fn test_aggregate_partial_fills() {
        let trades = vec![
            trade(0, OrderSide::Buy, 45000.0, 0.01),
            trade(1, OrderSide::Buy, 45100.0, 0.03),
        ];
        let fill = aggregate_fill("BTC-PERP", &trades);

        assert_eq!(fill.amount, 0.04);
        assert_eq!(fill.cost, 450.0 + 1353.0);
        // Size-weighted, so closer to the larger trade's price
        assert!((fill.price - 45075.0).abs() < 1e-9);
        assert_eq!(fill.timestamp, trades[1].timestamp);
    }
}
