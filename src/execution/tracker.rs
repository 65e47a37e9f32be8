use crate::api::{with_retry, Exchange, RetryPolicy};
use crate::models::Position;
use std::sync::Arc;

/// Reads the exchange's authoritative position for the traded symbol.
///
/// Called fresh on every tick and never cached: it is the only way the loop
/// notices positions opened or closed outside its own actions (manual
/// intervention, liquidation).
pub struct PositionTracker {
    exchange: Arc<dyn Exchange>,
    retry: RetryPolicy,
    symbol: String,
}

impl PositionTracker {
    pub fn new(exchange: Arc<dyn Exchange>, retry: RetryPolicy, symbol: String) -> Self {
        Self {
            exchange,
            retry,
            symbol,
        }
    }

    /// Outer `None` means the exchange was unavailable after retries; the
    /// inner `Option` is the position itself, `None` for flat.
    pub async fn current(&self) -> Option<Option<Position>> {
        let position = with_retry(&self.retry, "fetch_position", || {
            self.exchange.fetch_position(&self.symbol)
        })
        .await?;

        match &position {
            Some(p) => tracing::debug!(
                "position: {} {} {} @ avg {}",
                p.symbol,
                p.side,
                p.size,
                p.recent_avg_open_price
            ),
            None => tracing::debug!("position: {} flat", self.symbol),
        }

        Some(position)
    }
}
