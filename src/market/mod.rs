// Market snapshot provider: the closed-candle window plus its signal set.

use crate::api::{with_retry, Exchange, RetryPolicy};
use crate::models::{Candle, SignalSet};
use crate::strategy::SignalGenerator;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Closed candles for the symbol with the signal annotation for the latest
/// one. The in-progress candle is never included.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub candles: Vec<Candle>,
    pub signals: SignalSet,
}

impl MarketSnapshot {
    /// The most recent closed candle, authoritative for decisions
    pub fn latest(&self) -> &Candle {
        self.candles.last().expect("snapshot holds >= 1 candle")
    }
}

/// True iff `current` is a strictly newer bar than `prev`. Equal or older
/// timestamps mean the same bar is being polled again and no action should
/// be taken.
pub fn is_new_bar(prev: DateTime<Utc>, current: DateTime<Utc>) -> bool {
    current > prev
}

/// Fetches the candle window through the retry gateway and annotates it
/// with the signal generator.
pub struct SnapshotProvider {
    exchange: Arc<dyn Exchange>,
    generator: Arc<dyn SignalGenerator>,
    retry: RetryPolicy,
    symbol: String,
    timeframe: String,
    limit: usize,
}

impl SnapshotProvider {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        generator: Arc<dyn SignalGenerator>,
        retry: RetryPolicy,
        symbol: String,
        timeframe: String,
        limit: usize,
    ) -> Self {
        Self {
            exchange,
            generator,
            retry,
            symbol,
            timeframe,
            limit,
        }
    }

    /// Fetch the latest window, dropping the still-forming candle.
    ///
    /// Returns `None` when the exchange is unavailable or the window is too
    /// small to annotate; the caller skips the tick in that case.
    pub async fn fetch(&self) -> Option<MarketSnapshot> {
        let mut candles = with_retry(&self.retry, "fetch_candles", || {
            self.exchange
                .fetch_candles(&self.symbol, &self.timeframe, self.limit)
        })
        .await?;

        // The newest candle is still forming; only closed candles are
        // decision-safe
        candles.pop();

        if candles.is_empty() {
            tracing::warn!("candle window empty after dropping the forming bar");
            return None;
        }

        match self.generator.annotate(&candles) {
            Ok(signals) => Some(MarketSnapshot { candles, signals }),
            Err(e) => {
                tracing::warn!("{} could not annotate window: {}", self.generator.name(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_is_new_bar_strictly_greater() {
        let t1 = Utc.with_ymd_and_hms(2022, 3, 31, 10, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2022, 3, 31, 10, 1, 0).unwrap();

        assert!(is_new_bar(t1, t2));
        assert!(!is_new_bar(t2, t1));
        // Repeated polls of an unchanged bar are idempotent no-ops
        assert!(!is_new_bar(t1, t1));
    }
}
