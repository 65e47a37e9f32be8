use crate::indicators::{calculate_ema, calculate_prev_ema, smoothed_volatility};
use crate::models::{Candle, SignalSet};
use crate::strategy::SignalGenerator;

/// Configuration for the ActionZone EMA-crossover generator
#[derive(Debug, Clone)]
pub struct ActionZoneConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    /// Rolling window for the volatility estimate
    pub vol_window: usize,
    /// Smoothing factor applied to the rolling stddev series
    pub vol_alpha: f64,
    /// Stop distance = smoothed volatility * this multiplier
    pub stop_multiplier: f64,
}

impl Default for ActionZoneConfig {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            vol_window: 30,
            vol_alpha: 0.96,
            stop_multiplier: 1.2,
        }
    }
}

/// EMA(12)/EMA(26) crossover strategy with a volatility-scaled stop distance
///
/// Long entry fires on the fast EMA crossing above the slow with the close
/// above the fast; exit when the close falls below the slow. Short side is
/// the mirror image.
pub struct ActionZone {
    config: ActionZoneConfig,
}

impl ActionZone {
    pub fn new(config: ActionZoneConfig) -> Self {
        Self { config }
    }
}

impl Default for ActionZone {
    fn default() -> Self {
        Self::new(ActionZoneConfig::default())
    }
}

impl SignalGenerator for ActionZone {
    fn annotate(&self, candles: &[Candle]) -> anyhow::Result<SignalSet> {
        let needed = self.min_candles_required();
        if candles.len() < needed {
            anyhow::bail!(
                "not enough candles for signal: have {}, need {}",
                candles.len(),
                needed
            );
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let close = *closes.last().expect("window is non-empty");

        let fast = calculate_ema(&closes, self.config.fast_period)
            .ok_or_else(|| anyhow::anyhow!("fast EMA unavailable"))?;
        let slow = calculate_ema(&closes, self.config.slow_period)
            .ok_or_else(|| anyhow::anyhow!("slow EMA unavailable"))?;
        let prev_fast = calculate_prev_ema(&closes, self.config.fast_period)
            .ok_or_else(|| anyhow::anyhow!("previous fast EMA unavailable"))?;

        let vol = smoothed_volatility(&closes, self.config.vol_window, self.config.vol_alpha)
            .ok_or_else(|| anyhow::anyhow!("volatility estimate unavailable"))?;

        // Crossover compares the previous fast EMA against the current slow
        // EMA, so the entry fires on the bar where fast overtakes slow
        Ok(SignalSet {
            long_entry: fast > slow && prev_fast < slow && close > fast,
            long_exit: close < slow,
            short_entry: fast < slow && prev_fast > slow && close < fast,
            short_exit: close > slow,
            stop_distance: vol * self.config.stop_multiplier,
        })
    }

    fn name(&self) -> &str {
        "action_zone"
    }

    fn min_candles_required(&self) -> usize {
        (self.config.slow_period + 1).max(self.config.vol_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2022, 3, 31, 10, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: start + Duration::minutes(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 100.0,
            })
            .collect()
    }

    /// Downtrend long enough to push the fast EMA below the slow, then a
    /// rally sized so the fast EMA crosses back above exactly on the last bar
    fn crossover_up_closes() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..40).map(|i| 200.0 - i as f64).collect();
        closes.extend((1..=4).map(|i| 165.0 + 10.0 * i as f64));
        closes
    }

    #[test]
    fn test_insufficient_data_is_error() {
        let generator = ActionZone::default();
        let candles = candles_from_closes(&[100.0; 10]);
        assert!(generator.annotate(&candles).is_err());
    }

    #[test]
    fn test_long_entry_on_upward_crossover() {
        let generator = ActionZone::default();
        let candles = candles_from_closes(&crossover_up_closes());

        let signals = generator.annotate(&candles).unwrap();
        assert!(signals.long_entry);
        assert!(!signals.short_entry);
        assert!(signals.stop_distance > 0.0);
    }

    #[test]
    fn test_short_entry_on_downward_crossover() {
        let generator = ActionZone::default();
        // Mirror image of the upward crossover scenario
        let closes: Vec<f64> = crossover_up_closes().iter().map(|c| 400.0 - c).collect();
        let candles = candles_from_closes(&closes);

        let signals = generator.annotate(&candles).unwrap();
        assert!(signals.short_entry);
        assert!(!signals.long_entry);
    }

    #[test]
    fn test_long_exit_below_slow_ema() {
        let generator = ActionZone::default();
        // Steady uptrend, then a collapse below every average
        let mut closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        closes.push(50.0);
        let candles = candles_from_closes(&closes);

        let signals = generator.annotate(&candles).unwrap();
        assert!(signals.long_exit);
        assert!(!signals.short_exit);
    }

    #[test]
    fn test_quiet_market_no_entries() {
        let generator = ActionZone::default();
        // Dead-flat tape: the EMAs coincide, so no crossover can fire
        let candles = candles_from_closes(&[100.0; 45]);

        let signals = generator.annotate(&candles).unwrap();
        assert!(!signals.long_entry);
        assert!(!signals.short_entry);
    }
}
