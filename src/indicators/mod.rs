// Technical indicator primitives used by the signal generator.
// Pure functions over price slices; `None` when there is not enough data.

/// Calculate Simple Moving Average (SMA)
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < period || period == 0 {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate Exponential Moving Average (EMA)
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < period || period == 0 {
        return None;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);

    // Start with SMA over the first window
    let initial_sma = calculate_sma(&prices[0..period], period)?;

    let mut ema = initial_sma;
    for price in &prices[period..] {
        ema = (price - ema) * multiplier + ema;
    }

    Some(ema)
}

/// EMA evaluated one bar earlier, for crossover detection
pub fn calculate_prev_ema(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < period + 1 {
        return None;
    }
    calculate_ema(&prices[..prices.len() - 1], period)
}

/// Rolling population standard deviation over each `window`-sized slice.
/// Returns one value per complete window, aligned to the last bar.
pub fn rolling_stddev(prices: &[f64], window: usize) -> Vec<f64> {
    if prices.len() < window || window == 0 {
        return Vec::new();
    }

    prices
        .windows(window)
        .map(|w| {
            let mean = w.iter().sum::<f64>() / window as f64;
            let variance = w.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / window as f64;
            variance.sqrt()
        })
        .collect()
}

/// Exponentially weighted mean over the rolling stddev series: the
/// volatility estimate the stop distance is derived from.
///
/// Recursive smoothing with the given alpha; returns the final value.
pub fn smoothed_volatility(prices: &[f64], window: usize, alpha: f64) -> Option<f64> {
    let stddevs = rolling_stddev(prices, window);
    let mut iter = stddevs.into_iter();
    let mut smoothed = iter.next()?;

    for value in iter {
        smoothed = alpha * value + (1.0 - alpha) * smoothed;
    }

    Some(smoothed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_over_latest_window() {
        let closes = vec![44800.0, 45000.0, 45200.0, 45400.0];
        assert_eq!(calculate_sma(&closes, 4), Some(45100.0));
        // Shorter periods only see the most recent closes
        assert_eq!(calculate_sma(&closes, 2), Some(45300.0));
        assert!(calculate_sma(&closes, 5).is_none());
    }

    #[test]
    fn test_ema_constant_series_is_flat() {
        let closes = vec![45000.0; 30];
        assert_eq!(calculate_ema(&closes, 12), Some(45000.0));
    }

    #[test]
    fn test_ema_pulled_toward_recent_closes() {
        // Flat tape, then a rally: the EMA ends between the two levels,
        // weighted toward the newer prints
        let mut closes = vec![44000.0; 20];
        closes.extend(std::iter::repeat(46000.0).take(10));

        let ema = calculate_ema(&closes, 12).unwrap();
        assert!(ema > 45000.0);
        assert!(ema < 46000.0);
    }

    #[test]
    fn test_prev_ema_lags_current() {
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let current = calculate_ema(&prices, 12).unwrap();
        let previous = calculate_prev_ema(&prices, 12).unwrap();
        // Monotonically rising prices: today's EMA is above yesterday's
        assert!(current > previous);
    }

    #[test]
    fn test_rolling_stddev_constant_prices() {
        let prices = vec![100.0; 10];
        let stddevs = rolling_stddev(&prices, 5);
        assert_eq!(stddevs.len(), 6);
        assert!(stddevs.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_rolling_stddev_known_window() {
        let prices = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let stddevs = rolling_stddev(&prices, 8);
        assert_eq!(stddevs.len(), 1);
        assert!((stddevs[0] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_smoothed_volatility_positive_on_noisy_data() {
        let prices: Vec<f64> = (0..60)
            .map(|i| 100.0 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let vol = smoothed_volatility(&prices, 30, 0.96).unwrap();
        assert!(vol > 0.0);
    }

    #[test]
    fn test_smoothed_volatility_insufficient_data() {
        let prices = vec![100.0; 10];
        assert!(smoothed_volatility(&prices, 30, 0.96).is_none());
    }
}
