// Risk-budget position sizing.

use crate::api::MarketInfo;

/// Bounds applied to every computed order size
#[derive(Debug, Clone)]
pub struct SizeLimits {
    /// Exchange minimum, equal to its size increment
    pub min_size: f64,
    /// Configured position cap, independent of equity
    pub max_size: f64,
    /// Size precision step; computed sizes are rounded down to it
    pub step: f64,
}

impl SizeLimits {
    /// Derive limits from market metadata and the configured cap
    pub fn from_market(market: &MarketInfo, max_size: f64) -> Self {
        Self {
            min_size: market.size_increment,
            max_size,
            step: market.size_increment,
        }
    }
}

/// Convert available equity and a stop distance into an order size:
/// `risk_fraction * equity / stop_distance`, clamped to
/// `[min_size, max_size]` and rounded down to the size step.
///
/// Errors on non-positive equity or stop distance; the caller must skip
/// order placement rather than submit a degenerate size.
pub fn position_size(
    equity: f64,
    risk_fraction: f64,
    stop_distance: f64,
    limits: &SizeLimits,
) -> anyhow::Result<f64> {
    if stop_distance <= 0.0 {
        anyhow::bail!("cannot size order: stop distance {} <= 0", stop_distance);
    }
    if equity <= 0.0 {
        anyhow::bail!("cannot size order: equity {} <= 0", equity);
    }

    let raw = (risk_fraction * equity) / stop_distance;
    let clamped = raw.clamp(limits.min_size, limits.max_size);
    Ok(round_down_to_step(clamped, limits.step).max(limits.min_size))
}

/// Round down to a multiple of `step`; a zero step means no rounding
fn round_down_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    (value / step).floor() * step
}
