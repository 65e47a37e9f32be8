use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candlestick for one timeframe interval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Entry/exit flags plus the volatility stop distance, computed for the
/// latest closed candle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalSet {
    pub long_entry: bool,
    pub long_exit: bool,
    pub short_entry: bool,
    pub short_exit: bool,
    pub stop_distance: f64,
}

/// Directional exposure of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Signed direction: +1 for long, -1 for short. Stop-loss and P&L
    /// formulas are parameterized on this instead of mirrored per side.
    pub fn direction(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Order side that opens a position on this side
    pub fn entry_order(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes a position on this side
    pub fn exit_order(&self) -> OrderSide {
        self.opposite().entry_order()
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Buy/sell direction of a submitted order or executed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// The exchange's authoritative open position. Re-fetched every tick and
/// never mutated locally; `None` from the tracker means flat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    /// Absolute size, always > 0
    pub size: f64,
    pub entry_price: f64,
    pub recent_avg_open_price: f64,
}

/// Realized execution of one submitted order, aggregated over its trades
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub side: OrderSide,
    pub price: f64,
    pub amount: f64,
    pub cost: f64,
}

/// The journal's single "on-trade" row: entry terms of the currently open
/// position. Exists iff a position is open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenTrade {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub side: Side,
    pub price: f64,
    pub amount: f64,
    pub cost: f64,
    pub stop_loss: f64,
    /// Explicitly optional: `None` means no target configured, which is the
    /// normal case for this strategy
    pub take_profit: Option<f64>,
}

/// Append-only history row produced when a position closes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosedTrade {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub side: Side,
    pub price: f64,
    pub amount: f64,
    pub cost: f64,
    pub timestamp_exit: DateTime<Utc>,
    pub price_exit: f64,
    pub amount_exit: f64,
    pub cost_exit: f64,
    pub diff_price: f64,
    pub pnl: f64,
}
