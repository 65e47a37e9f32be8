use crate::api::{with_retry, Exchange, RetryPolicy};
use crate::journal::CsvJournal;
use crate::market::{is_new_bar, MarketSnapshot, SnapshotProvider};
use crate::models::{OpenTrade, Position, Side};
use crate::risk::{position_size, SizeLimits};
use crate::strategy::SignalGenerator;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{FillPolicy, OrderExecutor, PositionTracker};

/// Cross-tick state, passed into and returned from every tick. The only
/// thing the loop remembers between bars.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickState {
    pub last_bar_ts: Option<DateTime<Utc>>,
}

impl TickState {
    pub fn new() -> Self {
        Self::default()
    }

    fn seen(self, ts: DateTime<Utc>) -> Self {
        Self {
            last_bar_ts: Some(ts),
        }
    }
}

/// Static parameters of the trading engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub symbol: String,
    pub timeframe: String,
    pub candle_limit: usize,
    pub risk_fraction: f64,
    /// Take-profit distance as a multiple of the stop distance; `None`
    /// disables the take profit entirely.
    pub take_profit_ratio: Option<f64>,
    pub limits: SizeLimits,
}

/// The position/order lifecycle state machine.
///
/// Each tick combines the market snapshot, the exchange's authoritative
/// position and the journal to decide one of: open, close, reverse, or
/// hold. The machine's state is exactly the exchange position's side; it
/// never tracks a side of its own.
pub struct TradingEngine {
    exchange: Arc<dyn Exchange>,
    snapshots: SnapshotProvider,
    tracker: PositionTracker,
    executor: OrderExecutor,
    journal: CsvJournal,
    retry: RetryPolicy,
    settings: EngineSettings,
}

impl TradingEngine {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        generator: Arc<dyn SignalGenerator>,
        journal: CsvJournal,
        retry: RetryPolicy,
        fill_policy: FillPolicy,
        settings: EngineSettings,
    ) -> Self {
        let snapshots = SnapshotProvider::new(
            exchange.clone(),
            generator,
            retry.clone(),
            settings.symbol.clone(),
            settings.timeframe.clone(),
            settings.candle_limit,
        );
        let tracker = PositionTracker::new(exchange.clone(), retry.clone(), settings.symbol.clone());
        let executor = OrderExecutor::new(
            exchange.clone(),
            retry.clone(),
            fill_policy,
            settings.symbol.clone(),
        );

        Self {
            exchange,
            snapshots,
            tracker,
            executor,
            journal,
            retry,
            settings,
        }
    }

    /// Run one tick of the loop.
    ///
    /// Any dependency that comes back unavailable aborts the tick without
    /// advancing the last-seen bar, so the next tick re-evaluates the same
    /// bar with fresh data. After an action the bar is marked seen even if
    /// part of it failed; the next tick's reconciliation repairs state
    /// instead of re-firing the signal.
    pub async fn run_tick(&self, state: TickState) -> TickState {
        let snapshot = match self.snapshots.fetch().await {
            Some(s) => s,
            None => {
                tracing::warn!("market snapshot unavailable, skipping tick");
                return state;
            }
        };

        let bar_ts = snapshot.latest().timestamp;
        if let Some(prev) = state.last_bar_ts {
            if !is_new_bar(prev, bar_ts) {
                tracing::debug!("same bar ({}), nothing to do", bar_ts);
                return state.seen(bar_ts);
            }
        }

        let position = match self.tracker.current().await {
            Some(p) => p,
            None => {
                tracing::warn!("position unavailable, skipping tick");
                return state;
            }
        };

        tracing::info!(
            "new bar {} close={} signals: le={} lx={} se={} sx={}",
            bar_ts,
            snapshot.latest().close,
            snapshot.signals.long_entry,
            snapshot.signals.long_exit,
            snapshot.signals.short_entry,
            snapshot.signals.short_exit,
        );

        match position {
            None => self.tick_flat(&snapshot).await,
            Some(position) => self.tick_open(&snapshot, position).await,
        }

        state.seen(bar_ts)
    }

    /// Flat: enter on a signal, otherwise make sure no stale journal row
    /// survives an out-of-band close.
    async fn tick_flat(&self, snapshot: &MarketSnapshot) {
        let signals = &snapshot.signals;

        if signals.long_entry {
            self.open_position(Side::Long, snapshot).await;
        } else if signals.short_entry {
            self.open_position(Side::Short, snapshot).await;
        } else {
            tracing::info!("flat, no entry signal");
            self.reconcile(None, snapshot).await;
        }
    }

    /// Holding a position: exit signal, then take profit, then stop loss,
    /// then reversal, in that priority order; otherwise just reconcile.
    async fn tick_open(&self, snapshot: &MarketSnapshot, position: Position) {
        let side = position.side;
        let price = snapshot.latest().close;
        let signals = &snapshot.signals;
        let direction = side.direction();

        // A record missing entry terms, or one for the wrong side, cannot
        // be trusted for TP/SL checks; rebuild it from the exchange before
        // deciding anything.
        let open_record = match self.journal.load_open() {
            Ok(Some(record)) if record.price > 0.0 && record.side == side => Some(record),
            Ok(_) => {
                tracing::info!("journal missing or incomplete, rebuilding from position");
                self.reconcile(Some(&position), snapshot).await
            }
            Err(e) => {
                tracing::warn!("journal unreadable ({}), rebuilding from position", e);
                self.reconcile(Some(&position), snapshot).await
            }
        };

        let exit_signal = match side {
            Side::Long => signals.long_exit,
            Side::Short => signals.short_exit,
        };
        let reversal_signal = match side {
            Side::Long => signals.short_entry,
            Side::Short => signals.long_entry,
        };

        let take_profit_hit = open_record
            .as_ref()
            .and_then(|r| r.take_profit)
            .map(|tp| direction * (price - tp) >= 0.0)
            .unwrap_or(false);
        let stop_loss_hit = open_record
            .as_ref()
            .map(|r| r.stop_loss > 0.0 && direction * (price - r.stop_loss) <= 0.0)
            .unwrap_or(false);

        if exit_signal {
            tracing::info!("{} exit signal at {}", side, price);
            self.close_position(open_record, snapshot).await;
        } else if take_profit_hit {
            tracing::info!("{} take profit hit at {}", side, price);
            self.close_position(open_record, snapshot).await;
        } else if stop_loss_hit {
            tracing::info!("{} stop loss hit at {}", side, price);
            self.close_position(open_record, snapshot).await;
        } else if reversal_signal {
            tracing::info!("{} reversal signal at {}", side, price);
            self.reverse_position(side, open_record, snapshot).await;
        } else {
            tracing::info!("holding {} position", side);
            self.reconcile(Some(&position), snapshot).await;
        }
    }

    /// Size under the risk budget and open; every failure is a skip, never
    /// a crash, and the next tick's reconcile picks up whatever happened.
    async fn open_position(&self, side: Side, snapshot: &MarketSnapshot) {
        let equity = match with_retry(&self.retry, "fetch_balance", || {
            self.exchange.fetch_balance()
        })
        .await
        {
            Some(cash) => cash,
            None => {
                tracing::warn!("balance unavailable, skipping entry");
                return;
            }
        };

        let size = match position_size(
            equity,
            self.settings.risk_fraction,
            snapshot.signals.stop_distance,
            &self.settings.limits,
        ) {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!("sizing failed, skipping entry: {}", e);
                return;
            }
        };

        match self.executor.open(side, size).await {
            Ok(fill) => {
                tracing::info!(
                    "opened {} {} @ {} (cost {})",
                    side,
                    fill.amount,
                    fill.price,
                    fill.cost
                );
            }
            Err(e) => {
                tracing::error!("entry order failed: {}", e);
            }
        }

        // Persist the journal against whatever the exchange now reports,
        // whether or not the fill resolved
        let position = self.tracker.current().await.flatten();
        self.reconcile(position.as_ref(), snapshot).await;
    }

    /// Close, record the realized trade, and reconcile back to flat
    async fn close_position(&self, open_record: Option<OpenTrade>, snapshot: &MarketSnapshot) {
        match self.executor.close().await {
            Ok(Some(fill)) => {
                if let Some(open) = open_record {
                    let closed = CsvJournal::close_trade(&open, &fill);
                    tracing::info!(
                        "closed {} {}: pnl {:.4} (entry {} exit {})",
                        closed.side,
                        closed.amount,
                        closed.pnl,
                        closed.price,
                        closed.price_exit
                    );
                    if let Err(e) = self.journal.append_closed(&closed) {
                        tracing::error!("failed to record closed trade: {}", e);
                    }
                } else {
                    tracing::warn!("closed position but no entry record to join against");
                }
            }
            Ok(None) => {
                tracing::info!("close requested but already flat");
            }
            Err(e) => {
                // The order may or may not have gone through; leave the
                // journal alone and let the next tick reconcile.
                tracing::error!("close failed: {}", e);
                return;
            }
        }

        let position = self.tracker.current().await.flatten();
        self.reconcile(position.as_ref(), snapshot).await;
    }

    /// Close then open the opposite side within one tick. The position is
    /// re-read between the two legs: if the close did not leave us flat,
    /// the opening leg is deferred rather than doubling exposure.
    async fn reverse_position(
        &self,
        side: Side,
        open_record: Option<OpenTrade>,
        snapshot: &MarketSnapshot,
    ) {
        self.close_position(open_record, snapshot).await;

        match self.tracker.current().await {
            Some(None) => {
                self.open_position(side.opposite(), snapshot).await;
            }
            Some(Some(p)) => {
                tracing::warn!(
                    "position still {} {} after close leg, deferring reversal open",
                    p.side,
                    p.size
                );
            }
            None => {
                tracing::warn!("position unavailable after close leg, deferring reversal open");
            }
        }
    }

    /// Rebuild the journal from the exchange position, recovering the
    /// entry time from trade history where possible.
    async fn reconcile(
        &self,
        position: Option<&Position>,
        snapshot: &MarketSnapshot,
    ) -> Option<OpenTrade> {
        let entry_ts = match position {
            Some(p) => self.recover_entry_ts(p.side).await,
            None => None,
        };
        let stop_distance = snapshot.signals.stop_distance;
        let take_profit_distance = self
            .settings
            .take_profit_ratio
            .map(|ratio| ratio * stop_distance);

        match self.journal.reconcile(
            position,
            snapshot.latest(),
            stop_distance,
            take_profit_distance,
            entry_ts,
        ) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!("journal reconcile failed: {}", e);
                None
            }
        }
    }

    /// Earliest own trade on the entry side of the open position; this
    /// recovers the entry time after a restart or an out-of-band open.
    async fn recover_entry_ts(&self, side: Side) -> Option<DateTime<Utc>> {
        let epoch = DateTime::from_timestamp(0, 0)?;
        let trades = with_retry(&self.retry, "fetch_trades_since", || {
            self.exchange.fetch_trades_since(&self.settings.symbol, epoch)
        })
        .await?;

        trades
            .iter()
            .filter(|t| t.side == side.entry_order())
            .map(|t| t.timestamp)
            .min()
    }
}
