// Durable trade journal: one CSV row for the currently open position and an
// append-only CSV ledger of closed trades. The exchange position is always
// ground truth; `reconcile` rebuilds the journal from it, never the reverse.

use crate::models::{Candle, ClosedTrade, OpenTrade, OrderFill, Position};
use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

pub struct CsvJournal {
    open_path: PathBuf,
    history_path: PathBuf,
}

impl CsvJournal {
    pub fn new(open_path: impl AsRef<Path>, history_path: impl AsRef<Path>) -> Self {
        Self {
            open_path: open_path.as_ref().to_path_buf(),
            history_path: history_path.as_ref().to_path_buf(),
        }
    }

    /// Read the on-trade record; a missing or empty file means flat
    pub fn load_open(&self) -> anyhow::Result<Option<OpenTrade>> {
        if !self.open_path.exists() {
            return Ok(None);
        }
        let mut reader = csv::Reader::from_path(&self.open_path)?;
        match reader.deserialize().next() {
            Some(record) => Ok(Some(record?)),
            None => Ok(None),
        }
    }

    /// Overwrite the on-trade file with a single record
    pub fn save_open(&self, record: &OpenTrade) -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_path(&self.open_path)?;
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }

    /// Clear the on-trade file back to "flat"
    pub fn reset_open(&self) -> anyhow::Result<()> {
        // Truncate to nothing; load_open treats the empty file as flat
        std::fs::write(&self.open_path, b"")?;
        Ok(())
    }

    /// Append a closed trade to the history ledger; rows are never mutated
    pub fn append_closed(&self, record: &ClosedTrade) -> anyhow::Result<()> {
        let write_header = !self.history_path.exists()
            || std::fs::metadata(&self.history_path)?.len() == 0;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_history(&self) -> anyhow::Result<Vec<ClosedTrade>> {
        if !self.history_path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.history_path)?;
        let mut trades = Vec::new();
        for record in reader.deserialize() {
            trades.push(record?);
        }
        Ok(trades)
    }

    /// Rebuild the on-trade record from the exchange's authoritative
    /// position and persist the result.
    ///
    /// - Flat: clears any stale record (covers out-of-band closes) and
    ///   returns `None`.
    /// - Open: stop loss sits `stop_distance` away from the recent average
    ///   open price, on the losing side per the signed direction. The take
    ///   profit, when a distance is given, sits on the winning side;
    ///   otherwise it stays unset.
    ///
    /// `entry_ts` is the entry time recovered from trade history when
    /// available; otherwise the latest closed candle anchors the record.
    /// Idempotent for unchanged inputs.
    pub fn reconcile(
        &self,
        position: Option<&Position>,
        latest: &Candle,
        stop_distance: f64,
        take_profit_distance: Option<f64>,
        entry_ts: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Option<OpenTrade>> {
        let position = match position {
            Some(p) => p,
            None => {
                self.reset_open()?;
                return Ok(None);
            }
        };

        let price = position.recent_avg_open_price;
        let direction = position.side.direction();
        let record = OpenTrade {
            symbol: position.symbol.clone(),
            timestamp: entry_ts.unwrap_or(latest.timestamp),
            side: position.side,
            price,
            amount: position.size,
            cost: position.size * price,
            stop_loss: price - direction * stop_distance,
            take_profit: take_profit_distance.map(|d| price + direction * d),
        };

        self.save_open(&record)?;
        Ok(Some(record))
    }

    /// Join the open record with its closing fill into a history row.
    /// P&L follows the side convention: long profits when exit cost exceeds
    /// entry cost, short is the inverse.
    pub fn close_trade(open: &OpenTrade, fill: &OrderFill) -> ClosedTrade {
        let direction = open.side.direction();
        ClosedTrade {
            symbol: open.symbol.clone(),
            timestamp: open.timestamp,
            side: open.side,
            price: open.price,
            amount: open.amount,
            cost: open.cost,
            timestamp_exit: fill.timestamp,
            price_exit: fill.price,
            amount_exit: fill.amount,
            cost_exit: fill.cost,
            diff_price: direction * (fill.price - open.price),
            pnl: direction * (fill.cost - open.cost),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderSide, Side};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn test_journal(dir: &TempDir) -> CsvJournal {
        CsvJournal::new(
            dir.path().join("log_ontrade.csv"),
            dir.path().join("log_history.csv"),
        )
    }

    fn sample_candle() -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2022, 3, 31, 10, 0, 0).unwrap(),
            open: 45000.0,
            high: 45100.0,
            low: 44900.0,
            close: 45050.0,
            volume: 12.0,
        }
    }

    fn long_position() -> Position {
        Position {
            symbol: "BTC-PERP".to_string(),
            side: Side::Long,
            size: 0.02,
            entry_price: 45000.0,
            recent_avg_open_price: 45010.0,
        }
    }

    fn open_record() -> OpenTrade {
        OpenTrade {
            symbol: "BTC-PERP".to_string(),
            timestamp: Utc.with_ymd_and_hms(2022, 3, 31, 9, 58, 0).unwrap(),
            side: Side::Long,
            price: 45000.0,
            amount: 0.02,
            cost: 900.0,
            stop_loss: 44940.0,
            take_profit: None,
        }
    }

    #[test]
    fn test_load_open_missing_file_is_flat() {
        let dir = TempDir::new().unwrap();
        let journal = test_journal(&dir);
        assert!(journal.load_open().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_open_roundtrip() {
        let dir = TempDir::new().unwrap();
        let journal = test_journal(&dir);

        let record = open_record();
        journal.save_open(&record).unwrap();

        let loaded = journal.load_open().unwrap().unwrap();
        assert_eq!(loaded, record);
        // take_profit survives as "unset", not zero
        assert!(loaded.take_profit.is_none());
    }

    #[test]
    fn test_reset_open_clears_record() {
        let dir = TempDir::new().unwrap();
        let journal = test_journal(&dir);

        journal.save_open(&open_record()).unwrap();
        journal.reset_open().unwrap();
        assert!(journal.load_open().unwrap().is_none());
    }

    #[test]
    fn test_append_closed_accumulates() {
        let dir = TempDir::new().unwrap();
        let journal = test_journal(&dir);

        let fill = OrderFill {
            symbol: "BTC-PERP".to_string(),
            timestamp: Utc.with_ymd_and_hms(2022, 3, 31, 11, 0, 0).unwrap(),
            side: OrderSide::Sell,
            price: 45500.0,
            amount: 0.02,
            cost: 910.0,
        };
        let closed = CsvJournal::close_trade(&open_record(), &fill);

        journal.append_closed(&closed).unwrap();
        journal.append_closed(&closed).unwrap();

        let history = journal.load_history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], closed);
    }

    #[test]
    fn test_reconcile_flat_clears_stale_record() {
        let dir = TempDir::new().unwrap();
        let journal = test_journal(&dir);

        // A record left behind by an out-of-band close
        journal.save_open(&open_record()).unwrap();

        let result = journal
            .reconcile(None, &sample_candle(), 60.0, None, None)
            .unwrap();
        assert!(result.is_none());
        assert!(journal.load_open().unwrap().is_none());
    }

    #[test]
    fn test_reconcile_long_stop_below_entry() {
        let dir = TempDir::new().unwrap();
        let journal = test_journal(&dir);
        let position = long_position();

        let record = journal
            .reconcile(Some(&position), &sample_candle(), 60.0, None, None)
            .unwrap()
            .unwrap();

        assert_eq!(record.side, Side::Long);
        assert_eq!(record.stop_loss, 45010.0 - 60.0);
        assert_eq!(record.amount, position.size);
        assert!(record.take_profit.is_none());
        // Without a recovered entry time, the candle anchors the record
        assert_eq!(record.timestamp, sample_candle().timestamp);
    }

    #[test]
    fn test_reconcile_short_stop_above_entry() {
        let dir = TempDir::new().unwrap();
        let journal = test_journal(&dir);
        let position = Position {
            side: Side::Short,
            ..long_position()
        };

        let record = journal
            .reconcile(Some(&position), &sample_candle(), 60.0, None, None)
            .unwrap()
            .unwrap();

        assert_eq!(record.stop_loss, 45010.0 + 60.0);
    }

    #[test]
    fn test_reconcile_take_profit_on_winning_side() {
        let dir = TempDir::new().unwrap();
        let journal = test_journal(&dir);

        let record = journal
            .reconcile(Some(&long_position()), &sample_candle(), 60.0, Some(120.0), None)
            .unwrap()
            .unwrap();
        assert_eq!(record.take_profit, Some(45010.0 + 120.0));

        let short = Position {
            side: Side::Short,
            ..long_position()
        };
        let record = journal
            .reconcile(Some(&short), &sample_candle(), 60.0, Some(120.0), None)
            .unwrap()
            .unwrap();
        assert_eq!(record.take_profit, Some(45010.0 - 120.0));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let journal = test_journal(&dir);
        let position = long_position();
        let entry_ts = Some(Utc.with_ymd_and_hms(2022, 3, 31, 9, 30, 0).unwrap());

        let first = journal
            .reconcile(Some(&position), &sample_candle(), 60.0, None, entry_ts)
            .unwrap();
        let second = journal
            .reconcile(Some(&position), &sample_candle(), 60.0, None, entry_ts)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(journal.load_open().unwrap(), first);
    }

    #[test]
    fn test_close_trade_pnl_signs() {
        let exit_ts = Utc.with_ymd_and_hms(2022, 3, 31, 11, 0, 0).unwrap();
        let open = open_record();
        let winning_exit = OrderFill {
            symbol: "BTC-PERP".to_string(),
            timestamp: exit_ts,
            side: OrderSide::Sell,
            price: 46000.0,
            amount: 0.02,
            cost: 920.0,
        };

        // Long: exit cost above entry cost is a gain
        let closed = CsvJournal::close_trade(&open, &winning_exit);
        assert_eq!(closed.pnl, 20.0);
        assert_eq!(closed.diff_price, 1000.0);

        // Short with the same costs is the mirror image
        let short_open = OpenTrade {
            side: Side::Short,
            ..open
        };
        let closed = CsvJournal::close_trade(&short_open, &winning_exit);
        assert_eq!(closed.pnl, -20.0);
        assert_eq!(closed.diff_price, -1000.0);
    }
}
