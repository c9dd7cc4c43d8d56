//! Bounded ring buffers over the raw event stream plus the cumulative
//! scalars and ATR series derived from them.

use std::collections::VecDeque;

use crate::models::{Candle, OrderBook, Trade};

const TRADES_MAXLEN: usize = 10_000;
const BOOKS_MAXLEN: usize = 1_000;
const PRICES_MAXLEN: usize = 5_000;
const VOLUMES_MAXLEN: usize = 5_000;
const ATR_SERIES_MAXLEN: usize = 100;
const SPREADS_MAXLEN: usize = 1_000;

fn push_bounded<T>(buf: &mut VecDeque<T>, item: T, maxlen: usize) {
    buf.push_back(item);
    while buf.len() > maxlen {
        buf.pop_front();
    }
}

/// Owns every time-ordered series the metric calculators read from.
/// Mutated exclusively through `add_trade`/`add_book`/`add_candle`.
pub struct RollingState {
    pub trades: VecDeque<Trade>,
    pub order_books: VecDeque<OrderBook>,
    pub prices: VecDeque<f64>,
    pub volumes: VecDeque<f64>,

    pub cumulative_delta: f64,
    pub total_buy_volume: f64,
    pub total_sell_volume: f64,

    atr_period: usize,
    high_prices: VecDeque<f64>,
    low_prices: VecDeque<f64>,
    close_prices: VecDeque<f64>,
    atr_values: VecDeque<f64>,

    pub spreads: VecDeque<f64>,
    pub median_spread: f64,
    pub median_atr: f64,
}

impl RollingState {
    pub fn new(atr_period: usize) -> Self {
        Self {
            trades: VecDeque::new(),
            order_books: VecDeque::new(),
            prices: VecDeque::new(),
            volumes: VecDeque::new(),
            cumulative_delta: 0.0,
            total_buy_volume: 0.0,
            total_sell_volume: 0.0,
            atr_period,
            high_prices: VecDeque::new(),
            low_prices: VecDeque::new(),
            close_prices: VecDeque::new(),
            atr_values: VecDeque::new(),
            spreads: VecDeque::new(),
            median_spread: 0.0,
            median_atr: 0.0,
        }
    }

    pub fn add_trade(&mut self, trade: Trade) {
        push_bounded(&mut self.prices, trade.price, PRICES_MAXLEN);
        push_bounded(&mut self.volumes, trade.quantity, VOLUMES_MAXLEN);

        if trade.is_buyer_maker {
            self.cumulative_delta -= trade.quantity;
            self.total_sell_volume += trade.quantity;
        } else {
            self.cumulative_delta += trade.quantity;
            self.total_buy_volume += trade.quantity;
        }

        push_bounded(&mut self.trades, trade, TRADES_MAXLEN);
    }

    pub fn add_book(&mut self, book: OrderBook) {
        push_bounded(&mut self.spreads, book.spread, SPREADS_MAXLEN);
        if self.spreads.len() > 10 {
            self.median_spread = median(self.spreads.iter().copied());
        }
        push_bounded(&mut self.order_books, book, BOOKS_MAXLEN);
    }

    pub fn add_candle(&mut self, candle: Candle) {
        push_bounded(&mut self.high_prices, candle.high, ATR_SERIES_MAXLEN);
        push_bounded(&mut self.low_prices, candle.low, ATR_SERIES_MAXLEN);
        push_bounded(&mut self.close_prices, candle.close, ATR_SERIES_MAXLEN);
        self.recompute_atr();
    }

    fn recompute_atr(&mut self) {
        if self.high_prices.len() < 2 {
            return;
        }
        let high: Vec<f64> = self.high_prices.iter().copied().collect();
        let low: Vec<f64> = self.low_prices.iter().copied().collect();
        let close: Vec<f64> = self.close_prices.iter().copied().collect();

        let mut tr_values = Vec::with_capacity(high.len() - 1);
        for i in 1..high.len() {
            let tr = (high[i] - low[i])
                .max((high[i] - close[i - 1]).abs())
                .max((low[i] - close[i - 1]).abs());
            tr_values.push(tr);
        }
        if tr_values.is_empty() {
            return;
        }
        let window_start = tr_values.len().saturating_sub(self.atr_period);
        let window = &tr_values[window_start..];
        let atr = window.iter().sum::<f64>() / window.len() as f64;

        push_bounded(&mut self.atr_values, atr, ATR_SERIES_MAXLEN);
        if self.atr_values.len() > 10 {
            self.median_atr = median(self.atr_values.iter().copied());
        }
    }

    /// Current ATR, or a small default if no candles have been ingested yet.
    pub fn current_atr(&self) -> f64 {
        self.atr_values.back().copied().unwrap_or(0.01)
    }

    pub fn latest_book(&self) -> Option<&OrderBook> {
        self.order_books.back()
    }

    pub fn last_price(&self) -> f64 {
        self.prices.back().copied().unwrap_or(0.0)
    }
}

fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut v: Vec<f64> = values.collect();
    if v.is_empty() {
        return 0.0;
    }
    v.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        (v[mid - 1] + v[mid]) / 2.0
    } else {
        v[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trade(price: f64, qty: f64, buyer_maker: bool) -> Trade {
        Trade {
            symbol: "BTCUSDT".to_string(),
            price,
            quantity: qty,
            timestamp: Utc::now(),
            is_buyer_maker: buyer_maker,
            trade_id: "1".to_string(),
        }
    }

    #[test]
    fn cumulative_delta_tracks_buy_sell_split() {
        let mut state = RollingState::new(14);
        state.add_trade(trade(100.0, 2.0, false));
        state.add_trade(trade(100.0, 1.0, true));
        assert_eq!(state.cumulative_delta, 1.0);
        assert_eq!(state.total_buy_volume, 2.0);
        assert_eq!(state.total_sell_volume, 1.0);
    }

    #[test]
    fn ring_buffers_are_bounded() {
        let mut state = RollingState::new(14);
        for _ in 0..(TRADES_MAXLEN + 50) {
            state.add_trade(trade(100.0, 1.0, false));
        }
        assert_eq!(state.trades.len(), TRADES_MAXLEN);
    }

    #[test]
    fn atr_needs_at_least_two_candles() {
        let mut state = RollingState::new(14);
        state.add_candle(Candle { high: 101.0, low: 99.0, close: 100.0 });
        assert_eq!(state.current_atr(), 0.01);
        state.add_candle(Candle { high: 102.0, low: 100.0, close: 101.0 });
        assert!(state.current_atr() > 0.0);
    }
}
