//! Aggregated L2 market-data snapshot: depth per price level, no
//! individual orders.

use serde::Serialize;

/// Parallel arrays of per-level depth, best-first on each side.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct L2MarketData {
    pub ask_prices: Vec<i64>,
    pub ask_volumes: Vec<u64>,
    pub ask_orders: Vec<u32>,
    pub bid_prices: Vec<i64>,
    pub bid_volumes: Vec<u64>,
    pub bid_orders: Vec<u32>,
}

impl L2MarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(asks: usize, bids: usize) -> Self {
        Self {
            ask_prices: Vec::with_capacity(asks),
            ask_volumes: Vec::with_capacity(asks),
            ask_orders: Vec::with_capacity(asks),
            bid_prices: Vec::with_capacity(bids),
            bid_volumes: Vec::with_capacity(bids),
            bid_orders: Vec::with_capacity(bids),
        }
    }

    #[inline]
    pub fn ask_size(&self) -> usize {
        self.ask_prices.len()
    }

    #[inline]
    pub fn bid_size(&self) -> usize {
        self.bid_prices.len()
    }

    pub(crate) fn clear_asks(&mut self) {
        self.ask_prices.clear();
        self.ask_volumes.clear();
        self.ask_orders.clear();
    }

    pub(crate) fn clear_bids(&mut self) {
        self.bid_prices.clear();
        self.bid_volumes.clear();
        self.bid_orders.clear();
    }

    pub(crate) fn push_ask(&mut self, price: i64, volume: u64, orders: u32) {
        self.ask_prices.push(price);
        self.ask_volumes.push(volume);
        self.ask_orders.push(orders);
    }

    pub(crate) fn push_bid(&mut self, price: i64, volume: u64, orders: u32) {
        self.bid_prices.push(price);
        self.bid_volumes.push(volume);
        self.bid_orders.push(orders);
    }
}
