//! Order book - two price-ordered sides plus a direct order-id index.
//!
//! Asks are kept ascending, bids are iterated descending; both sides map
//! price to a FIFO price level. The order index resolves an external order
//! id to its arena record in O(1). Every mutation keeps both indexes
//! consistent: an order is in the index if and only if it sits in exactly
//! one bucket.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::arena::{Arena, ArenaIndex};
use crate::buffer::BufferWriter;
use crate::command::OrderAction;
use crate::l2::L2MarketData;
use crate::price_level::PriceLevel;

/// The resting book: ordered price levels per side and the id index.
pub struct OrderBook {
    /// Ask levels, best = smallest price.
    pub asks: BTreeMap<i64, PriceLevel>,
    /// Bid levels, best = largest price (iterated in reverse).
    pub bids: BTreeMap<i64, PriceLevel>,
    /// Order id -> arena record of the resting order.
    index: FxHashMap<u64, ArenaIndex>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            asks: BTreeMap::new(),
            bids: BTreeMap::new(),
            index: FxHashMap::default(),
        }
    }

    /// Pre-size the order index for the expected number of resting orders.
    pub fn with_capacity(orders: usize) -> Self {
        Self {
            asks: BTreeMap::new(),
            bids: BTreeMap::new(),
            index: FxHashMap::with_capacity_and_hasher(orders, Default::default()),
        }
    }

    #[inline]
    pub fn best_ask(&self) -> Option<i64> {
        self.asks.keys().next().copied()
    }

    #[inline]
    pub fn best_bid(&self) -> Option<i64> {
        self.bids.keys().next_back().copied()
    }

    #[inline]
    pub fn side(&self, action: OrderAction) -> &BTreeMap<i64, PriceLevel> {
        match action {
            OrderAction::Ask => &self.asks,
            OrderAction::Bid => &self.bids,
        }
    }

    #[inline]
    pub fn side_mut(&mut self, action: OrderAction) -> &mut BTreeMap<i64, PriceLevel> {
        match action {
            OrderAction::Ask => &mut self.asks,
            OrderAction::Bid => &mut self.bids,
        }
    }

    // ========================================================================
    // Order index
    // ========================================================================

    #[inline]
    pub fn lookup(&self, order_id: u64) -> Option<ArenaIndex> {
        self.index.get(&order_id).copied()
    }

    #[inline]
    pub fn contains_order(&self, order_id: u64) -> bool {
        self.index.contains_key(&order_id)
    }

    #[inline]
    pub fn index_remove(&mut self, order_id: u64) {
        self.index.remove(&order_id);
    }

    #[inline]
    pub fn resting_orders(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn index_entries(&self) -> impl Iterator<Item = (u64, ArenaIndex)> + '_ {
        self.index.iter().map(|(&id, &idx)| (id, idx))
    }

    // ========================================================================
    // Resting-order lifecycle
    // ========================================================================

    /// Index a new resting order and append it to its price bucket,
    /// creating the bucket on demand.
    pub fn add_order(&mut self, arena: &mut Arena, idx: ArenaIndex) {
        let node = arena.get(idx);
        let (order_id, action, price) = (node.order_id, node.action, node.price);

        self.index.insert(order_id, idx);
        self.side_mut(action)
            .entry(price)
            .or_insert_with(PriceLevel::new)
            .push_back(arena, idx);
    }

    /// Re-home an already indexed order into the bucket at its current
    /// price, at the tail (MOVE path - time priority is lost).
    pub fn relink(&mut self, arena: &mut Arena, idx: ArenaIndex) {
        let node = arena.get(idx);
        let (action, price) = (node.action, node.price);

        self.side_mut(action)
            .entry(price)
            .or_insert_with(PriceLevel::new)
            .push_back(arena, idx);
    }

    /// Pull an order out of its bucket, destroying the bucket the instant
    /// it becomes empty. The order index is left untouched.
    pub fn unlink(&mut self, arena: &mut Arena, idx: ArenaIndex) {
        let node = arena.get(idx);
        let (action, price) = (node.action, node.price);

        let side = self.side_mut(action);
        if let Some(level) = side.get_mut(&price) {
            if level.remove(arena, idx) {
                side.remove(&price);
            }
        }
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Match a taker against the opposite side, best price outward, within
    /// the inclusive `price_limit` subtree (asks <= limit for a BID taker,
    /// bids >= limit for an ASK taker).
    ///
    /// Trade events are emitted as a side effect; fully matched makers are
    /// removed from the order index and freed; emptied buckets are erased.
    /// Returns the new filled total, starting from `filled`.
    #[allow(clippy::too_many_arguments)]
    pub fn try_match_instantly(
        &mut self,
        arena: &mut Arena,
        writer: &mut BufferWriter,
        taker_action: OrderAction,
        price_limit: i64,
        taker_size: u64,
        taker_reserve_bid_price: i64,
        mut filled: u64,
    ) -> u64 {
        while filled < taker_size {
            let size_left = taker_size - filled;

            match taker_action {
                OrderAction::Bid => {
                    let Some((&price, level)) = self.asks.range_mut(..=price_limit).next() else {
                        break;
                    };
                    debug!(price, size_left, "matching against ask level");
                    filled += level.match_orders(
                        arena,
                        writer,
                        size_left,
                        taker_reserve_bid_price,
                        |order_id| {
                            self.index.remove(&order_id);
                        },
                    );
                    if level.is_empty() {
                        self.asks.remove(&price);
                    }
                }
                OrderAction::Ask => {
                    let Some((&price, level)) = self.bids.range_mut(price_limit..).next_back()
                    else {
                        break;
                    };
                    debug!(price, size_left, "matching against bid level");
                    filled += level.match_orders(
                        arena,
                        writer,
                        size_left,
                        taker_reserve_bid_price,
                        |order_id| {
                            self.index.remove(&order_id);
                        },
                    );
                    if level.is_empty() {
                        self.bids.remove(&price);
                    }
                }
            }
        }

        filled
    }

    /// Inclusive price limit that exposes the entire opposite side to a
    /// taker (budget orders carry no per-unit cap).
    #[inline]
    pub const fn unbounded_limit(taker_action: OrderAction) -> i64 {
        match taker_action {
            OrderAction::Bid => i64::MAX,
            OrderAction::Ask => i64::MIN,
        }
    }

    /// Walk the opposite side best-first within the inclusive price limit,
    /// accumulating `volume * price` until `size` lots are covered.
    ///
    /// Returns `None` when the visible liquidity cannot cover `size`.
    pub fn budget_to_fill(
        &self,
        taker_action: OrderAction,
        price_limit: i64,
        mut size: u64,
    ) -> Option<i64> {
        let mut budget = 0i64;

        let mut walk = |price: i64, available: u64| -> Option<i64> {
            if size > available {
                size -= available;
                budget += available as i64 * price;
                debug!(price, available, budget, "budget walk");
                None
            } else {
                Some(budget + size as i64 * price)
            }
        };

        match taker_action {
            OrderAction::Bid => {
                for (&price, level) in self.asks.range(..=price_limit) {
                    if let Some(total) = walk(price, level.total_volume) {
                        return Some(total);
                    }
                }
            }
            OrderAction::Ask => {
                for (&price, level) in self.bids.range(price_limit..).rev() {
                    if let Some(total) = walk(price, level.total_volume) {
                        return Some(total);
                    }
                }
            }
        }

        debug!(size, "not enough liquidity to fill");
        None
    }

    // ========================================================================
    // Depth
    // ========================================================================

    /// Copy up to `size` ask levels, best-first, into the snapshot.
    pub fn fill_asks(&self, size: usize, data: &mut L2MarketData) {
        data.clear_asks();
        for (&price, level) in self.asks.iter().take(size) {
            data.push_ask(price, level.total_volume, level.num_orders);
        }
    }

    /// Copy up to `size` bid levels, best-first, into the snapshot.
    pub fn fill_bids(&self, size: usize, data: &mut L2MarketData) {
        data.clear_bids();
        for (&price, level) in self.bids.iter().rev().take(size) {
            data.push_bid(price, level.total_volume, level.num_orders);
        }
    }

    #[inline]
    pub fn total_ask_buckets(&self, limit: usize) -> usize {
        limit.min(self.asks.len())
    }

    #[inline]
    pub fn total_bid_buckets(&self, limit: usize) -> usize {
        limit.min(self.bids.len())
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("best_bid", &self.best_bid())
            .field("best_ask", &self.best_ask())
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .field("resting_orders", &self.index.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    fn rest_order(
        book: &mut OrderBook,
        arena: &mut Arena,
        order_id: u64,
        action: OrderAction,
        price: i64,
        size: u64,
    ) -> ArenaIndex {
        let idx = arena.alloc();
        let node = arena.get_mut(idx);
        node.order_id = order_id;
        node.uid = 1;
        node.action = action;
        node.price = price;
        node.size = size;
        book.add_order(arena, idx);
        idx
    }

    #[test]
    fn test_empty_book() {
        let book = OrderBook::new();
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.resting_orders(), 0);
    }

    #[test]
    fn test_best_prices_track_sides() {
        let mut arena = Arena::new(16);
        let mut book = OrderBook::new();

        rest_order(&mut book, &mut arena, 1, OrderAction::Bid, 10000, 10);
        rest_order(&mut book, &mut arena, 2, OrderAction::Bid, 10050, 10);
        rest_order(&mut book, &mut arena, 3, OrderAction::Ask, 10100, 10);
        rest_order(&mut book, &mut arena, 4, OrderAction::Ask, 10080, 10);

        assert_eq!(book.best_bid(), Some(10050));
        assert_eq!(book.best_ask(), Some(10080));
        assert_eq!(book.resting_orders(), 4);
    }

    #[test]
    fn test_unlink_drops_empty_bucket() {
        let mut arena = Arena::new(16);
        let mut book = OrderBook::new();

        let idx = rest_order(&mut book, &mut arena, 1, OrderAction::Bid, 10000, 10);
        assert_eq!(book.bids.len(), 1);

        book.unlink(&mut arena, idx);
        assert!(book.bids.is_empty());
        // index untouched by unlink
        assert!(book.contains_order(1));
    }

    #[test]
    fn test_match_walks_best_price_outward() {
        let mut arena = Arena::new(16);
        let mut book = OrderBook::new();
        let mut writer = BufferWriter::with_capacity(1024);

        rest_order(&mut book, &mut arena, 1, OrderAction::Ask, 10020, 50);
        rest_order(&mut book, &mut arena, 2, OrderAction::Ask, 10000, 50);
        rest_order(&mut book, &mut arena, 3, OrderAction::Ask, 10010, 50);

        let filled =
            book.try_match_instantly(&mut arena, &mut writer, OrderAction::Bid, 10020, 120, 0, 0);

        assert_eq!(filled, 120);
        // 10000 and 10010 emptied, 30 left at 10020
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.asks.get(&10020).unwrap().total_volume, 30);
        assert_eq!(book.resting_orders(), 1);
    }

    #[test]
    fn test_match_respects_price_limit() {
        let mut arena = Arena::new(16);
        let mut book = OrderBook::new();
        let mut writer = BufferWriter::with_capacity(1024);

        rest_order(&mut book, &mut arena, 1, OrderAction::Ask, 10000, 50);

        // bid capped below the best ask matches nothing
        let filled =
            book.try_match_instantly(&mut arena, &mut writer, OrderAction::Bid, 9999, 10, 0, 0);
        assert_eq!(filled, 0);
        assert!(writer.is_empty());

        // ask capped above the best bid matches nothing either
        rest_order(&mut book, &mut arena, 2, OrderAction::Bid, 9000, 50);
        let filled =
            book.try_match_instantly(&mut arena, &mut writer, OrderAction::Ask, 9001, 10, 0, 0);
        assert_eq!(filled, 0);
    }

    #[test]
    fn test_match_with_prefill_stops_at_size() {
        let mut arena = Arena::new(16);
        let mut book = OrderBook::new();
        let mut writer = BufferWriter::with_capacity(1024);

        rest_order(&mut book, &mut arena, 1, OrderAction::Ask, 10000, 50);

        let filled =
            book.try_match_instantly(&mut arena, &mut writer, OrderAction::Bid, 10000, 10, 0, 7);
        assert_eq!(filled, 10);
        assert_eq!(book.asks.get(&10000).unwrap().total_volume, 47);
    }

    #[test]
    fn test_budget_to_fill_best_first() {
        let mut arena = Arena::new(16);
        let mut book = OrderBook::new();

        rest_order(&mut book, &mut arena, 1, OrderAction::Ask, 1000, 5);
        rest_order(&mut book, &mut arena, 2, OrderAction::Ask, 800, 3);
        rest_order(&mut book, &mut arena, 3, OrderAction::Ask, 900, 4);

        // 3@800 + 4@900 + 3@1000 = 2400 + 3600 + 3000 = 9000
        let budget = book.budget_to_fill(OrderAction::Bid, i64::MAX, 10);
        assert_eq!(budget, Some(9000));

        // liquidity shortfall
        assert_eq!(book.budget_to_fill(OrderAction::Bid, i64::MAX, 13), None);

        // restricted to the price cap
        assert_eq!(book.budget_to_fill(OrderAction::Bid, 900, 7), Some(6000));
        assert_eq!(book.budget_to_fill(OrderAction::Bid, 900, 8), None);
    }

    #[test]
    fn test_budget_to_fill_ask_side_descends() {
        let mut arena = Arena::new(16);
        let mut book = OrderBook::new();

        rest_order(&mut book, &mut arena, 1, OrderAction::Bid, 500, 10);
        rest_order(&mut book, &mut arena, 2, OrderAction::Bid, 600, 5);

        // 5@600 + 5@500 = 5500
        assert_eq!(
            book.budget_to_fill(OrderAction::Ask, i64::MIN, 10),
            Some(5500)
        );
    }

    #[test]
    fn test_fill_depth() {
        let mut arena = Arena::new(16);
        let mut book = OrderBook::new();

        rest_order(&mut book, &mut arena, 1, OrderAction::Ask, 1010, 5);
        rest_order(&mut book, &mut arena, 2, OrderAction::Ask, 1000, 3);
        rest_order(&mut book, &mut arena, 3, OrderAction::Bid, 990, 4);
        rest_order(&mut book, &mut arena, 4, OrderAction::Bid, 980, 2);

        let mut data = L2MarketData::new();
        book.fill_asks(10, &mut data);
        book.fill_bids(1, &mut data);

        assert_eq!(data.ask_prices, vec![1000, 1010]);
        assert_eq!(data.ask_volumes, vec![3, 5]);
        assert_eq!(data.bid_prices, vec![990]);
        assert_eq!(book.total_ask_buckets(10), 2);
        assert_eq!(book.total_bid_buckets(1), 1);
    }
}
