//! Matching engine - order-type flows and the mutating commands.
//!
//! Every public operation consumes a command payload at `(buffer, offset)`,
//! mutates the book, appends events to the response buffer and terminates
//! the response with the packed result word. Recoverable failures become
//! result codes; only programmer-level violations surface as errors.

use tracing::{debug, warn};

use crate::arena::{Arena, OrderNode};
use crate::buffer::{BufferReader, BufferWriter};
use crate::command::{
    OrderAction, OrderType, CANCEL_OFFSET_ORDER_ID, CANCEL_OFFSET_UID, COMMAND_CANCEL_ORDER,
    COMMAND_MOVE_ORDER, COMMAND_PLACE_ORDER, COMMAND_REDUCE_ORDER, L2_QUERY_OFFSET_LIMIT,
    MOVE_OFFSET_ORDER_ID, MOVE_OFFSET_PRICE, MOVE_OFFSET_UID, PLACE_OFFSET_ACTION,
    PLACE_OFFSET_ORDER_ID, PLACE_OFFSET_PRICE, PLACE_OFFSET_RESERVED_BID_PRICE, PLACE_OFFSET_SIZE,
    PLACE_OFFSET_TYPE, PLACE_OFFSET_UID, PLACE_OFFSET_USER_COOKIE, QUERY_ORDER_BOOK,
    REDUCE_OFFSET_ORDER_ID, REDUCE_OFFSET_SIZE, REDUCE_OFFSET_UID, RESULT_INCORRECT_ORDER_SIZE,
    RESULT_INCORRECT_REDUCE_SIZE, RESULT_MOVE_FAILED_PRICE_OVER_RISK_LIMIT, RESULT_SUCCESS,
    RESULT_UNKNOWN_ORDER_ID, RESULT_UNSUPPORTED_COMMAND,
};
use crate::error::EngineError;
use crate::events;
use crate::l2::L2MarketData;
use crate::order_book::OrderBook;
use crate::symbol::SymbolSpec;

/// Default arena depth (resting orders) before the slab grows.
pub const DEFAULT_ORDER_CAPACITY: u32 = 1 << 16;
/// Default response buffer size in bytes.
pub const DEFAULT_RESPONSE_CAPACITY: usize = 1 << 16;

/// Single-symbol matching engine: arena, dual-indexed book, response
/// buffer and the symbol contract.
pub struct MatchingEngine<S: SymbolSpec> {
    pub arena: Arena,
    pub book: OrderBook,
    writer: BufferWriter,
    symbol: S,
}

impl<S: SymbolSpec> MatchingEngine<S> {
    pub fn new(symbol: S) -> Self {
        Self::with_capacity(symbol, DEFAULT_ORDER_CAPACITY, DEFAULT_RESPONSE_CAPACITY)
    }

    /// Pre-size the arena and the response buffer.
    pub fn with_capacity(symbol: S, order_capacity: u32, response_capacity: usize) -> Self {
        Self {
            arena: Arena::new(order_capacity),
            book: OrderBook::with_capacity(order_capacity as usize),
            writer: BufferWriter::with_capacity(response_capacity),
            symbol,
        }
    }

    /// Response bytes accumulated since the last [`clear_response`].
    ///
    /// [`clear_response`]: Self::clear_response
    #[inline]
    pub fn response(&self) -> &[u8] {
        self.writer.as_slice()
    }

    #[inline]
    pub fn clear_response(&mut self) {
        self.writer.clear();
    }

    #[inline]
    pub fn symbol_spec(&self) -> &S {
        &self.symbol
    }

    /// Pre-fault arena pages before going live.
    pub fn warm_up(&mut self) {
        self.arena.warm_up();
    }

    // ========================================================================
    // PLACE
    // ========================================================================

    /// Process a new order. Marketable volume is matched against resting
    /// GTC orders; the remainder is handled per the order type.
    pub fn new_order(
        &mut self,
        buffer: &[u8],
        offset: usize,
        timestamp: i64,
    ) -> Result<(), EngineError> {
        let reader = BufferReader::new(buffer, offset);

        let order_type_code = reader.byte_at(PLACE_OFFSET_TYPE);
        let uid = reader.long_at(PLACE_OFFSET_UID) as u64;
        let order_id = reader.long_at(PLACE_OFFSET_ORDER_ID) as u64;
        let user_cookie = reader.int_at(PLACE_OFFSET_USER_COOKIE);
        let action = OrderAction::from_byte(reader.byte_at(PLACE_OFFSET_ACTION))?;

        self.writer.append_byte(COMMAND_PLACE_ORDER);
        self.writer.append_long(uid as i64);
        self.writer.append_long(order_id as i64);
        self.writer.append_int(user_cookie);

        let size = reader.long_at(PLACE_OFFSET_SIZE);
        if size <= 0 {
            debug!(order_id, size, "rejecting order with incorrect size");
            events::fill_result_code(
                &mut self.writer,
                RESULT_INCORRECT_ORDER_SIZE,
                true,
                action,
                false,
            );
            return Ok(());
        }
        let size = size as u64;

        match OrderType::from_byte(order_type_code)? {
            OrderType::Gtc => self.place_gtc(&reader, size, order_id, uid, action, timestamp),
            OrderType::Ioc => self.match_ioc(&reader, size, action),
            OrderType::Fok => self.match_fok(&reader, size, order_id, action)?,
            OrderType::FokBudget => self.match_fok_budget(&reader, size, order_id, action)?,
            // reserved opcode, semantics not finalized
            OrderType::IocBudget => {
                return Err(EngineError::UnsupportedOrderType(order_type_code))
            }
        }
        Ok(())
    }

    fn place_gtc(
        &mut self,
        reader: &BufferReader<'_>,
        size: u64,
        order_id: u64,
        uid: u64,
        action: OrderAction,
        timestamp: i64,
    ) {
        let price = reader.long_at(PLACE_OFFSET_PRICE);
        let reserve_bid_price = reader.long_at(PLACE_OFFSET_RESERVED_BID_PRICE);

        debug!(order_id, uid, ?action, price, size, "GTC");

        let filled = self.book.try_match_instantly(
            &mut self.arena,
            &mut self.writer,
            action,
            price,
            size,
            reserve_bid_price,
            0,
        );

        if filled == size {
            // matched completely - nothing to place
            events::fill_result_code(&mut self.writer, RESULT_SUCCESS, true, action, false);
            return;
        }

        let non_matched = size - filled;

        if self.book.contains_order(order_id) {
            // can match, but can not place - reject the remainder
            warn!(order_id, "rejecting duplicate order id");
            events::append_reduce_event(&mut self.writer, price, reserve_bid_price, non_matched);
            events::fill_result_code(&mut self.writer, RESULT_SUCCESS, true, action, true);
            return;
        }

        let idx = self.arena.alloc();
        let node = self.arena.get_mut(idx);
        node.order_id = order_id;
        node.uid = uid;
        node.action = action;
        node.price = price;
        node.reserve_bid_price = reserve_bid_price;
        node.size = size;
        node.filled = filled;
        node.timestamp = timestamp;

        self.book.add_order(&mut self.arena, idx);

        self.writer.append_long(non_matched as i64);
        events::fill_result_code(&mut self.writer, RESULT_SUCCESS, false, action, false);
    }

    fn match_ioc(&mut self, reader: &BufferReader<'_>, size: u64, action: OrderAction) {
        let price = reader.long_at(PLACE_OFFSET_PRICE);
        let reserve_bid_price = reader.long_at(PLACE_OFFSET_RESERVED_BID_PRICE);

        debug!(?action, price, size, "IOC");

        let filled = self.book.try_match_instantly(
            &mut self.arena,
            &mut self.writer,
            action,
            price,
            size,
            reserve_bid_price,
            0,
        );

        let rejected = size - filled;
        if rejected != 0 {
            events::append_reduce_event(&mut self.writer, price, reserve_bid_price, rejected);
        }
        events::fill_result_code(&mut self.writer, RESULT_SUCCESS, true, action, rejected != 0);
    }

    fn match_fok(
        &mut self,
        reader: &BufferReader<'_>,
        size: u64,
        order_id: u64,
        action: OrderAction,
    ) -> Result<(), EngineError> {
        let price = reader.long_at(PLACE_OFFSET_PRICE);
        let reserve_bid_price = reader.long_at(PLACE_OFFSET_RESERVED_BID_PRICE);

        // feasibility peek over the price-capped subtree
        let can_match = self.book.budget_to_fill(action, price, size).is_some();

        debug!(?action, price, size, can_match, "FOK");

        if can_match {
            let filled = self.book.try_match_instantly(
                &mut self.arena,
                &mut self.writer,
                action,
                price,
                size,
                reserve_bid_price,
                0,
            );
            if filled != size {
                return Err(EngineError::IncompleteFill {
                    order_id,
                    filled,
                    size,
                });
            }
        } else {
            events::append_reduce_event(&mut self.writer, price, reserve_bid_price, size);
        }

        events::fill_result_code(&mut self.writer, RESULT_SUCCESS, true, action, !can_match);
        Ok(())
    }

    fn match_fok_budget(
        &mut self,
        reader: &BufferReader<'_>,
        size: u64,
        order_id: u64,
        action: OrderAction,
    ) -> Result<(), EngineError> {
        let limit = OrderBook::unbounded_limit(action);
        let budget = self.book.budget_to_fill(action, limit, size);

        // for budget orders the price field caps total notional value
        let price = reader.long_at(PLACE_OFFSET_PRICE);
        let reserve_bid_price = reader.long_at(PLACE_OFFSET_RESERVED_BID_PRICE);

        debug!(?budget, requested = price, "FOK budget calc");

        let can_match = budget.map_or(false, |b| budget_limit_satisfied(action, b, price));

        if can_match {
            let filled = self.book.try_match_instantly(
                &mut self.arena,
                &mut self.writer,
                action,
                limit,
                size,
                reserve_bid_price,
                0,
            );
            if filled != size {
                return Err(EngineError::IncompleteFill {
                    order_id,
                    filled,
                    size,
                });
            }
        } else {
            events::append_reduce_event(&mut self.writer, price, reserve_bid_price, size);
        }

        events::fill_result_code(&mut self.writer, RESULT_SUCCESS, true, action, !can_match);
        Ok(())
    }

    // ========================================================================
    // CANCEL
    // ========================================================================

    /// Cancel an order completely. The response carries the original order
    /// action in the BID flag bit.
    pub fn cancel_order(&mut self, buffer: &[u8], offset: usize) {
        let reader = BufferReader::new(buffer, offset);
        let order_id = reader.long_at(CANCEL_OFFSET_ORDER_ID) as u64;
        let cmd_uid = reader.long_at(CANCEL_OFFSET_UID) as u64;

        self.writer.append_byte(COMMAND_CANCEL_ORDER);
        self.writer.append_long(cmd_uid as i64);
        self.writer.append_long(order_id as i64);

        let found = self
            .book
            .lookup(order_id)
            .filter(|&idx| self.arena.get(idx).uid == cmd_uid);
        let Some(idx) = found else {
            // already matched and removed from the book previously
            events::fill_result_code(
                &mut self.writer,
                RESULT_UNKNOWN_ORDER_ID,
                true,
                OrderAction::Ask, // arbitrary action, should be ignored
                false,
            );
            return;
        };

        self.book.index_remove(order_id);

        let node = self.arena.get(idx);
        let (price, reserve_bid_price, remaining, action) = (
            node.price,
            node.reserve_bid_price,
            node.remaining(),
            node.action,
        );

        self.book.unlink(&mut self.arena, idx);
        self.arena.free(idx);

        events::append_reduce_event(&mut self.writer, price, reserve_bid_price, remaining);
        events::fill_result_code(&mut self.writer, RESULT_SUCCESS, true, action, true);
    }

    // ========================================================================
    // REDUCE
    // ========================================================================

    /// Decrease the size of an order by a number of lots.
    pub fn reduce_order(&mut self, buffer: &[u8], offset: usize) {
        let reader = BufferReader::new(buffer, offset);
        let order_id = reader.long_at(REDUCE_OFFSET_ORDER_ID) as u64;
        let requested_reduce_size = reader.long_at(REDUCE_OFFSET_SIZE);
        let cmd_uid = reader.long_at(REDUCE_OFFSET_UID) as u64;

        self.writer.append_byte(COMMAND_REDUCE_ORDER);
        self.writer.append_long(cmd_uid as i64);
        self.writer.append_long(order_id as i64);

        let found = self
            .book
            .lookup(order_id)
            .filter(|&idx| self.arena.get(idx).uid == cmd_uid);
        let Some(idx) = found else {
            events::fill_result_code(
                &mut self.writer,
                RESULT_UNKNOWN_ORDER_ID,
                true,
                OrderAction::Ask,
                false,
            );
            return;
        };

        if requested_reduce_size <= 0 {
            events::fill_result_code(
                &mut self.writer,
                RESULT_INCORRECT_REDUCE_SIZE,
                false,
                OrderAction::Ask,
                false,
            );
            return;
        }

        let node = self.arena.get(idx);
        let (price, reserve_bid_price, remaining, action) = (
            node.price,
            node.reserve_bid_price,
            node.remaining(),
            node.action,
        );

        // always > 0, otherwise the order would have been removed
        let actual_reduce_by = remaining.min(requested_reduce_size as u64);

        events::append_reduce_event(&mut self.writer, price, reserve_bid_price, actual_reduce_by);

        let can_remove = actual_reduce_by == remaining;
        if can_remove {
            self.book.index_remove(order_id);
            self.book.unlink(&mut self.arena, idx);
            self.arena.free(idx);
        } else {
            let node = self.arena.get_mut(idx);
            node.size -= actual_reduce_by;
            let new_remaining = node.remaining();

            if let Some(level) = self.book.side_mut(action).get_mut(&price) {
                level.reduce_volume(actual_reduce_by);
            }
            self.writer.append_long(new_remaining as i64);
        }

        events::fill_result_code(&mut self.writer, RESULT_SUCCESS, can_remove, action, true);
    }

    // ========================================================================
    // MOVE
    // ========================================================================

    /// Move an order to a new price. The order is matched at the new price
    /// and, if volume remains, re-queued at the destination bucket tail -
    /// time priority is lost even when the price is unchanged.
    pub fn move_order(&mut self, buffer: &[u8], offset: usize) {
        let reader = BufferReader::new(buffer, offset);
        let order_id = reader.long_at(MOVE_OFFSET_ORDER_ID) as u64;
        let new_price = reader.long_at(MOVE_OFFSET_PRICE);
        let cmd_uid = reader.long_at(MOVE_OFFSET_UID) as u64;

        self.writer.append_byte(COMMAND_MOVE_ORDER);
        self.writer.append_long(cmd_uid as i64);
        self.writer.append_long(order_id as i64);

        let found = self
            .book
            .lookup(order_id)
            .filter(|&idx| self.arena.get(idx).uid == cmd_uid);
        let Some(idx) = found else {
            events::fill_result_code(
                &mut self.writer,
                RESULT_UNKNOWN_ORDER_ID,
                true,
                OrderAction::Ask,
                false,
            );
            return;
        };

        let node = self.arena.get(idx);
        let (action, reserve_bid_price, size, prefilled) =
            (node.action, node.reserve_bid_price, node.size, node.filled);

        // reserved price risk check for exchange bids
        if action == OrderAction::Bid
            && self.symbol.is_exchange_type()
            && new_price > reserve_bid_price
        {
            self.writer.append_long((size - prefilled) as i64);
            events::fill_result_code(
                &mut self.writer,
                RESULT_MOVE_FAILED_PRICE_OVER_RISK_LIMIT,
                false,
                action,
                false,
            );
            return;
        }

        self.book.unlink(&mut self.arena, idx);
        self.arena.get_mut(idx).price = new_price;

        let filled = self.book.try_match_instantly(
            &mut self.arena,
            &mut self.writer,
            action,
            new_price,
            size,
            reserve_bid_price,
            prefilled,
        );

        let taker_completed = filled == size;
        if taker_completed {
            // 100% marketable at the new price - gone from the book
            self.book.index_remove(order_id);
            self.arena.free(idx);
        } else {
            self.arena.get_mut(idx).filled = filled;
            self.book.relink(&mut self.arena, idx);
            self.writer.append_long((size - filled) as i64);
        }

        events::fill_result_code(&mut self.writer, RESULT_SUCCESS, taker_completed, action, false);
    }

    // ========================================================================
    // L2 query
    // ========================================================================

    /// Write an L2 depth snapshot response: ask records then bid records,
    /// best-first, then the opcode, counts and result code.
    pub fn send_l2_snapshot(&mut self, buffer: &[u8], offset: usize) {
        let size_offer = BufferReader::new(buffer, offset).short_at(L2_QUERY_OFFSET_LIMIT);
        let max_size = if size_offer > 0 {
            size_offer as usize
        } else {
            usize::MAX
        };

        let mut asks = 0i32;
        for (&price, level) in self.book.asks.iter() {
            events::add_l2_record(&mut self.writer, price, level.total_volume, level.num_orders);
            asks += 1;
            if asks as usize == max_size {
                break;
            }
        }

        let mut bids = 0i32;
        for (&price, level) in self.book.bids.iter().rev() {
            events::add_l2_record(&mut self.writer, price, level.total_volume, level.num_orders);
            bids += 1;
            if bids as usize == max_size {
                break;
            }
        }

        self.writer.append_byte(QUERY_ORDER_BOOK);
        self.writer.append_int(asks);
        self.writer.append_int(bids);
        self.writer.append_short(RESULT_SUCCESS as i16);
    }

    /// Response for an opcode the engine does not understand. The payload
    /// layout is unknown, so the header carries zeroed identifiers.
    pub(crate) fn report_unsupported_command(&mut self, command: u8) {
        warn!(command, "unsupported command");
        self.writer.append_byte(command);
        self.writer.append_long(0);
        self.writer.append_long(0);
        events::fill_result_code(
            &mut self.writer,
            RESULT_UNSUPPORTED_COMMAND,
            true,
            OrderAction::Ask,
            false,
        );
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Look up a resting order by id.
    pub fn order_by_id(&self, order_id: u64) -> Option<&OrderNode> {
        self.book.lookup(order_id).map(|idx| self.arena.get(idx))
    }

    /// All orders of one user, scanning both sides. Slow - the book keeps
    /// no uid index. The result must be consumed before the next mutating
    /// call (the borrow checker enforces this).
    pub fn find_user_orders(&self, uid: u64) -> Vec<&OrderNode> {
        self.ask_orders()
            .chain(self.bid_orders())
            .filter(|order| order.uid == uid)
            .collect()
    }

    /// Ask orders in natural order: price ascending, FIFO within a level.
    pub fn ask_orders(&self) -> impl Iterator<Item = &OrderNode> + '_ {
        self.book
            .asks
            .values()
            .flat_map(move |level| level.iter(&self.arena))
    }

    /// Bid orders in natural order: price descending, FIFO within a level.
    pub fn bid_orders(&self) -> impl Iterator<Item = &OrderNode> + '_ {
        self.book
            .bids
            .values()
            .rev()
            .flat_map(move |level| level.iter(&self.arena))
    }

    /// Aggregated depth snapshot with up to `limit` buckets per side.
    pub fn l2_market_data_snapshot(&self, limit: usize) -> L2MarketData {
        let asks = self.book.total_ask_buckets(limit);
        let bids = self.book.total_bid_buckets(limit);
        let mut data = L2MarketData::with_capacity(asks, bids);
        self.book.fill_asks(asks, &mut data);
        self.book.fill_bids(bids, &mut data);
        data
    }

    /// Depth snapshot of the whole book.
    pub fn full_l2_snapshot(&self) -> L2MarketData {
        self.l2_market_data_snapshot(usize::MAX)
    }

    /// Number of resting orders on one side (test support).
    pub fn orders_num(&self, action: OrderAction) -> u32 {
        self.book
            .side(action)
            .values()
            .map(|level| level.num_orders)
            .sum()
    }

    /// Total resting volume on one side (test support).
    pub fn total_orders_volume(&self, action: OrderAction) -> u64 {
        self.book
            .side(action)
            .values()
            .map(|level| level.total_volume)
            .sum()
    }

    // ========================================================================
    // Verification & state hash
    // ========================================================================

    /// Validate every bucket, the index<->bucket correspondence and the
    /// uncrossed-book invariant, without changing state.
    pub fn verify_internal_state(&self) -> Result<(), EngineError> {
        let mut bucket_orders = 0usize;

        for (&price, level) in &self.book.asks {
            level.validate(&self.arena, price)?;
            bucket_orders += level.num_orders as usize;
            for order in level.iter(&self.arena) {
                if order.action != OrderAction::Ask {
                    return Err(EngineError::CorruptedState(format!(
                        "bid order {} resting on the ask side",
                        order.order_id
                    )));
                }
            }
        }
        for (&price, level) in &self.book.bids {
            level.validate(&self.arena, price)?;
            bucket_orders += level.num_orders as usize;
            for order in level.iter(&self.arena) {
                if order.action != OrderAction::Bid {
                    return Err(EngineError::CorruptedState(format!(
                        "ask order {} resting on the bid side",
                        order.order_id
                    )));
                }
            }
        }

        if bucket_orders != self.book.resting_orders() {
            return Err(EngineError::CorruptedState(format!(
                "{} orders in buckets, {} in the id index",
                bucket_orders,
                self.book.resting_orders()
            )));
        }
        for (order_id, idx) in self.book.index_entries() {
            if self.arena.get(idx).order_id != order_id {
                return Err(EngineError::CorruptedState(format!(
                    "index entry {order_id} points at a foreign record"
                )));
            }
        }

        if let (Some(best_ask), Some(best_bid)) = (self.book.best_ask(), self.book.best_bid()) {
            if best_ask <= best_bid {
                return Err(EngineError::CorruptedState(format!(
                    "crossed book: best ask {best_ask} <= best bid {best_bid}"
                )));
            }
        }

        Ok(())
    }

    /// Deterministic state hash: the 31-recurrence over ask orders in
    /// natural order, the same over bids, combined with the symbol hash.
    /// Two engines fed the same command sequence from the same initial
    /// state hash identically.
    pub fn state_hash(&self) -> i32 {
        let asks = stream_hash(self.ask_orders());
        let bids = stream_hash(self.bid_orders());

        let mut h: i32 = 1;
        for v in [asks, bids, self.symbol.state_hash()] {
            h = h.wrapping_mul(31).wrapping_add(v);
        }
        h
    }
}

fn stream_hash<'a>(orders: impl Iterator<Item = &'a OrderNode>) -> i32 {
    let mut h: i32 = 0;
    for order in orders {
        h = h.wrapping_mul(31).wrapping_add(order.state_hash());
    }
    h
}

/// Budget acceptance: exact cost always fills; otherwise an ASK requires
/// proceeds above the cap and a BID requires cost below it.
#[inline]
fn budget_limit_satisfied(action: OrderAction, calculated: i64, limit: i64) -> bool {
    calculated == limit || ((action == OrderAction::Bid) != (calculated > limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{
        encode_cancel_order, encode_move_order, encode_place_order, encode_reduce_order,
    };
    use crate::response::decode_response;
    use crate::symbol::SimpleSymbolSpec;

    fn engine() -> MatchingEngine<SimpleSymbolSpec> {
        MatchingEngine::with_capacity(SimpleSymbolSpec::default(), 1024, 4096)
    }

    fn place(
        engine: &mut MatchingEngine<SimpleSymbolSpec>,
        uid: u64,
        order_id: u64,
        action: OrderAction,
        order_type: OrderType,
        price: i64,
        size: i64,
    ) -> crate::response::CommandResponse {
        place_reserve(engine, uid, order_id, action, order_type, price, price, size)
    }

    #[allow(clippy::too_many_arguments)]
    fn place_reserve(
        engine: &mut MatchingEngine<SimpleSymbolSpec>,
        uid: u64,
        order_id: u64,
        action: OrderAction,
        order_type: OrderType,
        price: i64,
        reserve_bid_price: i64,
        size: i64,
    ) -> crate::response::CommandResponse {
        let mut cmd = BufferWriter::with_capacity(64);
        encode_place_order(
            &mut cmd,
            uid,
            order_id,
            price,
            reserve_bid_price,
            size,
            0,
            action,
            order_type,
        );
        engine.clear_response();
        engine.new_order(cmd.as_slice(), 0, 1).unwrap();
        decode_response(engine.response()).unwrap()
    }

    fn cancel(
        engine: &mut MatchingEngine<SimpleSymbolSpec>,
        uid: u64,
        order_id: u64,
    ) -> crate::response::CommandResponse {
        let mut cmd = BufferWriter::with_capacity(32);
        encode_cancel_order(&mut cmd, uid, order_id);
        engine.clear_response();
        engine.cancel_order(cmd.as_slice(), 0);
        decode_response(engine.response()).unwrap()
    }

    fn reduce(
        engine: &mut MatchingEngine<SimpleSymbolSpec>,
        uid: u64,
        order_id: u64,
        size: i64,
    ) -> crate::response::CommandResponse {
        let mut cmd = BufferWriter::with_capacity(32);
        encode_reduce_order(&mut cmd, uid, order_id, size);
        engine.clear_response();
        engine.reduce_order(cmd.as_slice(), 0);
        decode_response(engine.response()).unwrap()
    }

    fn move_to(
        engine: &mut MatchingEngine<SimpleSymbolSpec>,
        uid: u64,
        order_id: u64,
        new_price: i64,
    ) -> crate::response::CommandResponse {
        let mut cmd = BufferWriter::with_capacity(32);
        encode_move_order(&mut cmd, uid, order_id, new_price);
        engine.clear_response();
        engine.move_order(cmd.as_slice(), 0);
        decode_response(engine.response()).unwrap()
    }

    #[test]
    fn test_gtc_rests_when_not_marketable() {
        let mut e = engine();
        let resp = place(&mut e, 1, 100, OrderAction::Ask, OrderType::Gtc, 1000, 10);

        assert!(resp.is_successful());
        assert!(!resp.taker_completed);
        assert_eq!(resp.remaining_size, Some(10));
        assert!(resp.trade_events.is_empty());
        assert!(resp.reduce_event.is_none());
        assert_eq!(e.orders_num(OrderAction::Ask), 1);
        assert_eq!(e.total_orders_volume(OrderAction::Ask), 10);
        e.verify_internal_state().unwrap();
    }

    #[test]
    fn test_gtc_partial_match_then_rests() {
        let mut e = engine();
        place(&mut e, 1, 100, OrderAction::Ask, OrderType::Gtc, 1000, 4);

        let resp = place(&mut e, 2, 101, OrderAction::Bid, OrderType::Gtc, 1000, 10);
        assert!(!resp.taker_completed);
        assert_eq!(resp.remaining_size, Some(6));
        assert_eq!(resp.trade_events.len(), 1);
        assert_eq!(resp.trade_events[0].maker_order_id, 100);
        assert_eq!(resp.trade_events[0].trade_volume, 4);
        assert!(resp.trade_events[0].maker_order_completed);

        assert_eq!(e.orders_num(OrderAction::Ask), 0);
        assert_eq!(e.orders_num(OrderAction::Bid), 1);
        e.verify_internal_state().unwrap();
    }

    #[test]
    fn test_gtc_rejects_non_positive_size() {
        let mut e = engine();
        let resp = place(&mut e, 1, 100, OrderAction::Ask, OrderType::Gtc, 1000, 0);
        assert_eq!(resp.result_code, RESULT_INCORRECT_ORDER_SIZE);
        assert!(resp.taker_completed);
        assert_eq!(e.book.resting_orders(), 0);

        let resp = place(&mut e, 1, 100, OrderAction::Bid, OrderType::Gtc, 1000, -5);
        assert_eq!(resp.result_code, RESULT_INCORRECT_ORDER_SIZE);
    }

    #[test]
    fn test_gtc_duplicate_id_keeps_matches_rejects_remainder() {
        let mut e = engine();
        place(&mut e, 1, 100, OrderAction::Ask, OrderType::Gtc, 2000, 10);
        place(&mut e, 2, 200, OrderAction::Ask, OrderType::Gtc, 1001, 5);

        // duplicate id 100, crosses the ask at 1001 for 5 lots
        let resp = place(&mut e, 3, 100, OrderAction::Bid, OrderType::Gtc, 1001, 8);
        assert!(resp.is_successful());
        assert!(resp.taker_completed);
        assert_eq!(resp.trade_events.len(), 1);
        assert_eq!(resp.trade_events[0].maker_order_id, 200);
        assert_eq!(resp.trade_events[0].trade_volume, 5);
        let reduce_evt = resp.reduce_event.unwrap();
        assert_eq!(reduce_evt.reduced_volume, 3);

        // the original order 100 is untouched
        let original = e.order_by_id(100).unwrap();
        assert_eq!(original.uid, 1);
        assert_eq!(original.remaining(), 10);
        e.verify_internal_state().unwrap();
    }

    #[test]
    fn test_ioc_rejects_unmatched_remainder() {
        let mut e = engine();
        place(&mut e, 1, 100, OrderAction::Ask, OrderType::Gtc, 1000, 5);

        let resp = place(&mut e, 2, 101, OrderAction::Bid, OrderType::Ioc, 1000, 8);
        assert!(resp.taker_completed);
        assert_eq!(resp.trade_events.len(), 1);
        assert_eq!(resp.trade_events[0].trade_volume, 5);
        let reduce_evt = resp.reduce_event.unwrap();
        assert_eq!(reduce_evt.reduced_volume, 3);
        assert_eq!(reduce_evt.price, 1000);

        // nothing rested
        assert_eq!(e.orders_num(OrderAction::Bid), 0);
        e.verify_internal_state().unwrap();
    }

    #[test]
    fn test_ioc_full_fill_has_no_reduce_event() {
        let mut e = engine();
        place(&mut e, 1, 100, OrderAction::Ask, OrderType::Gtc, 1000, 10);

        let resp = place(&mut e, 2, 101, OrderAction::Bid, OrderType::Ioc, 1000, 10);
        assert!(resp.taker_completed);
        assert!(resp.reduce_event.is_none());
        assert_eq!(resp.trade_events.len(), 1);
    }

    #[test]
    fn test_fok_all_or_nothing() {
        let mut e = engine();
        place(&mut e, 1, 100, OrderAction::Ask, OrderType::Gtc, 1000, 5);
        place(&mut e, 1, 101, OrderAction::Ask, OrderType::Gtc, 1001, 5);

        // 8 lots available within cap 1000? only 5 - killed
        let resp = place(&mut e, 2, 200, OrderAction::Bid, OrderType::Fok, 1000, 8);
        assert!(resp.taker_completed);
        assert!(resp.trade_events.is_empty());
        assert_eq!(resp.reduce_event.unwrap().reduced_volume, 8);
        assert_eq!(e.orders_num(OrderAction::Ask), 2);

        // 8 lots available within cap 1001 - filled across two levels
        let resp = place(&mut e, 2, 201, OrderAction::Bid, OrderType::Fok, 1001, 8);
        assert!(resp.taker_completed);
        assert!(resp.reduce_event.is_none());
        assert_eq!(resp.trade_events.len(), 2);
        assert_eq!(e.orders_num(OrderAction::Ask), 1);
        e.verify_internal_state().unwrap();
    }

    #[test]
    fn test_fok_budget_bid_over_budget_is_killed() {
        let mut e = engine();
        place(&mut e, 1, 1, OrderAction::Ask, OrderType::Gtc, 1000, 5);
        place(&mut e, 1, 2, OrderAction::Ask, OrderType::Gtc, 800, 3);
        place(&mut e, 1, 3, OrderAction::Ask, OrderType::Gtc, 900, 4);

        // best-first: 3@800 + 4@900 + 3@1000 = 9000 > 7500 - cannot fill
        let resp = place(&mut e, 7, 300, OrderAction::Bid, OrderType::FokBudget, 7500, 10);
        assert!(resp.is_successful());
        assert!(resp.taker_completed);
        assert!(resp.trade_events.is_empty());
        let reduce_evt = resp.reduce_event.unwrap();
        assert_eq!(reduce_evt.reduced_volume, 10);
        assert_eq!(reduce_evt.price, 7500);
        assert_eq!(e.orders_num(OrderAction::Ask), 3);
        e.verify_internal_state().unwrap();
    }

    #[test]
    fn test_fok_budget_bid_within_budget_fills_entirely() {
        let mut e = engine();
        place(&mut e, 1, 1, OrderAction::Ask, OrderType::Gtc, 1000, 5);
        place(&mut e, 1, 2, OrderAction::Ask, OrderType::Gtc, 800, 3);
        place(&mut e, 1, 3, OrderAction::Ask, OrderType::Gtc, 900, 4);

        let resp = place(&mut e, 7, 300, OrderAction::Bid, OrderType::FokBudget, 9000, 10);
        assert!(resp.taker_completed);
        assert!(resp.reduce_event.is_none());
        assert_eq!(resp.trade_events.len(), 3);
        // best-first trade sequence
        assert_eq!(resp.trade_events[0].price, 800);
        assert_eq!(resp.trade_events[1].price, 900);
        assert_eq!(resp.trade_events[2].price, 1000);
        assert_eq!(resp.trade_events[2].trade_volume, 3);
        assert_eq!(e.total_orders_volume(OrderAction::Ask), 2);
        e.verify_internal_state().unwrap();
    }

    #[test]
    fn test_fok_budget_ask_requires_proceeds_above_cap() {
        let mut e = engine();
        place(&mut e, 1, 1, OrderAction::Bid, OrderType::Gtc, 500, 10);

        // selling 10 yields 5000 < 6000 - killed
        let resp = place(&mut e, 2, 2, OrderAction::Ask, OrderType::FokBudget, 6000, 10);
        assert!(resp.reduce_event.is_some());

        // 5000 >= 5000 - filled (equality fills both directions)
        let resp = place(&mut e, 2, 3, OrderAction::Ask, OrderType::FokBudget, 5000, 10);
        assert!(resp.reduce_event.is_none());
        assert_eq!(resp.trade_events.len(), 1);
        e.verify_internal_state().unwrap();
    }

    #[test]
    fn test_ioc_budget_is_unsupported() {
        let mut e = engine();
        let mut cmd = BufferWriter::with_capacity(64);
        encode_place_order(
            &mut cmd,
            1,
            1,
            1000,
            1000,
            5,
            0,
            OrderAction::Bid,
            OrderType::IocBudget,
        );
        let err = e.new_order(cmd.as_slice(), 0, 1).unwrap_err();
        assert_eq!(err, EngineError::UnsupportedOrderType(2));
    }

    #[test]
    fn test_cancel_returns_remaining_as_reduce_event() {
        let mut e = engine();
        place(&mut e, 1, 100, OrderAction::Ask, OrderType::Gtc, 1000, 10);
        place(&mut e, 2, 101, OrderAction::Bid, OrderType::Gtc, 1000, 4);

        let resp = cancel(&mut e, 1, 100);
        assert!(resp.is_successful());
        assert!(resp.taker_completed);
        assert_eq!(resp.taker_action, OrderAction::Ask);
        assert_eq!(resp.reduce_event.unwrap().reduced_volume, 6);
        assert_eq!(e.book.resting_orders(), 0);
        e.verify_internal_state().unwrap();
    }

    #[test]
    fn test_cancel_unknown_or_foreign_order() {
        let mut e = engine();
        place(&mut e, 1, 100, OrderAction::Ask, OrderType::Gtc, 1000, 10);

        let resp = cancel(&mut e, 9, 100); // wrong uid
        assert_eq!(resp.result_code, RESULT_UNKNOWN_ORDER_ID);
        assert!(e.order_by_id(100).is_some());

        let resp = cancel(&mut e, 1, 999); // unknown id
        assert_eq!(resp.result_code, RESULT_UNKNOWN_ORDER_ID);
    }

    #[test]
    fn test_cancel_after_full_match_is_unknown() {
        let mut e = engine();
        place(&mut e, 1, 100, OrderAction::Ask, OrderType::Gtc, 1000, 10);
        place(&mut e, 2, 101, OrderAction::Bid, OrderType::Ioc, 1000, 10);

        let resp = cancel(&mut e, 1, 100);
        assert_eq!(resp.result_code, RESULT_UNKNOWN_ORDER_ID);
    }

    #[test]
    fn test_reduce_partial_and_full() {
        let mut e = engine();
        place(&mut e, 1, 100, OrderAction::Bid, OrderType::Gtc, 1000, 10);

        let resp = reduce(&mut e, 1, 100, 4);
        assert!(resp.is_successful());
        assert!(!resp.taker_completed);
        assert_eq!(resp.reduce_event.unwrap().reduced_volume, 4);
        assert_eq!(resp.remaining_size, Some(6));
        assert_eq!(e.total_orders_volume(OrderAction::Bid), 6);
        e.verify_internal_state().unwrap();

        // reducing by more than remaining removes the order
        let resp = reduce(&mut e, 1, 100, 100);
        assert!(resp.taker_completed);
        assert_eq!(resp.reduce_event.unwrap().reduced_volume, 6);
        assert_eq!(e.book.resting_orders(), 0);
        e.verify_internal_state().unwrap();
    }

    #[test]
    fn test_reduce_rejects_non_positive_size() {
        let mut e = engine();
        place(&mut e, 1, 100, OrderAction::Bid, OrderType::Gtc, 1000, 10);

        let mut cmd = BufferWriter::with_capacity(32);
        encode_reduce_order(&mut cmd, 1, 100, 0);
        e.clear_response();
        e.reduce_order(cmd.as_slice(), 0);
        let word = BufferReader::new(e.response(), 0)
            .short_at(e.response().len() - 2) as u16;
        assert_eq!(word & crate::command::RESULT_MASK, RESULT_INCORRECT_REDUCE_SIZE);
        assert_eq!(e.total_orders_volume(OrderAction::Bid), 10);
    }

    #[test]
    fn test_reduce_unknown_order() {
        let mut e = engine();
        let resp = reduce(&mut e, 1, 42, 5);
        assert_eq!(resp.result_code, RESULT_UNKNOWN_ORDER_ID);
    }

    #[test]
    fn test_move_rehomes_without_matching() {
        let mut e = engine();
        place(&mut e, 1, 100, OrderAction::Ask, OrderType::Gtc, 1000, 10);

        let resp = move_to(&mut e, 1, 100, 1005);
        assert!(resp.is_successful());
        assert!(!resp.taker_completed);
        assert_eq!(resp.remaining_size, Some(10));
        assert!(resp.trade_events.is_empty());
        assert_eq!(e.order_by_id(100).unwrap().price, 1005);
        e.verify_internal_state().unwrap();
    }

    #[test]
    fn test_move_matches_at_new_price() {
        let mut e = engine();
        place(&mut e, 1, 100, OrderAction::Ask, OrderType::Gtc, 1010, 10);
        place_reserve(&mut e, 2, 200, OrderAction::Bid, OrderType::Gtc, 1000, 1020, 10);

        // moving the ask down to 1000 crosses the resting bid completely
        let resp = move_to(&mut e, 1, 100, 1000);
        assert!(resp.taker_completed);
        assert_eq!(resp.trade_events.len(), 1);
        assert_eq!(resp.trade_events[0].maker_order_id, 200);
        assert_eq!(resp.trade_events[0].trade_volume, 10);
        assert_eq!(e.book.resting_orders(), 0);
        e.verify_internal_state().unwrap();
    }

    #[test]
    fn test_move_bid_over_reserve_price_fails_on_exchange_symbol() {
        let mut e = engine();
        place_reserve(&mut e, 1, 100, OrderAction::Bid, OrderType::Gtc, 1000, 1010, 10);

        let resp = move_to(&mut e, 1, 100, 1011);
        assert_eq!(
            resp.result_code,
            RESULT_MOVE_FAILED_PRICE_OVER_RISK_LIMIT
        );
        assert!(!resp.taker_completed);
        assert_eq!(resp.remaining_size, Some(10));
        // order unchanged
        assert_eq!(e.order_by_id(100).unwrap().price, 1000);
        e.verify_internal_state().unwrap();
    }

    #[test]
    fn test_move_bid_over_reserve_allowed_on_non_exchange_symbol() {
        let symbol = SimpleSymbolSpec {
            symbol_id: 1,
            exchange_type: false,
        };
        let mut e = MatchingEngine::with_capacity(symbol, 64, 4096);
        place_reserve(&mut e, 1, 100, OrderAction::Bid, OrderType::Gtc, 1000, 1010, 10);

        let resp = move_to(&mut e, 1, 100, 1050);
        assert!(resp.is_successful());
        assert_eq!(e.order_by_id(100).unwrap().price, 1050);
    }

    #[test]
    fn test_move_loses_time_priority() {
        let mut e = engine();
        place(&mut e, 1, 100, OrderAction::Ask, OrderType::Gtc, 1000, 10);
        place(&mut e, 2, 101, OrderAction::Ask, OrderType::Gtc, 1000, 10);

        // move the first order to its own price - it re-queues at the tail
        move_to(&mut e, 1, 100, 1000);
        let ids: Vec<u64> = e.ask_orders().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![101, 100]);
        e.verify_internal_state().unwrap();
    }

    #[test]
    fn test_find_user_orders_scans_both_sides() {
        let mut e = engine();
        place(&mut e, 1, 100, OrderAction::Ask, OrderType::Gtc, 1010, 10);
        place(&mut e, 2, 101, OrderAction::Ask, OrderType::Gtc, 1011, 10);
        place(&mut e, 1, 102, OrderAction::Bid, OrderType::Gtc, 990, 10);

        let orders = e.find_user_orders(1);
        let ids: Vec<u64> = orders.iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![100, 102]);
        assert!(e.find_user_orders(42).is_empty());
    }

    #[test]
    fn test_state_hash_replicas_agree() {
        let mut a = engine();
        let mut b = engine();
        let orders = [
            (100u64, OrderAction::Ask, 1010i64),
            (101, OrderAction::Bid, 990),
            (102, OrderAction::Ask, 1011),
            (103, OrderAction::Bid, 991),
        ];
        for &(id, action, price) in &orders {
            place(&mut a, 1, id, action, OrderType::Gtc, price, 10);
            place(&mut b, 1, id, action, OrderType::Gtc, price, 10);
        }
        assert_eq!(a.state_hash(), b.state_hash());

        cancel(&mut a, 1, 100);
        assert_ne!(a.state_hash(), b.state_hash());
        cancel(&mut b, 1, 100);
        assert_eq!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_state_hash_depends_on_symbol() {
        let a = MatchingEngine::with_capacity(
            SimpleSymbolSpec {
                symbol_id: 1,
                exchange_type: true,
            },
            64,
            1024,
        );
        let b = MatchingEngine::with_capacity(
            SimpleSymbolSpec {
                symbol_id: 2,
                exchange_type: true,
            },
            64,
            1024,
        );
        assert_ne!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_l2_snapshot_struct() {
        let mut e = engine();
        place(&mut e, 1, 1, OrderAction::Ask, OrderType::Gtc, 1010, 5);
        place(&mut e, 1, 2, OrderAction::Ask, OrderType::Gtc, 1000, 3);
        place(&mut e, 1, 3, OrderAction::Bid, OrderType::Gtc, 990, 7);

        let data = e.full_l2_snapshot();
        assert_eq!(data.ask_prices, vec![1000, 1010]);
        assert_eq!(data.ask_volumes, vec![3, 5]);
        assert_eq!(data.bid_prices, vec![990]);
        assert_eq!(data.bid_orders, vec![1]);

        let top = e.l2_market_data_snapshot(1);
        assert_eq!(top.ask_prices, vec![1000]);
        assert_eq!(top.bid_prices, vec![990]);
    }
}
