//! Event emitter - appends trade events, reduce events, L2 records and the
//! packed result word to the response buffer.
//!
//! Offsets are cumulative within each event; see [`crate::response`] for
//! the reverse direction.

use serde::Serialize;

use crate::buffer::BufferWriter;
use crate::command::{
    OrderAction, RESULT_MASK, RESULT_REDUCE_EVT_FLAG, RESULT_TAKER_ACTION_BID_FLAG,
    RESULT_TAKER_ORDER_COMPLETED_FLAG,
};

/*
 * Trade event layout
 */
pub const TEVT_OFFSET_MAKER_ORDER_ID: usize = 0;
pub const TEVT_OFFSET_MAKER_UID: usize = TEVT_OFFSET_MAKER_ORDER_ID + 8;
pub const TEVT_OFFSET_PRICE: usize = TEVT_OFFSET_MAKER_UID + 8;
pub const TEVT_OFFSET_RESERV_BID_PRICE: usize = TEVT_OFFSET_PRICE + 8;
pub const TEVT_OFFSET_TRADE_VOL: usize = TEVT_OFFSET_RESERV_BID_PRICE + 8;
pub const TEVT_OFFSET_MAKER_ORDER_COMPLETED: usize = TEVT_OFFSET_TRADE_VOL + 8;
pub const TEVT_END: usize = TEVT_OFFSET_MAKER_ORDER_COMPLETED + 1;

/*
 * Reduce event layout
 */
pub const REVT_OFFSET_PRICE: usize = 0;
pub const REVT_OFFSET_RESERV_BID_PRICE: usize = REVT_OFFSET_PRICE + 8;
pub const REVT_OFFSET_REDUCED_VOL: usize = REVT_OFFSET_RESERV_BID_PRICE + 8;
pub const REVT_END: usize = REVT_OFFSET_REDUCED_VOL + 8;

/*
 * L2 record layout
 */
pub const L2_RECORD_OFFSET_PRICE: usize = 0;
pub const L2_RECORD_OFFSET_VOLUME: usize = L2_RECORD_OFFSET_PRICE + 8;
pub const L2_RECORD_OFFSET_ORDERS: usize = L2_RECORD_OFFSET_VOLUME + 8;
pub const L2_RECORD_END: usize = L2_RECORD_OFFSET_ORDERS + 4;

/// One maker consumed during a match (decoded form).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TradeEvent {
    pub maker_order_id: u64,
    pub maker_uid: u64,
    /// Execution price (the maker's price).
    pub price: i64,
    /// The bidder's hold price: the maker's reserve when the maker is a
    /// BID, otherwise the taker's submitted reserve.
    pub reserved_bid_price: i64,
    pub trade_volume: u64,
    pub maker_order_completed: bool,
}

/// Volume removed from potential execution (decoded form). Emitted at most
/// once per command: cancel, IOC leftover, FOK rejection, reduce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ReduceEvent {
    pub price: i64,
    pub reserved_bid_price: i64,
    pub reduced_volume: u64,
}

/// Append one trade event for a consumed maker.
pub fn append_trade_event(
    writer: &mut BufferWriter,
    maker_order_id: u64,
    maker_uid: u64,
    price: i64,
    reserved_bid_price: i64,
    trade_volume: u64,
    maker_order_completed: bool,
) {
    writer.append_long(maker_order_id as i64);
    writer.append_long(maker_uid as i64);
    writer.append_long(price);
    writer.append_long(reserved_bid_price);
    writer.append_long(trade_volume as i64);
    writer.append_byte(maker_order_completed as u8);
}

/// Append the command's reduce event.
pub fn append_reduce_event(
    writer: &mut BufferWriter,
    price: i64,
    reserved_bid_price: i64,
    reduced_volume: u64,
) {
    writer.append_long(price);
    writer.append_long(reserved_bid_price);
    writer.append_long(reduced_volume as i64);
}

/// Append one aggregated L2 depth record.
pub fn add_l2_record(writer: &mut BufferWriter, price: i64, volume: u64, num_orders: u32) {
    writer.append_long(price);
    writer.append_long(volume as i64);
    writer.append_int(num_orders as i32);
}

/// Terminate a response with the packed result word: result code in the
/// low 12 bits, taker-completed at bit 12, taker-is-BID at bit 13,
/// reduce-event-present at bit 14.
pub fn fill_result_code(
    writer: &mut BufferWriter,
    result_code: u16,
    taker_completed: bool,
    taker_action: OrderAction,
    reduce_event_present: bool,
) {
    let mut word = result_code & RESULT_MASK;
    if taker_completed {
        word |= RESULT_TAKER_ORDER_COMPLETED_FLAG;
    }
    if taker_action == OrderAction::Bid {
        word |= RESULT_TAKER_ACTION_BID_FLAG;
    }
    if reduce_event_present {
        word |= RESULT_REDUCE_EVT_FLAG;
    }
    writer.append_short(word as i16);
}
