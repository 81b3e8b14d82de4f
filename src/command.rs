//! Wire protocol: command opcodes, order types, actions, result codes and
//! input field layouts, plus encoders for building command payloads.
//!
//! All offsets are relative to the caller-supplied base offset; integers
//! are big-endian (see [`crate::buffer`]).

use crate::buffer::BufferWriter;
use crate::error::EngineError;

/*
 * Command codes
 */
pub const COMMAND_PLACE_ORDER: u8 = 1;
pub const COMMAND_CANCEL_ORDER: u8 = 2;
pub const COMMAND_MOVE_ORDER: u8 = 3;
pub const COMMAND_REDUCE_ORDER: u8 = 4;
pub const QUERY_ORDER_BOOK: u8 = 5;

/*
 * Result codes (low 12 bits of the trailing result word)
 */
pub const RESULT_SUCCESS: u16 = 0;
pub const RESULT_UNKNOWN_ORDER_ID: u16 = 1;
pub const RESULT_UNSUPPORTED_COMMAND: u16 = 2;
pub const RESULT_INVALID_ORDER_BOOK_ID: u16 = 3;
pub const RESULT_INCORRECT_ORDER_SIZE: u16 = 4;
pub const RESULT_INCORRECT_REDUCE_SIZE: u16 = 5;
pub const RESULT_MOVE_FAILED_PRICE_OVER_RISK_LIMIT: u16 = 6;
pub const RESULT_UNSUPPORTED_ORDER_TYPE: u16 = 7;
pub const RESULT_INCORRECT_L2_SIZE_LIMIT: u16 = 8;

/// Set when the command carries a trailing reduce event.
pub const RESULT_REDUCE_EVT_FLAG: u16 = 1 << 14;
/// Set when the taker action is BID.
pub const RESULT_TAKER_ACTION_BID_FLAG: u16 = 1 << 13;
/// Set when the taker order is completed (no remaining-size field).
pub const RESULT_TAKER_ORDER_COMPLETED_FLAG: u16 = 1 << 12;
/// Mask extracting the result code from the packed word.
pub const RESULT_MASK: u16 = (1 << 12) - 1;

/*
 * Incoming message offsets
 */
pub const PLACE_OFFSET_UID: usize = 0;
pub const PLACE_OFFSET_ORDER_ID: usize = PLACE_OFFSET_UID + 8;
pub const PLACE_OFFSET_PRICE: usize = PLACE_OFFSET_ORDER_ID + 8;
pub const PLACE_OFFSET_RESERVED_BID_PRICE: usize = PLACE_OFFSET_PRICE + 8;
pub const PLACE_OFFSET_SIZE: usize = PLACE_OFFSET_RESERVED_BID_PRICE + 8;
pub const PLACE_OFFSET_USER_COOKIE: usize = PLACE_OFFSET_SIZE + 8;
pub const PLACE_OFFSET_ACTION: usize = PLACE_OFFSET_USER_COOKIE + 4;
pub const PLACE_OFFSET_TYPE: usize = PLACE_OFFSET_ACTION + 1;
pub const PLACE_OFFSET_END: usize = PLACE_OFFSET_TYPE + 1;

pub const CANCEL_OFFSET_UID: usize = 0;
pub const CANCEL_OFFSET_ORDER_ID: usize = CANCEL_OFFSET_UID + 8;
pub const CANCEL_OFFSET_END: usize = CANCEL_OFFSET_ORDER_ID + 8;

pub const REDUCE_OFFSET_UID: usize = 0;
pub const REDUCE_OFFSET_ORDER_ID: usize = REDUCE_OFFSET_UID + 8;
pub const REDUCE_OFFSET_SIZE: usize = REDUCE_OFFSET_ORDER_ID + 8;
pub const REDUCE_OFFSET_END: usize = REDUCE_OFFSET_SIZE + 8;

pub const MOVE_OFFSET_UID: usize = 0;
pub const MOVE_OFFSET_ORDER_ID: usize = MOVE_OFFSET_UID + 8;
pub const MOVE_OFFSET_PRICE: usize = MOVE_OFFSET_ORDER_ID + 8;
pub const MOVE_OFFSET_END: usize = MOVE_OFFSET_PRICE + 8;

pub const L2_QUERY_OFFSET_LIMIT: usize = 0;
pub const L2_QUERY_OFFSET_END: usize = L2_QUERY_OFFSET_LIMIT + 2;

/// Order side. ASK sells, BID buys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(u8)]
pub enum OrderAction {
    Ask = 0,
    Bid = 1,
}

impl OrderAction {
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            OrderAction::Ask => OrderAction::Bid,
            OrderAction::Bid => OrderAction::Ask,
        }
    }

    #[inline]
    pub fn from_byte(code: u8) -> Result<Self, EngineError> {
        match code {
            0 => Ok(OrderAction::Ask),
            1 => Ok(OrderAction::Bid),
            other => Err(EngineError::InvalidOrderAction(other)),
        }
    }

    #[inline]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Order type determines the matching flow of a PLACE command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OrderType {
    /// Good till Cancel - regular limit order, remainder rests in the book.
    #[default]
    Gtc = 0,
    /// Immediate or Cancel with a per-unit price cap.
    Ioc = 1,
    /// Immediate or Cancel with a total-cash cap. Reserved, not implemented.
    IocBudget = 2,
    /// Fill or Kill with a per-unit price cap.
    Fok = 3,
    /// Fill or Kill with a total-cash cap.
    FokBudget = 4,
}

impl OrderType {
    #[inline]
    pub fn from_byte(code: u8) -> Result<Self, EngineError> {
        match code {
            0 => Ok(OrderType::Gtc),
            1 => Ok(OrderType::Ioc),
            2 => Ok(OrderType::IocBudget),
            3 => Ok(OrderType::Fok),
            4 => Ok(OrderType::FokBudget),
            other => Err(EngineError::UnsupportedOrderType(other)),
        }
    }

    #[inline]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Encode a PLACE payload at the writer's current position.
#[allow(clippy::too_many_arguments)]
pub fn encode_place_order(
    writer: &mut BufferWriter,
    uid: u64,
    order_id: u64,
    price: i64,
    reserve_bid_price: i64,
    size: i64,
    user_cookie: i32,
    action: OrderAction,
    order_type: OrderType,
) {
    writer.append_long(uid as i64);
    writer.append_long(order_id as i64);
    writer.append_long(price);
    writer.append_long(reserve_bid_price);
    writer.append_long(size);
    writer.append_int(user_cookie);
    writer.append_byte(action.to_byte());
    writer.append_byte(order_type.to_byte());
}

/// Encode a CANCEL payload.
pub fn encode_cancel_order(writer: &mut BufferWriter, uid: u64, order_id: u64) {
    writer.append_long(uid as i64);
    writer.append_long(order_id as i64);
}

/// Encode a REDUCE payload.
pub fn encode_reduce_order(writer: &mut BufferWriter, uid: u64, order_id: u64, reduce_size: i64) {
    writer.append_long(uid as i64);
    writer.append_long(order_id as i64);
    writer.append_long(reduce_size);
}

/// Encode a MOVE payload.
pub fn encode_move_order(writer: &mut BufferWriter, uid: u64, order_id: u64, new_price: i64) {
    writer.append_long(uid as i64);
    writer.append_long(order_id as i64);
    writer.append_long(new_price);
}

/// Encode an L2 query payload. A non-positive limit means unlimited depth.
pub fn encode_l2_query(writer: &mut BufferWriter, limit: i16) {
    writer.append_short(limit);
}
