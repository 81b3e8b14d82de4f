//! Response decoder - parses a response buffer back into its header, trade
//! events, reduce event and result flags.
//!
//! Responses are parsed tail-first: the trailing result word says whether a
//! remaining-size field and a reduce event are present, and everything
//! between the header and that tail is the trade-event block (PLACE and
//! MOVE only).

use serde::Serialize;

use crate::buffer::BufferReader;
use crate::command::{
    OrderAction, COMMAND_CANCEL_ORDER, COMMAND_MOVE_ORDER, COMMAND_PLACE_ORDER,
    COMMAND_REDUCE_ORDER, QUERY_ORDER_BOOK, RESULT_MASK, RESULT_REDUCE_EVT_FLAG, RESULT_SUCCESS,
    RESULT_TAKER_ACTION_BID_FLAG, RESULT_TAKER_ORDER_COMPLETED_FLAG,
};
use crate::error::EngineError;
use crate::events::{
    ReduceEvent, TradeEvent, L2_RECORD_END, L2_RECORD_OFFSET_ORDERS, L2_RECORD_OFFSET_PRICE,
    L2_RECORD_OFFSET_VOLUME, REVT_END, REVT_OFFSET_PRICE, REVT_OFFSET_REDUCED_VOL,
    REVT_OFFSET_RESERV_BID_PRICE, TEVT_END, TEVT_OFFSET_MAKER_ORDER_COMPLETED,
    TEVT_OFFSET_MAKER_ORDER_ID, TEVT_OFFSET_MAKER_UID, TEVT_OFFSET_PRICE,
    TEVT_OFFSET_RESERV_BID_PRICE, TEVT_OFFSET_TRADE_VOL,
};

/// Decoded response of one PLACE/CANCEL/MOVE/REDUCE command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandResponse {
    pub command: u8,
    pub result_code: u16,
    pub uid: u64,
    pub order_id: u64,
    /// Present for PLACE responses only.
    pub user_cookie: Option<i32>,
    pub taker_action: OrderAction,
    pub taker_completed: bool,
    /// Present when the taker is not completed.
    pub remaining_size: Option<u64>,
    pub trade_events: Vec<TradeEvent>,
    pub reduce_event: Option<ReduceEvent>,
}

impl CommandResponse {
    #[inline]
    pub fn is_successful(&self) -> bool {
        self.result_code == RESULT_SUCCESS
    }
}

/// Decode one command response occupying the whole slice.
pub fn decode_response(buffer: &[u8]) -> Result<CommandResponse, EngineError> {
    let mut reader = BufferReader::new(buffer, 0);

    let command = reader.read_byte();
    let uid = reader.read_long() as u64;
    let order_id = reader.read_long() as u64;

    let user_cookie = match command {
        COMMAND_PLACE_ORDER => Some(reader.read_int()),
        COMMAND_CANCEL_ORDER | COMMAND_MOVE_ORDER | COMMAND_REDUCE_ORDER => None,
        other => return Err(EngineError::UnknownCommandType(other)),
    };

    let header_end = 1 + 8 + 8 + if user_cookie.is_some() { 4 } else { 0 };
    let msg_size = reader.size();
    if msg_size < header_end + 2 {
        return Err(EngineError::MalformedResponse("response shorter than header"));
    }

    let encoded_result = reader.short_at(msg_size - 2) as u16;
    let has_reduce_event = encoded_result & RESULT_REDUCE_EVT_FLAG != 0;
    let taker_action = if encoded_result & RESULT_TAKER_ACTION_BID_FLAG != 0 {
        OrderAction::Bid
    } else {
        OrderAction::Ask
    };
    let taker_completed = encoded_result & RESULT_TAKER_ORDER_COMPLETED_FLAG != 0;
    let result_code = encoded_result & RESULT_MASK;

    let remaining_size = if taker_completed {
        None
    } else {
        Some(reader.long_at(msg_size - (2 + 8)) as u64)
    };

    let tail = 2 + if taker_completed { 0 } else { 8 };
    let (reduce_event, reduce_start) = if has_reduce_event {
        let start = msg_size - (tail + REVT_END);
        (Some(read_reduce_event(&reader, start)), start)
    } else {
        (None, msg_size - tail)
    };

    let trade_events = match command {
        COMMAND_PLACE_ORDER | COMMAND_MOVE_ORDER => {
            let block_len = reduce_start - header_end;
            let mut events = Vec::with_capacity(block_len / TEVT_END);
            let mut offset = header_end;
            while offset < reduce_start {
                events.push(read_trade_event(&reader, offset));
                offset += TEVT_END;
            }
            events
        }
        _ => Vec::new(),
    };

    Ok(CommandResponse {
        command,
        result_code,
        uid,
        order_id,
        user_cookie,
        taker_action,
        taker_completed,
        remaining_size,
        trade_events,
        reduce_event,
    })
}

fn read_trade_event(reader: &BufferReader<'_>, offset: usize) -> TradeEvent {
    TradeEvent {
        maker_order_id: reader.long_at(offset + TEVT_OFFSET_MAKER_ORDER_ID) as u64,
        maker_uid: reader.long_at(offset + TEVT_OFFSET_MAKER_UID) as u64,
        price: reader.long_at(offset + TEVT_OFFSET_PRICE),
        reserved_bid_price: reader.long_at(offset + TEVT_OFFSET_RESERV_BID_PRICE),
        trade_volume: reader.long_at(offset + TEVT_OFFSET_TRADE_VOL) as u64,
        maker_order_completed: reader.byte_at(offset + TEVT_OFFSET_MAKER_ORDER_COMPLETED) != 0,
    }
}

fn read_reduce_event(reader: &BufferReader<'_>, offset: usize) -> ReduceEvent {
    ReduceEvent {
        price: reader.long_at(offset + REVT_OFFSET_PRICE),
        reserved_bid_price: reader.long_at(offset + REVT_OFFSET_RESERV_BID_PRICE),
        reduced_volume: reader.long_at(offset + REVT_OFFSET_REDUCED_VOL) as u64,
    }
}

/// One aggregated depth level from an L2 response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct L2Record {
    pub price: i64,
    pub volume: u64,
    pub orders: u32,
}

/// Decoded QUERY_ORDER_BOOK response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct L2SnapshotResponse {
    pub result_code: u16,
    pub asks: Vec<L2Record>,
    pub bids: Vec<L2Record>,
}

/// Decode an L2 snapshot response occupying the whole slice.
pub fn decode_l2_snapshot(buffer: &[u8]) -> Result<L2SnapshotResponse, EngineError> {
    let reader = BufferReader::new(buffer, 0);
    let msg_size = reader.size();
    if msg_size < 11 {
        return Err(EngineError::MalformedResponse("l2 response shorter than trailer"));
    }

    let result_code = reader.short_at(msg_size - 2) as u16;
    let bid_count = reader.int_at(msg_size - 6) as usize;
    let ask_count = reader.int_at(msg_size - 10) as usize;
    let command = reader.byte_at(msg_size - 11);
    if command != QUERY_ORDER_BOOK {
        return Err(EngineError::UnknownCommandType(command));
    }
    if (ask_count + bid_count) * L2_RECORD_END != msg_size - 11 {
        return Err(EngineError::MalformedResponse("l2 record count mismatch"));
    }

    let read_record = |offset: usize| L2Record {
        price: reader.long_at(offset + L2_RECORD_OFFSET_PRICE),
        volume: reader.long_at(offset + L2_RECORD_OFFSET_VOLUME) as u64,
        orders: reader.int_at(offset + L2_RECORD_OFFSET_ORDERS) as u32,
    };

    let asks = (0..ask_count)
        .map(|i| read_record(i * L2_RECORD_END))
        .collect();
    let bids = (0..bid_count)
        .map(|i| read_record((ask_count + i) * L2_RECORD_END))
        .collect();

    Ok(L2SnapshotResponse {
        result_code,
        asks,
        bids,
    })
}
