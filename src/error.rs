//! Fatal engine errors.
//!
//! Recoverable command failures (unknown order id, bad sizes, risk-limit
//! rejections) are reported as result codes inside the response and never
//! surface here. `EngineError` covers the tier that must abort the current
//! command and be escalated to the runtime.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("unsupported order type: {0}")]
    UnsupportedOrderType(u8),

    #[error("invalid order action byte: {0}")]
    InvalidOrderAction(u8),

    #[error("unknown command type: {0}")]
    UnknownCommandType(u8),

    #[error("order {order_id} expected to match completely, filled {filled} of {size}")]
    IncompleteFill {
        order_id: u64,
        filled: u64,
        size: u64,
    },

    #[error("corrupted state: {0}")]
    CorruptedState(String),

    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),
}
