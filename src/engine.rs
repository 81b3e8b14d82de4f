//! Engine - command dispatch over the binary protocol.
//!
//! The surrounding runtime serializes commands for one symbol and hands
//! each to [`Engine::process`] as `(buffer, offset, timestamp)`, where the
//! byte at `offset` is the command opcode and the payload follows. The
//! response accumulates in the engine's buffer until the caller drains it.

use crate::command::{
    COMMAND_CANCEL_ORDER, COMMAND_MOVE_ORDER, COMMAND_PLACE_ORDER, COMMAND_REDUCE_ORDER,
    QUERY_ORDER_BOOK,
};
use crate::error::EngineError;
use crate::matching::MatchingEngine;
use crate::symbol::{SimpleSymbolSpec, SymbolSpec};

/// Opcode dispatch wrapper around the matching core.
pub struct Engine<S: SymbolSpec> {
    pub matcher: MatchingEngine<S>,
}

impl<S: SymbolSpec> Engine<S> {
    pub fn new(symbol: S) -> Self {
        Self {
            matcher: MatchingEngine::new(symbol),
        }
    }

    pub fn with_capacity(symbol: S, order_capacity: u32, response_capacity: usize) -> Self {
        Self {
            matcher: MatchingEngine::with_capacity(symbol, order_capacity, response_capacity),
        }
    }

    /// Route one command. The byte at `offset` selects the operation; the
    /// payload layout is command specific (see [`crate::command`]).
    ///
    /// An unknown opcode produces a well-formed UNSUPPORTED_COMMAND
    /// response and is not an error; `Err` is reserved for the fatal tier.
    pub fn process(
        &mut self,
        buffer: &[u8],
        offset: usize,
        timestamp: i64,
    ) -> Result<(), EngineError> {
        let command = buffer[offset];
        let payload = offset + 1;

        match command {
            COMMAND_PLACE_ORDER => self.matcher.new_order(buffer, payload, timestamp)?,
            COMMAND_CANCEL_ORDER => self.matcher.cancel_order(buffer, payload),
            COMMAND_MOVE_ORDER => self.matcher.move_order(buffer, payload),
            COMMAND_REDUCE_ORDER => self.matcher.reduce_order(buffer, payload),
            QUERY_ORDER_BOOK => self.matcher.send_l2_snapshot(buffer, payload),
            other => self.matcher.report_unsupported_command(other),
        }
        Ok(())
    }

    /// Response bytes accumulated since the last [`clear_response`].
    ///
    /// [`clear_response`]: Self::clear_response
    #[inline]
    pub fn response(&self) -> &[u8] {
        self.matcher.response()
    }

    #[inline]
    pub fn clear_response(&mut self) {
        self.matcher.clear_response();
    }

    #[inline]
    pub fn state_hash(&self) -> i32 {
        self.matcher.state_hash()
    }

    pub fn verify_internal_state(&self) -> Result<(), EngineError> {
        self.matcher.verify_internal_state()
    }

    /// Pre-fault arena pages before going live.
    pub fn warm_up(&mut self) {
        self.matcher.warm_up();
    }
}

impl Default for Engine<SimpleSymbolSpec> {
    fn default() -> Self {
        Self::new(SimpleSymbolSpec::default())
    }
}
