//! # Matchbook
//!
//! A deterministic single-symbol limit order book matching engine with a
//! binary command/response protocol.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: one engine per symbol, owned by one thread, every
//!   command runs to completion (no locks, no async)
//! - **Price-Time Priority**: ordered price levels, strict FIFO within a
//!   level
//! - **Dual Indexing**: price-ordered sides plus an order-id index, kept
//!   consistent under every mutation
//! - **Arena Allocation**: resting orders live in a pre-sized slab with
//!   free-list recycling
//! - **Deterministic**: replicas fed the same command stream produce
//!   byte-identical responses and equal state hashes
//!
//! ## Architecture
//!
//! ```text
//! [Runtime] --commands--> [Engine (dispatch)] --> [MatchingEngine]
//!                                                    |        |
//!                                              [OrderBook] [Arena]
//!                                                    |
//!                                         [response buffer: events]
//! ```

pub mod arena;
pub mod buffer;
pub mod command;
pub mod engine;
pub mod error;
pub mod events;
pub mod l2;
pub mod matching;
pub mod order_book;
pub mod price_level;
pub mod response;
pub mod symbol;

// Re-exports for convenience
pub use arena::{Arena, ArenaIndex, OrderNode, NULL_INDEX};
pub use buffer::{BufferReader, BufferWriter};
pub use command::{OrderAction, OrderType};
pub use engine::Engine;
pub use error::EngineError;
pub use events::{ReduceEvent, TradeEvent};
pub use l2::L2MarketData;
pub use matching::MatchingEngine;
pub use order_book::OrderBook;
pub use price_level::PriceLevel;
pub use response::{decode_l2_snapshot, decode_response, CommandResponse, L2SnapshotResponse};
pub use symbol::{SimpleSymbolSpec, SymbolSpec};
