//! Price level - a FIFO queue of resting orders at a single price.
//!
//! Implements a doubly-linked list of arena indices for O(1) append,
//! pop-from-head during matching, and removal from arbitrary position
//! during cancel/move. Tracks aggregate remaining volume and order count.

use crate::arena::{Arena, ArenaIndex, OrderNode, NULL_INDEX};
use crate::buffer::BufferWriter;
use crate::command::OrderAction;
use crate::error::EngineError;
use crate::events;

/// All resting orders at one price on one side, in arrival order.
#[derive(Clone, Copy, Debug, Default)]
pub struct PriceLevel {
    /// Index of the oldest order (first to match).
    pub head: ArenaIndex,
    /// Index of the newest order (last to match).
    pub tail: ArenaIndex,
    /// Sum of remaining (unfilled) lots across all orders at this level.
    pub total_volume: u64,
    /// Number of orders at this level.
    pub num_orders: u32,
}

impl PriceLevel {
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: NULL_INDEX,
            tail: NULL_INDEX,
            total_volume: 0,
            num_orders: 0,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.num_orders == 0
    }

    /// Append an order to the tail of the queue.
    ///
    /// The order's remaining must be positive and its price must match the
    /// level this bucket is keyed under.
    pub fn push_back(&mut self, arena: &mut Arena, index: ArenaIndex) {
        let remaining = arena.get(index).remaining();
        debug_assert!(remaining > 0, "resting order must have remaining volume");

        if self.tail == NULL_INDEX {
            debug_assert!(self.head == NULL_INDEX);
            self.head = index;
            self.tail = index;
            let node = arena.get_mut(index);
            node.prev = NULL_INDEX;
            node.next = NULL_INDEX;
        } else {
            arena.get_mut(self.tail).next = index;
            let node = arena.get_mut(index);
            node.prev = self.tail;
            node.next = NULL_INDEX;
            self.tail = index;
        }

        self.num_orders += 1;
        self.total_volume += remaining;
    }

    /// Remove and return the head order. The record is NOT freed from the
    /// arena; the caller owns that step.
    pub fn pop_front(&mut self, arena: &mut Arena) -> Option<ArenaIndex> {
        if self.head == NULL_INDEX {
            return None;
        }

        let index = self.head;
        let node = arena.get(index);
        let next_idx = node.next;
        let remaining = node.remaining();

        if next_idx == NULL_INDEX {
            self.head = NULL_INDEX;
            self.tail = NULL_INDEX;
        } else {
            self.head = next_idx;
            arena.get_mut(next_idx).prev = NULL_INDEX;
        }

        self.num_orders -= 1;
        self.total_volume -= remaining;

        let node = arena.get_mut(index);
        node.prev = NULL_INDEX;
        node.next = NULL_INDEX;

        Some(index)
    }

    /// Unlink an order from anywhere in the queue (cancel/move path).
    ///
    /// Returns `true` if the level is now empty. The record is NOT freed
    /// from the arena.
    pub fn remove(&mut self, arena: &mut Arena, index: ArenaIndex) -> bool {
        let node = arena.get(index);
        let prev_idx = node.prev;
        let next_idx = node.next;
        let remaining = node.remaining();

        if prev_idx == NULL_INDEX && next_idx == NULL_INDEX {
            debug_assert!(self.head == index && self.tail == index);
            self.head = NULL_INDEX;
            self.tail = NULL_INDEX;
        } else if prev_idx == NULL_INDEX {
            debug_assert!(self.head == index);
            self.head = next_idx;
            arena.get_mut(next_idx).prev = NULL_INDEX;
        } else if next_idx == NULL_INDEX {
            debug_assert!(self.tail == index);
            self.tail = prev_idx;
            arena.get_mut(prev_idx).next = NULL_INDEX;
        } else {
            arena.get_mut(prev_idx).next = next_idx;
            arena.get_mut(next_idx).prev = prev_idx;
        }

        self.num_orders -= 1;
        self.total_volume -= remaining;

        let node = arena.get_mut(index);
        node.prev = NULL_INDEX;
        node.next = NULL_INDEX;

        self.num_orders == 0
    }

    /// Trim the aggregate volume after an order's remaining was reduced in
    /// place (REDUCE command path).
    #[inline]
    pub fn reduce_volume(&mut self, delta: u64) {
        debug_assert!(self.total_volume >= delta);
        self.total_volume -= delta;
    }

    /// Consume makers from the FIFO head until the level empties or
    /// `volume_to_collect` is satisfied.
    ///
    /// Emits one trade event per maker touched. Fully filled makers are
    /// popped, reported through `on_remove` (so the order index stays
    /// consistent) and freed back to the arena. Returns the volume matched
    /// within this call.
    pub fn match_orders(
        &mut self,
        arena: &mut Arena,
        writer: &mut BufferWriter,
        volume_to_collect: u64,
        taker_reserve_bid_price: i64,
        mut on_remove: impl FnMut(u64),
    ) -> u64 {
        let mut collected = 0u64;

        while collected < volume_to_collect {
            let maker_idx = self.head;
            if maker_idx == NULL_INDEX {
                break;
            }

            let maker = arena.get_mut(maker_idx);
            let volume = maker.remaining().min(volume_to_collect - collected);
            maker.filled += volume;
            collected += volume;

            let full_match = maker.filled == maker.size;
            let bidder_hold_price = match maker.action {
                OrderAction::Ask => taker_reserve_bid_price,
                OrderAction::Bid => maker.reserve_bid_price,
            };
            let maker_order_id = maker.order_id;
            let maker_uid = maker.uid;
            let maker_price = maker.price;

            self.total_volume -= volume;

            events::append_trade_event(
                writer,
                maker_order_id,
                maker_uid,
                maker_price,
                bidder_hold_price,
                volume,
                full_match,
            );

            if full_match {
                self.pop_front(arena);
                on_remove(maker_order_id);
                arena.free(maker_idx);
            }
        }

        collected
    }

    /// Iterate the FIFO without consuming it.
    #[inline]
    pub fn iter<'a>(&self, arena: &'a Arena) -> LevelOrders<'a> {
        LevelOrders {
            arena,
            next: self.head,
        }
    }

    /// Check counters against the actual chain: sum of remaining equals
    /// `total_volume`, chain length equals `num_orders`, every order
    /// carries this bucket's price and positive remaining volume.
    pub fn validate(&self, arena: &Arena, price: i64) -> Result<(), EngineError> {
        let mut volume = 0u64;
        let mut count = 0u32;
        let mut prev = NULL_INDEX;
        let mut cursor = self.head;

        while cursor != NULL_INDEX {
            let node = arena.get(cursor);
            if node.prev != prev {
                return Err(EngineError::CorruptedState(format!(
                    "broken back-link at order {}",
                    node.order_id
                )));
            }
            if node.price != price {
                return Err(EngineError::CorruptedState(format!(
                    "order {} price {} differs from bucket price {}",
                    node.order_id, node.price, price
                )));
            }
            if node.remaining() == 0 {
                return Err(EngineError::CorruptedState(format!(
                    "fully filled order {} left in bucket {}",
                    node.order_id, price
                )));
            }
            volume += node.remaining();
            count += 1;
            prev = cursor;
            cursor = node.next;
        }

        if prev != self.tail {
            return Err(EngineError::CorruptedState(format!(
                "tail mismatch in bucket {price}"
            )));
        }
        if volume != self.total_volume {
            return Err(EngineError::CorruptedState(format!(
                "bucket {} volume {} != tracked {}",
                price, volume, self.total_volume
            )));
        }
        if count != self.num_orders {
            return Err(EngineError::CorruptedState(format!(
                "bucket {} count {} != tracked {}",
                price, count, self.num_orders
            )));
        }
        Ok(())
    }
}

/// FIFO-order iterator over the orders of one level.
pub struct LevelOrders<'a> {
    arena: &'a Arena,
    next: ArenaIndex,
}

impl<'a> Iterator for LevelOrders<'a> {
    type Item = &'a OrderNode;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NULL_INDEX {
            return None;
        }
        let node = self.arena.get(self.next);
        self.next = node.next;
        Some(node)
    }
}
