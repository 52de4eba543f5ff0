//! Id and sequence number sources.
//!
//! Target ids handed out by the target cache are even; ids handed out by a
//! sync engine for limbo resolution are odd, so the two generators never
//! collide.

use synccache_types::{ListenSequenceNumber, TargetId};

/// Which id space a [`TargetIdGenerator`] allocates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Generator {
    TargetCache = 0,
    SyncEngine = 1,
}

/// Allocates strictly increasing target ids of one parity.
#[derive(Debug, Clone)]
pub struct TargetIdGenerator {
    next: i32,
}

impl TargetIdGenerator {
    /// Generator for ids persisted in the target cache, starting above `after`.
    pub fn for_target_cache(after: TargetId) -> Self {
        Self::seeded(Generator::TargetCache, after)
    }

    /// Generator for limbo-resolution targets, starting above `after`.
    pub fn for_sync_engine(after: TargetId) -> Self {
        Self::seeded(Generator::SyncEngine, after)
    }

    fn seeded(generator: Generator, after: TargetId) -> Self {
        let after = after.value().max(0);
        let mut next = (after & !1) | generator as i32;
        if next <= after {
            next += 2;
        }
        Self { next }
    }

    /// Returns the next id.
    pub fn next_id(&mut self) -> TargetId {
        let id = TargetId::new(self.next);
        self.next += 2;
        id
    }
}

/// Hands out listen sequence numbers after a starting point.
#[derive(Debug, Clone)]
pub struct ListenSequence {
    previous: ListenSequenceNumber,
}

impl ListenSequence {
    /// Creates a source whose first number is `previous + 1`.
    pub fn new(previous: ListenSequenceNumber) -> Self {
        Self { previous }
    }

    /// Returns the next sequence number.
    pub fn next_sequence_number(&mut self) -> ListenSequenceNumber {
        self.previous = ListenSequenceNumber::new(self.previous.value() + 1);
        self.previous
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_target_cache_ids_are_even_and_increasing() {
        let mut generator = TargetIdGenerator::for_target_cache(TargetId::new(0));
        assert_eq!(generator.next_id(), TargetId::new(2));
        assert_eq!(generator.next_id(), TargetId::new(4));
    }

    #[test]
    fn test_target_cache_ids_skip_past_seed() {
        let mut from_even = TargetIdGenerator::for_target_cache(TargetId::new(6));
        assert_eq!(from_even.next_id(), TargetId::new(8));

        let mut from_odd = TargetIdGenerator::for_target_cache(TargetId::new(7));
        assert_eq!(from_odd.next_id(), TargetId::new(8));
    }

    #[test]
    fn test_sync_engine_ids_are_odd() {
        let mut generator = TargetIdGenerator::for_sync_engine(TargetId::new(0));
        assert_eq!(generator.next_id(), TargetId::new(1));
        assert_eq!(generator.next_id(), TargetId::new(3));

        let mut seeded = TargetIdGenerator::for_sync_engine(TargetId::new(5));
        assert_eq!(seeded.next_id(), TargetId::new(7));
    }

    #[test]
    fn test_listen_sequence_continues_after_previous() {
        let mut sequence = ListenSequence::new(ListenSequenceNumber::new(41));
        assert_eq!(sequence.next_sequence_number().value(), 42);
        assert_eq!(sequence.next_sequence_number().value(), 43);
    }
}
