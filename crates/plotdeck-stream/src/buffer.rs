//! Bounded, ordered in-memory store of recently delivered messages.
//!
//! The buffer never exceeds `max_events`: inserting at capacity evicts the
//! entry at the opposite end. Feed consumers read newest-first; streaming
//! text consumers read sequence-ascending. Duplicate ids are kept out by
//! the router's dedup window before insertion ever happens.

use std::collections::VecDeque;

use crate::message::StreamMessage;

/// Ordering policy for buffered messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOrder {
    /// Newest entries first; eviction drops the oldest (feed mode).
    NewestFirst,
    /// Ascending by `sequence`; eviction drops the lowest (stream mode).
    SequenceAscending,
}

/// Bounded ordered store of [`StreamMessage`]s.
#[derive(Debug)]
pub struct EventBuffer {
    entries: VecDeque<StreamMessage>,
    max_events: usize,
    order: BufferOrder,
}

impl EventBuffer {
    /// Create a buffer holding at most `max_events` entries.
    pub fn new(max_events: usize, order: BufferOrder) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_events.min(1024)),
            max_events,
            order,
        }
    }

    /// Insert a message, evicting from the opposite end at capacity.
    pub fn insert(&mut self, message: StreamMessage) {
        match self.order {
            BufferOrder::NewestFirst => {
                self.entries.push_front(message);
                if self.entries.len() > self.max_events {
                    self.entries.pop_back();
                }
            }
            BufferOrder::SequenceAscending => {
                let position = self.ascending_position(message.sequence);
                self.entries.insert(position, message);
                if self.entries.len() > self.max_events {
                    self.entries.pop_front();
                }
            }
        }
    }

    /// Index at which a message with the given sequence keeps the buffer
    /// ascending; messages without a sequence append at the end.
    fn ascending_position(&self, sequence: Option<u64>) -> usize {
        let Some(sequence) = sequence else {
            return self.entries.len();
        };
        let mut position = self.entries.len();
        while position > 0 {
            match self.entries[position - 1].sequence {
                Some(existing) if existing > sequence => position -= 1,
                _ => break,
            }
        }
        position
    }

    /// An owned copy of the current contents, in buffer order.
    pub fn snapshot(&self) -> Vec<StreamMessage> {
        self.entries.iter().cloned().collect()
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer holds no messages.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all buffered messages.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelProfile;
    use serde_json::json;

    fn feed_message(id: &str) -> StreamMessage {
        StreamMessage::from_value(
            json!({"id": id, "type": "note", "title": id}),
            ChannelProfile::Feed,
        )
        .unwrap()
    }

    fn sequenced_message(id: &str, sequence: u64) -> StreamMessage {
        StreamMessage::from_value(
            json!({"id": id, "type": "delta", "title": id, "sequence": sequence}),
            ChannelProfile::Feed,
        )
        .unwrap()
    }

    #[test]
    fn test_feed_mode_keeps_newest_and_evicts_oldest() {
        let mut buffer = EventBuffer::new(5, BufferOrder::NewestFirst);
        for n in 1..=10 {
            buffer.insert(feed_message(&format!("evt-{n}")));
            assert!(buffer.len() <= 5);
        }

        let ids: Vec<_> = buffer.snapshot().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["evt-10", "evt-9", "evt-8", "evt-7", "evt-6"]);
    }

    #[test]
    fn test_stream_mode_orders_by_sequence() {
        let mut buffer = EventBuffer::new(10, BufferOrder::SequenceAscending);
        for sequence in [3u64, 1, 2, 5, 4] {
            buffer.insert(sequenced_message(&format!("chunk-{sequence}"), sequence));
        }

        let sequences: Vec<_> = buffer
            .snapshot()
            .into_iter()
            .map(|m| m.sequence.unwrap())
            .collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_stream_mode_evicts_lowest_sequence() {
        let mut buffer = EventBuffer::new(3, BufferOrder::SequenceAscending);
        for sequence in 1..=5u64 {
            buffer.insert(sequenced_message(&format!("chunk-{sequence}"), sequence));
        }

        let sequences: Vec<_> = buffer
            .snapshot()
            .into_iter()
            .map(|m| m.sequence.unwrap())
            .collect();
        assert_eq!(sequences, vec![3, 4, 5]);
    }

    #[test]
    fn test_stream_mode_without_sequence_appends() {
        let mut buffer = EventBuffer::new(10, BufferOrder::SequenceAscending);
        buffer.insert(sequenced_message("chunk-1", 1));
        buffer.insert(feed_message("tail"));
        buffer.insert(sequenced_message("chunk-2", 2));

        let ids: Vec<_> = buffer.snapshot().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["chunk-1", "tail", "chunk-2"]);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut buffer = EventBuffer::new(5, BufferOrder::NewestFirst);
        buffer.insert(feed_message("evt-1"));

        let snapshot = buffer.snapshot();
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(snapshot.len(), 1);
    }
}
