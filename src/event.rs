// src/event.rs

/// ===============================
/// Engine-side step events
/// ===============================

/// A note event produced by the step evaluator.
///
/// These events:
/// - are RT-safe (Copy, no heap)
/// - carry a sample-accurate offset within the current audio block
/// - are dispatched to the consumer exactly once, in emission order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    NoteOn {
        note: u8,
        velocity: u8,
        /// Sample offset within the current block.
        offset: usize,
        /// True only for slide transitions: the consumer must glide the
        /// predecessor voice to `note` without retriggering its envelope.
        legato: bool,
    },

    NoteOff {
        note: u8,
        /// Sample offset within the current block.
        offset: usize,
    },
}

impl StepEvent {
    /// Sample offset within the block, regardless of kind.
    #[inline]
    pub fn offset(&self) -> usize {
        match self {
            StepEvent::NoteOn { offset, .. } => *offset,
            StepEvent::NoteOff { offset, .. } => *offset,
        }
    }
}

/// ===============================
/// Bounded output buffer
/// ===============================

/// Reusable event buffer the evaluator appends to.
///
/// Capacity is fixed at construction and never grows afterwards; a push
/// past capacity is dropped. The owner clears it once per block.
#[derive(Debug)]
pub struct EventBuffer {
    events: Vec<StepEvent>,
    capacity: usize,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an event. Silently dropped when full (bounded work per tick).
    #[inline]
    pub fn push(&mut self, event: StepEvent) {
        if self.events.len() < self.capacity {
            self.events.push(event);
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
    }

    #[inline]
    pub fn events(&self) -> &[StepEvent] {
        &self.events
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_drops_past_capacity() {
        let mut buf = EventBuffer::new(2);
        for note in 0..4 {
            buf.push(StepEvent::NoteOff { note, offset: 0 });
        }
        assert_eq!(buf.len(), 2);

        buf.clear();
        assert!(buf.is_empty());
        buf.push(StepEvent::NoteOff { note: 9, offset: 3 });
        assert_eq!(buf.events()[0].offset(), 3);
    }
}
