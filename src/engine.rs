// src/engine.rs

use std::sync::Arc;

use crate::bridge::SharedConfig;
use crate::event::{EventBuffer, StepEvent};
use crate::lane::MAX_STEPS;
use crate::selector::HeldNoteSelector;
use crate::sequencer::StepSequencer;
use crate::step_clock::StepClock;
use crate::voice_bank::EventConsumer;

/// Real-time arpeggiator engine.
///
/// This struct runs exclusively on the audio thread.
/// It must be deterministic, allocation-free, and lock-free.
/// Per block it refreshes configuration from the bridge, fires the step
/// evaluator at every boundary inside the block, and forwards the emitted
/// events to the consumer in time order.
pub struct ArpEngine {
    /// The step-sequencing core (lanes + sounding state).
    sequencer: StepSequencer,

    /// Sample-domain step boundary clock.
    clock: StepClock,

    /// Held-note traversal.
    selector: HeldNoteSelector,

    /// Reused per-block output buffer.
    events: EventBuffer,

    /// Configuration written by the control thread.
    shared: Arc<SharedConfig>,

    /// Absolute sample position of the pending gate-based note-off.
    gate_off_at: Option<u64>,

    /// Velocity of the most recent held-note intake; the `input` term of
    /// the loudness formula while notes are held.
    live_loudness: Option<u8>,
}

impl ArpEngine {
    pub fn new(sample_rate: f64, shared: Arc<SharedConfig>) -> Self {
        Self {
            sequencer: StepSequencer::new(),
            clock: StepClock::new(sample_rate),
            selector: HeldNoteSelector::new(0x9E37_79B9_7F4A_7C15),
            events: EventBuffer::new(4 * MAX_STEPS),
            shared,
            gate_off_at: None,
            live_loudness: None,
        }
    }

    // -------------------------------
    // MARK: Held-note intake
    // -------------------------------

    pub fn note_on(&mut self, pitch: u8, velocity: u8) {
        self.selector.note_on(pitch);
        self.live_loudness = Some(velocity.clamp(1, 127));
    }

    pub fn note_off(&mut self, pitch: u8) {
        self.selector.note_off(pitch);
        if self.selector.held_count() == 0 {
            self.live_loudness = None;
        }
    }

    pub fn all_notes_off(&mut self) {
        self.selector.all_notes_off();
        self.live_loudness = None;
    }

    // -------------------------------
    // MARK: Block processing
    // -------------------------------

    /// Process one audio block of `frames` samples.
    ///
    /// Called once per block from the audio callback.
    /// It must not allocate or block.
    pub fn process_block(&mut self, frames: usize, consumer: &mut dyn EventConsumer) {
        self.refresh_config(consumer);
        self.events.clear();

        let block_start = self.clock.sample_position();

        while let Some(offset) = self.clock.next_step_in(frames) {
            // A pending gate-off due before this boundary fires first, so
            // the consumer always sees events in time order.
            self.flush_gate_off(block_start, block_start + offset as u64);

            let summary = self.sequencer.fire_step(offset, &mut self.selector, &mut self.events);

            // Every boundary supersedes the previous gate schedule: the
            // sounding set was just replaced, cleared, or deliberately
            // held open.
            self.gate_off_at = if summary.emitted_on
                && summary.gate < 1.0
                && !summary.hold_full_step
            {
                let gate_len = summary.gate as f64 * self.clock.step_len_samples();
                Some(block_start + offset as u64 + gate_len as u64)
            } else {
                None
            };
        }

        self.flush_gate_off(block_start, block_start + frames as u64);
        self.clock.advance_block(frames);

        for &event in self.events.events() {
            match event {
                StepEvent::NoteOn {
                    note,
                    velocity,
                    offset,
                    legato,
                } => consumer.note_on(note, velocity, offset, legato),
                StepEvent::NoteOff { note, offset } => consumer.note_off(note, offset),
            }
        }

        self.shared.publish_readback(
            self.sequencer.lane_positions(),
            self.sequencer.tie_active(),
            self.sequencer.sounding().len(),
        );
    }

    /// Full reset (transport stop/seek): lane positions, tie state, clock
    /// phase, pending gate-off. Idempotent and real-time safe.
    pub fn reset(&mut self, consumer: &mut dyn EventConsumer) {
        self.sequencer.reset();
        self.selector.reset();
        self.clock.reset();
        self.gate_off_at = None;
        consumer.all_off();
    }

    /// Emit the gate-off if its deadline falls before `before` (absolute).
    fn flush_gate_off(&mut self, block_start: u64, before: u64) {
        if let Some(at) = self.gate_off_at {
            if at < before {
                let offset = at.saturating_sub(block_start) as usize;
                self.sequencer.release_all(offset, &mut self.events);
                self.gate_off_at = None;
            }
        }
    }

    /// Pull the bridge cells into the owned lanes. Plain atomic loads,
    /// once per block; one block of staleness is fine.
    fn refresh_config(&mut self, consumer: &mut dyn EventConsumer) {
        let lengths = self.shared.lane_lengths();
        self.sequencer.set_velocity_length(lengths[0]);
        self.sequencer.set_gate_length(lengths[1]);
        self.sequencer.set_pitch_length(lengths[2]);
        self.sequencer.set_modifier_length(lengths[3]);

        for i in 0..MAX_STEPS {
            self.sequencer.set_velocity_step(i, self.shared.velocity_step(i));
            self.sequencer.set_gate_step(i, self.shared.gate_step(i));
            self.sequencer.set_pitch_step(i, self.shared.pitch_step(i));
            self.sequencer.set_modifier_step(i, self.shared.modifier_step(i));
        }

        self.sequencer.set_accent_boost(self.shared.accent_boost());
        let loudness = self.live_loudness.unwrap_or_else(|| self.shared.input_loudness());
        self.sequencer.set_input_loudness(loudness);

        self.selector.set_direction(self.shared.direction());
        self.selector.set_octaves(self.shared.octaves());
        self.selector.set_chord(self.shared.chord());

        self.clock.set_bpm(self.shared.bpm());
        self.clock.set_rate(self.shared.steps_per_beat());

        consumer.set_slide_time(self.shared.slide_time_ms());
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    #[inline]
    pub fn sample_position(&self) -> u64 {
        self.clock.sample_position()
    }

    #[inline]
    pub fn tie_active(&self) -> bool {
        self.sequencer.tie_active()
    }
}
