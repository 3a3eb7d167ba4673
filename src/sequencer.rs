// src/sequencer.rs
//
// The per-tick step evaluator.
//
// Runs exclusively on the audio thread, once per step boundary. It must be
// deterministic, allocation-free, and lock-free. Each tick reads one value
// from each of the four lanes, reduces the modifier byte against the
// current sounding state, and appends 0..=2 events per voice to the output
// buffer (off for the old note and/or on for the new one).

use crate::event::{EventBuffer, StepEvent};
use crate::lane::Lane;
use crate::modifier::{self, StepOutcome, DEFAULT_STEP};
use crate::selector::NoteSelector;
use crate::sounding::{SoundingNotes, MAX_SOUNDING};

/// What the engine needs to know about a fired step, beyond its events.
#[derive(Debug, Clone, Copy)]
pub struct StepSummary {
    /// Whether this step emitted at least one note-on.
    pub emitted_on: bool,

    /// Gate lane value consumed by this step (fraction of the step).
    pub gate: f32,

    /// The upcoming step sustains or glides, so no gate-based off may be
    /// scheduled for this one.
    pub hold_full_step: bool,
}

/// The step-sequencing core: four cyclic lanes plus the sounding state.
pub struct StepSequencer {
    velocity: Lane<f32>,
    gate: Lane<f32>,
    pitch: Lane<i8>,
    modifier: Lane<u8>,

    sounding: SoundingNotes,

    /// Added to the scaled loudness on accented steps. 0..=127.
    accent_boost: u8,

    /// The `input` term of the loudness formula. 1..=127.
    input_loudness: u8,
}

impl StepSequencer {
    pub fn new() -> Self {
        Self {
            velocity: Lane::new(1.0),
            gate: Lane::new(1.0),
            pitch: Lane::new(0),
            modifier: Lane::new(DEFAULT_STEP),
            sounding: SoundingNotes::new(),
            accent_boost: 0,
            input_loudness: 100,
        }
    }

    // -------------------------------
    // MARK: The tick
    // -------------------------------

    /// Evaluate one step at `offset` samples into the current block.
    ///
    /// Advances all four lanes exactly once, unconditionally, before
    /// anything else. Silent and suppressed steps still advance, which is
    /// what keeps independently-lengthed lanes in polymeter.
    pub fn fire_step(
        &mut self,
        offset: usize,
        selector: &mut dyn NoteSelector,
        out: &mut EventBuffer,
    ) -> StepSummary {
        let vel_scale = self.velocity.advance();
        let gate = self.gate.advance();
        let pitch_offset = self.pitch.advance();
        let flags = self.modifier.advance();

        let selection = selector.advance();

        // Input ran out: same event behavior as an authored Rest, plus a
        // defensive clear of the sounding state and the tie chain.
        if selection.is_empty() {
            self.emit_offs(offset, out);
            self.sounding.reset();
            return StepSummary {
                emitted_on: false,
                gate,
                hold_full_step: false,
            };
        }

        let outcome = modifier::reduce(flags, !self.sounding.is_empty());

        let mut emitted_on = false;
        match outcome {
            StepOutcome::Rest => {
                self.emit_offs(offset, out);
                self.sounding.clear();
                self.sounding.set_tie_active(false);
            }

            StepOutcome::Tie => {
                // Nothing emitted; the previous pitches keep ringing and
                // the chain stays open for the next tick.
                self.sounding.set_tie_active(true);
            }

            StepOutcome::Slide => {
                self.sounding.set_tie_active(false);
                let loudness = self.loudness(vel_scale, modifier::accented(flags));
                let (targets, count) = Self::apply_pitch_offset(&selection, pitch_offset);
                // No offs: the consumer glides the old voices into the new
                // pitches, gapless.
                for &note in &targets[..count] {
                    out.push(StepEvent::NoteOn {
                        note,
                        velocity: loudness,
                        offset,
                        legato: true,
                    });
                }
                self.sounding.replace(&targets[..count]);
                emitted_on = count > 0;
            }

            StepOutcome::Normal => {
                self.sounding.set_tie_active(false);
                let loudness = self.loudness(vel_scale, modifier::accented(flags));
                let (targets, count) = Self::apply_pitch_offset(&selection, pitch_offset);
                self.emit_offs(offset, out);
                for &note in &targets[..count] {
                    out.push(StepEvent::NoteOn {
                        note,
                        velocity: loudness,
                        offset,
                        legato: false,
                    });
                }
                self.sounding.replace(&targets[..count]);
                emitted_on = count > 0;
            }
        }

        StepSummary {
            emitted_on,
            gate,
            hold_full_step: Self::holds_full_step(self.modifier.peek()),
        }
    }

    /// Close every sounding note before the next boundary (gate end).
    ///
    /// Clears the sounding set but leaves the tie flag alone; the engine
    /// only calls this when no tie or slide is upcoming.
    pub fn release_all(&mut self, offset: usize, out: &mut EventBuffer) {
        self.emit_offs(offset, out);
        self.sounding.clear();
    }

    /// Full reset: lanes rewound, nothing sounding, no tie chain.
    /// Idempotent and allocation-free, for transport restarts.
    pub fn reset(&mut self) {
        self.velocity.reset();
        self.gate.reset();
        self.pitch.reset();
        self.modifier.reset();
        self.sounding.reset();
    }

    fn emit_offs(&self, offset: usize, out: &mut EventBuffer) {
        for &note in self.sounding.notes() {
            out.push(StepEvent::NoteOff { note, offset });
        }
    }

    /// Loudness = clamp(round(input x lane scale) + accent boost, 1, 127).
    /// The boost lands after lane scaling, so it is independent of the
    /// velocity lane's current value.
    fn loudness(&self, vel_scale: f32, accented: bool) -> u8 {
        let scaled = (self.input_loudness as f32 * vel_scale).round() as i32;
        let boost = if accented { self.accent_boost as i32 } else { 0 };
        (scaled + boost).clamp(1, 127) as u8
    }

    fn apply_pitch_offset(
        selection: &crate::selector::Selection,
        offset: i8,
    ) -> ([u8; MAX_SOUNDING], usize) {
        let mut targets = [0u8; MAX_SOUNDING];
        let mut count = 0;
        for &note in selection.notes() {
            targets[count] = (note as i16 + offset as i16).clamp(0, 127) as u8;
            count += 1;
        }
        (targets, count)
    }

    /// Whether `next_flags` (the upcoming step) sustains or glides, in
    /// which case the current note must ring through the full step.
    #[inline]
    fn holds_full_step(next_flags: u8) -> bool {
        next_flags & modifier::ACTIVE != 0
            && next_flags & (modifier::TIE | modifier::SLIDE) != 0
    }

    // -------------------------------
    // MARK: Configuration (applied between blocks by the engine)
    // -------------------------------

    pub fn set_velocity_step(&mut self, index: usize, scale: f32) {
        self.velocity.set_step(index, scale.clamp(0.0, 2.0));
    }

    pub fn set_gate_step(&mut self, index: usize, gate: f32) {
        self.gate.set_step(index, gate.clamp(0.05, 1.0));
    }

    pub fn set_pitch_step(&mut self, index: usize, semitones: i8) {
        self.pitch.set_step(index, semitones);
    }

    pub fn set_modifier_step(&mut self, index: usize, flags: u8) {
        self.modifier.set_step(index, flags);
    }

    pub fn set_velocity_length(&mut self, length: usize) {
        self.velocity.set_length(length);
    }

    pub fn set_gate_length(&mut self, length: usize) {
        self.gate.set_length(length);
    }

    pub fn set_pitch_length(&mut self, length: usize) {
        self.pitch.set_length(length);
    }

    pub fn set_modifier_length(&mut self, length: usize) {
        self.modifier.set_length(length);
    }

    pub fn set_accent_boost(&mut self, boost: u8) {
        self.accent_boost = boost.min(127);
    }

    pub fn set_input_loudness(&mut self, loudness: u8) {
        self.input_loudness = loudness.clamp(1, 127);
    }

    // -------------------------------
    // MARK: Accessors (readback / tests)
    // -------------------------------

    #[inline]
    pub fn tie_active(&self) -> bool {
        self.sounding.tie_active()
    }

    #[inline]
    pub fn sounding(&self) -> &SoundingNotes {
        &self.sounding
    }

    #[inline]
    pub fn lane_positions(&self) -> [usize; 4] {
        [
            self.velocity.position(),
            self.gate.position(),
            self.pitch.position(),
            self.modifier.position(),
        ]
    }
}

impl Default for StepSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifier::{ACCENT, ACTIVE, SLIDE, TIE};
    use crate::selector::Selection;

    /// Cycles through a fixed pitch list, one pitch per tick.
    struct CyclingSelector {
        pitches: Vec<u8>,
        index: usize,
    }

    impl CyclingSelector {
        fn new(pitches: &[u8]) -> Self {
            Self {
                pitches: pitches.to_vec(),
                index: 0,
            }
        }
    }

    impl NoteSelector for CyclingSelector {
        fn advance(&mut self) -> Selection {
            if self.pitches.is_empty() {
                return Selection::empty();
            }
            let pitch = self.pitches[self.index % self.pitches.len()];
            self.index += 1;
            Selection::single(pitch)
        }
    }

    struct EmptySelector;

    impl NoteSelector for EmptySelector {
        fn advance(&mut self) -> Selection {
            Selection::empty()
        }
    }

    fn program_modifiers(seq: &mut StepSequencer, steps: &[u8]) {
        seq.set_modifier_length(steps.len());
        for (i, &flags) in steps.iter().enumerate() {
            seq.set_modifier_step(i, flags);
        }
    }

    fn run_ticks(seq: &mut StepSequencer, sel: &mut dyn NoteSelector, n: usize) -> Vec<Vec<StepEvent>> {
        let mut out = EventBuffer::new(128);
        (0..n)
            .map(|_| {
                out.clear();
                seq.fire_step(0, sel, &mut out);
                out.events().to_vec()
            })
            .collect()
    }

    fn ons(events: &[StepEvent]) -> Vec<(u8, u8, bool)> {
        events
            .iter()
            .filter_map(|e| match e {
                StepEvent::NoteOn {
                    note,
                    velocity,
                    legato,
                    ..
                } => Some((*note, *velocity, *legato)),
                _ => None,
            })
            .collect()
    }

    fn offs(events: &[StepEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                StepEvent::NoteOff { note, .. } => Some(*note),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_default_lanes_behave_like_a_plain_arp() {
        // With every lane at its default (length 1, modifier = ACTIVE) the
        // stream must be indistinguishable from an engine with no modifier
        // concept at all: off(prev) + on(next) every tick.
        let pitches = [60u8, 64, 67];
        let mut seq = StepSequencer::new();
        let mut sel = CyclingSelector::new(&pitches);

        let ticks = run_ticks(&mut seq, &mut sel, 1000);

        for (i, events) in ticks.iter().enumerate() {
            let expected_on = pitches[i % 3];
            if i == 0 {
                assert_eq!(events.len(), 1);
            } else {
                let expected_off = pitches[(i - 1) % 3];
                assert_eq!(offs(events), vec![expected_off]);
            }
            assert_eq!(ons(events), vec![(expected_on, 100, false)]);
        }
    }

    #[test]
    fn test_rest_step_is_silent_but_lanes_advance() {
        let mut seq = StepSequencer::new();
        program_modifiers(&mut seq, &[ACTIVE, ACTIVE, 0x00, ACTIVE]);
        seq.set_velocity_length(4);
        let mut sel = CyclingSelector::new(&[60]);

        let ticks = run_ticks(&mut seq, &mut sel, 4);

        assert_eq!(ons(&ticks[0]).len(), 1);
        assert_eq!(ons(&ticks[1]).len(), 1);
        // The rest closes the ringing note and emits nothing new.
        assert_eq!(offs(&ticks[2]), vec![60]);
        assert_eq!(ons(&ticks[2]).len(), 0);
        assert_eq!(ons(&ticks[3]).len(), 1);
        // The rest tick still advanced every lane.
        assert_eq!(seq.lane_positions(), [0, 0, 0, 0]);
    }

    #[test]
    fn test_rest_wins_over_every_other_bit() {
        let mut seq = StepSequencer::new();
        program_modifiers(&mut seq, &[ACTIVE, TIE | SLIDE | ACCENT]);
        let mut sel = CyclingSelector::new(&[60]);

        let ticks = run_ticks(&mut seq, &mut sel, 2);
        assert_eq!(ons(&ticks[1]).len(), 0);
        assert_eq!(offs(&ticks[1]), vec![60]);
        assert!(!seq.tie_active());
    }

    #[test]
    fn test_tie_chain_sustains_silently() {
        let mut seq = StepSequencer::new();
        program_modifiers(
            &mut seq,
            &[ACTIVE, ACTIVE | TIE, ACTIVE | TIE, ACTIVE],
        );
        let mut sel = CyclingSelector::new(&[60, 64, 67, 72]);

        let ticks = run_ticks(&mut seq, &mut sel, 4);

        assert_eq!(ons(&ticks[0]), vec![(60, 100, false)]);
        // The whole tie region is event-free.
        assert!(ticks[1].is_empty());
        assert!(ticks[2].is_empty());
        // The chain terminates with a clean off + on.
        assert_eq!(offs(&ticks[3]), vec![60]);
        assert_eq!(ons(&ticks[3]), vec![(72, 100, false)]);
        assert!(!seq.tie_active());
    }

    #[test]
    fn test_tie_without_predecessor_is_silent() {
        // Tie as the very first tick.
        let mut seq = StepSequencer::new();
        program_modifiers(&mut seq, &[ACTIVE | TIE, ACTIVE]);
        let mut sel = CyclingSelector::new(&[60]);
        let ticks = run_ticks(&mut seq, &mut sel, 1);
        assert!(ticks[0].is_empty());
        assert!(!seq.tie_active());

        // Tie immediately following a rest.
        let mut seq = StepSequencer::new();
        program_modifiers(&mut seq, &[ACTIVE, 0x00, ACTIVE | TIE]);
        let mut sel = CyclingSelector::new(&[60]);
        let ticks = run_ticks(&mut seq, &mut sel, 3);
        assert!(ticks[2].is_empty());
        assert!(!seq.tie_active());
    }

    #[test]
    fn test_slide_emits_legato_without_off() {
        let mut seq = StepSequencer::new();
        program_modifiers(&mut seq, &[ACTIVE, ACTIVE | SLIDE, ACTIVE]);
        let mut sel = CyclingSelector::new(&[60, 64, 67]);

        let ticks = run_ticks(&mut seq, &mut sel, 3);

        assert_eq!(ons(&ticks[0]), vec![(60, 100, false)]);
        // The slide: legato on, no preceding off.
        assert_eq!(offs(&ticks[1]).len(), 0);
        assert_eq!(ons(&ticks[1]), vec![(64, 100, true)]);
        // Back to a plain retrigger.
        assert_eq!(offs(&ticks[2]), vec![64]);
        assert_eq!(ons(&ticks[2]), vec![(67, 100, false)]);
    }

    #[test]
    fn test_slide_without_predecessor_retriggers() {
        let mut seq = StepSequencer::new();
        program_modifiers(&mut seq, &[ACTIVE | SLIDE]);
        let mut sel = CyclingSelector::new(&[60]);

        let ticks = run_ticks(&mut seq, &mut sel, 1);
        assert_eq!(ons(&ticks[0]), vec![(60, 100, false)]);
    }

    #[test]
    fn test_accent_arithmetic() {
        let mut seq = StepSequencer::new();
        seq.set_input_loudness(80);
        seq.set_accent_boost(30);
        program_modifiers(&mut seq, &[ACTIVE | ACCENT]);
        let mut sel = CyclingSelector::new(&[60]);
        let ticks = run_ticks(&mut seq, &mut sel, 1);
        assert_eq!(ons(&ticks[0]), vec![(60, 110, false)]);

        // Boost past the ceiling clamps.
        let mut seq = StepSequencer::new();
        seq.set_input_loudness(100);
        seq.set_accent_boost(50);
        program_modifiers(&mut seq, &[ACTIVE | ACCENT]);
        let mut sel = CyclingSelector::new(&[60]);
        let ticks = run_ticks(&mut seq, &mut sel, 1);
        assert_eq!(ons(&ticks[0]), vec![(60, 127, false)]);
    }

    #[test]
    fn test_zero_boost_makes_accent_a_no_op() {
        let mut plain = StepSequencer::new();
        program_modifiers(&mut plain, &[ACTIVE]);
        let mut accented = StepSequencer::new();
        program_modifiers(&mut accented, &[ACTIVE | ACCENT]);
        accented.set_accent_boost(0);

        let mut sel_a = CyclingSelector::new(&[60, 64]);
        let mut sel_b = CyclingSelector::new(&[60, 64]);
        assert_eq!(
            run_ticks(&mut plain, &mut sel_a, 8),
            run_ticks(&mut accented, &mut sel_b, 8)
        );
    }

    #[test]
    fn test_accent_applies_after_lane_scaling() {
        let mut seq = StepSequencer::new();
        seq.set_input_loudness(80);
        seq.set_accent_boost(30);
        seq.set_velocity_step(0, 0.5);
        program_modifiers(&mut seq, &[ACTIVE | ACCENT]);
        let mut sel = CyclingSelector::new(&[60]);

        let ticks = run_ticks(&mut seq, &mut sel, 1);
        // round(80 * 0.5) + 30, not round((80 + 30) * 0.5).
        assert_eq!(ons(&ticks[0]), vec![(60, 70, false)]);
    }

    #[test]
    fn test_tie_accent_never_boosts() {
        let mut seq = StepSequencer::new();
        seq.set_accent_boost(40);
        program_modifiers(&mut seq, &[ACTIVE, ACTIVE | TIE | ACCENT, ACTIVE]);
        let mut sel = CyclingSelector::new(&[60]);

        let ticks = run_ticks(&mut seq, &mut sel, 3);
        // The tied step emits nothing at all, so nothing to boost.
        assert!(ticks[1].is_empty());
        // And the boost does not leak into the following plain step.
        assert_eq!(ons(&ticks[2]), vec![(60, 100, false)]);
    }

    #[test]
    fn test_polymeter_period_is_lcm_of_lane_lengths() {
        let mut seq = StepSequencer::new();
        program_modifiers(&mut seq, &[ACTIVE, ACTIVE | ACCENT, ACTIVE]);
        seq.set_accent_boost(10);
        seq.set_velocity_length(5);
        for (i, scale) in [1.0, 0.9, 0.8, 0.7, 0.6].iter().enumerate() {
            seq.set_velocity_step(i, *scale);
        }
        let mut sel = CyclingSelector::new(&[60]);

        let velocities: Vec<u8> = run_ticks(&mut seq, &mut sel, 45)
            .iter()
            .map(|ev| ons(ev)[0].1)
            .collect();

        // A 3-lane against a 5-lane repeats at 15 ticks, never earlier.
        assert_eq!(velocities[..15], velocities[15..30]);
        assert_eq!(velocities[..15], velocities[30..45]);
        assert_ne!(velocities[..3], velocities[3..6]);
        assert_ne!(velocities[..5], velocities[5..10]);
    }

    #[test]
    fn test_pitch_offset_lane_transposes_and_clamps() {
        let mut seq = StepSequencer::new();
        seq.set_pitch_length(2);
        seq.set_pitch_step(0, 12);
        seq.set_pitch_step(1, -12);
        let mut sel = CyclingSelector::new(&[60]);
        let ticks = run_ticks(&mut seq, &mut sel, 2);
        assert_eq!(ons(&ticks[0])[0].0, 72);
        assert_eq!(ons(&ticks[1])[0].0, 48);

        let mut seq = StepSequencer::new();
        seq.set_pitch_step(0, 127);
        let mut sel = CyclingSelector::new(&[120]);
        let ticks = run_ticks(&mut seq, &mut sel, 1);
        assert_eq!(ons(&ticks[0])[0].0, 127);
    }

    #[test]
    fn test_empty_selector_clears_state_like_a_rest() {
        let mut seq = StepSequencer::new();
        program_modifiers(&mut seq, &[ACTIVE, ACTIVE | TIE]);
        let mut sel = CyclingSelector::new(&[60]);
        run_ticks(&mut seq, &mut sel, 2);
        assert!(seq.tie_active());

        // Input runs out mid-chain: off emitted, tie and sounding cleared.
        let mut out = EventBuffer::new(16);
        let summary = seq.fire_step(0, &mut EmptySelector, &mut out);
        assert!(!summary.emitted_on);
        assert_eq!(offs(out.events()), vec![60]);
        assert!(!seq.tie_active());
        assert!(seq.sounding().is_empty());
    }

    #[test]
    fn test_chord_mode_pairs_offs_and_ons_in_order() {
        struct ChordSelector;
        impl NoteSelector for ChordSelector {
            fn advance(&mut self) -> Selection {
                let mut sel = Selection::empty();
                for p in [60, 64, 67] {
                    sel.push(p);
                }
                sel
            }
        }

        let mut seq = StepSequencer::new();
        seq.set_pitch_length(2);
        seq.set_pitch_step(1, 5);
        let mut sel = ChordSelector;
        let ticks = run_ticks(&mut seq, &mut sel, 2);

        assert_eq!(
            ons(&ticks[0]),
            vec![(60, 100, false), (64, 100, false), (67, 100, false)]
        );
        // Offs for the whole outgoing chord precede the incoming one.
        assert_eq!(offs(&ticks[1]), vec![60, 64, 67]);
        assert_eq!(
            ons(&ticks[1]),
            vec![(65, 100, false), (69, 100, false), (72, 100, false)]
        );
    }

    #[test]
    fn test_summary_holds_full_step_before_tie_or_slide() {
        let mut seq = StepSequencer::new();
        program_modifiers(&mut seq, &[ACTIVE, ACTIVE | TIE, ACTIVE | SLIDE, ACTIVE]);
        let mut sel = CyclingSelector::new(&[60]);
        let mut out = EventBuffer::new(16);

        // Step 0 fires; step 1 is a tie -> hold.
        let s0 = seq.fire_step(0, &mut sel, &mut out);
        assert!(s0.hold_full_step);
        // Step 1 (tie); step 2 is a slide -> hold.
        let s1 = seq.fire_step(0, &mut sel, &mut out);
        assert!(s1.hold_full_step);
        // Step 2 (slide); step 3 is plain -> gate may close it.
        let s2 = seq.fire_step(0, &mut sel, &mut out);
        assert!(!s2.hold_full_step);
    }

    #[test]
    fn test_reset_restarts_every_lane_and_the_chain() {
        let mut seq = StepSequencer::new();
        program_modifiers(&mut seq, &[ACTIVE, ACTIVE | TIE, ACTIVE]);
        seq.set_velocity_length(5);
        let mut sel = CyclingSelector::new(&[60]);
        run_ticks(&mut seq, &mut sel, 2);
        assert!(seq.tie_active());

        seq.reset();
        assert_eq!(seq.lane_positions(), [0, 0, 0, 0]);
        assert!(!seq.tie_active());
        assert!(seq.sounding().is_empty());
    }
}
