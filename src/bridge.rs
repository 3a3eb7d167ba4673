//! Thread-safe bridge between the control thread and the audio engine.
//!
//! This module provides the communication layer that allows the control
//! thread (user interaction or host automation) to safely reconfigure the
//! real-time engine while it runs.
//!
//! # Architecture
//!
//! - **Control thread** owns [`ControlHandle`] and writes parameters
//! - **Audio thread** keeps the [`SharedConfig`] inside the engine and
//!   copies it into its owned lanes once per block
//! - Every parameter is its own atomic cell: single writer, single
//!   reader, no read-modify-write anywhere. Transient staleness of one
//!   field for one tick is acceptable and self-corrects next tick.
//! - Readback (step positions, tie flag, voice count) flows the other
//!   way through the same struct, for display only.
//!
//! # Usage
//!
//! ```ignore
//! let (control, shared) = create_bridge();
//! let mut engine = ArpEngine::new(48_000.0, shared);
//!
//! // Control thread:
//! control.set_modifier_step(0, ACTIVE | ACCENT);
//!
//! // Audio thread, once per block:
//! engine.process_block(frames, &mut consumer);
//! ```

use std::array;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI8, AtomicU8, AtomicU16, AtomicU32, AtomicU64, AtomicUsize, Ordering},
};

use crate::lane::MAX_STEPS;
use crate::persist::ConfigSnapshot;
use crate::selector::ArpDirection;

/// One atomic cell per parameter.
///
/// Floats are stored as their bit patterns (no atomic floats in std);
/// every field is independent, so no consistent multi-field snapshot is
/// ever needed on the read side.
pub struct SharedConfig {
    velocity_len: AtomicU8,
    gate_len: AtomicU8,
    pitch_len: AtomicU8,
    modifier_len: AtomicU8,

    /// f32 bits per step.
    velocity_steps: [AtomicU32; MAX_STEPS],
    /// f32 bits per step.
    gate_steps: [AtomicU32; MAX_STEPS],
    pitch_steps: [AtomicI8; MAX_STEPS],
    modifier_steps: [AtomicU8; MAX_STEPS],

    accent_boost: AtomicU8,
    slide_time_ms: AtomicU16,
    input_loudness: AtomicU8,

    direction: AtomicU8,
    octaves: AtomicU8,
    chord: AtomicBool,

    /// f64 bits.
    bpm: AtomicU64,
    /// f64 bits.
    steps_per_beat: AtomicU64,

    /// Engine -> control readback.
    lane_positions: [AtomicUsize; 4],
    tie_active: AtomicBool,
    active_voices: AtomicUsize,
}

impl SharedConfig {
    fn new() -> Self {
        Self {
            velocity_len: AtomicU8::new(1),
            gate_len: AtomicU8::new(1),
            pitch_len: AtomicU8::new(1),
            modifier_len: AtomicU8::new(1),
            velocity_steps: array::from_fn(|_| AtomicU32::new(1.0f32.to_bits())),
            gate_steps: array::from_fn(|_| AtomicU32::new(1.0f32.to_bits())),
            pitch_steps: array::from_fn(|_| AtomicI8::new(0)),
            modifier_steps: array::from_fn(|_| AtomicU8::new(crate::modifier::DEFAULT_STEP)),
            accent_boost: AtomicU8::new(0),
            slide_time_ms: AtomicU16::new(60),
            input_loudness: AtomicU8::new(100),
            direction: AtomicU8::new(ArpDirection::Up.index()),
            octaves: AtomicU8::new(1),
            chord: AtomicBool::new(false),
            bpm: AtomicU64::new(120.0f64.to_bits()),
            steps_per_beat: AtomicU64::new(4.0f64.to_bits()),
            lane_positions: array::from_fn(|_| AtomicUsize::new(0)),
            tie_active: AtomicBool::new(false),
            active_voices: AtomicUsize::new(0),
        }
    }

    // -------------------------------
    // MARK: Engine-side reads (audio thread, once per block)
    // -------------------------------

    pub(crate) fn lane_lengths(&self) -> [usize; 4] {
        [
            self.velocity_len.load(Ordering::Relaxed) as usize,
            self.gate_len.load(Ordering::Relaxed) as usize,
            self.pitch_len.load(Ordering::Relaxed) as usize,
            self.modifier_len.load(Ordering::Relaxed) as usize,
        ]
    }

    pub(crate) fn velocity_step(&self, i: usize) -> f32 {
        f32::from_bits(self.velocity_steps[i].load(Ordering::Relaxed))
    }

    pub(crate) fn gate_step(&self, i: usize) -> f32 {
        f32::from_bits(self.gate_steps[i].load(Ordering::Relaxed))
    }

    pub(crate) fn pitch_step(&self, i: usize) -> i8 {
        self.pitch_steps[i].load(Ordering::Relaxed)
    }

    pub(crate) fn modifier_step(&self, i: usize) -> u8 {
        self.modifier_steps[i].load(Ordering::Relaxed)
    }

    pub(crate) fn accent_boost(&self) -> u8 {
        self.accent_boost.load(Ordering::Relaxed)
    }

    pub(crate) fn slide_time_ms(&self) -> u16 {
        self.slide_time_ms.load(Ordering::Relaxed)
    }

    pub(crate) fn input_loudness(&self) -> u8 {
        self.input_loudness.load(Ordering::Relaxed)
    }

    pub(crate) fn direction(&self) -> ArpDirection {
        ArpDirection::from_index(self.direction.load(Ordering::Relaxed))
    }

    pub(crate) fn octaves(&self) -> u8 {
        self.octaves.load(Ordering::Relaxed)
    }

    pub(crate) fn chord(&self) -> bool {
        self.chord.load(Ordering::Relaxed)
    }

    pub(crate) fn bpm(&self) -> f64 {
        f64::from_bits(self.bpm.load(Ordering::Relaxed))
    }

    pub(crate) fn steps_per_beat(&self) -> f64 {
        f64::from_bits(self.steps_per_beat.load(Ordering::Relaxed))
    }

    // -------------------------------
    // MARK: Engine-side writes (readback)
    // -------------------------------

    pub(crate) fn publish_readback(
        &self,
        positions: [usize; 4],
        tie_active: bool,
        active_voices: usize,
    ) {
        for (cell, pos) in self.lane_positions.iter().zip(positions) {
            cell.store(pos, Ordering::Relaxed);
        }
        self.tie_active.store(tie_active, Ordering::Relaxed);
        self.active_voices.store(active_voices, Ordering::Relaxed);
    }
}

/// Handle for the control thread.
///
/// All setters clamp into documented ranges rather than reject; nothing
/// here can fail, and nothing here blocks the audio thread.
pub struct ControlHandle {
    shared: Arc<SharedConfig>,
}

impl ControlHandle {
    // -------------------------------
    // MARK: Lane configuration
    // -------------------------------

    pub fn set_velocity_length(&self, length: usize) {
        let clamped = length.clamp(1, MAX_STEPS) as u8;
        self.shared.velocity_len.store(clamped, Ordering::Relaxed);
    }

    pub fn set_gate_length(&self, length: usize) {
        let clamped = length.clamp(1, MAX_STEPS) as u8;
        self.shared.gate_len.store(clamped, Ordering::Relaxed);
    }

    pub fn set_pitch_length(&self, length: usize) {
        let clamped = length.clamp(1, MAX_STEPS) as u8;
        self.shared.pitch_len.store(clamped, Ordering::Relaxed);
    }

    pub fn set_modifier_length(&self, length: usize) {
        let clamped = length.clamp(1, MAX_STEPS) as u8;
        self.shared.modifier_len.store(clamped, Ordering::Relaxed);
    }

    /// Per-step velocity scale, clamped to [0, 2]. Writes land at their
    /// true index whatever the active length is (they are stored, not
    /// aliased, and become audible if the lane is lengthened later).
    pub fn set_velocity_step(&self, index: usize, scale: f32) {
        if index < MAX_STEPS {
            let bits = scale.clamp(0.0, 2.0).to_bits();
            self.shared.velocity_steps[index].store(bits, Ordering::Relaxed);
        }
    }

    /// Per-step gate length as a fraction of the step, clamped to
    /// [0.05, 1]. 1.0 means "ring into the next step".
    pub fn set_gate_step(&self, index: usize, gate: f32) {
        if index < MAX_STEPS {
            let bits = gate.clamp(0.05, 1.0).to_bits();
            self.shared.gate_steps[index].store(bits, Ordering::Relaxed);
        }
    }

    /// Per-step pitch offset in semitones.
    pub fn set_pitch_step(&self, index: usize, semitones: i8) {
        if index < MAX_STEPS {
            self.shared.pitch_steps[index].store(semitones, Ordering::Relaxed);
        }
    }

    /// Per-step modifier byte. Any 8-bit value is legal.
    pub fn set_modifier_step(&self, index: usize, flags: u8) {
        if index < MAX_STEPS {
            self.shared.modifier_steps[index].store(flags, Ordering::Relaxed);
        }
    }

    // -------------------------------
    // MARK: Global parameters
    // -------------------------------

    pub fn set_accent_boost(&self, boost: u8) {
        self.shared.accent_boost.store(boost.min(127), Ordering::Relaxed);
    }

    pub fn set_slide_time_ms(&self, ms: u16) {
        self.shared.slide_time_ms.store(ms.min(500), Ordering::Relaxed);
    }

    pub fn set_input_loudness(&self, loudness: u8) {
        let clamped = loudness.clamp(1, 127);
        self.shared.input_loudness.store(clamped, Ordering::Relaxed);
    }

    pub fn set_direction(&self, direction: ArpDirection) {
        self.shared.direction.store(direction.index(), Ordering::Relaxed);
    }

    pub fn set_octaves(&self, octaves: u8) {
        self.shared.octaves.store(octaves.clamp(1, 4), Ordering::Relaxed);
    }

    pub fn set_chord(&self, chord: bool) {
        self.shared.chord.store(chord, Ordering::Relaxed);
    }

    pub fn set_bpm(&self, bpm: f64) {
        let bits = bpm.clamp(20.0, 999.0).to_bits();
        self.shared.bpm.store(bits, Ordering::Relaxed);
    }

    pub fn set_steps_per_beat(&self, rate: f64) {
        let bits = rate.clamp(0.25, 16.0).to_bits();
        self.shared.steps_per_beat.store(bits, Ordering::Relaxed);
    }

    // -------------------------------
    // MARK: Snapshots (persistence boundary)
    // -------------------------------

    /// Capture the persisted parameters as written by this handle.
    pub fn snapshot(&self) -> ConfigSnapshot {
        let s = &self.shared;
        let lengths = s.lane_lengths();
        let mut snap = ConfigSnapshot::default();
        snap.velocity_len = lengths[0] as u8;
        snap.gate_len = lengths[1] as u8;
        snap.pitch_len = lengths[2] as u8;
        snap.modifier_len = lengths[3] as u8;
        for i in 0..MAX_STEPS {
            snap.velocity_steps[i] = s.velocity_step(i);
            snap.gate_steps[i] = s.gate_step(i);
            snap.pitch_steps[i] = s.pitch_step(i);
            snap.modifier_steps[i] = s.modifier_step(i);
        }
        snap.accent_boost = s.accent_boost();
        snap.slide_time_ms = s.slide_time_ms();
        snap.input_loudness = s.input_loudness();
        snap
    }

    /// Apply a loaded snapshot field by field (each write clamps).
    pub fn apply_snapshot(&self, snap: &ConfigSnapshot) {
        self.set_velocity_length(snap.velocity_len as usize);
        self.set_gate_length(snap.gate_len as usize);
        self.set_pitch_length(snap.pitch_len as usize);
        self.set_modifier_length(snap.modifier_len as usize);
        for i in 0..MAX_STEPS {
            self.set_velocity_step(i, snap.velocity_steps[i]);
            self.set_gate_step(i, snap.gate_steps[i]);
            self.set_pitch_step(i, snap.pitch_steps[i]);
            self.set_modifier_step(i, snap.modifier_steps[i]);
        }
        self.set_accent_boost(snap.accent_boost);
        self.set_slide_time_ms(snap.slide_time_ms);
        self.set_input_loudness(snap.input_loudness);
        log::debug!("applied configuration snapshot");
    }

    // -------------------------------
    // MARK: Readback
    // -------------------------------

    /// Current lane positions (velocity, gate, pitch, modifier), for
    /// display only.
    pub fn lane_positions(&self) -> [usize; 4] {
        let mut out = [0; 4];
        for (slot, cell) in out.iter_mut().zip(&self.shared.lane_positions) {
            *slot = cell.load(Ordering::Relaxed);
        }
        out
    }

    pub fn tie_active(&self) -> bool {
        self.shared.tie_active.load(Ordering::Relaxed)
    }

    pub fn active_voices(&self) -> usize {
        self.shared.active_voices.load(Ordering::Relaxed)
    }
}

/// Create the control/engine pair.
///
/// The `ControlHandle` goes to the control thread; the `Arc<SharedConfig>`
/// goes into [`crate::engine::ArpEngine`].
pub fn create_bridge() -> (ControlHandle, Arc<SharedConfig>) {
    let shared = Arc::new(SharedConfig::new());
    (
        ControlHandle {
            shared: Arc::clone(&shared),
        },
        shared,
    )
}
