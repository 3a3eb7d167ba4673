// src/lib.rs
//
// Library entry point for the arpeggiator step engine.

mod bridge;
mod engine;
mod event;
mod lane;
mod modifier;
mod persist;
mod selector;
mod sequencer;
mod sounding;
mod step_clock;
mod voice;
mod voice_bank;

// Re-export key types for consumers
pub use bridge::{create_bridge, ControlHandle, SharedConfig};
pub use engine::ArpEngine;
pub use event::{EventBuffer, StepEvent};
pub use lane::{Lane, MAX_STEPS};
pub use modifier::{StepOutcome, ACCENT, ACTIVE, DEFAULT_STEP, SLIDE, TIE};
pub use persist::{load, save, ConfigSnapshot, LoadError, LoadResult};
pub use selector::{ArpDirection, HeldNoteSelector, NoteSelector, Selection};
pub use sequencer::{StepSequencer, StepSummary};
pub use sounding::SoundingNotes;
pub use step_clock::StepClock;
pub use voice::{Voice, VoiceId};
pub use voice_bank::{EventConsumer, VoiceBank};
