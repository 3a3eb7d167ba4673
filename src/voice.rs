// src/voice.rs

pub type VoiceId = usize;

/// A voice represents one sounding note on the consumer side.
///
/// Voices do NOT own DSP state; this crate only tracks what the synthesis
/// layer needs to know: which pitch, how loud, and whether the voice is
/// mid-glide (and from where).
#[derive(Debug, Clone, Copy)]
pub struct Voice {
    pub id: VoiceId,
    pub active: bool,
    pub note: u8,
    pub velocity: u8,

    /// Allocation order stamp; smaller = sounding longer.
    pub age: u64,

    /// Pitch this voice is gliding away from, if a slide retargeted it.
    /// None after a plain retrigger.
    pub glide_from: Option<u8>,

    /// Glide duration in ms, captured at retarget time.
    pub glide_ms: u16,
}

impl Voice {
    #[inline]
    pub fn new(id: VoiceId) -> Self {
        Self {
            id,
            active: false,
            note: 0,
            velocity: 0,
            age: 0,
            glide_from: None,
            glide_ms: 0,
        }
    }

    /// Plain (re)trigger: envelope restarts, no glide.
    #[inline]
    pub fn trigger(&mut self, note: u8, velocity: u8, age: u64) {
        self.active = true;
        self.note = note;
        self.velocity = velocity;
        self.age = age;
        self.glide_from = None;
        self.glide_ms = 0;
    }

    /// Legato retarget: keep the envelope running, glide the pitch.
    #[inline]
    pub fn glide_to(&mut self, note: u8, glide_ms: u16, age: u64) {
        self.glide_from = Some(self.note);
        self.note = note;
        self.age = age;
        self.glide_ms = glide_ms;
    }

    #[inline]
    pub fn release(&mut self) {
        self.active = false;
        self.glide_from = None;
    }
}
