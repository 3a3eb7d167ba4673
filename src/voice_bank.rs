// src/voice_bank.rs
//
// The event-consumer side of the engine.
//
// The sequencing core never sees a glide curve or a voice: it only emits
// pitch + loudness + a legato flag. Everything glide-shaped lives behind
// the `EventConsumer` trait. `VoiceBank` is the reference implementation a
// synthesis layer would replace or wrap.

use crate::voice::{Voice, VoiceId};

/// Intake contract for emitted events.
///
/// When `legato` is true the consumer must locate the voice sounding the
/// predecessor pitch and glide it to `note` over the configured slide
/// time WITHOUT retriggering its amplitude envelope. When false, allocate
/// or retrigger normally. Chord-capable consumers must handle a run of
/// legato intakes in lock-step, one outgoing voice per incoming pitch.
pub trait EventConsumer {
    fn note_on(&mut self, note: u8, velocity: u8, offset: usize, legato: bool);
    fn note_off(&mut self, note: u8, offset: usize);

    /// Glide duration, forwarded opaquely from the configuration surface.
    fn set_slide_time(&mut self, ms: u16);

    /// Silence everything immediately (engine reset).
    fn all_off(&mut self);
}

/// Reference voice bank.
///
/// Responsibilities:
/// - map notes to voices, steal the oldest when full
/// - pair legato intakes with the longest-sounding gated voice, which
///   yields lock-step pairing for chord slides (first on retargets the
///   first voice of the outgoing chord, and so on)
/// - never allocate during event intake
pub struct VoiceBank {
    voices: Vec<Voice>,
    slide_time_ms: u16,
    next_age: u64,
}

impl VoiceBank {
    pub fn new(max_voices: usize) -> Self {
        let voices = (0..max_voices).map(Voice::new).collect();
        Self {
            voices,
            slide_time_ms: 0,
            next_age: 1,
        }
    }

    fn stamp(&mut self) -> u64 {
        let age = self.next_age;
        self.next_age += 1;
        age
    }

    /// Oldest active voice, i.e. the glide candidate / steal victim.
    fn oldest_active(&mut self) -> Option<&mut Voice> {
        self.voices
            .iter_mut()
            .filter(|v| v.active)
            .min_by_key(|v| v.age)
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    pub fn voice(&self, id: VoiceId) -> Option<&Voice> {
        self.voices.get(id)
    }

    /// Active voices in allocation order (oldest first).
    pub fn active_voices(&self) -> impl Iterator<Item = &Voice> {
        let mut ordered: Vec<&Voice> = self.voices.iter().filter(|v| v.active).collect();
        ordered.sort_by_key(|v| v.age);
        ordered.into_iter()
    }

    pub fn slide_time_ms(&self) -> u16 {
        self.slide_time_ms
    }
}

impl EventConsumer for VoiceBank {
    fn note_on(&mut self, note: u8, velocity: u8, _offset: usize, legato: bool) {
        let age = self.stamp();
        let slide_ms = self.slide_time_ms;

        if legato {
            // Retarget the longest-sounding voice. Re-stamping its age on
            // every glide is what rotates the pairing for chord slides.
            if let Some(v) = self.oldest_active() {
                v.glide_to(note, slide_ms, age);
                v.velocity = velocity;
                return;
            }
            // No predecessor voice survived; degrade to a retrigger.
        }

        if let Some(v) = self.voices.iter_mut().find(|v| !v.active) {
            v.trigger(note, velocity, age);
            return;
        }

        // Bank full: steal the oldest.
        if let Some(v) = self.oldest_active() {
            v.trigger(note, velocity, age);
        }
    }

    fn note_off(&mut self, note: u8, _offset: usize) {
        // Release the oldest voice sounding this pitch.
        if let Some(v) = self
            .voices
            .iter_mut()
            .filter(|v| v.active && v.note == note)
            .min_by_key(|v| v.age)
        {
            v.release();
        }
    }

    fn set_slide_time(&mut self, ms: u16) {
        self.slide_time_ms = ms.min(500);
    }

    fn all_off(&mut self) {
        for v in &mut self.voices {
            v.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_on_off() {
        let mut bank = VoiceBank::new(4);
        bank.note_on(60, 100, 0, false);
        assert_eq!(bank.active_count(), 1);

        bank.note_off(60, 0);
        assert_eq!(bank.active_count(), 0);
    }

    #[test]
    fn test_legato_retargets_without_retrigger() {
        let mut bank = VoiceBank::new(4);
        bank.set_slide_time(120);
        bank.note_on(60, 100, 0, false);
        bank.note_on(64, 100, 0, true);

        // Still one voice: the glide reused it.
        assert_eq!(bank.active_count(), 1);
        let v = bank.active_voices().next().unwrap();
        assert_eq!(v.note, 64);
        assert_eq!(v.glide_from, Some(60));
        assert_eq!(v.glide_ms, 120);
    }

    #[test]
    fn test_retrigger_clears_glide_state() {
        let mut bank = VoiceBank::new(1);
        bank.note_on(60, 100, 0, false);
        bank.note_on(64, 100, 0, true);
        bank.note_off(64, 0);
        bank.note_on(67, 100, 0, false);

        let v = bank.voice(0).unwrap();
        assert!(v.active);
        assert_eq!(v.glide_from, None);
    }

    #[test]
    fn test_chord_slide_pairs_voices_in_lock_step() {
        let mut bank = VoiceBank::new(8);
        for note in [60, 64, 67] {
            bank.note_on(note, 100, 0, false);
        }
        for note in [65, 69, 72] {
            bank.note_on(note, 100, 0, true);
        }

        assert_eq!(bank.active_count(), 3);
        let pairs: Vec<(Option<u8>, u8)> = bank
            .active_voices()
            .map(|v| (v.glide_from, v.note))
            .collect();
        assert_eq!(
            pairs,
            vec![(Some(60), 65), (Some(64), 69), (Some(67), 72)]
        );
    }

    #[test]
    fn test_legato_without_predecessor_degrades_to_trigger() {
        let mut bank = VoiceBank::new(2);
        bank.note_on(60, 90, 0, true);
        let v = bank.active_voices().next().unwrap();
        assert_eq!(v.note, 60);
        assert_eq!(v.glide_from, None);
    }

    #[test]
    fn test_full_bank_steals_oldest() {
        let mut bank = VoiceBank::new(2);
        bank.note_on(60, 100, 0, false);
        bank.note_on(64, 100, 0, false);
        bank.note_on(67, 100, 0, false);

        let notes: Vec<u8> = bank.active_voices().map(|v| v.note).collect();
        assert_eq!(notes, vec![64, 67]);
    }

    #[test]
    fn test_slide_time_clamps() {
        let mut bank = VoiceBank::new(1);
        bank.set_slide_time(9999);
        assert_eq!(bank.slide_time_ms(), 500);
    }
}
