// src/modifier.rs
//
// Per-step modifier byte and its priority reduction.
//
// Every tick consumes one byte from the modifier lane. Any 8-bit value is
// legal; unknown bits are ignored. The byte reduces to exactly one outcome
// class, and that reduction lives HERE and nowhere else, so the priority
// order (Rest > Tie > Slide > Normal) cannot be re-derived differently by
// other code. Accent never selects an outcome; it only boosts loudness on
// outcomes that emit a note-on.

/// The step may sound. When clear the step is silent no matter what other
/// bits are set.
pub const ACTIVE: u8 = 0x01;

/// Sustain the previous note instead of retriggering.
pub const TIE: u8 = 0x02;

/// Glide into the new pitch instead of retriggering.
pub const SLIDE: u8 = 0x04;

/// Boost the loudness of this step's note-on.
pub const ACCENT: u8 = 0x08;

/// Backward-compatible default step: plain active, nothing else.
pub const DEFAULT_STEP: u8 = ACTIVE;

/// Outcome class of one step, after priority reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Silent step: off for anything sounding, no new note.
    Rest,

    /// Sustain: nothing emitted, the previous note keeps ringing.
    Tie,

    /// Legato transition: on (legato) for the new pitch, no off.
    Slide,

    /// Plain retrigger: off for the old pitch, on for the new one.
    Normal,
}

/// Reduce a raw modifier byte to its outcome class.
///
/// `has_predecessor` is whether anything is currently sounding: a Tie with
/// no predecessor degrades to Rest, a Slide with no predecessor degrades
/// to Normal (the only way a slide step ends up non-legato).
#[inline]
pub fn reduce(flags: u8, has_predecessor: bool) -> StepOutcome {
    if flags & ACTIVE == 0 {
        StepOutcome::Rest
    } else if flags & TIE != 0 {
        if has_predecessor {
            StepOutcome::Tie
        } else {
            StepOutcome::Rest
        }
    } else if flags & SLIDE != 0 && has_predecessor {
        StepOutcome::Slide
    } else {
        StepOutcome::Normal
    }
}

/// Whether the step's note-on (if any) gets the accent boost.
#[inline]
pub fn accented(flags: u8) -> bool {
    flags & ACCENT != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_is_rest_regardless_of_bits() {
        for extra in [0, TIE, SLIDE, ACCENT, TIE | SLIDE | ACCENT] {
            assert_eq!(reduce(extra & !ACTIVE, true), StepOutcome::Rest);
            assert_eq!(reduce(extra & !ACTIVE, false), StepOutcome::Rest);
        }
    }

    #[test]
    fn test_tie_beats_slide() {
        assert_eq!(reduce(ACTIVE | TIE | SLIDE, true), StepOutcome::Tie);
    }

    #[test]
    fn test_tie_without_predecessor_is_rest() {
        assert_eq!(reduce(ACTIVE | TIE, false), StepOutcome::Rest);
    }

    #[test]
    fn test_slide_without_predecessor_is_normal() {
        assert_eq!(reduce(ACTIVE | SLIDE, false), StepOutcome::Normal);
        assert_eq!(reduce(ACTIVE | SLIDE, true), StepOutcome::Slide);
    }

    #[test]
    fn test_accent_never_changes_outcome() {
        for flags in 0u8..=0x0F {
            for pred in [false, true] {
                assert_eq!(reduce(flags | ACCENT, pred), reduce(flags, pred));
            }
        }
    }

    #[test]
    fn test_unknown_high_bits_are_ignored() {
        assert_eq!(reduce(ACTIVE | 0xF0, true), StepOutcome::Normal);
        assert_eq!(reduce(0xF0, true), StepOutcome::Rest);
    }
}
