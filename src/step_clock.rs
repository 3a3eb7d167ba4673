// src/step_clock.rs
//
// Sample-domain step clock.
//
// Decides where the step boundaries fall inside each audio block. The
// clock lives purely in the sample domain; musical time (bpm, rate) is
// resolved into a step length in samples whenever tempo or rate change.

/// Step-boundary clock for the real-time tick.
///
/// This struct:
/// - is RT-safe (no allocation, bounded work per block)
/// - hands out boundary offsets one at a time, in order
/// - owns the absolute sample position
#[derive(Debug)]
pub struct StepClock {
    sample_rate: f64,
    bpm: f64,
    steps_per_beat: f64,

    /// Samples from the start of the current block to the next boundary.
    next_boundary: f64,

    /// Absolute sample position of the current block start.
    sample_pos: u64,
}

impl StepClock {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            bpm: 120.0,
            steps_per_beat: 4.0,
            next_boundary: 0.0,
            sample_pos: 0,
        }
    }

    /// Length of one step in samples at the current tempo and rate.
    #[inline]
    pub fn step_len_samples(&self) -> f64 {
        self.sample_rate * 60.0 / (self.bpm * self.steps_per_beat)
    }

    /// Next step boundary inside a block of `frames`, if any.
    ///
    /// Consumes the boundary: repeated calls walk every boundary in the
    /// block in order, then return None.
    pub fn next_step_in(&mut self, frames: usize) -> Option<usize> {
        if self.next_boundary < frames as f64 {
            let offset = (self.next_boundary.max(0.0) as usize).min(frames.saturating_sub(1));
            self.next_boundary += self.step_len_samples();
            Some(offset)
        } else {
            None
        }
    }

    /// Consume the block: rebase the pending boundary and advance the
    /// absolute position. Call once per block, after draining boundaries.
    pub fn advance_block(&mut self, frames: usize) {
        self.next_boundary -= frames as f64;
        self.sample_pos += frames as u64;
    }

    #[inline]
    pub fn sample_position(&self) -> u64 {
        self.sample_pos
    }

    #[inline]
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm.clamp(20.0, 999.0);
    }

    /// Steps per beat (e.g. 4.0 = sixteenth notes at 4/4).
    pub fn set_rate(&mut self, steps_per_beat: f64) {
        self.steps_per_beat = steps_per_beat.clamp(0.25, 16.0);
    }

    /// Re-arm the clock so the next block starts on a boundary.
    pub fn reset(&mut self) {
        self.next_boundary = 0.0;
        self.sample_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_spacing_across_blocks() {
        // 120 bpm, 4 steps/beat, 48 kHz -> one step every 6000 samples.
        let mut clock = StepClock::new(48_000.0);
        assert_eq!(clock.step_len_samples(), 6000.0);

        let block = 512;
        let mut boundaries = Vec::new();
        for _ in 0..100 {
            while let Some(offset) = clock.next_step_in(block) {
                boundaries.push(clock.sample_position() + offset as u64);
            }
            clock.advance_block(block);
        }

        assert_eq!(boundaries[0], 0);
        for pair in boundaries.windows(2) {
            assert_eq!(pair[1] - pair[0], 6000);
        }
    }

    #[test]
    fn test_multiple_boundaries_in_one_block() {
        // Step length 1000 samples -> 5 boundaries inside a 4096 block.
        let mut clock = StepClock::new(48_000.0);
        clock.set_bpm(180.0);
        clock.set_rate(16.0);
        assert_eq!(clock.step_len_samples(), 1000.0);

        let mut offsets = Vec::new();
        while let Some(offset) = clock.next_step_in(4096) {
            offsets.push(offset);
        }
        assert_eq!(offsets, vec![0, 1000, 2000, 3000, 4000]);
    }

    #[test]
    fn test_reset_rearms_on_block_start() {
        let mut clock = StepClock::new(48_000.0);
        clock.next_step_in(512);
        clock.advance_block(512);

        clock.reset();
        assert_eq!(clock.sample_position(), 0);
        assert_eq!(clock.next_step_in(512), Some(0));
    }
}
