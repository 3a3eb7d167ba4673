// src/main.rs

use polyarp::{
    create_bridge, ArpEngine, EventConsumer, VoiceBank, ACCENT, ACTIVE, SLIDE, TIE,
};

/// ===============================
/// Sanity run
/// ===============================
///
/// Builds an engine, holds a chord, programs a small acid-flavored
/// pattern and prints what reaches the voice bank for a few blocks.

struct PrintingConsumer {
    bank: VoiceBank,
    block_start: u64,
}

impl EventConsumer for PrintingConsumer {
    fn note_on(&mut self, note: u8, velocity: u8, offset: usize, legato: bool) {
        let kind = if legato { "glide" } else { "note-on" };
        println!(
            "  @{:>6}  {} {} (vel {})",
            self.block_start + offset as u64,
            kind,
            note,
            velocity
        );
        self.bank.note_on(note, velocity, offset, legato);
    }

    fn note_off(&mut self, note: u8, offset: usize) {
        println!(
            "  @{:>6}  note-off {}",
            self.block_start + offset as u64,
            note
        );
        self.bank.note_off(note, offset);
    }

    fn set_slide_time(&mut self, ms: u16) {
        self.bank.set_slide_time(ms);
    }

    fn all_off(&mut self) {
        self.bank.all_off();
    }
}

fn main() {
    let sample_rate = 48_000.0;
    let block_frames = 512;

    // --------------------------------
    // Bridge + engine
    // --------------------------------

    let (control, shared) = create_bridge();
    let mut engine = ArpEngine::new(sample_rate, shared);

    // --------------------------------
    // Pattern: on, accent, tie, slide, rest, on, slide, rest
    // --------------------------------

    let pattern = [
        ACTIVE,
        ACTIVE | ACCENT,
        ACTIVE | TIE,
        ACTIVE | SLIDE,
        0x00,
        ACTIVE,
        ACTIVE | SLIDE | ACCENT,
        0x00,
    ];
    control.set_modifier_length(pattern.len());
    for (i, &flags) in pattern.iter().enumerate() {
        control.set_modifier_step(i, flags);
    }
    control.set_accent_boost(25);
    control.set_slide_time_ms(80);
    control.set_bpm(130.0);

    // --------------------------------
    // Hold a chord and run a few blocks
    // --------------------------------

    engine.note_on(48, 96);
    engine.note_on(51, 96);
    engine.note_on(55, 96);

    let mut consumer = PrintingConsumer {
        bank: VoiceBank::new(8),
        block_start: 0,
    };

    println!("Starting engine sanity run…");

    let blocks = (sample_rate as usize * 2) / block_frames;
    for _ in 0..blocks {
        consumer.block_start = engine.sample_position();
        engine.process_block(block_frames, &mut consumer);
    }

    println!(
        "Sanity run completed ({} voices active, tie {}).",
        consumer.bank.active_count(),
        engine.tie_active()
    );
}
