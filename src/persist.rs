// src/persist.rs
//
// Save/load of the engine configuration.
//
// The format is a flat sequence of fixed-width little-endian fields,
// designed to be APPENDED to a host's pre-existing saved state. Loading
// is EOF-tolerant at the first byte only: a stream that ends exactly
// where our fields would begin is an old-format save and loads as full
// defaults; a stream that ends anywhere inside the fields is corrupted
// and the whole load fails, so the caller can fall back to defaults
// instead of accepting a partial configuration.

use std::io::{self, Read, Write};

use crate::lane::MAX_STEPS;
use crate::modifier::DEFAULT_STEP;

/// Error during configuration load.
#[derive(Debug)]
pub enum LoadError {
    /// The stream ended partway through the appended fields.
    Truncated,

    /// Underlying stream failure.
    Io(io::Error),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Truncated => {
                write!(f, "saved state ends partway through the arpeggiator fields")
            }
            LoadError::Io(e) => write!(f, "saved state unreadable: {}", e),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(e) => Some(e),
            LoadError::Truncated => None,
        }
    }
}

/// Result of a configuration load.
pub type LoadResult<T> = Result<T, LoadError>;

/// The persisted parameters, as plain values.
///
/// Produced by `ControlHandle::snapshot`, consumed by
/// `ControlHandle::apply_snapshot`. Lane positions are deliberately not
/// part of the format; a load behaves like a transport restart.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub velocity_len: u8,
    pub gate_len: u8,
    pub pitch_len: u8,
    pub modifier_len: u8,

    pub velocity_steps: [f32; MAX_STEPS],
    pub gate_steps: [f32; MAX_STEPS],
    pub pitch_steps: [i8; MAX_STEPS],
    pub modifier_steps: [u8; MAX_STEPS],

    pub accent_boost: u8,
    pub slide_time_ms: u16,
    pub input_loudness: u8,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            velocity_len: 1,
            gate_len: 1,
            pitch_len: 1,
            modifier_len: 1,
            velocity_steps: [1.0; MAX_STEPS],
            gate_steps: [1.0; MAX_STEPS],
            pitch_steps: [0; MAX_STEPS],
            modifier_steps: [DEFAULT_STEP; MAX_STEPS],
            accent_boost: 0,
            slide_time_ms: 60,
            input_loudness: 100,
        }
    }
}

// -------------------------------
// MARK: Save
// -------------------------------

/// Append the configuration to `writer` as fixed-width fields.
pub fn save(writer: &mut impl Write, snap: &ConfigSnapshot) -> io::Result<()> {
    writer.write_all(&[snap.velocity_len])?;
    for v in &snap.velocity_steps {
        writer.write_all(&v.to_le_bytes())?;
    }
    writer.write_all(&[snap.gate_len])?;
    for v in &snap.gate_steps {
        writer.write_all(&v.to_le_bytes())?;
    }
    writer.write_all(&[snap.pitch_len])?;
    for v in &snap.pitch_steps {
        writer.write_all(&v.to_le_bytes())?;
    }
    writer.write_all(&[snap.modifier_len])?;
    writer.write_all(&snap.modifier_steps)?;

    writer.write_all(&[snap.accent_boost])?;
    writer.write_all(&snap.slide_time_ms.to_le_bytes())?;
    writer.write_all(&[snap.input_loudness])?;
    Ok(())
}

// -------------------------------
// MARK: Load
// -------------------------------

/// Read the configuration back from `reader`.
///
/// The reader is expected to be positioned where the host's older fields
/// end. Every loaded value is clamped into its documented range.
pub fn load(reader: &mut impl Read) -> LoadResult<ConfigSnapshot> {
    let mut snap = ConfigSnapshot::default();

    // First byte decides legacy vs current format.
    let mut first = [0u8; 1];
    match read_first(reader, &mut first) {
        FirstRead::Eof => {
            log::debug!("no appended arpeggiator fields; loading defaults");
            return Ok(snap);
        }
        FirstRead::Err(e) => return Err(LoadError::Io(e)),
        FirstRead::Ok => {}
    }

    snap.velocity_len = clamp_len(first[0]);
    for v in &mut snap.velocity_steps {
        *v = clamp_scale(read_f32(reader)?);
    }
    snap.gate_len = clamp_len(read_u8(reader)?);
    for v in &mut snap.gate_steps {
        *v = clamp_gate(read_f32(reader)?);
    }
    snap.pitch_len = clamp_len(read_u8(reader)?);
    for v in &mut snap.pitch_steps {
        *v = read_u8(reader)? as i8;
    }
    snap.modifier_len = clamp_len(read_u8(reader)?);
    for v in &mut snap.modifier_steps {
        *v = read_u8(reader)?;
    }

    snap.accent_boost = read_u8(reader)?.min(127);
    snap.slide_time_ms = read_u16(reader)?.min(500);
    snap.input_loudness = read_u8(reader)?.clamp(1, 127);

    Ok(snap)
}

enum FirstRead {
    Ok,
    Eof,
    Err(io::Error),
}

fn read_first(reader: &mut impl Read, buf: &mut [u8; 1]) -> FirstRead {
    match reader.read_exact(buf) {
        Ok(()) => FirstRead::Ok,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => FirstRead::Eof,
        Err(e) => FirstRead::Err(e),
    }
}

fn read_u8(reader: &mut impl Read) -> LoadResult<u8> {
    let mut buf = [0u8; 1];
    fill(reader, &mut buf)?;
    Ok(buf[0])
}

fn read_u16(reader: &mut impl Read) -> LoadResult<u16> {
    let mut buf = [0u8; 2];
    fill(reader, &mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_f32(reader: &mut impl Read) -> LoadResult<f32> {
    let mut buf = [0u8; 4];
    fill(reader, &mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn fill(reader: &mut impl Read, buf: &mut [u8]) -> LoadResult<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            LoadError::Truncated
        } else {
            LoadError::Io(e)
        }
    })
}

fn clamp_len(len: u8) -> u8 {
    len.clamp(1, MAX_STEPS as u8)
}

fn clamp_scale(v: f32) -> f32 {
    if v.is_finite() { v.clamp(0.0, 2.0) } else { 1.0 }
}

fn clamp_gate(v: f32) -> f32 {
    if v.is_finite() { v.clamp(0.05, 1.0) } else { 1.0 }
}
