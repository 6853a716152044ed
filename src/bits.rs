//! Byte/bit conversions shared by the status decoder, the command encoders,
//! and the bitmap packer.
//!
//! Bit arrays are always MSB-first: index 0 is bit 7.

use crate::error::{Error, Result};

pub type BitArray = [bool; 8];

/// Expand a byte into eight bits, most significant first.
pub fn u8_to_bits(value: u8) -> BitArray {
    let mut bits = [false; 8];
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = value & (0x80 >> i) != 0;
    }
    bits
}

/// Pack eight bits, most significant first, back into a byte.
pub fn bits_to_u8(bits: BitArray) -> u8 {
    bits.iter()
        .enumerate()
        .fold(0, |acc, (i, &bit)| if bit { acc | (0x80 >> i) } else { acc })
}

/// Split into `(high, low)`.
pub const fn u16_to_hi_lo(value: u16) -> (u8, u8) {
    ((value >> 8) as u8, (value & 0xff) as u8)
}

/// Wire order `[nL, nH]`, used by the ESC/GS positioning family.
pub const fn u16_low_first(value: u16) -> [u8; 2] {
    let (hi, lo) = u16_to_hi_lo(value);
    [lo, hi]
}

/// Wire order `[nH, nL]`, used by the scanner configuration payload.
pub const fn u16_high_first(value: u16) -> [u8; 2] {
    let (hi, lo) = u16_to_hi_lo(value);
    [hi, lo]
}

pub const fn u32_high_first(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

/// Encode a signed relative motion as its unsigned 16-bit wraparound.
pub fn signed_motion_to_u16(units: i32) -> Result<u16> {
    let units = i16::try_from(units).map_err(|_| {
        Error::InvalidParam(format!(
            "relative motion {units} outside {}..={}",
            i16::MIN,
            i16::MAX
        ))
    })?;
    Ok(units as u16)
}

pub fn check_range(name: &str, value: u32, min: u32, max: u32) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidParam(format!(
            "{name} {value} outside {min}..={max}"
        )))
    }
}
