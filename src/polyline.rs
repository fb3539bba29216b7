//! Encoded polyline codec (Google polyline algorithm, precision 5).
//!
//! Each coordinate is stored as a delta from the previous point, scaled by
//! 1e5, zig-zag encoded and split into 5-bit groups offset by 63 so every
//! group is a printable ASCII character. Latitude precedes longitude.

use thiserror::Error;

use crate::GpsPoint;

/// Decimal digits preserved by the encoding.
pub const PRECISION: u32 = 5;

const SCALE: f64 = 100_000.0;
const CHAR_OFFSET: u8 = 63;
const CONTINUATION_BIT: u8 = 0x20;
const CHUNK_MASK: u8 = 0x1f;
const MAX_SHIFT: u32 = 60;

/// Errors produced while decoding a polyline string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Input ended in the middle of a value or between latitude and longitude
    #[error("polyline truncated at byte {offset}")]
    Truncated { offset: usize },
    /// Byte outside the polyline alphabet (`?`..=`~`)
    #[error("invalid polyline byte {byte:#04x} at offset {offset}")]
    InvalidCharacter { offset: usize, byte: u8 },
    /// Value, or the running coordinate sum, does not fit in 64 bits
    #[error("polyline value overflows at byte {offset}")]
    Overflow { offset: usize },
}

/// Decode an encoded polyline into `(latitude, longitude)` points.
///
/// An empty string decodes to an empty path. Malformed input is an error; the
/// decoder never returns a partial path.
pub fn decode(encoded: &str) -> Result<Vec<GpsPoint>, DecodeError> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::with_capacity(bytes.len() / 4);
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;

    while index < bytes.len() {
        let (dlat, lng_start) = read_value(bytes, index)?;
        if lng_start >= bytes.len() {
            return Err(DecodeError::Truncated { offset: lng_start });
        }
        let (dlng, next) = read_value(bytes, lng_start)?;

        lat = lat
            .checked_add(dlat)
            .ok_or(DecodeError::Overflow { offset: index })?;
        lng = lng
            .checked_add(dlng)
            .ok_or(DecodeError::Overflow { offset: lng_start })?;
        index = next;

        points.push(GpsPoint::new(lat as f64 / SCALE, lng as f64 / SCALE));
    }

    Ok(points)
}

/// Read one zig-zag encoded value starting at `start`.
/// Returns the decoded delta and the offset just past it.
fn read_value(bytes: &[u8], start: usize) -> Result<(i64, usize), DecodeError> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    let mut index = start;

    loop {
        let Some(&byte) = bytes.get(index) else {
            return Err(DecodeError::Truncated { offset: index });
        };
        if !(CHAR_OFFSET..=b'~').contains(&byte) {
            return Err(DecodeError::InvalidCharacter {
                offset: index,
                byte,
            });
        }
        if shift > MAX_SHIFT {
            return Err(DecodeError::Overflow { offset: index });
        }

        let chunk = byte - CHAR_OFFSET;
        let bits = u64::from(chunk & CHUNK_MASK);
        // Only the low 4 bits of the last group fit in 64 bits
        if shift == MAX_SHIFT && bits >> (u64::BITS - MAX_SHIFT) != 0 {
            return Err(DecodeError::Overflow { offset: index });
        }
        result |= bits << shift;
        shift += 5;
        index += 1;

        if chunk & CONTINUATION_BIT == 0 {
            break;
        }
    }

    let value = if result & 1 == 1 {
        !(result >> 1) as i64
    } else {
        (result >> 1) as i64
    };

    Ok((value, index))
}

/// Encode points into a polyline string. Inverse of [`decode`] up to the
/// fixed precision.
pub fn encode(points: &[GpsPoint]) -> String {
    let mut encoded = String::with_capacity(points.len() * 8);
    let mut prev_lat: i64 = 0;
    let mut prev_lng: i64 = 0;

    for point in points {
        let lat = (point.latitude * SCALE).round() as i64;
        let lng = (point.longitude * SCALE).round() as i64;

        write_value(&mut encoded, lat - prev_lat);
        write_value(&mut encoded, lng - prev_lng);

        prev_lat = lat;
        prev_lng = lng;
    }

    encoded
}

fn write_value(out: &mut String, value: i64) {
    let mut zigzag = ((value << 1) ^ (value >> 63)) as u64;

    while zigzag >= u64::from(CONTINUATION_BIT) {
        let chunk = (zigzag as u8 & CHUNK_MASK) | CONTINUATION_BIT;
        out.push(char::from(chunk + CHAR_OFFSET));
        zigzag >>= 5;
    }
    out.push(char::from(zigzag as u8 + CHAR_OFFSET));
}
