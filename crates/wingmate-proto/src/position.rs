//! Fixed-point wire codec for `AircraftPosition` (§4.1).
//!
//! Encoding truncates toward zero after scaling; decoding divides by the
//! same scale factor. None of this validates semantic ranges on decode —
//! a decoded value may be out of its nominal range (§7 `DecodeRange`); it
//! is up to the caller to clamp if it cares.

use crate::ProtocolError;

const Q9_23: f64 = (1u32 << 23) as f64;
const Q24_8: f64 = (1u32 << 8) as f64;
const Q9_7: f64 = (1u32 << 7) as f64;
const CONTROL_SIGNED: f64 = 127.0;
const CONTROL_UNSIGNED: f64 = 255.0;

const GEAR_BIT: u8 = 1 << 0;
const BEACON_BIT: u8 = 1 << 1;
const STROBE_BIT: u8 = 1 << 2;
const NAVLIGHT_BIT: u8 = 1 << 3;
const TAXILIGHT_BIT: u8 = 1 << 4;
const LANDLIGHT_BIT: u8 = 1 << 5;

/// A single aircraft's full reported state.
///
/// Trivially copyable value type with no identity of its own; identity is
/// carried alongside on the wire (the REPORT/WORLDSTATE uuid), not in this
/// struct.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AircraftPosition {
    /// Milliseconds in a per-sender monotonic frame; wraps every ~49.7 days.
    pub timestamp_ms: u32,
    /// Degrees.
    pub latitude: f64,
    /// Degrees.
    pub longitude: f64,
    /// Metres.
    pub altitude: f64,
    /// Degrees, `[0, 360)`.
    pub heading: f64,
    /// Degrees, `(-180, 180]`.
    pub pitch: f64,
    /// Degrees, `(-180, 180]`.
    pub roll: f64,
    /// Normalized `[-1, 1]`.
    pub rudder: f64,
    /// Normalized `[-1, 1]`.
    pub elevator: f64,
    /// Normalized `[-1, 1]`.
    pub aileron: f64,
    /// Normalized `[0, 1]`.
    pub speedbrake: f64,
    /// Normalized `[0, 1]`.
    pub flaps: f64,
    /// Landing gear deployed.
    pub gear: bool,
    /// Beacon light on.
    pub beacon: bool,
    /// Strobe light on.
    pub strobe: bool,
    /// Navigation lights on.
    pub navlight: bool,
    /// Taxi light on.
    pub taxilight: bool,
    /// Landing light on.
    pub landlight: bool,
}

impl AircraftPosition {
    /// Encoded size on the wire, in bytes.
    pub const SIZE: usize = 29;

    /// Encode into `buf`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InsufficientBuffer` if `buf` is shorter than
    /// [`AircraftPosition::SIZE`].
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::InsufficientBuffer { needed: Self::SIZE, available: buf.len() });
        }

        buf[0..4].copy_from_slice(&self.timestamp_ms.to_be_bytes());
        buf[4..8].copy_from_slice(&scale_i32(self.latitude, Q9_23).to_be_bytes());
        buf[8..12].copy_from_slice(&scale_i32(self.longitude, Q9_23).to_be_bytes());
        buf[12..16].copy_from_slice(&scale_i32(self.altitude, Q24_8).to_be_bytes());
        buf[16..18].copy_from_slice(&(scale_i32(self.heading, Q9_7) as u16).to_be_bytes());
        buf[18..20].copy_from_slice(&(scale_i32(self.pitch, Q9_7) as i16).to_be_bytes());
        buf[20..22].copy_from_slice(&(scale_i32(self.roll, Q9_7) as i16).to_be_bytes());
        buf[22] = scale_i32(self.rudder, CONTROL_SIGNED) as i8 as u8;
        buf[23] = scale_i32(self.elevator, CONTROL_SIGNED) as i8 as u8;
        buf[24] = scale_i32(self.aileron, CONTROL_SIGNED) as i8 as u8;
        buf[25] = scale_i32(self.speedbrake, CONTROL_UNSIGNED) as u8;
        buf[26] = scale_i32(self.flaps, CONTROL_UNSIGNED) as u8;
        buf[27] = self.switches_byte();

        // Byte 28 is unused padding reserved for future control surfaces;
        // zeroed so encode/decode is exact even though the table in §4.1
        // only accounts for 28 meaningful bytes within the 29-byte size.
        buf[28] = 0;

        Ok(Self::SIZE)
    }

    /// Decode an `AircraftPosition` from the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InsufficientBuffer` if fewer than
    /// [`AircraftPosition::SIZE`] bytes are available. Never fails on
    /// out-of-range field values (§7 `DecodeRange`): ranges are not
    /// validated here.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::InsufficientBuffer { needed: Self::SIZE, available: buf.len() });
        }

        let timestamp_ms = u32::from_be_bytes(buf[0..4].try_into().unwrap_or_default());
        let latitude = i32::from_be_bytes(buf[4..8].try_into().unwrap_or_default()) as f64 / Q9_23;
        let longitude = i32::from_be_bytes(buf[8..12].try_into().unwrap_or_default()) as f64 / Q9_23;
        let altitude = i32::from_be_bytes(buf[12..16].try_into().unwrap_or_default()) as f64 / Q24_8;
        let heading = u16::from_be_bytes(buf[16..18].try_into().unwrap_or_default()) as f64 / Q9_7;
        let pitch = i16::from_be_bytes(buf[18..20].try_into().unwrap_or_default()) as f64 / Q9_7;
        let roll = i16::from_be_bytes(buf[20..22].try_into().unwrap_or_default()) as f64 / Q9_7;
        let rudder = buf[22] as i8 as f64 / CONTROL_SIGNED;
        let elevator = buf[23] as i8 as f64 / CONTROL_SIGNED;
        let aileron = buf[24] as i8 as f64 / CONTROL_SIGNED;
        let speedbrake = buf[25] as f64 / CONTROL_UNSIGNED;
        let flaps = buf[26] as f64 / CONTROL_UNSIGNED;
        let switches = buf[27];

        Ok(Self {
            timestamp_ms,
            latitude,
            longitude,
            altitude,
            heading,
            pitch,
            roll,
            rudder,
            elevator,
            aileron,
            speedbrake,
            flaps,
            gear: switches & GEAR_BIT != 0,
            beacon: switches & BEACON_BIT != 0,
            strobe: switches & STROBE_BIT != 0,
            navlight: switches & NAVLIGHT_BIT != 0,
            taxilight: switches & TAXILIGHT_BIT != 0,
            landlight: switches & LANDLIGHT_BIT != 0,
        })
    }

    fn switches_byte(&self) -> u8 {
        let mut b = 0u8;
        if self.gear {
            b |= GEAR_BIT;
        }
        if self.beacon {
            b |= BEACON_BIT;
        }
        if self.strobe {
            b |= STROBE_BIT;
        }
        if self.navlight {
            b |= NAVLIGHT_BIT;
        }
        if self.taxilight {
            b |= TAXILIGHT_BIT;
        }
        if self.landlight {
            b |= LANDLIGHT_BIT;
        }
        b
    }
}

/// Scale `value` by `scale` and truncate toward zero, per §4.1.
fn scale_i32(value: f64, scale: f64) -> i32 {
    (value * scale).trunc() as i32
}
