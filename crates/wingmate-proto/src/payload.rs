//! REPORT / LEAVING / WORLDSTATE payload layouts (§4.5, §6.1).
//!
//! Unlike the envelope and position codec, these are variable-length and
//! are encoded/decoded with a small byte-cursor helper rather than a fixed
//! struct, matching the name/callsign-bearing records the original wire
//! format carries.

use crate::{AircraftPosition, ProtocolError};

/// Identity strings are truncated to this many bytes (excluding the NUL
/// terminator) on ingestion.
pub const MAX_IDENTITY_LEN: usize = 31;

/// Decoded REPORT payload (client -> hub).
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPayload {
    /// The client's session uuid.
    pub uuid: u32,
    /// The reported aircraft state.
    pub position: AircraftPosition,
    /// Present when the client is (re)announcing its identity.
    pub identity: Option<IdentityStrings>,
}

/// Decoded LEAVING payload (client -> hub).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeavingPayload {
    /// The departing client's session uuid.
    pub uuid: u32,
}

/// A name/callsign pair as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityStrings {
    /// Pilot or aircraft display name, truncated to [`MAX_IDENTITY_LEN`] bytes.
    pub name: String,
    /// Callsign, truncated to [`MAX_IDENTITY_LEN`] bytes.
    pub callsign: String,
}

/// Decoded WORLDSTATE payload (hub -> client).
#[derive(Debug, Clone, PartialEq)]
pub struct WorldStatePayload {
    /// Milliseconds since the hub started.
    pub session_time_ms: u32,
    /// Uuids that departed the session since the last tick.
    pub expired: Vec<u32>,
    /// `(uuid, position)` pairs updated this tick.
    pub positions: Vec<(u32, AircraftPosition)>,
    /// At most one identity update, chosen by the hub's round-robin scan.
    pub identity_update: Option<(u32, IdentityStrings)>,
}

impl ReportPayload {
    /// Encode into `buf`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// `ProtocolError::InsufficientBuffer` if `buf` is too small.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut w = Writer::new(buf);
        w.put_u32(self.uuid)?;
        w.put_position(&self.position)?;
        if let Some(identity) = &self.identity {
            w.put_cstr(&identity.name)?;
            w.put_cstr(&identity.callsign)?;
        }
        Ok(w.written())
    }

    /// Decode a REPORT payload, per §4.5.
    ///
    /// # Errors
    ///
    /// `ProtocolError::InsufficientBuffer` if `buf` is shorter than a uuid
    /// plus an encoded position.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(buf);
        let uuid = r.take_u32()?;
        let position = r.take_position()?;
        let identity = r.take_identity_pair();
        Ok(Self { uuid, position, identity })
    }
}

impl LeavingPayload {
    /// Encode into `buf`.
    ///
    /// # Errors
    ///
    /// `ProtocolError::InsufficientBuffer` if `buf` is shorter than 4 bytes.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut w = Writer::new(buf);
        w.put_u32(self.uuid)?;
        Ok(w.written())
    }

    /// Decode a LEAVING payload.
    ///
    /// # Errors
    ///
    /// `ProtocolError::InsufficientBuffer` if `buf` is shorter than 4 bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(buf);
        Ok(Self { uuid: r.take_u32()? })
    }
}

impl WorldStatePayload {
    /// Encode into `buf`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// `ProtocolError::InsufficientBuffer` if `buf` cannot hold the header,
    /// or `ProtocolError::PayloadTooLarge` if the assembled payload would
    /// exceed `MAX_PAYLOAD_LEN`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut w = Writer::new(buf);
        w.put_u32(self.session_time_ms)?;
        w.put_u8(self.expired.len() as u8)?;
        w.put_u8(self.positions.len() as u8)?;
        for uuid in &self.expired {
            w.put_u32(*uuid)?;
        }
        for (uuid, position) in &self.positions {
            w.put_u32(*uuid)?;
            w.put_position(position)?;
        }
        if let Some((uuid, identity)) = &self.identity_update {
            w.put_u32(*uuid)?;
            w.put_cstr(&identity.name)?;
            w.put_cstr(&identity.callsign)?;
        }

        let written = w.written();
        if written > crate::MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge(written));
        }
        Ok(written)
    }

    /// Decode a WORLDSTATE payload, per §4.5.
    ///
    /// # Errors
    ///
    /// `ProtocolError::InsufficientBuffer` if the declared record counts
    /// can't be satisfied by the remaining bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(buf);
        let session_time_ms = r.take_u32()?;
        let n_expired = r.take_u8()?;
        let n_positions = r.take_u8()?;

        let mut expired = Vec::with_capacity(n_expired as usize);
        for _ in 0..n_expired {
            expired.push(r.take_u32()?);
        }

        let mut positions = Vec::with_capacity(n_positions as usize);
        for _ in 0..n_positions {
            let uuid = r.take_u32()?;
            let position = r.take_position()?;
            positions.push((uuid, position));
        }

        let identity_update = r.take_u32_then_identity();

        Ok(Self { session_time_ms, expired, positions, identity_update })
    }
}

/// Truncate `s` to at most [`MAX_IDENTITY_LEN`] bytes on a UTF-8 boundary.
#[must_use]
pub fn truncate_identity(s: &str) -> String {
    if s.len() <= MAX_IDENTITY_LEN {
        return s.to_string();
    }
    let mut end = MAX_IDENTITY_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn written(&self) -> usize {
        self.pos
    }

    fn require(&self, n: usize) -> Result<(), ProtocolError> {
        if self.buf.len() - self.pos < n {
            return Err(ProtocolError::InsufficientBuffer {
                needed: self.pos + n,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    fn put_u8(&mut self, v: u8) -> Result<(), ProtocolError> {
        self.require(1)?;
        self.buf[self.pos] = v;
        self.pos += 1;
        Ok(())
    }

    fn put_u32(&mut self, v: u32) -> Result<(), ProtocolError> {
        self.require(4)?;
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_be_bytes());
        self.pos += 4;
        Ok(())
    }

    fn put_position(&mut self, p: &AircraftPosition) -> Result<(), ProtocolError> {
        self.require(AircraftPosition::SIZE)?;
        let written = p.encode(&mut self.buf[self.pos..])?;
        self.pos += written;
        Ok(())
    }

    fn put_cstr(&mut self, s: &str) -> Result<(), ProtocolError> {
        let truncated = truncate_identity(s);
        self.require(truncated.len() + 1)?;
        self.buf[self.pos..self.pos + truncated.len()].copy_from_slice(truncated.as_bytes());
        self.pos += truncated.len();
        self.buf[self.pos] = 0;
        self.pos += 1;
        Ok(())
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take_u8(&mut self) -> Result<u8, ProtocolError> {
        if self.remaining() < 1 {
            return Err(ProtocolError::InsufficientBuffer { needed: self.pos + 1, available: self.buf.len() });
        }
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn take_u32(&mut self) -> Result<u32, ProtocolError> {
        if self.remaining() < 4 {
            return Err(ProtocolError::InsufficientBuffer { needed: self.pos + 4, available: self.buf.len() });
        }
        let v = u32::from_be_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap_or_default());
        self.pos += 4;
        Ok(v)
    }

    fn take_position(&mut self) -> Result<AircraftPosition, ProtocolError> {
        let p = AircraftPosition::decode(&self.buf[self.pos..])?;
        self.pos += AircraftPosition::SIZE;
        Ok(p)
    }

    /// Best-effort: a trailing `name\0 callsign\0` pair, present only if
    /// both NUL terminators are found in the remaining bytes.
    fn take_identity_pair(&mut self) -> Option<IdentityStrings> {
        let rest = &self.buf[self.pos..];
        let name_end = rest.iter().position(|&b| b == 0)?;
        let name = String::from_utf8_lossy(&rest[..name_end]).into_owned();
        let after_name = &rest[name_end + 1..];
        let callsign_end = after_name.iter().position(|&b| b == 0)?;
        let callsign = String::from_utf8_lossy(&after_name[..callsign_end]).into_owned();
        self.pos += name_end + 1 + callsign_end + 1;
        Some(IdentityStrings { name: truncate_identity(&name), callsign: truncate_identity(&callsign) })
    }

    /// Best-effort: a trailing `uuid, name\0, callsign\0` record.
    fn take_u32_then_identity(&mut self) -> Option<(u32, IdentityStrings)> {
        if self.remaining() < 4 {
            return None;
        }
        let uuid = u32::from_be_bytes(self.buf[self.pos..self.pos + 4].try_into().ok()?);
        let save = self.pos;
        self.pos += 4;
        match self.take_identity_pair() {
            Some(identity) => Some((uuid, identity)),
            None => {
                self.pos = save;
                None
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_position() -> AircraftPosition {
        AircraftPosition {
            timestamp_ms: 0,
            latitude: 37.0,
            longitude: -122.0,
            altitude: 1000.0,
            heading: 90.0,
            pitch: 0.0,
            roll: 0.0,
            rudder: 0.0,
            elevator: 0.0,
            aileron: 0.0,
            speedbrake: 0.0,
            flaps: 0.0,
            gear: true,
            beacon: true,
            strobe: false,
            navlight: true,
            taxilight: false,
            landlight: false,
        }
    }

    #[test]
    fn report_round_trip_without_identity() {
        let payload = ReportPayload { uuid: 0xAAAA_1111, position: sample_position(), identity: None };
        let mut buf = [0u8; 64];
        let n = payload.encode(&mut buf).unwrap();
        let decoded = ReportPayload::decode(&buf[..n]).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn report_round_trip_with_identity() {
        let payload = ReportPayload {
            uuid: 0xAAAA_1111,
            position: sample_position(),
            identity: Some(IdentityStrings { name: "Alice".into(), callsign: "AL1".into() }),
        };
        let mut buf = [0u8; 64];
        let n = payload.encode(&mut buf).unwrap();
        let decoded = ReportPayload::decode(&buf[..n]).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn leaving_round_trip() {
        let payload = LeavingPayload { uuid: 0xDEAD_BEEF };
        let mut buf = [0u8; 4];
        let n = payload.encode(&mut buf).unwrap();
        assert_eq!(LeavingPayload::decode(&buf[..n]).unwrap(), payload);
    }

    #[test]
    fn worldstate_round_trip_full() {
        let payload = WorldStatePayload {
            session_time_ms: 12345,
            expired: vec![1, 2],
            positions: vec![(10, sample_position()), (11, sample_position())],
            identity_update: Some((10, IdentityStrings { name: "Bob".into(), callsign: "BB2".into() })),
        };
        let mut buf = [0u8; 512];
        let n = payload.encode(&mut buf).unwrap();
        let decoded = WorldStatePayload::decode(&buf[..n]).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn worldstate_round_trip_empty() {
        let payload = WorldStatePayload { session_time_ms: 0, expired: vec![], positions: vec![], identity_update: None };
        let mut buf = [0u8; 32];
        let n = payload.encode(&mut buf).unwrap();
        let decoded = WorldStatePayload::decode(&buf[..n]).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn identity_string_truncated_on_ingestion() {
        let long = "a".repeat(64);
        let payload = ReportPayload {
            uuid: 1,
            position: sample_position(),
            identity: Some(IdentityStrings { name: long.clone(), callsign: "CS".into() }),
        };
        let mut buf = [0u8; 128];
        let n = payload.encode(&mut buf).unwrap();
        let decoded = ReportPayload::decode(&buf[..n]).unwrap();
        assert_eq!(decoded.identity.unwrap().name.len(), MAX_IDENTITY_LEN);
    }
}
