//! Datagram envelope: the 8-byte header in front of every UDP payload.
//!
//! All multi-byte fields are big-endian (network byte order). Fields are
//! stored as raw byte arrays so the struct has no alignment requirements and
//! can be parsed directly out of an untrusted receive buffer.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::ProtocolError;

/// Largest payload a datagram may carry.
pub const MAX_PAYLOAD_LEN: usize = 512;

/// Largest total datagram size (envelope + payload).
pub const MAX_DATAGRAM_LEN: usize = Envelope::SIZE + MAX_PAYLOAD_LEN;

/// The command carried by a datagram's envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Client reporting its current aircraft state to the hub.
    Report,
    /// Client announcing its departure from the session.
    Leaving,
    /// Hub broadcasting the aggregated world state to a client.
    WorldState,
}

impl Command {
    /// Wire value for this command.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        match self {
            Command::Report => 0,
            Command::Leaving => 1,
            Command::WorldState => 2,
        }
    }

    /// Decode a wire value, if it names a known command.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Command::Report),
            1 => Some(Command::Leaving),
            2 => Some(Command::WorldState),
            _ => None,
        }
    }
}

/// Fixed 8-byte datagram envelope.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
struct RawEnvelope {
    sequence_number: [u8; 4],
    command: [u8; 2],
    payload_length: [u8; 2],
}

/// Parsed datagram envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    /// Per-sender monotonically increasing sequence number.
    pub sequence_number: u32,
    /// The command this datagram carries.
    pub command: Command,
    /// Declared length, in bytes, of the payload following this envelope.
    pub payload_length: u16,
}

impl Envelope {
    /// Size of the encoded envelope, in bytes.
    pub const SIZE: usize = 8;

    /// Build an envelope, computing `payload_length` from `payload`.
    #[must_use]
    pub fn new(sequence_number: u32, command: Command, payload: &[u8]) -> Self {
        Self {
            sequence_number,
            command,
            payload_length: payload.len() as u16,
        }
    }

    /// Encode into `buf`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InsufficientBuffer` if `buf` is shorter than
    /// [`Envelope::SIZE`], or `ProtocolError::PayloadTooLarge` if
    /// `payload_length` exceeds [`MAX_PAYLOAD_LEN`].
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::InsufficientBuffer { needed: Self::SIZE, available: buf.len() });
        }
        if self.payload_length as usize > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge(self.payload_length as usize));
        }

        let raw = RawEnvelope {
            sequence_number: self.sequence_number.to_be_bytes(),
            command: self.command.to_u16().to_be_bytes(),
            payload_length: self.payload_length.to_be_bytes(),
        };
        buf[..Self::SIZE].copy_from_slice(raw.as_bytes());
        Ok(Self::SIZE)
    }

    /// Decode an envelope from the front of `buf`.
    ///
    /// A datagram is valid (per §4.1) iff `buf.len() >= 8` and the declared
    /// `payload_length` does not exceed the bytes remaining after the
    /// envelope; this function checks the former and the caller checks the
    /// latter against its actual received length.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InsufficientBuffer` if fewer than
    /// [`Envelope::SIZE`] bytes are available, or `ProtocolError::UnknownCommand`
    /// if the command field does not name [`Command::Report`],
    /// [`Command::Leaving`], or [`Command::WorldState`].
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let raw = RawEnvelope::ref_from_prefix(buf)
            .map_err(|_| ProtocolError::InsufficientBuffer { needed: Self::SIZE, available: buf.len() })?
            .0;

        let command_value = u16::from_be_bytes(raw.command);
        let command = Command::from_u16(command_value)
            .ok_or(ProtocolError::UnknownCommand(command_value))?;

        Ok(Self {
            sequence_number: u32::from_be_bytes(raw.sequence_number),
            command,
            payload_length: u16::from_be_bytes(raw.payload_length),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let env = Envelope::new(0x0102_0304, Command::Report, &[0u8; 10]);
        let mut buf = [0u8; Envelope::SIZE];
        env.encode(&mut buf).unwrap();
        let decoded = Envelope::decode(&buf).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn endianness_of_sequence_number() {
        let env = Envelope::new(0x0102_0304, Command::Report, &[]);
        let mut buf = [0u8; Envelope::SIZE];
        env.encode(&mut buf).unwrap();
        assert_eq!(&buf[0..4], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn reject_short_buffer() {
        let buf = [0u8; 4];
        assert!(matches!(
            Envelope::decode(&buf),
            Err(ProtocolError::InsufficientBuffer { .. })
        ));
    }

    #[test]
    fn reject_unknown_command() {
        let mut buf = [0u8; Envelope::SIZE];
        buf[4..6].copy_from_slice(&99u16.to_be_bytes());
        assert!(matches!(Envelope::decode(&buf), Err(ProtocolError::UnknownCommand(99))));
    }

    #[test]
    fn reject_oversized_payload() {
        let env = Envelope { sequence_number: 1, command: Command::Report, payload_length: (MAX_PAYLOAD_LEN + 1) as u16 };
        let mut buf = [0u8; Envelope::SIZE];
        assert!(matches!(env.encode(&mut buf), Err(ProtocolError::PayloadTooLarge(_))));
    }
}
