//! Optional per-datagram hex packet log (§6.4).
//!
//! Distinct from `tracing`: this is a wire-format artifact meant for a
//! human replaying a session after the fact, one line per datagram, not a
//! structured log level. Format: `<direction>:<local_time_ms>:<peer_addr>:<hex_bytes>`.

use std::{
    fmt::Write as _,
    io::{self, Write},
    net::SocketAddr,
};

/// Direction a logged datagram traveled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Received from the peer.
    Received,
    /// Sent to the peer.
    Sent,
}

impl Direction {
    fn tag(self) -> char {
        match self {
            Direction::Received => 'R',
            Direction::Sent => 'S',
        }
    }
}

/// Appends one line per datagram to an underlying writer, flushing after
/// each record so a crash doesn't lose the most recent lines.
pub struct PacketLog<W: Write> {
    writer: W,
}

impl<W: Write> PacketLog<W> {
    /// Wrap `writer` as a packet log sink.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Record one datagram.
    ///
    /// # Errors
    ///
    /// Propagates any I/O error from the underlying writer.
    pub fn record(
        &mut self,
        direction: Direction,
        local_time_ms: u32,
        peer: SocketAddr,
        bytes: &[u8],
    ) -> io::Result<()> {
        let mut hex = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            let _ = write!(hex, "{byte:02x}");
        }
        writeln!(self.writer, "{}:{local_time_ms}:{peer}:{hex}", direction.tag())?;
        self.writer.flush()
    }
}
