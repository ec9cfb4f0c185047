//! Headless connection to the game server.
//!
//! Presentation is somebody else's problem: this wrapper only sends and
//! receives packets, which makes it equally usable from a UI event loop, the
//! scripted CLI binary or the integration tests.

use bincode::{serialize, Options};
use log::debug;
use shared::{Packet, READ_BUFFER_SIZE};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub struct Connection {
    stream: TcpStream,
    pending: Vec<u8>,
}

impl Connection {
    pub async fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        // The protocol has no framing; undelayed small writes keep requests
        // one per segment in practice.
        stream.set_nodelay(true)?;
        debug!("connected to {}", addr);
        Ok(Self {
            stream,
            pending: Vec::new(),
        })
    }

    pub async fn send(&mut self, packet: &Packet) -> io::Result<()> {
        let bytes =
            serialize(packet).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.stream.write_all(&bytes).await
    }

    /// Receives the next packet; `None` on clean end of stream.
    ///
    /// The server bursts broadcasts back to back (a round start is followed
    /// by the first timer tick within microseconds), so unlike the server's
    /// inbound path this side buffers the stream and decodes every packet a
    /// read brings in, not just the first.
    pub async fn recv(&mut self) -> io::Result<Option<Packet>> {
        loop {
            if !self.pending.is_empty() {
                match self.decode_pending()? {
                    Some(packet) => return Ok(Some(packet)),
                    // Partial packet: need more bytes
                    None => {}
                }
            }
            let mut buf = [0u8; READ_BUFFER_SIZE];
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.pending.extend_from_slice(&buf[..n]);
        }
    }

    /// Like [`recv`](Self::recv) but fails with `TimedOut` when no packet
    /// arrives within the given window.
    pub async fn recv_timeout(&mut self, wait: Duration) -> io::Result<Option<Packet>> {
        match timeout(wait, self.recv()).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "no packet within timeout",
            )),
        }
    }

    /// Decodes one packet from the buffered bytes, consuming exactly what it
    /// used. `None` means the buffer holds only part of a packet.
    fn decode_pending(&mut self) -> io::Result<Option<Packet>> {
        // Matches the byte format of bincode's plain serialize/deserialize.
        let options = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes();

        let mut cursor = io::Cursor::new(&self.pending[..]);
        match options.deserialize_from::<_, Packet>(&mut cursor) {
            Ok(packet) => {
                let consumed = cursor.position() as usize;
                self.pending.drain(..consumed);
                Ok(Some(packet))
            }
            Err(e) => match *e {
                bincode::ErrorKind::Io(ref io_err)
                    if io_err.kind() == io::ErrorKind::UnexpectedEof =>
                {
                    Ok(None)
                }
                _ => Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            },
        }
    }
}
