//! Blocking request/reply transactor.
//!
//! The protocol is strictly half-duplex: one request, then its reply, with
//! no request ids to de-multiplex anything else. Each exchange writes the
//! whole outgoing packet, reads the reply header, validates the declared
//! body size, reads the declared body, and checks the reply tag against the
//! request tag. There is no timeout on an in-flight exchange; a hung daemon
//! hangs the caller.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;

use tracing::trace;

use super::protocol::{Header, MessageType, Reply, Request, HEADER_LEN};
use crate::error::{DriverError, Result};

#[derive(Debug)]
pub struct Transport {
    stream: UnixStream,
}

impl Transport {
    pub fn new(stream: UnixStream) -> Self {
        Transport { stream }
    }

    /// Perform one full request/reply exchange.
    ///
    /// A zero-byte read anywhere means the daemon closed the connection;
    /// the caller never sees a partially populated reply. A `Failure`
    /// reply is surfaced as [`DriverError::Daemon`]; any other tag
    /// mismatch is [`DriverError::UnexpectedReply`].
    pub fn exchange(&mut self, req: &Request) -> Result<Reply> {
        let packet = req.encode()?;
        let expected = req.message_type();
        trace!(tag = expected as u32, len = packet.len(), "sending request");

        self.stream.write_all(&packet)?;

        let mut raw = [0u8; HEADER_LEN];
        self.read_full(&mut raw)?;
        let header = Header::decode(&raw)?;

        let mut body = vec![0u8; header.body_len as usize];
        self.read_full(&mut body)?;
        trace!(tag = header.tag, len = body.len(), "received reply");

        if header.tag != expected as u32 {
            // A failure reply carries the daemon's own code and message;
            // decode and surface them instead of the generic mismatch.
            if header.tag == MessageType::Failure as u32 {
                if let Ok(Reply::Failure { code, message }) =
                    Reply::decode(MessageType::Failure, &body)
                {
                    return Err(DriverError::Daemon { code, message });
                }
            }
            return Err(DriverError::UnexpectedReply {
                expected: expected as u32,
                got: header.tag,
            });
        }

        Reply::decode(expected, &body)
    }

    /// Blocking read of exactly `buf.len()` bytes. The explicit loop keeps
    /// the peer-closed case distinct from other I/O failures.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut got = 0;
        while got < buf.len() {
            let n = self.stream.read(&mut buf[got..])?;
            if n == 0 {
                return Err(DriverError::ConnectionClosed);
            }
            got += n;
        }
        Ok(())
    }
}
