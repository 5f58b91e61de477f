//! Transport endpoints
//!
//! An endpoint wraps one TCP connection to a server. Messages are framed by
//! [`crate::message`]; bulk payloads are read and written directly on the
//! stream after the frame. TCP_NODELAY is set so small framed messages are
//! not delayed behind Nagle's algorithm.

use crate::message::Message;
use reef_core::Result;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};

/// One connection to a server.
#[derive(Debug)]
pub struct Endpoint {
    stream: TcpStream,
    peer: String,
}

impl Endpoint {
    /// Connect to `addr` (`host:port`).
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            peer: addr.to_string(),
        })
    }

    /// Wrap an accepted server-side stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        Ok(Self { stream, peer })
    }

    /// The peer address this endpoint talks to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send a framed message including its side payloads.
    pub fn send(&mut self, message: &Message) -> Result<()> {
        message.send(&mut self.stream)
    }

    /// Receive one framed message.
    pub fn receive(&mut self) -> Result<Message> {
        Message::receive(&mut self.stream)
    }

    /// Read exactly `buf.len()` bulk bytes following a frame.
    pub fn read_bulk(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream.read_exact(buf)?;
        Ok(())
    }

    /// Write bulk bytes following a frame.
    pub fn write_bulk(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf)?;
        Ok(())
    }

    /// Shut down both directions. Further sends fail.
    pub fn close(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageOp;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn framed_round_trip_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut endpoint = Endpoint::from_stream(stream).unwrap();
            let mut request = endpoint.receive().unwrap();
            assert_eq!(request.op(), MessageOp::KvGet);
            assert_eq!(request.get_str().unwrap(), "ns");

            let mut reply = Message::reply_to(&request);
            reply.append_block(b"value");
            endpoint.send(&reply).unwrap();
        });

        let mut endpoint = Endpoint::connect(&addr).unwrap();
        let mut request = Message::new(MessageOp::KvGet);
        request.add_operation();
        request.append_str("ns").unwrap();
        endpoint.send(&request).unwrap();

        let mut reply = endpoint.receive().unwrap();
        reply.expect_reply_for(&request).unwrap();
        assert_eq!(reply.get_block().unwrap(), b"value");

        server.join().unwrap();
    }
}
