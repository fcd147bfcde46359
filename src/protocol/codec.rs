use std::io;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::packet::Packet;

/// Largest payload the checker accepts from the server.
///
/// Diagnostic queries return a single small row; anything larger means the
/// stream is out of sync or the peer is not a MySQL server.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// MySQL packet codec for use with tokio Framed
#[derive(Debug)]
pub struct PacketCodec {
    max_payload: usize,
}

impl PacketCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() >= 3 {
            let len = src[0] as usize | ((src[1] as usize) << 8) | ((src[2] as usize) << 16);
            if len > self.max_payload {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("packet of {} bytes exceeds limit of {}", len, self.max_payload),
                ));
            }
        }
        Ok(Packet::decode(src))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst);
        Ok(())
    }
}
