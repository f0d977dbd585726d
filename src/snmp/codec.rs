use crate::{
    error::DecodeError,
    snmp::{
        agent::SnmpReply,
        ber::{
            decode_request,
            SnmpQuery,
        },
    },
};
use bytes::BytesMut;
use tokio_util::codec::{
    Decoder,
    Encoder,
};

/// Frames whole datagrams for `UdpFramed`.
///
/// A datagram that fails to parse is still a frame: the decode error is
/// handed to the caller instead of failing the stream, so one bad packet
/// never stops the agent.
///
/// `UdpFramed` calls `decode_eof` after each receive until it returns
/// `None`. An empty buffer therefore means either "this datagram already
/// produced its frame" or "an empty datagram arrived"; `framed` tells the
/// two apart so empty datagrams are reported too.
#[derive(Debug, Copy, Clone, Default)]
pub struct SnmpCodec {
    framed: bool,
}

impl Decoder for SnmpCodec {
    type Error = std::io::Error;
    type Item = Result<SnmpQuery, DecodeError>;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        self.framed = true;
        let datagram = src.split();
        Ok(Some(decode_request(&datagram)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            return self.decode(src);
        }
        if std::mem::take(&mut self.framed) {
            return Ok(None);
        }

        self.framed = true;
        Ok(Some(decode_request(&[])))
    }
}

impl Encoder<SnmpReply> for SnmpCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: SnmpReply, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item.encode());
        Ok(())
    }
}
