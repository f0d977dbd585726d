//! The handful of ASN.1 BER primitives the emulated agent needs.
//!
//! Every encoder funnels through [`tlv`], which derives the length field
//! from the content it wraps, so a length can never disagree with its
//! payload.

use crate::error::{
    DecodeError,
    Malformed,
};
use bytes::Bytes;

pub mod tag {
    pub const INTEGER: u8 = 0x02;
    pub const OCTET_STRING: u8 = 0x04;
    #[cfg(test)]
    pub const NULL: u8 = 0x05;
    pub const OID: u8 = 0x06;
    pub const SEQUENCE: u8 = 0x30;
    pub const GET_REQUEST: u8 = 0xA0;
    pub const GET_RESPONSE: u8 = 0xA2;
}

/// Largest content length [`encode_length`] can express.
pub const MAX_LENGTH: usize = 0xFFFF;

/// Short form below 128, then one or two length octets. Callers keep
/// content within [`MAX_LENGTH`].
pub fn encode_length(len: usize) -> Vec<u8> {
    debug_assert!(len <= MAX_LENGTH, "length {} out of range", len);
    if len < 0x80 {
        vec![len as u8]
    } else if len <= 0xFF {
        vec![0x81, len as u8]
    } else {
        vec![0x82, (len >> 8) as u8, len as u8]
    }
}

/// Size of a TLV around `content_len` bytes, for checking a message fits
/// before building it. Anything past [`MAX_LENGTH`] only has to compare as
/// too large.
pub fn encoded_len(content_len: usize) -> usize {
    let length = match content_len {
        0..=0x7F => 1,
        0x80..=0xFF => 2,
        0x100..=MAX_LENGTH => 3,
        _ => 4,
    };
    1 + length + content_len
}

pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let length = encode_length(content.len());
    let mut out = Vec::with_capacity(1 + length.len() + content.len());
    out.push(tag);
    out.extend_from_slice(&length);
    out.extend_from_slice(content);
    out
}

/// Unsigned values only; 128 and above always take two content bytes.
pub fn encode_integer(value: u16) -> Vec<u8> {
    if value < 0x80 {
        tlv(tag::INTEGER, &[value as u8])
    } else {
        tlv(tag::INTEGER, &value.to_be_bytes())
    }
}

pub fn encode_octet_string(content: &[u8]) -> Vec<u8> {
    tlv(tag::OCTET_STRING, content)
}

/// `arcs` must hold at least two arcs; the first two share one subidentifier.
pub fn encode_oid(arcs: &[u32]) -> Vec<u8> {
    debug_assert!(arcs.len() >= 2, "OID needs two arcs, got {:?}", arcs);
    let (first, rest) = match arcs {
        [a, b, rest @ ..] => (40 * a + b, rest),
        [a] => (40 * a, &[][..]),
        [] => (0, &[][..]),
    };

    let mut body = Vec::with_capacity(arcs.len() + 4);
    push_subidentifier(&mut body, first);
    for &arc in rest {
        push_subidentifier(&mut body, arc);
    }
    tlv(tag::OID, &body)
}

fn push_subidentifier(out: &mut Vec<u8>, value: u32) {
    let mut groups = [0u8; 5];
    let mut n = 0;
    let mut rest = value;
    loop {
        groups[n] = (rest & 0x7F) as u8;
        n += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let more = if i == 0 { 0 } else { 0x80 };
        out.push(groups[i] | more);
    }
}

pub fn encode_sequence(content: &[u8]) -> Vec<u8> {
    tlv(tag::SEQUENCE, content)
}

/// One decoded tag-length-value; `offset` is where `content` starts in the
/// original datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tag: u8,
    pub offset: usize,
    pub content: &'a [u8],
}

impl<'a> Tlv<'a> {
    /// Reader over this element's children.
    pub fn reader(&self) -> Reader<'a> {
        Reader::nested(self.content, self.offset)
    }

    /// Big-endian unsigned value of up to four content bytes.
    pub fn unsigned(&self) -> Result<u32, DecodeError> {
        if self.content.is_empty() || self.content.len() > 4 {
            return Err(DecodeError::at(
                self.offset,
                Malformed::BadInteger(self.content.len()),
            ));
        }
        Ok(self
            .content
            .iter()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
    }
}

/// Cursor over a buffer of consecutive BER elements.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::nested(data, 0)
    }

    fn nested(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn offset(&self) -> usize {
        self.base + self.pos
    }

    fn truncated(&self, needed: usize) -> DecodeError {
        DecodeError::at(
            self.offset(),
            Malformed::Truncated {
                needed,
                available: self.data.len() - self.pos,
            },
        )
    }

    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let byte = *self.data.get(self.pos).ok_or_else(|| self.truncated(1))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_length(&mut self) -> Result<usize, DecodeError> {
        let first = self.read_byte()?;
        match first {
            0x00..=0x7F => Ok(first as usize),
            0x81 => Ok(self.read_byte()? as usize),
            0x82 => {
                let hi = self.read_byte()? as usize;
                let lo = self.read_byte()? as usize;
                Ok((hi << 8) | lo)
            }
            _ => Err(DecodeError::at(
                self.offset() - 1,
                Malformed::UnsupportedLength(first),
            )),
        }
    }

    pub fn read_tlv(&mut self) -> Result<Tlv<'a>, DecodeError> {
        let tag = self.read_byte()?;
        let len = self.read_length()?;
        if self.data.len() - self.pos < len {
            return Err(self.truncated(len));
        }
        let tlv = Tlv {
            tag,
            offset: self.offset(),
            content: &self.data[self.pos..self.pos + len],
        };
        self.pos += len;
        Ok(tlv)
    }

    pub fn expect(&mut self, expected: u8) -> Result<Tlv<'a>, DecodeError> {
        let actual = *self.data.get(self.pos).ok_or_else(|| self.truncated(1))?;
        if actual != expected {
            return Err(DecodeError::at(
                self.offset(),
                Malformed::UnexpectedTag { expected, actual },
            ));
        }
        self.read_tlv()
    }
}

/// The parts of a GetRequest the agent uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnmpQuery {
    pub version: u32,
    pub community: Bytes,
    /// Raw content octets, echoed back untouched.
    pub request_id: Bytes,
}

/// Walks `SEQUENCE { version, community, GetRequest { request-id, .. } }`.
/// Anything after the request id, including the requested OIDs, is ignored.
pub fn decode_request(datagram: &[u8]) -> Result<SnmpQuery, DecodeError> {
    let mut message = Reader::new(datagram).expect(tag::SEQUENCE)?.reader();
    let version = message.expect(tag::INTEGER)?.unsigned()?;
    let community = message.expect(tag::OCTET_STRING)?;
    let mut pdu = message.expect(tag::GET_REQUEST)?.reader();
    let request_id = pdu.expect(tag::INTEGER)?;
    if request_id.content.is_empty() {
        return Err(DecodeError::at(request_id.offset, Malformed::BadInteger(0)));
    }

    Ok(SnmpQuery {
        version,
        community: Bytes::copy_from_slice(community.content),
        request_id: Bytes::copy_from_slice(request_id.content),
    })
}
