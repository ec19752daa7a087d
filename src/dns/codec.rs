//! Minimal DNS Message Codec
//!
//! Parses the header and first question of a query and builds responses that
//! echo the question with at most one A record.
//!
//! ```text
//!  0  1  2  3  4  5  6  7  8  9 10 11 12 13 14 15
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                      ID                       |
//! |QR|  Opcode   |AA|TC|RD|RA|   Z    |   RCODE   |
//! |                QD/AN/NS/AR COUNT              |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! ```

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Fixed header size
pub const HEADER_LEN: usize = 12;

/// Largest message sent over plain UDP
pub const MAX_UDP_MESSAGE: usize = 512;

pub const TYPE_A: u16 = 1;
pub const CLASS_IN: u16 = 1;

const FLAG_QR: u16 = 0x8000;
const FLAG_AA: u16 = 0x0400;
const FLAG_RD: u16 = 0x0100;
const OPCODE_MASK: u16 = 0x7800;

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;

/// Pointer to the question name at offset 12
const QUESTION_NAME_POINTER: u16 = 0xC000 | HEADER_LEN as u16;

/// Response codes this server produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rcode {
    NoError = 0,
    FormErr = 1,
    ServFail = 2,
    NxDomain = 3,
    NotImp = 4,
}

impl std::fmt::Display for Rcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Rcode::NoError => "NOERROR",
            Rcode::FormErr => "FORMERR",
            Rcode::ServFail => "SERVFAIL",
            Rcode::NxDomain => "NXDOMAIN",
            Rcode::NotImp => "NOTIMP",
        };
        f.write_str(name)
    }
}

/// The first question of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Dotted name without the trailing dot, as sent
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
    /// Wire form of the name, echoed back verbatim
    labels: Bytes,
}

impl Question {
    /// Case-insensitive match against a dotted name; a trailing dot is ignored.
    pub fn is_for(&self, name: &str) -> bool {
        self.name
            .eq_ignore_ascii_case(name.strip_suffix('.').unwrap_or(name))
    }
}

/// A parsed query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub id: u16,
    pub flags: u16,
    pub question: Question,
}

impl Query {
    pub fn opcode(&self) -> u8 {
        ((self.flags & OPCODE_MASK) >> 11) as u8
    }

    pub fn recursion_desired(&self) -> bool {
        self.flags & FLAG_RD != 0
    }
}

fn malformed(reason: impl Into<String>) -> Error {
    Error::DnsCodec(reason.into())
}

/// Transaction id of a message, if it has a full header.
pub fn peek_id(packet: &[u8]) -> Option<(u16, u16)> {
    if packet.len() < HEADER_LEN {
        return None;
    }
    let mut buf = packet;
    Some((buf.get_u16(), buf.get_u16()))
}

/// Parse a query message.
pub fn parse_query(packet: &[u8]) -> Result<Query> {
    if packet.len() < HEADER_LEN {
        return Err(malformed("message shorter than header"));
    }
    let mut buf = packet;
    let id = buf.get_u16();
    let flags = buf.get_u16();
    let qdcount = buf.get_u16();
    buf.advance(6);

    if flags & FLAG_QR != 0 {
        return Err(malformed("message is a response"));
    }
    if qdcount == 0 {
        return Err(malformed("no question"));
    }

    let start = HEADER_LEN;
    let mut labels = Vec::new();
    loop {
        if !buf.has_remaining() {
            return Err(malformed("name runs past end of message"));
        }
        let len = buf.get_u8() as usize;
        if len & 0xC0 != 0 {
            return Err(malformed("compressed or extended label in question"));
        }
        if len == 0 {
            break;
        }
        if len > MAX_LABEL_LEN || buf.remaining() < len {
            return Err(malformed("bad label length"));
        }
        let label = std::str::from_utf8(&buf[..len])
            .map_err(|_| malformed("label is not valid text"))?;
        labels.push(label.to_string());
        buf.advance(len);
    }
    let name_end = packet.len() - buf.remaining();
    if name_end - start > MAX_NAME_LEN {
        return Err(malformed("name too long"));
    }

    if buf.remaining() < 4 {
        return Err(malformed("truncated question"));
    }
    let qtype = buf.get_u16();
    let qclass = buf.get_u16();

    Ok(Query {
        id,
        flags,
        question: Question {
            name: labels.join("."),
            qtype,
            qclass,
            labels: Bytes::copy_from_slice(&packet[start..name_end]),
        },
    })
}

fn response_flags(request_flags: u16, rcode: Rcode) -> u16 {
    FLAG_QR | FLAG_AA | (request_flags & (OPCODE_MASK | FLAG_RD)) | rcode as u16
}

/// Build a response echoing the question, with an optional A answer.
pub fn build_response(query: &Query, rcode: Rcode, answer: Option<(Ipv4Addr, u32)>) -> Bytes {
    let question = &query.question;
    let mut out = BytesMut::with_capacity(HEADER_LEN + question.labels.len() + 4 + 16);

    out.put_u16(query.id);
    out.put_u16(response_flags(query.flags, rcode));
    out.put_u16(1);
    out.put_u16(u16::from(answer.is_some()));
    out.put_u16(0);
    out.put_u16(0);

    out.put_slice(&question.labels);
    out.put_u16(question.qtype);
    out.put_u16(question.qclass);

    if let Some((address, ttl)) = answer {
        out.put_u16(QUESTION_NAME_POINTER);
        out.put_u16(TYPE_A);
        out.put_u16(CLASS_IN);
        out.put_u32(ttl);
        out.put_u16(4);
        out.put_slice(&address.octets());
    }

    out.freeze()
}

/// Header-only response for a message whose question could not be parsed.
pub fn build_error(id: u16, request_flags: u16, rcode: Rcode) -> Bytes {
    let mut out = BytesMut::with_capacity(HEADER_LEN);
    out.put_u16(id);
    out.put_u16(response_flags(request_flags, rcode));
    out.put_bytes(0, 8);
    out.freeze()
}
