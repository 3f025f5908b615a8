//! ICMPv4 echo (RFC 792).

use crate::checksum::checksum;
use crate::{ensure_len, ensure_out_buf_len, read_u16, Header, PacketError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icmpv4Header {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
}

impl Icmpv4Header {
    pub const HEADER_LEN: usize = 4;
    pub const TYPE_ECHO_REPLY: u8 = 0;
    pub const TYPE_ECHO_REQUEST: u8 = 8;
}

impl Header for Icmpv4Header {
    const LEN: usize = Self::HEADER_LEN;

    fn parse(buf: &[u8]) -> Result<Self, PacketError> {
        ensure_len(buf, Self::HEADER_LEN)?;
        Ok(Self {
            icmp_type: buf[0],
            code: buf[1],
            checksum: read_u16(buf, 2),
        })
    }

    fn write(&self, out: &mut [u8]) -> Result<usize, PacketError> {
        ensure_out_buf_len(out, Self::HEADER_LEN)?;
        out[0] = self.icmp_type;
        out[1] = self.code;
        out[2..4].copy_from_slice(&self.checksum.to_be_bytes());
        Ok(Self::HEADER_LEN)
    }
}

/// Echo request/reply header: the ICMP header followed by identifier and sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icmpv4Echo {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
}

impl Icmpv4Echo {
    pub const HEADER_LEN: usize = 8;

    pub fn request(identifier: u16, sequence: u16) -> Self {
        Self {
            icmp_type: Icmpv4Header::TYPE_ECHO_REQUEST,
            code: 0,
            checksum: 0,
            identifier,
            sequence,
        }
    }

    pub fn reply(identifier: u16, sequence: u16) -> Self {
        Self {
            icmp_type: Icmpv4Header::TYPE_ECHO_REPLY,
            ..Self::request(identifier, sequence)
        }
    }

    /// Encode the echo header and `payload` into a message with a valid checksum.
    pub fn build_vec(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; Self::HEADER_LEN + payload.len()];
        let _ = self.write(&mut out);
        out[Self::HEADER_LEN..].copy_from_slice(payload);
        Self::fill_checksum(&mut out);
        out
    }

    /// Recompute the checksum of a complete encoded message in place.
    pub fn fill_checksum(msg: &mut [u8]) {
        if msg.len() < Icmpv4Header::HEADER_LEN {
            return;
        }
        msg[2..4].copy_from_slice(&[0, 0]);
        let csum = checksum(msg);
        msg[2..4].copy_from_slice(&csum.to_be_bytes());
    }
}

impl Header for Icmpv4Echo {
    const LEN: usize = Self::HEADER_LEN;

    fn parse(buf: &[u8]) -> Result<Self, PacketError> {
        ensure_len(buf, Self::HEADER_LEN)?;
        Ok(Self {
            icmp_type: buf[0],
            code: buf[1],
            checksum: read_u16(buf, 2),
            identifier: read_u16(buf, 4),
            sequence: read_u16(buf, 6),
        })
    }

    fn write(&self, out: &mut [u8]) -> Result<usize, PacketError> {
        ensure_out_buf_len(out, Self::HEADER_LEN)?;
        out[0] = self.icmp_type;
        out[1] = self.code;
        out[2..4].copy_from_slice(&self.checksum.to_be_bytes());
        out[4..6].copy_from_slice(&self.identifier.to_be_bytes());
        out[6..8].copy_from_slice(&self.sequence.to_be_bytes());
        Ok(Self::HEADER_LEN)
    }
}
