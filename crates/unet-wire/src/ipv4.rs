use core::net::Ipv4Addr;

use crate::checksum::checksum;
use crate::{ensure_len, ensure_out_buf_len, read_ipv4, read_u16, Header, PacketError};

pub struct Ipv4Protocol;

impl Ipv4Protocol {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

/// Fixed part of an IPv4 header. Options are neither parsed nor emitted, but `header_len` reports
/// their presence so callers can skip them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    /// Header length in bytes (IHL * 4).
    pub header_len: usize,
    pub dscp_ecn: u8,
    pub total_len: u16,
    pub identification: u16,
    pub flags_fragment: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    pub const MIN_LEN: usize = 20;
    pub const DEFAULT_TTL: u8 = 64;
    pub const FLAG_DONT_FRAGMENT: u16 = 0x4000;

    /// An option-less header for a datagram carrying `payload_len` bytes. The checksum field is
    /// filled in by [`Header::write`].
    pub fn new(
        src: Ipv4Addr,
        dst: Ipv4Addr,
        protocol: u8,
        identification: u16,
        payload_len: usize,
    ) -> Self {
        Self {
            version: 4,
            header_len: Self::MIN_LEN,
            dscp_ecn: 0,
            total_len: (Self::MIN_LEN + payload_len).min(u16::MAX as usize) as u16,
            identification,
            flags_fragment: Self::FLAG_DONT_FRAGMENT,
            ttl: Self::DEFAULT_TTL,
            protocol,
            checksum: 0,
            src,
            dst,
        }
    }

    /// Read only the destination address, without parsing or validating the rest of the header.
    pub fn peek_dst(buf: &[u8]) -> Result<Ipv4Addr, PacketError> {
        ensure_len(buf, Self::MIN_LEN)?;
        Ok(read_ipv4(buf, 16))
    }

    /// True when the ones'-complement sum over the encoded header (options included) is zero.
    pub fn verify_checksum(buf: &[u8]) -> bool {
        let Some(&first) = buf.first() else {
            return false;
        };
        let header_len = usize::from(first & 0x0f) * 4;
        header_len >= Self::MIN_LEN && buf.len() >= header_len && checksum(&buf[..header_len]) == 0
    }

    /// Build a complete datagram (header + payload) with a valid checksum.
    pub fn build_vec(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; Self::MIN_LEN + payload.len()];
        let _ = self.write(&mut out);
        out[Self::MIN_LEN..].copy_from_slice(payload);
        out
    }
}

impl Header for Ipv4Header {
    const LEN: usize = Self::MIN_LEN;

    /// Checks the version and that the declared header length is present; total length, checksum
    /// and addressing are left to the receiver.
    fn parse(buf: &[u8]) -> Result<Self, PacketError> {
        ensure_len(buf, Self::MIN_LEN)?;
        let version = buf[0] >> 4;
        if version != 4 {
            return Err(PacketError::Malformed("IPv4 version"));
        }
        let header_len = usize::from(buf[0] & 0x0f) * 4;
        if header_len < Self::MIN_LEN {
            return Err(PacketError::Malformed("IPv4 header length"));
        }
        ensure_len(buf, header_len)?;
        Ok(Self {
            version,
            header_len,
            dscp_ecn: buf[1],
            total_len: read_u16(buf, 2),
            identification: read_u16(buf, 4),
            flags_fragment: read_u16(buf, 6),
            ttl: buf[8],
            protocol: buf[9],
            checksum: read_u16(buf, 10),
            src: read_ipv4(buf, 12),
            dst: read_ipv4(buf, 16),
        })
    }

    /// Always emits a 20 byte header and computes a fresh checksum; `self.checksum` is ignored.
    fn write(&self, out: &mut [u8]) -> Result<usize, PacketError> {
        ensure_out_buf_len(out, Self::MIN_LEN)?;
        out[0] = (4u8 << 4) | 5;
        out[1] = self.dscp_ecn;
        out[2..4].copy_from_slice(&self.total_len.to_be_bytes());
        out[4..6].copy_from_slice(&self.identification.to_be_bytes());
        out[6..8].copy_from_slice(&self.flags_fragment.to_be_bytes());
        out[8] = self.ttl;
        out[9] = self.protocol;
        out[10..12].copy_from_slice(&[0, 0]);
        out[12..16].copy_from_slice(&self.src.octets());
        out[16..20].copy_from_slice(&self.dst.octets());
        let csum = checksum(&out[..Self::MIN_LEN]);
        out[10..12].copy_from_slice(&csum.to_be_bytes());
        Ok(Self::MIN_LEN)
    }
}
