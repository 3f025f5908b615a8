//! Fixed-layout wire formats for the userspace stack.
//!
//! Every header is a plain value type that is parsed from (and written into) a byte slice at
//! known offsets, with multi-byte fields in network byte order. Nothing here allocates except the
//! `*_vec` convenience builders.
#![forbid(unsafe_code)]

pub mod arp;
pub mod checksum;
pub mod cidr;
pub mod ethernet;
pub mod icmpv4;
pub mod ipv4;

pub use arp::{ArpOp, ArpPacket};
pub use cidr::Ipv4Cidr;
pub use ethernet::{EtherType, EthernetHeader, MacAddr};
pub use icmpv4::{Icmpv4Echo, Icmpv4Header};
pub use ipv4::{Ipv4Header, Ipv4Protocol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("truncated packet: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("malformed packet: {0}")]
    Malformed(&'static str),

    #[error("output buffer too small: need {needed} bytes, have {actual}")]
    BufferTooSmall { needed: usize, actual: usize },
}

/// A header with a fixed minimum encoded length.
///
/// Implementors only validate what is needed to read their fields safely; protocol-level checks
/// (versions, checksums, address matches) are left to the caller so malformed input can be
/// dropped with a precise reason.
pub trait Header: Sized {
    /// Minimum number of bytes `parse` needs.
    const LEN: usize;

    fn parse(buf: &[u8]) -> Result<Self, PacketError>;

    /// Write the header to the front of `out`, returning the number of bytes written.
    fn write(&self, out: &mut [u8]) -> Result<usize, PacketError>;
}

pub(crate) fn ensure_len(buf: &[u8], needed: usize) -> Result<(), PacketError> {
    if buf.len() < needed {
        return Err(PacketError::Truncated {
            needed,
            actual: buf.len(),
        });
    }
    Ok(())
}

pub(crate) fn ensure_out_buf_len(out: &[u8], needed: usize) -> Result<(), PacketError> {
    if out.len() < needed {
        return Err(PacketError::BufferTooSmall {
            needed,
            actual: out.len(),
        });
    }
    Ok(())
}

pub(crate) fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

pub(crate) fn read_ipv4(buf: &[u8], offset: usize) -> core::net::Ipv4Addr {
    core::net::Ipv4Addr::new(
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    )
}
