//! ARP for Ethernet/IPv4 (RFC 826).
//!
//! Layout: `[hw type (2)][proto type (2)][hw len (1)][proto len (1)][op (2)]`
//! `[sender hw (6)][sender proto (4)][target hw (6)][target proto (4)]`.

use core::net::Ipv4Addr;

use crate::ethernet::{EtherType, MacAddr};
use crate::{ensure_len, ensure_out_buf_len, read_ipv4, read_u16, Header, PacketError};

pub const HW_TYPE_ETHERNET: u16 = 1;
pub const PROTO_TYPE_IPV4: u16 = EtherType::IPV4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOp {
    Request,
    Reply,
    Other(u16),
}

impl ArpOp {
    pub fn from_u16(op: u16) -> Self {
        match op {
            1 => Self::Request,
            2 => Self::Reply,
            other => Self::Other(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::Request => 1,
            Self::Reply => 2,
            Self::Other(other) => other,
        }
    }
}

/// An ARP packet. `parse` only checks the length; use [`ArpPacket::is_ethernet_ipv4`] before
/// trusting the address fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub hw_type: u16,
    pub proto_type: u16,
    pub hw_len: u8,
    pub proto_len: u8,
    pub op: ArpOp,
    pub sender_hw: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_hw: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    pub const PACKET_LEN: usize = 28;

    pub fn request(sender_hw: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self::ethernet_ipv4(
            ArpOp::Request,
            sender_hw,
            sender_ip,
            MacAddr::UNSPECIFIED,
            target_ip,
        )
    }

    pub fn reply(
        sender_hw: MacAddr,
        sender_ip: Ipv4Addr,
        target_hw: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self::ethernet_ipv4(ArpOp::Reply, sender_hw, sender_ip, target_hw, target_ip)
    }

    fn ethernet_ipv4(
        op: ArpOp,
        sender_hw: MacAddr,
        sender_ip: Ipv4Addr,
        target_hw: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            hw_type: HW_TYPE_ETHERNET,
            proto_type: PROTO_TYPE_IPV4,
            hw_len: 6,
            proto_len: 4,
            op,
            sender_hw,
            sender_ip,
            target_hw,
            target_ip,
        }
    }

    /// True when the hardware/protocol type and length fields describe Ethernet + IPv4.
    pub fn is_ethernet_ipv4(&self) -> bool {
        self.hw_type == HW_TYPE_ETHERNET
            && self.proto_type == PROTO_TYPE_IPV4
            && self.hw_len == 6
            && self.proto_len == 4
    }

    pub fn build_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::PACKET_LEN];
        let _ = self.write(&mut out);
        out
    }
}

impl Header for ArpPacket {
    const LEN: usize = Self::PACKET_LEN;

    fn parse(buf: &[u8]) -> Result<Self, PacketError> {
        ensure_len(buf, Self::PACKET_LEN)?;
        let mut sender_hw = [0u8; 6];
        let mut target_hw = [0u8; 6];
        sender_hw.copy_from_slice(&buf[8..14]);
        target_hw.copy_from_slice(&buf[18..24]);
        Ok(Self {
            hw_type: read_u16(buf, 0),
            proto_type: read_u16(buf, 2),
            hw_len: buf[4],
            proto_len: buf[5],
            op: ArpOp::from_u16(read_u16(buf, 6)),
            sender_hw: MacAddr(sender_hw),
            sender_ip: read_ipv4(buf, 14),
            target_hw: MacAddr(target_hw),
            target_ip: read_ipv4(buf, 24),
        })
    }

    fn write(&self, out: &mut [u8]) -> Result<usize, PacketError> {
        ensure_out_buf_len(out, Self::PACKET_LEN)?;
        out[0..2].copy_from_slice(&self.hw_type.to_be_bytes());
        out[2..4].copy_from_slice(&self.proto_type.to_be_bytes());
        out[4] = self.hw_len;
        out[5] = self.proto_len;
        out[6..8].copy_from_slice(&self.op.to_u16().to_be_bytes());
        out[8..14].copy_from_slice(&self.sender_hw.0);
        out[14..18].copy_from_slice(&self.sender_ip.octets());
        out[18..24].copy_from_slice(&self.target_hw.0);
        out[24..28].copy_from_slice(&self.target_ip.octets());
        Ok(Self::PACKET_LEN)
    }
}
