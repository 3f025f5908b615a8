use core::net::Ipv4Addr;
use core::ops::Range;
use std::fmt;

use unet_wire::Header;

use crate::error::{Error, Result};

/// One link-layer frame plus routing metadata.
///
/// `net` and `transport` are optional views into `data` marking where the network and transport
/// layer headers start. They are stored as offsets, so clones keep pointing at the same headers.
#[derive(Clone)]
pub struct Frame {
    data: Vec<u8>,
    net: Option<Range<usize>>,
    transport: Option<Range<usize>>,
    /// Resolve `hop_addr` through ARP and stamp the Ethernet destination before transmission.
    pub do_ipv4_routing: bool,
    /// Next hop the frame is waiting on (or was last routed to).
    pub hop_addr: Ipv4Addr,
    /// Capacity charged by the queue currently holding the frame.
    pub(crate) cost: usize,
}

impl Frame {
    pub fn zeroed(len: usize) -> Self {
        Self::from(vec![0u8; len])
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from(bytes.to_vec())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Shorten the buffer, clipping any view that extended past the new end.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
        let len = self.data.len();
        for view in [&mut self.net, &mut self.transport].into_iter().flatten() {
            view.end = view.end.min(len);
            view.start = view.start.min(view.end);
        }
    }

    pub fn net(&self) -> Option<&[u8]> {
        self.net.clone().map(|r| &self.data[r])
    }

    pub fn net_mut(&mut self) -> Option<&mut [u8]> {
        match self.net.clone() {
            Some(r) => Some(&mut self.data[r]),
            None => None,
        }
    }

    pub fn net_range(&self) -> Option<Range<usize>> {
        self.net.clone()
    }

    pub fn set_net(&mut self, offset: usize, len: usize) -> Result<()> {
        self.net = Some(self.checked_view(offset, len)?);
        Ok(())
    }

    pub fn clear_net(&mut self) {
        self.net = None;
    }

    pub fn transport(&self) -> Option<&[u8]> {
        self.transport.clone().map(|r| &self.data[r])
    }

    pub fn transport_mut(&mut self) -> Option<&mut [u8]> {
        match self.transport.clone() {
            Some(r) => Some(&mut self.data[r]),
            None => None,
        }
    }

    pub fn transport_range(&self) -> Option<Range<usize>> {
        self.transport.clone()
    }

    pub fn set_transport(&mut self, offset: usize, len: usize) -> Result<()> {
        self.transport = Some(self.checked_view(offset, len)?);
        Ok(())
    }

    pub fn clear_transport(&mut self) {
        self.transport = None;
    }

    /// Parse the header at the start of the buffer.
    pub fn data_as<T: Header>(&self) -> Result<T> {
        Ok(T::parse(&self.data)?)
    }

    /// Parse the header at the start of the network view. A missing view reads as empty.
    pub fn net_as<T: Header>(&self) -> Result<T> {
        Ok(T::parse(self.net().unwrap_or_default())?)
    }

    pub fn transport_as<T: Header>(&self) -> Result<T> {
        Ok(T::parse(self.transport().unwrap_or_default())?)
    }

    fn checked_view(&self, offset: usize, len: usize) -> Result<Range<usize>> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(offset..end),
            _ => Err(Error::ViewOutOfBounds {
                offset,
                len,
                data_len: self.data.len(),
            }),
        }
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self {
            data,
            net: None,
            transport: None,
            do_ipv4_routing: false,
            hop_addr: Ipv4Addr::UNSPECIFIED,
            cost: 0,
        }
    }
}

impl From<&str> for Frame {
    fn from(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.data.len())
            .field("net", &self.net)
            .field("transport", &self.transport)
            .field("do_ipv4_routing", &self.do_ipv4_routing)
            .field("hop_addr", &self.hop_addr)
            .finish()
    }
}

impl PartialEq<[u8]> for Frame {
    fn eq(&self, other: &[u8]) -> bool {
        self.data == other
    }
}

impl PartialEq<&[u8]> for Frame {
    fn eq(&self, other: &&[u8]) -> bool {
        self.data == *other
    }
}

impl PartialEq<&str> for Frame {
    fn eq(&self, other: &&str) -> bool {
        self.data == other.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unet_wire::{EtherType, EthernetHeader, Ipv4Header, MacAddr, PacketError};

    #[test]
    fn clone_is_deep_and_keeps_views() {
        let mut frame = Frame::from_bytes(b"0123456789");
        frame.set_net(2, 5).unwrap();
        frame.set_transport(4, 3).unwrap();
        frame.hop_addr = Ipv4Addr::new(10, 0, 0, 1);

        let mut copy = frame.clone();
        copy.data_mut()[3] = b'x';

        assert_eq!(frame, "0123456789");
        assert_eq!(copy, "012x456789");
        assert_eq!(copy.net(), Some(&b"2x456"[..]));
        assert_eq!(copy.transport(), Some(&b"456"[..]));
        assert_eq!(copy.hop_addr, frame.hop_addr);
    }

    #[test]
    fn views_must_fit_the_buffer() {
        let mut frame = Frame::zeroed(8);
        frame.set_net(8, 0).unwrap();
        assert!(matches!(
            frame.set_net(4, 5),
            Err(Error::ViewOutOfBounds {
                offset: 4,
                len: 5,
                data_len: 8
            })
        ));
        assert!(frame.set_transport(usize::MAX, 2).is_err());
        assert_eq!(frame.net(), Some(&[][..]));
    }

    #[test]
    fn truncate_clips_views() {
        let mut frame = Frame::zeroed(20);
        frame.set_net(10, 10).unwrap();
        frame.set_transport(16, 4).unwrap();
        frame.truncate(12);
        assert_eq!(frame.net_range(), Some(10..12));
        assert_eq!(frame.transport_range(), Some(12..12));
    }

    #[test]
    fn typed_access_is_bounds_checked() {
        let eth = EthernetHeader {
            dst: MacAddr::BROADCAST,
            src: MacAddr([2, 0, 0, 0, 0, 1]),
            ethertype: EtherType::IPV4,
        };
        let mut frame = Frame::from(eth.build_vec(&[0u8; 4]));
        assert_eq!(frame.data_as::<EthernetHeader>().unwrap(), eth);

        assert!(matches!(
            frame.net_as::<Ipv4Header>(),
            Err(Error::Packet(PacketError::Truncated { needed: 20, actual: 0 }))
        ));
        frame.set_net(EthernetHeader::HEADER_LEN, 4).unwrap();
        assert!(matches!(
            frame.net_as::<Ipv4Header>(),
            Err(Error::Packet(PacketError::Truncated { needed: 20, actual: 4 }))
        ));
    }

    #[test]
    fn compares_against_bytes() {
        let frame = Frame::from_bytes(&[1, 2, 3]);
        assert_eq!(frame, &[1u8, 2, 3][..]);
        assert!(frame != &[1u8, 2][..]);
        assert!(Frame::zeroed(0).is_empty());
        assert_eq!(Frame::from("abc"), "abc");
    }
}
