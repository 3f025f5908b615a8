//! Raw sockets: user buffers in, whole frames out, at the Ethernet or IPv4 layer.

use unet_wire::{EtherType, EthernetHeader, Ipv4Header, MacAddr, PacketError};

use crate::error::{Error, Result};
use crate::event::Events;
use crate::frame::Frame;
use crate::options::Options;
use crate::queue::{Queue, QueuePolicy};
use crate::socket::{SocketHost, SocketId, SocketSet};

/// The layer a raw socket sends and receives at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Whole Ethernet frames, header included.
    Ethernet,
    /// IPv4 datagrams; the stack adds the Ethernet header and resolves the next hop.
    Ipv4,
}

impl Layer {
    /// Bytes a user buffer must at least hold for this layer.
    pub fn min_send_len(self) -> usize {
        match self {
            Self::Ethernet => EthernetHeader::HEADER_LEN,
            Self::Ipv4 => Ipv4Header::MIN_LEN,
        }
    }

    /// Device MTU needed to carry this layer's headers.
    pub fn min_mtu(self) -> usize {
        match self {
            Self::Ethernet => EthernetHeader::HEADER_LEN,
            Self::Ipv4 => EthernetHeader::HEADER_LEN + Ipv4Header::MIN_LEN,
        }
    }
}

#[derive(Debug)]
pub struct RawSocketState {
    layer: Layer,
    read_queue: Queue,
    mtu: usize,
    closing: bool,
}

impl RawSocketState {
    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn read_queue(&self) -> &Queue {
        &self.read_queue
    }
}

/// Register a raw socket. `mtu` is the device MTU (Ethernet header included).
pub fn open<H: SocketHost<State = RawSocketState>>(
    set: &mut SocketSet<H>,
    layer: Layer,
    mtu: usize,
    opts: &Options,
    callback: impl FnMut(&mut H, SocketId, Events) -> Result<()> + 'static,
) -> Result<SocketId> {
    if mtu < layer.min_mtu() {
        return Err(Error::MtuTooSmall {
            layer,
            mtu,
            needed: layer.min_mtu(),
        });
    }
    let read_policy = match layer {
        Layer::Ethernet => QueuePolicy::ByDataLength,
        Layer::Ipv4 => QueuePolicy::ByNetViewLength,
    };
    let state = RawSocketState {
        layer,
        read_queue: Queue::with_policy(opts.raw_socket_read_queue_len, read_policy),
        mtu,
        closing: false,
    };
    let id = set.insert(
        state,
        opts.raw_socket_send_queue_len,
        QueuePolicy::ByDataLength,
        callback,
    );
    if set.has_capacity(id, mtu) {
        set.add_pending(id, Events::SEND);
    }
    Ok(id)
}

/// Queue `buf` for transmission, truncated to what fits in one device frame.
///
/// Returns the number of user bytes accepted, or 0 if the egress queue is full. IPv4 sockets get an
/// Ethernet header prepended (source `hw_addr`, destination filled in after ARP resolution).
pub fn send<H: SocketHost<State = RawSocketState>>(
    set: &mut SocketSet<H>,
    id: SocketId,
    buf: &[u8],
    hw_addr: MacAddr,
) -> Result<usize> {
    let (layer, mtu) = match set.state(id) {
        Some(state) if !state.closing => (state.layer, state.mtu),
        _ => return Err(Error::SocketClosed),
    };
    if buf.len() < layer.min_send_len() {
        return Err(PacketError::Truncated {
            needed: layer.min_send_len(),
            actual: buf.len(),
        }
        .into());
    }

    let frame = match layer {
        Layer::Ethernet => Frame::from_bytes(&buf[..buf.len().min(mtu)]),
        Layer::Ipv4 => {
            let len = buf.len().min(mtu - EthernetHeader::HEADER_LEN);
            let eth = EthernetHeader {
                dst: MacAddr::UNSPECIFIED,
                src: hw_addr,
                ethertype: EtherType::IPV4,
            };
            let mut frame = Frame::from(eth.build_vec(&buf[..len]));
            frame.set_net(EthernetHeader::HEADER_LEN, len)?;
            frame.do_ipv4_routing = true;
            frame
        }
    };
    let accepted = match layer {
        Layer::Ethernet => frame.len(),
        Layer::Ipv4 => frame.len() - EthernetHeader::HEADER_LEN,
    };

    if set.send_frame(id, frame).is_err() {
        set.remove_pending(id, Events::SEND);
        return Ok(0);
    }
    if !set.has_capacity(id, mtu) {
        set.remove_pending(id, Events::SEND);
    }
    Ok(accepted)
}

/// Copy the next received frame (Ethernet layer) or datagram (IPv4 layer) into `buf`, truncating
/// it to `buf.len()`. Returns 0 when nothing is queued.
pub fn read<H: SocketHost<State = RawSocketState>>(
    set: &mut SocketSet<H>,
    id: SocketId,
    buf: &mut [u8],
) -> Result<usize> {
    let state = match set.state_mut(id) {
        Some(state) if !state.closing => state,
        _ => return Err(Error::SocketClosed),
    };
    let Some(frame) = state.read_queue.pop() else {
        return Ok(0);
    };
    let drained = state.read_queue.is_empty();
    let bytes = match state.layer {
        Layer::Ethernet => frame.data(),
        Layer::Ipv4 => frame.net().unwrap_or_default(),
    };
    let len = bytes.len().min(buf.len());
    buf[..len].copy_from_slice(&bytes[..len]);
    if drained {
        set.remove_pending(id, Events::READ);
    }
    Ok(len)
}

/// Offer an ingress frame to socket `id`. Closing sockets, full read queues and (for IPv4 sockets)
/// frames without a network view drop the frame.
pub fn process<H: SocketHost<State = RawSocketState>>(
    set: &mut SocketSet<H>,
    id: SocketId,
    frame: &Frame,
) {
    let Some(state) = set.state_mut(id) else {
        return;
    };
    if state.closing {
        tracing::trace!(reason = "socket closing", "dropping frame");
        return;
    }
    if state.layer == Layer::Ipv4 && frame.net_range().is_none() {
        tracing::trace!(reason = "no network header", "dropping frame");
        return;
    }
    if state.read_queue.push(frame.clone()).is_err() {
        tracing::trace!(len = frame.len(), reason = "read queue full", "dropping frame");
        return;
    }
    set.add_pending(id, Events::READ);
}

/// Pop-hook for raw sockets. Returns `true` when the socket finished closing and should now be
/// destroyed.
pub fn on_frame_popped<H: SocketHost<State = RawSocketState>>(
    set: &mut SocketSet<H>,
    id: SocketId,
) -> bool {
    let Some(state) = set.state(id) else {
        return false;
    };
    if state.closing {
        return !set.has_queued_frames(id);
    }
    if set.has_capacity(id, state.mtu) {
        set.add_pending(id, Events::SEND);
    }
    false
}

/// Begin closing socket `id`. Returns `true` when it can be destroyed right away; otherwise it
/// stops receiving callbacks and frames and is destroyed once its egress queue drains.
pub fn close<H: SocketHost<State = RawSocketState>>(set: &mut SocketSet<H>, id: SocketId) -> bool {
    if !set.contains(id) {
        return false;
    }
    if !set.has_queued_frames(id) {
        return true;
    }
    set.unsubscribe(id, Events::all());
    set.remove_pending(id, Events::all());
    if let Some(state) = set.state_mut(id) {
        state.closing = true;
        state.read_queue.clear();
    }
    false
}
