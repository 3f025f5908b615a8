use core::net::Ipv4Addr;
use std::fmt;

use unet_wire::checksum::checksum;
use unet_wire::{
    ArpOp, ArpPacket, EtherType, EthernetHeader, Header, Icmpv4Echo, Icmpv4Header, Ipv4Cidr,
    Ipv4Header, Ipv4Protocol, MacAddr,
};

use crate::arp_queue::{ArpHost, ArpQueue, DelayOutcome};
use crate::clock::{Clock, StdClock};
use crate::dev::Device;
use crate::error::{Error, Result};
use crate::event::Events;
use crate::frame::Frame;
use crate::options::Options;
use crate::queue::Queue;
use crate::raw_socket::RawSocket;
use crate::socket::raw::{self, Layer, RawSocketState};
use crate::socket::{SocketHost, SocketId, SocketSet};
use crate::timer::{Timer, TimerManager};

/// The network stack: one device, one IPv4 address, one default gateway.
pub struct Stack {
    dev: Box<dyn Device>,
    mtu: usize,
    pub(crate) hw_addr: MacAddr,
    cidr: Ipv4Cidr,
    gateway: Ipv4Addr,
    opts: Options,
    pub(crate) socket_set: SocketSet<Stack>,
    send_queue: Queue,
    arp_queue: ArpQueue<Stack>,
    timers: TimerManager<Stack>,
    ethernet_sockets: Vec<SocketId>,
    ipv4_sockets: Vec<SocketId>,
    clock: Box<dyn Clock>,
    running: bool,
    stop_requested: bool,
    in_iteration: bool,
    ipv4_ident: u16,
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("hw_addr", &self.hw_addr)
            .field("cidr", &self.cidr)
            .field("gateway", &self.gateway)
            .field("mtu", &self.mtu)
            .field("sockets", &self.socket_set.len())
            .field("send_queue", &self.send_queue.len())
            .field("delayed", &self.arp_queue.delayed())
            .field("running", &self.running)
            .finish()
    }
}

impl Stack {
    /// Build a stack on `dev` with the host's monotonic clock.
    pub fn new(
        dev: impl Device + 'static,
        hw_addr: MacAddr,
        cidr: Ipv4Cidr,
        gateway: Ipv4Addr,
        opts: Options,
    ) -> Result<Self> {
        Self::with_clock(dev, hw_addr, cidr, gateway, opts, StdClock)
    }

    /// Build a stack whose timers and ARP cache follow `clock`.
    pub fn with_clock(
        dev: impl Device + 'static,
        hw_addr: MacAddr,
        cidr: Ipv4Cidr,
        gateway: Ipv4Addr,
        opts: Options,
        clock: impl Clock + 'static,
    ) -> Result<Self> {
        let mtu = dev.max_transmission_unit();
        if mtu == 0 {
            return Err(Error::InvalidDevice("device reports an MTU of 0"));
        }
        if !cidr.contains(gateway) {
            return Err(Error::GatewayOutsideSubnet { gateway, cidr });
        }

        let timers = TimerManager::new(clock.now());
        let arp_queue = ArpQueue::new(
            opts.arp_queue_len,
            opts.arp_cache_size,
            opts.arp_timeout,
            opts.arp_cache_ttl,
            timers.clone(),
        );
        tracing::info!(%hw_addr, %cidr, %gateway, mtu, "network stack created");

        Ok(Self {
            dev: Box::new(dev),
            mtu,
            hw_addr,
            cidr,
            gateway,
            send_queue: Queue::new(opts.stack_send_queue_len),
            opts,
            socket_set: SocketSet::new(),
            arp_queue,
            timers,
            ethernet_sockets: Vec::new(),
            ipv4_sockets: Vec::new(),
            clock: Box::new(clock),
            running: false,
            stop_requested: false,
            in_iteration: false,
            ipv4_ident: 1,
        })
    }

    pub fn hw_addr(&self) -> MacAddr {
        self.hw_addr
    }

    pub fn ipv4_addr(&self) -> Ipv4Addr {
        self.cidr.addr()
    }

    pub fn cidr(&self) -> Ipv4Cidr {
        self.cidr
    }

    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    /// Device MTU, Ethernet header included.
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Time of the last timer tick.
    pub fn now(&self) -> std::time::Instant {
        self.timers.now()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Frames waiting in the shared send queue.
    pub fn queued_frames(&self) -> usize {
        self.send_queue.len()
    }

    /// Frames waiting on ARP resolution.
    pub fn delayed_frames(&self) -> usize {
        self.arp_queue.delayed()
    }

    pub fn socket_count(&self) -> usize {
        self.socket_set.len()
    }

    /// Create a timer on the stack's clock. It does nothing until scheduled.
    pub fn timer(&self, callback: impl FnMut(&mut Stack) -> Result<()> + 'static) -> Timer<Stack> {
        self.timers.timer(callback)
    }

    /// Open a raw socket. `callback` runs during the loop whenever subscribed events are pending.
    pub fn open_raw_socket(
        &mut self,
        layer: Layer,
        mut callback: impl FnMut(&mut Stack, RawSocket, Events) -> Result<()> + 'static,
    ) -> Result<RawSocket> {
        let id = raw::open(
            &mut self.socket_set,
            layer,
            self.mtu,
            &self.opts,
            move |stack: &mut Stack, id, events| callback(stack, RawSocket::from_id(id), events),
        )?;
        match layer {
            Layer::Ethernet => self.ethernet_sockets.push(id),
            Layer::Ipv4 => self.ipv4_sockets.push(id),
        }
        Ok(RawSocket::from_id(id))
    }

    pub(crate) fn close_socket(&mut self, id: SocketId) {
        if raw::close(&mut self.socket_set, id) {
            self.destroy_socket(id);
        }
    }

    fn destroy_socket(&mut self, id: SocketId) {
        let Some(state) = self.socket_set.destroy(id) else {
            return;
        };
        let members = match state.layer() {
            Layer::Ethernet => &mut self.ethernet_sockets,
            Layer::Ipv4 => &mut self.ipv4_sockets,
        };
        members.retain(|member| *member != id);
    }

    /// Run iterations until [`Stack::stop_loop`] is called or an iteration fails.
    pub fn run_loop(&mut self) -> Result<()> {
        if self.running {
            return Err(Error::Reentrant("Stack::run_loop"));
        }
        self.running = true;
        self.stop_requested = false;
        tracing::info!("network stack loop started");

        let result = loop {
            if self.stop_requested {
                break Ok(());
            }
            if let Err(err) = self.run_loop_once() {
                break Err(err);
            }
        };

        self.running = false;
        self.stop_requested = false;
        tracing::info!("network stack loop stopped");
        result
    }

    /// Ask [`Stack::run_loop`] to return before its next iteration. Does nothing when the loop is
    /// not running.
    pub fn stop_loop(&mut self) {
        if self.running {
            self.stop_requested = true;
        }
    }

    /// One iteration: read and process every pending device frame, fire due timers, run socket
    /// callbacks, drain socket egress round-robin, then route and transmit.
    pub fn run_loop_once(&mut self) -> Result<()> {
        if self.in_iteration {
            return Err(Error::Reentrant("Stack::run_loop_once"));
        }
        self.in_iteration = true;
        let result = self.iterate();
        self.in_iteration = false;
        result
    }

    fn iterate(&mut self) -> Result<()> {
        self.read_loop()?;
        let now = self.clock.now();
        let timers = self.timers.clone();
        timers.run(self, now)?;
        SocketSet::dispatch(self)?;
        SocketSet::drain_round_robin(self, |stack| &mut stack.send_queue)?;
        self.send_loop()
    }

    fn read_loop(&mut self) -> Result<()> {
        loop {
            let mut buf = vec![0u8; self.mtu];
            let len = self.dev.read(&mut buf)?;
            if len == 0 {
                return Ok(());
            }
            buf.truncate(len);
            self.process(Frame::from(buf));
        }
    }

    fn process(&mut self, frame: Frame) {
        let eth = match frame.data_as::<EthernetHeader>() {
            Ok(eth) => eth,
            Err(err) => {
                tracing::trace!(%err, reason = "bad Ethernet header", "dropping frame");
                return;
            }
        };

        for &id in &self.ethernet_sockets {
            raw::process(&mut self.socket_set, id, &frame);
        }

        if eth.dst != self.hw_addr && !eth.dst.is_broadcast() {
            return;
        }
        match eth.ethertype {
            EtherType::ARP => self.process_arp(&frame),
            EtherType::IPV4 => self.process_ipv4(frame),
            _ => {}
        }
    }

    fn process_arp(&mut self, frame: &Frame) {
        let payload = &frame.data()[EthernetHeader::HEADER_LEN..];
        let arp = match ArpPacket::parse(payload) {
            Ok(arp) if arp.is_ethernet_ipv4() => arp,
            _ => {
                tracing::trace!(reason = "bad ARP packet", "dropping frame");
                return;
            }
        };
        if arp.target_ip != self.cidr.addr() {
            return;
        }

        match arp.op {
            ArpOp::Request => {
                if arp.sender_ip != Ipv4Addr::UNSPECIFIED {
                    self.arp_queue
                        .add(arp.sender_ip, arp.sender_hw, &mut self.send_queue);
                }
                let reply = ArpPacket::reply(
                    self.hw_addr,
                    self.cidr.addr(),
                    arp.sender_hw,
                    arp.sender_ip,
                );
                self.send_arp(reply, arp.sender_hw);
            }
            ArpOp::Reply => {
                self.arp_queue
                    .add(arp.sender_ip, arp.sender_hw, &mut self.send_queue);
            }
            ArpOp::Other(op) => {
                tracing::trace!(op, reason = "unknown ARP operation", "dropping frame");
            }
        }
    }

    fn process_ipv4(&mut self, mut frame: Frame) {
        let offset = EthernetHeader::HEADER_LEN;
        let datagram = &frame.data()[offset..];
        let ip = match Ipv4Header::parse(datagram) {
            Ok(ip) => ip,
            Err(err) => {
                tracing::trace!(%err, reason = "bad IPv4 header", "dropping frame");
                return;
            }
        };
        let total_len = usize::from(ip.total_len);
        // Ethernet may pad short datagrams, so the frame can be longer than the datagram.
        if total_len < ip.header_len || total_len > datagram.len() {
            tracing::trace!(total_len, reason = "bad IPv4 total length", "dropping frame");
            return;
        }
        if !Ipv4Header::verify_checksum(datagram) {
            tracing::trace!(reason = "bad IPv4 checksum", "dropping frame");
            return;
        }
        if ip.dst != self.cidr.addr() {
            return;
        }
        if frame.set_net(offset, total_len).is_err()
            || frame
                .set_transport(offset + ip.header_len, total_len - ip.header_len)
                .is_err()
        {
            return;
        }

        for &id in &self.ipv4_sockets {
            raw::process(&mut self.socket_set, id, &frame);
        }

        if ip.protocol == Ipv4Protocol::ICMP {
            self.process_icmp(&frame, &ip);
        }
    }

    fn process_icmp(&mut self, frame: &Frame, ip: &Ipv4Header) {
        let msg = frame.transport().unwrap_or_default();
        let Ok(echo) = Icmpv4Echo::parse(msg) else {
            return;
        };
        if echo.icmp_type != Icmpv4Header::TYPE_ECHO_REQUEST {
            return;
        }
        if checksum(msg) != 0 {
            tracing::trace!(reason = "bad ICMP checksum", "dropping frame");
            return;
        }

        let mut reply = msg.to_vec();
        reply[0] = Icmpv4Header::TYPE_ECHO_REPLY;
        reply[1] = 0;
        Icmpv4Echo::fill_checksum(&mut reply);
        self.send_ipv4(ip.src, Ipv4Protocol::ICMP, &reply);
    }

    /// Queue an IPv4 datagram from us to `dst`; the send loop resolves its next hop.
    fn send_ipv4(&mut self, dst: Ipv4Addr, protocol: u8, payload: &[u8]) {
        let ident = self.next_ipv4_ident();
        let datagram = Ipv4Header::new(self.cidr.addr(), dst, protocol, ident, payload.len())
            .build_vec(payload);
        let eth = EthernetHeader {
            dst: MacAddr::UNSPECIFIED,
            src: self.hw_addr,
            ethertype: EtherType::IPV4,
        };
        let mut frame = Frame::from(eth.build_vec(&datagram));
        if frame
            .set_net(EthernetHeader::HEADER_LEN, datagram.len())
            .is_err()
        {
            return;
        }
        frame.do_ipv4_routing = true;
        self.enqueue(frame);
    }

    fn send_arp(&mut self, packet: ArpPacket, dst: MacAddr) {
        let eth = EthernetHeader {
            dst,
            src: self.hw_addr,
            ethertype: EtherType::ARP,
        };
        self.enqueue(Frame::from(eth.build_vec(&packet.build_vec())));
    }

    fn send_arp_request(&mut self, hop: Ipv4Addr) {
        tracing::debug!(%hop, "sending ARP request");
        let request = ArpPacket::request(self.hw_addr, self.cidr.addr(), hop);
        self.send_arp(request, MacAddr::BROADCAST);
    }

    fn enqueue(&mut self, frame: Frame) {
        if let Err(frame) = self.send_queue.push(frame) {
            tracing::trace!(len = frame.len(), reason = "send queue full", "dropping frame");
        }
    }

    fn send_loop(&mut self) -> Result<()> {
        let (cidr, gateway) = (self.cidr, self.gateway);
        loop {
            let Some(frame) = self.send_queue.peek_mut() else {
                return Ok(());
            };

            if frame.do_ipv4_routing {
                let dst = match Ipv4Header::peek_dst(frame.net().unwrap_or_default()) {
                    Ok(dst) => dst,
                    Err(err) => {
                        tracing::trace!(%err, reason = "unroutable frame", "dropping frame");
                        self.send_queue.pop();
                        continue;
                    }
                };
                let hop = next_hop(cidr, gateway, dst);
                frame.hop_addr = hop;
                match self.arp_queue.lookup(hop) {
                    Some(hw_addr) => {
                        if let Err(err) = EthernetHeader::set_dst(frame.data_mut(), hw_addr) {
                            tracing::trace!(%err, reason = "no Ethernet header", "dropping frame");
                            self.send_queue.pop();
                            continue;
                        }
                    }
                    None => {
                        if let Some(frame) = self.send_queue.pop() {
                            tracing::debug!(%dst, %hop, "delaying frame for ARP resolution");
                            if self.arp_queue.delay(frame) == DelayOutcome::NewTimer {
                                self.send_arp_request(hop);
                            }
                        }
                        continue;
                    }
                }
            }

            let Some(frame) = self.send_queue.peek() else {
                return Ok(());
            };
            if self.dev.send(frame.data())? == 0 {
                return Ok(());
            }
            self.send_queue.pop();
        }
    }

    fn next_ipv4_ident(&mut self) -> u16 {
        let ident = self.ipv4_ident;
        self.ipv4_ident = self.ipv4_ident.wrapping_add(1);
        ident
    }
}

/// Destinations inside the subnet are reached directly, everything else through the gateway.
fn next_hop(cidr: Ipv4Cidr, gateway: Ipv4Addr, dst: Ipv4Addr) -> Ipv4Addr {
    if cidr.contains(dst) {
        dst
    } else {
        gateway
    }
}

impl SocketHost for Stack {
    type State = RawSocketState;

    fn socket_set(&mut self) -> &mut SocketSet<Self> {
        &mut self.socket_set
    }

    fn on_frame_popped(&mut self, id: SocketId) -> Result<()> {
        if raw::on_frame_popped(&mut self.socket_set, id) {
            self.destroy_socket(id);
        }
        Ok(())
    }
}

impl ArpHost for Stack {
    fn arp_queue(&mut self) -> &mut ArpQueue<Self> {
        &mut self.arp_queue
    }
}
