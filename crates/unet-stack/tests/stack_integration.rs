use core::net::Ipv4Addr;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use unet_stack::{Device, Events, Layer, ManualClock, Options, Stack};
use unet_wire::checksum::checksum;
use unet_wire::{
    ArpOp, ArpPacket, EtherType, EthernetHeader, Header, Icmpv4Echo, Icmpv4Header, Ipv4Cidr,
    Ipv4Header, Ipv4Protocol, MacAddr,
};

const OUR_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x02]);
const OUR_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const GATEWAY_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const GATEWAY_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x01]);
const PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
const PEER_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x05]);
const REMOTE_IP: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);

#[derive(Default)]
struct Wire {
    rx: VecDeque<Vec<u8>>,
    tx: Vec<Vec<u8>>,
    tx_blocked: bool,
}

/// In-memory device; the test keeps a second handle to inject and inspect frames.
struct LoopDevice(Rc<RefCell<Wire>>);

impl Device for LoopDevice {
    fn send(&mut self, frame: &[u8]) -> io::Result<usize> {
        let mut wire = self.0.borrow_mut();
        if wire.tx_blocked {
            return Ok(0);
        }
        wire.tx.push(frame.to_vec());
        Ok(frame.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(frame) = self.0.borrow_mut().rx.pop_front() else {
            return Ok(0);
        };
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Ok(len)
    }

    fn max_transmission_unit(&self) -> usize {
        1514
    }
}

struct Harness {
    stack: Stack,
    wire: Rc<RefCell<Wire>>,
    clock: ManualClock,
}

impl Harness {
    fn new() -> Self {
        let wire = Rc::new(RefCell::new(Wire::default()));
        let clock = ManualClock::default();
        let stack = Stack::with_clock(
            LoopDevice(Rc::clone(&wire)),
            OUR_MAC,
            Ipv4Cidr::new(OUR_IP, 24),
            GATEWAY_IP,
            Options::default(),
            clock.clone(),
        )
        .unwrap();
        Self { stack, wire, clock }
    }

    fn inject(&self, frame: Vec<u8>) {
        self.wire.borrow_mut().rx.push_back(frame);
    }

    fn tick(&mut self) {
        self.stack.run_loop_once().unwrap();
    }

    fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.wire.borrow_mut().tx)
    }
}

fn ethernet(dst: MacAddr, src: MacAddr, ethertype: u16, payload: &[u8]) -> Vec<u8> {
    EthernetHeader {
        dst,
        src,
        ethertype,
    }
    .build_vec(payload)
}

fn arp_request_from(sender_hw: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
    let arp = ArpPacket::request(sender_hw, sender_ip, target_ip);
    ethernet(MacAddr::BROADCAST, sender_hw, EtherType::ARP, &arp.build_vec())
}

fn arp_reply_from(sender_hw: MacAddr, sender_ip: Ipv4Addr) -> Vec<u8> {
    let arp = ArpPacket::reply(sender_hw, sender_ip, OUR_MAC, OUR_IP);
    ethernet(OUR_MAC, sender_hw, EtherType::ARP, &arp.build_vec())
}

fn ipv4_datagram(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, payload: &[u8]) -> Vec<u8> {
    Ipv4Header::new(src, dst, protocol, 7, payload.len()).build_vec(payload)
}

fn echo_request_from(src_hw: MacAddr, src: Ipv4Addr, ident: u16, seq: u16, data: &[u8]) -> Vec<u8> {
    let icmp = Icmpv4Echo::request(ident, seq).build_vec(data);
    let datagram = ipv4_datagram(src, OUR_IP, Ipv4Protocol::ICMP, &icmp);
    ethernet(OUR_MAC, src_hw, EtherType::IPV4, &datagram)
}

fn parse_arp(frame: &[u8]) -> (EthernetHeader, ArpPacket) {
    let eth = EthernetHeader::parse(frame).unwrap();
    assert_eq!(eth.ethertype, EtherType::ARP);
    let arp = ArpPacket::parse(&frame[EthernetHeader::HEADER_LEN..]).unwrap();
    (eth, arp)
}

#[test]
fn answers_arp_requests_for_our_address() {
    let mut h = Harness::new();
    h.inject(arp_request_from(PEER_MAC, PEER_IP, OUR_IP));
    h.tick();

    let sent = h.take_sent();
    assert_eq!(sent.len(), 1);
    let (eth, arp) = parse_arp(&sent[0]);
    assert_eq!(eth.dst, PEER_MAC);
    assert_eq!(eth.src, OUR_MAC);
    assert_eq!(arp.op, ArpOp::Reply);
    assert_eq!(arp.sender_hw, OUR_MAC);
    assert_eq!(arp.sender_ip, OUR_IP);
    assert_eq!(arp.target_hw, PEER_MAC);
    assert_eq!(arp.target_ip, PEER_IP);
}

#[test]
fn ignores_arp_requests_for_other_addresses() {
    let mut h = Harness::new();
    h.inject(arp_request_from(PEER_MAC, PEER_IP, Ipv4Addr::new(10, 0, 0, 9)));
    h.tick();
    assert!(h.take_sent().is_empty());
}

#[test]
fn echo_request_waits_for_arp_then_gets_a_reply() {
    let mut h = Harness::new();
    h.inject(echo_request_from(PEER_MAC, PEER_IP, 0x1234, 3, b"hello"));
    h.tick();

    // The requester is unknown, so the reply waits behind a broadcast ARP request.
    let sent = h.take_sent();
    assert_eq!(sent.len(), 1);
    let (eth, arp) = parse_arp(&sent[0]);
    assert_eq!(eth.dst, MacAddr::BROADCAST);
    assert_eq!(arp.op, ArpOp::Request);
    assert_eq!(arp.target_ip, PEER_IP);
    assert_eq!(h.stack.delayed_frames(), 1);

    h.inject(arp_reply_from(PEER_MAC, PEER_IP));
    h.tick();
    let sent = h.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(h.stack.delayed_frames(), 0);

    let frame = &sent[0];
    let eth = EthernetHeader::parse(frame).unwrap();
    assert_eq!(eth.dst, PEER_MAC);
    assert_eq!(eth.src, OUR_MAC);
    assert_eq!(eth.ethertype, EtherType::IPV4);

    let datagram = &frame[EthernetHeader::HEADER_LEN..];
    let ip = Ipv4Header::parse(datagram).unwrap();
    assert!(Ipv4Header::verify_checksum(datagram));
    assert_eq!(ip.src, OUR_IP);
    assert_eq!(ip.dst, PEER_IP);
    assert_eq!(ip.protocol, Ipv4Protocol::ICMP);

    let icmp = &datagram[ip.header_len..usize::from(ip.total_len)];
    let echo = Icmpv4Echo::parse(icmp).unwrap();
    assert_eq!(echo.icmp_type, Icmpv4Header::TYPE_ECHO_REPLY);
    assert_eq!(echo.identifier, 0x1234);
    assert_eq!(echo.sequence, 3);
    assert_eq!(&icmp[Icmpv4Echo::HEADER_LEN..], b"hello");
    assert_eq!(checksum(icmp), 0);
}

#[test]
fn arp_requests_teach_the_cache() {
    let mut h = Harness::new();
    h.inject(arp_request_from(PEER_MAC, PEER_IP, OUR_IP));
    h.inject(echo_request_from(PEER_MAC, PEER_IP, 1, 1, b"x"));
    h.tick();

    let sent = h.take_sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(parse_arp(&sent[0]).1.op, ArpOp::Reply);
    let eth = EthernetHeader::parse(&sent[1]).unwrap();
    assert_eq!(eth.ethertype, EtherType::IPV4);
    assert_eq!(eth.dst, PEER_MAC);
}

#[test]
fn corrupt_datagrams_are_not_answered() {
    let mut h = Harness::new();
    let mut frame = echo_request_from(PEER_MAC, PEER_IP, 1, 1, b"x");
    frame[EthernetHeader::HEADER_LEN + 10] ^= 0xff;
    h.inject(frame);

    let mut short = echo_request_from(PEER_MAC, PEER_IP, 1, 1, b"x");
    short.truncate(EthernetHeader::HEADER_LEN + 24);
    h.inject(short);
    h.inject(vec![0xff; 10]);
    h.tick();

    assert!(h.take_sent().is_empty());
    assert_eq!(h.stack.delayed_frames(), 0);
}

#[test]
fn off_subnet_datagrams_resolve_the_gateway() {
    let mut h = Harness::new();
    let socket = h.stack.open_raw_socket(Layer::Ipv4, |_, _, _| Ok(())).unwrap();
    let datagram = ipv4_datagram(OUR_IP, REMOTE_IP, Ipv4Protocol::UDP, b"payload");
    assert_eq!(socket.send(&mut h.stack, &datagram).unwrap(), datagram.len());
    h.tick();

    let sent = h.take_sent();
    assert_eq!(sent.len(), 1);
    let (_, arp) = parse_arp(&sent[0]);
    assert_eq!(arp.op, ArpOp::Request);
    assert_eq!(arp.target_ip, GATEWAY_IP);

    h.inject(arp_reply_from(GATEWAY_MAC, GATEWAY_IP));
    h.tick();
    let sent = h.take_sent();
    assert_eq!(sent.len(), 1);
    let eth = EthernetHeader::parse(&sent[0]).unwrap();
    assert_eq!(eth.dst, GATEWAY_MAC);
    assert_eq!(eth.src, OUR_MAC);
    assert_eq!(&sent[0][EthernetHeader::HEADER_LEN..], &datagram[..]);

    // Later datagrams hit the cache and go out in the same iteration.
    socket.send(&mut h.stack, &datagram).unwrap();
    h.tick();
    assert_eq!(h.take_sent().len(), 1);
}

#[test]
fn unresolved_frames_are_dropped_after_the_timeout() {
    let mut h = Harness::new();
    let socket = h.stack.open_raw_socket(Layer::Ipv4, |_, _, _| Ok(())).unwrap();
    let datagram = ipv4_datagram(OUR_IP, PEER_IP, Ipv4Protocol::UDP, b"lost");
    socket.send(&mut h.stack, &datagram).unwrap();
    socket.send(&mut h.stack, &datagram).unwrap();
    h.tick();

    // One ARP request per hop, however many frames wait on it.
    assert_eq!(h.take_sent().len(), 1);
    assert_eq!(h.stack.delayed_frames(), 2);

    h.clock.advance(h.stack.options().arp_timeout + Duration::from_millis(1));
    h.tick();
    assert_eq!(h.stack.delayed_frames(), 0);
    assert!(h.take_sent().is_empty());

    // A late reply finds nothing to release.
    h.inject(arp_reply_from(PEER_MAC, PEER_IP));
    h.tick();
    assert!(h.take_sent().is_empty());
}

#[test]
fn raw_sockets_receive_at_their_layer() {
    let mut h = Harness::new();
    let eth_socket = h.stack.open_raw_socket(Layer::Ethernet, |_, _, _| Ok(())).unwrap();
    let ip_socket = h.stack.open_raw_socket(Layer::Ipv4, |_, _, _| Ok(())).unwrap();

    let datagram = ipv4_datagram(PEER_IP, OUR_IP, Ipv4Protocol::UDP, b"data");
    let mut frame = ethernet(OUR_MAC, PEER_MAC, EtherType::IPV4, &datagram);
    // Trailing Ethernet padding is not part of the datagram.
    frame.extend_from_slice(&[0; 6]);
    h.inject(frame.clone());
    h.inject(arp_request_from(PEER_MAC, PEER_IP, Ipv4Addr::new(10, 0, 0, 9)));
    h.tick();

    let mut buf = [0u8; 1600];
    let len = eth_socket.read(&mut h.stack, &mut buf).unwrap();
    assert_eq!(&buf[..len], &frame[..]);
    assert!(eth_socket.read(&mut h.stack, &mut buf).unwrap() > 0);
    assert_eq!(eth_socket.read(&mut h.stack, &mut buf).unwrap(), 0);

    let len = ip_socket.read(&mut h.stack, &mut buf).unwrap();
    assert_eq!(&buf[..len], &datagram[..]);
    assert_eq!(ip_socket.read(&mut h.stack, &mut buf).unwrap(), 0);
}

#[test]
fn datagrams_for_other_hosts_skip_ipv4_sockets() {
    let mut h = Harness::new();
    let ip_socket = h.stack.open_raw_socket(Layer::Ipv4, |_, _, _| Ok(())).unwrap();
    let datagram = ipv4_datagram(PEER_IP, Ipv4Addr::new(10, 0, 0, 9), Ipv4Protocol::UDP, b"data");
    h.inject(ethernet(OUR_MAC, PEER_MAC, EtherType::IPV4, &datagram));
    h.tick();

    let mut buf = [0u8; 64];
    assert_eq!(ip_socket.read(&mut h.stack, &mut buf).unwrap(), 0);
}

#[test]
fn read_events_drive_socket_callbacks() {
    let mut h = Harness::new();
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&received);
    let socket = h
        .stack
        .open_raw_socket(Layer::Ipv4, move |stack, socket, events| {
            assert_eq!(events, Events::READ);
            let mut buf = [0u8; 128];
            loop {
                let len = socket.read(stack, &mut buf)?;
                if len == 0 {
                    return Ok(());
                }
                sink.borrow_mut().push(buf[..len].to_vec());
            }
        })
        .unwrap();
    socket.subscribe(&mut h.stack, Events::READ).unwrap();

    for payload in [&b"one"[..], &b"two"[..]] {
        let datagram = ipv4_datagram(PEER_IP, OUR_IP, Ipv4Protocol::UDP, payload);
        h.inject(ethernet(OUR_MAC, PEER_MAC, EtherType::IPV4, &datagram));
    }
    h.tick();
    assert_eq!(received.borrow().len(), 2);

    // Nothing pending, so no further callbacks.
    h.tick();
    assert_eq!(received.borrow().len(), 2);
}

#[test]
fn blocked_device_keeps_frames_queued() {
    let mut h = Harness::new();
    let socket = h.stack.open_raw_socket(Layer::Ethernet, |_, _, _| Ok(())).unwrap();
    let frame = ethernet(PEER_MAC, OUR_MAC, 0x88b5, b"raw");
    socket.send(&mut h.stack, &frame).unwrap();

    h.wire.borrow_mut().tx_blocked = true;
    h.tick();
    assert_eq!(h.stack.queued_frames(), 1);

    h.wire.borrow_mut().tx_blocked = false;
    h.tick();
    assert_eq!(h.stack.queued_frames(), 0);
    assert_eq!(h.take_sent(), [frame]);
}

#[test]
fn closing_a_socket_flushes_its_queued_frames() {
    let mut h = Harness::new();
    let socket = h.stack.open_raw_socket(Layer::Ethernet, |_, _, _| Ok(())).unwrap();
    let frame = ethernet(PEER_MAC, OUR_MAC, 0x88b5, b"bye");
    socket.send(&mut h.stack, &frame).unwrap();
    socket.close(&mut h.stack);

    assert!(!socket.is_open(&h.stack));
    assert_eq!(h.stack.socket_count(), 1);
    assert!(socket.send(&mut h.stack, &frame).is_err());

    h.tick();
    assert_eq!(h.take_sent(), [frame]);
    assert_eq!(h.stack.socket_count(), 0);
    assert!(socket.subscribe(&mut h.stack, Events::SEND).is_err());
}

#[test]
fn closing_an_idle_socket_destroys_it_at_once() {
    let mut h = Harness::new();
    let socket = h.stack.open_raw_socket(Layer::Ipv4, |_, _, _| Ok(())).unwrap();
    socket.close(&mut h.stack);
    assert_eq!(h.stack.socket_count(), 0);
    assert_eq!(socket.layer(&h.stack), None);
}

#[test]
fn timers_fire_on_the_stack_clock() {
    let mut h = Harness::new();
    let fired = Rc::new(RefCell::new(0));
    let count = Rc::clone(&fired);
    let timer = h.stack.timer(move |_| {
        *count.borrow_mut() += 1;
        Ok(())
    });
    timer.run_after(Duration::from_secs(5));

    h.clock.advance(Duration::from_secs(5));
    h.tick();
    assert_eq!(*fired.borrow(), 0);

    h.clock.advance(Duration::from_millis(1));
    h.tick();
    assert_eq!(*fired.borrow(), 1);
    assert!(!timer.is_scheduled());
}
