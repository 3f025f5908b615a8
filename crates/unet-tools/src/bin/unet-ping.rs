#![forbid(unsafe_code)]

use core::net::Ipv4Addr;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::bail;
use clap::Parser;
use rand::Rng;
use unet_stack::{Events, Layer, RawSocket, Stack, Timer};
use unet_tools::NetArgs;
use unet_wire::{EthernetHeader, Header, Icmpv4Echo, Icmpv4Header, Ipv4Header, Ipv4Protocol};

#[derive(Parser, Debug)]
#[command(
    name = "unet-ping",
    about = "Send ICMP echo requests from the userspace stack and report the replies."
)]
struct Args {
    #[command(flatten)]
    net: NetArgs,

    /// Address to ping
    target: Ipv4Addr,

    /// Number of echo requests to send
    #[arg(long, default_value_t = 64)]
    count: u16,

    /// Number of data bytes in each request
    #[arg(long, value_name = "BYTES", default_value_t = 56)]
    payload: usize,
}

struct Ping {
    socket: Option<RawSocket>,
    target: Ipv4Addr,
    count: u16,
    interval: Duration,
    identifier: u16,
    sequence: u16,
    payload: Vec<u8>,
    sent_at: Option<Instant>,
    got_reply: bool,
}

impl Ping {
    fn request(&mut self, src: Ipv4Addr) -> Vec<u8> {
        rand::thread_rng().fill(&mut self.payload[..]);
        let icmp = Icmpv4Echo::request(self.identifier, self.sequence).build_vec(&self.payload);
        Ipv4Header::new(src, self.target, Ipv4Protocol::ICMP, self.sequence, icmp.len())
            .build_vec(&icmp)
    }

    /// The TTL of `datagram` if it answers the outstanding request.
    fn matches(&self, datagram: &[u8]) -> Option<u8> {
        let ip = Ipv4Header::parse(datagram).ok()?;
        if ip.protocol != Ipv4Protocol::ICMP || ip.src != self.target {
            return None;
        }
        let icmp = datagram.get(ip.header_len..usize::from(ip.total_len))?;
        let echo = Icmpv4Echo::parse(icmp).ok()?;
        let matched = echo.icmp_type == Icmpv4Header::TYPE_ECHO_REPLY
            && echo.code == 0
            && echo.identifier == self.identifier
            && echo.sequence == self.sequence
            && icmp[Icmpv4Echo::HEADER_LEN..] == self.payload[..];
        matched.then_some(ip.ttl)
    }
}

fn on_events(
    stack: &mut Stack,
    socket: RawSocket,
    events: Events,
    ping: &RefCell<Ping>,
    timer: &Timer<Stack>,
) -> unet_stack::Result<()> {
    if events.contains(Events::SEND) {
        let datagram = ping.borrow_mut().request(stack.ipv4_addr());
        if socket.send(stack, &datagram)? > 0 {
            let mut ping = ping.borrow_mut();
            ping.sent_at = Some(Instant::now());
            timer.run_after(ping.interval);
            socket.unsubscribe(stack, Events::SEND)?;
        }
    }

    if events.contains(Events::READ) {
        let mut buf = vec![0u8; stack.mtu()];
        loop {
            let len = socket.read(stack, &mut buf)?;
            if len == 0 {
                break;
            }
            let mut ping = ping.borrow_mut();
            let Some(ttl) = ping.matches(&buf[..len]) else {
                continue;
            };
            ping.got_reply = true;
            let elapsed = ping.sent_at.map(|at| at.elapsed()).unwrap_or_default();
            println!(
                "{} bytes from {}: icmp_seq={} ttl={} time={:.3} ms",
                Icmpv4Echo::HEADER_LEN + ping.payload.len(),
                ping.target,
                ping.sequence,
                ttl,
                elapsed.as_secs_f64() * 1000.0,
            );
        }
    }
    Ok(())
}

/// Fires one interval after each request: reports a missing reply, then arms the next request.
fn on_interval(stack: &mut Stack, ping: &RefCell<Ping>) -> unet_stack::Result<()> {
    let mut ping = ping.borrow_mut();
    if !ping.got_reply {
        println!("Request timeout for icmp_seq {}", ping.sequence);
    }
    if ping.sequence >= ping.count {
        stack.stop_loop();
        return Ok(());
    }
    ping.sequence += 1;
    ping.got_reply = false;
    match ping.socket {
        Some(socket) => socket.subscribe(stack, Events::SEND),
        None => Ok(()),
    }
}

fn main() -> anyhow::Result<()> {
    unet_tools::init_tracing();
    let args = Args::parse();

    let mut stack = args.net.open_stack()?;
    let max_payload = stack
        .mtu()
        .saturating_sub(EthernetHeader::HEADER_LEN + Ipv4Header::MIN_LEN + Icmpv4Echo::HEADER_LEN);
    if args.payload > max_payload {
        bail!(
            "--payload {} exceeds the {max_payload} bytes the device can carry",
            args.payload
        );
    }
    if args.count == 0 {
        return Ok(());
    }

    let ping = Rc::new(RefCell::new(Ping {
        socket: None,
        target: args.target,
        count: args.count,
        interval: args.net.interval(),
        identifier: rand::random(),
        sequence: 1,
        payload: vec![0; args.payload],
        sent_at: None,
        got_reply: false,
    }));

    let timer = Rc::new(stack.timer({
        let ping = Rc::clone(&ping);
        move |stack: &mut Stack| on_interval(stack, &ping)
    }));
    let socket = stack.open_raw_socket(Layer::Ipv4, {
        let ping = Rc::clone(&ping);
        let timer = Rc::clone(&timer);
        move |stack, socket, events| on_events(stack, socket, events, &ping, &timer)
    })?;
    ping.borrow_mut().socket = Some(socket);
    socket.subscribe(&mut stack, Events::SEND | Events::READ)?;

    println!(
        "PING {} from {}: {} data bytes",
        args.target,
        stack.ipv4_addr(),
        args.payload
    );
    stack.run_loop()?;
    socket.close(&mut stack);
    Ok(())
}
