#![forbid(unsafe_code)]

use core::net::Ipv4Addr;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use clap::Parser;
use unet_stack::{Events, Layer, RawSocket, Stack, Timer};
use unet_tools::NetArgs;
use unet_wire::{ArpOp, ArpPacket, EtherType, EthernetHeader, Header, MacAddr};

#[derive(Parser, Debug)]
#[command(
    name = "unet-arping",
    about = "Broadcast ARP requests from the userspace stack and report who answers."
)]
struct Args {
    #[command(flatten)]
    net: NetArgs,

    /// IPv4 address to resolve
    target: Ipv4Addr,

    /// Number of requests to send
    #[arg(long, default_value_t = 64)]
    count: u32,
}

struct Arping {
    socket: Option<RawSocket>,
    target: Ipv4Addr,
    count: u32,
    interval: std::time::Duration,
    index: u32,
    sent_at: Option<Instant>,
    got_reply: bool,
}

fn request_frame(stack: &Stack, target: Ipv4Addr) -> Vec<u8> {
    let arp = ArpPacket::request(stack.hw_addr(), stack.ipv4_addr(), target);
    EthernetHeader {
        dst: MacAddr::BROADCAST,
        src: stack.hw_addr(),
        ethertype: EtherType::ARP,
    }
    .build_vec(&arp.build_vec())
}

/// The replier's addresses if `frame` is an ARP reply to us about `target`.
fn parse_reply(stack: &Stack, frame: &[u8], target: Ipv4Addr) -> Option<(MacAddr, Ipv4Addr)> {
    let eth = EthernetHeader::parse(frame).ok()?;
    if eth.dst != stack.hw_addr() || eth.ethertype != EtherType::ARP {
        return None;
    }
    let arp = ArpPacket::parse(&frame[EthernetHeader::HEADER_LEN..]).ok()?;
    let matched = arp.is_ethernet_ipv4()
        && arp.op == ArpOp::Reply
        && arp.sender_hw == eth.src
        && arp.sender_ip == target
        && arp.target_hw == stack.hw_addr()
        && arp.target_ip == stack.ipv4_addr();
    matched.then_some((arp.sender_hw, arp.sender_ip))
}

fn on_events(
    stack: &mut Stack,
    socket: RawSocket,
    events: Events,
    arping: &RefCell<Arping>,
    timer: &Timer<Stack>,
) -> unet_stack::Result<()> {
    if events.contains(Events::SEND) {
        let frame = request_frame(stack, arping.borrow().target);
        if socket.send(stack, &frame)? > 0 {
            let mut arping = arping.borrow_mut();
            arping.sent_at = Some(Instant::now());
            timer.run_after(arping.interval);
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
            let mut arping = arping.borrow_mut();
            let Some((hw_addr, ip)) = parse_reply(stack, &buf[..len], arping.target) else {
                continue;
            };
            if arping.got_reply {
                continue;
            }
            arping.got_reply = true;
            let elapsed = arping.sent_at.map(|at| at.elapsed()).unwrap_or_default();
            println!(
                "{} bytes from {hw_addr} ({ip}) index={} time={:.3} ms",
                ArpPacket::PACKET_LEN,
                arping.index,
                elapsed.as_secs_f64() * 1000.0,
            );
        }
    }
    Ok(())
}

fn on_interval(stack: &mut Stack, arping: &RefCell<Arping>) -> unet_stack::Result<()> {
    let mut arping = arping.borrow_mut();
    if !arping.got_reply {
        println!("Timeout for index {}", arping.index);
    }
    arping.index += 1;
    if arping.index >= arping.count {
        stack.stop_loop();
        return Ok(());
    }
    arping.got_reply = false;
    match arping.socket {
        Some(socket) => socket.subscribe(stack, Events::SEND),
        None => Ok(()),
    }
}

fn main() -> anyhow::Result<()> {
    unet_tools::init_tracing();
    let args = Args::parse();
    if args.count == 0 {
        return Ok(());
    }

    let mut stack = args.net.open_stack()?;
    let arping = Rc::new(RefCell::new(Arping {
        socket: None,
        target: args.target,
        count: args.count,
        interval: args.net.interval(),
        index: 0,
        sent_at: None,
        got_reply: false,
    }));

    let timer = Rc::new(stack.timer({
        let arping = Rc::clone(&arping);
        move |stack: &mut Stack| on_interval(stack, &arping)
    }));
    let socket = stack.open_raw_socket(Layer::Ethernet, {
        let arping = Rc::clone(&arping);
        let timer = Rc::clone(&timer);
        move |stack, socket, events| on_events(stack, socket, events, &arping, &timer)
    })?;
    arping.borrow_mut().socket = Some(socket);
    socket.subscribe(&mut stack, Events::SEND | Events::READ)?;

    println!("ARPING {} from {} ({})", args.target, stack.ipv4_addr(), stack.hw_addr());
    stack.run_loop()?;
    socket.close(&mut stack);
    Ok(())
}
