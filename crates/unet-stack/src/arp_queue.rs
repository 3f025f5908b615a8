use core::net::Ipv4Addr;
use std::collections::HashMap;
use std::time::Duration;

use unet_wire::{EthernetHeader, MacAddr};

use crate::arp_cache::ArpCache;
use crate::frame::Frame;
use crate::queue::Queue;
use crate::timer::{Timer, TimerManager};

/// Gives timer callbacks access to the [`ArpQueue`] owned by the host.
pub trait ArpHost: Sized + 'static {
    fn arp_queue(&mut self) -> &mut ArpQueue<Self>;
}

/// What [`ArpQueue::delay`] did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayOutcome {
    /// The frame is the first waiting on its hop; an ARP request should be sent for it.
    NewTimer,
    /// The frame joined others already waiting on the same hop.
    Queued,
    /// The delay queue is full or the frame cannot carry an Ethernet header; it was dropped.
    Dropped,
}

/// Frames waiting for their next hop's Ethernet address, plus the cache resolving them.
///
/// Each unresolved hop has exactly one timeout timer, shared by all frames delayed for it. A reply
/// (via [`ArpQueue::add`]) releases the hop's frames into the send queue; a timeout drops them.
pub struct ArpQueue<H> {
    delay_queue: Queue,
    timeout: Duration,
    cache: ArpCache,
    timer_manager: TimerManager<H>,
    timers: HashMap<Ipv4Addr, Timer<H>>,
}

impl<H: ArpHost> ArpQueue<H> {
    pub fn new(
        delay_queue_len: usize,
        cache_capacity: usize,
        timeout: Duration,
        cache_ttl: Duration,
        timer_manager: TimerManager<H>,
    ) -> Self {
        Self {
            delay_queue: Queue::new(delay_queue_len),
            timeout,
            cache: ArpCache::new(cache_capacity, cache_ttl),
            timer_manager,
            timers: HashMap::new(),
        }
    }

    pub fn cache(&self) -> &ArpCache {
        &self.cache
    }

    /// Frames currently waiting on resolution.
    pub fn delayed(&self) -> usize {
        self.delay_queue.len()
    }

    pub fn is_pending(&self, hop: Ipv4Addr) -> bool {
        self.timers.contains_key(&hop)
    }

    /// Record `hop -> hw_addr` and forward every frame waiting on `hop` to `send_queue`, in order.
    /// Frames the send queue cannot take are dropped.
    pub fn add(&mut self, hop: Ipv4Addr, hw_addr: MacAddr, send_queue: &mut Queue) {
        self.cache.add(hop, hw_addr, self.timer_manager.now());
        if self.timers.remove(&hop).is_none() {
            return;
        }

        let mut released = 0usize;
        self.delay_queue.scan(|mut frame| {
            if frame.hop_addr != hop {
                return Some(frame);
            }
            if let Err(err) = EthernetHeader::set_dst(frame.data_mut(), hw_addr) {
                tracing::trace!(%err, reason = "no Ethernet header", "dropping frame");
                return None;
            }
            released += 1;
            if let Err(frame) = send_queue.push(frame) {
                tracing::trace!(len = frame.len(), reason = "send queue full", "dropping frame");
            }
            None
        });
        tracing::debug!(%hop, %hw_addr, released, "resolved next hop");
    }

    pub fn lookup(&mut self, hop: Ipv4Addr) -> Option<MacAddr> {
        self.cache.lookup(hop, self.timer_manager.now())
    }

    /// Hold `frame` until its `hop_addr` resolves or times out.
    pub fn delay(&mut self, frame: Frame) -> DelayOutcome {
        if frame.len() < EthernetHeader::HEADER_LEN {
            tracing::trace!(len = frame.len(), reason = "no Ethernet header", "dropping frame");
            return DelayOutcome::Dropped;
        }
        let hop = frame.hop_addr;
        if let Err(frame) = self.delay_queue.push(frame) {
            tracing::trace!(len = frame.len(), %hop, reason = "ARP queue full", "dropping frame");
            return DelayOutcome::Dropped;
        }
        if self.timers.contains_key(&hop) {
            return DelayOutcome::Queued;
        }

        let timer = self.timer_manager.timer(move |host: &mut H| {
            host.arp_queue().expire(hop);
            Ok(())
        });
        timer.run_after(self.timeout);
        self.timers.insert(hop, timer);
        DelayOutcome::NewTimer
    }

    fn expire(&mut self, hop: Ipv4Addr) {
        let mut dropped = 0usize;
        self.delay_queue.scan(|frame| {
            if frame.hop_addr == hop {
                dropped += 1;
                None
            } else {
                Some(frame)
            }
        });
        tracing::debug!(%hop, dropped, "ARP resolution timed out");
        self.timers.remove(&hop);
    }
}
