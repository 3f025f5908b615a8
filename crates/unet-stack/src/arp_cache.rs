use core::net::Ipv4Addr;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use unet_wire::MacAddr;

#[derive(Debug, Clone, Copy)]
struct Entry {
    hw_addr: MacAddr,
    used_at: Instant,
    expire_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expire_at
    }
}

/// Bounded IPv4 to Ethernet mapping with TTL expiry and LRU eviction.
///
/// When an insert pushes the cache over capacity, every expired entry is dropped first; only if
/// that frees nothing is the least recently used entry evicted.
#[derive(Debug)]
pub struct ArpCache {
    entries: HashMap<Ipv4Addr, Entry>,
    capacity: usize,
    ttl: Duration,
}

impl ArpCache {
    /// A `capacity` of 0 is raised to 1: the entry just added always survives garbage collection.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert or refresh the mapping for `ip`.
    pub fn add(&mut self, ip: Ipv4Addr, hw_addr: MacAddr, now: Instant) {
        self.entries.insert(
            ip,
            Entry {
                hw_addr,
                used_at: now,
                expire_at: now + self.ttl,
            },
        );
        if self.entries.len() > self.capacity {
            self.gc(ip, now);
        }
    }

    /// The mapping for `ip`, if it has not expired. Hits count as a use for LRU purposes.
    pub fn lookup(&mut self, ip: Ipv4Addr, now: Instant) -> Option<MacAddr> {
        let entry = self.entries.get_mut(&ip)?;
        if entry.is_expired(now) {
            self.entries.remove(&ip);
            return None;
        }
        entry.used_at = now;
        Some(entry.hw_addr)
    }

    fn gc(&mut self, keep: Ipv4Addr, now: Instant) {
        let mut lru: Option<(Ipv4Addr, Instant)> = None;
        self.entries.retain(|ip, entry| {
            if entry.is_expired(now) {
                return false;
            }
            if *ip != keep && lru.map_or(true, |(_, used_at)| entry.used_at < used_at) {
                lru = Some((*ip, entry.used_at));
            }
            true
        });

        if self.entries.len() > self.capacity {
            if let Some((ip, _)) = lru {
                tracing::debug!(%ip, "evicting least recently used ARP entry");
                self.entries.remove(&ip);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn ip(n: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, n)
    }

    fn mac(n: u8) -> MacAddr {
        MacAddr([2, 0, 0, 0, 0, n])
    }

    #[test]
    fn lookup_within_ttl_hits() {
        let t0 = Instant::now();
        let mut cache = ArpCache::new(4, TTL);
        cache.add(ip(1), mac(1), t0);
        assert_eq!(cache.lookup(ip(1), t0 + Duration::from_secs(59)), Some(mac(1)));
        assert_eq!(cache.lookup(ip(2), t0), None);
    }

    #[test]
    fn lookup_at_expiry_misses_and_removes() {
        let t0 = Instant::now();
        let mut cache = ArpCache::new(4, TTL);
        cache.add(ip(1), mac(1), t0);
        assert_eq!(cache.lookup(ip(1), t0 + TTL), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn add_overwrites_and_extends_ttl() {
        let t0 = Instant::now();
        let mut cache = ArpCache::new(4, TTL);
        cache.add(ip(1), mac(1), t0);
        cache.add(ip(1), mac(9), t0 + Duration::from_secs(30));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(ip(1), t0 + TTL), Some(mac(9)));
    }

    #[test]
    fn gc_prefers_expired_entries() {
        let t0 = Instant::now();
        let mut cache = ArpCache::new(2, TTL);
        cache.add(ip(1), mac(1), t0);
        cache.add(ip(2), mac(2), t0 + Duration::from_secs(30));

        // ip(1) has expired by now, while ip(2) is older than ip(3) but still valid.
        let t1 = t0 + TTL;
        cache.add(ip(3), mac(3), t1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup(ip(1), t1), None);
        assert_eq!(cache.lookup(ip(2), t1), Some(mac(2)));
        assert_eq!(cache.lookup(ip(3), t1), Some(mac(3)));
    }

    #[test]
    fn gc_evicts_least_recently_used() {
        let t0 = Instant::now();
        let s = Duration::from_secs;
        let mut cache = ArpCache::new(2, TTL);
        cache.add(ip(1), mac(1), t0);
        cache.add(ip(2), mac(2), t0 + s(1));
        assert_eq!(cache.lookup(ip(1), t0 + s(2)), Some(mac(1)));

        cache.add(ip(3), mac(3), t0 + s(3));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup(ip(2), t0 + s(4)), None);
        assert_eq!(cache.lookup(ip(1), t0 + s(4)), Some(mac(1)));
        assert_eq!(cache.lookup(ip(3), t0 + s(4)), Some(mac(3)));
    }

    #[test]
    fn zero_capacity_is_clamped_and_never_exceeded() {
        let t0 = Instant::now();
        let mut cache = ArpCache::new(0, TTL);
        assert_eq!(cache.capacity(), 1);
        cache.add(ip(1), mac(1), t0);
        assert!(cache.len() <= cache.capacity());
        cache.add(ip(2), mac(2), t0);
        assert!(cache.len() <= cache.capacity());
        assert_eq!(cache.lookup(ip(1), t0), None);
        assert_eq!(cache.lookup(ip(2), t0), Some(mac(2)));
    }
}
