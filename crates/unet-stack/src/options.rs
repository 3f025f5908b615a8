use std::time::Duration;

/// Tunables fixed at [`crate::Stack`] construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Frames the shared send queue holds between the round-robin drain and the device.
    pub stack_send_queue_len: usize,
    /// Frames that may wait for ARP resolution at once, across all next hops.
    pub arp_queue_len: usize,
    /// Maximum number of IPv4 to Ethernet mappings cached.
    pub arp_cache_size: usize,
    /// How long frames wait for an ARP reply before they are dropped.
    pub arp_timeout: Duration,
    /// How long a learned mapping stays valid.
    pub arp_cache_ttl: Duration,
    /// Bytes a raw socket may have queued for egress.
    pub raw_socket_send_queue_len: usize,
    /// Bytes a raw socket may have queued for reading.
    pub raw_socket_read_queue_len: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            stack_send_queue_len: 16 * 1024,
            arp_queue_len: 1024,
            arp_cache_size: 1024,
            arp_timeout: Duration::from_secs(1),
            arp_cache_ttl: Duration::from_secs(60),
            raw_socket_send_queue_len: 32 * 1024,
            raw_socket_read_queue_len: 32 * 1024,
        }
    }
}
