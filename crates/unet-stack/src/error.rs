use core::net::Ipv4Addr;

use unet_wire::{Ipv4Cidr, PacketError};

use crate::socket::raw::Layer;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced to callers.
///
/// Backpressure (full queues and caches) and malformed input are not errors: they surface as
/// `0`/`false`/`Err(frame)` returns or silent drops.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid device: {0}")]
    InvalidDevice(&'static str),

    #[error("default gateway {gateway} is outside of subnet {cidr}")]
    GatewayOutsideSubnet { gateway: Ipv4Addr, cidr: Ipv4Cidr },

    #[error("device MTU {mtu} is too small for {layer:?} sockets (need at least {needed})")]
    MtuTooSmall {
        layer: Layer,
        mtu: usize,
        needed: usize,
    },

    #[error("{0} is already running")]
    Reentrant(&'static str),

    #[error("clock went backwards")]
    ClockWentBackwards,

    #[error("socket is closed")]
    SocketClosed,

    #[error("frame view {offset}..{offset}+{len} is outside of the {data_len} byte buffer")]
    ViewOutOfBounds {
        offset: usize,
        len: usize,
        data_len: usize,
    },

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error("device I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("callback failed: {0}")]
    Callback(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an application error returned from a socket or timer callback.
    pub fn callback(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Callback(err.into())
    }
}
