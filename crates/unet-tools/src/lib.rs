//! Command-line plumbing shared by the `unet-*` tools.

use core::net::Ipv4Addr;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use unet_stack::{Options, Stack};
use unet_tap::Tap;
use unet_wire::{Ipv4Cidr, MacAddr};

/// How the tools attach the stack to the network.
#[derive(Args, Debug)]
pub struct NetArgs {
    /// TAP interface to attach to (must already exist and be up)
    #[arg(long, default_value = "tap0")]
    pub tap: String,

    /// Our Ethernet address
    #[arg(long, value_name = "MAC", default_value = "06:11:22:33:44:55")]
    pub hw_addr: MacAddr,

    /// Our IPv4 address and subnet prefix
    #[arg(long, value_name = "IP/PREFIX", default_value = "10.255.255.102/24")]
    pub addr: Ipv4Cidr,

    /// Default gateway; must be inside the --addr subnet
    #[arg(long, value_name = "IP", default_value = "10.255.255.1")]
    pub gateway: Ipv4Addr,

    /// Delay between probes
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub interval_ms: u64,
}

impl NetArgs {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn open_stack(&self) -> anyhow::Result<Stack> {
        let tap = Tap::open(&self.tap).with_context(|| format!("open TAP device {}", self.tap))?;
        let stack = Stack::new(tap, self.hw_addr, self.addr, self.gateway, Options::default())
            .context("create network stack")?;
        Ok(stack)
    }
}

/// Log to stderr, filtered by `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}
