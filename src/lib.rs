//! Userspace Ethernet/ARP/IPv4 networking on a single-threaded event loop.
//!
//! This crate re-exports the stack and the wire formats so applications can depend on one crate:
//!
//! ```no_run
//! use unet::stack::{Layer, Options, Stack};
//! use unet::tap::Tap;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let tap = Tap::open("tap0")?;
//! let mut stack = Stack::new(
//!     tap,
//!     "06:11:22:33:44:55".parse()?,
//!     "10.255.255.102/24".parse()?,
//!     "10.255.255.1".parse()?,
//!     Options::default(),
//! )?;
//! let socket = stack.open_raw_socket(Layer::Ipv4, |_stack, _socket, _events| Ok(()))?;
//! socket.close(&mut stack);
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]

pub use unet_stack as stack;
pub use unet_tap as tap;
pub use unet_wire as wire;

pub use unet_stack::{Error, Events, Layer, Options, RawSocket, Result, Stack};
