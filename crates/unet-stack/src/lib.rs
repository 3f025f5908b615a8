//! A single-threaded userspace Ethernet/ARP/IPv4 stack.
//!
//! The [`Stack`] owns a [`Device`] and runs a polling event loop: it reads frames from the device,
//! answers ARP and ICMP echo requests, fans frames out to raw sockets, fires timers, invokes socket
//! callbacks, drains socket egress queues round-robin and finally resolves next hops (delaying
//! frames behind ARP resolution when needed) before handing frames back to the device.
#![forbid(unsafe_code)]

pub mod arp_cache;
pub mod arp_queue;
pub mod clock;
pub mod dev;
pub mod error;
pub mod event;
pub mod frame;
pub mod options;
pub mod queue;
pub mod raw_socket;
pub mod socket;
pub mod stack;
pub mod timer;

pub use clock::{Clock, ManualClock, StdClock};
pub use dev::Device;
pub use error::{Error, Result};
pub use event::Events;
pub use frame::Frame;
pub use options::Options;
pub use queue::{Queue, QueuePolicy};
pub use raw_socket::RawSocket;
pub use socket::raw::Layer;
pub use socket::{SocketHost, SocketId, SocketSet};
pub use stack::Stack;
pub use timer::{Timer, TimerManager};
