//! Linux TAP interfaces as a [`Device`] for the userspace stack.
//!
//! The interface must already exist and be up (e.g. `ip tuntap add dev tap0 mode tap`); opening it
//! attaches a non-blocking file descriptor that carries whole Ethernet frames without the packet
//! information prefix.

use std::fs::File;
use std::io::{self, Read, Write};

use unet_stack::Device;
use unet_wire::EthernetHeader;

/// Kernel limit on interface names, terminating NUL included.
pub const IFNAMSIZ: usize = 16;

#[derive(Debug)]
pub struct Tap {
    file: File,
    name: String,
    mtu: usize,
}

impl Tap {
    /// Attach to the TAP interface `name`.
    pub fn open(name: &str) -> io::Result<Self> {
        if name.len() >= IFNAMSIZ {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("interface name must be shorter than {IFNAMSIZ} bytes"),
            ));
        }
        if name.as_bytes().contains(&0) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "interface name contains a NUL byte",
            ));
        }

        let (file, name, link_mtu) = sys::open(name)?;
        if link_mtu == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "TAP interface has an MTU of 0",
            ));
        }
        let mtu = link_mtu + EthernetHeader::HEADER_LEN;
        tracing::info!(%name, mtu, "opened TAP device");
        Ok(Self { file, name, mtu })
    }

    /// Interface name as assigned by the kernel.
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn would_block_as_zero(result: io::Result<usize>) -> io::Result<usize> {
    match result {
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(0),
        other => other,
    }
}

impl Device for Tap {
    fn send(&mut self, frame: &[u8]) -> io::Result<usize> {
        if frame.is_empty() {
            return Ok(0);
        }
        would_block_as_zero(self.file.write(frame))
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        would_block_as_zero(self.file.read(buf))
    }

    /// Link MTU plus the Ethernet header.
    fn max_transmission_unit(&self) -> usize {
        self.mtu
    }
}

#[cfg(target_os = "linux")]
mod sys {
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
    use std::os::unix::fs::OpenOptionsExt;

    use super::IFNAMSIZ;

    const TUNSETIFF: u64 = 0x4004_54ca;
    const IFF_TAP: i16 = 0x0002;
    const IFF_NO_PI: i16 = 0x1000;

    /// `struct ifreq`: the name followed by a 24-byte union, of which we use the `short` flags and
    /// the `int` MTU.
    #[repr(C)]
    struct IfReq {
        name: [u8; IFNAMSIZ],
        data: [u8; 24],
    }

    impl IfReq {
        fn new(name: &str) -> Self {
            let mut req = Self {
                name: [0; IFNAMSIZ],
                data: [0; 24],
            };
            req.name[..name.len()].copy_from_slice(name.as_bytes());
            req
        }

        fn name(&self) -> String {
            let len = self.name.iter().position(|&b| b == 0).unwrap_or(IFNAMSIZ);
            String::from_utf8_lossy(&self.name[..len]).into_owned()
        }

        fn set_flags(&mut self, flags: i16) {
            self.data[..2].copy_from_slice(&flags.to_ne_bytes());
        }

        fn mtu(&self) -> i32 {
            i32::from_ne_bytes([self.data[0], self.data[1], self.data[2], self.data[3]])
        }
    }

    pub(super) fn open(name: &str) -> io::Result<(File, String, usize)> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open("/dev/net/tun")?;

        let mut req = IfReq::new(name);
        req.set_flags(IFF_TAP | IFF_NO_PI);
        // SAFETY: `req` is a live, ifreq-sized buffer and the fd is open for the whole call.
        if unsafe { libc::ioctl(file.as_raw_fd(), TUNSETIFF as _, &mut req as *mut IfReq) } == -1 {
            return Err(io::Error::last_os_error());
        }
        let name = req.name();
        let mtu = query_mtu(&name)?;
        Ok((file, name, mtu))
    }

    fn query_mtu(name: &str) -> io::Result<usize> {
        // SAFETY: plain socket(2) call; the result is checked before use.
        let raw = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0) };
        if raw == -1 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
        let sock = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut req = IfReq::new(name);
        // SAFETY: as for TUNSETIFF above.
        if unsafe { libc::ioctl(sock.as_raw_fd(), libc::SIOCGIFMTU as _, &mut req as *mut IfReq) }
            == -1
        {
            return Err(io::Error::last_os_error());
        }
        usize::try_from(req.mtu())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative interface MTU"))
    }

}

#[cfg(not(target_os = "linux"))]
mod sys {
    use std::fs::File;
    use std::io;

    pub(super) fn open(_name: &str) -> io::Result<(File, String, usize)> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "TAP devices are only supported on Linux",
        ))
    }
}
