use core::fmt;
use core::net::Ipv4Addr;
use core::str::FromStr;

/// An interface address with its subnet prefix (e.g. `10.0.0.2/24`).
///
/// Unlike a pure network prefix the host bits are kept, so the same value names both the stack's
/// own address and the subnet it is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    addr: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    /// `prefix_len` values above 32 are clamped to 32.
    pub const fn new(addr: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            addr,
            prefix_len: if prefix_len > 32 { 32 } else { prefix_len },
        }
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn mask(&self) -> u32 {
        if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix_len))
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) & self.mask())
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let mask = self.mask();
        u32::from(self.addr) & mask == u32::from(ip) & mask
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid IPv4 CIDR {0:?} (expected a.b.c.d/prefix with prefix <= 32)")]
pub struct ParseCidrError(String);

impl FromStr for Ipv4Cidr {
    type Err = ParseCidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseCidrError(s.to_string());
        let (addr, prefix) = s.split_once('/').ok_or_else(err)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| err())?;
        let prefix_len: u8 = prefix.parse().map_err(|_| err())?;
        if prefix_len > 32 {
            return Err(err());
        }
        Ok(Self::new(addr, prefix_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_respects_prefix_boundary() {
        let cidr = Ipv4Cidr::new(Ipv4Addr::new(10, 0, 2, 15), 24);
        assert!(cidr.contains(Ipv4Addr::new(10, 0, 2, 1)));
        assert!(cidr.contains(Ipv4Addr::new(10, 0, 2, 255)));
        assert!(!cidr.contains(Ipv4Addr::new(10, 0, 3, 1)));
        assert_eq!(cidr.network(), Ipv4Addr::new(10, 0, 2, 0));
    }

    #[test]
    fn zero_and_full_prefixes() {
        let any = Ipv4Cidr::new(Ipv4Addr::new(192, 168, 1, 1), 0);
        assert!(any.contains(Ipv4Addr::new(8, 8, 8, 8)));

        let host = Ipv4Cidr::new(Ipv4Addr::new(192, 168, 1, 1), 32);
        assert!(host.contains(Ipv4Addr::new(192, 168, 1, 1)));
        assert!(!host.contains(Ipv4Addr::new(192, 168, 1, 2)));

        assert_eq!(Ipv4Cidr::new(Ipv4Addr::LOCALHOST, 40).prefix_len(), 32);
    }

    #[test]
    fn parse_round_trips_display() {
        let cidr: Ipv4Cidr = "10.0.0.2/16".parse().unwrap();
        assert_eq!(cidr.addr(), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(cidr.prefix_len(), 16);
        assert_eq!(cidr.to_string(), "10.0.0.2/16");

        assert!("10.0.0.2".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.2/33".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0/8".parse::<Ipv4Cidr>().is_err());
    }
}
