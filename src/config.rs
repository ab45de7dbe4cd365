use std::net::Ipv4Addr;

use pnet::ipnetwork::IpNetwork;
use tracing::info;

use crate::error::{Error, Result};

pub const DEFAULT_LEASE_TIME_SECONDS: u32 = 3600;

/// The server's own addressing, fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub addr: Ipv4Addr,
    pub mask: Ipv4Addr,
    /// Used for the reply `sname` field and to refuse leasing to
    /// ourselves. Empty if the host name could not be determined, which
    /// disables the self-request check.
    pub hostname: String,
    pub lease_time_seconds: u32,
}

impl ServerIdentity {
    pub fn new(addr: Ipv4Addr, mask: Ipv4Addr, hostname: String) -> Self {
        Self {
            addr,
            mask,
            hostname,
            lease_time_seconds: DEFAULT_LEASE_TIME_SECONDS,
        }
    }

    /// Derives the identity from the host's interface table.
    ///
    /// The machine must have exactly one loopback address and one other
    /// IPv4 address; with more interfaces present there is no single
    /// subnet to serve and routing cannot be bypassed.
    pub fn discover() -> Result<Self> {
        let identity = Self::from_addresses(&interface_addresses())?;
        info!(
            "using address {} mask {} (host name {:?})",
            identity.addr, identity.mask, identity.hostname
        );
        Ok(identity)
    }

    fn from_addresses(addresses: &[(Ipv4Addr, Ipv4Addr)]) -> Result<Self> {
        if addresses.len() != 2 {
            return Err(Error::Init(format!(
                "expected one loopback and one other IPv4 address, found {}; \
                 routing cannot be bypassed",
                addresses.len()
            )));
        }

        let loopback_first = addresses[0].0.is_loopback();
        let loopback_second = addresses[1].0.is_loopback();
        if loopback_first == loopback_second {
            return Err(Error::Init(
                "unsupported IP address configuration: expected a loopback \
                 address and one other"
                    .to_string(),
            ));
        }

        let (addr, mask) = if loopback_second {
            addresses[0]
        } else {
            addresses[1]
        };
        if addr == Ipv4Addr::UNSPECIFIED {
            return Err(Error::Init(
                "IP address is 0.0.0.0: no network is available (Auto-IP may \
                 not have assigned an address yet)"
                    .to_string(),
            ));
        }

        let hostname = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self::new(addr, mask, hostname))
    }
}

/// All local IPv4 addresses with their netmasks.
fn interface_addresses() -> Vec<(Ipv4Addr, Ipv4Addr)> {
    let mut addresses = Vec::new();
    for interface in pnet::datalink::interfaces() {
        for network in &interface.ips {
            if let IpNetwork::V4(network) = network {
                addresses.push((network.ip(), network.mask()));
            }
        }
    }
    addresses
}

/// The pool of host-order address values the allocator may hand out,
/// derived once from the server address and netmask.
///
/// `min` skips the network number and `.1` (reserved for the default
/// router); `max` skips the subnet broadcast address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    min: u32,
    max: u32,
}

impl AddressRange {
    pub fn from_subnet(addr: Ipv4Addr, mask: Ipv4Addr) -> Result<Self> {
        let addr_value = u32::from(addr);
        let mask_value = u32::from(mask);

        let min = (addr_value & mask_value) | 2;
        let max = (addr_value & mask_value) | !(mask_value | 1);

        if min > max {
            return Err(Error::Init(format!(
                "not enough addresses in subnet {}/{}",
                addr, mask
            )));
        }

        Ok(Self { min, max })
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn contains(&self, value: u32) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn size(&self) -> u32 {
        self.max - self.min + 1
    }

    /// The next allocation candidate: `value` itself while it is inside
    /// the range, wrapping back to `min` past `max`.
    pub fn next_candidate(&self, value: u32) -> u32 {
        if value <= self.max { value } else { self.min }
    }
}

/// Strips characters that have no business in a host name before it is
/// stored or logged.
pub fn sanitize_hostname(hostname: &str) -> String {
    hostname
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '.')
        .take(255)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_from_slash_24() {
        let range = AddressRange::from_subnet(
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(255, 255, 255, 0),
        )
        .unwrap();

        assert_eq!(Ipv4Addr::from(range.min()), Ipv4Addr::new(192, 168, 1, 2));
        assert_eq!(Ipv4Addr::from(range.max()), Ipv4Addr::new(192, 168, 1, 254));
        assert_eq!(range.size(), 253);
    }

    #[test]
    fn test_range_from_slash_30() {
        let range = AddressRange::from_subnet(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(255, 255, 255, 252),
        )
        .unwrap();

        // A /30 leaves exactly one usable pool address.
        assert_eq!(range.min(), range.max());
        assert_eq!(Ipv4Addr::from(range.min()), Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn test_range_too_small() {
        let result = AddressRange::from_subnet(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(255, 255, 255, 254),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_next_candidate_wraps() {
        let range = AddressRange::from_subnet(
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(255, 255, 255, 0),
        )
        .unwrap();

        assert_eq!(range.next_candidate(range.min()), range.min());
        assert_eq!(range.next_candidate(range.max()), range.max());
        assert_eq!(range.next_candidate(range.max() + 1), range.min());
    }

    #[test]
    fn test_identity_selection() {
        let loopback = (Ipv4Addr::new(127, 0, 0, 1), Ipv4Addr::new(255, 0, 0, 0));
        let lan = (
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(255, 255, 255, 0),
        );

        let identity = ServerIdentity::from_addresses(&[loopback, lan]).unwrap();
        assert_eq!(identity.addr, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(identity.mask, Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(identity.lease_time_seconds, DEFAULT_LEASE_TIME_SECONDS);

        let identity = ServerIdentity::from_addresses(&[lan, loopback]).unwrap();
        assert_eq!(identity.addr, Ipv4Addr::new(192, 168, 1, 10));
    }

    #[test]
    fn test_identity_rejects_bad_configurations() {
        let loopback = (Ipv4Addr::new(127, 0, 0, 1), Ipv4Addr::new(255, 0, 0, 0));
        let lan = (
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(255, 255, 255, 0),
        );
        let other = (Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(255, 0, 0, 0));

        assert!(ServerIdentity::from_addresses(&[loopback]).is_err());
        assert!(ServerIdentity::from_addresses(&[loopback, lan, other]).is_err());
        assert!(ServerIdentity::from_addresses(&[lan, other]).is_err());
        assert!(ServerIdentity::from_addresses(&[loopback, loopback]).is_err());

        let unassigned = (Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED);
        assert!(ServerIdentity::from_addresses(&[loopback, unassigned]).is_err());
    }

    #[test]
    fn test_sanitize_hostname() {
        assert_eq!(sanitize_hostname("valid-host.local"), "valid-host.local");
        assert_eq!(sanitize_hostname("bad\x00host"), "badhost");
        assert_eq!(sanitize_hostname("has spaces"), "hasspaces");
    }
}
