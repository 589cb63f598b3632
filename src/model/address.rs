//! CIDR address ranges
//!
//! Rules may restrict the source address of a request with a CIDR range.
//! Both IPv4 and IPv6 ranges are supported; a bare address is read as a
//! single-host range.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// A CIDR address range such as `10.0.0.0/8` or `2001:db8::/32`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpRange {
    network: IpAddr,
    prefix: u8,
}

/// Error returned when a CIDR string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address range '{0}'")]
pub struct IpRangeParseError(pub String);

impl IpRange {
    /// Create a range, masking off host bits of `network`
    pub fn new(network: IpAddr, prefix: u8) -> Option<Self> {
        let max = max_prefix(&network);
        if prefix > max {
            return None;
        }
        let network = match network {
            IpAddr::V4(v4) => {
                let bits = u32::from(v4) & mask_v4(prefix);
                IpAddr::V4(bits.into())
            }
            IpAddr::V6(v6) => {
                let bits = u128::from(v6) & mask_v6(prefix);
                IpAddr::V6(bits.into())
            }
        };
        Some(Self { network, prefix })
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Check whether `addr` lies within this range.
    ///
    /// Addresses of the other family never match.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(a)) => {
                let mask = mask_v4(self.prefix);
                u32::from(*a) & mask == u32::from(net)
            }
            (IpAddr::V6(net), IpAddr::V6(a)) => {
                let mask = mask_v6(self.prefix);
                u128::from(*a) & mask == u128::from(net)
            }
            _ => false,
        }
    }
}

fn max_prefix(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl FromStr for IpRange {
    type Err = IpRangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || IpRangeParseError(trimmed.to_string());

        let (addr, prefix) = match trimmed.split_once('/') {
            Some((addr, prefix)) => {
                let addr: IpAddr = addr.trim().parse().map_err(|_| err())?;
                let prefix: u8 = prefix.trim().parse().map_err(|_| err())?;
                (addr, prefix)
            }
            None => {
                let addr: IpAddr = trimmed.parse().map_err(|_| err())?;
                let prefix = max_prefix(&addr);
                (addr, prefix)
            }
        };

        IpRange::new(addr, prefix).ok_or_else(err)
    }
}

impl TryFrom<String> for IpRange {
    type Error = IpRangeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IpRange> for String {
    fn from(range: IpRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_cidr() {
        let range: IpRange = "10.10.0.0/16".parse().unwrap();
        assert_eq!(range.prefix(), 16);
        assert!(range.contains(&ip("10.10.200.1")));
        assert!(!range.contains(&ip("10.11.0.1")));
    }

    #[test]
    fn test_host_bits_are_masked() {
        let range: IpRange = "192.168.1.77/24".parse().unwrap();
        assert_eq!(range.to_string(), "192.168.1.0/24");
    }

    #[test]
    fn test_bare_address_is_single_host() {
        let range: IpRange = "127.0.0.1".parse().unwrap();
        assert!(range.contains(&ip("127.0.0.1")));
        assert!(!range.contains(&ip("127.0.0.2")));
    }

    #[test]
    fn test_ipv6() {
        let range: IpRange = "2001:db8::/32".parse().unwrap();
        assert!(range.contains(&ip("2001:db8:1::1")));
        assert!(!range.contains(&ip("2001:db9::1")));
        assert!(!range.contains(&ip("10.0.0.1")));
    }

    #[test]
    fn test_zero_prefix_matches_family() {
        let range: IpRange = "0.0.0.0/0".parse().unwrap();
        assert!(range.contains(&ip("8.8.8.8")));
        assert!(!range.contains(&ip("::1")));
    }

    #[test]
    fn test_invalid_ranges() {
        assert!("10.0.0.0/33".parse::<IpRange>().is_err());
        assert!("not-an-ip".parse::<IpRange>().is_err());
        assert!("10.0.0.0/x".parse::<IpRange>().is_err());

        let err = " 10.0.0.0/33 ".parse::<IpRange>().unwrap_err();
        assert_eq!(err, IpRangeParseError("10.0.0.0/33".to_string()));
        assert_eq!(err.to_string(), "invalid address range '10.0.0.0/33'");
        let source: &dyn std::error::Error = &err;
        assert!(source.source().is_none());
    }

    #[test]
    fn test_serde_as_string() {
        let range: IpRange = "10.0.0.0/8".parse().unwrap();
        let json = serde_json::to_string(&range).unwrap();
        assert_eq!(json, r#""10.0.0.0/8""#);
        let back: IpRange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, range);
    }
}
