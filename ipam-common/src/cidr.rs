//! CIDR parsing and validation

use crate::{IpVersion, IpamError, Result};
use ipnetwork::IpNetwork;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// A parsed `network/prefix` block
///
/// Host bits are masked off at parse time, so `192.168.10.7/24` and
/// `192.168.10.0/24` yield the same block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CidrBlock {
    network: IpNetwork,
}

impl CidrBlock {
    /// Parse a CIDR string
    ///
    /// Prefix range enforcement for generation is left to
    /// [`AddressSpace`](crate::AddressSpace); here only the structural
    /// maximum (32 or 128) is checked.
    pub fn parse(cidr: &str) -> Result<Self> {
        let cidr = cidr.trim();
        let (address, prefix) = cidr
            .split_once('/')
            .ok_or_else(|| IpamError::InvalidFormat(format!("{cidr}: missing prefix length")))?;

        let prefix: u8 = prefix
            .parse()
            .map_err(|_| IpamError::InvalidFormat(format!("{cidr}: prefix is not a number")))?;

        let address = parse_address(address)?;

        let network = IpNetwork::new(address, prefix)
            .map_err(|e| IpamError::InvalidFormat(format!("{cidr}: {e}")))?;

        // Mask host bits
        let network = IpNetwork::new(network.network(), prefix)
            .map_err(|e| IpamError::InvalidFormat(format!("{cidr}: {e}")))?;

        Ok(Self { network })
    }

    /// Network address with host bits cleared
    pub fn network(&self) -> IpAddr {
        self.network.network()
    }

    pub fn prefix(&self) -> u8 {
        self.network.prefix()
    }

    pub fn version(&self) -> IpVersion {
        match self.network {
            IpNetwork::V4(_) => IpVersion::V4,
            IpNetwork::V6(_) => IpVersion::V6,
        }
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix())
    }
}

impl FromStr for CidrBlock {
    type Err = IpamError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Parse a bare address, choosing the family by the presence of `:`
pub fn parse_address(address: &str) -> Result<IpAddr> {
    let address = address.trim();
    if address.contains(':') {
        address
            .parse::<std::net::Ipv6Addr>()
            .map(IpAddr::V6)
            .map_err(|_| IpamError::InvalidFormat(format!("{address}: not a valid IPv6 address")))
    } else {
        address
            .parse::<std::net::Ipv4Addr>()
            .map(IpAddr::V4)
            .map_err(|_| IpamError::InvalidFormat(format!("{address}: not a valid IPv4 address")))
    }
}

/// Parse an address and require it to be of `version`
pub fn parse_address_of(address: &str, version: IpVersion) -> Result<IpAddr> {
    let ip = parse_address(address)?;
    let matches = matches!(
        (ip, version),
        (IpAddr::V4(_), IpVersion::V4) | (IpAddr::V6(_), IpVersion::V6)
    );

    if !matches {
        return Err(IpamError::InvalidFormat(format!(
            "{address}: expected an {version} address"
        )));
    }

    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4() {
        let block = CidrBlock::parse("192.168.10.0/24").unwrap();
        assert_eq!(block.version(), IpVersion::V4);
        assert_eq!(block.prefix(), 24);
        assert_eq!(block.network().to_string(), "192.168.10.0");
        assert_eq!(block.to_string(), "192.168.10.0/24");
    }

    #[test]
    fn test_host_bits_masked() {
        let block = CidrBlock::parse("192.168.10.77/24").unwrap();
        assert_eq!(block.to_string(), "192.168.10.0/24");
    }

    #[test]
    fn test_parse_ipv6_compressed() {
        let block = CidrBlock::parse("2001:db8::/64").unwrap();
        assert_eq!(block.version(), IpVersion::V6);
        assert_eq!(block.prefix(), 64);
        assert_eq!(block.to_string(), "2001:db8::/64");

        let full = CidrBlock::parse("2001:0db8:0000:0000:0000:0000:0000:0000/64").unwrap();
        assert_eq!(full, block);
    }

    #[test]
    fn test_rejects_malformed() {
        for input in [
            "192.168.10.0",
            "192.168.10/24",
            "192.168.10.0.1/24",
            "192.168.300.0/24",
            "192.168.10.0/abc",
            "192.168.10.0/",
            "192.168.10.0/33",
            "2001:db8::/129",
            "2001:db8:::1/64",
            "",
        ] {
            let err = CidrBlock::parse(input).unwrap_err();
            assert!(matches!(err, IpamError::InvalidFormat(_)), "{input} -> {err:?}");
        }
    }

    #[test]
    fn test_parse_address_of() {
        assert!(parse_address_of("10.0.0.1", IpVersion::V4).is_ok());
        assert!(parse_address_of("2001:db8::1", IpVersion::V4).is_err());
        assert!(parse_address_of("10.0.0.1", IpVersion::V6).is_err());
        assert!(parse_address_of("not-an-ip", IpVersion::V4).is_err());
    }
}
