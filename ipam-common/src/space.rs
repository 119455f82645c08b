//! Address-space sizing and generation eligibility

use crate::{CidrBlock, GenerationPolicy, IpVersion, IpamError, Result};
use std::net::IpAddr;

/// Usable-host figures for a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpace {
    pub version: IpVersion,
    pub prefix: u8,
    /// Usable hosts; for IPv6 capped at the accounting ceiling
    pub usable_hosts: u128,
    /// First/last usable address as integers (IPv4 only)
    pub ipv4_range: Option<(u32, u32)>,
}

impl AddressSpace {
    /// Size a block
    ///
    /// IPv4 excludes the network and broadcast addresses; IPv6 counts the
    /// whole block, clamped to `policy.ipv6_accounting_cap`.
    pub fn of(block: &CidrBlock, policy: &GenerationPolicy) -> Self {
        let prefix = block.prefix();
        match block.network() {
            IpAddr::V4(network) => {
                let size = 1u128 << (32 - u32::from(prefix));
                let usable_hosts = size.saturating_sub(2);

                let ipv4_range = (usable_hosts > 0).then(|| {
                    let network = u32::from(network);
                    // usable_hosts <= 2^32 - 2, so neither end overflows
                    (network + 1, network + usable_hosts as u32)
                });

                Self {
                    version: IpVersion::V4,
                    prefix,
                    usable_hosts,
                    ipv4_range,
                }
            }
            IpAddr::V6(_) => {
                let host_bits = 128 - u32::from(prefix);
                let cap = u128::from(policy.ipv6_accounting_cap);
                let usable_hosts = if host_bits >= 128 {
                    cap
                } else {
                    (1u128 << host_bits).min(cap)
                };

                Self {
                    version: IpVersion::V6,
                    prefix,
                    usable_hosts,
                    ipv4_range: None,
                }
            }
        }
    }

    /// Descriptive estimate as stored on the subnet row
    pub fn estimate(&self) -> i64 {
        i64::try_from(self.usable_hosts).unwrap_or(i64::MAX)
    }

    /// Check that the block may be enumerated
    ///
    /// Subnet creation does not call this; only generation does.
    pub fn check_generation(&self, policy: &GenerationPolicy) -> Result<()> {
        let (min, max) = match self.version {
            IpVersion::V4 => (policy.ipv4_min_prefix, policy.ipv4_max_prefix),
            IpVersion::V6 => (policy.ipv6_min_prefix, policy.ipv6_max_prefix),
        };

        if self.prefix < min || self.prefix > max {
            return Err(IpamError::PrefixOutOfRange {
                prefix: self.prefix,
                version: self.version,
                min,
                max,
            });
        }

        if self.version == IpVersion::V4 && self.usable_hosts > u128::from(policy.ipv4_max_hosts) {
            return Err(IpamError::SubnetTooLarge {
                hosts: self.usable_hosts,
                limit: u128::from(policy.ipv4_max_hosts),
            });
        }

        Ok(())
    }

    /// Whether subnet creation populates the pool inline
    pub fn eager_eligible(&self, policy: &GenerationPolicy) -> bool {
        self.version == IpVersion::V4 && self.check_generation(policy).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space(cidr: &str) -> AddressSpace {
        AddressSpace::of(&CidrBlock::parse(cidr).unwrap(), &GenerationPolicy::default())
    }

    #[test]
    fn test_ipv4_usable_hosts() {
        let s = space("192.168.10.0/24");
        assert_eq!(s.usable_hosts, 254);

        let network = u32::from(std::net::Ipv4Addr::new(192, 168, 10, 0));
        assert_eq!(s.ipv4_range, Some((network + 1, network + 254)));

        assert_eq!(space("10.0.0.0/16").usable_hosts, 65_534);
        assert_eq!(space("10.0.0.0/30").usable_hosts, 2);
        assert_eq!(space("10.0.0.0/8").usable_hosts, (1 << 24) - 2);
        assert_eq!(space("10.0.0.0/31").usable_hosts, 0);
        assert_eq!(space("10.0.0.0/31").ipv4_range, None);
        assert_eq!(space("0.0.0.0/0").usable_hosts, (1u128 << 32) - 2);
    }

    #[test]
    fn test_ipv6_accounting_cap() {
        assert_eq!(space("2001:db8::/120").usable_hosts, 256);
        assert_eq!(space("2001:db8::/108").usable_hosts, 1_000_000);
        assert_eq!(space("2001:db8::/64").usable_hosts, 1_000_000);
        assert_eq!(space("::/0").usable_hosts, 1_000_000);
        assert_eq!(space("2001:db8::/64").estimate(), 1_000_000);
    }

    #[test]
    fn test_ipv4_generation_band() {
        let policy = GenerationPolicy::default();

        assert!(space("10.0.0.0/16").check_generation(&policy).is_ok());
        assert!(space("10.0.0.0/30").check_generation(&policy).is_ok());

        let err = space("10.0.0.0/15").check_generation(&policy).unwrap_err();
        assert!(matches!(err, IpamError::PrefixOutOfRange { prefix: 15, .. }));

        let err = space("10.0.0.0/31").check_generation(&policy).unwrap_err();
        assert!(matches!(err, IpamError::PrefixOutOfRange { prefix: 31, .. }));
    }

    #[test]
    fn test_ipv4_host_cap_applies_inside_band() {
        let policy = GenerationPolicy {
            ipv4_min_prefix: 8,
            ..GenerationPolicy::default()
        };

        let err = space("10.0.0.0/8").check_generation(&policy).unwrap_err();
        assert!(matches!(err, IpamError::SubnetTooLarge { limit: 65_534, .. }));
    }

    #[test]
    fn test_ipv6_generation_band() {
        let policy = GenerationPolicy::default();

        assert!(space("2001:db8::/48").check_generation(&policy).is_ok());
        assert!(space("2001:db8::/120").check_generation(&policy).is_ok());
        assert!(space("2001:db8::/47").check_generation(&policy).is_err());
        assert!(space("2001:db8::/121").check_generation(&policy).is_err());
    }

    #[test]
    fn test_eager_eligibility() {
        let policy = GenerationPolicy::default();

        assert!(space("192.168.10.0/24").eager_eligible(&policy));
        assert!(!space("10.0.0.0/8").eager_eligible(&policy));
        assert!(!space("2001:db8::/120").eager_eligible(&policy));
    }
}
