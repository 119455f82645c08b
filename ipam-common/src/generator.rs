//! Address pool enumeration
//!
//! IPv4 pools are enumerated in full with 32-bit integer arithmetic. IPv6
//! pools are a bounded practical subset: offsets are added to the expanded
//! network address group by group with carry, and never more than the
//! policy caps are produced.

use crate::{AddressSpace, CidrBlock, GenerationPolicy, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::{Range, RangeInclusive};

/// An IPv6 address as eight 16-bit groups, most significant first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hextets([u16; 8]);

impl Hextets {
    /// Expand an address into its eight groups, zero-filling `::`
    pub fn expand(address: Ipv6Addr) -> Self {
        Self(address.segments())
    }

    /// Add `offset`, carrying from the least significant group leftward
    ///
    /// A carry out of the first group is dropped.
    pub fn offset_by(&self, offset: u64) -> Self {
        let mut groups = self.0;
        let mut carry = offset;

        for group in groups.iter_mut().rev() {
            if carry == 0 {
                break;
            }
            let sum = u64::from(*group) + (carry & 0xffff);
            *group = (sum & 0xffff) as u16;
            carry = (carry >> 16) + (sum >> 16);
        }

        Self(groups)
    }

    pub fn to_addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.0)
    }
}

/// The set of addresses a generation writes for one subnet
#[derive(Debug, Clone)]
pub struct AddressPlan {
    block: CidrBlock,
    gateway: Option<IpAddr>,
    kind: PlanKind,
}

#[derive(Debug, Clone)]
enum PlanKind {
    V4 { first: u32, last: u32 },
    V6 { base: Hextets, offsets: Range<u64> },
}

impl AddressPlan {
    /// Plan the pool for `block`, excluding `gateway`
    ///
    /// Fails with `PrefixOutOfRange` or `SubnetTooLarge` when the block may
    /// not be enumerated under `policy`.
    pub fn build(
        block: &CidrBlock,
        gateway: Option<IpAddr>,
        policy: &GenerationPolicy,
    ) -> Result<Self> {
        let space = AddressSpace::of(block, policy);
        space.check_generation(policy)?;

        let kind = match block.network() {
            IpAddr::V4(_) => {
                // Band check guarantees at least two usable hosts
                let (first, last) = space.ipv4_range.unwrap_or((1, 0));
                PlanKind::V4 { first, last }
            }
            IpAddr::V6(network) => {
                let start = if gateway.is_some() { 2 } else { 1 };
                let host_bits = 128 - u32::from(block.prefix());

                let end = if host_bits < 64 {
                    let block_size = 1u64 << host_bits;
                    let count = block_size.min(u64::from(policy.ipv6_small_range_cap));
                    // Stay inside the block
                    count.min(block_size - 1) + 1
                } else {
                    start + u64::from(policy.ipv6_large_range_subset)
                };

                PlanKind::V6 {
                    base: Hextets::expand(network),
                    offsets: start..end.max(start),
                }
            }
        };

        Ok(Self {
            block: *block,
            gateway,
            kind,
        })
    }

    pub fn block(&self) -> &CidrBlock {
        &self.block
    }

    pub fn gateway(&self) -> Option<IpAddr> {
        self.gateway
    }

    /// Iterate the planned addresses in ascending order
    pub fn iter(&self) -> AddressIter {
        let inner = match &self.kind {
            PlanKind::V4 { first, last } => IterKind::V4(*first..=*last),
            PlanKind::V6 { base, offsets } => IterKind::V6 {
                base: *base,
                offsets: offsets.clone(),
            },
        };

        AddressIter {
            inner,
            gateway: self.gateway,
        }
    }

    /// Canonical text form of every planned address
    pub fn to_strings(&self) -> Vec<String> {
        self.iter().map(|ip| ip.to_string()).collect()
    }
}

impl<'a> IntoIterator for &'a AddressPlan {
    type Item = IpAddr;
    type IntoIter = AddressIter;

    fn into_iter(self) -> AddressIter {
        self.iter()
    }
}

/// Iterator over an [`AddressPlan`]
#[derive(Debug, Clone)]
pub struct AddressIter {
    inner: IterKind,
    gateway: Option<IpAddr>,
}

#[derive(Debug, Clone)]
enum IterKind {
    V4(RangeInclusive<u32>),
    V6 { base: Hextets, offsets: Range<u64> },
}

impl Iterator for AddressIter {
    type Item = IpAddr;

    fn next(&mut self) -> Option<IpAddr> {
        loop {
            let ip = match &mut self.inner {
                IterKind::V4(range) => IpAddr::V4(Ipv4Addr::from(range.next()?)),
                IterKind::V6 { base, offsets } => IpAddr::V6(base.offset_by(offsets.next()?).to_addr()),
            };

            if Some(ip) != self.gateway {
                return Some(ip);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IpamError;

    fn plan(cidr: &str, gateway: Option<&str>) -> AddressPlan {
        let block = CidrBlock::parse(cidr).unwrap();
        let gateway = gateway.map(|g| g.parse().unwrap());
        AddressPlan::build(&block, gateway, &GenerationPolicy::default()).unwrap()
    }

    #[test]
    fn test_hextet_carry() {
        let base = Hextets::expand("2001:db8::ffff".parse().unwrap());
        assert_eq!(base.offset_by(1).to_addr(), "2001:db8::1:0".parse::<Ipv6Addr>().unwrap());

        let base = Hextets::expand("2001:db8::ffff:ffff".parse().unwrap());
        assert_eq!(base.offset_by(2).to_addr(), "2001:db8::1:0:1".parse::<Ipv6Addr>().unwrap());

        let base = Hextets::expand("2001:db8::".parse().unwrap());
        assert_eq!(base.offset_by(0x1_0001).to_addr(), "2001:db8::1:1".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn test_hextet_expansion() {
        let hextets = Hextets::expand("2001:db8::1".parse().unwrap());
        assert_eq!(hextets, Hextets([0x2001, 0x0db8, 0, 0, 0, 0, 0, 1]));
        assert_eq!(hextets.to_addr().to_string(), "2001:db8::1");
    }

    #[test]
    fn test_ipv4_full_enumeration() {
        let addresses = plan("192.168.10.0/24", None).to_strings();
        assert_eq!(addresses.len(), 254);
        assert_eq!(addresses.first().unwrap(), "192.168.10.1");
        assert_eq!(addresses.last().unwrap(), "192.168.10.254");
    }

    #[test]
    fn test_ipv4_gateway_excluded() {
        let addresses = plan("192.168.10.0/24", Some("192.168.10.1")).to_strings();
        assert_eq!(addresses.len(), 253);
        assert_eq!(addresses.first().unwrap(), "192.168.10.2");
        assert!(!addresses.contains(&"192.168.10.1".to_string()));

        // Gateway outside the usable range excludes nothing
        let addresses = plan("192.168.10.0/24", Some("192.168.10.255")).to_strings();
        assert_eq!(addresses.len(), 254);
    }

    #[test]
    fn test_ipv4_counts_across_band() {
        for prefix in 16..=30u32 {
            let cidr = format!("10.20.0.0/{prefix}");
            let expected = (1usize << (32 - prefix)) - 2;
            assert_eq!(plan(&cidr, None).iter().count(), expected, "{cidr}");
            assert_eq!(plan(&cidr, Some("10.20.0.1")).iter().count(), expected - 1, "{cidr}");
        }
    }

    #[test]
    fn test_ipv4_band_edges() {
        let policy = GenerationPolicy::default();
        for (cidr, ok) in [
            ("10.0.0.0/15", false),
            ("10.0.0.0/16", true),
            ("10.0.0.0/30", true),
            ("10.0.0.0/31", false),
        ] {
            let block = CidrBlock::parse(cidr).unwrap();
            assert_eq!(AddressPlan::build(&block, None, &policy).is_ok(), ok, "{cidr}");
        }
    }

    #[test]
    fn test_ipv6_small_range() {
        let addresses = plan("2001:db8::/120", None).to_strings();
        assert_eq!(addresses.len(), 255);
        assert_eq!(addresses.first().unwrap(), "2001:db8::1");
        assert_eq!(addresses.last().unwrap(), "2001:db8::ff");

        let with_gateway = plan("2001:db8::/120", Some("2001:db8::1")).to_strings();
        assert_eq!(with_gateway.len(), 254);
        assert_eq!(with_gateway.first().unwrap(), "2001:db8::2");
    }

    #[test]
    fn test_ipv6_small_range_capped() {
        // 2^16 hosts, capped at 10,000
        let addresses = plan("2001:db8::/112", None).to_strings();
        assert_eq!(addresses.len(), 10_000);
        assert_eq!(addresses.last().unwrap(), "2001:db8::2710");
    }

    #[test]
    fn test_ipv6_large_range_subset() {
        let addresses = plan("2001:db8::/64", None).to_strings();
        assert_eq!(addresses.len(), 1_000);
        assert_eq!(addresses.first().unwrap(), "2001:db8::1");
        assert_eq!(addresses.last().unwrap(), "2001:db8::3e8");

        let addresses = plan("2001:db8::/48", Some("2001:db8::1")).to_strings();
        assert_eq!(addresses.len(), 1_000);
        assert_eq!(addresses.first().unwrap(), "2001:db8::2");
        assert_eq!(addresses.last().unwrap(), "2001:db8::3e9");
    }

    #[test]
    fn test_ipv6_gateway_inside_subset_skipped() {
        let addresses = plan("2001:db8::/64", Some("2001:db8::10")).to_strings();
        assert_eq!(addresses.len(), 999);
        assert!(!addresses.contains(&"2001:db8::10".to_string()));
    }

    #[test]
    fn test_ipv6_band_edges() {
        let policy = GenerationPolicy::default();
        for (cidr, ok) in [
            ("2001:db8::/47", false),
            ("2001:db8::/48", true),
            ("2001:db8::/120", true),
            ("2001:db8::/121", false),
        ] {
            let block = CidrBlock::parse(cidr).unwrap();
            let result = AddressPlan::build(&block, None, &policy);
            assert_eq!(result.is_ok(), ok, "{cidr}");
            if !ok {
                assert!(matches!(result.unwrap_err(), IpamError::PrefixOutOfRange { .. }));
            }
        }
    }

    #[test]
    fn test_no_duplicates() {
        let addresses = plan("2001:db8::/100", None).to_strings();
        let unique: std::collections::HashSet<_> = addresses.iter().collect();
        assert_eq!(unique.len(), addresses.len());
    }
}
