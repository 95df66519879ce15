//! Redundant address detection by IP equivalence.
//!
//! Two address objects are redundant when their values normalize to the same
//! [`IpKey`]:
//!
//! - `ip-netmask` values become canonical CIDR: a bare IPv4 address gets `/32`,
//!   a bare IPv6 address `/128`, and host bits are masked off;
//! - `ip-range` values become `start-end` with both ends canonicalized;
//! - `fqdn` values have no key and never match anything.
//!
//! Classes are computed over every address in the store, whatever its scope.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::Serialize;

use crate::model::{AddressObject, AddressValue, ObjectKey};
use crate::resolver::{ReferenceEdge, Resolver};
use crate::store::EntityStore;

/// Normalized identity of an IP value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct IpKey(String);

impl IpKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for IpKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical CIDR for an address or `address/prefix` string.
pub fn normalize_ip(value: &str) -> Option<IpKey> {
    let value = value.trim();
    let (address, prefix) = match value.split_once('/') {
        Some((address, prefix)) => (address, Some(prefix.trim().parse::<u8>().ok()?)),
        None => (value, None),
    };
    match address.trim().parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => {
            let len = prefix.unwrap_or(32);
            if len > 32 {
                return None;
            }
            let mask = u32::MAX.checked_shl(32 - u32::from(len)).unwrap_or(0);
            let network = Ipv4Addr::from(u32::from(v4) & mask);
            Some(IpKey(format!("{network}/{len}")))
        }
        IpAddr::V6(v6) => {
            let len = prefix.unwrap_or(128);
            if len > 128 {
                return None;
            }
            let mask = u128::MAX.checked_shl(128 - u32::from(len)).unwrap_or(0);
            let network = Ipv6Addr::from(u128::from(v6) & mask);
            Some(IpKey(format!("{network}/{len}")))
        }
    }
}

/// Canonical `start-end` form of an IP range; both ends must share a family.
pub fn normalize_range(value: &str) -> Option<IpKey> {
    let (start, end) = value.trim().split_once('-')?;
    let start: IpAddr = start.trim().parse().ok()?;
    let end: IpAddr = end.trim().parse().ok()?;
    if start.is_ipv4() != end.is_ipv4() || start > end {
        return None;
    }
    Some(IpKey(format!("{start}-{end}")))
}

pub fn normalize_value(value: &AddressValue) -> Option<IpKey> {
    match value {
        AddressValue::IpNetmask(text) => normalize_ip(text),
        AddressValue::IpRange(text) => normalize_range(text),
        AddressValue::Fqdn(_) => None,
    }
}

/// Addresses sharing one normalized value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedundancyClass {
    pub key: IpKey,
    pub members: Vec<ObjectKey>,
}

impl RedundancyClass {
    /// Number of distinct object names in the class.
    pub fn distinct_names(&self) -> usize {
        self.members
            .iter()
            .map(|member| member.name.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Where a redundant peer is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerUsage {
    pub peer: ObjectKey,
    pub value: Option<AddressValue>,
    pub direct: Vec<ReferenceEdge>,
    pub indirect: Vec<ReferenceEdge>,
    pub memberships: Vec<ReferenceEdge>,
    /// Definition scope plus the scopes of every rule and group using the peer.
    pub device_groups: BTreeSet<String>,
}

impl PeerUsage {
    pub fn is_unused(&self) -> bool {
        self.direct.is_empty() && self.indirect.is_empty() && self.memberships.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RedundancyDetector<'s> {
    store: &'s EntityStore,
    resolver: Resolver<'s>,
}

impl<'s> RedundancyDetector<'s> {
    pub fn new(store: &'s EntityStore) -> Self {
        Self {
            store,
            resolver: Resolver::new(store),
        }
    }

    /// Every class with at least two members, in key order.
    pub fn classes(&self) -> Vec<RedundancyClass> {
        self.store
            .ip_classes()
            .filter(|(_, members)| members.len() > 1)
            .map(|(key, members)| RedundancyClass {
                key: key.clone(),
                members: members.to_vec(),
            })
            .collect()
    }

    /// Addresses equivalent to any definition of `target`, excluding objects
    /// named `target` themselves. Sorted by scope, then name.
    pub fn find_redundant(&self, target: &str) -> Vec<&'s AddressObject> {
        let keys: BTreeSet<IpKey> = self
            .store
            .addresses_named(target)
            .iter()
            .filter_map(|object| object.value.as_ref().and_then(normalize_value))
            .collect();
        let peers: BTreeSet<&ObjectKey> = keys
            .iter()
            .flat_map(|key| self.store.by_ip_key(key))
            .filter(|peer| peer.name != target)
            .collect();
        peers
            .into_iter()
            .filter_map(|key| self.store.address_by_key(key))
            .collect()
    }

    /// Usage footprint of one peer: only rules and groups whose use of the
    /// name resolves to this definition.
    pub fn usage(&self, peer: &AddressObject) -> PeerUsage {
        let key = peer.key();
        let direct = self.resolver.direct_to(&key);
        let indirect = self.resolver.indirect_to(&key);
        let memberships = self.resolver.memberships_of(&key);

        let device_groups = std::iter::once(&peer.scope)
            .chain(direct.iter().map(|edge| &edge.scope))
            .chain(indirect.iter().map(|edge| &edge.scope))
            .chain(memberships.iter().map(|edge| &edge.scope))
            .filter_map(|scope| scope.device_group_name())
            .map(str::to_string)
            .collect();

        PeerUsage {
            peer: peer.key(),
            value: peer.value.clone(),
            direct,
            indirect,
            memberships,
            device_groups,
        }
    }
}
