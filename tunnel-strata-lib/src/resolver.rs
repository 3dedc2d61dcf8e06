//! Tunnel endpoint resolution
//!
//! Turns a (zone, local host, remote host) triple into the outer addressing of
//! an encapsulated frame. IP addresses come from the zone memberships; MAC
//! addresses belong to the physical interface and are passed through as given.

use std::fmt::{self, Display, Formatter};
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::TunnelError;
use crate::packet::ether::EthAddr;
use crate::zone::{HostId, TunnelZone, ZoneId, ZoneStore};

const ZERO_MAC: EthAddr = EthAddr::new([0; 6]);

/// Link-layer addresses supplied by the physical interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkAddressing {
    pub src_mac: EthAddr,
    pub dst_mac: EthAddr,
}

impl LinkAddressing {
    pub fn new(src_mac: EthAddr, dst_mac: EthAddr) -> Self {
        LinkAddressing { src_mac, dst_mac }
    }

    pub fn reversed(&self) -> Self {
        LinkAddressing::new(self.dst_mac, self.src_mac)
    }
}

/// Outer addressing of a tunneled frame, as resolved or as observed on receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Addressing {
    pub src_mac: EthAddr,
    pub dst_mac: EthAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
}

impl Addressing {
    /// IP-only addressing; MACs are all-zero until [`with_link`](Self::with_link)
    pub fn new(src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Self {
        Addressing {
            src_mac: ZERO_MAC,
            dst_mac: ZERO_MAC,
            src_ip,
            dst_ip,
        }
    }

    pub fn with_link(mut self, link: LinkAddressing) -> Self {
        self.src_mac = link.src_mac;
        self.dst_mac = link.dst_mac;
        self
    }

    #[inline]
    pub fn link(&self) -> LinkAddressing {
        LinkAddressing::new(self.src_mac, self.dst_mac)
    }

    /// The addressing of a reply: sources and destinations swapped
    pub fn reversed(&self) -> Self {
        Addressing {
            src_mac: self.dst_mac,
            dst_mac: self.src_mac,
            src_ip: self.dst_ip,
            dst_ip: self.src_ip,
        }
    }
}

impl Display for Addressing {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) -> {} ({})",
            self.src_ip, self.src_mac, self.dst_ip, self.dst_mac
        )
    }
}

/// Resolves tunnel endpoints against a [`ZoneStore`].
///
/// Every call reads the store afresh; nothing is cached.
///
/// # Examples
///
/// ```
/// use tunnel_strata::resolver::{EndpointResolver, LinkAddressing};
/// use tunnel_strata::zone::memory::MemoryZoneStore;
/// use tunnel_strata::zone::{EncapsulationKind, HostId, TunnelZoneMembership, ZoneStore};
/// use tunnel_strata::packet::ether::EthAddr;
/// use std::net::Ipv4Addr;
///
/// let store = MemoryZoneStore::new();
/// let zone = store.create_zone("z", EncapsulationKind::Gre).unwrap();
/// let (a, b) = (HostId::random(), HostId::random());
/// store.add_membership(zone, TunnelZoneMembership::new(a, Ipv4Addr::new(10, 0, 0, 1))).unwrap();
///
/// let resolver = EndpointResolver::new(&store);
/// let link = LinkAddressing::new(EthAddr::BROADCAST, EthAddr::BROADCAST);
/// assert!(resolver.resolve(zone, a, b, link).is_err());
///
/// store.add_membership(zone, TunnelZoneMembership::new(b, Ipv4Addr::new(10, 0, 0, 2))).unwrap();
/// let addressing = resolver.resolve(zone, a, b, link).unwrap();
/// assert_eq!(addressing.dst_ip, Ipv4Addr::new(10, 0, 0, 2));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EndpointResolver<S> {
    store: S,
}

impl<S: ZoneStore> EndpointResolver<S> {
    pub fn new(store: S) -> Self {
        EndpointResolver { store }
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The zone record, or `ZoneMissing`
    pub fn zone(&self, zone: ZoneId) -> Result<TunnelZone, TunnelError> {
        self.store
            .get_zone(zone)?
            .ok_or(TunnelError::ZoneMissing(zone))
    }

    /// Endpoint address of `host` in `zone`, or `MembershipMissing`
    pub fn endpoint(&self, zone: ZoneId, host: HostId) -> Result<Ipv4Addr, TunnelError> {
        self.store
            .get_membership(zone, host)?
            .map(|member| member.endpoint)
            .ok_or(TunnelError::MembershipMissing { zone, host })
    }

    /// Addressing for a frame from `local` to `remote`.
    ///
    /// When both hosts are missing the local one is reported.
    pub fn resolve(
        &self,
        zone: ZoneId,
        local: HostId,
        remote: HostId,
        link: LinkAddressing,
    ) -> Result<Addressing, TunnelError> {
        self.zone(zone)?;
        let src_ip = self.endpoint(zone, local)?;
        let dst_ip = self.endpoint(zone, remote)?;

        tracing::trace!(%zone, %local, %remote, %src_ip, %dst_ip, "endpoints resolved");
        Ok(Addressing::new(src_ip, dst_ip).with_link(link))
    }
}
