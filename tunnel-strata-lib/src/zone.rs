//! Tunnel zones and host memberships
//!
//! A zone groups hosts that exchange overlay traffic with one encapsulation
//! kind. Each membership records the IPv4 address that terminates tunnels for
//! a host in that zone. Records live in a [`ZoneStore`]; the tunneling core
//! only reads them, once per call, and never caches them.
//!
//! # Examples
//!
//! ```
//! use tunnel_strata::zone::memory::MemoryZoneStore;
//! use tunnel_strata::zone::{EncapsulationKind, HostId, TunnelZoneMembership, ZoneStore};
//! use std::net::Ipv4Addr;
//!
//! let store = MemoryZoneStore::new();
//! let zone = store.create_zone("CapwapZone", EncapsulationKind::Capwap).unwrap();
//!
//! let host = HostId::random();
//! store
//!     .add_membership(zone, TunnelZoneMembership::new(host, Ipv4Addr::new(10, 245, 215, 2)))
//!     .unwrap();
//!
//! let member = store.get_membership(zone, host).unwrap().unwrap();
//! assert_eq!(member.endpoint, Ipv4Addr::new(10, 245, 215, 2));
//! ```

pub mod memory;

use std::fmt::{self, Display, Formatter};
use std::net::Ipv4Addr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumIter, EnumString};
use thiserror::Error;
use uuid::Uuid;

use crate::packet::protocol::IpProto;

macro_rules! uuid_id {
    ($(#[$outer:meta])* $name:ident) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Fresh random (v4) identifier
            pub fn random() -> Self {
                $name(Uuid::new_v4())
            }

            #[inline]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl From<Uuid> for $name {
            #[inline]
            fn from(id: Uuid) -> Self {
                $name(id)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map($name)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a tunnel zone
    ZoneId
);

uuid_id!(
    /// Identifier of a physical host
    HostId
);

/// Carrier protocol shared by every member of a zone
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    StrumDisplay,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EncapsulationKind {
    Gre,
    Capwap,
}

impl EncapsulationKind {
    /// IP protocol of the outer IPv4 header
    pub fn ip_proto(&self) -> IpProto {
        match self {
            EncapsulationKind::Gre => IpProto::GRE,
            EncapsulationKind::Capwap => IpProto::UDP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelZone {
    pub id: ZoneId,
    /// Label only, not unique
    pub name: String,
    pub kind: EncapsulationKind,
}

/// A host's participation in a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TunnelZoneMembership {
    pub host_id: HostId,
    /// Address terminating tunnels for this host in this zone
    pub endpoint: Ipv4Addr,
}

impl TunnelZoneMembership {
    pub fn new(host_id: HostId, endpoint: Ipv4Addr) -> Self {
        TunnelZoneMembership { host_id, endpoint }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("tunnel zone {0} not found")]
    ZoneNotFound(ZoneId),
    #[error("zone store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence of zones and memberships.
///
/// Reads of an unknown zone return `None` (or an empty list); writes to an
/// unknown zone fail with [`StoreError::ZoneNotFound`]. At most one membership
/// exists per (zone, host): adding another one replaces its endpoint.
pub trait ZoneStore: Send + Sync {
    fn create_zone(&self, name: &str, kind: EncapsulationKind) -> Result<ZoneId, StoreError>;

    /// Removes the zone together with all of its memberships
    fn delete_zone(&self, zone: ZoneId) -> Result<(), StoreError>;

    fn get_zone(&self, zone: ZoneId) -> Result<Option<TunnelZone>, StoreError>;

    fn list_zones(&self) -> Result<Vec<TunnelZone>, StoreError>;

    /// Inserts or updates the membership of `membership.host_id`
    fn add_membership(
        &self,
        zone: ZoneId,
        membership: TunnelZoneMembership,
    ) -> Result<(), StoreError>;

    /// Returns the removed membership, if there was one
    fn remove_membership(
        &self,
        zone: ZoneId,
        host: HostId,
    ) -> Result<Option<TunnelZoneMembership>, StoreError>;

    fn get_membership(
        &self,
        zone: ZoneId,
        host: HostId,
    ) -> Result<Option<TunnelZoneMembership>, StoreError>;

    fn list_memberships(&self, zone: ZoneId) -> Result<Vec<TunnelZoneMembership>, StoreError>;
}

impl<S: ZoneStore + ?Sized> ZoneStore for Arc<S> {
    fn create_zone(&self, name: &str, kind: EncapsulationKind) -> Result<ZoneId, StoreError> {
        (**self).create_zone(name, kind)
    }

    fn delete_zone(&self, zone: ZoneId) -> Result<(), StoreError> {
        (**self).delete_zone(zone)
    }

    fn get_zone(&self, zone: ZoneId) -> Result<Option<TunnelZone>, StoreError> {
        (**self).get_zone(zone)
    }

    fn list_zones(&self) -> Result<Vec<TunnelZone>, StoreError> {
        (**self).list_zones()
    }

    fn add_membership(
        &self,
        zone: ZoneId,
        membership: TunnelZoneMembership,
    ) -> Result<(), StoreError> {
        (**self).add_membership(zone, membership)
    }

    fn remove_membership(
        &self,
        zone: ZoneId,
        host: HostId,
    ) -> Result<Option<TunnelZoneMembership>, StoreError> {
        (**self).remove_membership(zone, host)
    }

    fn get_membership(
        &self,
        zone: ZoneId,
        host: HostId,
    ) -> Result<Option<TunnelZoneMembership>, StoreError> {
        (**self).get_membership(zone, host)
    }

    fn list_memberships(&self, zone: ZoneId) -> Result<Vec<TunnelZoneMembership>, StoreError> {
        (**self).list_memberships(zone)
    }
}

impl<S: ZoneStore + ?Sized> ZoneStore for &S {
    fn create_zone(&self, name: &str, kind: EncapsulationKind) -> Result<ZoneId, StoreError> {
        (**self).create_zone(name, kind)
    }

    fn delete_zone(&self, zone: ZoneId) -> Result<(), StoreError> {
        (**self).delete_zone(zone)
    }

    fn get_zone(&self, zone: ZoneId) -> Result<Option<TunnelZone>, StoreError> {
        (**self).get_zone(zone)
    }

    fn list_zones(&self) -> Result<Vec<TunnelZone>, StoreError> {
        (**self).list_zones()
    }

    fn add_membership(
        &self,
        zone: ZoneId,
        membership: TunnelZoneMembership,
    ) -> Result<(), StoreError> {
        (**self).add_membership(zone, membership)
    }

    fn remove_membership(
        &self,
        zone: ZoneId,
        host: HostId,
    ) -> Result<Option<TunnelZoneMembership>, StoreError> {
        (**self).remove_membership(zone, host)
    }

    fn get_membership(
        &self,
        zone: ZoneId,
        host: HostId,
    ) -> Result<Option<TunnelZoneMembership>, StoreError> {
        (**self).get_membership(zone, host)
    }

    fn list_memberships(&self, zone: ZoneId) -> Result<Vec<TunnelZoneMembership>, StoreError> {
        (**self).list_memberships(zone)
    }
}
