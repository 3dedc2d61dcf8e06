//! In-process [`ZoneStore`]
//!
//! Zones and memberships are kept in insertion order, so listings are stable.

use std::net::Ipv4Addr;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use ahash::RandomState;
use hashlink::LinkedHashMap;

use super::{
    EncapsulationKind, HostId, StoreError, TunnelZone, TunnelZoneMembership, ZoneId, ZoneStore,
};

struct ZoneEntry {
    zone: TunnelZone,
    members: LinkedHashMap<HostId, Ipv4Addr, RandomState>,
}

type Zones = LinkedHashMap<ZoneId, ZoneEntry, RandomState>;

pub struct MemoryZoneStore {
    zones: RwLock<Zones>,
}

impl Default for MemoryZoneStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryZoneStore {
    pub fn new() -> Self {
        MemoryZoneStore {
            zones: RwLock::new(LinkedHashMap::with_hasher(RandomState::new())),
        }
    }

    /// Creates a zone with a caller-chosen id, replacing any zone with that id
    pub fn insert_zone(&self, zone: TunnelZone) -> Result<(), StoreError> {
        let id = zone.id;
        self.write()?.insert(
            id,
            ZoneEntry {
                zone,
                members: LinkedHashMap::with_hasher(RandomState::new()),
            },
        );
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Zones>, StoreError> {
        self.zones
            .read()
            .map_err(|_| StoreError::Unavailable("zone table lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Zones>, StoreError> {
        self.zones
            .write()
            .map_err(|_| StoreError::Unavailable("zone table lock poisoned".into()))
    }
}

impl ZoneStore for MemoryZoneStore {
    fn create_zone(&self, name: &str, kind: EncapsulationKind) -> Result<ZoneId, StoreError> {
        let id = ZoneId::random();
        self.insert_zone(TunnelZone {
            id,
            name: name.to_string(),
            kind,
        })?;
        tracing::debug!(zone = %id, name, %kind, "tunnel zone created");
        Ok(id)
    }

    fn delete_zone(&self, zone: ZoneId) -> Result<(), StoreError> {
        self.write()?
            .remove(&zone)
            .map(|_| ())
            .ok_or(StoreError::ZoneNotFound(zone))
    }

    fn get_zone(&self, zone: ZoneId) -> Result<Option<TunnelZone>, StoreError> {
        Ok(self.read()?.get(&zone).map(|entry| entry.zone.clone()))
    }

    fn list_zones(&self) -> Result<Vec<TunnelZone>, StoreError> {
        Ok(self.read()?.values().map(|entry| entry.zone.clone()).collect())
    }

    fn add_membership(
        &self,
        zone: ZoneId,
        membership: TunnelZoneMembership,
    ) -> Result<(), StoreError> {
        let mut zones = self.write()?;
        let entry = zones.get_mut(&zone).ok_or(StoreError::ZoneNotFound(zone))?;

        // replace keeps the original position
        match entry.members.get_mut(&membership.host_id) {
            Some(endpoint) => *endpoint = membership.endpoint,
            None => {
                entry.members.insert(membership.host_id, membership.endpoint);
            }
        }
        tracing::debug!(zone = %zone, host = %membership.host_id, endpoint = %membership.endpoint, "membership set");
        Ok(())
    }

    fn remove_membership(
        &self,
        zone: ZoneId,
        host: HostId,
    ) -> Result<Option<TunnelZoneMembership>, StoreError> {
        let mut zones = self.write()?;
        let entry = zones.get_mut(&zone).ok_or(StoreError::ZoneNotFound(zone))?;
        Ok(entry
            .members
            .remove(&host)
            .map(|endpoint| TunnelZoneMembership::new(host, endpoint)))
    }

    fn get_membership(
        &self,
        zone: ZoneId,
        host: HostId,
    ) -> Result<Option<TunnelZoneMembership>, StoreError> {
        Ok(self.read()?.get(&zone).and_then(|entry| {
            entry
                .members
                .get(&host)
                .map(|endpoint| TunnelZoneMembership::new(host, *endpoint))
        }))
    }

    fn list_memberships(&self, zone: ZoneId) -> Result<Vec<TunnelZoneMembership>, StoreError> {
        Ok(self
            .read()?
            .get(&zone)
            .map(|entry| {
                entry
                    .members
                    .iter()
                    .map(|(host, endpoint)| TunnelZoneMembership::new(*host, *endpoint))
                    .collect()
            })
            .unwrap_or_default())
    }
}
