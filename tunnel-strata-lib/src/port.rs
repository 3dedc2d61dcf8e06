//! Physical transport binding
//!
//! A [`PhysicalPort`] moves raw frames on a network interface; a
//! [`TunnelPort`] runs them through a [`Tunneler`] on the way out and in.
//! Blocking, timeouts and retries are up to the port implementation and its
//! caller: the tunneling core adds none.

use std::io;
use std::net::Ipv4Addr;

use crate::error::TunnelError;
use crate::packet::ether::EthAddr;
use crate::packet::frame::LayeredFrame;
use crate::resolver::LinkAddressing;
use crate::tunneler::{Decapsulated, Tunneler};
use crate::zone::{HostId, ZoneId, ZoneStore};

/// Raw frame I/O on a physical or virtual interface
pub trait PhysicalPort: Send + Sync {
    /// MAC address of the local interface
    fn local_mac(&self) -> EthAddr;

    /// MAC address of the next hop towards `ip`, if known
    fn peer_mac(&self, ip: Ipv4Addr) -> Option<EthAddr>;

    fn send(&self, frame: &[u8]) -> io::Result<()>;

    /// Next received frame; may block
    fn receive(&self) -> io::Result<Vec<u8>>;
}

pub struct TunnelPort<S, P> {
    tunneler: Tunneler<S>,
    port: P,
}

impl<S: ZoneStore, P: PhysicalPort> TunnelPort<S, P> {
    pub fn new(tunneler: Tunneler<S>, port: P) -> Self {
        TunnelPort { tunneler, port }
    }

    #[inline]
    pub fn tunneler(&self) -> &Tunneler<S> {
        &self.tunneler
    }

    #[inline]
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Encapsulates `frame` from `local` to `remote` and puts it on the wire
    pub fn send(
        &self,
        zone: ZoneId,
        local: HostId,
        remote: HostId,
        frame: &LayeredFrame,
    ) -> Result<(), TunnelError> {
        let resolver = self.tunneler.resolver();
        let kind = resolver.zone(zone)?.kind;
        let addressing = resolver.resolve(
            zone,
            local,
            remote,
            LinkAddressing::new(self.port.local_mac(), EthAddr::BROADCAST),
        )?;

        let dst_mac = self
            .port
            .peer_mac(addressing.dst_ip)
            .ok_or(TunnelError::PeerUnknown(addressing.dst_ip))?;
        let addressing = addressing.with_link(LinkAddressing::new(addressing.src_mac, dst_mac));

        let bytes = self.tunneler.encapsulate_with(kind, &addressing, frame)?;
        self.port.send(&bytes)?;
        Ok(())
    }

    /// Waits for the next frame and decapsulates it for `zone`
    pub fn receive(&self, zone: ZoneId) -> Result<Decapsulated, TunnelError> {
        let bytes = self.port.receive()?;
        self.tunneler.decapsulate(zone, &bytes)
    }
}
