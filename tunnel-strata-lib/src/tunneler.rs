//! Encapsulation and decapsulation pipelines
//!
//! [`Tunneler`] puts the pieces together: it resolves endpoints from the zone
//! store, frames the serialized inner frame with the codec of the zone's
//! [`EncapsulationKind`] and builds the outer Ethernet/IPv4 (and UDP, for
//! CAPWAP) headers around it. Decapsulation runs the same steps backwards and
//! reports the outer addressing it observed.
//!
//! Each call is a single synchronous pipeline: it returns a whole frame or one
//! [`TunnelError`], never a partial result.
//!
//! # Examples
//!
//! ```
//! use tunnel_strata::packet::ether::{EthAddr, EthernetLayer};
//! use tunnel_strata::packet::frame::LayeredFrame;
//! use tunnel_strata::packet::protocol::EtherProto;
//! use tunnel_strata::resolver::LinkAddressing;
//! use tunnel_strata::tunneler::Tunneler;
//! use tunnel_strata::zone::memory::MemoryZoneStore;
//! use tunnel_strata::zone::{EncapsulationKind, HostId, TunnelZoneMembership, ZoneStore};
//! use std::net::Ipv4Addr;
//!
//! let store = MemoryZoneStore::new();
//! let zone = store.create_zone("GreZone", EncapsulationKind::Gre).unwrap();
//! let (a, b) = (HostId::random(), HostId::random());
//! store.add_membership(zone, TunnelZoneMembership::new(a, Ipv4Addr::new(10, 0, 0, 1))).unwrap();
//! store.add_membership(zone, TunnelZoneMembership::new(b, Ipv4Addr::new(10, 0, 0, 2))).unwrap();
//!
//! let tunneler = Tunneler::new(&store);
//! let inner = LayeredFrame::new()
//!     .push(EthernetLayer::new(EthAddr::BROADCAST, EthAddr::BROADCAST).with_ethertype(EtherProto::ARP))
//!     .with_payload(b"opaque".to_vec());
//!
//! let link = LinkAddressing::new(EthAddr::BROADCAST, EthAddr::BROADCAST);
//! let bytes = tunneler.encapsulate(zone, a, b, link, &inner).unwrap();
//!
//! let received = tunneler.decapsulate(zone, &bytes).unwrap();
//! assert_eq!(received.inner, inner);
//! assert_eq!(received.observed.src_ip, Ipv4Addr::new(10, 0, 0, 1));
//! ```

use crate::config::{ConfigError, TunnelConfig};
use crate::error::TunnelError;
use crate::packet::ether::{EtherHeader, EthernetLayer};
use crate::packet::frame::{FrameDecoder, LayerKind, LayeredFrame};
use crate::packet::ipv4::Ipv4Layer;
use crate::packet::protocol::EtherProto;
use crate::packet::tunnel::capwap::CapwapCodec;
use crate::packet::tunnel::gre::GreCodec;
use crate::packet::tunnel::TunnelCodec;
use crate::packet::udp::UdpLayer;
use crate::packet::HeaderParser;
use crate::resolver::{Addressing, EndpointResolver, LinkAddressing};
use crate::zone::{EncapsulationKind, HostId, ZoneId, ZoneStore};

/// A decapsulated frame and the outer addressing it arrived with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decapsulated {
    pub inner: LayeredFrame,
    pub observed: Addressing,
}

pub struct Tunneler<S> {
    resolver: EndpointResolver<S>,
    config: TunnelConfig,
    gre: GreCodec,
    capwap: CapwapCodec,
}

impl<S: ZoneStore> Tunneler<S> {
    /// Tunneler with the default configuration
    pub fn new(store: S) -> Self {
        Self::build(store, TunnelConfig::default())
    }

    pub fn with_config(store: S, config: TunnelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(store, config))
    }

    fn build(store: S, config: TunnelConfig) -> Self {
        Tunneler {
            resolver: EndpointResolver::new(store),
            gre: GreCodec::from(&config.gre),
            capwap: CapwapCodec::from(&config.capwap),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    #[inline]
    pub fn resolver(&self) -> &EndpointResolver<S> {
        &self.resolver
    }

    /// The codec used for `kind`
    pub fn codec(&self, kind: EncapsulationKind) -> &dyn TunnelCodec {
        match kind {
            EncapsulationKind::Gre => &self.gre,
            EncapsulationKind::Capwap => &self.capwap,
        }
    }

    fn decoder(&self) -> FrameDecoder {
        FrameDecoder::with_capwap_ports(self.config.capwap.src_port, self.config.capwap.dst_port)
    }

    /// Physical frame carrying `inner` from `local` to `remote` in `zone`
    pub fn encapsulate(
        &self,
        zone: ZoneId,
        local: HostId,
        remote: HostId,
        link: LinkAddressing,
        inner: &LayeredFrame,
    ) -> Result<Vec<u8>, TunnelError> {
        let kind = self.resolver.zone(zone)?.kind;
        let addressing = self.resolver.resolve(zone, local, remote, link)?;
        self.encapsulate_with(kind, &addressing, inner)
    }

    /// Encapsulates with already resolved addressing.
    ///
    /// Both codecs carry Ethernet frames, so `inner` must start with an
    /// Ethernet layer.
    pub fn encapsulate_with(
        &self,
        kind: EncapsulationKind,
        addressing: &Addressing,
        inner: &LayeredFrame,
    ) -> Result<Vec<u8>, TunnelError> {
        if inner.top() != Some(LayerKind::Ethernet) {
            return Err(TunnelError::UnsupportedVariant("inner frame without Ethernet header"));
        }
        let inner_bytes = inner.serialize()?;
        let framed = self.codec(kind).wrap(&inner_bytes, addressing);

        let outer = LayeredFrame::new()
            .push(EthernetLayer::new(addressing.src_mac, addressing.dst_mac))
            .push(
                Ipv4Layer::new(addressing.src_ip, addressing.dst_ip, kind.ip_proto())
                    .with_ttl(self.config.ttl),
            );
        let outer = match kind {
            EncapsulationKind::Gre => outer,
            EncapsulationKind::Capwap => {
                let udp = UdpLayer::new(self.config.capwap.src_port, self.config.capwap.dst_port);
                outer.push(if self.config.capwap.udp_checksum {
                    udp
                } else {
                    udp.without_checksum()
                })
            }
        };

        let bytes = outer.with_payload(framed).serialize()?;
        tracing::debug!(%kind, %addressing, inner_len = inner_bytes.len(), len = bytes.len(), "encapsulated");
        Ok(bytes)
    }

    /// Inner frame of `bytes`, which must use the encapsulation of `zone`
    pub fn decapsulate(&self, zone: ZoneId, bytes: &[u8]) -> Result<Decapsulated, TunnelError> {
        let kind = self.resolver.zone(zone)?.kind;
        self.decapsulate_as(kind, bytes).inspect_err(|err| {
            tracing::warn!(%zone, %kind, error = %err, "frame rejected");
        })
    }

    /// Inner frame of `bytes` carried with encapsulation `kind`
    pub fn decapsulate_as(
        &self,
        kind: EncapsulationKind,
        bytes: &[u8],
    ) -> Result<Decapsulated, TunnelError> {
        let (eth, rest) = EtherHeader::from_bytes(bytes)?;
        if eth.protocol() != EtherProto::IPV4 {
            return Err(TunnelError::UnexpectedEtherType(eth.protocol()));
        }

        let (ip, rest) = Ipv4Layer::decode(rest)?;
        if ip.protocol != kind.ip_proto() {
            return Err(TunnelError::UnexpectedProtocol(ip.protocol));
        }
        if ip.is_fragment() {
            return Err(TunnelError::UnsupportedVariant("fragmented IPv4 carrier"));
        }

        let carried = match kind {
            EncapsulationKind::Gre => rest,
            EncapsulationKind::Capwap => {
                let (udp, payload) = UdpLayer::decode(rest, Some((ip.src, ip.dst)))?;
                let ports = [self.config.capwap.src_port, self.config.capwap.dst_port];
                if !ports.contains(&udp.dst_port) {
                    return Err(TunnelError::UnexpectedPort {
                        src: udp.src_port,
                        dst: udp.dst_port,
                    });
                }
                payload
            }
        };

        let inner_bytes = self.codec(kind).unwrap(carried)?;
        let inner = self.decoder().decode(inner_bytes, LayerKind::Ethernet)?;

        let observed = Addressing {
            src_mac: eth.source(),
            dst_mac: eth.dest(),
            src_ip: ip.src,
            dst_ip: ip.dst,
        };
        tracing::debug!(%kind, %observed, %inner, "decapsulated");
        Ok(Decapsulated { inner, observed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::ether::EthAddr;
    use crate::packet::frame::CAPWAP_CAPTURE;
    use crate::packet::protocol::IpProto;
    use crate::packet::tunnel::capwap::CAPWAP_DST_PORT;
    use crate::packet::tunnel::gre::GreLayer;
    use crate::packet::PacketHeaderError;
    use crate::zone::memory::MemoryZoneStore;
    use crate::zone::TunnelZoneMembership;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    const ENDPOINT_A: Ipv4Addr = Ipv4Addr::new(10, 245, 215, 2);
    const ENDPOINT_B: Ipv4Addr = Ipv4Addr::new(10, 245, 215, 1);

    fn mac(s: &str) -> EthAddr {
        s.parse().unwrap()
    }

    fn link() -> LinkAddressing {
        LinkAddressing::new(mac("aa:aa:aa:cc:cc:cc"), mac("bb:bb:bb:dd:dd:dd"))
    }

    struct Setup {
        store: MemoryZoneStore,
        zone: ZoneId,
        a: HostId,
        b: HostId,
    }

    fn setup(kind: EncapsulationKind) -> Setup {
        let store = MemoryZoneStore::new();
        let zone = store.create_zone("Z", kind).unwrap();
        let (a, b) = (HostId::random(), HostId::random());
        store.add_membership(zone, TunnelZoneMembership::new(a, ENDPOINT_A)).unwrap();
        store.add_membership(zone, TunnelZoneMembership::new(b, ENDPOINT_B)).unwrap();
        Setup { store, zone, a, b }
    }

    fn inner_frame(source: &str, dest: &str) -> LayeredFrame {
        LayeredFrame::new()
            .push(EthernetLayer::new(mac(source), mac(dest)))
            .push(Ipv4Layer::new(
                Ipv4Addr::new(192, 168, 231, 2),
                Ipv4Addr::new(192, 168, 231, 1),
                IpProto::UDP,
            ))
            .push(UdpLayer::new(0x2694, 0x0929))
            .with_payload(b"The Payload".to_vec())
    }

    #[test]
    fn test_capwap_pipeline() {
        let s = setup(EncapsulationKind::Capwap);
        let tunneler = Tunneler::new(&s.store);
        let frame = inner_frame("22:22:22:11:11:11", "33:33:33:44:44:44");

        let bytes = tunneler.encapsulate(s.zone, s.a, s.b, link(), &frame).unwrap();
        let received = tunneler.decapsulate(s.zone, &bytes).unwrap();

        assert_eq!(received.inner, frame);
        assert_eq!(received.observed.src_ip, ENDPOINT_A);
        assert_eq!(received.observed.dst_ip, ENDPOINT_B);
        assert_eq!(received.observed.link(), link());
    }

    #[test]
    fn test_capwap_matches_capture() {
        let s = setup(EncapsulationKind::Capwap);
        let mut config = TunnelConfig::default();
        config.capwap.key = Some(1);
        let tunneler = Tunneler::with_config(&s.store, config).unwrap();

        // the capture's inner frame goes from 33:.. to 22:..
        let frame = inner_frame("33:33:33:44:44:44", "22:22:22:11:11:11");
        let bytes = tunneler.encapsulate(s.zone, s.a, s.b, link(), &frame).unwrap();

        assert_eq!(bytes.len(), CAPWAP_CAPTURE.len());
        // only the IPv4 identification (and so the header checksum) differ
        assert_eq!(bytes[..18], CAPWAP_CAPTURE[..18]);
        assert_eq!(bytes[22..24], CAPWAP_CAPTURE[22..24]);
        assert_eq!(bytes[26..], CAPWAP_CAPTURE[26..]);
    }

    #[test]
    fn test_decapsulate_capture() {
        let s = setup(EncapsulationKind::Capwap);
        let tunneler = Tunneler::new(&s.store);

        let received = tunneler.decapsulate(s.zone, &CAPWAP_CAPTURE).unwrap();
        assert_eq!(received.observed.src_ip, ENDPOINT_A);
        assert_eq!(received.observed.dst_ip, ENDPOINT_B);
        assert_eq!(received.observed.src_mac, mac("aa:aa:aa:cc:cc:cc"));
        assert_eq!(received.inner, inner_frame("33:33:33:44:44:44", "22:22:22:11:11:11"));
        assert_eq!(received.inner.serialize().unwrap(), CAPWAP_CAPTURE[62..]);
    }

    #[test]
    fn test_capwap_key_mismatch() {
        let s = setup(EncapsulationKind::Capwap);
        let mut config = TunnelConfig::default();
        config.capwap.key = Some(2);
        let tunneler = Tunneler::with_config(&s.store, config).unwrap();

        assert!(matches!(
            tunneler.decapsulate(s.zone, &CAPWAP_CAPTURE),
            Err(TunnelError::UnsupportedVariant("CAPWAP key"))
        ));
    }

    #[test]
    fn test_gre_pipeline() {
        let s = setup(EncapsulationKind::Gre);
        let mut config = TunnelConfig::default();
        config.gre.key = Some(0x1234);
        config.gre.checksum = true;
        let tunneler = Tunneler::with_config(&s.store, config).unwrap();
        let frame = inner_frame("22:22:22:11:11:11", "33:33:33:44:44:44");

        let bytes = tunneler.encapsulate(s.zone, s.a, s.b, link(), &frame).unwrap();
        assert_eq!(bytes[23], 47);

        let received = tunneler.decapsulate(s.zone, &bytes).unwrap();
        assert_eq!(received.inner, frame);
        assert_eq!(received.observed.src_ip, ENDPOINT_A);
        assert_eq!(received.observed.dst_ip, ENDPOINT_B);

        // the reply goes the other way
        let reply = tunneler
            .encapsulate(s.zone, s.b, s.a, link().reversed(), &frame)
            .unwrap();
        let received_reply = tunneler.decapsulate(s.zone, &reply).unwrap();
        assert_eq!(received_reply.observed, received.observed.reversed());
    }

    #[test]
    fn test_gre_frame_on_capwap_zone() {
        let gre = setup(EncapsulationKind::Gre);
        let frame = inner_frame("22:22:22:11:11:11", "33:33:33:44:44:44");
        let gre_bytes = Tunneler::new(&gre.store)
            .encapsulate(gre.zone, gre.a, gre.b, link(), &frame)
            .unwrap();

        let capwap = setup(EncapsulationKind::Capwap);
        let err = Tunneler::new(&capwap.store)
            .decapsulate(capwap.zone, &gre_bytes)
            .unwrap_err();
        assert!(matches!(err, TunnelError::UnexpectedProtocol(IpProto::GRE)));
        assert!(err.is_protocol_mismatch());
    }

    #[test]
    fn test_unexpected_ethertype() {
        let s = setup(EncapsulationKind::Capwap);
        let mut bytes = CAPWAP_CAPTURE.to_vec();
        bytes[12..14].copy_from_slice(&[0x86, 0xdd]);

        assert!(matches!(
            Tunneler::new(&s.store).decapsulate(s.zone, &bytes),
            Err(TunnelError::UnexpectedEtherType(EtherProto::IPV6))
        ));
    }

    fn udp_frame(dst_port: u16, payload: Vec<u8>) -> Vec<u8> {
        LayeredFrame::new()
            .push(EthernetLayer::new(mac("aa:aa:aa:cc:cc:cc"), mac("bb:bb:bb:dd:dd:dd")))
            .push(Ipv4Layer::new(ENDPOINT_A, ENDPOINT_B, IpProto::UDP))
            .push(UdpLayer::new(40000, dst_port))
            .with_payload(payload)
            .serialize()
            .unwrap()
    }

    #[test]
    fn test_unexpected_port() {
        let s = setup(EncapsulationKind::Capwap);
        let bytes = udp_frame(4789, CAPWAP_CAPTURE[42..].to_vec());

        assert!(matches!(
            Tunneler::new(&s.store).decapsulate(s.zone, &bytes),
            Err(TunnelError::UnexpectedPort { src: 40000, dst: 4789 })
        ));
    }

    #[test]
    fn test_truncated_capwap_header() {
        let s = setup(EncapsulationKind::Capwap);
        let bytes = udp_frame(CAPWAP_DST_PORT, vec![0x00, 0x28, 0x3c]);

        assert!(matches!(
            Tunneler::new(&s.store).decapsulate(s.zone, &bytes),
            Err(TunnelError::TruncatedHeader { available: 3, .. })
        ));
    }

    #[test]
    fn test_truncated_frame_is_malformed() {
        let s = setup(EncapsulationKind::Capwap);
        assert!(matches!(
            Tunneler::new(&s.store).decapsulate(s.zone, &CAPWAP_CAPTURE[..100]),
            Err(TunnelError::MalformedFrame(PacketHeaderError::InsufficientLength(_)))
        ));
    }

    #[test]
    fn test_gre_wrong_protocol_type() {
        let s = setup(EncapsulationKind::Gre);
        let bytes = LayeredFrame::new()
            .push(EthernetLayer::new(mac("aa:aa:aa:cc:cc:cc"), mac("bb:bb:bb:dd:dd:dd")))
            .push(Ipv4Layer::new(ENDPOINT_A, ENDPOINT_B, IpProto::GRE))
            .push(GreLayer::new(EtherProto::IPV4))
            .push(Ipv4Layer::new(
                Ipv4Addr::new(192, 168, 0, 1),
                Ipv4Addr::new(192, 168, 0, 2),
                IpProto::UDP,
            ))
            .push(UdpLayer::new(1, 2))
            .serialize()
            .unwrap();

        assert!(matches!(
            Tunneler::new(&s.store).decapsulate(s.zone, &bytes),
            Err(TunnelError::UnsupportedVariant("GRE protocol type"))
        ));
    }

    #[test]
    fn test_inner_frame_must_be_ethernet() {
        use strum::IntoEnumIterator;

        let ip_only = LayeredFrame::new()
            .push(Ipv4Layer::new(
                Ipv4Addr::new(192, 168, 231, 2),
                Ipv4Addr::new(192, 168, 231, 1),
                IpProto::UDP,
            ))
            .push(UdpLayer::new(0x2694, 0x0929))
            .with_payload(b"The Payload".to_vec());
        let payload_only = LayeredFrame::new().with_payload(b"The Payload".to_vec());

        for kind in EncapsulationKind::iter() {
            let s = setup(kind);
            let tunneler = Tunneler::new(&s.store);
            for frame in [&ip_only, &payload_only] {
                assert!(matches!(
                    tunneler.encapsulate(s.zone, s.a, s.b, link(), frame),
                    Err(TunnelError::UnsupportedVariant("inner frame without Ethernet header"))
                ));
            }
        }
    }

    #[test]
    fn test_membership_and_zone_missing() {
        let s = setup(EncapsulationKind::Gre);
        let tunneler = Tunneler::new(&s.store);
        let frame = inner_frame("22:22:22:11:11:11", "33:33:33:44:44:44");
        let stranger = HostId::random();

        assert!(matches!(
            tunneler.encapsulate(s.zone, s.a, stranger, link(), &frame),
            Err(TunnelError::MembershipMissing { host, .. }) if host == stranger
        ));
        assert!(matches!(
            tunneler.encapsulate(ZoneId::random(), s.a, s.b, link(), &frame),
            Err(TunnelError::ZoneMissing(_))
        ));
        assert!(matches!(
            tunneler.decapsulate(ZoneId::random(), &CAPWAP_CAPTURE),
            Err(TunnelError::ZoneMissing(_))
        ));
    }

    #[test]
    fn test_invalid_config() {
        let s = setup(EncapsulationKind::Gre);
        let mut config = TunnelConfig::default();
        config.ttl = 0;
        assert!(Tunneler::with_config(&s.store, config).is_err());
    }

    #[test]
    fn test_concurrent_encapsulation() {
        let s = setup(EncapsulationKind::Capwap);
        let (zone, a, b) = (s.zone, s.a, s.b);
        let tunneler = Tunneler::new(Arc::new(s.store));
        let frame = inner_frame("22:22:22:11:11:11", "33:33:33:44:44:44");
        let expected = tunneler.encapsulate(zone, a, b, link(), &frame).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..32 {
                        let bytes = tunneler.encapsulate(zone, a, b, link(), &frame).unwrap();
                        assert_eq!(bytes, expected);
                        assert_eq!(tunneler.decapsulate(zone, &bytes).unwrap().inner, frame);
                    }
                });
            }
        });
    }
}
