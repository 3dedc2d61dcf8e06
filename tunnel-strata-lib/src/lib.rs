//! Overlay tunneling between the hosts of a tunnel zone
//!
//! A tunnel zone groups physical hosts that carry virtual-network traffic
//! between each other with one encapsulation protocol (GRE or CAPWAP). Each
//! member host terminates tunnels at an IPv4 endpoint recorded in the zone.
//!
//! The crate is organised leaf-first:
//!
//! - [`packet`]: zero-copy wire headers, the owned [`LayeredFrame`] model and
//!   the GRE/CAPWAP [`TunnelCodec`]s
//! - [`zone`]: zones, memberships and the [`ZoneStore`] persistence contract
//! - [`resolver`]: endpoint resolution from memberships to outer [`Addressing`]
//! - [`tunneler`]: the encapsulate/decapsulate pipelines
//! - [`port`]: binding of a [`Tunneler`] to a raw-frame [`PhysicalPort`]
//!
//! Everything except the store is stateless and may be shared across threads.
//!
//! # Example
//!
//! ```
//! use tunnel_strata::packet::ether::{EthAddr, EthernetLayer};
//! use tunnel_strata::packet::ipv4::Ipv4Layer;
//! use tunnel_strata::packet::protocol::IpProto;
//! use tunnel_strata::packet::udp::UdpLayer;
//! use tunnel_strata::zone::memory::MemoryZoneStore;
//! use tunnel_strata::zone::{EncapsulationKind, HostId, TunnelZoneMembership, ZoneStore};
//! use tunnel_strata::{LayeredFrame, LinkAddressing, Tunneler};
//! use std::net::Ipv4Addr;
//!
//! let store = MemoryZoneStore::new();
//! let zone = store.create_zone("CapwapZone", EncapsulationKind::Capwap).unwrap();
//! let (a, b) = (HostId::random(), HostId::random());
//! store.add_membership(zone, TunnelZoneMembership::new(a, Ipv4Addr::new(10, 245, 215, 2))).unwrap();
//! store.add_membership(zone, TunnelZoneMembership::new(b, Ipv4Addr::new(10, 245, 215, 1))).unwrap();
//!
//! let frame = LayeredFrame::new()
//!     .push(EthernetLayer::new(
//!         "22:22:22:11:11:11".parse().unwrap(),
//!         "33:33:33:44:44:44".parse().unwrap(),
//!     ))
//!     .push(Ipv4Layer::new(
//!         Ipv4Addr::new(192, 168, 231, 2),
//!         Ipv4Addr::new(192, 168, 231, 1),
//!         IpProto::UDP,
//!     ))
//!     .push(UdpLayer::new(0x2694, 0x0929))
//!     .with_payload(b"The Payload".to_vec());
//!
//! let tunneler = Tunneler::new(&store);
//! let link = LinkAddressing::new(EthAddr::BROADCAST, EthAddr::BROADCAST);
//! let bytes = tunneler.encapsulate(zone, a, b, link, &frame).unwrap();
//!
//! let received = tunneler.decapsulate(zone, &bytes).unwrap();
//! assert_eq!(received.inner, frame);
//! assert_eq!(received.observed.src_ip, Ipv4Addr::new(10, 245, 215, 2));
//! assert_eq!(received.observed.dst_ip, Ipv4Addr::new(10, 245, 215, 1));
//! ```

pub mod macros;

pub mod config;
pub mod error;
pub mod packet;
pub mod port;
pub mod resolver;
pub mod tunneler;
pub mod zone;

pub use config::TunnelConfig;
pub use error::TunnelError;
pub use packet::frame::{LayerKind, LayeredFrame};
pub use packet::tunnel::TunnelCodec;
pub use port::{PhysicalPort, TunnelPort};
pub use resolver::{Addressing, EndpointResolver, LinkAddressing};
pub use tunneler::{Decapsulated, Tunneler};
pub use zone::{EncapsulationKind, HostId, TunnelZone, TunnelZoneMembership, ZoneId, ZoneStore};
