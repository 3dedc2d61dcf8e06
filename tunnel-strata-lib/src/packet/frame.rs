//! Owned layered frame model
//!
//! A [`LayeredFrame`] is an ordered stack of header layers, outermost first,
//! terminated by opaque payload bytes. Each layer's "next protocol" field must
//! name the layer beneath it; [`LayeredFrame::serialize`] rejects a stack where
//! it does not, and fills in every length and checksum.
//!
//! Decoding walks the discriminators from a given top layer and stops at the
//! first one it does not know (or a header variant it cannot represent): the
//! remainder is kept as payload so the outer layers can still be inspected.
//!
//! # Examples
//!
//! ```
//! use tunnel_strata::packet::ether::{EthAddr, EthernetLayer};
//! use tunnel_strata::packet::frame::{LayerKind, LayeredFrame};
//! use tunnel_strata::packet::ipv4::Ipv4Layer;
//! use tunnel_strata::packet::protocol::IpProto;
//! use tunnel_strata::packet::udp::UdpLayer;
//! use std::net::Ipv4Addr;
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
//! let bytes = frame.serialize().unwrap();
//! assert_eq!(bytes.len(), 14 + 20 + 8 + 11);
//!
//! let parsed = LayeredFrame::deserialize(&bytes, LayerKind::Ethernet).unwrap();
//! assert_eq!(parsed, frame);
//! ```

use std::fmt::{self, Display, Formatter};
use std::net::Ipv4Addr;

use smallvec::SmallVec;
use strum::{Display as StrumDisplay, EnumString};
use zerocopy::IntoBytes;

use crate::error::TunnelError;
use crate::packet::ether::{EtherHeader, EthernetLayer};
use crate::packet::ipv4::Ipv4Layer;
use crate::packet::protocol::{EtherProto, IpProto};
use crate::packet::tunnel::capwap::{CapwapLayer, CAPWAP_DST_PORT, CAPWAP_SRC_PORT};
use crate::packet::tunnel::gre::GreLayer;
use crate::packet::udp::UdpLayer;
use crate::packet::{HeaderParser, PacketHeaderError};

const LAYER_MISMATCH: PacketHeaderError =
    PacketHeaderError::Other("next-layer discriminator does not match the layer beneath");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum LayerKind {
    Ethernet,
    Ipv4,
    Udp,
    Gre,
    Capwap,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Layer {
    Ethernet(EthernetLayer),
    Ipv4(Ipv4Layer),
    Udp(UdpLayer),
    Gre(GreLayer),
    Capwap(CapwapLayer),
}

impl Layer {
    pub fn kind(&self) -> LayerKind {
        match self {
            Layer::Ethernet(_) => LayerKind::Ethernet,
            Layer::Ipv4(_) => LayerKind::Ipv4,
            Layer::Udp(_) => LayerKind::Udp,
            Layer::Gre(_) => LayerKind::Gre,
            Layer::Capwap(_) => LayerKind::Capwap,
        }
    }

    /// Points this layer's discriminator at `inner`
    fn link(&mut self, inner: LayerKind) {
        match (self, inner) {
            (Layer::Ethernet(eth), LayerKind::Ipv4) => eth.ethertype = EtherProto::IPV4,
            (Layer::Ipv4(ip), LayerKind::Udp) => ip.protocol = IpProto::UDP,
            (Layer::Ipv4(ip), LayerKind::Gre) => ip.protocol = IpProto::GRE,
            (Layer::Gre(gre), LayerKind::Ethernet) => gre.protocol_type = EtherProto::TEB,
            (Layer::Gre(gre), LayerKind::Ipv4) => gre.protocol_type = EtherProto::IPV4,
            _ => {}
        }
    }

    /// Whether this layer's discriminator names `inner`
    fn carries(&self, inner: LayerKind) -> bool {
        match (self, inner) {
            (Layer::Ethernet(eth), LayerKind::Ipv4) => eth.ethertype == EtherProto::IPV4,
            (Layer::Ipv4(ip), LayerKind::Udp) => ip.protocol == IpProto::UDP,
            (Layer::Ipv4(ip), LayerKind::Gre) => ip.protocol == IpProto::GRE,
            (Layer::Udp(_), LayerKind::Capwap) => true,
            (Layer::Gre(gre), LayerKind::Ethernet) => gre.protocol_type == EtherProto::TEB,
            (Layer::Gre(gre), LayerKind::Ipv4) => gre.protocol_type == EtherProto::IPV4,
            (Layer::Capwap(_), LayerKind::Ethernet) => true,
            _ => false,
        }
    }
}

impl Display for Layer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Ethernet(l) => l.fmt(f),
            Layer::Ipv4(l) => l.fmt(f),
            Layer::Udp(l) => l.fmt(f),
            Layer::Gre(l) => l.fmt(f),
            Layer::Capwap(l) => l.fmt(f),
        }
    }
}

macro_rules! impl_layer_from {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        $(
            impl From<$ty> for Layer {
                #[inline]
                fn from(layer: $ty) -> Self {
                    Layer::$variant(layer)
                }
            }
        )+
    };
}

impl_layer_from!(
    Ethernet(EthernetLayer),
    Ipv4(Ipv4Layer),
    Udp(UdpLayer),
    Gre(GreLayer),
    Capwap(CapwapLayer),
);

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LayeredFrame {
    layers: SmallVec<[Layer; 4]>,
    payload: Vec<u8>,
}

impl LayeredFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `layer` beneath the current innermost layer, pointing that
    /// layer's discriminator at it
    pub fn push(mut self, layer: impl Into<Layer>) -> Self {
        let layer = layer.into();
        if let Some(last) = self.layers.last_mut() {
            last.link(layer.kind());
        }
        self.layers.push(layer);
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn top(&self) -> Option<LayerKind> {
        self.layers.first().map(Layer::kind)
    }

    /// Outermost Ethernet layer
    pub fn ethernet(&self) -> Option<&EthernetLayer> {
        self.layers.iter().find_map(|l| match l {
            Layer::Ethernet(eth) => Some(eth),
            _ => None,
        })
    }

    /// Outermost IPv4 layer
    pub fn ipv4(&self) -> Option<&Ipv4Layer> {
        self.layers.iter().find_map(|l| match l {
            Layer::Ipv4(ip) => Some(ip),
            _ => None,
        })
    }

    /// Outermost UDP layer
    pub fn udp(&self) -> Option<&UdpLayer> {
        self.layers.iter().find_map(|l| match l {
            Layer::Udp(udp) => Some(udp),
            _ => None,
        })
    }

    /// Checks that each layer's discriminator names the layer beneath it
    pub fn validate(&self) -> Result<(), TunnelError> {
        for pair in self.layers.windows(2) {
            if !pair[0].carries(pair[1].kind()) {
                return Err(TunnelError::MalformedFrame(LAYER_MISMATCH));
            }
        }
        Ok(())
    }

    /// Canonical wire bytes, with lengths and checksums computed
    pub fn serialize(&self) -> Result<Vec<u8>, TunnelError> {
        self.validate()?;

        let mut body = self.payload.clone();
        for (idx, layer) in self.layers.iter().enumerate().rev() {
            body = match layer {
                Layer::Ethernet(eth) => prepend(eth.header().as_bytes().to_vec(), body),
                Layer::Ipv4(ip) => prepend(ip.encode(body.len())?, body),
                Layer::Udp(udp) => udp.encode(&body, self.enclosing_addrs(idx))?,
                Layer::Gre(gre) => gre.encode(&body),
                Layer::Capwap(capwap) => capwap.encode(&body),
            };
        }
        Ok(body)
    }

    /// Parses `bytes` starting from a `top` layer, with the default CAPWAP ports
    pub fn deserialize(bytes: &[u8], top: LayerKind) -> Result<LayeredFrame, TunnelError> {
        FrameDecoder::default().decode(bytes, top)
    }

    /// Source and destination of the nearest IPv4 layer above `idx`
    fn enclosing_addrs(&self, idx: usize) -> Option<(Ipv4Addr, Ipv4Addr)> {
        self.layers[..idx].iter().rev().find_map(|l| match l {
            Layer::Ipv4(ip) => Some((ip.src, ip.dst)),
            _ => None,
        })
    }
}

impl Display for LayeredFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for layer in &self.layers {
            write!(f, "{} / ", layer)?;
        }
        write!(f, "payload({} bytes)", self.payload.len())
    }
}

fn prepend(mut header: Vec<u8>, body: Vec<u8>) -> Vec<u8> {
    header.extend_from_slice(&body);
    header
}

/// Layer decoder; UDP datagrams to or from one of `capwap_ports` are CAPWAP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDecoder {
    pub capwap_ports: [u16; 2],
}

impl Default for FrameDecoder {
    fn default() -> Self {
        FrameDecoder {
            capwap_ports: [CAPWAP_SRC_PORT, CAPWAP_DST_PORT],
        }
    }
}

impl FrameDecoder {
    pub fn with_capwap_ports(src: u16, dst: u16) -> Self {
        FrameDecoder {
            capwap_ports: [src, dst],
        }
    }

    /// Parses layers from `top` inward.
    ///
    /// The top layer must parse. Below it, a header variant that cannot be
    /// represented ends decoding with the remainder as payload, while lengths
    /// or checksums that disagree with the bytes fail with `MalformedFrame`.
    pub fn decode(&self, bytes: &[u8], top: LayerKind) -> Result<LayeredFrame, TunnelError> {
        let mut frame = LayeredFrame::new();
        let mut rest = bytes;
        let mut next = Some(top);
        let mut addrs = None;

        while let Some(kind) = next {
            let step = self.decode_layer(kind, rest, addrs);
            let (layer, inner, following) = match step {
                Ok(parsed) => parsed,
                Err(PacketHeaderError::Invalid(header)) if !frame.layers.is_empty() => {
                    tracing::trace!(header, "unsupported header variant, remainder kept as payload");
                    break;
                }
                Err(err) => return Err(err.into()),
            };

            if let Layer::Ipv4(ip) = &layer {
                addrs = Some((ip.src, ip.dst));
            }
            frame.layers.push(layer);
            rest = inner;
            next = following;
        }

        frame.payload = rest.to_vec();
        Ok(frame)
    }

    #[allow(clippy::type_complexity)]
    fn decode_layer<'a>(
        &self,
        kind: LayerKind,
        buf: &'a [u8],
        addrs: Option<(Ipv4Addr, Ipv4Addr)>,
    ) -> Result<(Layer, &'a [u8], Option<LayerKind>), PacketHeaderError> {
        match kind {
            LayerKind::Ethernet => {
                let (header, rest) = EtherHeader::from_bytes(buf)?;
                let next = match header.protocol() {
                    EtherProto::IPV4 => Some(LayerKind::Ipv4),
                    _ => None,
                };
                Ok((Layer::Ethernet(EthernetLayer::from(header)), rest, next))
            }
            LayerKind::Ipv4 => {
                let (ip, rest) = Ipv4Layer::decode(buf)?;
                let next = match ip.protocol {
                    _ if ip.is_fragment() => None,
                    IpProto::UDP => Some(LayerKind::Udp),
                    IpProto::GRE => Some(LayerKind::Gre),
                    _ => None,
                };
                Ok((Layer::Ipv4(ip), rest, next))
            }
            LayerKind::Udp => {
                let (udp, rest) = UdpLayer::decode(buf, addrs)?;
                let next = if self.capwap_ports.contains(&udp.dst_port)
                    || self.capwap_ports.contains(&udp.src_port)
                {
                    Some(LayerKind::Capwap)
                } else {
                    None
                };
                Ok((Layer::Udp(udp), rest, next))
            }
            LayerKind::Gre => {
                let (gre, rest) = GreLayer::decode(buf)?;
                let next = match gre.protocol_type {
                    EtherProto::TEB => Some(LayerKind::Ethernet),
                    EtherProto::IPV4 => Some(LayerKind::Ipv4),
                    _ => None,
                };
                Ok((Layer::Gre(gre), rest, next))
            }
            LayerKind::Capwap => {
                let (capwap, rest) = CapwapLayer::decode(buf)?;
                Ok((Layer::Capwap(capwap), rest, Some(LayerKind::Ethernet)))
            }
        }
    }
}

#[cfg(test)]
/// CAPWAP data-path capture: outer Ethernet/IPv4/UDP, CAPWAP with key 1,
/// inner Ethernet/IPv4/UDP carrying "The Payload"
pub(crate) const CAPWAP_CAPTURE: [u8; 115] = [
    0xbb, 0xbb, 0xbb, 0xdd, 0xdd, 0xdd, 0xaa, 0xaa, 0xaa, 0xcc, 0xcc, 0xcc, 0x08, 0x00, // eth
    0x45, 0x00, 0x00, 0x65, 0x18, 0x25, 0x00, 0x00, 0x40, 0x11, 0x9e, 0x75, 0x0a, 0xf5, 0xd7,
    0x02, 0x0a, 0xf5, 0xd7, 0x01, // ipv4
    0xe6, 0x01, 0xe6, 0x02, 0x00, 0x51, 0x00, 0x00, // udp
    0x00, 0x28, 0x3c, 0x20, 0x00, 0x00, 0x00, 0x00, 0x0b, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x01, // capwap
    0x22, 0x22, 0x22, 0x11, 0x11, 0x11, 0x33, 0x33, 0x33, 0x44, 0x44, 0x44, 0x08, 0x00, // eth
    0x45, 0x00, 0x00, 0x27, 0x00, 0x00, 0x00, 0x00, 0x40, 0x11, 0x2b, 0x71, 0xc0, 0xa8, 0xe7,
    0x02, 0xc0, 0xa8, 0xe7, 0x01, // ipv4
    0x26, 0x94, 0x09, 0x29, 0x00, 0x13, 0x29, 0xfd, // udp
    0x54, 0x68, 0x65, 0x20, 0x50, 0x61, 0x79, 0x6c, 0x6f, 0x61, 0x64,
];
