//! GRE (Generic Routing Encapsulation)
//!
//! As defined in:
//! - RFC 2784: Generic Routing Encapsulation (GRE)
//! - RFC 2890: Key and Sequence Number Extensions to GRE
//!
//! # GRE Header Format (RFC 2784 + RFC 2890)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |C|R|K|S|s|Recur|  Flags  | Ver |         Protocol Type         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      Checksum (optional)      |       Reserved1 (optional)    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Key (optional)                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  Sequence Number (optional)                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Tunnels carry whole Ethernet frames, so the protocol type is Transparent
//! Ethernet Bridging (0x6558). Only version 0 is accepted; the deprecated
//! routing bits make a header unsupported.
//!
//! # Examples
//!
//! ```
//! use tunnel_strata::packet::tunnel::gre::GreHeader;
//! use tunnel_strata::packet::protocol::EtherProto;
//! use tunnel_strata::packet::HeaderParser;
//!
//! let packet = vec![
//!     0x20, 0x00,  // flags_version (Key present, version 0)
//!     0x65, 0x58,  // protocol_type (TEB)
//!     0x00, 0x00, 0x00, 0x2A,  // key = 42
//!     // ... encapsulated frame follows ...
//! ];
//!
//! let (header, payload) = GreHeader::from_bytes(&packet).unwrap();
//! assert_eq!(header.version(), 0);
//! assert_eq!(header.protocol_type(), EtherProto::TEB);
//! assert_eq!(header.key(), Some(42));
//! assert!(payload.is_empty());
//! ```

use std::fmt::{self, Formatter};

use zerocopy::byteorder::{BigEndian, U16};
use zerocopy::{FromBytes, IntoBytes, Unaligned};

use crate::config::GreConfig;
use crate::error::TunnelError;
use crate::packet::checksum::{accumulate, finish};
use crate::packet::protocol::EtherProto;
use crate::packet::tunnel::{codec_error, TunnelCodec};
use crate::packet::{HeaderParser, PacketHeader, PacketHeaderError};
use crate::resolver::Addressing;
use crate::zone::EncapsulationKind;

/// GRE Header structure as defined in RFC 2784 and RFC 2890
#[repr(C, packed)]
#[derive(
    FromBytes, IntoBytes, Unaligned, Debug, Clone, Copy, zerocopy::KnownLayout, zerocopy::Immutable,
)]
pub struct GreHeader {
    flags_version: U16<BigEndian>,
    protocol_type: EtherProto,
}

impl GreHeader {
    pub const FLAG_CHECKSUM: u16 = 0x8000; // C bit
    pub const FLAG_ROUTING: u16 = 0x4000; // R bit, deprecated
    pub const FLAG_KEY: u16 = 0x2000; // K bit
    pub const FLAG_SEQUENCE: u16 = 0x1000; // S bit
    pub const FLAG_STRICT_ROUTE: u16 = 0x0800; // s bit, deprecated

    pub const VERSION_MASK: u16 = 0x0007;
    pub const RECUR_MASK: u16 = 0x0700;
    pub const FLAGS_MASK: u16 = 0x00F8;

    pub fn new(flags: u16, protocol_type: EtherProto) -> Self {
        GreHeader {
            flags_version: U16::new(flags & !Self::VERSION_MASK),
            protocol_type,
        }
    }

    #[inline]
    pub fn flags_version(&self) -> u16 {
        self.flags_version.get()
    }

    #[inline]
    pub fn version(&self) -> u8 {
        (self.flags_version() & Self::VERSION_MASK) as u8
    }

    /// EtherType of the encapsulated payload
    #[inline]
    pub fn protocol_type(&self) -> EtherProto {
        self.protocol_type
    }

    #[inline]
    pub fn has_checksum(&self) -> bool {
        self.flags_version() & Self::FLAG_CHECKSUM != 0
    }

    #[inline]
    pub fn has_routing(&self) -> bool {
        self.flags_version() & (Self::FLAG_ROUTING | Self::FLAG_STRICT_ROUTE | Self::RECUR_MASK)
            != 0
    }

    #[inline]
    pub fn has_key(&self) -> bool {
        self.flags_version() & Self::FLAG_KEY != 0
    }

    #[inline]
    pub fn has_sequence(&self) -> bool {
        self.flags_version() & Self::FLAG_SEQUENCE != 0
    }

    /// Version 0, reserved flags clear, no source routing
    #[inline]
    fn is_valid(&self) -> bool {
        self.version() == 0
            && self.flags_version() & Self::FLAGS_MASK == 0
            && !self.has_routing()
    }

    /// Header length including optional fields
    #[inline]
    pub fn header_length(&self) -> usize {
        let mut len = Self::FIXED_LEN;
        if self.has_checksum() {
            len += 4;
        }
        if self.has_key() {
            len += 4;
        }
        if self.has_sequence() {
            len += 4;
        }
        len
    }

    pub fn flags_string(&self) -> String {
        let flags: String = [
            (self.has_checksum(), 'C'),
            (self.has_key(), 'K'),
            (self.has_sequence(), 'S'),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, c)| *c)
        .collect();

        if flags.is_empty() {
            "none".to_string()
        } else {
            flags
        }
    }
}

/// GRE Header with optional fields
#[derive(Debug, Clone)]
pub struct GreHeaderOpt<'a> {
    pub header: &'a GreHeader,
    pub raw_options: &'a [u8],
}

impl GreHeaderOpt<'_> {
    fn word(&self, offset: usize) -> Option<u32> {
        let bytes = self.raw_options.get(offset..offset + 4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn checksum(&self) -> Option<u16> {
        if !self.header.has_checksum() {
            return None;
        }
        self.word(0).map(|w| (w >> 16) as u16)
    }

    pub fn key(&self) -> Option<u32> {
        if !self.header.has_key() {
            return None;
        }
        let offset = if self.header.has_checksum() { 4 } else { 0 };
        self.word(offset)
    }

    pub fn sequence_number(&self) -> Option<u32> {
        if !self.header.has_sequence() {
            return None;
        }
        let mut offset = 0;
        if self.header.has_checksum() {
            offset += 4;
        }
        if self.header.has_key() {
            offset += 4;
        }
        self.word(offset)
    }
}

impl std::ops::Deref for GreHeaderOpt<'_> {
    type Target = GreHeader;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.header
    }
}

impl PacketHeader for GreHeader {
    const NAME: &'static str = "GreHeader";
    type InnerType = EtherProto;

    #[inline]
    fn inner_type(&self) -> Self::InnerType {
        self.protocol_type()
    }

    #[inline]
    fn total_len(&self, _buf: &[u8]) -> usize {
        self.header_length()
    }

    #[inline]
    fn is_valid(&self) -> bool {
        self.is_valid()
    }
}

impl HeaderParser for GreHeader {
    type Output<'a> = GreHeaderOpt<'a>;

    #[inline]
    fn into_view<'a>(header: &'a Self, raw_options: &'a [u8]) -> Self::Output<'a> {
        GreHeaderOpt {
            header,
            raw_options,
        }
    }
}

impl fmt::Display for GreHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GRE v{} proto={} flags={}",
            self.version(),
            self.protocol_type(),
            self.flags_string()
        )
    }
}

/// Owned GRE layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GreLayer {
    pub protocol_type: EtherProto,
    pub key: Option<u32>,
    pub sequence: Option<u32>,
    /// Emit (and expect) the optional RFC 1071 checksum
    pub checksum_enabled: bool,
}

impl GreLayer {
    /// Minimal 4-byte header carrying `protocol_type`
    pub fn new(protocol_type: EtherProto) -> Self {
        GreLayer {
            protocol_type,
            key: None,
            sequence: None,
            checksum_enabled: false,
        }
    }

    pub fn with_key(mut self, key: u32) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_checksum(mut self) -> Self {
        self.checksum_enabled = true;
        self
    }

    pub fn header_len(&self) -> usize {
        self.header().header_length()
    }

    fn header(&self) -> GreHeader {
        let mut flags = 0;
        if self.checksum_enabled {
            flags |= GreHeader::FLAG_CHECKSUM;
        }
        if self.key.is_some() {
            flags |= GreHeader::FLAG_KEY;
        }
        if self.sequence.is_some() {
            flags |= GreHeader::FLAG_SEQUENCE;
        }
        GreHeader::new(flags, self.protocol_type)
    }

    /// Header followed by `payload`
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let header = self.header();
        let mut out = Vec::with_capacity(header.header_length() + payload.len());
        out.extend_from_slice(header.as_bytes());
        if self.checksum_enabled {
            out.extend_from_slice(&[0u8; 4]);
        }
        if let Some(key) = self.key {
            out.extend_from_slice(&key.to_be_bytes());
        }
        if let Some(sequence) = self.sequence {
            out.extend_from_slice(&sequence.to_be_bytes());
        }
        out.extend_from_slice(payload);

        if self.checksum_enabled {
            let checksum = finish(accumulate(0, &out));
            out[4..6].copy_from_slice(&checksum.to_be_bytes());
        }
        out
    }

    /// Parses a header, verifying the checksum when present
    pub fn decode(buf: &[u8]) -> Result<(GreLayer, &[u8]), PacketHeaderError> {
        let (view, payload) = GreHeader::from_bytes(buf)?;

        if view.has_checksum() && finish(accumulate(0, buf)) != 0 {
            return Err(PacketHeaderError::Checksum(GreHeader::NAME));
        }

        let layer = GreLayer {
            protocol_type: view.protocol_type(),
            key: view.key(),
            sequence: view.sequence_number(),
            checksum_enabled: view.has_checksum(),
        };
        Ok((layer, payload))
    }
}

impl fmt::Display for GreLayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header())?;
        if let Some(key) = self.key {
            write!(f, " key={}", key)?;
        }
        if let Some(seq) = self.sequence {
            write!(f, " seq={}", seq)?;
        }
        Ok(())
    }
}

/// GRE codec framing Ethernet frames (protocol type TEB)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GreCodec {
    /// Tunnel key; when set, frames with another key are rejected
    pub key: Option<u32>,
    pub checksum: bool,
}

impl GreCodec {
    fn layer(&self) -> GreLayer {
        GreLayer {
            protocol_type: EtherProto::TEB,
            key: self.key,
            sequence: None,
            checksum_enabled: self.checksum,
        }
    }
}

impl From<&GreConfig> for GreCodec {
    fn from(config: &GreConfig) -> Self {
        GreCodec {
            key: config.key,
            checksum: config.checksum,
        }
    }
}

impl TunnelCodec for GreCodec {
    fn kind(&self) -> EncapsulationKind {
        EncapsulationKind::Gre
    }

    fn wrap(&self, inner: &[u8], addressing: &Addressing) -> Vec<u8> {
        tracing::trace!(src = %addressing.src_ip, dst = %addressing.dst_ip, len = inner.len(), "gre wrap");
        self.layer().encode(inner)
    }

    fn unwrap<'a>(&self, bytes: &'a [u8]) -> Result<&'a [u8], TunnelError> {
        let (layer, inner) = GreLayer::decode(bytes).map_err(|e| codec_error(e, bytes.len()))?;

        if layer.protocol_type != EtherProto::TEB {
            return Err(TunnelError::UnsupportedVariant("GRE protocol type"));
        }
        if self.key.is_some() && layer.key != self.key {
            return Err(TunnelError::UnsupportedVariant("GRE key"));
        }
        Ok(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addressing() -> Addressing {
        Addressing::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2))
    }

    #[test]
    fn test_gre_header_size() {
        assert_eq!(std::mem::size_of::<GreHeader>(), 4);
        assert_eq!(GreHeader::FIXED_LEN, 4);
    }

    #[test]
    fn test_gre_basic_header() {
        let header = GreHeader::new(0, EtherProto::IPV4);

        assert_eq!(header.version(), 0);
        assert_eq!(header.protocol_type(), EtherProto::IPV4);
        assert!(!header.has_checksum());
        assert!(!header.has_key());
        assert!(!header.has_sequence());
        assert!(header.is_valid());
        assert_eq!(header.header_length(), 4);
        assert_eq!(header.flags_string(), "none");
    }

    #[test]
    fn test_gre_all_flags() {
        let header = GreHeader::new(0xB000, EtherProto::TEB);

        assert!(header.has_checksum());
        assert!(header.has_key());
        assert!(header.has_sequence());
        assert_eq!(header.header_length(), 16);
        assert_eq!(header.flags_string(), "CKS");
    }

    #[test]
    fn test_gre_invalid_headers() {
        // Enhanced GRE (PPTP)
        assert!(GreHeader::from_bytes(&[0x30, 0x01, 0x88, 0x0b, 0, 0, 0, 0, 0, 0, 0, 0]).is_err());
        // Routing present
        assert_eq!(
            GreHeader::from_bytes(&[0x40, 0x00, 0x65, 0x58, 0, 0, 0, 0]).unwrap_err(),
            PacketHeaderError::Invalid("GreHeader")
        );
        // Reserved flags
        assert!(GreHeader::from_bytes(&[0x00, 0x08, 0x65, 0x58]).is_err());
    }

    #[test]
    fn test_gre_optional_fields() {
        let packet = [
            0xB0, 0x00, 0x65, 0x58, // C, K, S
            0x12, 0x34, 0x00, 0x00, // checksum, reserved
            0x00, 0x00, 0x00, 0x64, // key
            0x00, 0x00, 0x00, 0x01, // sequence
        ];
        let (header, payload) = GreHeader::from_bytes(&packet).unwrap();
        assert_eq!(header.checksum(), Some(0x1234));
        assert_eq!(header.key(), Some(100));
        assert_eq!(header.sequence_number(), Some(1));
        assert!(payload.is_empty());
    }

    #[test]
    fn test_gre_truncated_options() {
        let packet = [0x20, 0x00, 0x65, 0x58, 0x00, 0x00];
        assert_eq!(
            GreHeader::from_bytes(&packet).unwrap_err(),
            PacketHeaderError::TooShort("GreHeader")
        );
    }

    #[test]
    fn test_layer_minimal_encoding() {
        let layer = GreLayer::new(EtherProto::TEB);
        assert_eq!(layer.encode(b"xy"), [0x00, 0x00, 0x65, 0x58, b'x', b'y']);
        assert_eq!(layer.header_len(), 4);
    }

    #[test]
    fn test_layer_roundtrip_with_extensions() {
        let mut layer = GreLayer::new(EtherProto::IPV4).with_key(7).with_checksum();
        layer.sequence = Some(99);

        let encoded = layer.encode(b"odd");
        assert_eq!(encoded.len(), 16 + 3);

        let (parsed, payload) = GreLayer::decode(&encoded).unwrap();
        assert_eq!(parsed, layer);
        assert_eq!(payload, b"odd");
    }

    #[test]
    fn test_layer_bad_checksum() {
        let mut encoded = GreLayer::new(EtherProto::TEB).with_checksum().encode(b"frame");
        encoded[9] ^= 0x10;
        assert_eq!(
            GreLayer::decode(&encoded).unwrap_err(),
            PacketHeaderError::Checksum("GreHeader")
        );
    }

    #[test]
    fn test_codec_roundtrip() {
        for codec in [
            GreCodec::default(),
            GreCodec {
                key: Some(0xdead_beef),
                checksum: false,
            },
            GreCodec {
                key: None,
                checksum: true,
            },
        ] {
            let payloads: [&[u8]; 3] = [b"", b"x", b"The Payload"];
            for payload in payloads {
                let framed = codec.wrap(payload, &addressing());
                assert_eq!(codec.unwrap(&framed).unwrap(), payload);
            }
        }
    }

    #[test]
    fn test_codec_truncated() {
        let codec = GreCodec {
            key: Some(1),
            checksum: false,
        };
        let framed = codec.wrap(b"", &addressing());
        assert!(matches!(
            codec.unwrap(&framed[..6]),
            Err(TunnelError::TruncatedHeader {
                header: "GreHeader",
                available: 6
            })
        ));
        assert!(matches!(
            GreCodec::default().unwrap(&[0x00, 0x00, 0x65]),
            Err(TunnelError::TruncatedHeader { .. })
        ));
    }

    #[test]
    fn test_codec_rejects_other_variants() {
        let codec = GreCodec::default();

        let ip_in_gre = GreLayer::new(EtherProto::IPV4).encode(b"");
        assert!(matches!(
            codec.unwrap(&ip_in_gre),
            Err(TunnelError::UnsupportedVariant(_))
        ));

        let pptp = [0x30, 0x01, 0x88, 0x0b, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            codec.unwrap(&pptp),
            Err(TunnelError::UnsupportedVariant("GreHeader"))
        ));

        let keyed = GreCodec {
            key: Some(5),
            checksum: false,
        };
        let other_key = GreLayer::new(EtherProto::TEB).with_key(6).encode(b"");
        assert!(matches!(
            keyed.unwrap(&other_key),
            Err(TunnelError::UnsupportedVariant("GRE key"))
        ));
    }
}
