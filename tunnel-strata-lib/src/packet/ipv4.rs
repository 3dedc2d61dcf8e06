//! IPv4 (Internet Protocol version 4) header
//!
//! Only the subset a tunnel endpoint needs: the fixed header, raw options,
//! total length and the header checksum (RFC 791, RFC 1071).
//!
//! # IPv4 Header Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |Version|  IHL  |    DSCP   |ECN|          Total Length         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Identification        |Flags|      Fragment Offset    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Time to Live |    Protocol   |         Header Checksum       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Source Address                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Destination Address                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Options (if IHL > 5)                       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! # Examples
//!
//! ```
//! use tunnel_strata::packet::ipv4::Ipv4Layer;
//! use tunnel_strata::packet::protocol::IpProto;
//! use std::net::Ipv4Addr;
//!
//! let layer = Ipv4Layer::new(
//!     Ipv4Addr::new(192, 168, 231, 2),
//!     Ipv4Addr::new(192, 168, 231, 1),
//!     IpProto::UDP,
//! );
//!
//! let mut packet = layer.encode(8).unwrap();
//! packet.extend_from_slice(&[0u8; 8]);
//!
//! let (parsed, payload) = Ipv4Layer::decode(&packet).unwrap();
//! assert_eq!(parsed, layer);
//! assert_eq!(payload.len(), 8);
//! ```

use std::fmt::{self, Formatter};
use std::net::Ipv4Addr;
use std::ops::Deref;

use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{FromBytes, IntoBytes, Unaligned};

use crate::packet::checksum::{accumulate, finish};
use crate::packet::protocol::IpProto;
use crate::packet::{HeaderParser, PacketHeader, PacketHeaderError};

/// Maximum size of the options area (IHL = 15)
pub const MAX_OPTIONS_LEN: usize = 40;

const DEFAULT_TTL: u8 = 64;

/// IPv4 Header structure as defined in RFC 791
///
/// The fixed portion of the IPv4 header is 20 bytes. Additional options
/// may be present if IHL > 5.
#[repr(C, packed)]
#[derive(
    FromBytes, IntoBytes, Unaligned, Debug, Clone, Copy, zerocopy::KnownLayout, zerocopy::Immutable,
)]
pub struct Ipv4Header {
    ver_ihl: u8,
    dscp_ecn: u8,
    total_length: U16<BigEndian>,
    identification: U16<BigEndian>,
    flags_frag_offset: U16<BigEndian>,
    ttl: u8,
    protocol: IpProto,
    checksum: U16<BigEndian>,
    src_ip: U32<BigEndian>,
    dst_ip: U32<BigEndian>,
}

impl Ipv4Header {
    const OFFSET_MASK: u16 = 0x1FFF;
    const MF_FLAG_MASK: u16 = 0x2000;
    const DF_FLAG_MASK: u16 = 0x4000;

    /// Header without options; length and checksum are left at zero
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, protocol: IpProto, ttl: u8) -> Self {
        Ipv4Header {
            ver_ihl: 0x45,
            dscp_ecn: 0,
            total_length: U16::new(Self::FIXED_LEN as u16),
            identification: U16::new(0),
            flags_frag_offset: U16::new(0),
            ttl,
            protocol,
            checksum: U16::new(0),
            src_ip: U32::new(u32::from(src)),
            dst_ip: U32::new(u32::from(dst)),
        }
    }

    #[inline]
    pub fn dscp(&self) -> u8 {
        self.dscp_ecn >> 2
    }

    #[inline]
    pub fn ecn(&self) -> u8 {
        self.dscp_ecn & 0x03
    }

    #[inline]
    pub fn version(&self) -> u8 {
        self.ver_ihl >> 4
    }

    #[inline]
    pub fn ihl(&self) -> u8 {
        self.ver_ihl & 0x0F
    }

    #[inline]
    pub fn flags(&self) -> u8 {
        (self.flags_frag_offset.get() >> 13) as u8
    }

    #[inline]
    pub fn fragment_offset(&self) -> u16 {
        self.flags_frag_offset.get() & Self::OFFSET_MASK
    }

    #[inline]
    pub fn has_dont_fragment(&self) -> bool {
        (self.flags_frag_offset.get() & Self::DF_FLAG_MASK) != 0
    }

    #[inline]
    pub fn is_fragmenting(&self) -> bool {
        (self.flags_frag_offset.get() & (Self::MF_FLAG_MASK | Self::OFFSET_MASK)) != 0
    }

    #[inline]
    pub fn total_length(&self) -> usize {
        self.total_length.get() as usize
    }

    #[inline]
    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    #[inline]
    pub fn protocol(&self) -> IpProto {
        self.protocol
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        self.checksum.get()
    }

    #[inline]
    pub fn src_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.src_ip.get())
    }

    #[inline]
    pub fn dst_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.dst_ip.get())
    }

    #[inline]
    pub fn has_options(&self) -> bool {
        self.ihl() > 5
    }

    #[inline]
    pub fn id(&self) -> u16 {
        self.identification.get()
    }

    /// Checksum of this header followed by `options`, with the checksum field as zero
    pub fn compute_checksum(&self, options: &[u8]) -> u16 {
        let mut header = *self;
        header.checksum = U16::new(0);
        finish(accumulate(accumulate(0, header.as_bytes()), options))
    }

    /// A correct header (options included) sums to zero
    pub fn verify_checksum(&self, options: &[u8]) -> bool {
        finish(accumulate(accumulate(0, self.as_bytes()), options)) == 0
    }
}

/// IPv4 Header with options
#[derive(Debug, Clone)]
pub struct Ipv4HeaderOpt<'a> {
    pub header: &'a Ipv4Header,
    pub raw_options: &'a [u8],
}

impl Ipv4HeaderOpt<'_> {
    #[inline]
    pub fn verify_checksum(&self) -> bool {
        self.header.verify_checksum(self.raw_options)
    }
}

impl Deref for Ipv4HeaderOpt<'_> {
    type Target = Ipv4Header;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.header
    }
}

impl PacketHeader for Ipv4Header {
    const NAME: &'static str = "IPv4Header";
    type InnerType = IpProto;

    #[inline]
    fn inner_type(&self) -> Self::InnerType {
        self.protocol
    }

    #[inline]
    fn total_len(&self, _buf: &[u8]) -> usize {
        (self.ihl() as usize) * 4
    }

    #[inline]
    fn is_valid(&self) -> bool {
        self.version() == 4 && self.ihl() >= 5
    }
}

impl HeaderParser for Ipv4Header {
    type Output<'a> = Ipv4HeaderOpt<'a>;

    #[inline]
    fn into_view<'a>(header: &'a Self, raw_options: &'a [u8]) -> Self::Output<'a> {
        Ipv4HeaderOpt {
            header,
            raw_options,
        }
    }
}

impl fmt::Display for Ipv4Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPv4 {} -> {} proto={} ttl={} len={}",
            self.src_ip(),
            self.dst_ip(),
            self.protocol(),
            self.ttl(),
            self.total_length()
        )?;

        if self.is_fragmenting() {
            write!(f, " frag offset={}", self.fragment_offset())?;
        }

        if self.has_options() {
            write!(f, " +opts")?;
        }

        Ok(())
    }
}

/// Owned IPv4 layer
///
/// Total length, IHL and header checksum are not stored: [`Ipv4Layer::encode`]
/// derives them and [`Ipv4Layer::decode`] checks them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ipv4Layer {
    pub dscp_ecn: u8,
    pub identification: u16,
    /// Flags (3 bits) and fragment offset (13 bits) as on the wire
    pub flags_fragment: u16,
    pub ttl: u8,
    pub protocol: IpProto,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    /// Raw options, a multiple of 4 bytes
    pub options: Vec<u8>,
}

impl Ipv4Layer {
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, protocol: IpProto) -> Self {
        Ipv4Layer {
            dscp_ecn: 0,
            identification: 0,
            flags_fragment: 0,
            ttl: DEFAULT_TTL,
            protocol,
            src,
            dst,
            options: Vec::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_identification(mut self, identification: u16) -> Self {
        self.identification = identification;
        self
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        Ipv4Header::FIXED_LEN + self.options.len()
    }

    /// More Fragments set or a non-zero offset
    #[inline]
    pub fn is_fragment(&self) -> bool {
        self.flags_fragment & (Ipv4Header::MF_FLAG_MASK | Ipv4Header::OFFSET_MASK) != 0
    }

    /// Builds the wire header for a payload of `payload_len` bytes
    pub fn header(&self, payload_len: usize) -> Result<Ipv4Header, PacketHeaderError> {
        if self.options.len() > MAX_OPTIONS_LEN || self.options.len() % 4 != 0 {
            return Err(PacketHeaderError::Invalid("IPv4Header options"));
        }
        let total = self.header_len() + payload_len;
        let total = u16::try_from(total)
            .map_err(|_| PacketHeaderError::Other("IPv4 datagram exceeds 65535 bytes"))?;

        let mut header = Ipv4Header::new(self.src, self.dst, self.protocol, self.ttl);
        header.ver_ihl = 0x40 | (self.header_len() / 4) as u8;
        header.dscp_ecn = self.dscp_ecn;
        header.total_length = U16::new(total);
        header.identification = U16::new(self.identification);
        header.flags_frag_offset = U16::new(self.flags_fragment);
        header.checksum = U16::new(header.compute_checksum(&self.options));
        Ok(header)
    }

    /// Header bytes (options included) for a payload of `payload_len` bytes
    pub fn encode(&self, payload_len: usize) -> Result<Vec<u8>, PacketHeaderError> {
        let header = self.header(payload_len)?;
        let mut out = Vec::with_capacity(self.header_len() + payload_len);
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.options);
        Ok(out)
    }

    /// Parses and validates a header, returning the layer and its payload.
    ///
    /// The payload is bounded by the total length field: a total length beyond
    /// the buffer is an error, trailing bytes past it (link padding) are dropped.
    pub fn decode(buf: &[u8]) -> Result<(Ipv4Layer, &[u8]), PacketHeaderError> {
        let (view, _) = Ipv4Header::from_bytes(buf)?;

        if !view.verify_checksum() {
            return Err(PacketHeaderError::Checksum(Ipv4Header::NAME));
        }

        let header_len = view.total_len(buf);
        let total = view.total_length();
        if total < header_len {
            return Err(PacketHeaderError::Other("IPv4 total length shorter than its header"));
        }
        if total > buf.len() {
            return Err(PacketHeaderError::InsufficientLength(Ipv4Header::NAME));
        }

        let layer = Ipv4Layer::from(&view);
        Ok((layer, &buf[header_len..total]))
    }
}

impl From<&Ipv4HeaderOpt<'_>> for Ipv4Layer {
    fn from(view: &Ipv4HeaderOpt<'_>) -> Self {
        Ipv4Layer {
            dscp_ecn: view.dscp_ecn,
            identification: view.id(),
            flags_fragment: view.flags_frag_offset.get(),
            ttl: view.ttl(),
            protocol: view.protocol(),
            src: view.src_ip(),
            dst: view.dst_ip(),
            options: view.raw_options.to_vec(),
        }
    }
}

impl fmt::Display for Ipv4Layer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPv4 {} -> {} proto={} ttl={}",
            self.src, self.dst, self.protocol, self.ttl
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Inner IPv4 header of the CAPWAP data-path capture
    const INNER_HEADER: [u8; 20] = [
        0x45, 0x00, 0x00, 0x27, 0x00, 0x00, 0x00, 0x00, 0x40, 0x11, 0x2b, 0x71, 0xc0, 0xa8, 0xe7,
        0x02, 0xc0, 0xa8, 0xe7, 0x01,
    ];

    #[test]
    fn test_ipv4_header_size() {
        assert_eq!(std::mem::size_of::<Ipv4Header>(), 20);
        assert_eq!(Ipv4Header::FIXED_LEN, 20);
    }

    #[test]
    fn test_ipv4_dscp_ecn() {
        let mut header = create_test_header();

        // DSCP = 0x2E (46), ECN = 0x01
        header.dscp_ecn = 0xB9;
        assert_eq!(header.dscp(), 46);
        assert_eq!(header.ecn(), 1);
    }

    #[test]
    fn test_ipv4_fragmentation() {
        let mut header = create_test_header();

        header.flags_frag_offset = U16::new(0x4000); // Don't Fragment
        assert_eq!(header.flags(), 0x02);
        assert!(header.has_dont_fragment());
        assert!(!header.is_fragmenting());

        // offset = 185, More Fragments
        header.flags_frag_offset = U16::new(0x20B9);
        assert_eq!(header.flags(), 0x01);
        assert_eq!(header.fragment_offset(), 185);
        assert!(header.is_fragmenting());
    }

    #[test]
    fn test_ipv4_parsing_basic() {
        let (header, payload) = Ipv4Header::from_bytes(&INNER_HEADER).unwrap();
        assert_eq!(header.version(), 4);
        assert_eq!(header.ihl(), 5);
        assert_eq!(header.protocol(), IpProto::UDP);
        assert_eq!(header.src_ip(), Ipv4Addr::new(192, 168, 231, 2));
        assert_eq!(header.dst_ip(), Ipv4Addr::new(192, 168, 231, 1));
        assert_eq!(header.total_length(), 0x27);
        assert!(!header.has_options());
        assert!(header.verify_checksum());
        assert!(payload.is_empty());
    }

    #[test]
    fn test_ipv4_parsing_invalid_version_or_ihl() {
        let mut packet = INNER_HEADER;
        packet[0] = 0x65;
        assert_eq!(
            Ipv4Header::from_bytes(&packet).unwrap_err(),
            PacketHeaderError::Invalid("IPv4Header")
        );

        packet[0] = 0x44;
        assert!(Ipv4Header::from_bytes(&packet).is_err());
    }

    #[test]
    fn test_ipv4_parsing_too_small() {
        assert!(Ipv4Header::from_bytes(&[0u8; 19]).is_err());
    }

    #[test]
    fn test_ipv4_compute_checksum() {
        let header = create_test_header();
        let sum = header.compute_checksum(&[]);

        let mut fixed = header;
        fixed.checksum = U16::new(sum);
        assert!(fixed.verify_checksum(&[]));
        assert!(!header.verify_checksum(&[]));

        let (view, _) = Ipv4Header::from_bytes(&INNER_HEADER).unwrap();
        assert_eq!(view.compute_checksum(&[]), 0x2b71);
    }

    #[test]
    fn test_layer_encode_matches_capture() {
        let layer = Ipv4Layer::new(
            Ipv4Addr::new(192, 168, 231, 2),
            Ipv4Addr::new(192, 168, 231, 1),
            IpProto::UDP,
        );
        // 8 bytes of UDP header and 11 bytes of payload
        assert_eq!(layer.encode(19).unwrap(), INNER_HEADER);
    }

    #[test]
    fn test_layer_decode_total_length_exceeds_buffer() {
        let mut packet = INNER_HEADER.to_vec();
        packet.extend_from_slice(&[0u8; 10]); // total length says 19 bytes follow

        assert_eq!(
            Ipv4Layer::decode(&packet).unwrap_err(),
            PacketHeaderError::InsufficientLength("IPv4Header")
        );
    }

    #[test]
    fn test_layer_decode_total_length_below_header() {
        let layer = Ipv4Layer::new(
            Ipv4Addr::new(192, 168, 231, 2),
            Ipv4Addr::new(192, 168, 231, 1),
            IpProto::UDP,
        );
        let mut header = layer.header(19).unwrap();
        header.total_length = U16::new(10);
        header.checksum = U16::new(0);
        header.checksum = U16::new(header.compute_checksum(&[]));

        let mut packet = header.as_bytes().to_vec();
        packet.extend_from_slice(&[0u8; 19]);
        assert_eq!(
            Ipv4Layer::decode(&packet).unwrap_err(),
            PacketHeaderError::Other("IPv4 total length shorter than its header")
        );
    }

    #[test]
    fn test_layer_decode_trims_padding() {
        let mut packet = INNER_HEADER.to_vec();
        packet.extend_from_slice(&[0xAA; 19]);
        packet.extend_from_slice(&[0x00; 7]); // ethernet minimum-size padding

        let (_, payload) = Ipv4Layer::decode(&packet).unwrap();
        assert_eq!(payload, &[0xAA; 19]);
    }

    #[test]
    fn test_layer_decode_bad_checksum() {
        let mut packet = INNER_HEADER.to_vec();
        packet[11] ^= 0x01;
        packet.extend_from_slice(&[0u8; 19]);

        assert_eq!(
            Ipv4Layer::decode(&packet).unwrap_err(),
            PacketHeaderError::Checksum("IPv4Header")
        );
    }

    #[test]
    fn test_layer_with_options() {
        let mut layer = Ipv4Layer::new(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            IpProto::GRE,
        )
        .with_ttl(3)
        .with_identification(0x1825);
        layer.options = vec![0x94, 0x04, 0x00, 0x00]; // Router Alert

        let mut packet = layer.encode(4).unwrap();
        assert_eq!(packet[0], 0x46);
        packet.extend_from_slice(b"data");

        let (parsed, payload) = Ipv4Layer::decode(&packet).unwrap();
        assert_eq!(parsed, layer);
        assert_eq!(payload, b"data");
    }

    #[test]
    fn test_layer_rejects_unaligned_options() {
        let mut layer = Ipv4Layer::new(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, IpProto::UDP);
        layer.options = vec![0x01, 0x01, 0x01];
        assert!(layer.encode(0).is_err());

        layer.options = vec![0x01; 44];
        assert!(layer.encode(0).is_err());
    }

    #[test]
    fn test_layer_rejects_oversized_payload() {
        let layer = Ipv4Layer::new(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, IpProto::UDP);
        assert!(layer.encode(u16::MAX as usize).is_err());
    }

    fn create_test_header() -> Ipv4Header {
        Ipv4Header {
            ver_ihl: 0x45,
            dscp_ecn: 0x00,
            total_length: U16::new(20),
            identification: U16::new(0x1234),
            flags_frag_offset: U16::new(0x4000),
            ttl: 64,
            protocol: IpProto::TCP,
            checksum: U16::new(0),
            src_ip: U32::new(0xC0A80164), // 192.168.1.100
            dst_ip: U32::new(0x0A000001), // 10.0.0.1
        }
    }
}
