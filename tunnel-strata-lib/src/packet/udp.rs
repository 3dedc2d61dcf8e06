//! UDP (User Datagram Protocol) header
//!
//! UDP carries CAPWAP data frames between tunnel endpoints, and is also the
//! usual transport of the virtual traffic inside them.
//!
//! # UDP Header Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Source Port          |       Destination Port        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            Length             |           Checksum            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! - Header size: 8 bytes (fixed)
//! - Length field: includes header + payload
//! - Checksum: optional over IPv4, zero meaning "not computed"
//!
//! # Examples
//!
//! ```
//! use tunnel_strata::packet::udp::UdpHeader;
//! use tunnel_strata::packet::HeaderParser;
//!
//! let packet = vec![
//!     0x26, 0x94,        // Source port: 9876
//!     0x09, 0x29,        // Destination port: 2345
//!     0x00, 0x13,        // Length: 19 bytes (8 header + 11 payload)
//!     0x29, 0xfd,        // Checksum
//!     b'T', b'h', b'e', b' ', b'P', b'a', b'y', b'l', b'o', b'a', b'd',
//! ];
//!
//! let (header, payload) = UdpHeader::from_bytes(&packet).unwrap();
//! assert_eq!(header.src_port(), 9876);
//! assert_eq!(header.dst_port(), 2345);
//! assert_eq!(header.payload_len(), 11);
//! assert_eq!(payload, b"The Payload");
//! ```

use std::fmt::{self, Formatter};
use std::mem;
use std::net::Ipv4Addr;

use zerocopy::byteorder::{BigEndian, U16};
use zerocopy::{FromBytes, IntoBytes, Unaligned};

use crate::packet::checksum::{accumulate, finish, pseudo_header};
use crate::packet::protocol::IpProto;
use crate::packet::{HeaderParser, PacketHeader, PacketHeaderError};

/// UDP Header structure as defined in RFC 768
#[repr(C, packed)]
#[derive(
    FromBytes, IntoBytes, Unaligned, Debug, Clone, Copy, zerocopy::KnownLayout, zerocopy::Immutable,
)]
pub struct UdpHeader {
    src_port: U16<BigEndian>,
    dst_port: U16<BigEndian>,
    length: U16<BigEndian>,
    checksum: U16<BigEndian>,
}

impl UdpHeader {
    pub fn new(src_port: u16, dst_port: u16, length: u16) -> Self {
        UdpHeader {
            src_port: U16::new(src_port),
            dst_port: U16::new(dst_port),
            length: U16::new(length),
            checksum: U16::new(0),
        }
    }

    /// Returns the source port number
    #[inline]
    pub fn src_port(&self) -> u16 {
        self.src_port.get()
    }

    /// Returns the destination port number
    #[inline]
    pub fn dst_port(&self) -> u16 {
        self.dst_port.get()
    }

    /// Returns the total length of the UDP datagram (header + data)
    #[inline]
    pub fn length(&self) -> u16 {
        self.length.get()
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        self.checksum.get()
    }

    #[inline]
    pub fn set_checksum(&mut self, checksum: u16) {
        self.checksum = U16::new(checksum);
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        mem::size_of::<UdpHeader>()
    }

    /// Returns the length of the payload data
    #[inline]
    pub fn payload_len(&self) -> usize {
        let total = self.length() as usize;
        total.saturating_sub(Self::FIXED_LEN)
    }

    /// Validates the UDP header
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.length() >= Self::FIXED_LEN as u16
    }

    /// Verifies the checksum of `udp_data` (header included) against the pseudo-header.
    ///
    /// A zero checksum means none was computed and is always accepted.
    pub fn verify_checksum(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr, udp_data: &[u8]) -> bool {
        if self.checksum() == 0 {
            return true;
        }
        let sum = pseudo_header(src_ip, dst_ip, IpProto::UDP, udp_data.len());
        finish(accumulate(sum, udp_data)) == 0
    }

    /// Computes the checksum of `udp_data` (header included, checksum field zeroed).
    ///
    /// A computed zero is transmitted as `0xFFFF`.
    pub fn compute_checksum(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, udp_data: &[u8]) -> u16 {
        let sum = pseudo_header(src_ip, dst_ip, IpProto::UDP, udp_data.len());
        match finish(accumulate(sum, udp_data)) {
            0 => 0xFFFF,
            checksum => checksum,
        }
    }
}

impl PacketHeader for UdpHeader {
    const NAME: &'static str = "UdpHeader";

    #[inline]
    fn is_valid(&self) -> bool {
        self.is_valid()
    }

    type InnerType = ();

    #[inline]
    fn inner_type(&self) -> Self::InnerType {}
}

impl HeaderParser for UdpHeader {
    type Output<'a> = &'a UdpHeader;

    #[inline]
    fn into_view<'a>(header: &'a Self, _: &'a [u8]) -> Self::Output<'a> {
        header
    }
}

impl fmt::Display for UdpHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UDP {} -> {} len={}",
            self.src_port(),
            self.dst_port(),
            self.length()
        )
    }
}

/// Owned UDP layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UdpLayer {
    pub src_port: u16,
    pub dst_port: u16,
    /// When false the checksum field is sent as zero
    pub checksum_enabled: bool,
}

impl UdpLayer {
    pub fn new(src_port: u16, dst_port: u16) -> Self {
        UdpLayer {
            src_port,
            dst_port,
            checksum_enabled: true,
        }
    }

    pub fn without_checksum(mut self) -> Self {
        self.checksum_enabled = false;
        self
    }

    /// Header followed by `payload`.
    ///
    /// `addrs` are the source and destination of the enclosing IPv4 layer.
    /// Without them there is no pseudo-header and the checksum is sent as zero.
    pub fn encode(
        &self,
        payload: &[u8],
        addrs: Option<(Ipv4Addr, Ipv4Addr)>,
    ) -> Result<Vec<u8>, PacketHeaderError> {
        let length = u16::try_from(UdpHeader::FIXED_LEN + payload.len())
            .map_err(|_| PacketHeaderError::Other("UDP datagram exceeds 65535 bytes"))?;

        let mut out = Vec::with_capacity(length as usize);
        out.extend_from_slice(UdpHeader::new(self.src_port, self.dst_port, length).as_bytes());
        out.extend_from_slice(payload);

        if let (true, Some((src, dst))) = (self.checksum_enabled, addrs) {
            let checksum = UdpHeader::compute_checksum(src, dst, &out);
            out[6..8].copy_from_slice(&checksum.to_be_bytes());
        }
        Ok(out)
    }

    /// Parses a header, returning the layer and a payload bounded by the length field.
    ///
    /// The checksum is verified when the enclosing IPv4 addresses are known.
    pub fn decode(
        buf: &[u8],
        addrs: Option<(Ipv4Addr, Ipv4Addr)>,
    ) -> Result<(UdpLayer, &[u8]), PacketHeaderError> {
        let (header, _) = UdpHeader::from_bytes(buf).map_err(|err| match err {
            PacketHeaderError::Invalid(_) => {
                PacketHeaderError::Other("UDP length shorter than its header")
            }
            err => err,
        })?;

        let length = header.length() as usize;
        if length > buf.len() {
            return Err(PacketHeaderError::InsufficientLength(UdpHeader::NAME));
        }

        let datagram = &buf[..length];
        if let Some((src, dst)) = addrs {
            if !header.verify_checksum(src, dst, datagram) {
                return Err(PacketHeaderError::Checksum(UdpHeader::NAME));
            }
        }

        let layer = UdpLayer {
            src_port: header.src_port(),
            dst_port: header.dst_port(),
            checksum_enabled: header.checksum() != 0,
        };
        Ok((layer, &datagram[UdpHeader::FIXED_LEN..]))
    }
}

impl fmt::Display for UdpLayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "UDP {} -> {}", self.src_port, self.dst_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: Ipv4Addr = Ipv4Addr::new(192, 168, 231, 2);
    const DST: Ipv4Addr = Ipv4Addr::new(192, 168, 231, 1);

    // Inner UDP datagram of the CAPWAP data-path capture
    fn capture_datagram() -> Vec<u8> {
        let mut packet = vec![0x26, 0x94, 0x09, 0x29, 0x00, 0x13, 0x29, 0xfd];
        packet.extend_from_slice(b"The Payload");
        packet
    }

    #[test]
    fn test_udp_header_basic() {
        let header = UdpHeader::new(53, 12345, 16);

        assert_eq!(header.src_port(), 53);
        assert_eq!(header.dst_port(), 12345);
        assert_eq!(header.length(), 16);
        assert_eq!(header.header_len(), 8);
        assert_eq!(header.payload_len(), 8);
        assert!(header.is_valid());
        assert!(!UdpHeader::new(53, 12345, 7).is_valid());
    }

    #[test]
    fn test_udp_header_size() {
        assert_eq!(mem::size_of::<UdpHeader>(), 8);
        assert_eq!(UdpHeader::FIXED_LEN, 8);
    }

    #[test]
    fn test_udp_parsing_too_small() {
        assert!(UdpHeader::from_bytes(&[0u8; 7]).is_err());
    }

    #[test]
    fn test_udp_checksum_zero() {
        let header = UdpHeader::new(53, 12345, 8);
        assert!(header.verify_checksum(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, &[]));
    }

    #[test]
    fn test_udp_checksum_matches_capture() {
        let mut datagram = capture_datagram();
        let (header, _) = UdpHeader::from_bytes(&datagram).unwrap();
        assert!(header.verify_checksum(SRC, DST, &datagram));
        assert!(!header.verify_checksum(DST, Ipv4Addr::new(192, 168, 231, 3), &datagram));

        datagram[6..8].copy_from_slice(&[0, 0]);
        assert_eq!(UdpHeader::compute_checksum(SRC, DST, &datagram), 0x29fd);
    }

    #[test]
    fn test_layer_encode_matches_capture() {
        let layer = UdpLayer::new(0x2694, 0x0929);
        let encoded = layer.encode(b"The Payload", Some((SRC, DST))).unwrap();
        assert_eq!(encoded, capture_datagram());
    }

    #[test]
    fn test_layer_encode_without_checksum() {
        let layer = UdpLayer::new(58881, 58882).without_checksum();
        let encoded = layer.encode(b"abc", None).unwrap();
        assert_eq!(encoded, [0xe6, 0x01, 0xe6, 0x02, 0x00, 0x0b, 0x00, 0x00, b'a', b'b', b'c']);

        let (parsed, payload) = UdpLayer::decode(&encoded, Some((SRC, DST))).unwrap();
        assert_eq!(parsed, layer);
        assert_eq!(payload, b"abc");
    }

    #[test]
    fn test_layer_encode_without_addresses() {
        let encoded = UdpLayer::new(1, 2).encode(b"x", None).unwrap();
        assert_eq!(encoded, [0x00, 0x01, 0x00, 0x02, 0x00, 0x09, 0x00, 0x00, b'x']);
    }

    #[test]
    fn test_layer_decode() {
        let datagram = capture_datagram();
        let (layer, payload) = UdpLayer::decode(&datagram, Some((SRC, DST))).unwrap();
        assert_eq!(layer, UdpLayer::new(0x2694, 0x0929));
        assert_eq!(payload, b"The Payload");
    }

    #[test]
    fn test_layer_decode_length_exceeds_buffer() {
        let datagram = capture_datagram();
        assert_eq!(
            UdpLayer::decode(&datagram[..15], None).unwrap_err(),
            PacketHeaderError::InsufficientLength("UdpHeader")
        );
    }

    #[test]
    fn test_layer_decode_length_below_header() {
        let mut datagram = capture_datagram();
        datagram[4..6].copy_from_slice(&[0x00, 0x03]);
        assert_eq!(
            UdpLayer::decode(&datagram, None).unwrap_err(),
            PacketHeaderError::Other("UDP length shorter than its header")
        );
    }

    #[test]
    fn test_layer_decode_bad_checksum() {
        let mut datagram = capture_datagram();
        datagram[10] ^= 0xff;
        assert_eq!(
            UdpLayer::decode(&datagram, Some((SRC, DST))).unwrap_err(),
            PacketHeaderError::Checksum("UdpHeader")
        );
        // Not verifiable without the enclosing addresses
        assert!(UdpLayer::decode(&datagram, None).is_ok());
    }
}
