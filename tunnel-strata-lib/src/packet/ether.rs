//! Ethernet II header
//!
//! # Ethernet II Header Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! +                    Destination MAC Address                    +
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! +                      Source MAC Address                       +
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           EtherType           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Both the outer (physical) frame and the inner (virtual) frame of a tunnel
//! start with this header. VLAN tags are not interpreted: an 802.1Q ethertype
//! simply ends layer decoding.
//!
//! # Examples
//!
//! ```
//! use tunnel_strata::packet::ether::{EthAddr, EtherHeader};
//! use tunnel_strata::packet::protocol::EtherProto;
//! use tunnel_strata::packet::HeaderParser;
//! use zerocopy::IntoBytes;
//!
//! let dest: EthAddr = "bb:bb:bb:dd:dd:dd".parse().unwrap();
//! let source: EthAddr = "aa:aa:aa:cc:cc:cc".parse().unwrap();
//! let header = EtherHeader::new(dest, source, EtherProto::IPV4);
//!
//! let (parsed, rest) = EtherHeader::from_bytes(header.as_bytes()).unwrap();
//! assert_eq!(parsed.protocol(), EtherProto::IPV4);
//! assert_eq!(parsed.source().to_string(), "aa:aa:aa:cc:cc:cc");
//! assert!(rest.is_empty());
//! ```

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::packet::protocol::EtherProto;
use crate::packet::{HeaderParser, PacketHeader};

const ETH_ALEN: usize = 6;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
    Serialize,
    Deserialize,
)]
#[repr(transparent)]
#[serde(into = "String")]
#[serde(try_from = "String")]
pub struct EthAddr([u8; ETH_ALEN]);

impl EthAddr {
    pub const BROADCAST: EthAddr = EthAddr([0xff; ETH_ALEN]);

    #[inline]
    pub const fn new(octets: [u8; ETH_ALEN]) -> Self {
        EthAddr(octets)
    }

    #[inline]
    pub fn octets(&self) -> [u8; ETH_ALEN] {
        self.0
    }

    #[inline]
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl Display for EthAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EtherError {
    #[error("Invalid Ethernet address format")]
    InvalidAddressFormat,
}

impl FromStr for EthAddr {
    type Err = EtherError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: Vec<u8> = s
            .split(':')
            .map(|part| {
                if part.is_empty() || part.len() > 2 {
                    return Err(EtherError::InvalidAddressFormat);
                }
                u8::from_str_radix(part, 16).map_err(|_| EtherError::InvalidAddressFormat)
            })
            .collect::<Result<Vec<u8>, _>>()?;

        let addr: [u8; ETH_ALEN] = bytes
            .try_into()
            .map_err(|_| EtherError::InvalidAddressFormat)?;
        Ok(EthAddr(addr))
    }
}

impl From<[u8; ETH_ALEN]> for EthAddr {
    #[inline]
    fn from(octets: [u8; ETH_ALEN]) -> Self {
        EthAddr(octets)
    }
}

impl From<EthAddr> for String {
    #[inline]
    fn from(addr: EthAddr) -> Self {
        addr.to_string()
    }
}

impl TryFrom<String> for EthAddr {
    type Error = EtherError;
    #[inline]
    fn try_from(s: String) -> Result<Self, Self::Error> {
        EthAddr::from_str(&s)
    }
}

#[repr(C, packed)]
#[derive(FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout, Debug, Clone, Copy)]
pub struct EtherHeader {
    dest: EthAddr,
    source: EthAddr,
    proto: EtherProto,
}

impl EtherHeader {
    #[inline]
    pub fn new(dest: EthAddr, source: EthAddr, proto: EtherProto) -> Self {
        EtherHeader {
            dest,
            source,
            proto,
        }
    }

    #[inline]
    pub fn dest(&self) -> EthAddr {
        self.dest
    }

    #[inline]
    pub fn source(&self) -> EthAddr {
        self.source
    }

    #[inline]
    pub fn protocol(&self) -> EtherProto {
        self.proto
    }
}

impl PacketHeader for EtherHeader {
    const NAME: &'static str = "EtherHeader";
    type InnerType = EtherProto;

    #[inline]
    fn inner_type(&self) -> Self::InnerType {
        self.proto
    }
}

impl HeaderParser for EtherHeader {
    type Output<'a> = &'a EtherHeader;

    #[inline]
    fn into_view<'a>(header: &'a Self, _options: &'a [u8]) -> Self::Output<'a> {
        header
    }
}

impl Display for EtherHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ethernet {} -> {} proto={}",
            self.source(),
            self.dest(),
            self.protocol()
        )
    }
}

/// Owned Ethernet layer of a [`LayeredFrame`](crate::packet::frame::LayeredFrame)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EthernetLayer {
    pub dest: EthAddr,
    pub source: EthAddr,
    pub ethertype: EtherProto,
}

impl EthernetLayer {
    /// Ethernet layer carrying IPv4, the common case on both sides of a tunnel
    pub fn new(source: EthAddr, dest: EthAddr) -> Self {
        EthernetLayer {
            dest,
            source,
            ethertype: EtherProto::IPV4,
        }
    }

    pub fn with_ethertype(mut self, ethertype: EtherProto) -> Self {
        self.ethertype = ethertype;
        self
    }

    pub fn header(&self) -> EtherHeader {
        EtherHeader::new(self.dest, self.source, self.ethertype)
    }
}

impl From<&EtherHeader> for EthernetLayer {
    fn from(header: &EtherHeader) -> Self {
        EthernetLayer {
            dest: header.dest(),
            source: header.source(),
            ethertype: header.protocol(),
        }
    }
}

impl Display for EthernetLayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.header().fmt(f)
    }
}
