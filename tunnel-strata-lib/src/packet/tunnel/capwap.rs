//! CAPWAP data channel framing (RFC 5415, Open vSwitch flavour)
//!
//! Only the data-path shape is supported: an unfragmented IEEE 802.3 frame
//! (WBID 30) behind an 8-byte header, optionally followed by a Wireless
//! Specific Information block carrying a 64-bit tunnel key.
//!
//! # CAPWAP Header Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Preamble   |  HLEN   |   RID   | WBID    |T|F|L|W|M|K|Flags|
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Fragment ID          |     Frag Offset         |Rsvd |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    WSI len    |   WSI flags   |           Reserved            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! +                       Key (64 bits, W)                        +
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! HLEN counts 4-byte words: 2 for the bare header, 5 with the key block.
//!
//! # Examples
//!
//! ```
//! use tunnel_strata::packet::tunnel::capwap::CapwapLayer;
//!
//! let layer = CapwapLayer::new().with_key(1);
//! let framed = layer.encode(b"frame");
//! assert_eq!(&framed[..4], &[0x00, 0x28, 0x3c, 0x20]);
//!
//! let (parsed, inner) = CapwapLayer::decode(&framed).unwrap();
//! assert_eq!(parsed, layer);
//! assert_eq!(inner, b"frame");
//! ```

use std::fmt::{self, Formatter};

use zerocopy::byteorder::{BigEndian, U16, U32, U64};
use zerocopy::{FromBytes, IntoBytes, Unaligned};

use crate::config::CapwapConfig;
use crate::error::TunnelError;
use crate::packet::tunnel::{codec_error, TunnelCodec};
use crate::packet::{HeaderParser, PacketHeader, PacketHeaderError};
use crate::resolver::Addressing;
use crate::zone::EncapsulationKind;

/// UDP source port used by the data channel
pub const CAPWAP_SRC_PORT: u16 = 58881;
/// UDP destination port used by the data channel
pub const CAPWAP_DST_PORT: u16 = 58882;

/// Wireless binding ID of IEEE 802.3 frames
pub const WBID_IEEE_802_3: u8 = 30;

const WSI_FLAG_KEY64: u8 = 0x80;
const WSI_KEY_LEN: usize = std::mem::size_of::<CapwapWsiKey>();

/// Fixed part of the CAPWAP header
#[repr(C, packed)]
#[derive(
    FromBytes, IntoBytes, Unaligned, Debug, Clone, Copy, zerocopy::KnownLayout, zerocopy::Immutable,
)]
pub struct CapwapHeader {
    begin: U32<BigEndian>,
    frag_id: U16<BigEndian>,
    frag_off: U16<BigEndian>,
}

/// Wireless Specific Information block with a 64-bit key
#[repr(C, packed)]
#[derive(
    FromBytes, IntoBytes, Unaligned, Debug, Clone, Copy, zerocopy::KnownLayout, zerocopy::Immutable,
)]
pub struct CapwapWsiKey {
    wsi_len: u8,
    flags: u8,
    reserved: U16<BigEndian>,
    key: U64<BigEndian>,
}

impl CapwapWsiKey {
    pub fn new(key: u64) -> Self {
        CapwapWsiKey {
            // length of the block after this byte
            wsi_len: (WSI_KEY_LEN - 1) as u8,
            flags: WSI_FLAG_KEY64,
            reserved: U16::new(0),
            key: U64::new(key),
        }
    }

    #[inline]
    pub fn key(&self) -> Option<u64> {
        if self.flags & WSI_FLAG_KEY64 != 0 && self.wsi_len as usize + 1 >= WSI_KEY_LEN {
            Some(self.key.get())
        } else {
            None
        }
    }
}

impl CapwapHeader {
    const PREAMBLE_MASK: u32 = 0xFF00_0000;
    const HLEN_MASK: u32 = 0x00F8_0000;
    const HLEN_SHIFT: u32 = 19;
    const RID_MASK: u32 = 0x0007_C000;
    const RID_SHIFT: u32 = 14;
    const WBID_MASK: u32 = 0x0000_3E00;
    const WBID_SHIFT: u32 = 9;

    pub const FLAG_T: u32 = 0x100; // native frame format
    pub const FLAG_F: u32 = 0x80; // fragment
    pub const FLAG_L: u32 = 0x40; // last fragment
    pub const FLAG_W: u32 = 0x20; // wireless specific info present
    pub const FLAG_M: u32 = 0x10; // radio MAC present
    pub const FLAG_K: u32 = 0x08; // keep-alive
    const FLAGS_MASK: u32 = 0x1FF;

    const FRAG_OFF_MASK: u16 = 0xFFF8;

    /// Header of `hlen` bytes for an unfragmented frame
    pub fn new(hlen: usize, radio_id: u8, wbid: u8, flags: u32) -> Self {
        let words = (hlen / 4) as u32;
        let begin = ((words << Self::HLEN_SHIFT) & Self::HLEN_MASK)
            | (((radio_id as u32) << Self::RID_SHIFT) & Self::RID_MASK)
            | (((wbid as u32) << Self::WBID_SHIFT) & Self::WBID_MASK)
            | (flags & Self::FLAGS_MASK);
        CapwapHeader {
            begin: U32::new(begin),
            frag_id: U16::new(0),
            frag_off: U16::new(0),
        }
    }

    #[inline]
    fn begin(&self) -> u32 {
        self.begin.get()
    }

    /// Version and type nibbles; zero for CAPWAP
    #[inline]
    pub fn preamble(&self) -> u8 {
        ((self.begin() & Self::PREAMBLE_MASK) >> 24) as u8
    }

    /// Header length in bytes
    #[inline]
    pub fn hlen(&self) -> usize {
        (((self.begin() & Self::HLEN_MASK) >> Self::HLEN_SHIFT) as usize) * 4
    }

    #[inline]
    pub fn radio_id(&self) -> u8 {
        ((self.begin() & Self::RID_MASK) >> Self::RID_SHIFT) as u8
    }

    #[inline]
    pub fn wbid(&self) -> u8 {
        ((self.begin() & Self::WBID_MASK) >> Self::WBID_SHIFT) as u8
    }

    #[inline]
    pub fn flags(&self) -> u32 {
        self.begin() & Self::FLAGS_MASK
    }

    #[inline]
    pub fn has_wsi(&self) -> bool {
        self.flags() & Self::FLAG_W != 0
    }

    #[inline]
    pub fn frag_id(&self) -> u16 {
        self.frag_id.get()
    }

    #[inline]
    pub fn frag_offset(&self) -> u16 {
        (self.frag_off.get() & Self::FRAG_OFF_MASK) >> 3
    }

    #[inline]
    pub fn is_fragment(&self) -> bool {
        self.flags() & (Self::FLAG_F | Self::FLAG_L) != 0 || self.frag_offset() != 0
    }
}

impl PacketHeader for CapwapHeader {
    const NAME: &'static str = "CapwapHeader";
    type InnerType = u8;

    #[inline]
    fn inner_type(&self) -> Self::InnerType {
        self.wbid()
    }

    #[inline]
    fn total_len(&self, _buf: &[u8]) -> usize {
        self.hlen()
    }

    #[inline]
    fn is_valid(&self) -> bool {
        self.preamble() == 0 && self.hlen() >= Self::FIXED_LEN
    }
}

/// CAPWAP header with its optional part
#[derive(Debug, Clone)]
pub struct CapwapHeaderOpt<'a> {
    pub header: &'a CapwapHeader,
    pub raw_options: &'a [u8],
}

impl CapwapHeaderOpt<'_> {
    /// The 64-bit key from the WSI block, if any
    pub fn key(&self) -> Option<u64> {
        if !self.header.has_wsi() {
            return None;
        }
        CapwapWsiKey::ref_from_prefix(self.raw_options)
            .ok()
            .and_then(|(wsi, _)| wsi.key())
    }
}

impl std::ops::Deref for CapwapHeaderOpt<'_> {
    type Target = CapwapHeader;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.header
    }
}

impl HeaderParser for CapwapHeader {
    type Output<'a> = CapwapHeaderOpt<'a>;

    #[inline]
    fn into_view<'a>(header: &'a Self, raw_options: &'a [u8]) -> Self::Output<'a> {
        CapwapHeaderOpt {
            header,
            raw_options,
        }
    }
}

impl fmt::Display for CapwapHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CAPWAP hlen={} rid={} wbid={} flags=0x{:03x}",
            self.hlen(),
            self.radio_id(),
            self.wbid(),
            self.flags()
        )
    }
}

/// Owned CAPWAP data layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapwapLayer {
    pub radio_id: u8,
    pub wbid: u8,
    pub key: Option<u64>,
}

impl Default for CapwapLayer {
    fn default() -> Self {
        CapwapLayer::new()
    }
}

impl CapwapLayer {
    pub fn new() -> Self {
        CapwapLayer {
            radio_id: 0,
            wbid: WBID_IEEE_802_3,
            key: None,
        }
    }

    pub fn with_key(mut self, key: u64) -> Self {
        self.key = Some(key);
        self
    }

    pub fn header_len(&self) -> usize {
        match self.key {
            Some(_) => CapwapHeader::FIXED_LEN + WSI_KEY_LEN,
            None => CapwapHeader::FIXED_LEN,
        }
    }

    /// Header followed by `payload`
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let hlen = self.header_len();
        let flags = if self.key.is_some() { CapwapHeader::FLAG_W } else { 0 };
        let header = CapwapHeader::new(hlen, self.radio_id, self.wbid, flags);

        let mut out = Vec::with_capacity(hlen + payload.len());
        out.extend_from_slice(header.as_bytes());
        if let Some(key) = self.key {
            out.extend_from_slice(CapwapWsiKey::new(key).as_bytes());
        }
        out.extend_from_slice(payload);
        out
    }

    /// Parses an unfragmented data header.
    ///
    /// Header shapes this layer cannot reproduce (fragments, radio MAC,
    /// keep-alives, native frames, unknown WSI content) are `Invalid`.
    pub fn decode(buf: &[u8]) -> Result<(CapwapLayer, &[u8]), PacketHeaderError> {
        let (view, payload) = CapwapHeader::from_bytes(buf)?;

        if view.is_fragment() {
            return Err(PacketHeaderError::Invalid("CapwapHeader fragment"));
        }
        if view.flags() & !CapwapHeader::FLAG_W != 0 {
            return Err(PacketHeaderError::Invalid("CapwapHeader flags"));
        }

        let key = view.key();
        let layer = CapwapLayer {
            radio_id: view.radio_id(),
            wbid: view.wbid(),
            key,
        };
        if (view.has_wsi() && key.is_none()) || view.hlen() != layer.header_len() {
            return Err(PacketHeaderError::Invalid("CapwapHeader wireless info"));
        }
        Ok((layer, payload))
    }
}

impl fmt::Display for CapwapLayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "CAPWAP rid={} wbid={}", self.radio_id, self.wbid)?;
        if let Some(key) = self.key {
            write!(f, " key={}", key)?;
        }
        Ok(())
    }
}

/// CAPWAP codec framing IEEE 802.3 frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapwapCodec {
    /// Tunnel key; when set it is sent in the WSI block and required on receipt
    pub key: Option<u64>,
}

impl CapwapCodec {
    fn layer(&self) -> CapwapLayer {
        CapwapLayer {
            key: self.key,
            ..CapwapLayer::new()
        }
    }
}

impl From<&CapwapConfig> for CapwapCodec {
    fn from(config: &CapwapConfig) -> Self {
        CapwapCodec { key: config.key }
    }
}

impl TunnelCodec for CapwapCodec {
    fn kind(&self) -> EncapsulationKind {
        EncapsulationKind::Capwap
    }

    fn wrap(&self, inner: &[u8], addressing: &Addressing) -> Vec<u8> {
        tracing::trace!(src = %addressing.src_ip, dst = %addressing.dst_ip, len = inner.len(), "capwap wrap");
        self.layer().encode(inner)
    }

    fn unwrap<'a>(&self, bytes: &'a [u8]) -> Result<&'a [u8], TunnelError> {
        let (layer, inner) =
            CapwapLayer::decode(bytes).map_err(|e| codec_error(e, bytes.len()))?;

        if layer.wbid != WBID_IEEE_802_3 {
            return Err(TunnelError::UnsupportedVariant("CAPWAP wireless binding"));
        }
        if self.key.is_some() && layer.key != self.key {
            return Err(TunnelError::UnsupportedVariant("CAPWAP key"));
        }
        Ok(inner)
    }
}
