//! Tunnel header codecs
//!
//! Each carrier protocol has a zero-copy header parser, an owned layer for the
//! [`LayeredFrame`](crate::packet::frame::LayeredFrame) model and a
//! [`TunnelCodec`] that frames an already-serialized inner frame.
//!
//! | Protocol | Module | Carrier |
//! |----------|--------|---------|
//! | [GRE](gre) | `gre` | IP protocol 47, protocol type TEB (0x6558) |
//! | [CAPWAP](capwap) | `capwap` | UDP 58881 -> 58882, WBID 30 (IEEE 802.3) |
//!
//! # Usage Example
//!
//! ```
//! use tunnel_strata::packet::tunnel::gre::GreCodec;
//! use tunnel_strata::packet::tunnel::TunnelCodec;
//! use tunnel_strata::resolver::Addressing;
//! use std::net::Ipv4Addr;
//!
//! let addressing = Addressing::new(
//!     Ipv4Addr::new(10, 0, 0, 1),
//!     Ipv4Addr::new(10, 0, 0, 2),
//! );
//!
//! let codec = GreCodec::default();
//! let framed = codec.wrap(b"inner frame", &addressing);
//! assert_eq!(&framed[..4], &[0x00, 0x00, 0x65, 0x58]);
//! assert_eq!(codec.unwrap(&framed).unwrap(), b"inner frame");
//! ```

pub mod capwap;
pub mod gre;

use crate::error::TunnelError;
use crate::packet::PacketHeaderError;
use crate::resolver::Addressing;
use crate::zone::EncapsulationKind;

/// Frames and unframes inner bytes for one encapsulation kind.
///
/// Codecs hold only their configuration and are safe to share across threads.
/// `unwrap(wrap(p, a)) == p` for every payload `p`.
pub trait TunnelCodec: Send + Sync {
    /// The encapsulation kind this codec speaks
    fn kind(&self) -> EncapsulationKind;

    /// Returns the tunnel header followed by `inner`
    fn wrap(&self, inner: &[u8], addressing: &Addressing) -> Vec<u8>;

    /// Strips the tunnel header, returning the inner bytes
    fn unwrap<'a>(&self, bytes: &'a [u8]) -> Result<&'a [u8], TunnelError>;
}

/// Maps a header parsing failure to the codec error taxonomy
pub(crate) fn codec_error(err: PacketHeaderError, available: usize) -> TunnelError {
    match err {
        PacketHeaderError::TooShort(header) | PacketHeaderError::InsufficientLength(header) => {
            TunnelError::TruncatedHeader { header, available }
        }
        PacketHeaderError::Invalid(header) => TunnelError::UnsupportedVariant(header),
        other => TunnelError::MalformedFrame(other),
    }
}
