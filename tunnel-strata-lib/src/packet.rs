//! Wire headers and the layered frame model
//!
//! Fixed-size headers are `#[repr(C, packed)]` zerocopy structs: they are parsed
//! in place through [`HeaderParser::from_bytes`] and emitted through
//! `IntoBytes::as_bytes`. The owned [`frame::LayeredFrame`] stacks them into a
//! whole frame and takes care of lengths and checksums.

use std::mem;
use thiserror::Error;
use zerocopy::{FromBytes, Immutable, KnownLayout, Ref, Unaligned};

pub mod checksum;
pub mod ether;
pub mod frame;
pub mod ipv4;
pub mod protocol;
pub mod tunnel;
pub mod udp;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketHeaderError {
    #[error("buffer too short for {0}")]
    TooShort(&'static str),
    #[error("invalid {0}")]
    Invalid(&'static str),
    #[error("insufficient buffer length for {0}")]
    InsufficientLength(&'static str),
    #[error("bad checksum in {0}")]
    Checksum(&'static str),
    #[error("{0}")]
    Other(&'static str),
}

pub trait PacketHeader: Sized {
    const FIXED_LEN: usize = mem::size_of::<Self>();
    const NAME: &'static str;
    type InnerType;

    /// return the inner type of the header
    fn inner_type(&self) -> Self::InnerType;

    /// Returns the length of the header including any variable part
    fn total_len(&self, buf: &[u8]) -> usize {
        let _ = buf;
        Self::FIXED_LEN
    }

    /// check whether the header is valid
    #[inline]
    fn is_valid(&self) -> bool {
        true
    }
}

pub trait HeaderParser: PacketHeader + FromBytes + KnownLayout + Immutable + Unaligned {
    /// The view returned to the user: `&'a Self` for fixed headers or a
    /// wrapper carrying the variable part.
    type Output<'a>
    where
        Self: 'a;

    /// Builds the view from the fixed header and its variable-length tail
    fn into_view<'a>(header: &'a Self, options: &'a [u8]) -> Self::Output<'a>;

    /// Parses the header in place, returning the view and the bytes that follow it
    #[inline]
    fn from_bytes<'a>(buf: &'a [u8]) -> Result<(Self::Output<'a>, &'a [u8]), PacketHeaderError> {
        let (header_ref, rest_buf) = Ref::<_, Self>::from_prefix(buf)
            .map_err(|_| PacketHeaderError::TooShort(Self::NAME))?;

        if !header_ref.is_valid() {
            return Err(PacketHeaderError::Invalid(Self::NAME));
        }

        let header = Ref::into_ref(header_ref);

        let total_len = header.total_len(buf);
        if total_len < Self::FIXED_LEN {
            return Err(PacketHeaderError::Invalid(Self::NAME));
        }

        let options_len = total_len - Self::FIXED_LEN;
        if rest_buf.len() < options_len {
            return Err(PacketHeaderError::TooShort(Self::NAME));
        }

        let (options, payload) = rest_buf.split_at(options_len);

        Ok((Self::into_view(header, options), payload))
    }
}
