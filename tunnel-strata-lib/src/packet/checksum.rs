//! RFC 1071 Internet checksum
//!
//! Shared by the IPv4 header, UDP (with its pseudo-header) and the optional
//! GRE checksum. A buffer that already carries a correct checksum sums to zero.

use std::net::Ipv4Addr;

use crate::packet::protocol::IpProto;

/// Adds `data` to a running 32-bit one's complement accumulator
#[inline]
pub fn accumulate(mut sum: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        sum = sum.wrapping_add(u16::from_be_bytes([word[0], word[1]]) as u32);
    }
    // Odd length: pad with zero
    if let [last] = chunks.remainder() {
        sum = sum.wrapping_add(u16::from_be_bytes([*last, 0]) as u32);
    }
    sum
}

/// Folds the accumulator to 16 bits and returns its one's complement
#[inline]
pub fn finish(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Checksum of a contiguous buffer
#[inline]
pub fn internet_checksum(data: &[u8]) -> u16 {
    finish(accumulate(0, data))
}

/// Accumulator seeded with the IPv4 pseudo-header used by UDP and TCP
#[inline]
pub fn pseudo_header(src: Ipv4Addr, dst: Ipv4Addr, proto: IpProto, len: usize) -> u32 {
    let mut sum = accumulate(0, &src.octets());
    sum = accumulate(sum, &dst.octets());
    sum = sum.wrapping_add(u8::from(proto) as u32);
    sum.wrapping_add(len as u32)
}
