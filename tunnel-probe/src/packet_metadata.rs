use std::fmt::{self, Display};

use chrono::DateTime;
use pcap_parser::{EnhancedPacketBlock, LegacyPcapBlock, SimplePacketBlock};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimestampNsec(u64);

impl TimestampNsec {
    pub fn from_micros(sec: u32, usec: u32) -> Self {
        TimestampNsec(sec as u64 * 1_000_000_000 + usec as u64 * 1000)
    }
}

impl Display for TimestampNsec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0 / 1_000_000_000;
        let nanos = (self.0 % 1_000_000_000) as u32;
        match DateTime::from_timestamp(secs as i64, nanos) {
            Some(date_time) if !f.alternate() => {
                write!(f, "{}", date_time.format("%Y-%m-%d %H:%M:%S%.6f UTC"))
            }
            _ => write!(f, "{}.{:09}", secs, nanos),
        }
    }
}

/// One captured link-layer frame, whatever block it came from
#[derive(Clone, Copy, Debug)]
pub struct CapturedFrame<'a> {
    pub timestamp: TimestampNsec,
    pub data: &'a [u8],
}

impl<'a> From<&LegacyPcapBlock<'a>> for CapturedFrame<'a> {
    fn from(block: &LegacyPcapBlock<'a>) -> Self {
        CapturedFrame {
            timestamp: TimestampNsec::from_micros(block.ts_sec, block.ts_usec),
            data: block.data,
        }
    }
}

impl<'a> From<&EnhancedPacketBlock<'a>> for CapturedFrame<'a> {
    fn from(block: &EnhancedPacketBlock<'a>) -> Self {
        let raw_ts = ((block.ts_high as u64) << 32) | (block.ts_low as u64);

        // The interface resolution is not tracked: a raw value that reads as
        // seconds between 1973 and 2096 once divided by 10^9 is taken as
        // nanoseconds, anything else as microseconds.
        let timestamp = if (100_000_000..=4_000_000_000).contains(&(raw_ts / 1_000_000_000)) {
            TimestampNsec(raw_ts)
        } else {
            TimestampNsec(raw_ts * 1000)
        };

        let caplen = (block.caplen as usize).min(block.data.len());
        CapturedFrame {
            timestamp,
            data: &block.data[..caplen],
        }
    }
}

impl<'a> From<&SimplePacketBlock<'a>> for CapturedFrame<'a> {
    fn from(block: &SimplePacketBlock<'a>) -> Self {
        let caplen = (block.origlen as usize).min(block.data.len());
        CapturedFrame {
            timestamp: TimestampNsec::default(),
            data: &block.data[..caplen],
        }
    }
}
