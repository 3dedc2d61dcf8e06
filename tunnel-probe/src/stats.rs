use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use tunnel_strata::TunnelError;

/// Per-reader counters, flushed into the shared [`Stats`] every
/// [`FLUSH_INTERVAL`] frames and once at the end.
#[derive(Default, Debug, Clone)]
pub struct LocalStats {
    pub total_packets: u64,
    pub total_bytes: u64,

    pub decapsulated: u64,
    pub inner_bytes: u64,

    pub malformed_frame: u64,
    pub truncated_header: u64,
    pub unsupported_variant: u64,
    pub unexpected_ethertype: u64,
    pub unexpected_protocol: u64,
    pub unexpected_port: u64,
    pub other_errors: u64,
}

impl LocalStats {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_error(&mut self, err: &TunnelError) {
        let counter = match err {
            TunnelError::MalformedFrame(_) => &mut self.malformed_frame,
            TunnelError::TruncatedHeader { .. } => &mut self.truncated_header,
            TunnelError::UnsupportedVariant(_) => &mut self.unsupported_variant,
            TunnelError::UnexpectedEtherType(_) => &mut self.unexpected_ethertype,
            TunnelError::UnexpectedProtocol(_) => &mut self.unexpected_protocol,
            TunnelError::UnexpectedPort { .. } => &mut self.unexpected_port,
            _ => &mut self.other_errors,
        };
        *counter += 1;
    }

    /// Adds every non-zero counter to `stats` and resets it
    #[inline]
    pub fn flush(&mut self, stats: &Stats) {
        macro_rules! flush_counter {
            ($($field:ident),+ $(,)?) => {
                $(
                    if self.$field > 0 {
                        stats.$field.fetch_add(self.$field, Ordering::Relaxed);
                        self.$field = 0;
                    }
                )+
            };
        }

        flush_counter!(
            total_packets,
            total_bytes,
            decapsulated,
            inner_bytes,
            malformed_frame,
            truncated_header,
            unsupported_variant,
            unexpected_ethertype,
            unexpected_protocol,
            unexpected_port,
            other_errors,
        );
    }

    /// True every `interval` frames; `interval` must be a power of 2
    #[inline]
    pub fn should_flush(&self, interval: u64) -> bool {
        self.total_packets & (interval - 1) == 0
    }
}

pub const FLUSH_INTERVAL: u64 = 1024;

#[derive(Default, Debug)]
pub struct Stats {
    pub total_packets: AtomicU64,
    pub total_bytes: AtomicU64,

    pub decapsulated: AtomicU64,
    pub inner_bytes: AtomicU64,

    pub malformed_frame: AtomicU64,
    pub truncated_header: AtomicU64,
    pub unsupported_variant: AtomicU64,
    pub unexpected_ethertype: AtomicU64,
    pub unexpected_protocol: AtomicU64,
    pub unexpected_port: AtomicU64,
    pub other_errors: AtomicU64,
}

impl Stats {
    #[inline]
    fn get(&self, counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Frames of another encapsulation (or none at all)
    pub fn total_mismatched(&self) -> u64 {
        self.get(&self.unsupported_variant)
            + self.get(&self.unexpected_ethertype)
            + self.get(&self.unexpected_protocol)
            + self.get(&self.unexpected_port)
    }

    /// Frames of the expected encapsulation that failed to decode
    pub fn total_corrupt(&self) -> u64 {
        self.get(&self.malformed_frame) + self.get(&self.truncated_header)
    }
}

impl Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Tunnel Statistics ===")?;
        writeln!(f)?;

        writeln!(f, "--- General ---")?;
        writeln!(f, "Frames read: {}", self.get(&self.total_packets))?;
        writeln!(f, "Bytes read: {}", self.get(&self.total_bytes))?;
        writeln!(f, "Decapsulated: {}", self.get(&self.decapsulated))?;
        writeln!(f, "Inner bytes: {}", self.get(&self.inner_bytes))?;
        writeln!(f)?;

        writeln!(f, "--- Protocol mismatch ---")?;
        writeln!(f, "Total: {}", self.total_mismatched())?;
        writeln!(f, "  Unexpected EtherType: {}", self.get(&self.unexpected_ethertype))?;
        writeln!(f, "  Unexpected IP protocol: {}", self.get(&self.unexpected_protocol))?;
        writeln!(f, "  Unexpected UDP port: {}", self.get(&self.unexpected_port))?;
        writeln!(f, "  Unsupported variant: {}", self.get(&self.unsupported_variant))?;
        writeln!(f)?;

        writeln!(f, "--- Corrupt ---")?;
        writeln!(f, "Total: {}", self.total_corrupt())?;
        writeln!(f, "  Malformed frame: {}", self.get(&self.malformed_frame))?;
        writeln!(f, "  Truncated header: {}", self.get(&self.truncated_header))?;

        let other = self.get(&self.other_errors);
        if other > 0 {
            writeln!(f)?;
            writeln!(f, "Other errors: {}", other)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunnel_strata::packet::protocol::IpProto;
    use tunnel_strata::packet::PacketHeaderError;

    #[test]
    fn test_record_and_flush() {
        let stats = Stats::default();
        let mut local = LocalStats::new();

        local.total_packets = 3;
        local.decapsulated = 1;
        local.record_error(&TunnelError::UnexpectedProtocol(IpProto::GRE));
        local.record_error(&TunnelError::MalformedFrame(PacketHeaderError::Checksum(
            "UdpHeader",
        )));
        local.flush(&stats);

        assert_eq!(local.total_packets, 0);
        assert_eq!(stats.get(&stats.total_packets), 3);
        assert_eq!(stats.total_mismatched(), 1);
        assert_eq!(stats.total_corrupt(), 1);

        let text = stats.to_string();
        assert!(text.contains("Decapsulated: 1"));
        assert!(!text.contains("Other errors"));
    }

    #[test]
    fn test_should_flush() {
        let mut local = LocalStats::new();
        local.total_packets = FLUSH_INTERVAL;
        assert!(local.should_flush(FLUSH_INTERVAL));
        local.total_packets += 1;
        assert!(!local.should_flush(FLUSH_INTERVAL));
    }
}
