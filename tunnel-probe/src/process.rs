use tunnel_strata::{EncapsulationKind, Tunneler, ZoneStore};

use crate::packet_metadata::CapturedFrame;
use crate::stats::{LocalStats, Stats, FLUSH_INTERVAL};

/// Decapsulates one captured frame and counts the outcome
pub fn process_frame<S: ZoneStore>(
    frame: CapturedFrame<'_>,
    tunneler: &Tunneler<S>,
    kind: EncapsulationKind,
    local_stats: &mut LocalStats,
    stats: &Stats,
    dump: bool,
) {
    local_stats.total_packets += 1;
    local_stats.total_bytes += frame.data.len() as u64;

    if dump {
        println!(
            "{:>5}   {} ({} bytes)",
            local_stats.total_packets,
            frame.timestamp,
            frame.data.len()
        );
    }

    match tunneler.decapsulate_as(kind, frame.data) {
        Ok(decapsulated) => {
            local_stats.decapsulated += 1;
            match decapsulated.inner.serialize() {
                Ok(inner) => local_stats.inner_bytes += inner.len() as u64,
                Err(err) => {
                    tracing::debug!(frame = local_stats.total_packets, error = %err, "inner frame not re-serializable")
                }
            }
            if dump {
                println!("        {}", decapsulated.observed);
                println!("        {}", decapsulated.inner);
            }
        }
        Err(err) => {
            tracing::debug!(frame = local_stats.total_packets, error = %err, kind = err.kind(), "not decapsulated");
            if dump {
                println!("        {err}");
            }
            local_stats.record_error(&err);
        }
    }

    if local_stats.should_flush(FLUSH_INTERVAL) {
        local_stats.flush(stats);
    }
}
