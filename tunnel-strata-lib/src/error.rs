//! Crate-level error taxonomy
//!
//! Every public operation either fully succeeds or fails with exactly one
//! [`TunnelError`]; nothing is retried internally.

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::packet::protocol::{EtherProto, IpProto};
use crate::packet::PacketHeaderError;
use crate::zone::{HostId, StoreError, ZoneId};

#[derive(Debug, Error)]
pub enum TunnelError {
    /// A declared length or checksum disagrees with the bytes received
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] PacketHeaderError),

    #[error("truncated {header} header ({available} bytes available)")]
    TruncatedHeader {
        header: &'static str,
        available: usize,
    },

    #[error("unsupported tunnel header variant: {0}")]
    UnsupportedVariant(&'static str),

    #[error("unexpected ethertype {0}")]
    UnexpectedEtherType(EtherProto),

    #[error("unexpected ip protocol {0}")]
    UnexpectedProtocol(IpProto),

    /// The carrier was UDP but not addressed to a tunnel port
    #[error("unexpected udp ports {src} -> {dst}")]
    UnexpectedPort { src: u16, dst: u16 },

    #[error("host {host} has no membership in zone {zone}")]
    MembershipMissing { zone: ZoneId, host: HostId },

    #[error("tunnel zone {0} does not exist")]
    ZoneMissing(ZoneId),

    #[error("no peer reachable at {0}")]
    PeerUnknown(Ipv4Addr),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("transport: {0}")]
    Io(#[from] std::io::Error),
}

impl TunnelError {
    /// True for the errors that mean "wrong protocol" rather than "corrupt data"
    pub fn is_protocol_mismatch(&self) -> bool {
        matches!(
            self,
            TunnelError::UnsupportedVariant(_)
                | TunnelError::UnexpectedEtherType(_)
                | TunnelError::UnexpectedProtocol(_)
                | TunnelError::UnexpectedPort { .. }
        )
    }

    /// Short stable label, used for counters and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            TunnelError::MalformedFrame(_) => "malformed-frame",
            TunnelError::TruncatedHeader { .. } => "truncated-header",
            TunnelError::UnsupportedVariant(_) => "unsupported-variant",
            TunnelError::UnexpectedEtherType(_) => "unexpected-ethertype",
            TunnelError::UnexpectedProtocol(_) => "unexpected-protocol",
            TunnelError::UnexpectedPort { .. } => "unexpected-port",
            TunnelError::MembershipMissing { .. } => "membership-missing",
            TunnelError::ZoneMissing(_) => "zone-missing",
            TunnelError::PeerUnknown(_) => "peer-unknown",
            TunnelError::Store(_) => "store",
            TunnelError::Io(_) => "io",
        }
    }
}
