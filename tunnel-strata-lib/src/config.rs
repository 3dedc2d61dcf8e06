//! Tunneling configuration
//!
//! Every field has a default, so a partial document (or none at all) is a
//! valid configuration:
//!
//! ```
//! use tunnel_strata::config::TunnelConfig;
//!
//! let config = TunnelConfig::default();
//! assert_eq!(config.ttl, 64);
//! assert_eq!(config.capwap.dst_port, 58882);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::packet::tunnel::capwap::{CAPWAP_DST_PORT, CAPWAP_SRC_PORT};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("outer ttl must be non-zero")]
    ZeroTtl,
    #[error("capwap {0} port must be non-zero")]
    ZeroPort(&'static str),
    #[error("capwap source and destination ports are both {0}")]
    SamePorts(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TunnelConfig {
    /// TTL of the outer IPv4 header
    pub ttl: u8,
    pub capwap: CapwapConfig,
    pub gre: GreConfig,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        TunnelConfig {
            ttl: 64,
            capwap: CapwapConfig::default(),
            gre: GreConfig::default(),
        }
    }
}

impl TunnelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl == 0 {
            return Err(ConfigError::ZeroTtl);
        }
        if self.capwap.src_port == 0 {
            return Err(ConfigError::ZeroPort("source"));
        }
        if self.capwap.dst_port == 0 {
            return Err(ConfigError::ZeroPort("destination"));
        }
        if self.capwap.src_port == self.capwap.dst_port {
            return Err(ConfigError::SamePorts(self.capwap.src_port));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapwapConfig {
    pub src_port: u16,
    pub dst_port: u16,
    /// 64-bit key carried in the wireless specific information block
    pub key: Option<u64>,
    /// Compute the outer UDP checksum (sent as zero otherwise)
    pub udp_checksum: bool,
}

impl Default for CapwapConfig {
    fn default() -> Self {
        CapwapConfig {
            src_port: CAPWAP_SRC_PORT,
            dst_port: CAPWAP_DST_PORT,
            key: None,
            udp_checksum: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GreConfig {
    pub key: Option<u32>,
    pub checksum: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document() {
        let config: TunnelConfig =
            serde_json::from_str(r#"{ "capwap": { "key": 1 }, "gre": { "checksum": true } }"#)
                .unwrap();
        assert_eq!(config.ttl, 64);
        assert_eq!(config.capwap.key, Some(1));
        assert_eq!(config.capwap.src_port, CAPWAP_SRC_PORT);
        assert!(!config.capwap.udp_checksum);
        assert!(config.gre.checksum);
        assert_eq!(config.gre.key, None);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(serde_json::from_str::<TunnelConfig>(r#"{ "vxlan": {} }"#).is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = TunnelConfig::default();
        config.ttl = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroTtl));

        let mut config = TunnelConfig::default();
        config.capwap.dst_port = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroPort("destination")));

        let mut config = TunnelConfig::default();
        config.capwap.src_port = config.capwap.dst_port;
        assert_eq!(config.validate(), Err(ConfigError::SamePorts(CAPWAP_DST_PORT)));
    }
}
