//! EtherType and IP protocol numbers
//!
//! Only the numbers a tunnel endpoint has to recognise are named here; any
//! other value is still representable and displays as hex.
//!
//! # Examples
//!
//! ```
//! use tunnel_strata::packet::protocol::{EtherProto, IpProto};
//!
//! assert_eq!(format!("{}", IpProto::GRE), "gre");
//! assert_eq!(format!("{}", EtherProto::TEB), "teb");
//! assert_eq!(format!("{}", IpProto::from(200)), "0xc8");
//!
//! let value: u16 = EtherProto::IPV4.into();
//! assert_eq!(value, 0x0800);
//! assert!(IpProto::UDP.is_known());
//! ```

use zerocopy::{BigEndian, U16};

crate::protocol_constants! {
    EtherProto, U16<BigEndian>, u16:
        IPV4 = 0x0800;
        ARP = 0x0806;
        TEB = 0x6558;
        VLAN_8021Q = 0x8100;
        IPV6 = 0x86DD;
        MPLS_UC = 0x8847;
}

crate::protocol_constants! {
    IpProto, u8, u8:
        ICMP = 1;
        IP_ENCAP = 4;
        TCP = 6;
        UDP = 17;
        IPV6 = 41;
        GRE = 47;
        IPV6_ICMP = 58;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ether_proto_names() {
        assert_eq!(EtherProto::IPV4.to_string(), "ipv4");
        assert_eq!(IpProto::IPV6_ICMP.to_string(), "ipv6-icmp");
        assert_eq!(EtherProto::from(0x1234).to_string(), "0x1234");
        assert_eq!(EtherProto::TEB.value(), 0x6558);
    }

    #[test]
    fn test_ip_proto_roundtrip() {
        assert_eq!(IpProto::from(47), IpProto::GRE);
        assert_eq!(u8::from(IpProto::UDP), 17);
        assert!(!IpProto::from(253).is_known());
        assert_eq!(IpProto::from(253).name(), None);
    }

    #[cfg(not(feature = "protocol_names"))]
    #[test]
    fn test_numeric_serde() {
        let json = serde_json::to_string(&IpProto::GRE).unwrap();
        assert_eq!(json, "47");
        let proto: EtherProto = serde_json::from_str("25944").unwrap();
        assert_eq!(proto, EtherProto::TEB);
    }
}
