use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::settings::PrivacySettings;

/// Masks device addresses when a request is subject to COPPA.
///
/// Both operations return `None` for input that is not an address of the
/// expected family, so an unmasked value can never pass through.
pub trait IpMasker: Send + Sync {
    fn mask_ipv4(&self, ip: &str) -> Option<String>;
    fn anonymize_ipv6(&self, ip: &str) -> Option<String>;
}

/// Prefix-based masker: zeroes trailing IPv4 bits and keeps a leading IPv6
/// prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultIpMasker {
    ipv4_mask_bits: u8,
    ipv6_keep_bits: u8,
}

impl DefaultIpMasker {
    #[must_use]
    pub fn new(ipv4_mask_bits: u8, ipv6_keep_bits: u8) -> Self {
        Self {
            ipv4_mask_bits: ipv4_mask_bits.min(32),
            ipv6_keep_bits: ipv6_keep_bits.min(128),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &PrivacySettings) -> Self {
        Self::new(settings.ipv4_mask_bits, settings.ipv6_keep_bits)
    }
}

impl Default for DefaultIpMasker {
    fn default() -> Self {
        Self::from_settings(&PrivacySettings::default())
    }
}

impl IpMasker for DefaultIpMasker {
    fn mask_ipv4(&self, ip: &str) -> Option<String> {
        let IpAddr::V4(addr) = parse_ip(ip)? else {
            return None;
        };
        let mask = u32::MAX
            .checked_shl(u32::from(self.ipv4_mask_bits))
            .unwrap_or(0);
        Some(Ipv4Addr::from(u32::from(addr) & mask).to_string())
    }

    fn anonymize_ipv6(&self, ip: &str) -> Option<String> {
        let IpAddr::V6(addr) = parse_ip(ip)? else {
            return None;
        };
        let mask = u128::MAX
            .checked_shl(128 - u32::from(self.ipv6_keep_bits))
            .unwrap_or(0);
        Some(Ipv6Addr::from(u128::from(addr) & mask).to_string())
    }
}

/// Parse a single address, tolerating surrounding whitespace.
#[must_use]
pub fn parse_ip(value: &str) -> Option<IpAddr> {
    value.trim().parse::<IpAddr>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_ipv4_zeroes_last_octet() {
        let masker = DefaultIpMasker::default();
        assert_eq!(
            masker.mask_ipv4("192.168.1.77").as_deref(),
            Some("192.168.1.0")
        );
    }

    #[test]
    fn test_mask_ipv4_custom_bits() {
        let masker = DefaultIpMasker::new(16, 56);
        assert_eq!(masker.mask_ipv4("10.20.30.40").as_deref(), Some("10.20.0.0"));
        assert_eq!(
            DefaultIpMasker::new(32, 56).mask_ipv4("10.20.30.40").as_deref(),
            Some("0.0.0.0")
        );
        assert_eq!(
            DefaultIpMasker::new(0, 56).mask_ipv4("10.20.30.40").as_deref(),
            Some("10.20.30.40")
        );
    }

    #[test]
    fn test_anonymize_ipv6_keeps_prefix() {
        let masker = DefaultIpMasker::default();
        assert_eq!(
            masker
                .anonymize_ipv6("2001:0db8:85a3:1234:5678:8a2e:0370:7334")
                .as_deref(),
            Some("2001:db8:85a3:1200::")
        );
    }

    #[test]
    fn test_anonymize_ipv6_keep_none() {
        let masker = DefaultIpMasker::new(8, 0);
        assert_eq!(masker.anonymize_ipv6("2001:db8::1").as_deref(), Some("::"));
    }

    #[test]
    fn test_wrong_family_or_garbage_is_dropped() {
        let masker = DefaultIpMasker::default();
        assert!(masker.mask_ipv4("2001:db8::1").is_none());
        assert!(masker.anonymize_ipv6("192.168.1.1").is_none());
        assert!(masker.mask_ipv4("not-an-ip").is_none());
        assert!(masker.mask_ipv4("192.168.1.256").is_none());
    }

    #[test]
    fn test_parse_ip_with_spaces() {
        assert_eq!(
            parse_ip("  192.168.1.1 ").map(|ip| ip.to_string()).as_deref(),
            Some("192.168.1.1")
        );
        assert!(parse_ip("").is_none());
    }
}
