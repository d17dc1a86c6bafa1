use std::collections::HashMap;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// CCPA signal in IAB US Privacy string form (e.g. `1YNN`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ccpa {
    pub us_privacy: Option<String>,
}

impl Ccpa {
    pub fn new(us_privacy: impl Into<String>) -> Self {
        Self {
            us_privacy: Some(us_privacy.into()),
        }
    }

    /// Four characters: version `1` followed by three of `Y`, `N` or `-`.
    #[must_use]
    pub fn is_valid(value: &str) -> bool {
        let bytes = value.as_bytes();
        bytes.len() == 4
            && bytes[0] == b'1'
            && bytes[1..].iter().all(|b| matches!(b, b'Y' | b'N' | b'-'))
    }
}

/// Raw consent signals taken from the request, already sanitized.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Privacy {
    /// `Some(0)` or `Some(1)`; `None` when the request did not say.
    pub gdpr: Option<u8>,
    pub consent_string: Option<String>,
    pub ccpa: Ccpa,
    /// `1` when the request is subject to COPPA.
    pub coppa: u8,
}

impl Privacy {
    #[must_use]
    pub fn is_coppa(&self) -> bool {
        self.coppa == 1
    }
}

/// Consent string format announced by the caller.
#[derive(Debug, Clone, Copy, Display, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConsentType {
    #[display("tcf1")]
    Tcf1,
    #[display("tcf2")]
    Tcf2,
    #[display("usp")]
    Usp,
}

impl ConsentType {
    #[must_use]
    pub fn from_hint(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tcf1" => Some(Self::Tcf1),
            "tcf2" => Some(Self::Tcf2),
            "usp" => Some(Self::Usp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Display, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    #[display("web")]
    Web,
    #[display("app")]
    App,
}

/// Transport-level facts about the incoming auction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMetadata {
    pub request_type: RequestType,
    pub query_params: HashMap<String, String>,
}

impl RequestMetadata {
    #[must_use]
    pub fn new(request_type: RequestType) -> Self {
        Self {
            request_type,
            query_params: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }
}

/// Audit data handed to the TCF evaluator. It never shapes the result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestLogInfo {
    pub request_type: RequestType,
    /// Page referrer, web requests only.
    pub ref_url: Option<String>,
}

/// GDPR scope and consent validity as decided by the TCF evaluator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TcfContext {
    pub gdpr_applies: bool,
    pub consent_string: Option<String>,
    pub consent_valid: bool,
    /// Whether the jurisdiction hint placed the user in the EEA, if known.
    pub in_eea: Option<bool>,
    pub warnings: Vec<String>,
}

/// Everything every partner call of one auction must honor.
///
/// Built once, then shared read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrivacyContext {
    pub privacy: Privacy,
    pub tcf: TcfContext,
    /// Masked device IPv4, set only under COPPA and only when one was sent.
    pub masked_ipv4: Option<String>,
    /// Anonymized device IPv6, set only under COPPA and only when one was sent.
    pub masked_ipv6: Option<String>,
    /// Advisory warnings in the order they were raised.
    pub warnings: Vec<String>,
}

impl PrivacyContext {
    #[must_use]
    pub fn gdpr_applies(&self) -> bool {
        self.tcf.gdpr_applies
    }

    #[must_use]
    pub fn is_coppa(&self) -> bool {
        self.privacy.is_coppa()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn us_privacy_validation() {
        assert!(Ccpa::is_valid("1YNN"));
        assert!(Ccpa::is_valid("1---"));
        assert!(!Ccpa::is_valid("2YNN"));
        assert!(!Ccpa::is_valid("1YN"));
        assert!(!Ccpa::is_valid("1YNX"));
    }

    #[test]
    fn consent_type_hint_is_case_insensitive() {
        assert_eq!(ConsentType::from_hint("TCF2"), Some(ConsentType::Tcf2));
        assert_eq!(ConsentType::from_hint("usp"), Some(ConsentType::Usp));
        assert_eq!(ConsentType::from_hint("gpp"), None);
    }
}
