use crate::openrtb::BidRequest;

use super::model::{Ccpa, Privacy};

/// Reads consent signals from a request, replacing invalid values with
/// defaults.
///
/// Extension fields (`regs.ext.*`, `user.ext.consent`) win over their
/// OpenRTB 2.6 top-level counterparts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrivacyExtractor;

impl PrivacyExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Extract sanitized privacy signals, pushing one warning per value
    /// that had to be discarded.
    #[must_use]
    pub fn valid_privacy_from(&self, request: &BidRequest, warnings: &mut Vec<String>) -> Privacy {
        let regs = request.regs.as_ref();
        let regs_ext = regs.and_then(|regs| regs.ext.as_ref());
        let user = request.user.as_ref();

        let gdpr = match regs_ext.and_then(|ext| ext.gdpr).or(regs.and_then(|r| r.gdpr)) {
            None => None,
            Some(value @ (0 | 1)) => u8::try_from(value).ok(),
            Some(value) => {
                warnings.push(format!("regs.gdpr must be either 0 or 1, got {value}"));
                None
            }
        };

        let consent_string = user
            .and_then(|user| user.ext.as_ref())
            .and_then(|ext| ext.consent.clone())
            .or_else(|| user.and_then(|user| user.consent.clone()))
            .filter(|consent| !consent.trim().is_empty());

        let us_privacy = regs_ext
            .and_then(|ext| ext.us_privacy.clone())
            .or_else(|| regs.and_then(|r| r.us_privacy.clone()))
            .filter(|value| !value.is_empty());
        let ccpa = match us_privacy {
            Some(value) if Ccpa::is_valid(&value) => Ccpa::new(value),
            Some(value) => {
                warnings.push(format!(
                    "regs.us_privacy must be a valid US Privacy string, got '{value}'"
                ));
                Ccpa::default()
            }
            None => Ccpa::default(),
        };

        let coppa = match regs.and_then(|r| r.coppa) {
            None | Some(0) => 0,
            Some(1) => 1,
            Some(value) => {
                warnings.push(format!("regs.coppa must be either 0 or 1, got {value}"));
                0
            }
        };

        Privacy {
            gdpr,
            consent_string,
            ccpa,
            coppa,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openrtb::{Regs, RegsExt, User, UserExt};

    fn request(regs: Regs, user: Option<User>) -> BidRequest {
        BidRequest {
            id: "req".to_string(),
            regs: Some(regs),
            user,
            ..Default::default()
        }
    }

    #[test]
    fn extension_fields_win() {
        let request = request(
            Regs {
                gdpr: Some(0),
                us_privacy: Some("1NNN".to_string()),
                ext: Some(RegsExt {
                    gdpr: Some(1),
                    us_privacy: Some("1YYN".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            Some(User {
                consent: Some("top-level".to_string()),
                ext: Some(UserExt {
                    consent: Some("from-ext".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        );
        let mut warnings = Vec::new();

        let privacy = PrivacyExtractor::new().valid_privacy_from(&request, &mut warnings);

        assert_eq!(privacy.gdpr, Some(1));
        assert_eq!(privacy.consent_string.as_deref(), Some("from-ext"));
        assert_eq!(privacy.ccpa.us_privacy.as_deref(), Some("1YYN"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn falls_back_to_top_level_fields() {
        let request = request(
            Regs {
                gdpr: Some(1),
                coppa: Some(1),
                ..Default::default()
            },
            Some(User {
                consent: Some("consent".to_string()),
                ..Default::default()
            }),
        );
        let mut warnings = Vec::new();

        let privacy = PrivacyExtractor::new().valid_privacy_from(&request, &mut warnings);

        assert_eq!(privacy.gdpr, Some(1));
        assert_eq!(privacy.consent_string.as_deref(), Some("consent"));
        assert!(privacy.is_coppa());
    }

    #[test]
    fn invalid_values_become_defaults_with_warnings() {
        let request = request(
            Regs {
                coppa: Some(7),
                ext: Some(RegsExt {
                    gdpr: Some(2),
                    us_privacy: Some("bogus".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            None,
        );
        let mut warnings = Vec::new();

        let privacy = PrivacyExtractor::new().valid_privacy_from(&request, &mut warnings);

        assert_eq!(privacy, Privacy::default());
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].starts_with("regs.gdpr"));
        assert!(warnings[1].starts_with("regs.us_privacy"));
        assert!(warnings[2].starts_with("regs.coppa"));
    }
}
