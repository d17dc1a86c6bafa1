use crate::openrtb::{BidRequest, Device, Regs, RegsExt, User, UserExt};

use super::model::PrivacyContext;

/// Copy of `request` carrying the resolved privacy posture.
///
/// Under COPPA the raw device addresses are replaced with their masked
/// values (or removed when none could be derived).
#[must_use]
pub fn apply_privacy(request: &BidRequest, context: &PrivacyContext) -> BidRequest {
    let mut enforced = request.clone();
    let privacy = &context.privacy;

    if privacy.is_coppa() {
        if let Some(device) = enforced.device.as_mut() {
            *device = Device {
                ip: context.masked_ipv4.clone(),
                ipv6: context.masked_ipv6.clone(),
                ..device.clone()
            };
        }
    }

    // The 2.6 top-level fields mirror the ext ones so partners never see
    // two conflicting values.
    let gdpr = Some(i32::from(context.tcf.gdpr_applies));
    let regs = enforced.regs.get_or_insert_with(Regs::default);
    regs.coppa = Some(i32::from(privacy.coppa));
    regs.gdpr = gdpr;
    regs.us_privacy.clone_from(&privacy.ccpa.us_privacy);
    let regs_ext = regs.ext.get_or_insert_with(RegsExt::default);
    regs_ext.gdpr = gdpr;
    regs_ext.us_privacy.clone_from(&privacy.ccpa.us_privacy);

    let consent = &context.tcf.consent_string;
    if consent.is_some() || enforced.user.is_some() {
        let user = enforced.user.get_or_insert_with(User::default);
        user.consent.clone_from(consent);
        if consent.is_some() || user.ext.is_some() {
            let user_ext = user.ext.get_or_insert_with(UserExt::default);
            user_ext.consent.clone_from(consent);
        }
    }

    enforced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privacy::model::{Ccpa, Privacy, TcfContext};

    fn request_with_device() -> BidRequest {
        BidRequest {
            id: "req".to_string(),
            device: Some(Device {
                ua: Some("Mozilla/5.0".to_string()),
                ip: Some("10.1.2.3".to_string()),
                ipv6: Some("2001:db8::1".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn coppa_replaces_raw_addresses() {
        let context = PrivacyContext {
            privacy: Privacy {
                coppa: 1,
                ..Default::default()
            },
            masked_ipv4: Some("10.1.2.0".to_string()),
            ..Default::default()
        };

        let enforced = apply_privacy(&request_with_device(), &context);
        let device = enforced.device.expect("device should be kept");

        assert_eq!(device.ip.as_deref(), Some("10.1.2.0"));
        assert_eq!(device.ipv6, None);
        assert_eq!(device.ua.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(enforced.regs.and_then(|r| r.coppa), Some(1));
    }

    #[test]
    fn addresses_untouched_without_coppa() {
        let enforced = apply_privacy(&request_with_device(), &PrivacyContext::default());
        let device = enforced.device.expect("device should be kept");

        assert_eq!(device.ip.as_deref(), Some("10.1.2.3"));
        assert_eq!(device.ipv6.as_deref(), Some("2001:db8::1"));
    }

    #[test]
    fn consent_signals_are_written_back() {
        let context = PrivacyContext {
            privacy: Privacy {
                ccpa: Ccpa::new("1YNN"),
                ..Default::default()
            },
            tcf: TcfContext {
                gdpr_applies: true,
                consent_string: Some("consent".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let enforced = apply_privacy(&BidRequest::default(), &context);

        let regs_ext = enforced
            .regs
            .and_then(|r| r.ext)
            .expect("regs.ext should be set");
        assert_eq!(regs_ext.gdpr, Some(1));
        assert_eq!(regs_ext.us_privacy.as_deref(), Some("1YNN"));
        assert_eq!(
            enforced
                .user
                .and_then(|u| u.ext)
                .and_then(|ext| ext.consent)
                .as_deref(),
            Some("consent")
        );
    }

    #[test]
    fn top_level_signals_match_the_resolved_ones() {
        let request = BidRequest {
            regs: Some(Regs {
                gdpr: Some(1),
                us_privacy: Some("garbage".to_string()),
                ext: Some(RegsExt {
                    gdpr: Some(0),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            user: Some(User {
                consent: Some("stale".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let enforced = apply_privacy(&request, &PrivacyContext::default());

        let regs = enforced.regs.expect("regs should be kept");
        assert_eq!(regs.gdpr, Some(0));
        assert_eq!(regs.us_privacy, None);
        let regs_ext = regs.ext.expect("regs.ext should be set");
        assert_eq!(regs_ext.gdpr, Some(0));
        assert_eq!(regs_ext.us_privacy, None);
        let user = enforced.user.expect("user should be kept");
        assert_eq!(user.consent, None);
        assert_eq!(user.ext, None);
    }
}
