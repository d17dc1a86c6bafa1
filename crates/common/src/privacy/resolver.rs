use std::sync::Arc;

use error_stack::{Report, ResultExt};
use tokio::time::{timeout_at, Instant};

use crate::error::GatewayError;
use crate::ip::IpMasker;
use crate::openrtb::BidRequest;

use super::extractor::PrivacyExtractor;
use super::model::{
    ConsentType, PrivacyContext, RequestLogInfo, RequestMetadata, RequestType,
};
use super::tcf::{TcfDefiner, TcfRequest};

/// Query parameter carrying the consent string format hint.
pub const CONSENT_TYPE_PARAM: &str = "consent_type";

/// Builds the [`PrivacyContext`] of an auction before any partner is called.
pub struct PrivacyContextResolver {
    extractor: PrivacyExtractor,
    tcf_definer: Arc<dyn TcfDefiner>,
    ip_masker: Arc<dyn IpMasker>,
}

impl PrivacyContextResolver {
    pub fn new(tcf_definer: Arc<dyn TcfDefiner>, ip_masker: Arc<dyn IpMasker>) -> Self {
        Self {
            extractor: PrivacyExtractor::new(),
            tcf_definer,
            ip_masker,
        }
    }

    /// Resolve the privacy posture of `request`.
    ///
    /// Malformed consent inputs only produce warnings. The TCF evaluation is
    /// awaited under `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Privacy`] when the TCF evaluator fails or does
    /// not answer before `deadline`.
    pub async fn resolve(
        &self,
        request: &BidRequest,
        metadata: &RequestMetadata,
        deadline: Instant,
    ) -> Result<PrivacyContext, Report<GatewayError>> {
        let mut warnings = Vec::new();
        let privacy = self.extractor.valid_privacy_from(request, &mut warnings);
        let consent_type = consent_type_from(metadata, &mut warnings);

        let device = request.device.as_ref();
        let (masked_ipv4, masked_ipv6) = if privacy.is_coppa() {
            (
                device
                    .and_then(|d| d.ip.as_deref())
                    .and_then(|ip| self.ip_masker.mask_ipv4(ip)),
                device
                    .and_then(|d| d.ipv6.as_deref())
                    .and_then(|ip| self.ip_masker.anonymize_ipv6(ip)),
            )
        } else {
            (None, None)
        };

        let ip_address = if privacy.is_coppa() {
            masked_ipv4.clone().or_else(|| masked_ipv6.clone())
        } else {
            device.and_then(|d| d.ip.clone().or_else(|| d.ipv6.clone()))
        };

        let tcf_request = TcfRequest {
            gdpr: privacy.gdpr,
            consent_string: privacy.consent_string.clone(),
            consent_type,
            ip_address,
            country: device
                .and_then(|d| d.geo.as_ref())
                .and_then(|geo| geo.country.clone()),
            request_log_info: request_log_info(request, metadata.request_type),
        };

        let tcf = timeout_at(deadline, self.tcf_definer.resolve_tcf_context(&tcf_request))
            .await
            .change_context(GatewayError::Privacy {
                message: "TCF evaluation did not complete before the auction deadline"
                    .to_string(),
            })?
            .change_context(GatewayError::Privacy {
                message: "TCF evaluation failed".to_string(),
            })?;

        warnings.extend(tcf.warnings.iter().cloned());

        Ok(PrivacyContext {
            privacy,
            tcf,
            masked_ipv4,
            masked_ipv6,
            warnings,
        })
    }
}

fn consent_type_from(metadata: &RequestMetadata, warnings: &mut Vec<String>) -> Option<ConsentType> {
    let hint = metadata.query_params.get(CONSENT_TYPE_PARAM)?;
    let consent_type = ConsentType::from_hint(hint);
    if consent_type.is_none() {
        warnings.push(format!("Unknown consent_type '{hint}' ignored"));
    }
    consent_type
}

fn request_log_info(request: &BidRequest, request_type: RequestType) -> RequestLogInfo {
    let ref_url = match request_type {
        RequestType::Web => request.site.as_ref().and_then(|site| site.ref_url.clone()),
        RequestType::App => None,
    };
    RequestLogInfo {
        request_type,
        ref_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::DefaultIpMasker;
    use crate::openrtb::{Device, Regs, Site};
    use crate::privacy::model::TcfContext;
    use crate::test_support::tests::{FailingTcfDefiner, RecordingTcfDefiner};
    use std::time::Duration;

    fn resolver(definer: Arc<dyn TcfDefiner>) -> PrivacyContextResolver {
        PrivacyContextResolver::new(definer, Arc::new(DefaultIpMasker::default()))
    }

    fn coppa_request(ip: Option<&str>, ipv6: Option<&str>) -> BidRequest {
        BidRequest {
            id: "req".to_string(),
            device: Some(Device {
                ip: ip.map(str::to_string),
                ipv6: ipv6.map(str::to_string),
                ..Default::default()
            }),
            regs: Some(Regs {
                coppa: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(1)
    }

    #[tokio::test]
    async fn resolution_is_idempotent() {
        let definer = Arc::new(RecordingTcfDefiner::new(TcfContext {
            gdpr_applies: true,
            warnings: vec!["evaluator warning".to_string()],
            ..Default::default()
        }));
        let resolver = resolver(definer);
        let request = coppa_request(Some("10.1.2.3"), None);
        let metadata = RequestMetadata::new(RequestType::Web);

        let first = resolver
            .resolve(&request, &metadata, deadline())
            .await
            .expect("should resolve");
        let second = resolver
            .resolve(&request, &metadata, deadline())
            .await
            .expect("should resolve");

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn coppa_masks_only_present_addresses() {
        let resolver = resolver(Arc::new(RecordingTcfDefiner::default()));
        let metadata = RequestMetadata::new(RequestType::App);

        let only_v4 = resolver
            .resolve(&coppa_request(Some("10.1.2.3"), None), &metadata, deadline())
            .await
            .expect("should resolve");
        assert_eq!(only_v4.masked_ipv4.as_deref(), Some("10.1.2.0"));
        assert_eq!(only_v4.masked_ipv6, None);

        let both = resolver
            .resolve(
                &coppa_request(Some("10.1.2.3"), Some("2001:db8:1:2:3:4:5:6")),
                &metadata,
                deadline(),
            )
            .await
            .expect("should resolve");
        assert_eq!(both.masked_ipv4.as_deref(), Some("10.1.2.0"));
        assert_eq!(both.masked_ipv6.as_deref(), Some("2001:db8:1::"));
    }

    #[tokio::test]
    async fn evaluator_sees_masked_ip_and_web_referrer_only() {
        let definer = Arc::new(RecordingTcfDefiner::default());
        let resolver = resolver(Arc::clone(&definer) as Arc<dyn TcfDefiner>);
        let mut request = coppa_request(Some("10.1.2.3"), None);
        request.site = Some(Site {
            ref_url: Some("https://referrer.example/".to_string()),
            ..Default::default()
        });

        resolver
            .resolve(&request, &RequestMetadata::new(RequestType::Web), deadline())
            .await
            .expect("should resolve");
        resolver
            .resolve(&request, &RequestMetadata::new(RequestType::App), deadline())
            .await
            .expect("should resolve");

        let seen = definer.requests();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].ip_address.as_deref(), Some("10.1.2.0"));
        assert_eq!(
            seen[0].request_log_info.ref_url.as_deref(),
            Some("https://referrer.example/")
        );
        assert_eq!(seen[1].request_log_info.ref_url, None);
    }

    #[tokio::test]
    async fn consent_type_hint_is_forwarded_and_unknown_values_warn() {
        let definer = Arc::new(RecordingTcfDefiner::default());
        let resolver = resolver(Arc::clone(&definer) as Arc<dyn TcfDefiner>);
        let request = BidRequest::default();

        resolver
            .resolve(
                &request,
                &RequestMetadata::new(RequestType::Web).with_query_param("consent_type", "tcf2"),
                deadline(),
            )
            .await
            .expect("should resolve");
        let context = resolver
            .resolve(
                &request,
                &RequestMetadata::new(RequestType::Web).with_query_param("consent_type", "gpp"),
                deadline(),
            )
            .await
            .expect("should resolve");

        assert_eq!(definer.requests()[0].consent_type, Some(ConsentType::Tcf2));
        assert_eq!(definer.requests()[1].consent_type, None);
        assert_eq!(context.warnings, vec!["Unknown consent_type 'gpp' ignored"]);
    }

    #[tokio::test]
    async fn evaluator_warnings_follow_extraction_warnings() {
        let definer = Arc::new(RecordingTcfDefiner::new(TcfContext {
            warnings: vec!["from evaluator".to_string()],
            ..Default::default()
        }));
        let mut request = BidRequest::default();
        request.regs = Some(Regs {
            coppa: Some(3),
            ..Default::default()
        });

        let context = resolver(definer)
            .resolve(&request, &RequestMetadata::new(RequestType::Web), deadline())
            .await
            .expect("should resolve");

        assert_eq!(context.warnings.len(), 2);
        assert!(context.warnings[0].starts_with("regs.coppa"));
        assert_eq!(context.warnings[1], "from evaluator");
    }

    #[tokio::test]
    async fn evaluator_failure_blocks_resolution() {
        let err = resolver(Arc::new(FailingTcfDefiner))
            .resolve(
                &BidRequest::default(),
                &RequestMetadata::new(RequestType::Web),
                deadline(),
            )
            .await
            .expect_err("failure should propagate");

        assert!(matches!(
            err.current_context(),
            GatewayError::Privacy { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn evaluator_timeout_blocks_resolution() {
        let definer = Arc::new(RecordingTcfDefiner::default().with_delay(Duration::from_secs(10)));

        let err = resolver(definer)
            .resolve(
                &BidRequest::default(),
                &RequestMetadata::new(RequestType::Web),
                Instant::now() + Duration::from_millis(50),
            )
            .await
            .expect_err("timeout should propagate");

        assert!(format!("{err}").contains("Privacy error"));
    }
}
