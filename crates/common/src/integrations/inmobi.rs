//! InMobi partner adapter.
//!
//! Forwards the partner's view of the request to the InMobi OpenRTB endpoint
//! after checking the placement id and filling in a missing banner size on the
//! first impression.

use std::sync::Arc;

use serde::Deserialize;

use crate::auction::adapter::BidderAdapter;
use crate::auction::types::{AdapterError, AdapterResult, BidderBid, BidderCall, HttpRequest};
use crate::auction::util::{bids_from_response, default_request, parse_imp_ext};
use crate::openrtb::{Banner, BidRequest, Imp};
use crate::settings::{AdapterConfig, Settings};

const PARTNER_NAME: &str = "inmobi";

/// Parameters found in `imp.ext.bidder` for InMobi.
#[derive(Debug, Clone, Default, Deserialize)]
struct InmobiImpExt {
    /// Placement id.
    #[serde(default)]
    plc: Option<String>,
}

pub struct InmobiAdapter {
    endpoint: String,
}

impl InmobiAdapter {
    #[must_use]
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            endpoint: config.endpoint,
        }
    }
}

/// Copy the first format's size onto a banner missing either dimension.
fn resize_banner(imp: &Imp) -> Imp {
    let Some(banner) = imp.banner.as_ref() else {
        return imp.clone();
    };
    if !banner.has_missing_size() {
        return imp.clone();
    }
    let Some(format) = banner.format.first() else {
        return imp.clone();
    };

    Imp {
        banner: Some(Banner {
            w: format.w,
            h: format.h,
            ..banner.clone()
        }),
        ..imp.clone()
    }
}

impl BidderAdapter for InmobiAdapter {
    fn partner_name(&self) -> &'static str {
        PARTNER_NAME
    }

    fn build_requests(&self, request: &BidRequest) -> AdapterResult<Vec<HttpRequest>> {
        let Some(first) = request.imp.first() else {
            return AdapterResult::with_error(AdapterError::bad_input(
                PARTNER_NAME,
                "No impressions in the bid request",
            ));
        };

        let ext: InmobiImpExt = match parse_imp_ext(first) {
            Ok(ext) => ext,
            Err(e) => {
                log::debug!("InMobi: failed to parse imp ext: {}", e);
                return AdapterResult::with_error(AdapterError::bad_input(
                    PARTNER_NAME,
                    "bad InMobi bidder ext",
                ));
            }
        };

        if ext.plc.as_deref().filter(|plc| !plc.trim().is_empty()).is_none() {
            return AdapterResult::with_error(AdapterError::bad_input(
                PARTNER_NAME,
                "'plc' is a required attribute for InMobi's bidder ext",
            ));
        }

        let mut imps = request.imp.clone();
        imps[0] = resize_banner(first);
        let outgoing = BidRequest {
            imp: imps,
            ..request.clone()
        };

        match default_request(outgoing, &self.endpoint) {
            Ok(http_request) => AdapterResult::with_value(vec![http_request]),
            Err(e) => AdapterResult::with_error(AdapterError::bad_input(PARTNER_NAME, e)),
        }
    }

    fn parse_response(
        &self,
        call: &BidderCall,
        _request: &BidRequest,
    ) -> AdapterResult<Vec<BidderBid>> {
        bids_from_response(PARTNER_NAME, &call.response.body)
    }
}

/// Register the InMobi adapter when `[adapters.inmobi]` is configured.
#[must_use]
pub fn register(settings: &Settings) -> Vec<Arc<dyn BidderAdapter>> {
    match settings.adapter_config(PARTNER_NAME) {
        Ok(Some(config)) => {
            log::info!("Registering InMobi adapter (endpoint: {})", config.endpoint);
            vec![Arc::new(InmobiAdapter::new(config))]
        }
        Ok(None) => {
            log::debug!("InMobi adapter not configured or disabled");
            Vec::new()
        }
        Err(e) => {
            log::error!("Failed to load InMobi configuration: {:?}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::types::{AdapterErrorKind, BidType, HttpResponse};
    use crate::openrtb::Format;
    use http::StatusCode;
    use serde_json::json;

    fn adapter() -> InmobiAdapter {
        InmobiAdapter::new(AdapterConfig {
            enabled: true,
            endpoint: "https://inmobi.example/bid".to_string(),
        })
    }

    fn request_with(imp: Imp) -> BidRequest {
        BidRequest {
            id: "req-1".to_string(),
            imp: vec![imp],
            ..Default::default()
        }
    }

    fn banner_imp(ext: serde_json::Value, w: Option<u32>, h: Option<u32>) -> Imp {
        Imp {
            id: "imp-1".to_string(),
            banner: Some(Banner {
                w,
                h,
                format: vec![Format {
                    w: Some(300),
                    h: Some(250),
                }],
                ..Default::default()
            }),
            ext: Some(ext),
            ..Default::default()
        }
    }

    #[test]
    fn missing_plc_is_bad_input() {
        for ext in [json!({"bidder": {}}), json!({"bidder": {"plc": "  "}})] {
            let result = adapter().build_requests(&request_with(banner_imp(ext, None, None)));

            assert!(result.value.is_empty());
            assert_eq!(result.errors.len(), 1);
            assert_eq!(result.errors[0].kind, AdapterErrorKind::BadInput);
            assert_eq!(
                result.errors[0].message,
                "'plc' is a required attribute for InMobi's bidder ext"
            );
        }
    }

    #[test]
    fn malformed_ext_is_bad_input() {
        let imp = banner_imp(json!({"bidder": {"plc": 42}}), None, None);
        let result = adapter().build_requests(&request_with(imp));

        assert!(result.value.is_empty());
        assert_eq!(result.errors[0].message, "bad InMobi bidder ext");
    }

    #[test]
    fn fills_missing_banner_size_from_first_format() {
        let imp = banner_imp(json!({"bidder": {"plc": "123"}}), Some(0), None);
        let request = request_with(imp);

        let result = adapter().build_requests(&request);

        assert!(result.errors.is_empty());
        assert_eq!(result.value.len(), 1);
        let banner = result.value[0].payload.imp[0]
            .banner
            .clone()
            .expect("banner should be kept");
        assert_eq!((banner.w, banner.h), (Some(300), Some(250)));
        assert_eq!(result.value[0].uri, "https://inmobi.example/bid");

        // The auction-wide request is never rewritten.
        assert_eq!(request.imp[0].banner.as_ref().and_then(|b| b.w), Some(0));
    }

    #[test]
    fn keeps_explicit_banner_size() {
        let imp = banner_imp(json!({"bidder": {"plc": "123"}}), Some(728), Some(90));
        let result = adapter().build_requests(&request_with(imp));

        let banner = result.value[0].payload.imp[0]
            .banner
            .clone()
            .expect("banner should be kept");
        assert_eq!((banner.w, banner.h), (Some(728), Some(90)));
    }

    #[test]
    fn maps_bids_by_mtype() {
        let imp = banner_imp(json!({"bidder": {"plc": "123"}}), Some(300), Some(250));
        let request = request_with(imp);
        let http_request = adapter()
            .build_requests(&request)
            .value
            .pop()
            .expect("one request");
        let body = json!({
            "id": "resp",
            "cur": "USD",
            "seatbid": [{"bid": [
                {"id": "b1", "impid": "imp-1", "price": 1.5, "adm": "<div/>", "mtype": 1},
                {"id": "b2", "impid": "imp-1", "price": 0.8, "mtype": 2}
            ]}]
        });
        let call = BidderCall {
            request: http_request,
            response: HttpResponse::new(StatusCode::OK, body.to_string()),
        };

        let result = adapter().parse_response(&call, &request);

        assert!(result.errors.is_empty());
        assert_eq!(result.value.len(), 2);
        assert_eq!(result.value[0].bid_type, BidType::Banner);
        assert_eq!(result.value[0].creative(), Some("<div/>"));
        assert_eq!(result.value[1].bid_type, BidType::Video);
        assert_eq!(result.value[1].partner, "inmobi");
    }

    #[test]
    fn register_skips_unconfigured_adapter() {
        let settings = Settings::from_toml("").expect("empty settings should load");
        assert!(register(&settings).is_empty());
    }
}
