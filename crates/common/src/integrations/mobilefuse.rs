//! MobileFuse partner adapter.

use std::sync::Arc;

use serde::Deserialize;
use url::Url;

use crate::auction::adapter::BidderAdapter;
use crate::auction::types::{AdapterError, AdapterResult, BidderBid, BidderCall, HttpRequest};
use crate::auction::util::{
    bids_from_response, default_request, deserialize_optional_id, parse_imp_ext, with_ext,
};
use crate::openrtb::{BidRequest, Imp};
use crate::settings::{AdapterConfig, Settings};

const PARTNER_NAME: &str = "mobilefuse";
const EXT_TAGID_SOURCE: &str = "ext";

#[derive(Debug, Clone, Default, Deserialize)]
struct MobilefuseImpExt {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    placement_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub_id: Option<String>,
    #[serde(default)]
    tagid_src: Option<String>,
}

impl MobilefuseImpExt {
    fn is_complete(&self) -> bool {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .is_some_and(|value| !value.trim().is_empty())
        };
        present(&self.placement_id) && present(&self.pub_id)
    }
}

pub struct MobilefuseAdapter {
    endpoint: String,
}

impl MobilefuseAdapter {
    #[must_use]
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            endpoint: config.endpoint,
        }
    }

    /// Endpoint carrying the publisher id and, when asked for, the tag id
    /// source.
    fn endpoint_for(&self, ext: &MobilefuseImpExt) -> Result<String, String> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| format!("Invalid endpoint {}: {e}", self.endpoint))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("pub_id", ext.pub_id.as_deref().unwrap_or_default());
            if ext.tagid_src.as_deref() == Some(EXT_TAGID_SOURCE) {
                query.append_pair("tagid_src", EXT_TAGID_SOURCE);
            }
        }
        Ok(url.into())
    }
}

impl BidderAdapter for MobilefuseAdapter {
    fn partner_name(&self) -> &'static str {
        PARTNER_NAME
    }

    fn build_requests(&self, request: &BidRequest) -> AdapterResult<Vec<HttpRequest>> {
        // Parameters come from the first impression that carries a usable set.
        let Some(ext) = request
            .imp
            .iter()
            .filter_map(|imp| parse_imp_ext::<MobilefuseImpExt>(imp).ok())
            .find(MobilefuseImpExt::is_complete)
        else {
            return AdapterResult::with_error(AdapterError::bad_input(
                PARTNER_NAME,
                "Invalid ExtImpMobilefuse value",
            ));
        };

        // Only one fillable impression is forwarded, tagged with the placement.
        let Some(imp) = request.imp.iter().find(|imp| imp.has_fillable_media()) else {
            return AdapterResult::with_error(AdapterError::bad_input(
                PARTNER_NAME,
                "No valid imps",
            ));
        };

        let outgoing_imp = Imp {
            tagid: ext.placement_id.clone(),
            ..with_ext(imp, None)
        };
        let outgoing = BidRequest {
            imp: vec![outgoing_imp],
            ..request.clone()
        };

        match self
            .endpoint_for(&ext)
            .and_then(|endpoint| default_request(outgoing, &endpoint))
        {
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

/// Register the MobileFuse adapter when `[adapters.mobilefuse]` is configured.
#[must_use]
pub fn register(settings: &Settings) -> Vec<Arc<dyn BidderAdapter>> {
    match settings.adapter_config(PARTNER_NAME) {
        Ok(Some(config)) => {
            log::info!(
                "Registering MobileFuse adapter (endpoint: {})",
                config.endpoint
            );
            vec![Arc::new(MobilefuseAdapter::new(config))]
        }
        Ok(None) => {
            log::debug!("MobileFuse adapter not configured or disabled");
            Vec::new()
        }
        Err(e) => {
            log::error!("Failed to load MobileFuse configuration: {:?}", e);
            Vec::new()
        }
    }
}
