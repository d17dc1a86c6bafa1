//! Helpers shared by partner adapters.

use bytes::Bytes;
use http::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, Method};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value as Json};

use crate::openrtb::{Bid, BidRequest, BidResponse, Imp};

use super::types::{AdapterError, AdapterResult, BidType, BidderBid, HttpRequest};

const BIDDER_EXT_KEY: &str = "bidder";
const PREBID_EXT_KEY: &str = "prebid";
const DEFAULT_CURRENCY: &str = "USD";
const OPENRTB_VERSION_HEADER: HeaderName = HeaderName::from_static("x-openrtb-version");

/// Extract the partner's view of the request.
///
/// Impressions carrying parameters for `partner` (under
/// `imp.ext.prebid.bidder.<partner>` or `imp.ext.<partner>`) are kept with
/// those parameters moved to `imp.ext.bidder`; every other impression is
/// dropped. Returns `None` when no impression addresses the partner.
#[must_use]
pub fn partner_request(request: &BidRequest, partner: &str) -> Option<BidRequest> {
    let imps: Vec<Imp> = request
        .imp
        .iter()
        .filter_map(|imp| {
            let params = partner_params(imp, partner)?;
            Some(Imp {
                ext: Some(json!({ BIDDER_EXT_KEY: params })),
                ..imp.clone()
            })
        })
        .collect();

    if imps.is_empty() {
        return None;
    }

    Some(BidRequest {
        imp: imps,
        ..request.clone()
    })
}

fn partner_params(imp: &Imp, partner: &str) -> Option<Json> {
    let ext = imp.ext.as_ref()?;
    ext.get(PREBID_EXT_KEY)
        .and_then(|prebid| prebid.get(BIDDER_EXT_KEY))
        .and_then(|bidders| bidders.get(partner))
        .or_else(|| ext.get(partner))
        .cloned()
}

/// Deserialize the partner parameters found in `imp.ext.bidder`.
///
/// # Errors
///
/// Returns the deserialization message when the block is missing or does not
/// match `T`.
pub fn parse_imp_ext<T: DeserializeOwned>(imp: &Imp) -> Result<T, String> {
    let params = imp
        .ext
        .as_ref()
        .and_then(|ext| ext.get(BIDDER_EXT_KEY))
        .cloned()
        .ok_or_else(|| format!("imp {} has no bidder parameters", imp.id))?;

    serde_json::from_value(params).map_err(|e| e.to_string())
}

/// Build a JSON `POST` call for a partner endpoint.
///
/// # Errors
///
/// Returns the serialization message if the payload cannot be encoded.
pub fn default_request(payload: BidRequest, endpoint: &str) -> Result<HttpRequest, String> {
    let body = serde_json::to_vec(&payload).map_err(|e| e.to_string())?;

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json;charset=utf-8"),
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(OPENRTB_VERSION_HEADER, HeaderValue::from_static("2.5"));

    Ok(HttpRequest {
        method: Method::POST,
        uri: endpoint.to_string(),
        headers,
        body: Bytes::from(body),
        payload,
    })
}

/// Resolve an OpenRTB markup type code.
///
/// Only banner (1), video (2) and native (4) are accepted; everything else
/// fails closed.
#[must_use]
pub fn bid_type_from_mtype(mtype: Option<i32>) -> Option<BidType> {
    match mtype {
        Some(1) => Some(BidType::Banner),
        Some(2) => Some(BidType::Video),
        Some(4) => Some(BidType::Native),
        _ => None,
    }
}

/// Decode a standard OpenRTB response body into normalized bids.
///
/// An undecodable body is one bad-server-response error; a bid with an
/// unmapped `mtype` is dropped with its own error while its siblings are kept.
#[must_use]
pub fn bids_from_response(partner: &str, body: &[u8]) -> AdapterResult<Vec<BidderBid>> {
    let response: BidResponse = match serde_json::from_slice(body) {
        Ok(response) => response,
        Err(e) => {
            return AdapterResult::with_error(AdapterError::bad_server_response(
                partner,
                format!("Failed to decode: {e}"),
            ))
        }
    };

    let currency = response
        .cur
        .clone()
        .filter(|cur| !cur.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let mut bids = Vec::new();
    let mut errors = Vec::new();

    let all_bids = response
        .seatbid
        .into_iter()
        .flatten()
        .filter_map(|seatbid| seatbid.bid)
        .flatten();

    for bid in all_bids {
        match bid_type_from_mtype(bid.mtype) {
            Some(bid_type) => bids.push(BidderBid::new(bid, bid_type, &currency, partner)),
            None => errors.push(unsupported_mtype_error(partner, &bid)),
        }
    }

    AdapterResult::of(bids, errors)
}

fn unsupported_mtype_error(partner: &str, bid: &Bid) -> AdapterError {
    let mtype = bid
        .mtype
        .map_or_else(|| "null".to_string(), |code| code.to_string());
    AdapterError::bad_server_response(
        partner,
        format!("Unsupported mtype {mtype} for bid {}", bid.id),
    )
}

/// Accept partner identifiers given either as JSON strings or numbers.
///
/// # Errors
///
/// Fails for any JSON type other than string, number or null.
pub fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer identifier")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

/// Replace an impression's `ext` with a new object, e.g. to strip partner
/// parameters before forwarding.
#[must_use]
pub fn with_ext(imp: &Imp, ext: Option<Map<String, Json>>) -> Imp {
    Imp {
        ext: ext.map(Json::Object),
        ..imp.clone()
    }
}
