//! Core types shared by partner adapters and the invoker.

use bytes::Bytes;
use derive_more::Display;
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::openrtb::{Bid, BidRequest};

/// Outbound call descriptor produced by an adapter.
///
/// The transport collaborator executes it; the adapter never performs I/O.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// The request as serialized into `body`, kept for response mapping.
    pub payload: BidRequest,
}

/// Raw result of an outbound call.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    /// Convenience constructor for a response without headers.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// A completed outbound call, handed back to the adapter that built it.
#[derive(Debug, Clone)]
pub struct BidderCall {
    pub request: HttpRequest,
    pub response: HttpResponse,
}

/// Media type of a normalized bid.
#[derive(Debug, Clone, Copy, Display, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BidType {
    #[display("banner")]
    Banner,
    #[display("video")]
    Video,
    #[display("native")]
    Native,
    #[display("audio")]
    Audio,
}

/// Bid normalized into the common model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BidderBid {
    pub bid: Bid,
    pub bid_type: BidType,
    pub currency: String,
    /// Partner that produced the bid.
    pub partner: String,
}

impl BidderBid {
    pub fn new(
        bid: Bid,
        bid_type: BidType,
        currency: impl Into<String>,
        partner: impl Into<String>,
    ) -> Self {
        Self {
            bid,
            bid_type,
            currency: currency.into(),
            partner: partner.into(),
        }
    }

    #[must_use]
    pub fn price(&self) -> f64 {
        self.bid.price
    }

    #[must_use]
    pub fn creative(&self) -> Option<&str> {
        self.bid.adm.as_deref()
    }
}

/// Classification of a partner-scoped failure.
#[derive(Debug, Clone, Copy, Display, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorKind {
    /// Malformed or missing partner parameters. Never retried.
    #[display("bad-input")]
    BadInput,
    /// Unparseable partner response or unmapped media type. Never retried.
    #[display("bad-server-response")]
    BadServerResponse,
    /// The transport could not complete the call.
    #[display("transport")]
    Transport,
}

/// Partner-scoped error, carried as a value next to the bids.
#[derive(Debug, Clone, Display, Serialize, Deserialize, PartialEq, Eq)]
#[display("[{partner}] {kind}: {message}")]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub partner: String,
    pub message: String,
}

impl AdapterError {
    pub fn bad_input(partner: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::BadInput,
            partner: partner.into(),
            message: message.into(),
        }
    }

    pub fn bad_server_response(partner: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::BadServerResponse,
            partner: partner.into(),
            message: message.into(),
        }
    }

    pub fn transport(partner: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::Transport,
            partner: partner.into(),
            message: message.into(),
        }
    }
}

/// Value plus the partner errors collected while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterResult<T> {
    pub value: T,
    pub errors: Vec<AdapterError>,
}

impl<T> AdapterResult<T> {
    pub fn of(value: T, errors: Vec<AdapterError>) -> Self {
        Self { value, errors }
    }

    pub fn with_value(value: T) -> Self {
        Self {
            value,
            errors: Vec::new(),
        }
    }
}

impl<T: Default> AdapterResult<T> {
    /// An empty value carrying a single error.
    pub fn with_error(error: AdapterError) -> Self {
        Self {
            value: T::default(),
            errors: vec![error],
        }
    }
}

/// Per-partner summary of one auction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartnerSummary {
    pub partner: String,
    pub requests: usize,
    pub bids: usize,
    pub errors: usize,
    /// Calls still pending when the shared budget ran out.
    pub timed_out: usize,
    pub response_time_ms: u64,
}

impl PartnerSummary {
    pub fn new(partner: impl Into<String>) -> Self {
        Self {
            partner: partner.into(),
            requests: 0,
            bids: 0,
            errors: 0,
            timed_out: 0,
            response_time_ms: 0,
        }
    }
}

/// Everything the invoker collected across partners for one auction.
#[derive(Debug, Clone, Default)]
pub struct AuctionOutcome {
    pub bids: Vec<BidderBid>,
    pub errors: Vec<AdapterError>,
    pub partners: Vec<PartnerSummary>,
}

impl AuctionOutcome {
    /// Summary for a single partner, if it took part.
    #[must_use]
    pub fn summary_for(&self, partner: &str) -> Option<&PartnerSummary> {
        self.partners.iter().find(|s| s.partner == partner)
    }
}
