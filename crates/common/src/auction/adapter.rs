//! Trait definition for partner adapters.

use crate::openrtb::BidRequest;

use super::types::{AdapterResult, BidderBid, BidderCall, HttpRequest};

/// Contract implemented once per bidding partner.
///
/// Adapters are pure transforms: they hold configuration only, never
/// auction-scoped state, and never perform I/O themselves.
pub trait BidderAdapter: Send + Sync {
    /// Unique identifier for this partner (e.g., "inmobi", "mobilefuse").
    fn partner_name(&self) -> &'static str;

    /// Turn the canonical request into zero or more outbound calls.
    ///
    /// Implementations should:
    /// - Read their parameters from `imp[].ext.bidder`
    /// - Return a bad-input error and no requests when a mandatory
    ///   parameter is missing or blank
    /// - Leave the auction-wide request untouched; rewrites go into the
    ///   outbound payload only
    fn build_requests(&self, request: &BidRequest) -> AdapterResult<Vec<HttpRequest>>;

    /// Map a completed 2xx call back into normalized bids.
    ///
    /// Called by the invoker once per finished call. `request` is the
    /// partner's view of the auction request the call was built from.
    fn parse_response(
        &self,
        call: &BidderCall,
        request: &BidRequest,
    ) -> AdapterResult<Vec<BidderBid>>;
}
