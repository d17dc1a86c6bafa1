//! One auction end to end: validate, resolve privacy, dispatch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use tokio::time::Instant;

use crate::error::GatewayError;
use crate::openrtb::BidRequest;
use crate::privacy::{PrivacyContext, PrivacyContextResolver, RequestMetadata};
use crate::settings::AuctionSettings;

use super::invoker::AdapterInvoker;
use super::types::{AdapterError, BidderBid, PartnerSummary};

/// Everything an auction produced, handed to the aggregator.
#[derive(Debug, Clone)]
pub struct AuctionResult {
    pub bids: Vec<BidderBid>,
    pub errors: Vec<AdapterError>,
    pub partners: Vec<PartnerSummary>,
    /// Advisory privacy warnings, surfaced in debug output.
    pub debug_warnings: Vec<String>,
    pub privacy: Arc<PrivacyContext>,
    pub total_time_ms: u64,
}

pub struct AuctionPipeline {
    timeout: Duration,
    partners: Vec<String>,
    resolver: PrivacyContextResolver,
    invoker: AdapterInvoker,
}

impl AuctionPipeline {
    /// An empty `settings.partners` list means every registered partner.
    pub fn new(
        settings: &AuctionSettings,
        resolver: PrivacyContextResolver,
        invoker: AdapterInvoker,
    ) -> Self {
        let partners = if settings.partners.is_empty() {
            invoker
                .registry()
                .partner_names()
                .into_iter()
                .map(str::to_string)
                .collect()
        } else {
            settings.partners.clone()
        };

        Self {
            timeout: Duration::from_millis(settings.timeout_ms),
            partners,
            resolver,
            invoker,
        }
    }

    #[must_use]
    pub fn partners(&self) -> &[String] {
        &self.partners
    }

    /// Run an auction.
    ///
    /// Partner failures are returned as values in [`AuctionResult::errors`].
    ///
    /// # Errors
    ///
    /// Fails only when the request is structurally invalid or privacy
    /// resolution cannot complete; no partner is contacted in that case.
    pub async fn run(
        &self,
        request: BidRequest,
        metadata: &RequestMetadata,
    ) -> Result<AuctionResult, Report<GatewayError>> {
        let result = self.execute(request, metadata).await;
        if let Err(report) = &result {
            if report.current_context().is_auction_fatal() {
                log::warn!("Auction aborted before dispatch: {}", report);
            } else {
                log::error!("Auction failed: {:?}", report);
            }
        }
        result
    }

    async fn execute(
        &self,
        request: BidRequest,
        metadata: &RequestMetadata,
    ) -> Result<AuctionResult, Report<GatewayError>> {
        let started = Instant::now();
        validate_request(&request)?;

        let budget = match request.tmax {
            Some(tmax) if tmax > 0 => self.timeout.min(Duration::from_millis(tmax)),
            _ => self.timeout,
        };
        let deadline = started + budget;

        let privacy = Arc::new(self.resolver.resolve(&request, metadata, deadline).await?);
        let request = Arc::new(request);
        log::debug!(
            "Auction '{}': privacy resolved (gdpr_applies={}, coppa={}), budget {}ms",
            request.id,
            privacy.gdpr_applies(),
            privacy.is_coppa(),
            budget.as_millis()
        );

        let outcome = self
            .invoker
            .invoke(
                Arc::clone(&request),
                Arc::clone(&privacy),
                &self.partners,
                deadline,
            )
            .await;

        let total_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        log::info!(
            "Auction '{}' completed: {} bids, {} errors in {}ms",
            request.id,
            outcome.bids.len(),
            outcome.errors.len(),
            total_time_ms
        );

        Ok(AuctionResult {
            bids: outcome.bids,
            errors: outcome.errors,
            partners: outcome.partners,
            debug_warnings: privacy.warnings.clone(),
            privacy,
            total_time_ms,
        })
    }
}

/// Structural checks that must pass before any resolution happens.
fn validate_request(request: &BidRequest) -> Result<(), Report<GatewayError>> {
    let invalid = |message: String| Report::new(GatewayError::InvalidRequest { message });

    if request.id.trim().is_empty() {
        return Err(invalid("request.id is required".to_string()));
    }
    if request.imp.is_empty() {
        return Err(invalid("request.imp must contain at least one impression".to_string()));
    }

    let mut seen = HashSet::with_capacity(request.imp.len());
    for (index, imp) in request.imp.iter().enumerate() {
        if imp.id.trim().is_empty() {
            return Err(invalid(format!("request.imp[{index}].id is required")));
        }
        if !seen.insert(imp.id.as_str()) {
            return Err(invalid(format!(
                "request.imp[{index}].id '{}' is not unique",
                imp.id
            )));
        }
    }

    Ok(())
}
