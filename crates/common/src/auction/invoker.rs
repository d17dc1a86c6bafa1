//! Concurrent partner dispatch under one shared deadline.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use http::StatusCode;
use tokio::time::{timeout_at, Instant};

use crate::openrtb::BidRequest;
use crate::privacy::{apply_privacy, PrivacyContext};

use super::adapter::BidderAdapter;
use super::registry::AdapterRegistry;
use super::transport::HttpTransport;
use super::types::{
    AdapterError, AuctionOutcome, BidderCall, HttpResponse, PartnerSummary,
};
use super::util::partner_request;

/// Runs adapters and their outbound calls, isolating each partner's failures.
pub struct AdapterInvoker {
    registry: Arc<AdapterRegistry>,
    transport: Arc<dyn HttpTransport>,
}

/// Per-partner bookkeeping for one auction.
struct PartnerRun {
    adapter: Arc<dyn BidderAdapter>,
    request: BidRequest,
    summary: PartnerSummary,
    outstanding: usize,
}

impl AdapterInvoker {
    pub fn new(registry: Arc<AdapterRegistry>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Dispatch `request` to every partner in `partners`.
    ///
    /// The privacy context is applied to the request before any adapter sees
    /// it. Calls still pending at `deadline` are dropped and counted as
    /// timed out in the partner summary; they never produce errors.
    pub async fn invoke(
        &self,
        request: Arc<BidRequest>,
        privacy: Arc<PrivacyContext>,
        partners: &[String],
        deadline: Instant,
    ) -> AuctionOutcome {
        let started = Instant::now();
        let enforced = apply_privacy(&request, &privacy);
        let mut outcome = AuctionOutcome::default();
        let mut runs: Vec<PartnerRun> = Vec::with_capacity(partners.len());
        let mut pending = FuturesUnordered::new();

        for partner in partners {
            let Some(adapter) = self.registry.get(partner) else {
                log::warn!("Partner '{}' not registered, skipping", partner);
                outcome.errors.push(AdapterError::bad_input(
                    partner.as_str(),
                    format!("Unknown partner '{partner}'"),
                ));
                continue;
            };

            let Some(partner_view) = partner_request(&enforced, partner) else {
                log::debug!("No impressions address partner '{}'", partner);
                continue;
            };

            let built = adapter.build_requests(&partner_view);
            let mut summary = PartnerSummary::new(partner.as_str());
            summary.requests = built.value.len();
            summary.errors = built.errors.len();
            outcome.errors.extend(built.errors);

            let index = runs.len();
            for http_request in built.value {
                let transport = Arc::clone(&self.transport);
                log::debug!("Dispatching call to '{}': {}", partner, http_request.uri);
                pending.push(async move {
                    let result = transport.send(&http_request).await;
                    (index, http_request, result)
                });
            }

            runs.push(PartnerRun {
                adapter: Arc::clone(adapter),
                request: partner_view,
                outstanding: summary.requests,
                summary,
            });
        }

        log::info!(
            "Launched {} partner calls for auction '{}'",
            pending.len(),
            request.id
        );

        loop {
            let next = match timeout_at(deadline, pending.next()).await {
                Ok(Some(next)) => next,
                Ok(None) => break,
                Err(_) => {
                    log::info!(
                        "Auction '{}' deadline reached with {} calls pending",
                        request.id,
                        pending.len()
                    );
                    break;
                }
            };

            let (index, http_request, result) = next;
            let Some(run) = runs.get_mut(index) else {
                continue;
            };
            run.outstanding = run.outstanding.saturating_sub(1);
            run.summary.response_time_ms = elapsed_ms(started);
            let partner = run.adapter.partner_name();

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    log::warn!("Call to partner '{}' failed: {:?}", partner, e);
                    run.summary.errors += 1;
                    outcome.errors.push(AdapterError::transport(
                        partner,
                        e.current_context().to_string(),
                    ));
                    continue;
                }
            };

            match check_status(partner, &response) {
                Ok(true) => {}
                Ok(false) => {
                    log::debug!("Partner '{}' returned no bid", partner);
                    continue;
                }
                Err(error) => {
                    log::warn!("{}", error);
                    run.summary.errors += 1;
                    outcome.errors.push(error);
                    continue;
                }
            }

            let call = BidderCall {
                request: http_request,
                response,
            };
            let parsed = run.adapter.parse_response(&call, &run.request);
            run.summary.bids += parsed.value.len();
            run.summary.errors += parsed.errors.len();
            outcome.bids.extend(parsed.value);
            outcome.errors.extend(parsed.errors);
        }

        // Dropping the stream cancels whatever is still in flight.
        drop(pending);

        for mut run in runs {
            if run.outstanding > 0 {
                run.summary.timed_out = run.outstanding;
                run.summary.response_time_ms = elapsed_ms(started);
            }
            log::info!(
                "Partner '{}': {} requests, {} bids, {} errors, {} timed out ({}ms)",
                run.summary.partner,
                run.summary.requests,
                run.summary.bids,
                run.summary.errors,
                run.summary.timed_out,
                run.summary.response_time_ms
            );
            outcome.partners.push(run.summary);
        }

        outcome
    }
}

/// Decide whether a response should be handed to the adapter.
///
/// `Ok(false)` means the partner declined to bid.
fn check_status(partner: &str, response: &HttpResponse) -> Result<bool, AdapterError> {
    match response.status {
        StatusCode::NO_CONTENT => Ok(false),
        StatusCode::BAD_REQUEST => Err(AdapterError::bad_input(
            partner,
            "Unexpected status code: 400. Run with request.debug = 1 for more info",
        )),
        status if status.is_success() => Ok(true),
        status => Err(AdapterError::bad_server_response(
            partner,
            format!(
                "Unexpected status code: {}. Run with request.test = 1 for more info",
                status.as_u16()
            ),
        )),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::build_registry;
    use crate::auction::types::{AdapterErrorKind, BidType};
    use crate::test_support::tests::{
        create_test_settings, sample_bid_request, MockReply, MockTransport, INMOBI_ENDPOINT,
        MOBILEFUSE_ENDPOINT,
    };
    use std::time::Duration;

    fn invoker(transport: MockTransport) -> (AdapterInvoker, Arc<MockTransport>) {
        let registry = Arc::new(build_registry(&create_test_settings()));
        let transport = Arc::new(transport);
        (
            AdapterInvoker::new(registry, Arc::clone(&transport) as Arc<dyn HttpTransport>),
            transport,
        )
    }

    fn partners() -> Vec<String> {
        vec!["inmobi".to_string(), "mobilefuse".to_string()]
    }

    fn banner_bid(price: f64) -> String {
        serde_json::json!({
            "id": "resp",
            "cur": "USD",
            "seatbid": [{"bid": [{"id": "bid-1", "impid": "imp-1", "price": price, "mtype": 1}]}]
        })
        .to_string()
    }

    #[test]
    fn status_classification() {
        let no_bid = HttpResponse::new(StatusCode::NO_CONTENT, "");
        assert_eq!(check_status("p", &no_bid), Ok(false));

        let bad_request = HttpResponse::new(StatusCode::BAD_REQUEST, "");
        let err = check_status("p", &bad_request).expect_err("400 should fail");
        assert_eq!(err.kind, AdapterErrorKind::BadInput);

        let unavailable = HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE, "");
        let err = check_status("p", &unavailable).expect_err("503 should fail");
        assert_eq!(err.kind, AdapterErrorKind::BadServerResponse);
        assert!(err.message.contains("503"));

        assert_eq!(
            check_status("p", &HttpResponse::new(StatusCode::OK, "")),
            Ok(true)
        );
    }

    #[tokio::test]
    async fn malformed_partner_does_not_affect_others() {
        let (invoker, _) = invoker(
            MockTransport::new()
                .route(INMOBI_ENDPOINT, MockReply::ok(banner_bid(1.5)))
                .route(MOBILEFUSE_ENDPOINT, MockReply::ok("{not json")),
        );

        let outcome = invoker
            .invoke(
                Arc::new(sample_bid_request()),
                Arc::new(PrivacyContext::default()),
                &partners(),
                Instant::now() + Duration::from_secs(5),
            )
            .await;

        assert_eq!(outcome.bids.len(), 1);
        assert_eq!(outcome.bids[0].partner, "inmobi");
        assert_eq!(outcome.bids[0].bid_type, BidType::Banner);
        assert!((outcome.bids[0].price() - 1.5).abs() < f64::EPSILON);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].partner, "mobilefuse");
        assert_eq!(outcome.errors[0].kind, AdapterErrorKind::BadServerResponse);
    }

    #[tokio::test]
    async fn transport_failure_is_recorded_per_partner() {
        let (invoker, _) = invoker(
            MockTransport::new()
                .route(INMOBI_ENDPOINT, MockReply::Fail("connection refused".to_string()))
                .route(MOBILEFUSE_ENDPOINT, MockReply::status(StatusCode::NO_CONTENT)),
        );

        let outcome = invoker
            .invoke(
                Arc::new(sample_bid_request()),
                Arc::new(PrivacyContext::default()),
                &partners(),
                Instant::now() + Duration::from_secs(5),
            )
            .await;

        assert!(outcome.bids.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, AdapterErrorKind::Transport);
        let mobilefuse = outcome
            .summary_for("mobilefuse")
            .expect("mobilefuse should be summarized");
        assert_eq!(mobilefuse.errors, 0);
        assert_eq!(mobilefuse.bids, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_partner_times_out_without_error() {
        let (invoker, _) = invoker(
            MockTransport::new()
                .route(INMOBI_ENDPOINT, MockReply::ok(banner_bid(2.0)))
                .route(MOBILEFUSE_ENDPOINT, MockReply::Hang),
        );

        let outcome = invoker
            .invoke(
                Arc::new(sample_bid_request()),
                Arc::new(PrivacyContext::default()),
                &partners(),
                Instant::now() + Duration::from_millis(200),
            )
            .await;

        assert_eq!(outcome.bids.len(), 1);
        assert_eq!(outcome.bids[0].partner, "inmobi");
        assert!(outcome.errors.is_empty());
        let mobilefuse = outcome
            .summary_for("mobilefuse")
            .expect("mobilefuse should be summarized");
        assert_eq!(mobilefuse.timed_out, 1);
        assert_eq!(
            outcome.summary_for("inmobi").map(|s| s.timed_out),
            Some(0)
        );
    }

    #[tokio::test]
    async fn unknown_partner_is_bad_input() {
        let (invoker, transport) = invoker(MockTransport::new());

        let outcome = invoker
            .invoke(
                Arc::new(sample_bid_request()),
                Arc::new(PrivacyContext::default()),
                &["nobody".to_string()],
                Instant::now() + Duration::from_secs(1),
            )
            .await;

        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, AdapterErrorKind::BadInput);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn blank_partner_parameters_never_reach_the_transport() {
        let (invoker, transport) = invoker(
            MockTransport::new()
                .route(INMOBI_ENDPOINT, MockReply::ok(banner_bid(1.0)))
                .route(MOBILEFUSE_ENDPOINT, MockReply::ok(banner_bid(1.0))),
        );
        let mut request = sample_bid_request();
        request.imp[0].ext = Some(serde_json::json!({
            "prebid": {
                "bidder": {
                    "inmobi": {"plc": "   "},
                    "mobilefuse": {"placement_id": 999, "pub_id": "  "}
                }
            }
        }));

        let outcome = invoker
            .invoke(
                Arc::new(request),
                Arc::new(PrivacyContext::default()),
                &partners(),
                Instant::now() + Duration::from_secs(1),
            )
            .await;

        assert!(transport.calls().is_empty());
        assert!(outcome.bids.is_empty());
        assert_eq!(outcome.errors.len(), 2);
        for partner in ["inmobi", "mobilefuse"] {
            let errors: Vec<_> = outcome
                .errors
                .iter()
                .filter(|e| e.partner == partner)
                .collect();
            assert_eq!(errors.len(), 1, "one error for {partner}");
            assert_eq!(errors[0].kind, AdapterErrorKind::BadInput);
            let summary = outcome
                .summary_for(partner)
                .expect("partner should be summarized");
            assert_eq!(summary.requests, 0);
            assert_eq!(summary.errors, 1);
        }
    }
}
