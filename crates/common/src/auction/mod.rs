//! Partner adapter contract and auction execution.
//!
//! Adapters turn the canonical request into outbound calls and map partner
//! responses back into normalized bids. The [`AdapterInvoker`] runs every
//! partner concurrently under one deadline and the [`AuctionPipeline`] puts
//! request validation and privacy resolution in front of it.
//!
//! Note: Individual partner adapters live in the `integrations` module
//! (e.g., `crate::integrations::inmobi`).

use std::sync::Arc;

use crate::ip::DefaultIpMasker;
use crate::privacy::{PrivacyContextResolver, TcfDefiner};
use crate::settings::Settings;

pub mod adapter;
pub mod invoker;
pub mod pipeline;
pub mod registry;
pub mod transport;
pub mod types;
pub mod util;

pub use adapter::BidderAdapter;
pub use invoker::AdapterInvoker;
pub use pipeline::{AuctionPipeline, AuctionResult};
pub use registry::AdapterRegistry;
pub use transport::{HttpTransport, ReqwestTransport};
pub use types::{
    AdapterError, AdapterErrorKind, AdapterResult, AuctionOutcome, BidType, BidderBid,
    BidderCall, HttpRequest, HttpResponse, PartnerSummary,
};

/// Build the adapter registry for the current settings.
///
/// Every builder in `integrations` inspects its own `[adapters.<name>]`
/// section and contributes the adapters that are enabled.
#[must_use]
pub fn build_registry(settings: &Settings) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();

    for builder in crate::integrations::adapter_builders() {
        for adapter in builder(settings) {
            registry.register(adapter);
        }
    }

    log::info!("Adapter registry built with {} partners", registry.len());
    registry
}

/// Build a ready-to-run auction pipeline.
///
/// IP masking follows `[privacy]`; partner calls go through `transport`.
#[must_use]
pub fn build_pipeline(
    settings: &Settings,
    transport: Arc<dyn HttpTransport>,
    tcf_definer: Arc<dyn TcfDefiner>,
) -> AuctionPipeline {
    let registry = Arc::new(build_registry(settings));
    let invoker = AdapterInvoker::new(registry, transport);
    let resolver = PrivacyContextResolver::new(
        tcf_definer,
        Arc::new(DefaultIpMasker::from_settings(&settings.privacy)),
    );
    AuctionPipeline::new(&settings.auction, resolver, invoker)
}
