//! Privacy context resolution.
//!
//! Consent signals are extracted and sanitized once per auction, evaluated by
//! a [`TcfDefiner`], and combined with masked device addresses into an
//! immutable [`PrivacyContext`] that every partner call honors.

pub mod enforcement;
pub mod extractor;
pub mod model;
pub mod resolver;
pub mod tcf;

pub use enforcement::apply_privacy;
pub use extractor::PrivacyExtractor;
pub use model::{
    Ccpa, ConsentType, Privacy, PrivacyContext, RequestLogInfo, RequestMetadata, RequestType,
    TcfContext,
};
pub use resolver::{PrivacyContextResolver, CONSENT_TYPE_PARAM};
pub use tcf::{BasicTcfDefiner, TcfDefiner, TcfRequest};
