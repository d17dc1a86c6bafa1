//! Common functionality for the bid gateway.
//!
//! This crate provides the auction core used by the gateway binary: partner
//! adapters, privacy resolution, and background file synchronization.
//!
//! # Modules
//!
//! - [`auction`]: Adapter contract, registry, invoker and auction pipeline
//! - [`error`]: Error types and error handling utilities
//! - [`file_sync`]: Remote file synchronizer with retry and atomic swap
//! - [`integrations`]: Partner adapters (InMobi, MobileFuse)
//! - [`ip`]: IP address masking for COPPA
//! - [`openrtb`]: OpenRTB request and response model
//! - [`privacy`]: Consent extraction, TCF evaluation and enforcement
//! - [`settings`]: Configuration management and validation
//! - [`test_support`]: Testing utilities and mocks

pub mod auction;
pub mod error;
pub mod file_sync;
pub mod integrations;
pub mod ip;
pub mod openrtb;
pub mod privacy;
pub mod settings;
