//! Error types for the bid gateway.
//!
//! Service-level failures are reported as [`error_stack::Report`]s wrapping a
//! [`GatewayError`]. Partner-scoped problems are *not* errors at this level;
//! they are collected as [`crate::auction::AdapterError`] values next to the
//! bids an auction produced.

use derive_more::{Display, Error};

/// Top-level error for gateway operations.
#[derive(Debug, Display, Error)]
pub enum GatewayError {
    /// Settings could not be loaded or failed validation.
    #[display("Configuration error: {message}")]
    Configuration { message: String },

    /// The auction request is structurally unusable.
    #[display("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Privacy resolution could not complete.
    #[display("Privacy error: {message}")]
    Privacy { message: String },

    /// A remote file synchronization step failed.
    #[display("File sync error: {message}")]
    FileSync { message: String },

    /// The transport collaborator failed to deliver a call.
    #[display("Transport error: {message}")]
    Transport { message: String },
}

impl GatewayError {
    /// Whether the error should abort the auction it was raised for.
    ///
    /// Transport failures are scoped to a single partner; everything raised
    /// before dispatch blocks the whole auction.
    #[must_use]
    pub fn is_auction_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest { .. } | Self::Privacy { .. } | Self::Configuration { .. }
        )
    }
}
