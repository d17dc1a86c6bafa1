use std::collections::HashMap;
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

use crate::error::GatewayError;
use crate::file_sync::RemoteFileSyncerConfig;

pub const ENVIRONMENT_VARIABLE_PREFIX: &str = "BID_GATEWAY";
pub const ENVIRONMENT_VARIABLE_SEPARATOR: &str = "__";

/// Auction-wide settings shared by every partner.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AuctionSettings {
    /// Budget for a whole auction, privacy resolution included.
    #[serde(default = "default_auction_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,

    /// Partners that take part in every auction. Empty means every
    /// registered partner.
    #[serde(default)]
    pub partners: Vec<String>,
}

impl Default for AuctionSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_auction_timeout_ms(),
            partners: Vec::new(),
        }
    }
}

fn default_auction_timeout_ms() -> u64 {
    1000
}

/// Per-partner configuration found under `[adapters.<name>]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdapterConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub endpoint: String,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct PrivacySettings {
    /// Country codes (ISO 3166-1 alpha-2) treated as GDPR jurisdictions when
    /// the request carries no explicit `gdpr` signal.
    #[serde(default = "default_eea_countries")]
    pub eea_countries: Vec<String>,

    /// Number of trailing IPv4 bits zeroed when masking.
    #[serde(default = "default_ipv4_mask_bits")]
    #[validate(range(max = 32))]
    pub ipv4_mask_bits: u8,

    /// Number of leading IPv6 bits kept when anonymizing.
    #[serde(default = "default_ipv6_keep_bits")]
    #[validate(range(max = 128))]
    pub ipv6_keep_bits: u8,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            eea_countries: default_eea_countries(),
            ipv4_mask_bits: default_ipv4_mask_bits(),
            ipv6_keep_bits: default_ipv6_keep_bits(),
        }
    }
}

fn default_eea_countries() -> Vec<String> {
    [
        "AT", "BE", "BG", "HR", "CY", "CZ", "DK", "EE", "FI", "FR", "DE", "GR", "HU", "IS", "IE",
        "IT", "LV", "LI", "LT", "LU", "MT", "NL", "NO", "PL", "PT", "RO", "SK", "SI", "ES", "SE",
        "GB", "CH",
    ]
    .iter()
    .map(|&code| code.to_owned())
    .collect()
}

fn default_ipv4_mask_bits() -> u8 {
    8
}

fn default_ipv6_keep_bits() -> u8 {
    56
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Settings {
    #[serde(default)]
    #[validate(nested)]
    pub auction: AuctionSettings,

    #[serde(default)]
    pub adapters: HashMap<String, AdapterConfig>,

    #[serde(default)]
    #[validate(nested)]
    pub privacy: PrivacySettings,

    #[serde(default)]
    #[validate(nested)]
    pub file_sync: Vec<RemoteFileSyncerConfig>,
}

impl Settings {
    /// Load settings from a TOML file on disk, applying environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read, parsed or
    /// validated.
    pub fn from_file(path: &Path) -> Result<Self, Report<GatewayError>> {
        let toml_str = std::fs::read_to_string(path).change_context(
            GatewayError::Configuration {
                message: format!("failed to read settings file {}", path.display()),
            },
        )?;

        Self::from_toml(&toml_str)
    }

    /// Parse settings from a TOML string, applying `BID_GATEWAY__*`
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the TOML is malformed or any section
    /// fails validation.
    pub fn from_toml(toml_str: &str) -> Result<Self, Report<GatewayError>> {
        let environment = Environment::default()
            .prefix(ENVIRONMENT_VARIABLE_PREFIX)
            .separator(ENVIRONMENT_VARIABLE_SEPARATOR)
            .try_parsing(true);

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let config = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()
            .change_context(GatewayError::Configuration {
                message: "failed to build configuration".to_string(),
            })?;

        let settings: Self =
            config
                .try_deserialize()
                .change_context(GatewayError::Configuration {
                    message: "failed to deserialize configuration".to_string(),
                })?;

        settings
            .validate()
            .change_context(GatewayError::Configuration {
                message: "configuration failed validation".to_string(),
            })?;

        Ok(settings)
    }

    /// Look up the configuration for a partner.
    ///
    /// Returns `Ok(None)` when the partner is absent or disabled.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the configured endpoint is not an
    /// absolute URL.
    pub fn adapter_config(
        &self,
        partner: &str,
    ) -> Result<Option<AdapterConfig>, Report<GatewayError>> {
        let Some(config) = self.adapters.get(partner) else {
            return Ok(None);
        };
        if !config.enabled {
            return Ok(None);
        }

        Url::parse(&config.endpoint).change_context(GatewayError::Configuration {
            message: format!("invalid endpoint for adapter '{partner}'"),
        })?;

        Ok(Some(config.clone()))
    }
}
