//! TCF evaluation collaborator and its reference implementation.

use std::collections::HashSet;

use async_trait::async_trait;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use error_stack::Report;

use crate::error::GatewayError;
use crate::settings::PrivacySettings;

use super::model::{ConsentType, RequestLogInfo, TcfContext};

/// Consent strings are base64url without a fixed padding convention.
const CONSENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Inputs of one TCF evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcfRequest {
    pub gdpr: Option<u8>,
    pub consent_string: Option<String>,
    pub consent_type: Option<ConsentType>,
    /// Device address, already masked when COPPA applies.
    pub ip_address: Option<String>,
    /// Jurisdiction hint (`device.geo.country`).
    pub country: Option<String>,
    pub request_log_info: RequestLogInfo,
}

/// Decides GDPR scope and consent validity.
///
/// Treated as a remote service: always awaited, never retried here.
#[async_trait]
pub trait TcfDefiner: Send + Sync {
    async fn resolve_tcf_context(
        &self,
        request: &TcfRequest,
    ) -> Result<TcfContext, Report<GatewayError>>;
}

/// Local evaluator: explicit `gdpr` signal first, EEA country list second.
///
/// Consent strings are checked for a decodable core segment and a known
/// version; problems are reported as warnings, never as failures.
#[derive(Debug, Clone)]
pub struct BasicTcfDefiner {
    eea_countries: HashSet<String>,
}

impl BasicTcfDefiner {
    pub fn new<I, S>(eea_countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            eea_countries: eea_countries
                .into_iter()
                .map(|code| code.as_ref().trim().to_ascii_uppercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &PrivacySettings) -> Self {
        Self::new(&settings.eea_countries)
    }

    fn in_eea(&self, country: &str) -> bool {
        let country = country.trim().to_ascii_uppercase();
        let alpha2 = if country.len() == 3 {
            alpha3_to_alpha2(&country).unwrap_or_default()
        } else {
            country.as_str()
        };
        self.eea_countries.contains(alpha2)
    }
}

#[async_trait]
impl TcfDefiner for BasicTcfDefiner {
    async fn resolve_tcf_context(
        &self,
        request: &TcfRequest,
    ) -> Result<TcfContext, Report<GatewayError>> {
        let in_eea = request.country.as_deref().map(|c| self.in_eea(c));
        let gdpr_applies = match request.gdpr {
            Some(gdpr) => gdpr == 1,
            None => in_eea.unwrap_or(false),
        };

        let mut warnings = Vec::new();
        let consent_valid = match request.consent_string.as_deref() {
            Some(consent) => match consent_version(consent) {
                Ok(version) if version_matches(version, request.consent_type) => true,
                Ok(version) => {
                    warnings.push(format!(
                        "Consent string version {version} does not match consent type {}",
                        request
                            .consent_type
                            .map_or_else(|| "unknown".to_string(), |t| t.to_string())
                    ));
                    false
                }
                Err(reason) => {
                    warnings.push(format!("Parsing consent string failed: {reason}"));
                    false
                }
            },
            None => {
                if gdpr_applies {
                    warnings.push("GDPR applies but no consent string was sent".to_string());
                }
                false
            }
        };

        log::debug!(
            "TCF context for {} request: gdpr_applies={}, consent_valid={}",
            request.request_log_info.request_type,
            gdpr_applies,
            consent_valid
        );

        Ok(TcfContext {
            gdpr_applies,
            consent_string: request.consent_string.clone(),
            consent_valid,
            in_eea,
            warnings,
        })
    }
}

/// Version field of a TCF consent string: the first six bits of the
/// decoded core segment.
fn consent_version(consent: &str) -> Result<u8, String> {
    let core = consent.split('.').next().unwrap_or_default();
    let bytes = CONSENT_ENGINE
        .decode(core)
        .map_err(|e| format!("invalid base64url: {e}"))?;
    let first = bytes.first().ok_or_else(|| "empty consent string".to_string())?;
    let version = first >> 2;
    match version {
        1 | 2 => Ok(version),
        other => Err(format!("unsupported TCF version {other}")),
    }
}

fn version_matches(version: u8, consent_type: Option<ConsentType>) -> bool {
    match consent_type {
        None => true,
        Some(ConsentType::Tcf1) => version == 1,
        Some(ConsentType::Tcf2) => version == 2,
        Some(ConsentType::Usp) => false,
    }
}

/// ISO 3166-1 alpha-3 codes of the countries in the default EEA list.
fn alpha3_to_alpha2(code: &str) -> Option<&'static str> {
    let alpha2 = match code {
        "AUT" => "AT",
        "BEL" => "BE",
        "BGR" => "BG",
        "HRV" => "HR",
        "CYP" => "CY",
        "CZE" => "CZ",
        "DNK" => "DK",
        "EST" => "EE",
        "FIN" => "FI",
        "FRA" => "FR",
        "DEU" => "DE",
        "GRC" => "GR",
        "HUN" => "HU",
        "ISL" => "IS",
        "IRL" => "IE",
        "ITA" => "IT",
        "LVA" => "LV",
        "LIE" => "LI",
        "LTU" => "LT",
        "LUX" => "LU",
        "MLT" => "MT",
        "NLD" => "NL",
        "NOR" => "NO",
        "POL" => "PL",
        "PRT" => "PT",
        "ROU" => "RO",
        "SVK" => "SK",
        "SVN" => "SI",
        "ESP" => "ES",
        "SWE" => "SE",
        "GBR" => "GB",
        "CHE" => "CH",
        _ => return None,
    };
    Some(alpha2)
}
