// Copyright (c) 2023 The MobileCoin Foundation

//! Validation settings

use crate::chain::DEFAULT_MAX_CHAIN_DEPTH;
use crate::revocation::DEFAULT_CLOCK_SKEW;
use crate::transport::{DEFAULT_MAX_RESPONSE_BYTES, DEFAULT_TIMEOUT};
use crate::trust::TrustListConfig;
use crate::x509::Certificate;
use crate::{Error, Result};
use core::time::Duration;
use serde::{Deserialize, Serialize};

/// Settings of a [`crate::SignatureValidator`].
///
/// Every field has a default, a configuration file only names what it
/// changes.
/// ```
/// use sigtrust_verifier::ValidationConfig;
/// let config = ValidationConfig::from_json(r#"{ "offline": true, "max_chain_depth": 4 }"#)
///     .expect("valid configuration");
/// assert!(config.offline);
/// assert_eq!(config.max_chain_depth, 4);
/// assert_eq!(config.clock_skew_secs, 300);
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    /// Use only embedded revocation evidence, never the network
    pub offline: bool,
    /// Skip revocation checks altogether
    pub revocation_disabled: bool,
    /// Timeout of each revocation or timestamp request, in milliseconds
    pub revocation_timeout_ms: u64,
    /// Bound on a whole validation run, in milliseconds
    pub validation_deadline_ms: Option<u64>,
    /// Most certificates in a chain, at least 1
    pub max_chain_depth: usize,
    /// Judge the signature at this unix time instead of the time the
    /// signed content proves
    pub reference_time: Option<u64>,
    /// The unix time the validation runs at, defaults to now
    pub validation_time: Option<u64>,
    /// Tolerance when comparing evidence windows with a time, in seconds
    pub clock_skew_secs: u64,
    /// Reject OCSP responses that do not echo the request nonce
    pub require_ocsp_nonce: bool,
    /// Largest accepted HTTP response body
    pub max_response_bytes: u64,
    /// PEM files holding trust anchors
    pub trusted_anchor_files: Vec<String>,
    /// A remote trust list contributing trust anchors
    pub trust_list: Option<TrustListConfig>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            offline: false,
            revocation_disabled: false,
            revocation_timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            validation_deadline_ms: None,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            reference_time: None,
            validation_time: None,
            clock_skew_secs: DEFAULT_CLOCK_SKEW.as_secs(),
            require_ocsp_nonce: false,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            trusted_anchor_files: Vec::new(),
            trust_list: None,
        }
    }
}

impl ValidationConfig {
    /// Parse and check a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    /// Reject settings no validation can run with
    pub fn check(&self) -> Result<()> {
        if self.max_chain_depth == 0 {
            return Err(Error::InvalidMaxDepth);
        }
        if let Some(trust_list) = &self.trust_list {
            if trust_list.url.is_empty() {
                return Err(Error::MissingInput("trust_list.url"));
            }
        }
        Ok(())
    }

    /// Timeout of each network request
    pub fn revocation_timeout(&self) -> Duration {
        Duration::from_millis(self.revocation_timeout_ms)
    }

    /// Tolerance when comparing evidence windows with a time
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }

    /// Read the certificates of all [`Self::trusted_anchor_files`]
    pub fn load_anchor_files(&self) -> Result<Vec<Certificate>> {
        let mut anchors = Vec::new();
        for path in &self.trusted_anchor_files {
            let pem = std::fs::read_to_string(path).map_err(|e| Error::Io {
                path: path.clone(),
                message: e.to_string(),
            })?;
            anchors.extend(Certificate::pem_bundle(&pem)?);
        }
        Ok(anchors)
    }
}
