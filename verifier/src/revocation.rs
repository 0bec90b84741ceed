// Copyright (c) 2023 The MobileCoin Foundation

//! Revocation status of certificates.
//!
//! Evidence is gathered from, in order:
//! 1. OCSP responses and CRLs embedded with the signed content, all of them
//!    read so a revocation in any one of them wins
//! 2. network clients, OCSP first and CRL second, unless offline
//!
//! Every attempt that does not produce a conclusive status is remembered so
//! the report can tell why the status ended up unknown. Status is always
//! judged at the reference time of the validation run.

pub mod crl;
pub mod ocsp;

pub use crl::{CrlClient, UnverifiedCrl, VerifiedCrl};
pub use ocsp::{OcspClient, UnverifiedOcspResponse, VerifiedOcspResponse};

use crate::asn1::CrlReason;
use crate::provider::{Provider, ProviderError};
use crate::time::{render, Deadline};
use crate::transport::TransportError;
use crate::x509::Certificate;
use core::fmt::Debug;
use core::time::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Default tolerance when comparing evidence windows with a time
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Revocation status of one certificate at a reference time
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevocationStatus {
    /// Not revoked according to evidence produced at `as_of`
    Good {
        /// When the evidence was produced (`thisUpdate`)
        as_of: Duration,
    },
    /// Revoked at or before the reference time
    Revoked {
        /// The revocation reason
        reason: CrlReason,
        /// When the certificate was revoked
        revoked_at: Duration,
    },
    /// No conclusive evidence
    Unknown {
        /// Why the status could not be established
        reason: String,
    },
}

impl RevocationStatus {
    /// `true` for [`RevocationStatus::Good`] and [`RevocationStatus::Revoked`]
    pub fn is_conclusive(&self) -> bool {
        !matches!(self, RevocationStatus::Unknown { .. })
    }
}

/// A status with the validity window of the evidence it came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evidence {
    /// The status at the reference time
    pub status: RevocationStatus,
    /// `thisUpdate` of the response or CRL
    pub this_update: Duration,
    /// `nextUpdate` of the response or CRL, if any
    pub next_update: Option<Duration>,
    /// Remark to carry into the report, e.g. a revocation after the
    /// reference time
    pub note: Option<String>,
}

impl Evidence {
    /// Build evidence from a source's raw answer.
    ///
    /// `revoked` is the revocation reason and time the source listed for the
    /// certificate. A revocation dated after the reference time does not
    /// count.
    pub fn judge(
        revoked: Option<(CrlReason, Duration)>,
        this_update: Duration,
        next_update: Option<Duration>,
        context: &RevocationContext<'_>,
    ) -> Self {
        let (status, note) = match revoked {
            Some((reason, revoked_at)) if revoked_at <= context.reference_time => {
                (RevocationStatus::Revoked { reason, revoked_at }, None)
            }
            Some((reason, revoked_at)) => (
                RevocationStatus::Good { as_of: this_update },
                Some(format!(
                    "revoked ({reason}) at {}, after the reference time {}",
                    render(revoked_at),
                    render(context.reference_time)
                )),
            ),
            None => (RevocationStatus::Good { as_of: this_update }, None),
        };
        Self {
            status,
            this_update,
            next_update,
            note,
        }
    }

    /// `true` when the evidence window covers `time`, allowing for `skew`
    pub fn covers(&self, time: Duration, skew: Duration) -> bool {
        self.this_update <= time + skew
            && self.next_update.map_or(true, |next| time <= next + skew)
    }

    /// Whether the evidence may be relied on.
    ///
    /// The window must cover the reference time or the validation time. A
    /// permanent revocation stays relevant however old the evidence is.
    pub fn is_usable(&self, context: &RevocationContext<'_>) -> bool {
        if let RevocationStatus::Revoked { reason, .. } = self.status {
            if reason != CrlReason::CertificateHold {
                return true;
            }
        }
        self.covers(context.reference_time, context.clock_skew)
            || self.covers(context.validation_time, context.clock_skew)
    }

    /// Reject evidence that is not usable
    pub fn fresh(self, context: &RevocationContext<'_>) -> Result<Self, RevocationError> {
        if self.is_usable(context) {
            Ok(self)
        } else {
            Err(RevocationError::Outdated {
                this_update: render(self.this_update),
                next_update: self.next_update.map(render).unwrap_or_else(|| "-".into()),
            })
        }
    }
}

/// OCSP responses and CRLs shipped with the signed content
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmbeddedEvidence {
    /// DER `OCSPResponse`s
    pub ocsp_responses: Vec<Vec<u8>>,
    /// DER `CertificateList`s
    pub crls: Vec<Vec<u8>>,
}

/// The times and limits of one validation run
#[derive(Clone, Copy, Debug)]
pub struct RevocationContext<'a> {
    /// The time status is judged at, e.g. the signing time
    pub reference_time: Duration,
    /// The time the validation runs at
    pub validation_time: Duration,
    /// Tolerance when comparing evidence windows with a time
    pub clock_skew: Duration,
    /// Overall deadline of the run
    pub deadline: Deadline,
    /// Evidence shipped with the signed content
    pub embedded: &'a EmbeddedEvidence,
}

/// Error obtaining or trusting revocation evidence
#[derive(Debug, displaydoc::Display, Clone, PartialEq, Eq)]
pub enum RevocationError {
    /// {0}
    Transport(TransportError),
    /// Malformed response: {0}
    Malformed(String),
    /// The responder answered {0}
    ResponseStatus(String),
    /// The signature over the response does not verify: {0}
    Signature(ProviderError),
    /// The responder is not authorized to answer for this issuer
    UnauthorizedResponder,
    /// The response does not cover the certificate
    NoMatchingResponse,
    /// The nonce in the response does not match the request
    NonceMismatch,
    /// The response carries no nonce
    MissingNonce,
    /// Outdated evidence, valid from {this_update} until {next_update}
    #[allow(missing_docs)]
    Outdated {
        this_update: String,
        next_update: String,
    },
    /// The CRL was not issued by the certificate's issuer
    IssuerMismatch,
    /// The issuer may not sign CRLs
    NotCrlSigner,
    /// The certificate names no location to ask
    NoLocation,
}

impl std::error::Error for RevocationError {}

impl From<TransportError> for RevocationError {
    fn from(e: TransportError) -> Self {
        RevocationError::Transport(e)
    }
}

impl From<der::Error> for RevocationError {
    fn from(e: der::Error) -> Self {
        RevocationError::Malformed(e.to_string())
    }
}

impl From<ProviderError> for RevocationError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Decoding(e) => RevocationError::Malformed(e.to_string()),
            ProviderError::UnexpectedStructure(name) => {
                RevocationError::Malformed(format!("expected {name}"))
            }
            other => RevocationError::Signature(other),
        }
    }
}

/// A source of revocation evidence reached over the network
pub trait RevocationClient: Debug + Send + Sync {
    /// Short name used in report messages, e.g. `OCSP`
    fn name(&self) -> &'static str;

    /// Obtain evidence for `certificate` issued by `issuer`
    fn check(
        &self,
        certificate: &Certificate,
        issuer: &Certificate,
        context: &RevocationContext<'_>,
    ) -> Result<Evidence, RevocationError>;
}

/// Result of checking one certificate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevocationOutcome {
    /// The status at the reference time
    pub status: RevocationStatus,
    /// Where a conclusive status came from
    pub source: Option<String>,
    /// Remark of the evidence
    pub note: Option<String>,
    /// Sources that were tried without a conclusive answer, and why
    pub attempts: Vec<String>,
}

impl RevocationOutcome {
    fn conclusive(evidence: Evidence, source: String, attempts: Vec<String>) -> Self {
        Self {
            status: evidence.status,
            source: Some(source),
            note: evidence.note,
            attempts,
        }
    }
}

/// Establishes revocation status from embedded evidence and clients
#[derive(Clone, Debug)]
pub struct RevocationChecker {
    provider: Provider,
    clients: Vec<Arc<dyn RevocationClient>>,
    offline: bool,
}

impl RevocationChecker {
    /// A checker with no network clients
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            clients: Vec::new(),
            offline: false,
        }
    }

    /// Add a network client, tried after the ones already added
    pub fn with_client(mut self, client: Arc<dyn RevocationClient>) -> Self {
        self.clients.push(client);
        self
    }

    /// In offline mode only embedded evidence is used
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Establish the status of `certificate` issued by `issuer`
    pub fn check(
        &self,
        certificate: &Certificate,
        issuer: &Certificate,
        context: &RevocationContext<'_>,
    ) -> RevocationOutcome {
        let serial = certificate.serial_hex();
        let mut attempts = Vec::new();

        // A revocation in any embedded item outweighs a GOOD answer in another
        let mut good = None;
        for der in &context.embedded.ocsp_responses {
            match ocsp::evidence_from_der(&self.provider, der, certificate, issuer, context) {
                Ok(evidence) => match evidence.status {
                    RevocationStatus::Revoked { .. } => {
                        return RevocationOutcome::conclusive(
                            evidence,
                            "embedded OCSP response".into(),
                            attempts,
                        );
                    }
                    RevocationStatus::Good { .. } => {
                        good.get_or_insert((evidence, "embedded OCSP response"));
                    }
                    RevocationStatus::Unknown { .. } => {
                        attempts.push("embedded OCSP response: status unknown".into())
                    }
                },
                Err(RevocationError::NoMatchingResponse)
                | Err(RevocationError::UnauthorizedResponder) => {}
                Err(e) => attempts.push(format!("embedded OCSP response: {e}")),
            }
        }

        for der in &context.embedded.crls {
            match crl::evidence_from_der(&self.provider, der, certificate, issuer, context) {
                Ok(evidence) => match evidence.status {
                    RevocationStatus::Revoked { .. } => {
                        return RevocationOutcome::conclusive(
                            evidence,
                            "embedded CRL".into(),
                            attempts,
                        );
                    }
                    RevocationStatus::Good { .. } => {
                        good.get_or_insert((evidence, "embedded CRL"));
                    }
                    RevocationStatus::Unknown { .. } => {
                        attempts.push("embedded CRL: status unknown".into())
                    }
                },
                Err(RevocationError::IssuerMismatch) => {}
                Err(e) => attempts.push(format!("embedded CRL: {e}")),
            }
        }

        if let Some((evidence, source)) = good {
            return RevocationOutcome::conclusive(evidence, source.into(), attempts);
        }

        if self.offline {
            attempts.push("offline mode, network sources not consulted".into());
            return unknown(attempts);
        }

        for client in &self.clients {
            if context.deadline.is_expired() {
                attempts.push(format!("{}: validation deadline passed", client.name()));
                break;
            }
            match client.check(certificate, issuer, context) {
                Ok(evidence) if evidence.status.is_conclusive() => {
                    debug!(serial = %serial, source = client.name(), "revocation status established");
                    return RevocationOutcome::conclusive(evidence, client.name().into(), attempts);
                }
                Ok(_) => attempts.push(format!("{}: status unknown", client.name())),
                Err(RevocationError::NoLocation) => {
                    attempts.push(format!("{}: no location in certificate", client.name()))
                }
                Err(e) => {
                    debug!(serial = %serial, source = client.name(), error = %e, "revocation source failed, falling back");
                    attempts.push(format!("{}: {e}", client.name()));
                }
            }
        }

        unknown(attempts)
    }
}

fn unknown(attempts: Vec<String>) -> RevocationOutcome {
    let reason = if attempts.is_empty() {
        "revocation unknown: no revocation source available".to_string()
    } else {
        format!("revocation unknown: {}", attempts.join("; "))
    };
    RevocationOutcome {
        status: RevocationStatus::Unknown { reason },
        source: None,
        note: None,
        attempts,
    }
}

/// Revocations seen during one validation run.
///
/// Once a certificate is found revoked, later optimistic answers for the
/// same certificate are overridden.
#[derive(Clone, Debug, Default)]
pub struct RevocationLedger {
    revoked: HashMap<[u8; 32], (CrlReason, Duration)>,
}

impl RevocationLedger {
    /// Record `status` for `certificate` and return the status to use
    pub fn settle(
        &mut self,
        certificate: &Certificate,
        status: RevocationStatus,
        reference_time: Duration,
    ) -> RevocationStatus {
        let fingerprint = *certificate.fingerprint();
        match status {
            RevocationStatus::Revoked { reason, revoked_at } => {
                self.revoked
                    .entry(fingerprint)
                    .or_insert((reason, revoked_at));
                status
            }
            other => match self.revoked.get(&fingerprint) {
                Some((reason, revoked_at)) if *revoked_at <= reference_time => {
                    RevocationStatus::Revoked {
                        reason: *reason,
                        revoked_at: *revoked_at,
                    }
                }
                _ => other,
            },
        }
    }

    /// `true` once `certificate` was recorded revoked
    pub fn is_revoked(&self, certificate: &Certificate) -> bool {
        self.revoked.contains_key(certificate.fingerprint())
    }
}
